pub mod failed_record;
pub mod run;
pub mod validation;
