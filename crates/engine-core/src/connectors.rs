pub mod origin;
pub mod sink;
pub mod target;
