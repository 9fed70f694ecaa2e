pub mod coercion;
pub mod error;
pub mod metadata;
pub mod query;
