pub mod adapter;
pub mod batch;
pub mod config;
pub mod numeric;
pub mod params;
pub mod row;
pub mod utils;
