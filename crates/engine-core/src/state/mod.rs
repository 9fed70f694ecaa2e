pub mod models;
pub mod sled_store;
