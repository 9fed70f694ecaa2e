pub mod backpressure;
pub mod batch;
pub mod config;
pub mod error;
pub mod job;
pub mod pipeline;
pub mod upsert;

#[cfg(test)]
mod tests;
