pub mod connectors;
pub mod counter;
pub mod error;
pub mod metrics;
pub mod partition;
pub mod rate_limiter;
pub mod state;
