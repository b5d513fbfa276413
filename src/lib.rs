pub mod collectors;
pub mod config;
pub mod cycle;
pub mod http;
pub mod metrics;
pub mod model;
pub mod record;
pub mod runtime;
pub mod state;
pub mod upstream;
