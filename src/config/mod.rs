// src/config/mod.rs
pub mod aggregator;

pub use aggregator::{load_config_default, load_config_from, AggregatorConfig, ProviderSettings};
