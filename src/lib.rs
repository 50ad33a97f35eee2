pub mod api;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod normalize;
pub mod orchestrator;
pub mod scrapers;
pub mod stats;
pub mod store;
