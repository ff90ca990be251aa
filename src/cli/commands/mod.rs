pub mod analyze;
pub mod config;
