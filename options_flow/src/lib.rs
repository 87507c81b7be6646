pub mod aggregate;
pub mod chart;
pub mod cli;
pub mod config;
pub mod models;
pub mod scheduler;
pub mod source;
pub mod store;
