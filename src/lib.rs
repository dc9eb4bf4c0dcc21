pub mod adapters;
pub mod args;
pub mod config;
pub mod database;
pub mod model;
pub mod pipeline;
pub mod utils;
