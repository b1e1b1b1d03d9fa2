// src/lib.rs
pub mod api;
pub mod backends;
pub mod config;
pub mod driver;
pub mod duck;
pub mod jobs;
pub mod logformat;
pub mod metrics;
pub mod server;
pub mod simulation;
