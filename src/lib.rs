// src/lib.rs
pub mod api;
pub mod banner;
pub mod config;
pub mod errors;
pub mod jobs;
pub mod models;
pub mod relay;
pub mod runner;
pub mod storage;
