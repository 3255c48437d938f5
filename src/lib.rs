// src/lib.rs

pub mod backup;
pub mod cli;
pub mod commands;
pub mod config;
pub mod deploy;
pub mod env;
pub mod errors;
pub mod exec;
pub mod health;
pub mod logging;
pub mod readiness;
pub mod release;
pub mod types;
pub mod units;

pub use commands::run;
