//! Vera Jobs Library
//!
//! Background job worker for Vera: a distributed lock and a job queue over a
//! shared store, driven by cron-triggered HTTP calls.

use shadow_rs::shadow;
shadow!(build);

pub mod api;
pub mod cli;
pub mod config;
pub mod db;
pub mod delivery;
pub mod error;
pub mod jobs;
pub mod lock;
pub mod logger;
pub mod models;
pub mod repositories;
pub mod schema;
pub mod server;
pub mod state;
pub mod store;

pub use state::AppState;

pub fn pkg_version() -> &'static str {
    build::PKG_VERSION
}

pub fn clap_long_version() -> &'static str {
    build::CLAP_LONG_VERSION
}
