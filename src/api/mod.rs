//! HTTP surface: the scheduler trigger and health probes.

pub mod dto;
pub mod handlers;
pub mod middleware;
pub mod routes;
mod doc;

pub use routes::create_router;
