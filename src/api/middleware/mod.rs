//! Middleware components for request processing.

mod cron_secret;
mod error_handler;
mod logging;
mod request_id;

pub use cron_secret::{CRON_SECRET_HEADER, cron_secret_middleware};
pub use logging::logging_middleware;
pub use request_id::{REQUEST_ID_HEADER, RequestId, request_id_middleware};
