//! Value parsers for CLI arguments
//!
//! Each function is plugged into clap through `value_parser` and returns a
//! human-readable message on failure.

use serde_json::Value as JsonValue;
use std::net::IpAddr;
use std::path::PathBuf;

use crate::jobs::{JobStatus, JobType};

const MAX_HOSTNAME_LEN: usize = 253;
const MAX_LABEL_LEN: usize = 63;
const MAX_ROLLBACK_STEPS: u32 = 100;

pub fn validate_port(port_str: &str) -> Result<u16, String> {
    match port_str.parse::<u16>() {
        Ok(0) => Err("Port 0 is not allowed; use 1-65535".to_string()),
        Ok(port) => Ok(port),
        Err(_) => Err(format!("Port must be a number between 1 and 65535, got: '{port_str}'")),
    }
}

/// The file must exist and be readable
pub fn validate_config_file_path(path_str: &str) -> Result<PathBuf, String> {
    let path = PathBuf::from(path_str);
    if !path.is_file() {
        return Err(format!("Configuration file not found: '{path_str}'"));
    }

    std::fs::File::open(&path)
        .map(|_| path)
        .map_err(|e| format!("Cannot read configuration file '{path_str}': {e}"))
}

pub fn validate_rollback_steps(steps_str: &str) -> Result<u32, String> {
    let steps: u32 = steps_str
        .parse()
        .map_err(|_| format!("Rollback steps must be a positive number, got: '{steps_str}'"))?;

    if !(1..=MAX_ROLLBACK_STEPS).contains(&steps) {
        return Err(format!("Rollback steps must be between 1 and {MAX_ROLLBACK_STEPS}"));
    }

    Ok(steps)
}

/// Accepts an IP address or an RFC 1123 hostname
pub fn validate_host_address(host_str: &str) -> Result<String, String> {
    let host = host_str.trim();

    if host.is_empty() {
        return Err("Host address cannot be empty".to_string());
    }

    if host.parse::<IpAddr>().is_ok() {
        return Ok(host.to_string());
    }

    if host.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return Err(format!("Invalid IPv4 address: '{host}'"));
    }

    if host.len() > MAX_HOSTNAME_LEN {
        return Err(format!(
            "Host address is too long (maximum {MAX_HOSTNAME_LEN} characters)"
        ));
    }

    let valid_label = |label: &str| {
        !label.is_empty()
            && label.len() <= MAX_LABEL_LEN
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    };
    if !host.split('.').all(valid_label) {
        return Err(format!("Invalid hostname: '{host}'"));
    }

    Ok(host.to_string())
}

/// Validate a task name against the static task mapping
pub fn validate_task(task_str: &str) -> Result<JobType, String> {
    task_str
        .parse()
        .map_err(|e| format!("{e}. Valid tasks are: {}", JobType::all_names().join(", ")))
}

pub fn validate_job_status(status_str: &str) -> Result<JobStatus, String> {
    status_str
        .parse()
        .map_err(|e: crate::error::AppError| e.to_string())
}

/// Job payloads must be JSON objects
pub fn validate_json_payload(payload_str: &str) -> Result<JsonValue, String> {
    let payload: JsonValue = serde_json::from_str(payload_str)
        .map_err(|e| format!("Payload must be valid JSON: {e}"))?;

    if !payload.is_object() {
        return Err("Payload must be a JSON object".to_string());
    }

    Ok(payload)
}

pub fn validate_limit(limit_str: &str) -> Result<i64, String> {
    let limit: i64 = limit_str
        .parse()
        .map_err(|_| format!("Limit must be a number, got: '{limit_str}'"))?;

    if !(1..=1000).contains(&limit) {
        return Err("Limit must be between 1 and 1000".to_string());
    }

    Ok(limit)
}
