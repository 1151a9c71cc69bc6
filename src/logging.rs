//! Tracing subscriber setup

use crate::core::error::{ConfigError, EngineResult};
use tracing_subscriber::{EnvFilter, fmt};

/// Install the global `tracing` subscriber
///
/// `RUST_LOG` wins over `level` when set. Fails if `level` is not a valid
/// filter directive or a subscriber is already installed.
pub fn init(level: &str) -> EngineResult<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level).map_err(|e| ConfigError::InvalidValue {
            field: "log_level".to_string(),
            value: level.to_string(),
            message: e.to_string(),
        })?,
    };
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|e| {
            ConfigError::InvalidValue {
                field: "log_level".to_string(),
                value: level.to_string(),
                message: format!("logging already initialized: {}", e),
            }
            .into()
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_fails() {
        // the first call may lose to another test's subscriber
        let _ = init("debug");
        assert!(init("debug").is_err());
    }
}
