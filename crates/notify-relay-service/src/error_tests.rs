//! Tests for exit code mapping.

use super::*;
use notify_queue::{ConfigurationError, QueueError};
use std::time::Duration;

#[test]
fn test_configuration_errors_exit_with_3() {
    let error = RelayError::from(ConfigError::Invalid {
        field: "shutdown_timeout_seconds".to_string(),
        message: "must be greater than zero".to_string(),
    });
    assert_eq!(error.exit_code(), 3);

    let error = RelayError::from(BroadcastError::Configuration {
        message: "connection string has no AccessKey".to_string(),
    });
    assert_eq!(error.exit_code(), 3);

    let error = RelayError::Processor(ProcessorError::Configuration {
        message: "polling.batch_size must be between 1 and 32, got 0".to_string(),
    });
    assert_eq!(error.exit_code(), 3);
}

#[test]
fn test_startup_failure_exits_with_4() {
    let error = RelayError::Startup(ProcessorError::StartupFailed {
        source: QueueError::ConfigurationError(ConfigurationError::Missing {
            key: "account_key or sas_token".to_string(),
        }),
    });

    assert_eq!(error.exit_code(), 4);
    assert!(error.to_string().contains("Failed to start relay"));
}

#[test]
fn test_unclean_shutdown_exits_with_5() {
    let error = RelayError::Shutdown(ProcessorError::ShutdownTimeout {
        timeout: Duration::from_secs(30),
    });

    assert_eq!(error.exit_code(), 5);
}
