//! Tests for error types.

use super::*;

#[test]
fn test_error_transience() {
    assert!(QueueError::ConnectionFailed {
        message: "network error".to_string(),
    }
    .is_transient());

    assert!(QueueError::Timeout {
        duration: Duration::from_secs(30),
    }
    .is_transient());

    assert!(QueueError::ProviderError {
        provider: "AzureStorage".to_string(),
        code: "ServerBusy".to_string(),
        message: "try again".to_string(),
    }
    .is_transient());

    assert!(!QueueError::QueueNotFound {
        queue_name: "notifications".to_string(),
    }
    .is_transient());

    assert!(!QueueError::AuthenticationFailed {
        message: "bad key".to_string(),
    }
    .is_transient());

    assert!(!QueueError::ConfigurationError(ConfigurationError::Missing {
        key: "account_name".to_string(),
    })
    .is_transient());
}

#[test]
fn test_not_found_is_only_reported_for_missing_messages() {
    let missing = QueueError::MessageNotFound {
        message_id: "abc".to_string(),
    };
    assert!(missing.is_not_found());
    assert!(!missing.is_transient());

    let queue_missing = QueueError::QueueNotFound {
        queue_name: "notifications".to_string(),
    };
    assert!(!queue_missing.is_not_found());
}

#[test]
fn test_error_display_includes_context() {
    let error = QueueError::ProviderError {
        provider: "AzureStorage".to_string(),
        code: "InternalError".to_string(),
        message: "boom".to_string(),
    };

    assert_eq!(
        error.to_string(),
        "Provider error (AzureStorage): InternalError - boom"
    );
}
