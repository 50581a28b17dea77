//! Tests for message types.

use super::*;
use chrono::{Duration, TimeZone, Utc};

#[test]
fn test_queue_name_validation() {
    // Valid names
    assert!(QueueName::new("notifications".to_string()).is_ok());
    assert!(QueueName::new("push-events-2".to_string()).is_ok());
    assert!(QueueName::new("abc".to_string()).is_ok());

    // Invalid names
    assert!(QueueName::new("".to_string()).is_err());
    assert!(QueueName::new("ab".to_string()).is_err());
    assert!(QueueName::new("a".repeat(64)).is_err());
    assert!(QueueName::new("Notifications".to_string()).is_err());
    assert!(QueueName::new("queue_123".to_string()).is_err());
    assert!(QueueName::new("-leading-hyphen".to_string()).is_err());
    assert!(QueueName::new("trailing-hyphen-".to_string()).is_err());
    assert!(QueueName::new("double--hyphen".to_string()).is_err());
}

#[test]
fn test_queue_name_defaults_to_notifications() {
    assert_eq!(QueueName::default().as_str(), "notifications");
}

#[test]
fn test_queue_name_deserialization_validates() {
    let ok: QueueName = serde_json::from_str("\"relay-queue\"").unwrap();
    assert_eq!(ok.as_str(), "relay-queue");

    let err = serde_json::from_str::<QueueName>("\"Bad_Name\"");
    assert!(err.is_err());
}

#[test]
fn test_message_id_generation() {
    let id1 = MessageId::new();
    let id2 = MessageId::new();
    assert_ne!(id1, id2);
    assert!(!id1.as_str().is_empty());
}

#[test]
fn test_message_id_from_str_rejects_empty() {
    assert!("".parse::<MessageId>().is_err());
    let id: MessageId = "7d6b1c4e".parse().unwrap();
    assert_eq!(id.as_str(), "7d6b1c4e");
}

#[test]
fn test_lease_handle_expiry() {
    let future = Timestamp::from_datetime(Utc::now() + Duration::minutes(5));
    let lease = LeaseHandle::new("pop-receipt".to_string(), future);
    assert!(!lease.is_expired());
    assert_eq!(lease.handle(), "pop-receipt");

    let past = Timestamp::from_datetime(Utc::now() - Duration::seconds(1));
    let expired = LeaseHandle::new("old".to_string(), past);
    assert!(expired.is_expired());
}

#[test]
fn test_parse_rfc1123_timestamp() {
    let parsed = Timestamp::parse_rfc1123("Fri, 09 Oct 2009 21:04:30 GMT").unwrap();
    let expected = Utc.with_ymd_and_hms(2009, 10, 9, 21, 4, 30).unwrap();
    assert_eq!(parsed.as_datetime(), expected);

    assert!(Timestamp::parse_rfc1123("not a date").is_err());
}
