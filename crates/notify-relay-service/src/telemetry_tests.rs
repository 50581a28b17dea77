//! Tests for log filter construction.

use super::*;

#[test]
fn test_bare_level_scopes_relay_crates() {
    assert_eq!(
        directives_for("debug"),
        "warn,notify_relay_service=debug,notify_relay_core=debug,notify_queue=debug"
    );
}

#[test]
fn test_quieter_level_applies_to_dependencies() {
    let directives = directives_for("ERROR");

    assert!(directives.starts_with("error,"));
    assert!(directives.contains("notify_queue=error"));
}

#[test]
fn test_directives_pass_through() {
    assert_eq!(
        directives_for(" notify_relay_core=trace,info "),
        "notify_relay_core=trace,info"
    );
}

#[test]
fn test_filter_for_accepts_levels_and_directives() {
    assert!(filter_for("info").is_ok());
    assert!(filter_for("notify_queue=debug,warn").is_ok());
}

#[test]
fn test_filter_for_rejects_unknown_level() {
    assert!(filter_for("notify_queue=loud").is_err());
}
