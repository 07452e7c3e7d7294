use super::*;

#[test]
fn config_error_display() {
    let err = RelayError::Config("LARK_APP_ID is required".into());
    assert_eq!(
        err.to_string(),
        "Configuration error: LARK_APP_ID is required"
    );
    assert!(err.is_fatal());
}

#[test]
fn backend_error_display() {
    let err = RelayError::backend("timeout");
    assert_eq!(err.to_string(), "Backend error: timeout");
    assert!(!err.is_fatal());
}

#[test]
fn transport_error_user_message_drops_prefix() {
    let err = RelayError::transport("code 99991663: token invalid");
    assert_eq!(err.user_message(), "code 99991663: token invalid");
}

#[test]
fn persistence_error_display() {
    let err = RelayError::persistence("disk full");
    assert_eq!(err.to_string(), "Persistence error: disk full");
}

#[test]
fn internal_from_anyhow() {
    let err: RelayError = anyhow::anyhow!("boom").into();
    assert!(matches!(err, RelayError::Internal(_)));
    assert_eq!(err.to_string(), "boom");
    assert_eq!(err.user_message(), "boom");
}
