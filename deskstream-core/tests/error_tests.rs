//! Integration tests for error handling

use deskstream_core::error::{DeskstreamError, ResultExt};

#[test]
fn test_error_context_chaining() {
    let base_error = DeskstreamError::encoder("sws_getContext failed");
    let with_context = base_error.with_context("Could not obtain image converter");

    let msg = format!("{}", with_context);
    assert!(msg.contains("Could not obtain image converter"));
    assert!(msg.contains("sws_getContext failed"));
}

#[test]
fn test_error_context_preserves_hint() {
    let base_error = DeskstreamError::compressor("x264_encoder_open failed");
    let hint_before = base_error.user_hint();

    let with_context = base_error.with_context("Could not open compressor");
    let hint_after = with_context.user_hint();

    // Hint should be preserved through context
    assert_eq!(hint_before, hint_after);
    assert!(hint_after.is_some());
}

#[test]
fn test_result_ext_context() {
    let result: Result<(), DeskstreamError> = Err(DeskstreamError::capture("GetDC returned null"));
    let with_context = result.context("Could not obtain screen DC");

    let err = with_context.unwrap_err();
    let msg = err.to_string();
    assert!(msg.starts_with("Could not obtain screen DC"));
    assert!(msg.contains("GetDC returned null"));
}

#[test]
fn test_invalidation_classification() {
    assert!(DeskstreamError::invalidated("error 6").is_invalidating());
    assert!(DeskstreamError::invalidated("device lost")
        .with_context("Front buffer")
        .with_context("Capture")
        .is_invalidating());

    assert!(!DeskstreamError::capture("secure desktop").is_invalidating());
    assert!(!DeskstreamError::encoder("scaler").is_invalidating());
}

#[test]
fn test_io_error_conversion() {
    let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "stdout closed");
    let err: DeskstreamError = io.into();
    assert!(matches!(err, DeskstreamError::Io(_)));
    assert!(err.user_hint().is_none());
}

#[test]
fn test_config_and_unsupported_hints() {
    let config = DeskstreamError::config("bad keyint");
    assert!(config.user_hint().unwrap().contains("config"));

    let unsupported = DeskstreamError::Unsupported("hardware capture backend requires Windows".into());
    assert!(unsupported.user_hint().unwrap().contains("null"));
}
