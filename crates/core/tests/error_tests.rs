//! Tests for error types

use simmer_core::{Error, UnsupportedReason};
use std::path::Path;

#[test]
fn test_unsupported_value_error() {
    let error = Error::unsupported("socket", UnsupportedReason::FallbackDisabled);
    assert_eq!(
        error.to_string(),
        "Unsupported value of type 'socket': fallback serialization is disabled"
    );

    let error = Error::unsupported("socket", UnsupportedReason::NotSerializable);
    assert_eq!(
        error.to_string(),
        "Unsupported value of type 'socket': value cannot be serialized to bytes"
    );
}

#[test]
fn test_shape_mismatch_error() {
    let error = Error::shape_mismatch("split", "int");
    assert_eq!(
        error.to_string(),
        "Recipe 'split' maps over a int, expected a list or a map"
    );
}

#[test]
fn test_unknown_token_error() {
    let error = Error::unknown_token("ext:grid");
    assert_eq!(error.to_string(), "Unknown reference token 'ext:grid'");
}

#[test]
fn test_io_error_with_path() {
    let source = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
    let error = Error::io(source, Path::new("/tmp/record.json"), "read");
    assert_eq!(error.to_string(), "I/O read failed: /tmp/record.json");

    let error: Error = std::io::Error::other("boom").into();
    assert_eq!(error.to_string(), "I/O unknown failed");
}

#[test]
fn test_configuration_error() {
    let error = Error::configuration("bad root");
    assert_eq!(error.to_string(), "Configuration error: bad root");
}

#[test]
fn test_diagnostic_codes() {
    use miette::Diagnostic;

    let error = Error::unknown_token("x");
    assert_eq!(
        error.code().map(|c| c.to_string()),
        Some("simmer::core::unknown_token".to_string())
    );
}
