//! Tests for `error` module

use super::*;

fn all_variants() -> Vec<Error> {
    vec![
        Error::Config("test".into()),
        Error::QueryFile {
            path: PathBuf::from("/tmp/query.json"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        },
        Error::ConfigFile(serde_yaml::from_str::<u32>("[").unwrap_err()),
        Error::Io(std::io::Error::other("test")),
        Error::Query("test".into()),
        Error::IndexNotFound("test".into()),
        Error::Status {
            status: 500,
            reason: "test".into(),
        },
        Error::Authentication("test".into()),
        Error::ShardFailure {
            successful: 1,
            total: 2,
        },
        Error::Response("test".into()),
        Error::Worker("test".into()),
        Error::Cancelled,
    ]
}

#[test]
fn test_error_codes_are_unique() {
    // Arrange
    let errors = all_variants();

    // Act
    let codes: Vec<&str> = errors.iter().map(Error::code).collect();

    // Assert
    let mut unique_codes = codes.clone();
    unique_codes.sort_unstable();
    unique_codes.dedup();
    assert_eq!(codes.len(), unique_codes.len(), "Error codes must be unique");
    for code in &codes {
        assert!(code.starts_with("REINDEX-"), "Code {code} should start with REINDEX-");
    }
}

#[test]
fn test_error_display_includes_code() {
    let err = Error::IndexNotFound("products".into());

    let display = format!("{err}");

    assert!(display.contains("[REINDEX-006]"));
    assert!(display.contains("products"));
}

#[test]
fn test_exit_codes_follow_taxonomy() {
    assert_eq!(Error::Config("x".into()).exit_code(), 2);
    assert_eq!(Error::Query("x".into()).exit_code(), 3);
    assert_eq!(Error::IndexNotFound("x".into()).exit_code(), 3);
    assert_eq!(Error::Authentication("x".into()).exit_code(), 4);
    assert_eq!(
        Error::Status {
            status: 503,
            reason: "x".into()
        }
        .exit_code(),
        4
    );
    assert_eq!(Error::Worker("x".into()).exit_code(), 1);
    assert_eq!(Error::Cancelled.exit_code(), 130);
}

#[test]
fn test_exit_codes_are_never_success() {
    for err in all_variants() {
        assert_ne!(err.exit_code(), 0, "{err} must not exit with 0");
    }
}

#[test]
fn test_query_file_is_config_kind() {
    let err = Error::QueryFile {
        path: PathBuf::from("q.json"),
        source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
    };

    assert_eq!(err.kind(), ErrorKind::Config);
    assert!(err.to_string().contains("q.json"));
}

#[test]
fn test_retryable_statuses() {
    for status in [429, 502, 503, 504] {
        let err = Error::Status {
            status,
            reason: "busy".into(),
        };
        assert!(err.is_retryable(), "HTTP {status} should be retryable");
    }
    for status in [400, 404, 409, 500] {
        let err = Error::Status {
            status,
            reason: "no".into(),
        };
        assert!(!err.is_retryable(), "HTTP {status} should not be retryable");
    }
}

#[test]
fn test_non_transport_errors_not_retryable() {
    assert!(!Error::Query("bad".into()).is_retryable());
    assert!(!Error::Authentication("denied".into()).is_retryable());
    assert!(!Error::Cancelled.is_retryable());
}
