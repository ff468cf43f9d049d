//! Hardening of externally supplied input: prior study identifiers used as
//! file names, oversized catalogs and malformed protocol definitions.

use hp_engine::catalog::store::{CatalogError, ProtocolStore};
use hp_engine::utils::validation::{validate_protocols, validate_uid, ValidationError, MAX_PROTOCOLS};
use hp_engine::{FileStudySource, Protocol, SourceError, StudyMetadataSource, StudySummary, DEFAULT_PROTOCOL_ID};
use tempfile::TempDir;

/// Test directory traversal prevention for prior study identifiers
#[test]
fn test_uid_traversal_prevention() {
    let traversal_attempts = vec![
        "../etc/passwd",
        "..\\windows\\system32",
        "1.2.3/../../secret",
        "1.2/3",
        "..",
    ];

    for attempt in traversal_attempts {
        match validate_uid(attempt) {
            Err(ValidationError::InvalidUid(_)) => {}
            Ok(_) => panic!("Traversal attempt '{attempt}' should have been blocked"),
            Err(e) => panic!("Unexpected error for '{attempt}': {e:?}"),
        }
    }

    // Null bytes and other control characters
    for attempt in ["1.2\0.3", "1.2.3\x01", "1.2\n3"] {
        assert!(
            validate_uid(attempt).is_err(),
            "Control character in '{}' should be blocked",
            attempt.escape_debug()
        );
    }

    assert_eq!(validate_uid("   "), Err(ValidationError::EmptyUid));
    assert_eq!(validate_uid(&"9".repeat(200)), Err(ValidationError::UidTooLong));
}

/// Test that a file source never reads outside its directory
#[tokio::test]
async fn test_file_source_stays_in_directory() {
    let root = TempDir::new().unwrap();
    let studies = root.path().join("studies");
    std::fs::create_dir(&studies).unwrap();
    std::fs::write(
        root.path().join("outside.json"),
        r#"{"StudyInstanceUID": "../outside", "series": []}"#,
    )
    .unwrap();

    let source = FileStudySource::new(&studies);
    let result = source.load_study(&StudySummary::new("../outside")).await;
    assert!(matches!(result, Err(SourceError::InvalidUid(_))));
}

/// Test that oversized catalogs are refused before any protocol is indexed
#[test]
fn test_protocol_count_limit() {
    let mut protocols: Vec<Protocol> = (0..=MAX_PROTOCOLS)
        .map(|i| Protocol::new(format!("p{i}"), "P"))
        .collect();
    protocols.push(Protocol::new(DEFAULT_PROTOCOL_ID, "Default"));

    assert_eq!(
        validate_protocols(&protocols, DEFAULT_PROTOCOL_ID),
        Err(ValidationError::TooManyProtocols(MAX_PROTOCOLS + 2))
    );
}

/// Test malformed protocol definitions are rejected with a parse error
#[test]
fn test_malformed_constraints_rejected() {
    let cases = [
        // Two validators in one constraint
        r#"{"equals": {"value": "CT"}, "contains": {"value": "C"}}"#,
        // Unknown validator
        r#"{"matchesRegex": {"value": ".*"}}"#,
        // Non-numeric bound
        r#"{"greaterThan": {"value": "many"}}"#,
    ];

    for constraint in cases {
        let catalog = format!(
            r#"{{"version": "1.0.0", "created_at": "2024-01-01T00:00:00Z", "protocols": [
                {{"id": "defaultProtocol"}},
                {{"id": "bad", "protocolMatchingRules": [{{"attribute": "Modality", "constraint": {constraint}}}]}}
            ]}}"#
        );
        assert!(
            matches!(ProtocolStore::from_json(&catalog), Err(CatalogError::ParseError(_))),
            "Constraint {constraint} should be rejected"
        );
    }
}

/// Test duplicate and empty protocol ids are rejected
#[test]
fn test_protocol_id_validation() {
    let duplicate = r#"{"version": "1.0.0", "created_at": "2024-01-01T00:00:00Z", "protocols": [
        {"id": "defaultProtocol"}, {"id": "ct"}, {"id": "ct"}
    ]}"#;
    assert!(matches!(
        ProtocolStore::from_json(duplicate),
        Err(CatalogError::Invalid(ValidationError::DuplicateProtocolId(id))) if id == "ct"
    ));

    let empty = r#"{"version": "1.0.0", "created_at": "2024-01-01T00:00:00Z", "protocols": [
        {"id": "defaultProtocol"}, {"id": " "}
    ]}"#;
    assert!(matches!(
        ProtocolStore::from_json(empty),
        Err(CatalogError::Invalid(ValidationError::EmptyProtocolId))
    ));
}
