//! Centralized validation of protocol catalogs and externally supplied identifiers.

use std::collections::HashSet;

use crate::core::protocol::Protocol;

/// Longest value a DICOM `UI` element may hold
pub const MAX_UID_LENGTH: usize = 64;

/// Maximum number of protocols accepted in one catalog (DOS protection)
pub const MAX_PROTOCOLS: usize = 10_000;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Empty study identifier")]
    EmptyUid,
    #[error("Study identifier too long: exceeds {MAX_UID_LENGTH} characters")]
    UidTooLong,
    #[error("Invalid study identifier '{0}': contains path separators or control characters")]
    InvalidUid(String),
    #[error("Protocol with an empty id")]
    EmptyProtocolId,
    #[error("Duplicate protocol id '{0}'")]
    DuplicateProtocolId(String),
    #[error("Catalog has no '{0}' protocol")]
    MissingDefaultProtocol(String),
    #[error("Too many protocols: {0} exceeds maximum of {MAX_PROTOCOLS}")]
    TooManyProtocols(usize),
}

/// Check that a study identifier can be used as a file stem.
///
/// UIDs usually consist of digits and dots, but hosts use other identifiers
/// too; anything that cannot escape the directory is accepted.
///
/// # Errors
///
/// Returns `ValidationError::EmptyUid`, `ValidationError::UidTooLong` or
/// `ValidationError::InvalidUid` for identifiers that are empty, too long, or
/// contain traversal sequences, separators or control characters.
pub fn validate_uid(uid: &str) -> Result<&str, ValidationError> {
    if uid.trim().is_empty() {
        return Err(ValidationError::EmptyUid);
    }
    if uid.len() > MAX_UID_LENGTH {
        return Err(ValidationError::UidTooLong);
    }
    if uid.contains("..") || uid.contains('/') || uid.contains('\\') || uid.chars().any(char::is_control) {
        return Err(ValidationError::InvalidUid(uid.to_string()));
    }
    Ok(uid)
}

/// Validate a protocol catalog.
///
/// Hard errors make the catalog unusable; structural oddities that only make
/// `update_viewports` skip a stage are returned as warnings.
///
/// # Errors
///
/// Returns an error for an empty or duplicate protocol id, a missing default
/// protocol, or an oversized catalog.
pub fn validate_protocols(protocols: &[Protocol], default_protocol_id: &str) -> Result<Vec<String>, ValidationError> {
    if protocols.len() > MAX_PROTOCOLS {
        return Err(ValidationError::TooManyProtocols(protocols.len()));
    }

    let mut seen = HashSet::new();
    for protocol in protocols {
        let id = protocol.id.as_str();
        if id.trim().is_empty() {
            return Err(ValidationError::EmptyProtocolId);
        }
        if !seen.insert(id) {
            return Err(ValidationError::DuplicateProtocolId(id.to_string()));
        }
    }

    if !seen.contains(default_protocol_id) {
        return Err(ValidationError::MissingDefaultProtocol(default_protocol_id.to_string()));
    }

    Ok(protocols.iter().flat_map(structure_warnings).collect())
}

fn structure_warnings(protocol: &Protocol) -> Vec<String> {
    let mut warnings = Vec::new();
    let id = protocol.id.as_str();

    if protocol.stages.is_empty() {
        warnings.push(format!("Protocol '{id}' has no stages"));
    }

    for (index, stage) in protocol.stages.iter().enumerate() {
        let stage_name = stage.name.as_deref().unwrap_or("unnamed");
        let Some(structure) = &stage.viewport_structure else {
            warnings.push(format!("Protocol '{id}' stage {index} ({stage_name}) has no viewport structure"));
            continue;
        };

        if structure.layout_template_name().is_none() {
            warnings.push(format!(
                "Protocol '{id}' stage {index} ({stage_name}) has unknown layout type {:?}",
                structure.layout_type.as_deref().unwrap_or_default()
            ));
        }
        if stage.viewports.is_empty() {
            warnings.push(format!("Protocol '{id}' stage {index} ({stage_name}) has no viewports"));
        }
        if let Some(capacity) = structure.num_viewports() {
            if stage.viewports.len() > capacity as usize {
                warnings.push(format!(
                    "Protocol '{id}' stage {index} ({stage_name}) defines {} viewports but the layout holds {capacity}",
                    stage.viewports.len()
                ));
            }
        }
    }

    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::protocol::{Stage, ViewportDefinition, ViewportStructure};

    #[test]
    fn test_validate_uid() {
        assert_eq!(validate_uid("1.2.840.113619.2.55"), Ok("1.2.840.113619.2.55"));
        assert_eq!(validate_uid("prior-study_01"), Ok("prior-study_01"));
        assert_eq!(validate_uid(""), Err(ValidationError::EmptyUid));
        assert_eq!(validate_uid(&"1".repeat(65)), Err(ValidationError::UidTooLong));
        assert!(matches!(validate_uid("../etc/passwd"), Err(ValidationError::InvalidUid(_))));
        assert!(matches!(validate_uid("a\\b"), Err(ValidationError::InvalidUid(_))));
        assert!(matches!(validate_uid("a\0b"), Err(ValidationError::InvalidUid(_))));
    }

    fn one_by_one(id: &str) -> Protocol {
        Protocol::new(id, id).with_stage(
            Stage::new("oneByOne", ViewportStructure::grid(1, 1)).with_viewports(vec![ViewportDefinition::new()]),
        )
    }

    #[test]
    fn test_validate_protocols() {
        let protocols = vec![one_by_one("defaultProtocol"), one_by_one("ct")];
        assert_eq!(validate_protocols(&protocols, "defaultProtocol"), Ok(vec![]));

        let duplicate = vec![one_by_one("defaultProtocol"), one_by_one("ct"), one_by_one("ct")];
        assert_eq!(
            validate_protocols(&duplicate, "defaultProtocol"),
            Err(ValidationError::DuplicateProtocolId("ct".to_string()))
        );

        assert_eq!(
            validate_protocols(&[one_by_one("ct")], "defaultProtocol"),
            Err(ValidationError::MissingDefaultProtocol("defaultProtocol".to_string()))
        );
    }

    #[test]
    fn test_structure_warnings() {
        let crowded = Protocol::new("defaultProtocol", "Default").with_stage(
            Stage::new("oneByOne", ViewportStructure::grid(1, 1))
                .with_viewports(vec![ViewportDefinition::new(), ViewportDefinition::new()]),
        );
        let bare = Protocol::new("bare", "Bare");

        let warnings = validate_protocols(&[crowded, bare], "defaultProtocol").unwrap();
        assert_eq!(warnings.len(), 2);
        assert!(warnings[0].contains("defines 2 viewports"));
        assert!(warnings[1].contains("has no stages"));
    }
}
