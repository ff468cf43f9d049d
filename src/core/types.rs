use serde::{Deserialize, Serialize};

/// Id of the protocol used when nothing else matches
pub const DEFAULT_PROTOCOL_ID: &str = "defaultProtocol";

/// Pseudo-attribute naming "the Nth prior study" in study matching rules
pub const ABSTRACT_PRIOR_VALUE: &str = "abstractPriorValue";

/// Pseudo-attribute naming a study relative in time to the current one
pub const RELATIVE_TIME: &str = "relativeTime";

/// Unique identifier for a protocol in the store
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProtocolId(pub String);

impl ProtocolId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The id of the fallback protocol
    #[must_use]
    pub fn default_protocol() -> Self {
        Self::new(DEFAULT_PROTOCOL_ID)
    }
}

impl std::fmt::Display for ProtocolId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ProtocolId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Direction of a stage change within the current protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageAction {
    Previous,
    Next,
}

impl StageAction {
    /// Signed offset applied to the stage index
    #[must_use]
    pub fn offset(self) -> isize {
        match self {
            Self::Previous => -1,
            Self::Next => 1,
        }
    }
}

impl std::fmt::Display for StageAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Previous => write!(f, "previous"),
            Self::Next => write!(f, "next"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_action_offset() {
        assert_eq!(StageAction::Previous.offset(), -1);
        assert_eq!(StageAction::Next.offset(), 1);
    }

    #[test]
    fn test_protocol_id_display() {
        assert_eq!(ProtocolId::default_protocol().to_string(), "defaultProtocol");
        assert_eq!(ProtocolId::from("ct_chest").as_str(), "ct_chest");
    }
}
