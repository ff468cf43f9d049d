//! Core data types for hanging protocol matching.
//!
//! - [`AttributeValue`](attribute::AttributeValue): a loosely typed DICOM attribute value
//! - [`Study`](metadata::Study), [`Series`](metadata::Series), [`Instance`](metadata::Instance):
//!   the metadata hierarchy images are hung from
//! - [`Protocol`](protocol::Protocol), [`Stage`](protocol::Stage),
//!   [`ViewportDefinition`](protocol::ViewportDefinition): declarative protocol definitions
//! - [`MatchingRule`](rule::MatchingRule), [`Constraint`](rule::Constraint): weighted attribute rules
//! - [`ProtocolId`](types::ProtocolId), [`StageAction`](types::StageAction): shared identifiers
//!
//! ## Attribute names
//!
//! Rules name attributes by DICOM keyword (`SeriesDescription`) or by tag in
//! the `xGGGGEEEE` form found in stored protocols (`x0008103e`). Tags are
//! translated to keywords before lookup.

pub mod attribute;
pub mod metadata;
pub mod protocol;
pub mod rule;
pub mod sop_class;
pub mod types;
