//! # hp-engine
//!
//! A hanging protocol engine for medical image viewers.
//!
//! A hanging protocol describes how a viewer should arrange images on screen:
//! which layout to use, and which study, series and image goes into each
//! viewport. Protocols carry weighted attribute rules; the engine scores every
//! protocol against the loaded studies, hangs the best one, and fills each
//! viewport with the best unclaimed image.
//!
//! ## Features
//!
//! - **Weighted rules**: equality, substring, numeric and range validators, optionally required
//! - **Prior comparison**: viewports can ask for the Nth prior study, which is loaded on demand
//! - **Stages**: protocols step through several layouts
//! - **Deterministic hanging**: ties break by study recency, instance number and series number
//! - **Custom attributes**: host-computed values usable in any rule
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::collections::HashMap;
//! use hp_engine::{EngineOptions, InMemoryStudySource, ProtocolEngine, ProtocolStore, Study};
//!
//! let store = ProtocolStore::load_embedded().unwrap();
//! let study: Study = serde_json::from_str(r#"{"StudyInstanceUID": "1.2.3", "series": []}"#).unwrap();
//!
//! let mut engine = ProtocolEngine::new(
//!     store,
//!     vec![study],
//!     HashMap::new(),
//!     InMemoryStudySource::new(),
//!     EngineOptions::default().with_set_layout(|layout| println!("{layout:?}")),
//! )
//! .unwrap();
//!
//! if let Some(update) = engine.update_viewports(None) {
//!     for viewport in update.viewports {
//!         println!("{}: {:?}", viewport.viewport_index, viewport.assignment);
//!     }
//! }
//! ```
//!
//! ## Modules
//!
//! - [`catalog`]: Protocol storage
//! - [`core`]: Study metadata, protocol definitions and rules
//! - [`matching`]: Rule evaluation, image matching and the protocol engine
//! - [`cli`]: Command-line interface implementation
//! - [`utils`]: DICOM date/time parsing and validation

pub mod catalog;
pub mod cli;
pub mod core;
pub mod matching;
pub mod utils;

// Re-export commonly used types for convenience
pub use catalog::store::ProtocolStore;
pub use core::attribute::AttributeValue;
pub use core::metadata::{Instance, Series, Study, StudySummary};
pub use core::protocol::{Protocol, Stage, ViewportDefinition, ViewportStructure};
pub use core::rule::{Constraint, MatchingRule};
pub use core::types::*;
pub use matching::engine::{EngineConfig, EngineError, EngineOptions, ProtocolEngine, ViewportUpdate};
pub use matching::matcher::{HpMatcher, MatchDetails};
pub use matching::priors::{FileStudySource, InMemoryStudySource, SourceError, StudyMetadataSource};
