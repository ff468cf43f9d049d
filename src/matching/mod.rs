//! Hanging protocol matching.
//!
//! - [`constraint`]: evaluation of one rule against one attribute value
//! - [`matcher`]: [`HpMatcher`] scoring an entity against a rule set
//! - [`sorting`]: ranking of image candidates
//! - [`images`]: study → series → instance matching for one viewport
//! - [`priors`]: loading of prior studies referenced by `abstractPriorValue`
//! - [`engine`]: [`ProtocolEngine`], the protocol/stage state machine
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::collections::HashMap;
//! use hp_engine::{EngineOptions, InMemoryStudySource, ProtocolEngine, ProtocolStore, Study};
//!
//! let store = ProtocolStore::load_embedded().unwrap();
//! let studies: Vec<Study> = serde_json::from_str("[]").unwrap();
//!
//! let options = EngineOptions::default()
//!     .with_set_viewport_specific_data(|index, data| println!("{index}: {:?}", data.assignment));
//! let mut engine = ProtocolEngine::new(store, studies, HashMap::new(), InMemoryStudySource::new(), options)
//!     .unwrap();
//!
//! println!("Hung {}", engine.protocol().display_name());
//! engine.next_protocol_stage();
//! ```

pub mod constraint;
pub mod engine;
pub mod images;
pub mod matcher;
pub mod priors;
pub mod sorting;

pub use engine::{EngineConfig, EngineError, EngineOptions, ProtocolEngine};
pub use matcher::{HpMatcher, MatchDetails};
