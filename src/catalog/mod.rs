//! Hanging protocol catalog storage.
//!
//! The catalog holds the known hanging protocols, including the
//! `defaultProtocol` fallback every catalog must contain. An embedded catalog
//! is compiled into the binary, but custom catalogs can also be loaded from
//! JSON files.
//!
//! ## Embedded Catalog
//!
//! - **defaultProtocol**: a single viewport showing the best image
//! - **ctChestCompare**: current and most recent prior CT chest side by side
//! - **mrBrainTwoByTwo**: T1, T2, FLAIR and DWI series of a brain MR
//! - **petCtOneByTwo**: CT next to attenuation corrected PET
//!
//! ## Example
//!
//! ```rust,no_run
//! use hp_engine::ProtocolStore;
//! use hp_engine::core::types::ProtocolId;
//! use std::path::Path;
//!
//! let store = ProtocolStore::load_embedded().unwrap();
//! for protocol in store.protocols() {
//!     println!("{}", protocol.id);
//! }
//!
//! let compare = store.get(&ProtocolId::new("ctChestCompare"));
//!
//! // Export, edit, and load a custom catalog
//! let json = store.to_json().unwrap();
//! let custom = ProtocolStore::load_from_file(Path::new("my_protocols.json")).unwrap();
//! ```

pub mod store;
