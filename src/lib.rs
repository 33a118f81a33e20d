//! indexkit - named, disk-resident full-text indexes on top of
//! [Tantivy](https://github.com/quickwit-oss/tantivy).
//!
//! An [`IndexRegistry`] owns a storage root and hands out one
//! [`IndexEngine`] per index name. Engines accept schema-less
//! [`Document`]s, upsert them by id, delete them in batches, and answer
//! queries through a [`SearchBuilder`] that always sees the latest commit.
//!
//! # Quick start
//!
//! ```no_run
//! use indexkit::{
//!     AnalyzerChain,
//!     DataDir,
//!     EngineSettings,
//!     FieldOptions,
//!     IndexRegistry,
//! };
//!
//! let data_dir = DataDir::resolve(None).unwrap();
//! let settings = EngineSettings::from_data_dir(&data_dir).unwrap();
//! let registry = IndexRegistry::new(settings, AnalyzerChain::new());
//!
//! let posts = registry.get_or_create("posts").unwrap();
//! let mut doc = posts.new_document("post-1");
//! doc.set_text(
//!     "title",
//!     "Hello <b>world</b>",
//!     FieldOptions::STORE | FieldOptions::ANALYZE | FieldOptions::SANITIZE,
//! )
//! .set_integer("views", 42, FieldOptions::STORE);
//! posts.store_documents(&[doc]).unwrap();
//!
//! let hits = posts
//!     .create_search_builder()
//!     .text("title", "world")
//!     .range_i64("views", Some(10), None)
//!     .search()
//!     .unwrap();
//! for hit in &hits {
//!     println!("{} {}", hit.document_id(), hit.get_string("title"));
//! }
//! ```

pub mod analyzer;
pub mod data_dir;
pub mod document;
pub mod error;
pub mod registry;
pub mod schema;
pub mod search;
pub mod search_bit;
pub mod tantivy_index;
pub mod text_util;

pub use analyzer::{AnalyzerChain, AnalyzerSelection, AnalyzerSelector};
pub use data_dir::DataDir;
pub use document::{Document, FieldKind, FieldOptions, FieldValue};
pub use error::{Error, Result};
pub use registry::IndexRegistry;
pub use search::{SearchBuilder, SearchHit};
pub use search_bit::{DocBitSet, SearchBit};
pub use tantivy_index::{
    DeleteReport,
    EngineSettings,
    IndexEngine,
    MAX_CLAUSES,
};
