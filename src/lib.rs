//! Privacy-preserving top-k spatial-keyword search.
//!
//! An IR-tree (an R-tree whose nodes carry textual summaries) answers
//! "top-k documents matching these keywords inside this region, ranked by
//! α·text + (1-α)·spatial relevance". The whole tree lives inside a
//! Ring-ORAM block store, so the untrusted host that keeps the encrypted
//! buckets observes an access trace that is independent of the query.
//!
//! ```no_run
//! use oblisearch::{EngineConfig, IrTree, Mbr, Query};
//!
//! # fn main() -> oblisearch::Result<()> {
//! let mut tree = IrTree::new(EngineConfig::default())?;
//! tree.bulk_insert(vec![
//!     ("coffee shop downtown".to_string(), 37.77, -122.41),
//!     ("library central".to_string(), 37.77, -122.41),
//! ])?;
//!
//! let scope = Mbr::new(vec![37.76, -122.42], vec![37.79, -122.39])?;
//! let query = Query::new("coffee", scope, 10, 0.5)?;
//! for hit in tree.search(&query)? {
//!     println!("doc {} scored {:.3}", hit.doc_id.value(), hit.score);
//! }
//! # Ok(())
//! # }
//! ```

pub mod analysis;
pub mod core;
pub mod index;
pub mod oram;
pub mod scoring;
pub mod spatial;
pub mod storage;
pub mod tree;

pub use crate::core::config::{EngineConfig, OramConfig};
pub use crate::core::error::{Error, ErrorKind, Result};
pub use crate::core::types::{DocId, Document, NodeId, TermId};
pub use crate::spatial::mbr::Mbr;
pub use crate::storage::host::{HostStorage, MemoryHost};
pub use crate::tree::irtree::{IrTree, SearchStats};
pub use crate::tree::query::{Query, SearchHit};
