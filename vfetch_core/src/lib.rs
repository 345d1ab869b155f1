//! Core types for trustless, verified content retrieval.
//!
//! This crate defines everything needed to check content received from an
//! untrusted source against the address it was requested by:
//!
//! ## Content addressing
//!
//! - CIDs and multihashes from the `cid` and `multihash` crates, with the
//!   digest check blocks must pass (`cid`)
//! - Content paths rooted at a CID or a mutable name (`path::ContentPath`)
//! - Verified blocks (`block::Block`, `block::verify_block`)
//!
//! ## Storage
//!
//! - The abstract key→bytes persistence contract (`Store`)
//! - The CID-keyed, write-once `Blockstore` contract and its `LocalBlockstore`
//!   implementation on top of any `Store`
//!
//! ## Retrieval pipeline
//!
//! - CARv1/CARv2 archive reading over `iroh-car` (`car`) and verified
//!   ingestion (`ingest`)
//! - DAG-PB / UnixFS interpretation and lazy file materialization (`dag`)
//!
//! Nothing in this crate performs network I/O; gateways, name resolution and
//! block exchange live in `vfetch_gateway` and `vfetch_bitswap`.

pub mod block;
pub mod blockstore;
pub mod car;
pub mod cid;
pub mod dag;
pub mod error;
pub mod ingest;
pub mod path;
pub mod store;

// Test utilities (behind feature flag)
#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

pub use block::{Block, verify_block};
pub use blockstore::{Blockstore, LocalBlockstore};
pub use crate::cid::{Cid, Multihash};
pub use error::{Error, Result};
pub use ingest::{IngestSummary, ingest};
pub use path::{ContentPath, ImmutablePath, Namespace};
pub use store::{Store, StoreFeatures, StoreResult};
