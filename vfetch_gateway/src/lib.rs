//! Trustless retrieval from HTTP gateways.
//!
//! Nothing a gateway returns is trusted: raw blocks and CAR archives are
//! checked block by block against the CIDs they were requested by, and IPNS
//! records are verified against the public key inlined in the name.
//!
//! - [`GatewayClient`]: size-bounded requests to randomly chosen mirrors
//! - [`PathResolver`]: `/ipns/` paths to CID-rooted paths via IPNS and DNSLink
//! - [`ProxyBlockstore`]: a read-only `Blockstore` over raw-block fetches
//! - [`VerifiedFetcher`]: the whole pipeline from content path to file

pub mod client;
pub mod config;
pub mod dnslink;
pub mod error;
pub mod fetcher;
pub mod ipns;
pub mod limit;
pub mod proxy;
pub mod resolver;

pub use client::{ACCEPT_CAR, ACCEPT_IPNS_RECORD, ACCEPT_RAW, ByteStream, GatewayClient};
pub use config::GatewayConfig;
pub use dnslink::{SystemTxtResolver, TxtResolver};
pub use error::{GatewayError, ResolutionError, Result};
pub use fetcher::{FetchedFile, VerifiedFetcher};
pub use ipns::{IpnsName, IpnsRecord};
pub use proxy::ProxyBlockstore;
pub use resolver::PathResolver;
