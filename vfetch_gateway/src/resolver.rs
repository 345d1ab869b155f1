//! Reduction of `/ipns/...` paths to CID-rooted ones.

use std::collections::HashSet;
use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use dashmap::DashMap;
use vfetch_core::{ContentPath, ImmutablePath};

use crate::client::{ACCEPT_IPNS_RECORD, GatewayClient};
use crate::dnslink::{TxtResolver, resolve_dnslink};
use crate::error::ResolutionError;
use crate::ipns::{IpnsName, IpnsRecord, MAX_RECORD_SIZE};

/// Maximum number of name lookups for one path.
pub const MAX_RESOLVE_DEPTH: usize = 32;

/// Resolves IPNS names through gateway-served records, verified locally,
/// and everything else through DNSLink.
pub struct PathResolver {
    client: Arc<GatewayClient>,
    dns: Arc<dyn TxtResolver>,
    /// Highest sequence accepted per name; older records are refused.
    sequences: DashMap<IpnsName, u64>,
}

impl PathResolver {
    pub fn new(client: Arc<GatewayClient>, dns: Arc<dyn TxtResolver>) -> Self {
        Self {
            client,
            dns,
            sequences: DashMap::new(),
        }
    }

    /// Follows names until the path is rooted at a CID. Segments after each
    /// name are appended to what the name resolves to.
    pub async fn resolve(&self, path: &ContentPath) -> Result<ImmutablePath, ResolutionError> {
        let mut current = path.clone();
        let mut visited = HashSet::new();
        while current.is_mutable() {
            if visited.len() >= MAX_RESOLVE_DEPTH || !visited.insert(current.root().to_string()) {
                return Err(ResolutionError::ResolutionCycle {
                    path: path.to_string(),
                });
            }
            let resolved = match IpnsName::parse(current.root()) {
                Ok(name) => self.resolve_ipns(&name).await?,
                Err(_) => resolve_dnslink(self.dns.as_ref(), current.root()).await?,
            };
            tracing::debug!(from = %current, to = %resolved, "resolved name");
            current = resolved.join(current.segments());
        }
        Ok(current.to_immutable()?)
    }

    /// Fetches, verifies and returns the value of `name`'s record.
    pub async fn resolve_ipns(&self, name: &IpnsName) -> Result<ContentPath, ResolutionError> {
        let raw = self
            .client
            .fetch_bytes(&name.as_path(), ACCEPT_IPNS_RECORD, MAX_RECORD_SIZE as u64)
            .await?;
        self.accept_record(name, raw)
    }

    /// Validates a record and returns its value. The sequence floor for
    /// `name` only moves once the whole record has been accepted.
    fn accept_record(&self, name: &IpnsName, raw: Bytes) -> Result<ContentPath, ResolutionError> {
        let reject = |reason: String| {
            tracing::warn!(%name, %reason, "rejecting IPNS record");
            ResolutionError::record_invalid(name, reason)
        };
        let record = IpnsRecord::decode(raw).map_err(|err| reject(err.to_string()))?;
        record
            .validate(name, Utc::now())
            .map_err(|err| reject(err.to_string()))?;
        let value = record.value().map_err(|err| reject(err.to_string()))?;

        let sequence = record.sequence();
        let mut accepted = self.sequences.entry(name.clone()).or_insert(sequence);
        if sequence < *accepted {
            return Err(reject(format!(
                "sequence {sequence} is older than the accepted {}",
                *accepted
            )));
        }
        *accepted = sequence;
        Ok(value)
    }
}
