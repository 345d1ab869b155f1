//! HTTP access to trustless gateways.
//!
//! Every request goes to one of the configured gateways, chosen uniformly at
//! random per call. Bodies are streamed and, when a limit is configured,
//! bounded so that an oversized response fails instead of being truncated.

use std::time::Duration;

use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use rand::Rng;
use reqwest::header::ACCEPT;
use url::Url;
use vfetch_core::{Block, Cid, ContentPath, ImmutablePath};

use crate::config::GatewayConfig;
use crate::error::{GatewayError, Result};
use crate::limit::{LimitedStream, collect};

/// CAR in depth-first order, duplicates included, so that blocks can be
/// verified and materialized as they stream in.
pub const ACCEPT_CAR: &str = "application/vnd.ipld.car;order=dfs;dups=y";
pub const ACCEPT_RAW: &str = "application/vnd.ipld.raw";
pub const ACCEPT_IPNS_RECORD: &str = "application/vnd.ipfs.ipns-record";

/// Most of an error response kept for the error message.
pub const MAX_ERROR_BODY: u64 = 4 << 10;

const POOL_MAX_IDLE_PER_HOST: usize = 100;
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

pub type ByteStream = BoxStream<'static, Result<Bytes>>;

#[derive(Debug, Clone)]
pub struct GatewayClient {
    http: reqwest::Client,
    gateways: Vec<String>,
    limit: Option<u64>,
    validate: bool,
    timeout: Duration,
}

impl GatewayClient {
    pub fn new(config: &GatewayConfig) -> Result<Self> {
        if config.gateways.is_empty() {
            return Err(GatewayError::Config("at least one gateway is required".into()));
        }
        let gateways = config
            .gateways
            .iter()
            .map(|gateway| {
                let url = Url::parse(gateway).map_err(|err| {
                    GatewayError::Config(format!("invalid gateway URL {gateway:?}: {err}"))
                })?;
                if !matches!(url.scheme(), "http" | "https") {
                    return Err(GatewayError::Config(format!(
                        "gateway {gateway:?} must use http or https"
                    )));
                }
                Ok(gateway.trim_end_matches('/').to_string())
            })
            .collect::<Result<Vec<_>>>()?;

        let timeout = Duration::from_secs(config.block_timeout_secs);
        let mut builder = reqwest::Client::builder()
            .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
            .pool_idle_timeout(POOL_IDLE_TIMEOUT)
            .connect_timeout(timeout);
        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        Ok(Self {
            http: builder.build()?,
            gateways,
            limit: config.limit,
            validate: config.validate,
            timeout,
        })
    }

    pub fn gateways(&self) -> &[String] {
        &self.gateways
    }

    pub fn limit(&self) -> Option<u64> {
        self.limit
    }

    /// Whether [`fetch_block`](Self::fetch_block) verifies what it receives.
    pub fn validates(&self) -> bool {
        self.validate
    }

    fn gateway(&self) -> &str {
        if self.gateways.len() == 1 {
            return &self.gateways[0];
        }
        &self.gateways[rand::rng().random_range(0..self.gateways.len())]
    }

    /// A gateway URL for `path`. Every segment is percent-encoded, so names
    /// containing `#`, `?` or spaces reach the gateway intact.
    fn url(&self, path: &ContentPath, query: Option<&str>) -> Result<Url> {
        let base = self.gateway();
        let mut url = Url::parse(base)
            .map_err(|err| GatewayError::Config(format!("invalid URL {base:?}: {err}")))?;
        url.path_segments_mut()
            .map_err(|_| GatewayError::Config(format!("gateway {base:?} cannot take a path")))?
            .pop_if_empty()
            .push(path.namespace().as_str())
            .push(path.root())
            .extend(path.segments());
        url.set_query(query);
        Ok(url)
    }

    async fn get(&self, url: Url, accept: &str, timeout: Option<Duration>) -> Result<reqwest::Response> {
        tracing::debug!(%url, accept, "gateway request");
        let mut request = self.http.get(url.clone()).header(ACCEPT, accept);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let cap = self.limit.map_or(MAX_ERROR_BODY, |limit| limit.min(MAX_ERROR_BODY));
            return Err(GatewayError::Status {
                url: url.to_string(),
                status,
                body: error_body(response, cap).await,
            });
        }
        Ok(response)
    }

    fn body(&self, response: reqwest::Response, max: Option<u64>) -> ByteStream {
        let stream = response.bytes_stream().map_err(GatewayError::from).boxed();
        let max = match (max, self.limit) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        match max {
            Some(limit) => LimitedStream::new(stream, limit).boxed(),
            None => stream,
        }
    }

    /// Streams the response for `path`.
    ///
    /// Archive responses can take arbitrarily long, so only connecting is
    /// bounded by the timeout; callers cancel by dropping the stream.
    pub async fn fetch(&self, path: &ContentPath, accept: &str) -> Result<ByteStream> {
        let response = self.get(self.url(path, None)?, accept, None).await?;
        Ok(self.body(response, None))
    }

    /// Fetches `path` into memory, failing if the body is longer than `max`.
    pub async fn fetch_bytes(&self, path: &ContentPath, accept: &str, max: u64) -> Result<Bytes> {
        let response = self
            .get(self.url(path, None)?, accept, Some(self.timeout))
            .await?;
        collect(self.body(response, Some(max))).await
    }

    /// The bytes a gateway claims to be the block `cid`, unverified.
    pub async fn fetch_raw(&self, cid: &Cid) -> Result<Bytes> {
        let path = ContentPath::from(ImmutablePath::from(*cid));
        let response = self
            .get(self.url(&path, Some("format=raw"))?, ACCEPT_RAW, Some(self.timeout))
            .await?;
        collect(self.body(response, None)).await
    }

    /// Fetches a single block, verified unless validation is disabled.
    pub async fn fetch_block(&self, cid: &Cid) -> Result<Block> {
        self.fetch_block_checked(cid, self.validate).await
    }

    pub(crate) async fn fetch_block_checked(&self, cid: &Cid, validate: bool) -> Result<Block> {
        let data = self.fetch_raw(cid).await?;
        if !validate {
            return Ok(Block::new_unchecked(*cid, data));
        }
        Block::new(*cid, data).map_err(|err| {
            tracing::warn!(%cid, %err, "gateway returned a bad block");
            GatewayError::Core(err)
        })
    }
}

/// Up to `cap` bytes of an error response, read lossily. Whatever follows
/// is never downloaded.
async fn error_body(response: reqwest::Response, cap: u64) -> String {
    let cap = usize::try_from(cap).unwrap_or(usize::MAX);
    let mut body = Vec::new();
    let mut stream = response.bytes_stream();
    while body.len() < cap {
        match stream.next().await {
            Some(Ok(chunk)) => {
                let room = cap - body.len();
                body.extend_from_slice(&chunk[..chunk.len().min(room)]);
            }
            Some(Err(err)) => {
                tracing::debug!(%err, "error response body cut short");
                break;
            }
            None => break,
        }
    }
    String::from_utf8_lossy(&body).trim().to_string()
}
