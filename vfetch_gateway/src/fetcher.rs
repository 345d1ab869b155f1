//! End-to-end verified retrieval: resolve, fetch a CAR, verify every block
//! into a block store, then read the file out of that store.

use std::io;
use std::path::Path;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use futures::TryStreamExt;
use tokio::io::{AsyncRead, AsyncWriteExt, ReadBuf};
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;
use vfetch_core::dag::{UnixfsFile, open_file, resolve_to_terminal_node};
use vfetch_core::{Blockstore, Cid, ContentPath, ImmutablePath, IngestSummary, LocalBlockstore, ingest};
use vfetch_store_memory::MemoryStore;

use crate::client::{ACCEPT_CAR, ByteStream, GatewayClient};
use crate::config::GatewayConfig;
use crate::dnslink::{SystemTxtResolver, TxtResolver};
use crate::error::{GatewayError, Result};
use crate::resolver::PathResolver;

/// A verified file ready to be read.
pub struct FetchedFile {
    path: ImmutablePath,
    summary: IngestSummary,
    file: UnixfsFile,
}

impl FetchedFile {
    /// The immutable path the request resolved to.
    pub fn path(&self) -> &ImmutablePath {
        &self.path
    }

    pub fn summary(&self) -> &IngestSummary {
        &self.summary
    }

    pub fn cid(&self) -> &Cid {
        self.file.cid()
    }

    pub fn size(&self) -> u64 {
        self.file.size()
    }

    pub fn into_inner(self) -> UnixfsFile {
        self.file
    }
}

impl AsyncRead for FetchedFile {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().file).poll_read(cx, buf)
    }
}

pub struct VerifiedFetcher {
    client: Arc<GatewayClient>,
    resolver: PathResolver,
}

impl VerifiedFetcher {
    /// A fetcher using the system's DNS configuration for DNSLink.
    pub fn new(config: &GatewayConfig) -> Result<Self> {
        let client = Arc::new(GatewayClient::new(config)?);
        let dns = Arc::new(SystemTxtResolver::new()?);
        Ok(Self::with_dns(client, dns))
    }

    pub fn with_dns(client: Arc<GatewayClient>, dns: Arc<dyn TxtResolver>) -> Self {
        Self {
            resolver: PathResolver::new(client.clone(), dns),
            client,
        }
    }

    pub fn client(&self) -> &GatewayClient {
        &self.client
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    /// Fetches `path` into a block store private to this request.
    ///
    /// If the fetch fails, blocks verified before the failure go away with
    /// that store; use [`fetch_into`](Self::fetch_into) to keep them.
    pub async fn fetch(&self, path: &ContentPath, cancel: &CancellationToken) -> Result<FetchedFile> {
        let store = Arc::new(LocalBlockstore::new(Arc::new(MemoryStore::new())));
        self.fetch_into(path, store, cancel).await
    }

    /// Fetches `path` into `store`. Verified blocks remain in `store` even
    /// when a later block fails verification.
    pub async fn fetch_into(
        &self,
        path: &ContentPath,
        store: Arc<dyn Blockstore>,
        cancel: &CancellationToken,
    ) -> Result<FetchedFile> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(GatewayError::Cancelled),
            result = self.fetch_verified(path, store) => result,
        }
    }

    async fn fetch_verified(&self, path: &ContentPath, store: Arc<dyn Blockstore>) -> Result<FetchedFile> {
        let resolved = self.resolver.resolve(path).await?;
        let body = self
            .client
            .fetch(&resolved.clone().into(), ACCEPT_CAR)
            .await?;
        let summary = ingest_body(body, store.as_ref()).await?;

        let node = resolve_to_terminal_node(store.as_ref(), resolved.root(), resolved.segments()).await?;
        let file = open_file(node, store)?;
        tracing::info!(
            path = %resolved,
            size = file.size(),
            blocks = summary.blocks,
            "fetched verified file"
        );
        Ok(FetchedFile {
            path: resolved,
            summary,
            file,
        })
    }

    /// Fetches `path` and writes the file to `output`, returning the number
    /// of bytes written.
    pub async fn fetch_to_path(
        &self,
        path: &ContentPath,
        output: &Path,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        let mut file = self.fetch(path, cancel).await?;
        let mut out = tokio::fs::File::create(output)
            .await
            .map_err(vfetch_core::Error::from)?;
        let written = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(GatewayError::Cancelled),
            copied = tokio::io::copy(&mut file, &mut out) => copied.map_err(vfetch_core::Error::from)?,
        };
        out.flush().await.map_err(vfetch_core::Error::from)?;
        tracing::info!(output = %output.display(), bytes = written, "wrote file");
        Ok(written)
    }
}

/// Verifies a CAR body into `store`. The archive reader only sees transport
/// failures as broken framing, so the first one is kept aside and reported
/// in place of the parse error it caused.
async fn ingest_body(body: ByteStream, store: &dyn Blockstore) -> Result<IngestSummary> {
    let failure: Arc<Mutex<Option<GatewayError>>> = Arc::default();
    let slot = failure.clone();
    let body = body.map_err(move |err| {
        let io = io::Error::other(err.to_string());
        slot.lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get_or_insert(err);
        io
    });
    match ingest(StreamReader::new(body), store).await {
        Ok(summary) => Ok(summary),
        Err(err) => {
            let transport = failure
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .take();
            Err(transport.unwrap_or(GatewayError::Core(err)))
        }
    }
}
