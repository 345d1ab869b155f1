//! A fake trustless gateway serving canned CARs, raw blocks and IPNS records.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::{StreamExt, stream};
use tokio::net::TcpListener;
use vfetch_core::{Block, Cid};
use vfetch_gateway::{GatewayClient, GatewayConfig, TxtResolver, VerifiedFetcher};

#[derive(Default)]
pub struct FakeGateway {
    cars: Mutex<HashMap<String, Vec<u8>>>,
    blocks: Mutex<HashMap<String, Vec<u8>>>,
    records: Mutex<HashMap<String, Vec<u8>>>,
    errors: Mutex<HashMap<String, (StatusCode, String)>>,
    stalled: Mutex<HashSet<String>>,
    /// `(path and query, accept)` of every request, in arrival order.
    pub requests: Mutex<Vec<(String, String)>>,
}

impl FakeGateway {
    pub fn serve_car(&self, path: &str, car: Vec<u8>) {
        self.cars.lock().unwrap().insert(path.to_string(), car);
    }

    pub fn serve_block(&self, block: &Block) {
        self.serve_raw(block.cid(), block.data().to_vec());
    }

    /// Serves arbitrary bytes as the block `cid`.
    pub fn serve_raw(&self, cid: &Cid, data: Vec<u8>) {
        self.blocks.lock().unwrap().insert(cid.to_string(), data);
    }

    pub fn serve_record(&self, name: &str, record: Vec<u8>) {
        self.records.lock().unwrap().insert(name.to_string(), record);
    }

    pub fn fail(&self, path: &str, status: StatusCode, body: &str) {
        self.errors
            .lock()
            .unwrap()
            .insert(path.to_string(), (status, body.to_string()));
    }

    /// Answers `path` with the first half of its body and then hangs.
    pub fn stall(&self, path: &str) {
        self.stalled.lock().unwrap().insert(path.to_string());
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

async fn handle(State(gw): State<Arc<FakeGateway>>, uri: Uri, headers: HeaderMap) -> Response {
    let path = uri.path().to_string();
    let accept = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let full = match uri.query() {
        Some(query) => format!("{path}?{query}"),
        None => path.clone(),
    };
    gw.requests.lock().unwrap().push((full, accept.clone()));

    if let Some((status, body)) = gw.errors.lock().unwrap().get(&path).cloned() {
        return (status, body).into_response();
    }

    let found = if accept.starts_with("application/vnd.ipld.car") {
        gw.cars.lock().unwrap().get(&path).cloned()
    } else if accept == "application/vnd.ipld.raw" && uri.query() == Some("format=raw") {
        path.strip_prefix("/ipfs/")
            .and_then(|cid| gw.blocks.lock().unwrap().get(cid).cloned())
    } else if accept == "application/vnd.ipfs.ipns-record" {
        path.strip_prefix("/ipns/")
            .and_then(|name| gw.records.lock().unwrap().get(name).cloned())
    } else {
        None
    };
    if gw.stalled.lock().unwrap().contains(&path) {
        let head = found
            .map(|body| Bytes::from(body[..body.len() / 2].to_vec()))
            .unwrap_or_default();
        let body = stream::once(async move { Ok::<_, Infallible>(head) }).chain(stream::pending());
        return (StatusCode::OK, Body::from_stream(body)).into_response();
    }
    match found {
        Some(body) => (StatusCode::OK, body).into_response(),
        None => (StatusCode::NOT_FOUND, "not found").into_response(),
    }
}

/// Starts a fake gateway on a random local port and returns its base URL.
pub async fn start_gateway() -> (Arc<FakeGateway>, String) {
    let gateway = Arc::new(FakeGateway::default());
    let app = Router::new().fallback(handle).with_state(gateway.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (gateway, format!("http://{addr}"))
}

/// Answers TXT lookups from a fixed table.
#[derive(Default)]
pub struct StaticTxt(pub HashMap<String, Vec<String>>);

#[async_trait]
impl TxtResolver for StaticTxt {
    async fn lookup_txt(&self, name: &str) -> Result<Vec<String>, String> {
        Ok(self.0.get(name).cloned().unwrap_or_default())
    }
}

pub fn config(url: &str) -> GatewayConfig {
    GatewayConfig::default().with_gateways([url])
}

pub fn fetcher(config: &GatewayConfig, dns: StaticTxt) -> VerifiedFetcher {
    VerifiedFetcher::with_dns(
        Arc::new(GatewayClient::new(config).unwrap()),
        Arc::new(dns),
    )
}
