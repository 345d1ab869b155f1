//! IPNS and DNSLink resolution through a fake gateway.

mod common;

use std::time::Duration;

use chrono::{TimeDelta, Utc};
use ed25519_dalek::SigningKey;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use vfetch_core::testutil::DagBuilder;
use vfetch_core::{ContentPath, ImmutablePath};
use vfetch_gateway::{GatewayError, IpnsName, IpnsRecord, ResolutionError};

use common::{StaticTxt, config, fetcher, start_gateway};

fn signing_key(seed: u8) -> SigningKey {
    SigningKey::from_bytes(&[seed; 32])
}

fn record(key: &SigningKey, value: &ContentPath, sequence: u64) -> Vec<u8> {
    IpnsRecord::create(
        key,
        value,
        sequence,
        Utc::now() + TimeDelta::hours(1),
        Duration::from_secs(60),
    )
    .unwrap()
    .encode()
}

#[tokio::test]
async fn test_ipns_name_resolves_and_fetches() {
    let (gw, url) = start_gateway().await;
    let dag = DagBuilder::new(32, 4).file(b"published through IPNS");
    let target: ContentPath = ImmutablePath::from(dag.root).into();
    gw.serve_car(&target.to_string(), dag.car());

    let key = signing_key(11);
    let name = IpnsName::from_public_key(&key.verifying_key()).unwrap();
    gw.serve_record(&name.to_string(), record(&key, &target, 1));

    let fetcher = fetcher(&config(&url), StaticTxt::default());
    let mut file = fetcher
        .fetch(&name.as_path(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(file.path().root(), &dag.root);
    let mut out = Vec::new();
    file.read_to_end(&mut out).await.unwrap();
    assert_eq!(out, b"published through IPNS");

    let requests = gw.requests.lock().unwrap().clone();
    assert_eq!(requests[0].0, format!("/ipns/{name}"));
    assert_eq!(requests[0].1, "application/vnd.ipfs.ipns-record");
}

#[tokio::test]
async fn test_forged_record_is_rejected() {
    let (gw, url) = start_gateway().await;
    let dag = DagBuilder::new(32, 4).file(b"attacker content");
    let target: ContentPath = ImmutablePath::from(dag.root).into();
    gw.serve_car(&target.to_string(), dag.car());

    let owner = signing_key(1);
    let attacker = signing_key(2);
    let name = IpnsName::from_public_key(&owner.verifying_key()).unwrap();
    gw.serve_record(&name.to_string(), record(&attacker, &target, 1));

    let fetcher = fetcher(&config(&url), StaticTxt::default());
    let err = fetcher
        .resolver()
        .resolve(&name.as_path())
        .await
        .unwrap_err();
    assert!(matches!(err, ResolutionError::RecordInvalid { .. }), "{err}");
    // no path was produced, so no content was requested
    assert_eq!(gw.request_count(), 1);
}

#[tokio::test]
async fn test_oversized_record_is_refused() {
    let (gw, url) = start_gateway().await;
    let key = signing_key(3);
    let name = IpnsName::from_public_key(&key.verifying_key()).unwrap();
    gw.serve_record(&name.to_string(), vec![0u8; 20 * 1024]);

    let fetcher = fetcher(&config(&url), StaticTxt::default());
    let err = fetcher
        .resolver()
        .resolve(&name.as_path())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ResolutionError::Fetch(ref inner) if matches!(**inner, GatewayError::LimitExceeded { .. })
    ));
}

#[tokio::test]
async fn test_dnslink_to_ipns_to_cid() {
    let (gw, url) = start_gateway().await;
    let dag = DagBuilder::new(32, 4).file(b"dnslink then ipns");
    let target: ContentPath = ImmutablePath::from(dag.root).into();

    let key = signing_key(5);
    let name = IpnsName::from_public_key(&key.verifying_key()).unwrap();
    gw.serve_record(&name.to_string(), record(&key, &target, 7));
    let mut dns = StaticTxt::default();
    dns.0.insert(
        "_dnslink.docs.example".into(),
        vec![format!("dnslink=/ipns/{name}/sub")],
    );

    let fetcher = fetcher(&config(&url), dns);
    let resolved = fetcher
        .resolver()
        .resolve(&ContentPath::parse("/ipns/docs.example/page").unwrap())
        .await
        .unwrap();
    assert_eq!(resolved.root(), &dag.root);
    assert_eq!(resolved.segments(), ["sub", "page"]);
}

#[tokio::test]
async fn test_superseded_record_is_rejected() {
    let (gw, url) = start_gateway().await;
    let target: ContentPath = ImmutablePath::from(DagBuilder::new(32, 4).file(b"v").root).into();
    let key = signing_key(8);
    let name = IpnsName::from_public_key(&key.verifying_key()).unwrap();

    let fetcher = fetcher(&config(&url), StaticTxt::default());
    gw.serve_record(&name.to_string(), record(&key, &target, 10));
    fetcher.resolver().resolve(&name.as_path()).await.unwrap();

    // a replayed older record must not roll the name back
    gw.serve_record(&name.to_string(), record(&key, &target, 9));
    assert!(matches!(
        fetcher.resolver().resolve(&name.as_path()).await,
        Err(ResolutionError::RecordInvalid { .. })
    ));
}

#[tokio::test]
async fn test_cancelled_while_record_is_pending() {
    let (gw, url) = start_gateway().await;
    let key = signing_key(9);
    let name = IpnsName::from_public_key(&key.verifying_key()).unwrap();
    let target: ContentPath = ImmutablePath::from(DagBuilder::new(32, 4).file(b"late").root).into();
    gw.serve_record(&name.to_string(), record(&key, &target, 1));
    gw.stall(&format!("/ipns/{name}"));

    let fetcher = fetcher(&config(&url), StaticTxt::default());
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });
    let result = tokio::time::timeout(Duration::from_secs(5), fetcher.fetch(&name.as_path(), &cancel))
        .await
        .expect("fetch kept running after cancellation");
    assert!(matches!(result, Err(GatewayError::Cancelled)));
    // the record never completed, so no content was requested
    assert_eq!(gw.request_count(), 1);
}
