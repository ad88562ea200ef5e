//! Minimal end-to-end demo driver: ingests one signed data item into the
//! tier fabric, then re-assembles a one-item bundle from it. Exercises
//! every crate in the workspace without an HTTP layer.

use std::sync::Arc;

use ed25519_dalek::{Signer, SigningKey};
use eyre::Result;
use futures::{stream, StreamExt};
use sha2::Digest;

use turbo_ans104::tags::encode_tags;
use turbo_ans104::{deep_hash_blobs, id_base64url, BundleHeaderInfo, BundleItemEntry, SignatureType, Tag};
use turbo_bundle_assembler::{assemble, Budgets};
use turbo_ingest::IngestCoordinator;
use turbo_remote_config::{load_defaults_with_env_overrides, RemoteConfig, StaticSource};
use turbo_retry_client::{RetryClient, RetryClientConfig};
use turbo_tier_fabric::{BlobStore, FakeRemoteCache, FsBackup, KvDoc, MemLru, SamplingPolicy, TierFabric};

fn build_signed_item(seed: u8, payload: &[u8], tags: &[Tag]) -> Vec<u8> {
    let signing_key = SigningKey::from_bytes(&[seed; 32]);
    let verifying_key = signing_key.verifying_key();
    let tags_bytes = encode_tags(tags);
    let empty: &[u8] = &[];
    let blobs: Vec<&[u8]> = vec![
        b"dataitem",
        b"1",
        b"2",
        verifying_key.as_bytes(),
        empty,
        empty,
        &tags_bytes,
        payload,
    ];
    let signature = signing_key.sign(&deep_hash_blobs(&blobs)).to_bytes();

    let mut out = Vec::new();
    out.extend_from_slice(&SignatureType::Ed25519.as_u16().to_le_bytes());
    out.extend_from_slice(&signature);
    out.extend_from_slice(verifying_key.as_bytes());
    out.push(0); // no target
    out.push(0); // no anchor
    out.extend_from_slice(&(tags.len() as u64).to_le_bytes());
    out.extend_from_slice(&(tags_bytes.len() as u64).to_le_bytes());
    out.extend_from_slice(&tags_bytes);
    out.extend_from_slice(payload);
    out
}

#[tokio::main]
async fn main() -> Result<()> {
    turbo_telemetry::init(false)?;
    tracing::info!("starting turbo-core demo driver");

    let defaults = load_defaults_with_env_overrides();
    let config = Arc::new(RemoteConfig::init(Arc::new(StaticSource::new(defaults))));
    let sampling = SamplingPolicy {
        mem_lru: config.get("mem_lru_sampling_rate").await,
        remote_cache: config.get("remote_cache_sampling_rate").await,
        fs_backup: config.get("fs_backup_sampling_rate").await,
        kv_doc: config.get("kv_doc_sampling_rate").await,
        blob_store: config.get("blob_store_sampling_rate").await,
    };

    let data_dir = std::env::temp_dir().join(format!("turbo-core-demo-{}", std::process::id()));
    let fabric = Arc::new(TierFabric::new(
        MemLru::new(16 * 1024 * 1024),
        Some(Arc::new(FakeRemoteCache::default())),
        Some(FsBackup::new(data_dir.join("fs-backup"))),
        Some(KvDoc::open(data_dir.join("kv-doc").to_str().unwrap())),
        Some(BlobStore::new(Arc::new(object_store::memory::InMemory::new()))),
        sampling,
    ));

    let coordinator = IngestCoordinator::new(fabric.clone());
    let tags = vec![Tag {
        name: "Content-Type".to_string(),
        value: "text/plain".to_string(),
    }];
    let item_bytes = build_signed_item(42, b"hello from turbo-core", &tags);
    let item_len = item_bytes.len() as u64;
    let signature = &item_bytes[2..66];
    let id_bytes: [u8; 32] = sha2::Sha256::digest(signature).into();
    let id = id_base64url(&id_bytes);

    let stream = stream::iter(vec![Ok::<_, std::io::Error>(bytes::Bytes::from(item_bytes))]);
    let outcome = coordinator.ingest(stream, Some(item_len)).await?;
    tracing::info!(id = %outcome.id, ok = outcome.ok, stores = ?outcome.stores_committed, "ingested item");

    let header = BundleHeaderInfo {
        num_items: 1,
        entries: vec![BundleItemEntry {
            id: id_bytes,
            size: item_len,
            data_offset: 32 + 64,
        }],
    };
    let assembled = assemble(header, fabric, Budgets::default()).await;
    let mut output = assembled.output;
    let mut total = 0u64;
    while let Some(chunk) = output.next().await {
        total += chunk?.len() as u64;
    }
    let attributes = assembled.attributes.await?;
    tracing::info!(bundle_bytes = total, item_id = %id, attributes = ?attributes, "assembled bundle");

    let retry_config = RetryClientConfig::default();
    tracing::info!(max_retries = retry_config.max_retries, "retry client ready");
    let _retry_client = RetryClient::new(retry_config);

    Ok(())
}
