//! Pull orchestrator: drives the codec, store, and registry client through
//! token acquisition, platform selection, manifest/blob persistence, and
//! layer extraction.

use crate::codec::{self, HostPlatform};
use crate::error::Result;
use crate::log::{EventLog, StatusSink};
use crate::reference::{digest_hex, Reference};
use crate::registry::Registry;
use crate::store::Store;

/// Pulls `reference` into `store`: acquires a token, fetches the index,
/// selects the host's platform manifest, persists it, downloads config and
/// layer blobs, records the tag pointer, then extracts layers. Re-entrant:
/// re-running with the same reference is a no-op in the steady state (every
/// write is idempotent). `status` reports human progress; `event` emits the
/// matching structured log events — the two sinks are never conflated.
pub async fn pull(
    store: &Store,
    reference: &Reference,
    status: &impl StatusSink,
    event: &impl EventLog,
) -> Result<()> {
    let registry = Registry::new();
    let registry_repo = reference.registry_repo();

    status.status(&format!("pulling {}", reference.display()), &[]);
    event.info("pull started", &[("image", &reference.display())]);
    let token = registry.get_token(&registry_repo).await?;

    status.step("fetching image index", &[]);
    let index_bytes = registry
        .get_image_index(&registry_repo, &reference.tag, &token)
        .await?;
    let index = codec::decode_index(&index_bytes)?;
    let host = HostPlatform::current();
    let descriptor = codec::select_platform_manifest(&index, host.os, host.arch)?;
    let digest = descriptor.digest.clone();

    status.step("fetching platform manifest", &[]);
    let manifest_bytes = registry
        .get_image_manifest(&registry_repo, &digest, &token)
        .await?;
    let manifest = codec::decode_manifest_auto(&manifest_bytes)?;

    let hex = digest_hex(&digest)?;
    store.save_manifest(&reference.repo, hex, &manifest_bytes)?;

    status.step("downloading config and layers", &[("digest", &digest)]);
    registry
        .download_image_blobs(
            &registry_repo,
            &manifest.config,
            &manifest.layers,
            &store.blobs_dir(),
        )
        .await?;

    store.save_tag(reference, &digest)?;

    status.step("extracting layers", &[]);
    extract_layers(store, &manifest).await?;

    status.success(&format!("pulled {}", reference.display()), &[]);
    event.info("pull finished", &[("image", &reference.display()), ("digest", &digest)]);
    Ok(())
}

/// Concurrently extracts every layer into `layers/<hex>/`, bounded to 4
/// concurrent extractions.
async fn extract_layers(store: &Store, manifest: &crate::codec::Manifest) -> Result<()> {
    use std::sync::Arc;
    use tokio::sync::Semaphore;

    let semaphore = Arc::new(Semaphore::new(4));
    let mut tasks = Vec::with_capacity(manifest.layers.len());
    for layer in &manifest.layers {
        let hex = digest_hex(&layer.digest)?.to_owned();
        let blobs_dir = store.blobs_dir();
        let layers_dir = store.layers_dir();
        let permit = Arc::clone(&semaphore)
            .acquire_owned()
            .await
            .map_err(|e| crate::error::Error::Filesystem(format!("layer extraction semaphore: {e}")))?;
        tasks.push(tokio::task::spawn_blocking(move || {
            let _permit = permit;
            crate::fsutil::ensure_layer_extracted(&blobs_dir, &layers_dir, &hex)
        }));
    }

    let mut first_error = None;
    for task in tasks {
        match task.await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) if first_error.is_none() => first_error = Some(e),
            Err(join_err) if first_error.is_none() => {
                first_error = Some(crate::error::Error::Filesystem(format!(
                    "layer extraction task panicked: {join_err}"
                )));
            }
            _ => {}
        }
    }
    first_error.map_or(Ok(()), Err)
}
