//! Image registration: the one-shot batch side of the trust policy.
//!
//! Exports a local image to a tar archive, computes the SHA-256 of every
//! layer named by the image manifest, resolves the content digest, and writes
//! policy entries keyed by both the image name and the digest so enforcement
//! can prefer digests while staying compatible with tag-keyed entries.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use bollard::Docker;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tokio_stream::StreamExt;
use tracing::info;

use crate::config::RuntimePaths;
use crate::identity::split_repo_digest;
use crate::policy::{self, PolicyEntry};

/// Read buffer size for layer hashing.
const HASH_CHUNK_BYTES: usize = 8192;

/// One entry of an image tar's `manifest.json`.
#[derive(Debug, Deserialize)]
struct ManifestEntry {
    /// Layer archive paths inside the tar, in order.
    #[serde(rename = "Layers")]
    layers: Vec<String>,
}

/// Outcome of a successful registration.
#[derive(Debug)]
pub struct RegisteredImage {
    /// Content digest the image was registered under.
    pub digest: String,
    /// Number of layers hashed.
    pub layer_count: usize,
}

/// Register a local image in the policy file.
///
/// # Errors
///
/// Returns an error when the image does not exist locally, the export or
/// hashing fails, the image has no layers, or the policy cannot be updated.
pub async fn register_image(
    docker: &Docker,
    paths: &RuntimePaths,
    image_name: &str,
) -> anyhow::Result<RegisteredImage> {
    let image = docker
        .inspect_image(image_name)
        .await
        .with_context(|| format!("local image '{image_name}' does not exist"))?;

    let digest = image
        .repo_digests
        .as_deref()
        .and_then(|repo_digests| repo_digests.first())
        .and_then(|repo_digest| split_repo_digest(repo_digest))
        .or(image.id)
        .with_context(|| format!("image '{image_name}' has no digest or id"))?;

    let tar_path = export_to_tar(docker, paths, image_name).await?;
    let hash_result = hash_layers_at(&tar_path);
    // The export is only needed for hashing; keep the root tidy on success.
    if hash_result.is_ok() {
        let _ = std::fs::remove_file(&tar_path);
    }
    let layers = hash_result?;

    let mut entries = policy::load_for_update(&paths.policy_file)?;
    entries.insert(
        image_name.to_owned(),
        PolicyEntry {
            layers: layers.clone(),
            digest: Some(digest.clone()),
            image: None,
        },
    );
    entries.insert(
        digest.clone(),
        PolicyEntry {
            layers: layers.clone(),
            digest: Some(digest.clone()),
            image: Some(image_name.to_owned()),
        },
    );
    policy::save(&paths.policy_file, &entries)?;

    info!(
        image = image_name,
        digest = %digest,
        layers = layers.len(),
        "image registered"
    );

    Ok(RegisteredImage {
        digest,
        layer_count: layers.len(),
    })
}

/// Export the image to a tar file under the portcullis root.
///
/// Kept under the state root rather than the system temp directory so a
/// failed export is easy to find and clean up.
async fn export_to_tar(
    docker: &Docker,
    paths: &RuntimePaths,
    image_name: &str,
) -> anyhow::Result<PathBuf> {
    let file_name = format!("{}.tar", image_name.replace(['/', ':'], "_"));
    let tar_path = paths.root.join(file_name);

    let mut file = std::fs::File::create(&tar_path)
        .with_context(|| format!("failed to create {}", tar_path.display()))?;

    let stream = docker.export_image(image_name);
    tokio::pin!(stream);
    while let Some(chunk) = stream.next().await {
        let bytes = chunk.with_context(|| format!("failed to export image '{image_name}'"))?;
        file.write_all(&bytes)
            .with_context(|| format!("failed to write {}", tar_path.display()))?;
    }
    file.flush()?;

    Ok(tar_path)
}

/// Hash the layers of an exported image tar on disk.
fn hash_layers_at(tar_path: &Path) -> anyhow::Result<Vec<String>> {
    let file = std::fs::File::open(tar_path)
        .with_context(|| format!("failed to open {}", tar_path.display()))?;
    layer_hashes_from_tar(file)
}

/// Compute the SHA-256 hex digest of every layer named by the manifest.
///
/// Single pass over the archive: each entry is hashed as it streams by and
/// `manifest.json` is buffered, then the manifest's layer list selects which
/// hashes count, in manifest order.
///
/// # Errors
///
/// Returns an error when the archive has no manifest, the manifest is empty
/// or names a missing layer file, or the image has no layers at all.
pub fn layer_hashes_from_tar<R: Read>(reader: R) -> anyhow::Result<Vec<String>> {
    let mut archive = tar::Archive::new(reader);
    let mut manifest_raw: Option<Vec<u8>> = None;
    let mut entry_hashes: HashMap<String, String> = HashMap::new();

    for entry in archive.entries().context("unreadable image tar")? {
        let mut entry = entry.context("unreadable image tar entry")?;
        let path = entry
            .path()
            .context("image tar entry has no path")?
            .to_string_lossy()
            .into_owned();

        if path == "manifest.json" {
            let mut buf = Vec::new();
            entry
                .read_to_end(&mut buf)
                .context("failed to read manifest.json")?;
            manifest_raw = Some(buf);
        } else {
            entry_hashes.insert(path.clone(), hash_entry(&mut entry, &path)?);
        }
    }

    let manifest_raw = manifest_raw.context("image tar has no manifest.json")?;
    let manifest: Vec<ManifestEntry> =
        serde_json::from_slice(&manifest_raw).context("failed to parse manifest.json")?;
    let first = manifest.first().context("image manifest is empty")?;

    let mut hashes = Vec::with_capacity(first.layers.len());
    for layer in &first.layers {
        let key = layer.strip_prefix("./").unwrap_or(layer);
        let hash = entry_hashes
            .get(key)
            .with_context(|| format!("layer file missing from image tar: {layer}"))?;
        hashes.push(hash.clone());
    }

    if hashes.is_empty() {
        bail!("image has no layers to hash");
    }
    Ok(hashes)
}

/// Stream one tar entry through SHA-256.
fn hash_entry<R: Read>(entry: &mut R, path: &str) -> anyhow::Result<String> {
    let mut hasher = Sha256::new();
    let mut buf = [0u8; HASH_CHUNK_BYTES];
    loop {
        let read = entry
            .read(&mut buf)
            .with_context(|| format!("failed to read tar entry {path}"))?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}
