//! Image identity resolution.
//!
//! Given a fresh [`ContainerSnapshot`], works out which image the container
//! runs as a `(digest, tag)` pair. Digest resolution is an ordered list of
//! strategies tried in sequence; resolving to nothing at all is a valid
//! outcome for locally built untagged images and never an error.

use crate::runtime::ContainerSnapshot;

/// A digest resolution strategy over a container snapshot.
type DigestStrategy = fn(&ContainerSnapshot) -> Option<String>;

/// Digest sources in preference order: repo digest first, local id second.
const DIGEST_STRATEGIES: &[DigestStrategy] = &[digest_from_repo_digests, digest_from_image_id];

/// Resolved identity of a container's image. Both halves are optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageIdentity {
    /// Content digest (`sha256:…`), when any source yielded one.
    pub digest: Option<String>,
    /// First human tag of the image, when tagged.
    pub tag: Option<String>,
}

impl ImageIdentity {
    /// Resolve the image identity from a container snapshot.
    pub fn resolve(snapshot: &ContainerSnapshot) -> Self {
        let digest = DIGEST_STRATEGIES
            .iter()
            .find_map(|strategy| strategy(snapshot));
        let tag = snapshot.tags.first().cloned();
        Self { digest, tag }
    }

    /// True when neither a digest nor a tag could be resolved.
    pub fn is_unresolved(&self) -> bool {
        self.digest.is_none() && self.tag.is_none()
    }
}

/// Content digest from the first repo digest: the part after the `@`.
fn digest_from_repo_digests(snapshot: &ContainerSnapshot) -> Option<String> {
    snapshot
        .repo_digests
        .first()
        .and_then(|repo_digest| repo_digest.split_once('@'))
        .map(|(_, digest)| digest.to_owned())
}

/// The image's local content id, already digest-shaped.
fn digest_from_image_id(snapshot: &ContainerSnapshot) -> Option<String> {
    snapshot.image_id.clone()
}

/// Extract the content digest from a repo digest string (`name@sha256:…`).
///
/// Shared with image registration, which resolves digests from the image
/// inspection rather than a container snapshot.
pub fn split_repo_digest(repo_digest: &str) -> Option<String> {
    repo_digest
        .split_once('@')
        .map(|(_, digest)| digest.to_owned())
}
