//! Trust policy storage.
//!
//! The policy is a JSON object mapping identity keys — image content digests
//! and, for compatibility, human tags — to the layer hashes recorded at
//! registration time. The monitor loads it once at startup as a read-only
//! snapshot; `portcullis register` is the only writer.

use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Mode bits that make the policy file writable by group or other.
const GROUP_OTHER_WRITABLE: u32 = 0o022;

/// One registered image.
///
/// All fields are defaulted so entries written by older versions still parse.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyEntry {
    /// SHA-256 hex hashes of the image layers, in manifest order.
    pub layers: Vec<String>,

    /// Content digest of the image (e.g. `sha256:…`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,

    /// Human tag the image was registered under, on digest-keyed entries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

/// Non-fatal conditions observed while loading the policy.
///
/// The monitor logs each advisory once at startup and keeps running; a
/// missing or unreadable policy degrades to an empty map, which blocks
/// everything unless compatibility mode is on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyAdvisory {
    /// No policy file on disk yet.
    Missing,
    /// The policy file exists but could not be read or parsed.
    Corrupt(String),
    /// The policy file is writable by group or other (mode given in octal).
    WeakPermissions(u32),
}

/// Read-only snapshot of the registered images for one monitor run.
#[derive(Debug, Clone, Default)]
pub struct PolicyStore {
    entries: HashMap<String, PolicyEntry>,
}

impl PolicyStore {
    /// Load the policy from disk, degrading to an empty store on failure.
    ///
    /// Never fails: a missing file yields [`PolicyAdvisory::Missing`], an
    /// unreadable or unparsable one yields [`PolicyAdvisory::Corrupt`], and
    /// in both cases the returned store is empty. Loose file permissions add
    /// a [`PolicyAdvisory::WeakPermissions`] alongside whatever else loaded.
    pub fn load(path: &Path) -> (Self, Vec<PolicyAdvisory>) {
        let mut advisories = Vec::new();

        if !path.exists() {
            advisories.push(PolicyAdvisory::Missing);
            return (Self::default(), advisories);
        }

        if let Some(mode) = insecure_mode(path) {
            advisories.push(PolicyAdvisory::WeakPermissions(mode));
        }

        let entries = match read_entries(path) {
            Ok(entries) => entries,
            Err(e) => {
                advisories.push(PolicyAdvisory::Corrupt(e.to_string()));
                HashMap::new()
            }
        };

        (Self { entries }, advisories)
    }

    /// Build a store from in-memory entries.
    pub fn from_entries(entries: HashMap<String, PolicyEntry>) -> Self {
        Self { entries }
    }

    /// Whether the given digest is registered. Exact string equality only.
    pub fn contains_digest(&self, digest: &str) -> bool {
        self.entries.contains_key(digest)
    }

    /// Number of entries (tag and digest keys both count).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store has no entries at all.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries, keyed by digest or tag.
    pub fn entries(&self) -> &HashMap<String, PolicyEntry> {
        &self.entries
    }
}

/// Read and parse the policy file strictly.
fn read_entries(path: &Path) -> anyhow::Result<HashMap<String, PolicyEntry>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read policy at {}", path.display()))?;
    let entries: HashMap<String, PolicyEntry> = serde_json::from_str(&contents)
        .with_context(|| format!("failed to parse policy at {}", path.display()))?;
    Ok(entries)
}

/// Return the permission bits when the file is group/other writable.
#[cfg(unix)]
fn insecure_mode(path: &Path) -> Option<u32> {
    use std::os::unix::fs::PermissionsExt;

    let metadata = std::fs::metadata(path).ok()?;
    let mode = metadata.permissions().mode() & 0o777;
    if mode & GROUP_OTHER_WRITABLE != 0 {
        Some(mode)
    } else {
        None
    }
}

#[cfg(not(unix))]
fn insecure_mode(_path: &Path) -> Option<u32> {
    None
}

// ---------------------------------------------------------------------------
// Registration-side operations
// ---------------------------------------------------------------------------

/// Load the policy for modification by `portcullis register`.
///
/// Unlike [`PolicyStore::load`], a corrupt file is an error here: silently
/// replacing a policy an operator may want to repair would lose every
/// registered image.
///
/// # Errors
///
/// Returns an error if an existing file cannot be read or parsed.
pub fn load_for_update(path: &Path) -> anyhow::Result<HashMap<String, PolicyEntry>> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    read_entries(path)
}

/// Write the policy back to disk as pretty JSON.
///
/// # Errors
///
/// Returns an error if the file cannot be written or serialized.
pub fn save(path: &Path, entries: &HashMap<String, PolicyEntry>) -> anyhow::Result<()> {
    let contents =
        serde_json::to_string_pretty(entries).context("failed to serialize policy")?;
    std::fs::write(path, contents)
        .with_context(|| format!("failed to write policy at {}", path.display()))?;
    Ok(())
}
