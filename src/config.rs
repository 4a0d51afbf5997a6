//! Filesystem layout for portcullis state.
//!
//! Everything lives under a single per-user root (`~/.portcullis/` by
//! default): the trust policy, the audit log, and rotated daemon logs. The
//! root is overridable with `PORTCULLIS_HOME` so tests and packaging never
//! touch the real home directory.

use std::path::PathBuf;

use anyhow::Context;

/// Resolved filesystem paths for portcullis state.
#[derive(Debug, Clone)]
pub struct RuntimePaths {
    /// Root state directory (`~/.portcullis/`).
    pub root: PathBuf,

    /// Trust policy file (`policy.json`), JSON map of digest/tag keys.
    pub policy_file: PathBuf,

    /// Append-only audit log (`audit.log`), one JSON record per line.
    pub audit_log: PathBuf,

    /// Directory for rotated daemon logs.
    pub logs_dir: PathBuf,
}

impl RuntimePaths {
    /// Resolve paths under the default root, honoring `PORTCULLIS_HOME`.
    ///
    /// # Errors
    ///
    /// Returns an error if no override is set and the home directory cannot
    /// be determined.
    pub fn resolve() -> anyhow::Result<Self> {
        let root = match std::env::var_os("PORTCULLIS_HOME") {
            Some(dir) => PathBuf::from(dir),
            None => default_root()?,
        };
        Ok(Self::under(root))
    }

    /// Build the path set under an explicit root directory.
    pub fn under(root: PathBuf) -> Self {
        let policy_file = root.join("policy.json");
        let audit_log = root.join("audit.log");
        let logs_dir = root.join("logs");
        Self {
            root,
            policy_file,
            audit_log,
            logs_dir,
        }
    }

    /// Create the root and logs directories if they do not exist.
    ///
    /// The policy file itself is never created here; a missing policy is a
    /// meaningful state the monitor reports on startup.
    ///
    /// # Errors
    ///
    /// Returns an error if a directory cannot be created.
    pub fn ensure_dirs(&self) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.root)
            .with_context(|| format!("failed to create {}", self.root.display()))?;
        std::fs::create_dir_all(&self.logs_dir)
            .with_context(|| format!("failed to create {}", self.logs_dir.display()))?;
        Ok(())
    }
}

/// Resolve the default state root (`~/.portcullis/`).
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
fn default_root() -> anyhow::Result<PathBuf> {
    let home = directories::BaseDirs::new()
        .ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))?;
    Ok(home.home_dir().join(".portcullis"))
}
