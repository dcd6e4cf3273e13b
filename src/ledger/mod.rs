use anyhow::{Context, Result};
use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Append-only record of already-processed source identifiers.
///
/// One identifier per line. The file is read once at startup and every
/// `record` call appends to it, so the dedup set survives restarts. The
/// in-memory set is the source of truth for `contains`; the file only
/// exists to rebuild it.
#[derive(Debug)]
pub struct Ledger {
    path: PathBuf,
    seen: Mutex<HashSet<String>>,
}

impl Ledger {
    /// Open the ledger at `path`, creating an empty one if it does not
    /// exist yet.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let seen = if path.exists() {
            fs_err::read_to_string(&path)
                .context("Failed to read ledger file")?
                .lines()
                .map(|l| l.trim().to_string())
                .filter(|l| !l.is_empty())
                .collect()
        } else {
            if let Some(parent) = path.parent() {
                fs_err::create_dir_all(parent)?;
            }
            fs_err::write(&path, "").context("Failed to create ledger file")?;
            HashSet::new()
        };

        Ok(Self {
            path,
            seen: Mutex::new(seen),
        })
    }

    /// Whether `id` has already been processed.
    pub fn contains(&self, id: &str) -> bool {
        self.seen.lock().expect("ledger lock poisoned").contains(id)
    }

    /// Mark `id` as processed. Appending an identifier twice is a no-op.
    pub fn record(&self, id: &str) -> Result<()> {
        let mut seen = self.seen.lock().expect("ledger lock poisoned");
        if !seen.insert(id.to_string()) {
            return Ok(());
        }

        let mut file = fs_err::OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path)
            .context("Failed to open ledger file for append")?;
        writeln!(file, "{}", id).context("Failed to append to ledger file")?;

        Ok(())
    }

    /// Number of recorded identifiers.
    pub fn len(&self) -> usize {
        self.seen.lock().expect("ledger lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Explicit reset: truncate the file and clear the in-memory set.
    pub fn reset(&self) -> Result<()> {
        let mut seen = self.seen.lock().expect("ledger lock poisoned");
        fs_err::write(&self.path, "").context("Failed to truncate ledger file")?;
        seen.clear();
        Ok(())
    }
}
