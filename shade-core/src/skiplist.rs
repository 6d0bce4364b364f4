//! Cross-process skip list (spec §5).
//!
//! Some packages are deliberately left untransformed across an entire
//! build graph (a package the user marked `-nocfe` for, or one flagged
//! ineligible for cause) and that decision has to be visible to every
//! compile worker, not just the process that made it. The real toolchain
//! runs multiple `compile`/`asm`/`link` subprocesses concurrently against
//! one shared build directory; rather than pull in a file-locking crate,
//! this appends one line per skip via `OpenOptions::append`, which POSIX
//! guarantees is atomic for writes under `PIPE_BUF` -- comfortably true
//! for a package path plus a reason string.

use crate::error::Result;
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

pub struct SkipList {
    path: std::path::PathBuf,
}

impl SkipList {
    pub fn at(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Appends a `package_path\treason` record. Safe to call from multiple
    /// processes sharing the same build directory concurrently.
    pub fn record(&self, package_path: &str, reason: &str) -> Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        writeln!(file, "{package_path}\t{reason}")?;
        Ok(())
    }

    /// Reads back every recorded skip. Driver code calls this once at the
    /// end of a build to print a summary; it is not on the per-package hot
    /// path.
    pub fn entries(&self) -> Result<Vec<(String, String)>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let file = std::fs::File::open(&self.path)?;
        let reader = BufReader::new(file);
        let mut out = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if let Some((path, reason)) = line.split_once('\t') {
                out.push((path.to_string(), reason.to_string()));
            }
        }
        Ok(out)
    }

    pub fn contains(&self, package_path: &str) -> Result<bool> {
        Ok(self.entries()?.iter().any(|(p, _)| p == package_path))
    }
}
