//! Local copy verification

use anyhow::{Context, Result};
use listguard_common::StorePath;
use listguard_meta_store::Metastore;
use std::collections::HashSet;
use std::path::Path;
use std::slice;

/// Outcome of comparing a local directory against tracked children
#[derive(Debug, Default)]
pub struct VerifyReport {
    /// Live records under the store path
    pub tracked: usize,
    /// Tracked records with a local entry of the same name
    pub present: usize,
    pub missing: Vec<StorePath>,
}

/// Check that every live child of `path` has a same-named entry in `local_dir`
pub async fn verify(
    metastore: &dyn Metastore,
    local_dir: &Path,
    path: &StorePath,
) -> Result<VerifyReport> {
    let local: HashSet<String> = std::fs::read_dir(local_dir)
        .with_context(|| format!("reading {}", local_dir.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();

    let mut report = VerifyReport::default();
    for record in metastore.list(slice::from_ref(path)).await? {
        if record.deleted {
            continue;
        }
        report.tracked += 1;
        if local.contains(record.path.name()) {
            report.present += 1;
        } else {
            report.missing.push(record.path);
        }
    }
    Ok(report)
}
