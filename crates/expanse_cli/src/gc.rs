//! `expanse gc`: delete unreadable and unreferenced expansion records.

use expanse_cache::Fingerprint;

use crate::project::Project;
use crate::GlobalArgs;

/// Runs `expanse gc`.
///
/// Records that are outdated or corrupt are always removed. When `keep` is
/// non-empty, records whose fingerprint is not listed are removed as well.
pub fn run(
    project: &Project,
    keep: &[String],
    global: &GlobalArgs,
) -> Result<i32, Box<dyn std::error::Error>> {
    let live = parse_fingerprints(keep)?;
    let storage = &project.storage;
    let access = storage.write();

    let mut removed = storage.purge_invalid(&access)?;
    if !live.is_empty() {
        removed += storage.gc(&access, &live)?;
    }

    if !global.quiet {
        eprintln!("     Removed {removed} expansion record(s)");
    }
    Ok(0)
}

fn parse_fingerprints(keep: &[String]) -> Result<Vec<Fingerprint>, String> {
    keep.iter()
        .map(|hex| {
            Fingerprint::from_name_prefix(hex).ok_or_else(|| format!("invalid fingerprint '{hex}'"))
        })
        .collect()
}
