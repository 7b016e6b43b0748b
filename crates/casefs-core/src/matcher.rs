//! Case-insensitive path matching.
//!
//! [`find_matches`] walks a requested path from its final segment upward: it
//! scans the literal parent directory when that exists, and otherwise first
//! resolves the parent itself and scans every candidate parent. A path
//! therefore resolves when each of its segments exists under some letter case.
//!
//! Comparison is plain Unicode lowercasing of both sides; no further case
//! folding is applied.

use casefs_config::log_resolve_debug;
use nix::errno::Errno;

use crate::backend::Backend;
use crate::report::MatchReport;
use crate::types::{join_path, split_path, DirStream, FsResult, RequestContext};

/// Every existing path whose segments case-insensitively equal those of `path`.
///
/// Candidates from one directory appear in the backend's enumeration order;
/// candidate parents are visited in the order they were themselves found.
/// The empty path (the root) yields no candidates.
///
/// Errors other than "not found" while opening or reading a directory abort
/// the whole call, so a partial listing never passes for a complete one.
pub fn find_matches<B: Backend + ?Sized>(
    backend: &B,
    path: &str,
    ctx: &RequestContext,
) -> FsResult<Vec<String>> {
    if path.is_empty() {
        return Ok(Vec::new());
    }

    let (parent, name) = split_path(path);
    let wanted = name.to_lowercase();
    let mut matches = Vec::new();

    match backend.open_dir(parent, ctx) {
        Ok(entries) => scan(parent, entries, &wanted, &mut matches)?,
        Err(Errno::ENOENT) => {
            for candidate in find_matches(backend, parent, ctx)? {
                match backend.open_dir(&candidate, ctx) {
                    Ok(entries) => scan(&candidate, entries, &wanted, &mut matches)?,
                    // Removed since the parent scan.
                    Err(Errno::ENOENT) => continue,
                    Err(e) => return Err(e),
                }
            }
        }
        Err(e) => return Err(e),
    }

    log_resolve_debug!("scanned", path = path, candidates = matches.len());
    Ok(matches)
}

/// [`find_matches`], recording a non-empty result against `path` in `report`.
///
/// Nothing is recorded when resolution fails or finds no candidate.
pub fn match_path<B: Backend + ?Sized>(
    backend: &B,
    path: &str,
    ctx: &RequestContext,
    report: Option<&MatchReport>,
) -> FsResult<Vec<String>> {
    let matches = find_matches(backend, path, ctx)?;
    if let Some(report) = report {
        report.record(path, &matches);
    }
    Ok(matches)
}

fn scan(dir: &str, entries: DirStream, wanted: &str, out: &mut Vec<String>) -> FsResult<()> {
    for entry in entries {
        let entry = entry?;
        // Names that are not valid UTF-8 cannot be addressed by a request path.
        let Some(name) = entry.name.to_str() else {
            continue;
        };
        if name.to_lowercase() == wanted {
            out.push(join_path(dir, name));
        }
    }
    Ok(())
}
