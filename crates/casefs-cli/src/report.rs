use std::fmt::Write as _;
use std::path::Path;

use anyhow::{Context, Result};
use casefs_core::{MatchMap, MatchReport};

/// Execute the report command
pub fn run(path: &Path) -> Result<()> {
    let map = MatchReport::load(path)
        .with_context(|| format!("Failed to read report: {}", path.display()))?;
    println!("Report: {}", path.display());
    print!("{}", summarize(&map));
    Ok(())
}

/// Human-readable listing: a count line, then each on-disk path followed by
/// the spellings that reached it.
fn summarize(map: &MatchMap) -> String {
    let requests: usize = map.values().map(Vec::len).sum();
    let mut out = format!(
        "{} on-disk paths reached by {} mismatched requests\n",
        map.len(),
        requests
    );
    for (candidate, originals) in map {
        let _ = writeln!(out, "{}", candidate);
        for original in originals {
            let _ = writeln!(out, "  <- {}", original);
        }
    }
    out
}
