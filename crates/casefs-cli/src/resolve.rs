use std::path::PathBuf;

use anyhow::{Context, Result};
use casefs_config::path::resolve_dir;
use casefs_core::matcher::find_matches;
use casefs_core::{Backend, Errno, FsResult, Passthrough, RequestContext};
use clap::Args;

#[derive(Args, Debug)]
pub struct ResolveArgs {
    /// Case-sensitive directory to search
    #[arg(value_name = "ORIGDIR")]
    origdir: PathBuf,

    /// Path relative to ORIGDIR, in any letter case
    #[arg(value_name = "PATH")]
    path: String,
}

#[derive(Debug, PartialEq, Eq)]
enum Resolution {
    Exact,
    Matched(Vec<String>),
    NotFound,
}

/// Same order the mounted filesystem uses: the literal path, then the
/// case-insensitive candidates.
fn resolve<B: Backend>(backend: &B, path: &str) -> FsResult<Resolution> {
    let ctx = RequestContext::default();
    match backend.get_attr(path, &ctx) {
        Ok(_) => return Ok(Resolution::Exact),
        Err(Errno::ENOENT) => {}
        Err(e) => return Err(e),
    }
    let candidates = find_matches(backend, path, &ctx)?;
    if candidates.is_empty() {
        Ok(Resolution::NotFound)
    } else {
        Ok(Resolution::Matched(candidates))
    }
}

/// Execute the resolve command
pub fn run(args: ResolveArgs) -> Result<()> {
    let root = resolve_dir(&args.origdir)?;
    let backend = Passthrough::new(root);
    let path = args.path.trim_matches('/');

    let resolution = resolve(&backend, path)
        .with_context(|| format!("Failed to resolve {}", path))?;
    match resolution {
        Resolution::Exact => println!("{} (exact)", path),
        Resolution::Matched(candidates) => {
            println!("{} -> {}", path, candidates[0]);
            for other in &candidates[1..] {
                println!("  also matches {}", other);
            }
        }
        Resolution::NotFound => anyhow::bail!("not found: {}", path),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use casefs_core::MemoryBackend;

    #[test]
    fn test_exact_path_skips_matching() {
        let backend = MemoryBackend::new();
        backend.add_file("Docs/a.txt", b"");
        assert_eq!(resolve(&backend, "Docs/a.txt"), Ok(Resolution::Exact));
    }

    #[test]
    fn test_mismatched_case_lists_candidates() {
        let backend = MemoryBackend::new();
        backend.add_file("File.txt", b"");
        backend.add_file("FILE.txt", b"");
        assert_eq!(
            resolve(&backend, "file.txt"),
            Ok(Resolution::Matched(vec![
                "File.txt".to_string(),
                "FILE.txt".to_string()
            ]))
        );
    }

    #[test]
    fn test_missing_path() {
        let backend = MemoryBackend::new();
        backend.add_dir("docs");
        assert_eq!(resolve(&backend, "docs/none"), Ok(Resolution::NotFound));
    }
}
