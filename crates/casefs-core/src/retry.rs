//! Retry disciplines wrapping each backend call.
//!
//! - whole path: run, and on `ENOENT` resolve the full path and run once more
//! - parent only: same, but only the parent is resolved and the final
//!   segment is kept as requested (for operations that create a name)
//! - dual path: resolve a missing source and a missing destination parent up
//!   front, then run exactly once
//!
//! A resolution error replaces the result of the first attempt. No match
//! leaves the first attempt's result in place.

use casefs_config::{log_resolve_debug, log_resolve_info, log_resolve_warn};
use nix::errno::Errno;

use crate::backend::Backend;
use crate::matcher;
use crate::report::MatchReport;
use crate::types::{join_path, split_path, FsResult, RequestContext};

pub(crate) struct Dispatcher<'a, B: Backend> {
    backend: &'a B,
    report: Option<&'a MatchReport>,
}

impl<'a, B: Backend> Dispatcher<'a, B> {
    pub(crate) fn new(backend: &'a B, report: Option<&'a MatchReport>) -> Self {
        Self { backend, report }
    }

    /// First candidate for `path`, or `None` when nothing matches.
    pub(crate) fn resolve(&self, path: &str, ctx: &RequestContext) -> FsResult<Option<String>> {
        let matches = match matcher::match_path(self.backend, path, ctx, self.report) {
            Ok(matches) => matches,
            Err(errno) => {
                log_resolve_warn!("resolution failed", requested = path, errno = errno);
                return Err(errno);
            }
        };

        let Some(first) = matches.first() else {
            log_resolve_debug!("no match", requested = path);
            return Ok(None);
        };
        if matches.len() > 1 {
            log_resolve_warn!(
                "multiple matches, using first",
                requested = path,
                count = matches.len()
            );
        }
        log_resolve_info!("match found", requested = path, matched = first);
        Ok(Some(first.clone()))
    }

    /// Resolve only the parent of `path` and rejoin its final segment.
    ///
    /// The root cannot be mismatched, so a single-segment path never matches.
    pub(crate) fn resolve_parent(
        &self,
        path: &str,
        ctx: &RequestContext,
    ) -> FsResult<Option<String>> {
        let (parent, name) = split_path(path);
        if parent.is_empty() {
            return Ok(None);
        }
        Ok(self
            .resolve(parent, ctx)?
            .map(|matched| join_path(&matched, name)))
    }

    pub(crate) fn whole_path<T>(
        &self,
        path: &str,
        ctx: &RequestContext,
        op: impl FnMut(&str) -> FsResult<T>,
    ) -> FsResult<T> {
        self.retry_with(path, op, |p| self.resolve(p, ctx))
    }

    pub(crate) fn parent_only<T>(
        &self,
        path: &str,
        ctx: &RequestContext,
        op: impl FnMut(&str) -> FsResult<T>,
    ) -> FsResult<T> {
        self.retry_with(path, op, |p| self.resolve_parent(p, ctx))
    }

    pub(crate) fn dual_path<T>(
        &self,
        old: &str,
        new: &str,
        ctx: &RequestContext,
        op: impl FnOnce(&str, &str) -> FsResult<T>,
    ) -> FsResult<T> {
        let old = match self.backend.get_attr(old, ctx) {
            Err(Errno::ENOENT) => self.resolve(old, ctx)?.unwrap_or_else(|| old.to_string()),
            _ => old.to_string(),
        };

        let (new_parent, _) = split_path(new);
        let new = if !new_parent.is_empty()
            && matches!(self.backend.get_attr(new_parent, ctx), Err(Errno::ENOENT))
        {
            self.resolve_parent(new, ctx)?
                .unwrap_or_else(|| new.to_string())
        } else {
            new.to_string()
        };

        op(&old, &new)
    }

    fn retry_with<T>(
        &self,
        path: &str,
        mut op: impl FnMut(&str) -> FsResult<T>,
        resolve: impl FnOnce(&str) -> FsResult<Option<String>>,
    ) -> FsResult<T> {
        match op(path) {
            Err(Errno::ENOENT) => match resolve(path)? {
                Some(matched) => op(&matched),
                None => Err(Errno::ENOENT),
            },
            result => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBackend;

    fn ctx() -> RequestContext {
        RequestContext::default()
    }

    #[test]
    fn test_resolve_parent_of_single_segment_is_none() {
        let backend = MemoryBackend::new();
        backend.add_file("A.txt", b"");
        let dispatcher = Dispatcher::new(&backend, None);
        assert_eq!(dispatcher.resolve_parent("a.txt", &ctx()), Ok(None));
        assert_eq!(backend.calls("open_dir"), 0);
    }

    #[test]
    fn test_resolve_parent_keeps_final_segment() {
        let backend = MemoryBackend::new();
        backend.add_dir("Parent");
        let dispatcher = Dispatcher::new(&backend, None);
        assert_eq!(
            dispatcher.resolve_parent("parent/NewName", &ctx()),
            Ok(Some("Parent/NewName".to_string()))
        );
    }

    #[test]
    fn test_whole_path_second_attempt_is_final() {
        let backend = MemoryBackend::new();
        backend.add_file("A.txt", b"");
        let dispatcher = Dispatcher::new(&backend, None);
        let mut seen = Vec::new();
        let result: FsResult<()> = dispatcher.whole_path("a.txt", &ctx(), |p| {
            seen.push(p.to_string());
            Err(Errno::ENOENT)
        });
        assert_eq!(result, Err(Errno::ENOENT));
        assert_eq!(seen, vec!["a.txt", "A.txt"]);
    }

    #[test]
    fn test_whole_path_other_errors_skip_resolution() {
        let backend = MemoryBackend::new();
        let dispatcher = Dispatcher::new(&backend, None);
        let result: FsResult<()> = dispatcher.whole_path("a.txt", &ctx(), |_| Err(Errno::EACCES));
        assert_eq!(result, Err(Errno::EACCES));
        assert_eq!(backend.calls("open_dir"), 0);
    }

    #[test]
    fn test_resolution_error_replaces_first_result() {
        let backend = MemoryBackend::new();
        backend.add_file("D/a.txt", b"");
        backend.fail("open_dir", "D", Errno::EIO);
        let dispatcher = Dispatcher::new(&backend, None);
        let result: FsResult<()> = dispatcher.whole_path("d/a.txt", &ctx(), |_| Err(Errno::ENOENT));
        assert_eq!(result, Err(Errno::EIO));
    }

    #[test]
    fn test_dual_path_passes_through_when_both_exist() {
        let backend = MemoryBackend::new();
        backend.add_file("Src/a.txt", b"");
        backend.add_dir("Dst");
        let dispatcher = Dispatcher::new(&backend, None);
        let (old, new) = dispatcher
            .dual_path("Src/a.txt", "Dst/b.txt", &ctx(), |o, n| {
                Ok((o.to_string(), n.to_string()))
            })
            .unwrap();
        assert_eq!((old.as_str(), new.as_str()), ("Src/a.txt", "Dst/b.txt"));
        assert_eq!(backend.calls("open_dir"), 0);
    }

    #[test]
    fn test_dual_path_unmatched_paths_are_kept() {
        let backend = MemoryBackend::new();
        let dispatcher = Dispatcher::new(&backend, None);
        let (old, new) = dispatcher
            .dual_path("x/a.txt", "y/b.txt", &ctx(), |o, n| {
                Ok((o.to_string(), n.to_string()))
            })
            .unwrap();
        assert_eq!((old.as_str(), new.as_str()), ("x/a.txt", "y/b.txt"));
    }
}
