//! End-to-end behaviour of the operation surface over both backends.

use std::ffi::OsStr;
use std::path::Path;
use std::sync::Arc;

use casefs_config::testing::TestEnvironment;
use casefs_core::{
    Backend, CaseFs, Errno, FileKind, MatchReport, MemoryBackend, OpenFile, Passthrough,
    RequestContext,
};

fn ctx() -> RequestContext {
    RequestContext::default()
}

fn memory_fs(files: &[&str]) -> (CaseFs<MemoryBackend>, Arc<MatchReport>) {
    let backend = MemoryBackend::new();
    for f in files {
        backend.add_file(f, f.as_bytes());
    }
    let report = Arc::new(MatchReport::new("/unused/report.json", false));
    (CaseFs::new(backend, Some(report.clone())), report)
}

/// Every single-path operation, exercised once against `path`.
fn run_single_path_ops(fs: &CaseFs<MemoryBackend>, path: &str) -> Vec<(&'static str, bool)> {
    let c = ctx();
    let name = OsStr::new("user.k");
    vec![
        ("get_attr", fs.get_attr(path, &c).is_ok()),
        ("chmod", fs.chmod(path, 0o600, &c).is_ok()),
        ("chown", fs.chown(path, Some(1), None, &c).is_ok()),
        ("set_times", fs.set_times(path, None, None, &c).is_ok()),
        ("truncate", fs.truncate(path, 3, &c).is_ok()),
        ("access", fs.access(path, libc::R_OK, &c).is_ok()),
        ("set_xattr", fs.set_xattr(path, name, b"v", 0, &c).is_ok()),
        ("get_xattr", fs.get_xattr(path, name, &c).is_ok()),
        ("list_xattr", fs.list_xattr(path, &c).is_ok()),
        ("remove_xattr", fs.remove_xattr(path, name, &c).is_ok()),
        ("open", fs.open(path, libc::O_RDONLY, &c).is_ok()),
        ("statfs", fs.statfs(path, &c).is_ok()),
    ]
}

#[test]
fn test_exact_paths_never_invoke_matcher() {
    let (fs, report) = memory_fs(&["Docs/Report.PDF"]);
    for (op, ok) in run_single_path_ops(&fs, "Docs/Report.PDF") {
        assert!(ok, "{} failed on an exact path", op);
    }
    assert!(fs.open_dir("Docs", &ctx()).is_ok());
    fs.mkdir("Docs/New", 0o755, &ctx()).unwrap();
    fs.rename("Docs/New", "Docs/Newer", &ctx()).unwrap();

    // Only the open_dir call made by the test itself.
    assert_eq!(fs.backend().calls("open_dir"), 1);
    assert!(report.is_empty());
}

#[test]
fn test_mismatched_paths_succeed_on_second_attempt() {
    let (fs, report) = memory_fs(&["Docs/Report.PDF"]);
    for (op, ok) in run_single_path_ops(&fs, "docs/report.pdf") {
        assert!(ok, "{} failed on a case-mismatched path", op);
    }
    assert_eq!(report.snapshot()["Docs/Report.PDF"], vec!["docs/report.pdf"]);
}

#[test]
fn test_nested_mismatch_scenario() {
    let (fs, _report) = memory_fs(&["Docs/Report.PDF"]);
    let file = fs.open("docs/report.pdf", libc::O_RDONLY, &ctx()).unwrap();
    let mut buf = [0u8; 64];
    let n = file.read_at(&mut buf, 0).unwrap();
    assert_eq!(&buf[..n], b"Docs/Report.PDF");
}

#[test]
fn test_unmatched_path_is_not_found_and_unrecorded() {
    let (fs, report) = memory_fs(&["Docs/Report.PDF"]);
    assert_eq!(fs.get_attr("docs/missing.pdf", &ctx()), Err(Errno::ENOENT));
    assert_eq!(fs.unlink("nothing/here", &ctx()), Err(Errno::ENOENT));
    assert_eq!(fs.mkdir("nothing/new", 0o755, &ctx()), Err(Errno::ENOENT));
    assert!(report.is_empty());
}

#[test]
fn test_repeated_request_recorded_once() {
    let (fs, report) = memory_fs(&["Foo.txt"]);
    let first = fs.resolve("foo.txt", &ctx()).unwrap();
    let second = fs.resolve("foo.txt", &ctx()).unwrap();
    assert_eq!(first, second);
    fs.get_attr("foo.txt", &ctx()).unwrap();
    assert_eq!(report.snapshot()["Foo.txt"], vec!["foo.txt"]);
}

#[test]
fn test_at_most_two_backend_calls_per_request() {
    let (fs, _report) = memory_fs(&["A/B/c.txt"]);

    let _ = fs.get_attr("a/b/C.TXT", &ctx());
    assert_eq!(fs.backend().calls("get_attr"), 2);

    // Second attempt also fails: still only two calls.
    fs.backend().fail("truncate", "A/B/c.txt", Errno::ENOENT);
    assert_eq!(fs.truncate("a/b/c.txt", 0, &ctx()), Err(Errno::ENOENT));
    assert_eq!(fs.backend().calls("truncate"), 2);

    let _ = fs.mkdir("a/b/new", 0o755, &ctx());
    assert_eq!(fs.backend().calls("mkdir"), 2);

    let _ = fs.rename("A/b/c.txt", "a/B/d.txt", &ctx());
    assert_eq!(fs.backend().calls("rename"), 1);
}

#[test]
fn test_multiple_candidates_all_recorded_first_used() {
    let backend = MemoryBackend::new();
    backend.add_file("File.txt", b"first");
    backend.add_file("FILE.txt", b"second");
    let report = Arc::new(MatchReport::new("/unused", false));
    let fs = CaseFs::new(backend, Some(report.clone()));

    let file = fs.open("file.txt", libc::O_RDONLY, &ctx()).unwrap();
    let mut buf = [0u8; 16];
    let n = file.read_at(&mut buf, 0).unwrap();
    assert_eq!(&buf[..n], b"first");

    let map = report.snapshot();
    assert_eq!(map.len(), 2);
    assert_eq!(map["File.txt"], vec!["file.txt"]);
    assert_eq!(map["FILE.txt"], vec!["file.txt"]);
}

#[test]
fn test_rename_with_independent_mismatches() {
    let backend = MemoryBackend::new();
    backend.add_file("Src/a.txt", b"payload");
    backend.add_dir("Dst");
    let fs = CaseFs::new(backend, None);

    fs.rename("SRC/a.txt", "dst/b.txt", &ctx()).unwrap();

    assert!(!fs.backend().exists("Src/a.txt"));
    assert_eq!(fs.backend().contents("Dst/b.txt").unwrap(), b"payload");
    assert!(!fs.backend().exists("dst/b.txt"));
}

#[test]
fn test_link_with_mismatched_source() {
    let (fs, _report) = memory_fs(&["Src/a.txt"]);
    fs.backend().add_dir("Dst");
    fs.link("src/A.TXT", "DST/hard.txt", &ctx()).unwrap();
    assert_eq!(fs.backend().contents("Dst/hard.txt").unwrap(), b"Src/a.txt");
}

#[test]
fn test_name_creation_resolves_parent_only() {
    let (fs, _report) = memory_fs(&["Parent/existing"]);
    let c = ctx();

    fs.mkdir("parent/NewDir", 0o755, &c).unwrap();
    fs.mknod("PARENT/NewNode", libc::S_IFREG as u32 | 0o644, 0, &c)
        .unwrap();
    let file = fs.create("parent/NewFile", libc::O_RDWR, 0o644, &c).unwrap();
    file.write_at(b"x", 0).unwrap();
    fs.symlink(Path::new("existing"), "parent/NewLink", &c)
        .unwrap();

    assert_eq!(
        fs.backend().entries("Parent"),
        vec!["existing", "NewDir", "NewNode", "NewFile", "NewLink"]
    );
    assert_eq!(fs.backend().contents("Parent/NewFile").unwrap(), b"x");
}

#[test]
fn test_removal_and_directory_listing_through_mismatch() {
    let (fs, _report) = memory_fs(&["Dir/Sub/a.txt", "Dir/b.txt"]);
    let names: Vec<_> = fs
        .open_dir("dir", &ctx())
        .unwrap()
        .map(|e| e.unwrap())
        .map(|e| (e.name.into_string().unwrap(), e.kind))
        .collect();
    assert_eq!(
        names,
        vec![
            ("Sub".to_string(), FileKind::Directory),
            ("b.txt".to_string(), FileKind::RegularFile)
        ]
    );

    fs.unlink("DIR/SUB/A.TXT", &ctx()).unwrap();
    fs.rmdir("dir/sub", &ctx()).unwrap();
    assert!(!fs.backend().exists("Dir/Sub"));
}

#[test]
fn test_permission_error_during_resolution() {
    let (fs, report) = memory_fs(&["Private/secret.txt"]);
    fs.backend()
        .fail("open_dir", "Private", Errno::EACCES);

    assert_eq!(
        fs.get_attr("Private/SECRET.txt", &ctx()),
        Err(Errno::EACCES)
    );
    assert!(report.is_empty());
    assert_eq!(fs.backend().calls("get_attr"), 1);
}

#[test]
fn test_permission_error_while_resolving_parent_for_creation() {
    let (fs, report) = memory_fs(&["Locked/a.txt"]);
    fs.backend().fail("open_dir", "", Errno::EACCES);
    let c = ctx();

    assert_eq!(fs.mkdir("locked/new", 0o755, &c), Err(Errno::EACCES));
    assert_eq!(
        fs.create("locked/new.txt", libc::O_RDWR, 0o644, &c).err(),
        Some(Errno::EACCES)
    );
    assert_eq!(
        fs.symlink(Path::new("a.txt"), "locked/ln", &c),
        Err(Errno::EACCES)
    );
    assert!(report.is_empty());
    assert!(!fs.backend().exists("Locked/new"));
}

#[test]
fn test_io_error_while_resolving_rename_and_link() {
    let (fs, report) = memory_fs(&["Locked/a.txt", "top.txt"]);
    fs.backend().fail("open_dir", "", Errno::EIO);
    let c = ctx();

    // Destination parent needs resolving.
    assert_eq!(fs.rename("top.txt", "locked/x.txt", &c), Err(Errno::EIO));
    // Source needs resolving.
    assert_eq!(fs.link("locked/a.txt", "b.txt", &c), Err(Errno::EIO));
    assert_eq!(fs.backend().calls("rename"), 0);
    assert_eq!(fs.backend().calls("link"), 0);
    assert!(report.is_empty());
    assert!(fs.backend().exists("top.txt"));
}

#[test]
fn test_dual_path_keeps_literal_source_on_other_stat_errors() {
    let (fs, report) = memory_fs(&["Src/a.txt"]);
    fs.backend().fail("get_attr", "src/a.txt", Errno::EIO);

    assert_eq!(
        fs.rename("src/a.txt", "Src/b.txt", &ctx()),
        Err(Errno::ENOENT)
    );
    assert_eq!(fs.backend().calls("open_dir"), 0);
    assert_eq!(fs.backend().calls("rename"), 1);
    assert!(report.is_empty());
    assert!(fs.backend().exists("Src/a.txt"));
}

#[test]
fn test_other_first_attempt_errors_are_not_retried() {
    let (fs, _report) = memory_fs(&["Full/a.txt"]);
    fs.mkdir("Full/dir", 0o755, &ctx()).unwrap();
    fs.backend().add_file("Full/dir/x", b"");
    assert_eq!(fs.rmdir("Full/dir", &ctx()), Err(Errno::ENOTEMPTY));
    assert_eq!(fs.backend().calls("rmdir"), 1);
    assert_eq!(fs.backend().calls("open_dir"), 0);
}

#[test]
fn test_report_flush_scenario() {
    let env = TestEnvironment::new().unwrap();
    env.create_file("Alpha.txt", b"a").unwrap();
    env.create_file("Beta/Gamma.txt", b"g").unwrap();

    let report = Arc::new(MatchReport::new(&env.report_path, true));
    let fs = CaseFs::new(Passthrough::new(&env.backing_root), Some(report));

    fs.get_attr("alpha.txt", &ctx()).unwrap();
    fs.get_attr("Beta/GAMMA.TXT", &ctx()).unwrap();
    assert!(fs.flush_report().unwrap());

    let persisted = MatchReport::load(&env.report_path).unwrap();
    assert_eq!(persisted.len(), 2);
    assert_eq!(persisted["Alpha.txt"], vec!["alpha.txt"]);
    assert_eq!(persisted["Beta/Gamma.txt"], vec!["Beta/GAMMA.TXT"]);
}

#[test]
fn test_passthrough_rename_scenario() {
    let env = TestEnvironment::new().unwrap();
    env.create_file("Src/a.txt", b"moved").unwrap();
    env.create_dir("Dst").unwrap();

    let fs = CaseFs::new(Passthrough::new(&env.backing_root), None);
    fs.rename("SRC/a.txt", "dst/b.txt", &ctx()).unwrap();

    assert!(!env.exists("Src/a.txt"));
    assert_eq!(
        std::fs::read(env.backing_root.join("Dst/b.txt")).unwrap(),
        b"moved"
    );
}

#[test]
fn test_passthrough_create_and_read_through_mismatched_parent() {
    let env = TestEnvironment::new().unwrap();
    env.create_dir("Out").unwrap();
    let fs = CaseFs::new(Passthrough::new(&env.backing_root), None);

    let file = fs
        .create("out/log.txt", libc::O_WRONLY | libc::O_EXCL, 0o644, &ctx())
        .unwrap();
    OpenFile::write_at(&file, b"line\n", 0).unwrap();
    drop(file);

    assert!(env.exists("Out/log.txt"));
    let attr = fs.get_attr("OUT/LOG.TXT", &ctx()).unwrap();
    assert_eq!(attr.size, 5);
    assert_eq!(attr.kind, FileKind::RegularFile);
}

#[test]
fn test_concurrent_resolutions_record_once() {
    let (fs, report) = memory_fs(&["Shared/Data.bin"]);
    let fs = Arc::new(fs);
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let fs = Arc::clone(&fs);
            std::thread::spawn(move || {
                let path = if i % 2 == 0 {
                    "shared/data.bin"
                } else {
                    "SHARED/DATA.BIN"
                };
                fs.get_attr(path, &RequestContext::default()).is_ok()
            })
        })
        .collect();
    for h in handles {
        assert!(h.join().unwrap());
    }
    let map = report.snapshot();
    let mut requesters = map["Shared/Data.bin"].clone();
    requesters.sort();
    assert_eq!(requesters, vec!["SHARED/DATA.BIN", "shared/data.bin"]);
}

#[test]
fn test_generic_over_backend() {
    fn exists<B: Backend>(fs: &CaseFs<B>, path: &str) -> bool {
        fs.get_attr(path, &RequestContext::default()).is_ok()
    }
    let (fs, _) = memory_fs(&["X/y"]);
    assert!(exists(&fs, "x/Y"));
    assert!(!exists(&fs, "x/z"));
}
