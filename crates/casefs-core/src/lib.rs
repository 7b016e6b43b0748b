//! # casefs-core
//!
//! Case-insensitive fallback resolution in front of a case-sensitive backing store.
//!
//! - [`Backend`] is the capability the resolver needs from storage: exact-path
//!   operations plus directory enumeration.
//! - [`matcher`] turns a requested path into every existing path that differs
//!   from it only in letter case.
//! - [`MatchReport`] records which requested paths were satisfied by which
//!   on-disk paths, and persists that mapping as JSON on shutdown.
//! - [`CaseFs`] is the operation surface: each filesystem operation runs the
//!   exact path first and falls back to a resolved path exactly once.
//!
//! ```ignore
//! use casefs_core::{CaseFs, Passthrough, RequestContext};
//!
//! let fs = CaseFs::new(Passthrough::new("/srv/data"), None);
//! // `/srv/data/Docs/Report.PDF` exists
//! let attr = fs.get_attr("docs/report.pdf", &RequestContext::default())?;
//! ```

pub mod backend;
pub mod matcher;
pub mod memory;
pub mod passthrough;
pub mod report;
mod retry;
mod surface;
pub mod types;

pub use backend::{Backend, OpenFile};
pub use memory::MemoryBackend;
pub use nix::errno::Errno;
pub use passthrough::Passthrough;
pub use report::{MatchMap, MatchReport, ReportError};
pub use surface::CaseFs;
pub use types::{
    join_path, split_path, Attr, DirEntry, DirStream, FileKind, FsResult, RequestContext, SetTime,
    StatFs,
};
