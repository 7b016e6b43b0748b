//! Reply shaping that does not depend on the FUSE transport.

use std::ffi::OsString;
use std::os::unix::ffi::OsStrExt;

/// Outcome of a size-probed xattr request.
#[derive(Debug, PartialEq, Eq)]
pub enum XattrReply<'a> {
    /// Caller asked for the size only (`size == 0`).
    Size(u32),
    Data(&'a [u8]),
    /// Caller's buffer is too small.
    Range,
}

pub fn xattr_reply(data: &[u8], size: u32) -> XattrReply<'_> {
    if size == 0 {
        XattrReply::Size(data.len() as u32)
    } else if data.len() <= size as usize {
        XattrReply::Data(data)
    } else {
        XattrReply::Range
    }
}

/// NUL-terminated concatenation of attribute names, as `listxattr` expects.
pub fn encode_xattr_names(names: &[OsString]) -> Vec<u8> {
    let mut data = Vec::new();
    for name in names {
        data.extend_from_slice(name.as_bytes());
        data.push(0);
    }
    data
}
