// Copyright 2019 Fullstop000 <fullstop1005@gmail.com>.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// See the License for the specific language governing permissions and
// limitations under the License.

//! The fixed-width text file header and block headers.
//!
//! # File layout
//!
//! ```text
//!     offset 0        : 7 bytes magic, '\n'
//!     offset 8        : 23 bytes version string, '\n'
//!     offset 32       : 47 bytes user string, '\n'
//!     offset 80       : 16 bytes decimal global-cell-count
//!     offset 96       : 16 bytes alignment pad '\n' + 14 spaces + '\n'
//!     offset 112      : block 0 header (64 bytes), payload, pad
//!     ...             : block 1, 2, ...
//! ```
//!
//! The four text lines of the file header sum to 96 bytes (see `DESIGN.md`
//! item 3a). That 96-byte figure, plus the fixed 16-byte alignment pad, is
//! [`FILE_HEADER_REGION_LEN`], the base offset every block is measured
//! from.
//!
//! # Block header
//!
//! ```text
//!     byte 0     : 'H' or 'F'
//!     byte 1     : ' '
//!     bytes 2-14 : 13-digit zero-padded decimal size
//!     byte 15    : '\n'
//!     bytes 16-62: 47-byte user string, space-padded right
//!     byte 63    : '\n'
//! ```

use crate::util::pad;
use crate::util::status::{ForestErr, Result};

/// Length of the version string, not counting its terminating newline.
pub const VERSION_LEN: usize = 23;

/// Length of the user-comment string, not counting its terminating newline.
///
/// The number of user-string bytes is implementation-fixed at 47 (older
/// documentation says 15; 47 bytes + newline = 48 is authoritative here).
/// This crate always writes exactly 47 content bytes plus a literal `'\n'`.
pub const USER_STRING_LEN: usize = 47;

/// Length of the decimal global-cell-count field (zero-padded, no
/// terminating newline; the alignment pad supplies it).
pub const COUNT_FIELD_LEN: usize = 16;

/// Total length of the four header text lines: `7+1 + 23+1 + 47+1 + 16`.
pub const FILE_HEADER_BODY_LEN: usize =
    (7 + 1) + (VERSION_LEN + 1) + (USER_STRING_LEN + 1) + COUNT_FIELD_LEN;

/// The alignment pad following the file header body is always exactly this
/// many bytes, which also happens to equal
/// `pad::pad_for(FILE_HEADER_BODY_LEN, 16).0` since `96 % 16 == 0`.
pub const FILE_HEADER_ALIGN_PAD_LEN: usize = 16;

/// Absolute offset of the first block header: the base every block's
/// offset (`accessed_bytes`) is added to. See the module doc comment and
/// `DESIGN.md` item 3a for why this is 112, not `64 + 16 = 80`.
pub const FILE_HEADER_REGION_LEN: usize = FILE_HEADER_BODY_LEN + FILE_HEADER_ALIGN_PAD_LEN;

/// Length of a block header, in both the `H` and `F` cases.
pub const BLOCK_HEADER_LEN: usize = 1 + 1 + 13 + 1 + USER_STRING_LEN + 1;

/// Forest spatial dimension, tagging which magic string a file declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dim {
    Two,
    Three,
}

impl Dim {
    /// The 7-byte magic string for this dimension.
    pub fn magic(self) -> &'static [u8; 7] {
        match self {
            Dim::Two => b"p4data0",
            Dim::Three => b"p8data0",
        }
    }

    fn from_magic(bytes: &[u8]) -> Option<Self> {
        if bytes == Dim::Two.magic() {
            Some(Dim::Two)
        } else if bytes == Dim::Three.magic() {
            Some(Dim::Three)
        } else {
            None
        }
    }
}

/// The parsed/formatted 96-byte file-header body (the alignment pad is
/// handled separately by the caller, via [`pad::pad_for`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    pub dim: Dim,
    pub version: String,
    pub user_string: String,
    pub global_num_cells: u64,
}

fn right_pad(s: &str, width: usize, field: &str) -> Result<Vec<u8>> {
    if s.len() > width {
        return Err(ForestErr::arg(format!(
            "{field} is {} bytes, exceeds the {width}-byte field",
            s.len()
        )));
    }
    let mut buf = s.as_bytes().to_vec();
    buf.resize(width, b' ');
    Ok(buf)
}

impl FileHeader {
    /// Formats this header as the 96-byte file-header body.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(FILE_HEADER_BODY_LEN);
        buf.extend_from_slice(self.dim.magic());
        buf.push(b'\n');
        buf.extend_from_slice(&right_pad(&self.version, VERSION_LEN, "version string")?);
        buf.push(b'\n');
        buf.extend_from_slice(&right_pad(&self.user_string, USER_STRING_LEN, "user string")?);
        buf.push(b'\n');
        let count_str = format!("{:0>16}", self.global_num_cells);
        if count_str.len() != COUNT_FIELD_LEN {
            return Err(ForestErr::arg(format!(
                "global_num_cells {} does not fit in a {COUNT_FIELD_LEN}-digit decimal field",
                self.global_num_cells
            )));
        }
        buf.extend_from_slice(count_str.as_bytes());
        debug_assert_eq!(buf.len(), FILE_HEADER_BODY_LEN);
        Ok(buf)
    }

    /// Parses a 96-byte file-header body. Rejects with [`Status::Io`] if
    /// the magic is unrecognized or any terminator newline is missing.
    ///
    /// [`Status::Io`]: crate::util::status::Status::Io
    pub fn decode(src: &[u8]) -> Result<Self> {
        if src.len() != FILE_HEADER_BODY_LEN {
            return Err(ForestErr::io(format!(
                "file header is {} bytes, expected {FILE_HEADER_BODY_LEN}",
                src.len()
            )));
        }
        let dim = Dim::from_magic(&src[0..7])
            .ok_or_else(|| ForestErr::io("unrecognized magic string"))?;
        expect_newline(src, 7, "magic")?;

        let version_start = 8;
        expect_newline(src, version_start + VERSION_LEN, "version")?;
        let version = ascii_field(&src[version_start..version_start + VERSION_LEN]);

        let user_start = version_start + VERSION_LEN + 1;
        expect_newline(src, user_start + USER_STRING_LEN, "user string")?;
        let user_string = ascii_field(&src[user_start..user_start + USER_STRING_LEN]);

        let count_start = user_start + USER_STRING_LEN + 1;
        debug_assert_eq!(count_start, 80);
        let count_field = &src[count_start..count_start + COUNT_FIELD_LEN];
        let count_str = std::str::from_utf8(count_field)
            .map_err(|_| ForestErr::io("global cell count is not valid UTF-8"))?;
        let global_num_cells: u64 = count_str
            .parse()
            .map_err(|_| ForestErr::io("global cell count is not a valid decimal integer"))?;

        Ok(FileHeader {
            dim,
            version,
            user_string,
            global_num_cells,
        })
    }
}

fn expect_newline(src: &[u8], at: usize, field: &str) -> Result<()> {
    if src.get(at) != Some(&b'\n') {
        return Err(ForestErr::io(format!("missing newline terminator after {field}")));
    }
    Ok(())
}

fn ascii_field(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).trim_end().to_owned()
}

/// The on-disk type tag of a block: a fixed-size global header (`H`) or a
/// per-cell field striped across ranks (`F`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Header,
    Field,
}

impl BlockKind {
    fn tag(self) -> u8 {
        match self {
            BlockKind::Header => b'H',
            BlockKind::Field => b'F',
        }
    }

    fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            b'H' => Some(BlockKind::Header),
            b'F' => Some(BlockKind::Field),
            _ => None,
        }
    }
}

/// A parsed/formatted 64-byte block header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeader {
    pub kind: BlockKind,
    /// For `H` blocks, the header payload size in bytes; for `F` blocks,
    /// the per-cell element size in bytes.
    pub size: u64,
    pub user_string: String,
}

impl BlockHeader {
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(BLOCK_HEADER_LEN);
        buf.push(self.kind.tag());
        buf.push(b' ');
        let size_str = format!("{:0>13}", self.size);
        if size_str.len() != 13 {
            return Err(ForestErr::arg(format!(
                "size {} does not fit in a 13-digit decimal field",
                self.size
            )));
        }
        buf.extend_from_slice(size_str.as_bytes());
        buf.push(b'\n');
        buf.extend_from_slice(&right_pad(&self.user_string, USER_STRING_LEN, "user string")?);
        buf.push(b'\n');
        debug_assert_eq!(buf.len(), BLOCK_HEADER_LEN);
        Ok(buf)
    }

    /// Parses a 64-byte block header. `expected_elem_size`, when `Some`,
    /// is checked against the decoded size for `F` blocks: a size
    /// inconsistent with the caller's expected element size is rejected.
    pub fn decode(src: &[u8], expected_elem_size: Option<u64>) -> Result<Self> {
        if src.len() != BLOCK_HEADER_LEN {
            return Err(ForestErr::io(format!(
                "block header is {} bytes, expected {BLOCK_HEADER_LEN}",
                src.len()
            )));
        }
        let kind = BlockKind::from_tag(src[0])
            .ok_or_else(|| ForestErr::io("unrecognized block type tag"))?;
        if src[1] != b' ' {
            return Err(ForestErr::io("missing separator after block type"));
        }
        let size_field = &src[2..15];
        expect_newline(src, 15, "block size")?;
        let size_str = std::str::from_utf8(size_field)
            .map_err(|_| ForestErr::io("block size is not valid UTF-8"))?;
        let size: u64 = size_str
            .parse()
            .map_err(|_| ForestErr::io("block size is not a valid decimal integer"))?;

        let user_start = 16;
        expect_newline(src, user_start + USER_STRING_LEN, "block user string")?;
        let user_string = ascii_field(&src[user_start..user_start + USER_STRING_LEN]);

        if kind == BlockKind::Field {
            if let Some(expected) = expected_elem_size {
                if expected != size {
                    return Err(ForestErr::io(format!(
                        "field block element size {size} does not match caller's expected {expected}"
                    )));
                }
            }
        }

        Ok(BlockHeader { kind, size, user_string })
    }
}

/// Convenience re-export so callers validate a read pad region the same
/// way `header`'s own parsing does.
pub use pad::is_valid_pad;
