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

use std::fmt;

use crate::collective::ErrorClass;

/// The coarse-grained error taxonomy a caller tests to decide how to react.
///
/// Malformed metadata and padding are always `Io`. A short read/write at the
/// storage layer is `CountError`, never folded into the underlying I/O
/// class, so callers can tell "the disk returned an error" apart from "the
/// disk silently returned fewer bytes than requested". `Arg` is reserved for
/// caller programming mistakes that are cheap to detect (e.g. a null
/// error-string buffer) rather than asserted away. `Underlying` passes a
/// translated external I/O error class straight through, unmodified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Io,
    CountError,
    Arg,
    Underlying(ErrorClass),
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Io => write!(f, "IO error"),
            Status::CountError => write!(f, "partial read or write"),
            Status::Arg => write!(f, "invalid argument"),
            Status::Underlying(class) => write!(f, "{}", class),
        }
    }
}

/// The error type every fallible operation in this crate returns: a
/// `Status` the caller matches on, plus a human-readable message for the
/// rank-0 diagnostic line printed on first failure.
#[derive(Debug, Clone)]
pub struct ForestErr {
    status: Status,
    msg: Option<String>,
}

impl ForestErr {
    pub fn new(status: Status, msg: Option<&str>) -> Self {
        Self {
            status,
            msg: msg.map(|s| s.to_owned()),
        }
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self {
            status: Status::Io,
            msg: Some(msg.into()),
        }
    }

    pub fn count_error(msg: impl Into<String>) -> Self {
        Self {
            status: Status::CountError,
            msg: Some(msg.into()),
        }
    }

    pub fn arg(msg: impl Into<String>) -> Self {
        Self {
            status: Status::Arg,
            msg: Some(msg.into()),
        }
    }

    pub fn underlying(class: ErrorClass, msg: impl Into<String>) -> Self {
        Self {
            status: Status::Underlying(class),
            msg: Some(msg.into()),
        }
    }

    #[inline]
    pub fn status(&self) -> Status {
        self.status
    }

    #[inline]
    pub fn description(&self) -> &str {
        self.msg.as_deref().unwrap_or("")
    }
}

impl fmt::Display for ForestErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.msg {
            Some(m) => write!(f, "{}: {}", self.status, m),
            None => write!(f, "{}", self.status),
        }
    }
}

impl std::error::Error for ForestErr {}

impl From<std::io::Error> for ForestErr {
    fn from(e: std::io::Error) -> Self {
        ForestErr::underlying(ErrorClass::from_raw_os_error(e.raw_os_error()), e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ForestErr>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_message() {
        let e = ForestErr::io("bad magic");
        assert_eq!(e.status(), Status::Io);
        assert_eq!(e.description(), "bad magic");
        assert_eq!(e.to_string(), "IO error: bad magic");
    }

    #[test]
    fn count_error_is_distinct_from_io() {
        let e = ForestErr::count_error("short write");
        assert_eq!(e.status(), Status::CountError);
        assert_ne!(e.status(), Status::Io);
    }
}
