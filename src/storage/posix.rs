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

//! Real filesystem backing for [`ParallelStorage`], via `pread`/`pwrite`.
//!
//! `std::os::unix::fs::FileExt::{read_at, write_at}` would do the job on
//! Unix, but folds a short transfer and a hard error into the same
//! `io::Result` without a clean way to keep them apart. Going through
//! `libc::pread`/`libc::pwrite` directly keeps the `COUNT_ERROR` vs.
//! `Status::Io` distinction explicit at this boundary, reaching for `libc`
//! rather than a higher-level wrapper to get a precise syscall-level return
//! value.

use std::ffi::CString;
use std::fs::{File, OpenOptions};
use std::os::unix::io::AsRawFd;

use super::{ParallelFile, ParallelStorage};
use crate::util::status::{ForestErr, Result};

#[derive(Default, Clone, Copy)]
pub struct PosixStorage;

impl PosixStorage {
    pub fn new() -> Self {
        Self
    }
}

impl ParallelStorage for PosixStorage {
    type File = PosixFile;

    fn create(&self, path: &str) -> Result<Self::File> {
        let _ = CString::new(path).map_err(|e| ForestErr::arg(e.to_string()))?;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Ok(PosixFile { file })
    }

    fn open_write(&self, path: &str) -> Result<Self::File> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(PosixFile { file })
    }

    fn open_read(&self, path: &str) -> Result<Self::File> {
        let file = OpenOptions::new().read(true).open(path)?;
        Ok(PosixFile { file })
    }
}

pub struct PosixFile {
    file: File,
}

impl ParallelFile for PosixFile {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let n = unsafe {
            libc::pread(
                self.file.as_raw_fd(),
                buf.as_mut_ptr() as *mut libc::c_void,
                buf.len(),
                offset as libc::off_t,
            )
        };
        if n < 0 {
            return Err(std::io::Error::last_os_error().into());
        }
        Ok(n as usize)
    }

    fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<usize> {
        let n = unsafe {
            libc::pwrite(
                self.file.as_raw_fd(),
                buf.as_ptr() as *const libc::c_void,
                buf.len(),
                offset as libc::off_t,
            )
        };
        if n < 0 {
            return Err(std::io::Error::last_os_error().into());
        }
        Ok(n as usize)
    }

    fn len(&self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }
}
