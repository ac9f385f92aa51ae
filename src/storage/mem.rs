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

//! An in-memory [`ParallelStorage`] used by every test in this crate.
//!
//! Backs `Storage` with a `HashMap<String, ...>` of named in-memory files
//! for unit tests instead of touching a real filesystem. Files are
//! `Arc<Mutex<Vec<u8>>>` so that several
//! [`crate::collective::SingleRankCollective`]s simulating distinct ranks
//! can open "the same file" and observe each other's writes, which is what
//! lets a single test process exercise multi-rank field-block scenarios
//! without a real MPI job.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::{ParallelFile, ParallelStorage};
use crate::util::status::{ForestErr, Result};

#[derive(Default, Clone)]
pub struct MemStorage {
    files: Arc<Mutex<HashMap<String, Arc<Mutex<Vec<u8>>>>>>,
}

impl MemStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ParallelStorage for MemStorage {
    type File = MemFile;

    fn create(&self, path: &str) -> Result<Self::File> {
        let buf = Arc::new(Mutex::new(Vec::new()));
        self.files.lock().unwrap().insert(path.to_owned(), buf.clone());
        Ok(MemFile { buf })
    }

    fn open_write(&self, path: &str) -> Result<Self::File> {
        let files = self.files.lock().unwrap();
        match files.get(path) {
            Some(buf) => Ok(MemFile { buf: buf.clone() }),
            None => Err(ForestErr::io(format!("no such file: {path}"))),
        }
    }

    fn open_read(&self, path: &str) -> Result<Self::File> {
        let files = self.files.lock().unwrap();
        match files.get(path) {
            Some(buf) => Ok(MemFile { buf: buf.clone() }),
            None => Err(ForestErr::io(format!("no such file: {path}"))),
        }
    }
}

pub struct MemFile {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl ParallelFile for MemFile {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let data = self.buf.lock().unwrap();
        let offset = offset as usize;
        if offset >= data.len() {
            return Ok(0);
        }
        let available = &data[offset..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        Ok(n)
    }

    fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<usize> {
        let mut data = self.buf.lock().unwrap();
        let offset = offset as usize;
        let end = offset + buf.len();
        if data.len() < end {
            data.resize(end, 0);
        }
        data[offset..end].copy_from_slice(buf);
        Ok(buf.len())
    }

    fn len(&self) -> Result<u64> {
        Ok(self.buf.lock().unwrap().len() as u64)
    }
}
