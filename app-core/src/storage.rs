// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `kvstore::Storage` backed by a single flat file, standing in for the
//! littlefs-resident `kvstore.bin` the real firmware writes to.

use kvstore::{KvError, Storage};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self { path: path.as_ref().to_path_buf() }
    }
}

impl Storage for FileStorage {
    fn load(&self) -> Result<Vec<u8>, KvError> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(_) => Err(KvError::StorageErr),
        }
    }

    /// Writes to a temp file and renames over the target, so a crash
    /// mid-write can never leave a half-written `kvstore.bin` behind.
    fn save(&mut self, data: &[u8]) -> Result<(), KvError> {
        let tmp = self.path.with_extension("tmp");
        let mut f = fs::File::create(&tmp).map_err(|_| KvError::StorageErr)?;
        f.write_all(data).map_err(|_| KvError::StorageErr)?;
        f.sync_all().map_err(|_| KvError::StorageErr)?;
        fs::rename(&tmp, &self.path).map_err(|_| KvError::StorageErr)?;
        Ok(())
    }
}
