// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `unlock::UnlockStorage` backed by the fixed-named files the persisted
//! file list calls out separately from `kvstore.bin`: the shared secret,
//! retry counter, delay-complete flag, and limit response each get their
//! own small file.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use unlock::{LimitResponse, UnlockStorage};

pub struct FileUnlockStorage {
    dir: PathBuf,
}

impl FileUnlockStorage {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self { dir: dir.as_ref().to_path_buf() }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    fn write_atomic(&self, name: &str, bytes: &[u8]) -> Result<(), ()> {
        let target = self.path(name);
        let tmp = target.with_extension("tmp");
        let mut f = fs::File::create(&tmp).map_err(|_| ())?;
        f.write_all(bytes).map_err(|_| ())?;
        f.sync_all().map_err(|_| ())?;
        fs::rename(&tmp, &target).map_err(|_| ())
    }

    fn read(&self, name: &str) -> Result<Option<Vec<u8>>, ()> {
        match fs::read(self.path(name)) {
            Ok(b) => Ok(Some(b)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(_) => Err(()),
        }
    }
}

impl UnlockStorage for FileUnlockStorage {
    fn secret(&self) -> Result<Option<Vec<u8>>, ()> {
        self.read("unlock-secret")
    }

    fn provision_secret(&mut self, secret: &[u8]) -> Result<(), ()> {
        self.write_atomic("unlock-secret", secret)
    }

    fn retry_counter(&self) -> Result<u32, ()> {
        Ok(self
            .read("unlock-retry-counter")?
            .and_then(|b| b.try_into().ok())
            .map(u32::from_le_bytes)
            .unwrap_or(0))
    }

    fn set_retry_counter(&mut self, count: u32) -> Result<(), ()> {
        self.write_atomic("unlock-retry-counter", &count.to_le_bytes())
    }

    fn delay_complete(&self) -> Result<bool, ()> {
        Ok(self.read("unlock-delay-status")?.map(|b| b == [1]).unwrap_or(true))
    }

    fn set_delay_complete(&mut self, complete: bool) -> Result<(), ()> {
        self.write_atomic("unlock-delay-status", &[complete as u8])
    }

    fn limit_response(&self) -> Result<LimitResponse, ()> {
        Ok(match self.read("unlock-limit-response")?.as_deref() {
            Some([1]) => LimitResponse::WipeState,
            _ => LimitResponse::Delay,
        })
    }

    fn set_limit_response(&mut self, response: LimitResponse) -> Result<(), ()> {
        let byte = match response {
            LimitResponse::Delay => 0u8,
            LimitResponse::WipeState => 1u8,
        };
        self.write_atomic("unlock-limit-response", &[byte])
    }
}
