// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `fwup::ImageWriter` backed by a plain file standing in for the
//! bootloader's flash-slot writer. Verifying and applying the image itself
//! is the signed-image verifier's job (out of scope here); this writer
//! only gets the bytes onto durable storage in the right place and leaves
//! a marker for the bootloader to pick up on next boot.

use fwup::{FwupError, FwupMode, ImageWriter};
use std::fs::{self, File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

pub struct FileImageWriter {
    staging_path: PathBuf,
    applied_marker: PathBuf,
    file: Option<File>,
    mode: FwupMode,
}

impl FileImageWriter {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            staging_path: dir.join("fwup-staging.bin"),
            applied_marker: dir.join("fwup-applied-marker"),
            file: None,
            mode: FwupMode::Normal,
        }
    }
}

impl ImageWriter for FileImageWriter {
    fn init(&mut self, mode: FwupMode, total_size: u32) -> Result<(), FwupError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.staging_path)
            .map_err(|_| FwupError::WriteFailed)?;
        file.set_len(u64::from(total_size)).map_err(|_| FwupError::WriteFailed)?;
        self.file = Some(file);
        self.mode = mode;
        Ok(())
    }

    fn write_chunk(&mut self, offset: u32, bytes: &[u8]) -> Result<(), FwupError> {
        let file = self.file.as_mut().ok_or(FwupError::InvalidState)?;
        file.seek(SeekFrom::Start(u64::from(offset))).map_err(|_| FwupError::WriteFailed)?;
        file.write_all(bytes).map_err(|_| FwupError::WriteFailed)
    }

    /// `Normal`/`Delta`: the staged image is complete; drop the marker the
    /// bootloader checks on the next reset to pick it up and verify it.
    fn finalize(&mut self) -> Result<(), FwupError> {
        if let Some(file) = self.file.as_mut() {
            file.sync_all().map_err(|_| FwupError::WriteFailed)?;
        }
        fs::write(&self.applied_marker, b"pending-verify").map_err(|_| FwupError::WriteFailed)
    }

    /// `DeltaOneshot`: the patch application the bootloader would run is
    /// out of scope here; mark it ready the same way `finalize` does.
    fn apply_patch(&mut self) -> Result<(), FwupError> {
        self.finalize()
    }
}
