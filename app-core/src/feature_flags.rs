// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `feature-flags.bin`: a flat bool array the host can read/write by
//! index. Per the persisted-files note, the file is allowed to be shorter
//! than the current flag enum — a flag added after a device was
//! provisioned reads as its default (`false`) until explicitly set.

use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureFlag {
    /// Gates `keymgr::should_refresh_template`'s three-day refresh check.
    TemplateAutoRefresh,
    VerboseTelemetry,
}

impl FeatureFlag {
    pub const COUNT: usize = 2;

    fn index(self) -> usize {
        match self {
            FeatureFlag::TemplateAutoRefresh => 0,
            FeatureFlag::VerboseTelemetry => 1,
        }
    }

    pub fn from_index(i: usize) -> Option<Self> {
        match i {
            0 => Some(FeatureFlag::TemplateAutoRefresh),
            1 => Some(FeatureFlag::VerboseTelemetry),
            _ => None,
        }
    }
}

#[derive(Clone)]
pub struct FeatureFlags {
    path: PathBuf,
}

impl FeatureFlags {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self { path: path.as_ref().to_path_buf() }
    }

    fn load(&self) -> Vec<bool> {
        let bytes = fs::read(&self.path).unwrap_or_default();
        let mut flags: Vec<bool> = bytes.iter().map(|b| *b != 0).collect();
        flags.resize(FeatureFlag::COUNT, false);
        flags
    }

    fn save(&self, flags: &[bool]) {
        let bytes: Vec<u8> = flags.iter().map(|b| *b as u8).collect();
        let _ = fs::write(&self.path, bytes);
    }

    pub fn get(&self, flag: FeatureFlag) -> bool {
        self.load()[flag.index()]
    }

    pub fn get_all(&self) -> Vec<bool> {
        self.load()
    }

    pub fn set(&self, flag: FeatureFlag, value: bool) {
        let mut flags = self.load();
        flags[flag.index()] = value;
        self.save(&flags);
    }
}
