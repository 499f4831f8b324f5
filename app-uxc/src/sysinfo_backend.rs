// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Uxc's own `sysinfo` backends: fixed firmware metadata, the attestation
//! keypair standing in for a secure element, and a file-backed telemetry
//! log. Simpler than Core's backends — nothing outside this binary queries
//! them over the wire, so there is no on-flash format to round-trip, just
//! enough state for the local `Info` flow and the watchdog/sleep-prep
//! machinery `sysinfo::Sysinfo` wraps.

use std::fs;
use std::path::{Path, PathBuf};

use sysinfo::{Metadata, MetadataSource, SecureElementInfo, Slot, TelemetryStore};

use crate::keys::UxcKeys;

pub struct StaticMetadataSource;

impl MetadataSource for StaticMetadataSource {
    fn metadata(&self, slot: Slot) -> Option<Metadata> {
        match slot {
            Slot::SlotA => Some(Metadata {
                git_id: String::from("0000000000000000000000000000000000000"),
                git_branch: String::from("unknown"),
                version: (0, 1, 0),
                build_string: String::from("app-uxc host build"),
                build_timestamp: 0,
                sha1: [0u8; 20],
                hw_revision: String::from("host-sim"),
            }),
            _ => None,
        }
    }
}

pub struct UxcSecureElement<'a> {
    pub keys: &'a UxcKeys,
}

impl<'a> SecureElementInfo for UxcSecureElement<'a> {
    fn device_pubkey(&self) -> [u8; 33] {
        self.keys.verify_key
    }

    fn attestation_cert(&self) -> Vec<u8> {
        // Uxc never answers the phone-facing hardware attestation command;
        // Core's secure element holds that cert.
        Vec::new()
    }
}

pub struct FileTelemetryStore {
    dir: PathBuf,
}

impl FileTelemetryStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self { dir: dir.as_ref().to_path_buf() }
    }
}

impl TelemetryStore for FileTelemetryStore {
    fn coredump(&self) -> Option<Vec<u8>> {
        fs::read(self.dir.join("coredump.bin")).ok()
    }

    fn events(&self) -> Vec<u8> {
        fs::read(self.dir.join("events.bin")).unwrap_or_default()
    }
}
