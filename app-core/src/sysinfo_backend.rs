// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `sysinfo`'s three backends, file-backed: slot metadata (normally
//! written by the bootloader at image-install time), the secure element's
//! identity (normally provisioned in manufacturing), and the coredump/event
//! log (normally a ring buffer in flash).

use crate::keys::DeviceKeys;
use crate::wire::{push_str, take_n, take_str};
use sysinfo::{Metadata, MetadataSource, SecureElementInfo, TelemetryStore};
use std::fs;
use std::path::{Path, PathBuf};

pub(crate) fn encode_metadata(m: &Metadata) -> Vec<u8> {
    let mut buf = Vec::new();
    push_str(&mut buf, &m.git_id);
    push_str(&mut buf, &m.git_branch);
    buf.extend_from_slice(&[m.version.0, m.version.1, m.version.2]);
    push_str(&mut buf, &m.build_string);
    buf.extend_from_slice(&m.build_timestamp.to_le_bytes());
    buf.extend_from_slice(&m.sha1);
    push_str(&mut buf, &m.hw_revision);
    buf
}

fn decode_metadata(buf: &[u8]) -> Option<Metadata> {
    let (git_id, rest) = take_str(buf)?;
    let (git_branch, rest) = take_str(rest)?;
    let (version_bytes, rest) = take_n(rest, 3)?;
    let (build_string, rest) = take_str(rest)?;
    let (ts_bytes, rest) = take_n(rest, 4)?;
    let (sha1_bytes, rest) = take_n(rest, 20)?;
    let (hw_revision, _) = take_str(rest)?;
    Some(Metadata {
        git_id,
        git_branch,
        version: (version_bytes[0], version_bytes[1], version_bytes[2]),
        build_string,
        build_timestamp: u32::from_le_bytes(ts_bytes.try_into().ok()?),
        sha1: sha1_bytes.try_into().ok()?,
        hw_revision,
    })
}

pub struct FileMetadataSource {
    dir: PathBuf,
}

impl FileMetadataSource {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self { dir: dir.as_ref().to_path_buf() }
    }

    fn path(&self, slot: sysinfo::Slot) -> PathBuf {
        let name = match slot {
            sysinfo::Slot::Bootloader => "meta-bootloader.bin",
            sysinfo::Slot::SlotA => "meta-slot-a.bin",
            sysinfo::Slot::SlotB => "meta-slot-b.bin",
        };
        self.dir.join(name)
    }

    /// Writes the running image's own metadata into `SlotA`, so a fresh
    /// data directory still answers `meta`/`device_info` with something.
    pub fn seed_running_slot(&self, slot: sysinfo::Slot) {
        let path = self.path(slot);
        if path.exists() {
            return;
        }
        let metadata = Metadata {
            git_id: String::from("0000000000000000000000000000000000000"),
            git_branch: String::from("unknown"),
            version: (0, 1, 0),
            build_string: String::from("app-core host build"),
            build_timestamp: 0,
            sha1: [0u8; 20],
            hw_revision: String::from("host-sim"),
        };
        let _ = fs::write(path, encode_metadata(&metadata));
    }
}

impl MetadataSource for FileMetadataSource {
    fn metadata(&self, slot: sysinfo::Slot) -> Option<Metadata> {
        let bytes = fs::read(self.path(slot)).ok()?;
        decode_metadata(&bytes)
    }
}

/// Identity normally held in the secure element; here it rides along with
/// the other device keys loaded once at boot.
pub struct KeyedSecureElement<'a> {
    pub keys: &'a DeviceKeys,
}

impl<'a> SecureElementInfo for KeyedSecureElement<'a> {
    fn device_pubkey(&self) -> [u8; 33] {
        self.keys.attestation_pubkey_compressed
    }

    fn attestation_cert(&self) -> Vec<u8> {
        self.keys.attestation_cert.clone()
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
