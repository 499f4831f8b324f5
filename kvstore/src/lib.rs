// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! TLV-in-file key-value store (`spec.md` §4.10).
//!
//! Each record is a fixed 11-byte key (NUL-terminated, ≤10 chars), a
//! 1-byte length, and up to 52 bytes of value — 64 bytes per record, 64
//! records per 4 KiB file. The whole file is loaded into RAM at init; any
//! mutation rewrites the full buffer back out atomically through the
//! `Storage` trait, mirroring the "load once, rewrite whole file" idiom the
//! teacher's flash-backed EEPROM/caboose drivers use instead of in-place
//! byte patching.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

use alloc::string::String;
use alloc::vec::Vec;

pub mod config;
pub use config::{KEY_CAPACITY, MAX_RECORDS, VALUE_CAPACITY};

const KEY_FIELD: usize = KEY_CAPACITY + 1; // + NUL
const RECORD_SIZE: usize = KEY_FIELD + 1 /* length byte */ + VALUE_CAPACITY;
pub const FILE_SIZE: usize = RECORD_SIZE * MAX_RECORDS;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KvError {
    InvalidKey,
    ValueTooLarge,
    NotFound,
    /// Caller's buffer was smaller than the stored value (§8 P7).
    Truncated,
    /// The file already holds `MAX_RECORDS` distinct keys (§8 P8).
    AppendFull,
    StorageErr,
}

/// Backing store for the KV file. A real task backs this with littlefs; unit
/// tests use `MemoryStorage`.
pub trait Storage {
    fn load(&self) -> Result<Vec<u8>, KvError>;
    fn save(&mut self, data: &[u8]) -> Result<(), KvError>;
}

#[derive(Default, Clone)]
pub struct MemoryStorage {
    data: Vec<u8>,
}

impl Storage for MemoryStorage {
    fn load(&self) -> Result<Vec<u8>, KvError> {
        Ok(self.data.clone())
    }

    fn save(&mut self, data: &[u8]) -> Result<(), KvError> {
        self.data = data.to_vec();
        Ok(())
    }
}

#[derive(Clone)]
struct Record {
    key: String,
    len: u8,
    value: [u8; VALUE_CAPACITY],
}

impl Record {
    fn new(key: &str, value: &[u8]) -> Self {
        let mut rec = Record {
            key: String::from(key),
            len: value.len() as u8,
            value: [0; VALUE_CAPACITY],
        };
        rec.value[..value.len()].copy_from_slice(value);
        rec
    }

    fn set_value(&mut self, value: &[u8]) {
        self.value = [0; VALUE_CAPACITY];
        self.value[..value.len()].copy_from_slice(value);
        self.len = value.len() as u8;
    }

    fn to_bytes(&self, out: &mut [u8; RECORD_SIZE]) {
        out.fill(0);
        let key_bytes = self.key.as_bytes();
        out[..key_bytes.len()].copy_from_slice(key_bytes);
        // out[key_bytes.len()] stays 0 as the NUL terminator.
        out[KEY_FIELD] = self.len;
        out[KEY_FIELD + 1..KEY_FIELD + 1 + VALUE_CAPACITY]
            .copy_from_slice(&self.value);
    }

    fn from_bytes(raw: &[u8; RECORD_SIZE]) -> Option<Self> {
        let nul = raw[..KEY_FIELD].iter().position(|&b| b == 0)?;
        if nul == 0 {
            return None;
        }
        let key = core::str::from_utf8(&raw[..nul]).ok()?;
        let len = raw[KEY_FIELD];
        if len as usize > VALUE_CAPACITY {
            return None;
        }
        let mut value = [0u8; VALUE_CAPACITY];
        value.copy_from_slice(&raw[KEY_FIELD + 1..KEY_FIELD + 1 + VALUE_CAPACITY]);
        Some(Record {
            key: String::from(key),
            len,
            value,
        })
    }
}

fn validate_key(key: &str) -> Result<(), KvError> {
    if key.is_empty() || key.len() > KEY_CAPACITY || !key.is_ascii() {
        return Err(KvError::InvalidKey);
    }
    Ok(())
}

pub struct KvStore<S: Storage> {
    storage: S,
    records: Vec<Record>,
}

impl<S: Storage> KvStore<S> {
    /// Loads the whole file into RAM, ignoring (rather than failing on)
    /// any record slot that fails to parse as a record boundary — an
    /// empty/all-zero file is simply an empty store.
    pub fn init(storage: S) -> Result<Self, KvError> {
        let raw = storage.load()?;
        let mut records = Vec::new();
        for chunk in raw.chunks(RECORD_SIZE) {
            if chunk.len() != RECORD_SIZE {
                break;
            }
            let mut buf = [0u8; RECORD_SIZE];
            buf.copy_from_slice(chunk);
            if let Some(record) = Record::from_bytes(&buf) {
                records.push(record);
            }
        }
        Ok(Self { storage, records })
    }

    /// Updates `key` in place if present, else appends. Rewrites the whole
    /// file on any mutation.
    pub fn set(&mut self, key: &str, value: &[u8]) -> Result<(), KvError> {
        validate_key(key)?;
        if value.len() > VALUE_CAPACITY {
            return Err(KvError::ValueTooLarge);
        }
        if let Some(existing) = self.records.iter_mut().find(|r| r.key == key) {
            existing.set_value(value);
        } else {
            if self.records.len() >= MAX_RECORDS {
                return Err(KvError::AppendFull);
            }
            self.records.push(Record::new(key, value));
        }
        self.flush()
    }

    /// Copies the stored value for `key` into `buf`, returning the number
    /// of bytes written. `Truncated` if `buf` is smaller than the record.
    pub fn get(&self, key: &str, buf: &mut [u8]) -> Result<usize, KvError> {
        validate_key(key)?;
        let record = self
            .records
            .iter()
            .find(|r| r.key == key)
            .ok_or(KvError::NotFound)?;
        let n = record.len as usize;
        if buf.len() < n {
            return Err(KvError::Truncated);
        }
        buf[..n].copy_from_slice(&record.value[..n]);
        Ok(n)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    fn flush(&mut self) -> Result<(), KvError> {
        let mut out = Vec::with_capacity(FILE_SIZE);
        for record in &self.records {
            let mut bytes = [0u8; RECORD_SIZE];
            record.to_bytes(&mut bytes);
            out.extend_from_slice(&bytes);
        }
        self.storage.save(&out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_set_then_get() {
        let mut kv = KvStore::init(MemoryStorage::default()).unwrap();
        kv.set("serial", b"abc123").unwrap();
        let mut buf = [0u8; 16];
        let n = kv.get("serial", &mut buf).unwrap();
        assert_eq!(&buf[..n], b"abc123");
    }

    #[test]
    fn get_truncated_when_buffer_too_small() {
        let mut kv = KvStore::init(MemoryStorage::default()).unwrap();
        kv.set("k", b"hello world").unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(kv.get("k", &mut buf), Err(KvError::Truncated));
    }

    #[test]
    fn update_in_place_does_not_grow_store() {
        let mut kv = KvStore::init(MemoryStorage::default()).unwrap();
        kv.set("k", b"v1").unwrap();
        kv.set("k", b"v2-longer").unwrap();
        assert_eq!(kv.len(), 1);
        let mut buf = [0u8; 16];
        let n = kv.get("k", &mut buf).unwrap();
        assert_eq!(&buf[..n], b"v2-longer");
    }

    #[test]
    fn sixty_fifth_distinct_key_rejected() {
        let mut kv = KvStore::init(MemoryStorage::default()).unwrap();
        for i in 0..MAX_RECORDS {
            kv.set(&alloc::format!("k{i}"), b"v").unwrap();
        }
        assert_eq!(
            kv.set("overflow", b"v"),
            Err(KvError::AppendFull)
        );
    }

    #[test]
    fn persists_across_reinit() {
        let mut kv = KvStore::init(MemoryStorage::default()).unwrap();
        kv.set("a", b"1").unwrap();
        let snapshot = kv.storage().clone();
        let kv2 = KvStore::init(snapshot).unwrap();
        let mut buf = [0u8; 4];
        let n = kv2.get("a", &mut buf).unwrap();
        assert_eq!(&buf[..n], b"1");
    }

    #[test]
    fn invalid_key_rejected() {
        let mut kv = KvStore::init(MemoryStorage::default()).unwrap();
        assert_eq!(kv.set("", b"v"), Err(KvError::InvalidKey));
        assert_eq!(
            kv.set("this-key-is-too-long", b"v"),
            Err(KvError::InvalidKey)
        );
    }
}
