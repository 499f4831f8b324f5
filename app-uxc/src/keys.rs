// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Uxc's own key material: the attestation key its `key_manager` task signs
//! the inter-MCU handshake transcript with. Distinct from Core's device
//! identity key, which signs phone-facing hardware attestation instead.
//!
//! Provisioning this is a manufacturing-fixture job (`mfgtest`, out of
//! scope). Standing in for it here: generated from OS entropy on first
//! boot and persisted under `data_dir/keys/`, matching `app-core::keys`.
//! The matching public key is also dropped in a shared provisioning
//! directory so Core's listener can load it before verifying the
//! handshake signature — on real hardware this pairing happens once, at
//! the factory fixture, not on every boot.

use std::fs;
use std::io::Read;
use std::path::Path;

use p256::ecdsa::SigningKey;
use p256::FieldBytes;

pub struct UxcKeys {
    pub attestation_key: [u8; 32],
    pub verify_key: [u8; 33],
}

fn derive_verify_key(attestation_key: &[u8; 32]) -> [u8; 33] {
    let signing = SigningKey::from_bytes(FieldBytes::from_slice(attestation_key))
        .expect("persisted attestation key is a valid P-256 scalar");
    let point = signing.verifying_key().to_encoded_point(true);
    let mut out = [0u8; 33];
    out.copy_from_slice(point.as_bytes());
    out
}

fn read_os_entropy(buf: &mut [u8]) {
    let mut f = fs::File::open("/dev/urandom").expect("host entropy source");
    f.read_exact(buf).expect("read host entropy");
}

fn load_or_generate(path: &Path, len: usize) -> Vec<u8> {
    if let Ok(bytes) = fs::read(path) {
        if bytes.len() == len {
            return bytes;
        }
    }
    let mut bytes = vec![0u8; len];
    read_os_entropy(&mut bytes);
    let _ = fs::create_dir_all(path.parent().unwrap());
    let _ = fs::write(path, &bytes);
    bytes
}

impl UxcKeys {
    /// `dir` is Uxc's own private key directory; `provisioning_dir` is the
    /// directory shared with Core, where the public half of the
    /// attestation keypair is dropped for the listener to pick up.
    pub fn load_or_provision(dir: impl AsRef<Path>, provisioning_dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        let attestation_key: [u8; 32] =
            load_or_generate(&dir.join("uxc-attestation-key.bin"), 32).try_into().unwrap();
        let verify_key = derive_verify_key(&attestation_key);

        let provisioning_dir = provisioning_dir.as_ref();
        let _ = fs::create_dir_all(provisioning_dir);
        let _ = fs::write(provisioning_dir.join("uxc-attestation-pubkey.bin"), verify_key);

        Self { attestation_key, verify_key }
    }
}

pub struct OsEntropy;

impl keymgr::SecureRandom for OsEntropy {
    fn fill_bytes(&mut self, buf: &mut [u8]) {
        read_os_entropy(buf);
    }
}

impl uc::SecureRandom for OsEntropy {
    fn fill_bytes(&mut self, buf: &mut [u8]) {
        read_os_entropy(buf);
    }
}
