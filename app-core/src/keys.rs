// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device key material: the BIP32 seed, the CSEK wrapping key, and the
//! long-term device identity key used for both hardware attestation and
//! the secure-channel handshake signature.
//!
//! Provisioning this material is a manufacturing-fixture job (`mfgtest`,
//! out of scope). Standing in for it here: keys are generated from OS
//! entropy on first boot and persisted under `data_dir/keys/`, so restarts
//! of the same data directory keep the same identity.

use p256::ecdsa::SigningKey as P256SigningKey;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

pub struct DeviceKeys {
    pub seed: Vec<u8>,
    pub wrapping_key: [u8; 32],
    pub device_identity_key: [u8; 32],
    pub attestation_pubkey_compressed: [u8; 33],
    pub attestation_cert: Vec<u8>,
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

impl DeviceKeys {
    pub fn load_or_provision(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        let seed = load_or_generate(&dir.join("seed.bin"), 64);
        let wrapping_key: [u8; 32] =
            load_or_generate(&dir.join("csek-wrapping-key.bin"), 32).try_into().unwrap();
        let device_identity_key: [u8; 32] =
            load_or_generate(&dir.join("device-identity-key.bin"), 32).try_into().unwrap();

        let signing_key = P256SigningKey::from_bytes(
            p256::FieldBytes::from_slice(&device_identity_key),
        )
        .expect("provisioned key is a valid scalar");
        let encoded = signing_key.verifying_key().to_encoded_point(true);
        let mut attestation_pubkey_compressed = [0u8; 33];
        attestation_pubkey_compressed.copy_from_slice(encoded.as_bytes());

        let attestation_cert = fs::read(dir.join("attestation-cert.bin")).unwrap_or_default();

        Self {
            seed,
            wrapping_key,
            device_identity_key,
            attestation_pubkey_compressed,
            attestation_cert,
        }
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
