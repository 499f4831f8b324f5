// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Host build stand-in for the fingerprint sensor and enrolled-template
//! storage that `auth::MatcherThread` drives.
//!
//! There is no real sensor on this build, so `HostSimBiometrics` takes its
//! "finger-down" signal from a trigger file: write any bytes to
//! `finger-image.bin` under the data directory, then create (touch)
//! `finger-trigger` next to it. The next poll consumes the trigger and
//! extracts a template by hashing the image, so enrolling and then
//! re-presenting the same image produces a match.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use auth::{BiometricError, Biometrics, Image, MatcherFeedback, Template, TemplateStore};
use ipc::Bus;
use sha2::{Digest, Sha256};
use ui_events::UiEvent;

use crate::config::MAX_FINGERPRINT_TEMPLATES;
use crate::effects::post_ui_event;

pub struct FileTemplateStore {
    dir: PathBuf,
    templates: Vec<Template>,
}

impl FileTemplateStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref().to_path_buf();
        let mut templates = Vec::new();
        for i in 0..MAX_FINGERPRINT_TEMPLATES {
            match fs::read(dir.join(format!("fingerprint-{i}.bin"))) {
                Ok(bytes) => templates.push(bytes),
                Err(_) => break,
            }
        }
        Self { dir, templates }
    }

    fn last_refresh_path(&self) -> PathBuf {
        self.dir.join("fingerprint-last-refresh")
    }
}

impl TemplateStore for FileTemplateStore {
    fn templates(&self) -> &[Template] {
        &self.templates
    }

    fn save(&mut self, template: Template) {
        if self.templates.len() >= MAX_FINGERPRINT_TEMPLATES {
            // Evicting a named slot is a Uxc-side `FingerprintRemoveFlow`
            // concern; this build just refuses a fourth enrollment rather
            // than silently overwriting one.
            return;
        }
        let index = self.templates.len();
        let _ = fs::write(self.dir.join(format!("fingerprint-{index}.bin")), &template);
        self.templates.push(template);
    }

    fn last_refresh_ms(&self) -> Option<u64> {
        fs::read(self.last_refresh_path())
            .ok()
            .and_then(|bytes| bytes.try_into().ok())
            .map(u64::from_le_bytes)
    }

    fn set_last_refresh_ms(&mut self, now_ms: u64) {
        let _ = fs::write(self.last_refresh_path(), now_ms.to_le_bytes());
    }
}

pub struct HostSimBiometrics {
    trigger_path: PathBuf,
    image_path: PathBuf,
    finger_present: bool,
}

impl HostSimBiometrics {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            trigger_path: dir.join("finger-trigger"),
            image_path: dir.join("finger-image.bin"),
            finger_present: false,
        }
    }
}

impl Biometrics for HostSimBiometrics {
    fn init(&mut self) -> Result<(), BiometricError> {
        Ok(())
    }

    /// Non-blocking here: a real sensor task parks on an ISR semaphore,
    /// but the host stand-in just samples the trigger file once per driving
    /// loop iteration so it never holds `AuthEngine`'s lock indefinitely.
    fn wait_finger_down(&mut self) {
        self.finger_present = self.trigger_path.exists();
        if self.finger_present {
            let _ = fs::remove_file(&self.trigger_path);
        }
    }

    fn capture(&mut self) -> Result<Image, BiometricError> {
        if !self.finger_present {
            return Err(BiometricError::CaptureFailed);
        }
        fs::read(&self.image_path).map_err(|_| BiometricError::CaptureFailed)
    }

    fn extract(&mut self, image: &Image) -> Result<Template, BiometricError> {
        Ok(Sha256::digest(image).to_vec())
    }

    fn enroll_template(&mut self, _template: &Template) -> Result<(), BiometricError> {
        Ok(())
    }

    fn identify(&mut self, template: &Template, enrolled: &[Template]) -> Option<usize> {
        enrolled.iter().position(|t| t == template)
    }
}

pub struct CoreMatcherFeedback {
    bus: Arc<Bus>,
}

impl CoreMatcherFeedback {
    pub fn new(bus: Arc<Bus>) -> Self {
        Self { bus }
    }
}

impl MatcherFeedback for CoreMatcherFeedback {
    fn finger_down(&mut self) {
        post_ui_event(&self.bus, UiEvent::FingerDown);
    }

    fn enroll_pass(&mut self) {
        // `EnrollmentProgress`'s pass/total fields come from
        // `GetFingerprintEnrollmentStatus`, which the host already polls;
        // no separate event is posted here.
    }

    fn enroll_fail(&mut self) {}

    fn match_ok(&mut self) {
        post_ui_event(&self.bus, UiEvent::Authenticated);
    }

    fn match_fail(&mut self) {}
}
