// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `uc_route`: dispatches a decoded inter-MCU message to whichever task
//! registered for its proto tag (`spec.md` §4.7).

use abi::ProtoTag;
use alloc::vec::Vec;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteError {
    Unregistered,
}

/// What a registered route does with a decoded message: most tasks just
/// want the bytes queued for their own poll loop, but a few (e.g. ack
/// bookkeeping) act immediately.
pub trait RouteHandler {
    fn handle(&mut self, tag: ProtoTag, payload: &[u8]);
}

pub const MAX_ROUTES: usize = 16;

pub struct Router<H> {
    routes: Vec<(ProtoTag, H)>,
}

impl<H: RouteHandler> Router<H> {
    pub fn new() -> Self {
        Self { routes: Vec::new() }
    }

    pub fn register(&mut self, tag: ProtoTag, handler: H) {
        self.routes.retain(|(t, _)| *t != tag);
        self.routes.push((tag, handler));
    }

    pub fn dispatch(&mut self, tag: ProtoTag, payload: &[u8]) -> Result<(), RouteError> {
        let handler = self
            .routes
            .iter_mut()
            .find(|(t, _)| *t == tag)
            .map(|(_, h)| h)
            .ok_or(RouteError::Unregistered)?;
        handler.handle(tag, payload);
        Ok(())
    }
}

impl<H: RouteHandler> Default for Router<H> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RecordingHandler {
        received: Vec<Vec<u8>>,
    }

    impl RouteHandler for RecordingHandler {
        fn handle(&mut self, _tag: ProtoTag, payload: &[u8]) {
            self.received.push(payload.to_vec());
        }
    }

    #[test]
    fn dispatches_to_registered_tag() {
        let mut router = Router::new();
        router.register(ProtoTag::FwupStart, RecordingHandler { received: Vec::new() });
        router.dispatch(ProtoTag::FwupStart, b"payload").unwrap();
        let (_, handler) = router.routes.iter().find(|(t, _)| *t == ProtoTag::FwupStart).unwrap();
        assert_eq!(handler.received, alloc::vec![b"payload".to_vec()]);
    }

    #[test]
    fn unregistered_tag_errors() {
        let mut router: Router<RecordingHandler> = Router::new();
        assert_eq!(router.dispatch(ProtoTag::FwupStart, b"x"), Err(RouteError::Unregistered));
    }
}
