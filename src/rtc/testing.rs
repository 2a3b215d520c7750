//! Scriptable session fixtures for exercising the transport state machine
//! without a network.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;

use super::session::{
    GatheringCompleteHandler, GatheringState, PeerSession, SenderSlot, SessionTransceiver,
};
use crate::error::{Error, Result};
use crate::types::{CodecCapability, IceCandidate, MediaKind, SessionDescription};

/// Engine call observed by a [`MockSession`], in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOp {
    CreateOffer { ice_restart: bool },
    SetLocalDescription(SessionDescription),
    SetRemoteDescription(SessionDescription),
    AddIceCandidate(IceCandidate),
    Close,
}

#[derive(Default)]
struct MockState {
    ops: Vec<SessionOp>,
    remote_description: Option<SessionDescription>,
    current_remote_description: Option<SessionDescription>,
    gathering_state: GatheringState,
    closed: bool,
    offers_created: u32,
    fail_set_remote: bool,
    fail_add_candidate: bool,
    fail_create_offer: bool,
    transceivers: Vec<MockTransceiver>,
}

/// In-memory [`PeerSession`] with an operation log and scriptable failures.
#[derive(Default)]
pub struct MockSession {
    state: Mutex<MockState>,
    gathering_hook: Mutex<Option<GatheringCompleteHandler>>,
}

impl MockSession {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every engine call observed so far, in order.
    pub fn ops(&self) -> Vec<SessionOp> {
        self.state.lock().ops.clone()
    }

    pub fn offers_created(&self) -> u32 {
        self.state.lock().offers_created
    }

    pub fn set_gathering_state(&self, state: GatheringState) {
        self.state.lock().gathering_state = state;
    }

    /// Move gathering to `Complete` and fire the registered hook.
    pub fn complete_gathering(&self) {
        self.state.lock().gathering_state = GatheringState::Complete;
        let hook = self.gathering_hook.lock().clone();
        if let Some(hook) = hook {
            hook();
        }
    }

    /// Make the next `set_remote_description` fail.
    pub fn fail_next_set_remote(&self) {
        self.state.lock().fail_set_remote = true;
    }

    /// Make the next `add_ice_candidate` fail.
    pub fn fail_next_add_candidate(&self) {
        self.state.lock().fail_add_candidate = true;
    }

    pub fn fail_create_offer(&self, fail: bool) {
        self.state.lock().fail_create_offer = fail;
    }

    pub fn add_transceiver(&self, transceiver: MockTransceiver) {
        self.state.lock().transceivers.push(transceiver);
    }
}

#[async_trait]
impl PeerSession for MockSession {
    type Transceiver = MockTransceiver;

    async fn create_offer(&self, ice_restart: bool) -> Result<SessionDescription> {
        let mut state = self.state.lock();
        state.ops.push(SessionOp::CreateOffer { ice_restart });
        if state.fail_create_offer {
            return Err(Error::Signaling("injected offer failure".to_string()));
        }
        state.offers_created += 1;
        Ok(SessionDescription::offer(format!(
            "offer-{}",
            state.offers_created
        )))
    }

    async fn set_local_description(&self, sd: SessionDescription) -> Result<()> {
        self.state.lock().ops.push(SessionOp::SetLocalDescription(sd));
        Ok(())
    }

    async fn set_remote_description(&self, sd: SessionDescription) -> Result<()> {
        let mut state = self.state.lock();
        state.ops.push(SessionOp::SetRemoteDescription(sd.clone()));
        if state.fail_set_remote {
            state.fail_set_remote = false;
            return Err(Error::Signaling("injected set-remote failure".to_string()));
        }
        state.remote_description = Some(sd.clone());
        state.current_remote_description = Some(sd);
        Ok(())
    }

    async fn remote_description(&self) -> Option<SessionDescription> {
        self.state.lock().remote_description.clone()
    }

    async fn current_remote_description(&self) -> Option<SessionDescription> {
        self.state.lock().current_remote_description.clone()
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        let mut state = self.state.lock();
        state.ops.push(SessionOp::AddIceCandidate(candidate));
        if state.fail_add_candidate {
            state.fail_add_candidate = false;
            return Err(Error::Signaling("injected candidate failure".to_string()));
        }
        Ok(())
    }

    async fn transceivers(&self) -> Vec<MockTransceiver> {
        self.state.lock().transceivers.clone()
    }

    fn gathering_state(&self) -> GatheringState {
        self.state.lock().gathering_state
    }

    fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    fn on_gathering_complete(&self, hook: GatheringCompleteHandler) {
        *self.gathering_hook.lock() = Some(hook);
    }

    async fn close(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.ops.push(SessionOp::Close);
        state.closed = true;
        Ok(())
    }
}

struct MockTransceiverState {
    mid: Option<String>,
    kind: MediaKind,
    slot: SenderSlot,
    codecs: Vec<CodecCapability>,
}

/// Mutable transceiver double shared between the session and the test.
#[derive(Clone)]
pub struct MockTransceiver {
    inner: Arc<Mutex<MockTransceiverState>>,
}

impl MockTransceiver {
    pub fn new(
        mid: &str,
        kind: MediaKind,
        slot: SenderSlot,
        codecs: Vec<CodecCapability>,
    ) -> Self {
        Self {
            inner: Arc::new(Mutex::new(MockTransceiverState {
                mid: Some(mid.to_string()),
                kind,
                slot,
                codecs,
            })),
        }
    }

    pub fn set_sender_slot(&self, slot: SenderSlot) {
        self.inner.lock().slot = slot;
    }
}

#[async_trait]
impl SessionTransceiver for MockTransceiver {
    fn mid(&self) -> Option<String> {
        self.inner.lock().mid.clone()
    }

    fn kind(&self) -> MediaKind {
        self.inner.lock().kind
    }

    async fn sender_slot(&self) -> SenderSlot {
        self.inner.lock().slot
    }

    async fn send_codecs(&self) -> Vec<CodecCapability> {
        self.inner.lock().codecs.clone()
    }
}
