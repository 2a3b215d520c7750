//! Peer-connection transport controller.
//!
//! Wraps a [`PeerSession`] with the bookkeeping a signaling peer needs:
//! remote candidates buffered until a remote description exists, debounced
//! renegotiation with an at-most-one-in-flight offer guarantee, ICE restart
//! deferred past an active gathering cycle, and a per-mid record of the
//! codecs bound to each transceiver so subscriber senders land on correctly
//! typed slots.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

use super::session::{GatheringState, PeerSession, SenderSlot, SessionTransceiver};
use crate::config::RtcConfig;
use crate::debounce::Debouncer;
use crate::error::Result;
use crate::types::{CodecCapability, IceCandidate, MediaKind, SdpKind, SessionDescription};

/// Options for a locally created offer.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfferOptions {
    /// Force a fresh ICE gathering and connectivity cycle.
    pub ice_restart: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NegotiationState {
    /// Idle; no offer outstanding.
    None,
    /// Local offer sent, waiting for the remote answer.
    AwaitingClient,
    /// Another negotiation was requested while awaiting the answer.
    RetryPending,
}

pub type OfferHandler = Arc<dyn Fn(SessionDescription) + Send + Sync>;

/// Per-peer transport controller and negotiation state machine.
pub struct PcTransport<S: PeerSession> {
    session: Arc<S>,
    debounced_negotiate: Debouncer,
    /// Held across engine calls so signaling mutations stay serialized.
    inner: Mutex<Inner>,
    on_offer: parking_lot::Mutex<Option<OfferHandler>>,
}

struct Inner {
    /// Codecs negotiated per mid, recorded on every successful offer.
    transceiver_codecs: HashMap<String, Vec<CodecCapability>>,
    /// Remote candidates received before the remote description.
    pending_candidates: Vec<IceCandidate>,
    restart_after_gathering: bool,
    negotiation_state: NegotiationState,
}

impl<S: PeerSession> PcTransport<S> {
    pub fn new(session: Arc<S>, config: &RtcConfig) -> Arc<Self> {
        let transport = Arc::new(Self {
            session: Arc::clone(&session),
            debounced_negotiate: Debouncer::new(config.negotiation_frequency()),
            inner: Mutex::new(Inner {
                transceiver_codecs: HashMap::new(),
                pending_candidates: Vec::new(),
                restart_after_gathering: false,
                negotiation_state: NegotiationState::None,
            }),
            on_offer: parking_lot::Mutex::new(None),
        });

        let hook = Arc::downgrade(&transport);
        session.on_gathering_complete(Arc::new(move || {
            let Some(transport) = hook.upgrade() else {
                return;
            };
            // hop off the engine callback before re-entering it
            tokio::spawn(async move {
                transport.restart_ice_after_gathering().await;
            });
        }));

        transport
    }

    /// Register the single sink for outbound offers. Set once, before the
    /// first negotiation.
    pub fn on_offer(&self, handler: impl Fn(SessionDescription) + Send + Sync + 'static) {
        *self.on_offer.lock() = Some(Arc::new(handler));
    }

    #[must_use]
    pub fn session(&self) -> &Arc<S> {
        &self.session
    }

    /// Queue or apply a remote ICE candidate.
    ///
    /// Candidates arriving before the remote description are buffered and
    /// drained, in order, by the first successful
    /// [`set_remote_description`](Self::set_remote_description).
    pub async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if self.session.remote_description().await.is_none() {
            inner.pending_candidates.push(candidate);
            return Ok(());
        }
        self.session.add_ice_candidate(candidate).await
    }

    /// Apply a remote description, drain buffered candidates, and honor a
    /// queued renegotiation when the description answers our offer.
    pub async fn set_remote_description(&self, sd: SessionDescription) -> Result<()> {
        let mut inner = self.inner.lock().await;

        let kind = sd.kind;
        self.session.set_remote_description(sd).await?;

        // negotiated; the in-flight offer, if any, is resolved
        let last_state = inner.negotiation_state;
        inner.negotiation_state = NegotiationState::None;

        let pending = std::mem::take(&mut inner.pending_candidates);
        for (index, candidate) in pending.iter().enumerate() {
            if let Err(error) = self.session.add_ice_candidate(candidate.clone()).await {
                // keep the unattempted tail for the next drain
                inner.pending_candidates = pending[index + 1..].to_vec();
                return Err(error);
            }
        }

        if last_state == NegotiationState::RetryPending && kind == SdpKind::Answer {
            debug!("re-negotiating after answering");
            if let Err(error) = self
                .create_and_send_offer_locked(&mut inner, OfferOptions::default())
                .await
            {
                error!(%error, "could not negotiate");
            }
        }
        Ok(())
    }

    /// Request renegotiation. Bursts within the quiet period collapse into
    /// a single offer attempt.
    pub fn negotiate(self: &Arc<Self>) {
        let transport = Arc::clone(self);
        self.debounced_negotiate.call(move || {
            tokio::spawn(async move {
                if let Err(error) = transport.create_and_send_offer(OfferOptions::default()).await
                {
                    error!(%error, "could not negotiate");
                }
            });
        });
    }

    pub async fn create_and_send_offer(&self, options: OfferOptions) -> Result<()> {
        let mut inner = self.inner.lock().await;
        self.create_and_send_offer_locked(&mut inner, options).await
    }

    async fn create_and_send_offer_locked(
        &self,
        inner: &mut Inner,
        options: OfferOptions,
    ) -> Result<()> {
        let Some(on_offer) = self.on_offer.lock().clone() else {
            return Ok(());
        };
        if self.session.is_closed() {
            return Ok(());
        }

        if options.ice_restart {
            if self.session.gathering_state() == GatheringState::Gathering {
                debug!("restart ICE after gathering");
                inner.restart_after_gathering = true;
                return Ok(());
            }
            debug!("restarting ICE");
        }

        match inner.negotiation_state {
            // an offer is in flight; let it finish rather than disturb it,
            // unless an ICE restart can roll back to the stable description
            NegotiationState::AwaitingClient => {
                match self.session.current_remote_description().await {
                    Some(current) if options.ice_restart => {
                        debug!("recovering from client negotiation state");
                        self.session.set_remote_description(current).await?;
                    }
                    _ => {
                        debug!("skipping negotiation, trying again later");
                        inner.negotiation_state = NegotiationState::RetryPending;
                        return Ok(());
                    }
                }
            }
            // a retry is already queued; this attempt is redundant
            NegotiationState::RetryPending => return Ok(()),
            NegotiationState::None => {}
        }

        let offer = match self.session.create_offer(options.ice_restart).await {
            Ok(offer) => offer,
            Err(error) => {
                error!(%error, "could not create offer");
                return Err(error);
            }
        };
        if let Err(error) = self.session.set_local_description(offer.clone()).await {
            error!(%error, "could not set local description");
            return Err(error);
        }

        inner.negotiation_state = NegotiationState::AwaitingClient;
        inner.restart_after_gathering = false;

        // record each sending transceiver's codecs; this is the ground
        // truth consulted when placing subscriber tracks
        for transceiver in self.session.transceivers().await {
            if transceiver.sender_slot().await != SenderSlot::Sending {
                continue;
            }
            let Some(mid) = transceiver.mid() else {
                continue;
            };
            inner
                .transceiver_codecs
                .insert(mid, transceiver.send_codecs().await);
        }

        // deliver off the lock; the signaling layer may call back in
        tokio::spawn(async move {
            on_offer(offer);
        });
        Ok(())
    }

    /// Find a free transceiver of the right kind whose negotiated codecs
    /// include `codec`. No fallback: `None` when nothing matches.
    pub async fn get_transceiver_for_sending(
        &self,
        kind: MediaKind,
        codec: &CodecCapability,
    ) -> Option<S::Transceiver> {
        let inner = self.inner.lock().await;
        for transceiver in self.session.transceivers().await {
            if transceiver.kind() != kind {
                continue;
            }
            if transceiver.sender_slot().await != SenderSlot::Empty {
                continue;
            }
            let Some(mid) = transceiver.mid() else {
                continue;
            };
            let codec_matches = inner
                .transceiver_codecs
                .get(&mid)
                .is_some_and(|codecs| codecs.iter().any(|c| c.mime_type == codec.mime_type));
            if codec_matches {
                return Some(transceiver);
            }
        }
        None
    }

    /// Close the transport. Idempotent; queued debounced work is dropped
    /// without firing.
    pub async fn close(&self) {
        self.debounced_negotiate.cancel();
        if let Err(error) = self.session.close().await {
            warn!(%error, "error closing peer connection");
        }
    }

    async fn restart_ice_after_gathering(&self) {
        let mut inner = self.inner.lock().await;
        if !inner.restart_after_gathering {
            return;
        }
        debug!("restarting ICE after ICE gathering");
        if let Err(error) = self
            .create_and_send_offer_locked(&mut inner, OfferOptions { ice_restart: true })
            .await
        {
            warn!(%error, "could not restart ICE");
        }
    }
}
