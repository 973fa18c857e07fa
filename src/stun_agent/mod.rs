
pub mod attrs;

pub use attrs::{AttrControlling, PriorityAttr, UseCandidateAttr};

use crate::candidate::{host_priority, CandidateSet};
use crate::error::{Error, Result};

use log::{debug, trace, warn};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex as StdMutex};
use stun::agent::TransactionId;
use stun::attributes::ATTR_USERNAME;
use stun::fingerprint::FINGERPRINT;
use stun::integrity::MessageIntegrity;
use stun::message::{Message, BINDING_REQUEST, BINDING_SUCCESS};
use stun::textattrs::Username;
use stun::xoraddr::XorMappedAddress;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, Mutex};
use tokio::time::Duration;

/// The server always assumes the controlling role; a fixed tie-breaker is
/// acceptable because it never federates with another controlling agent.
pub const ICE_CONTROLLING_TIE_BREAKER: u64 = 0xffae_cc81_e3da_e860;

const CHECK_INTERVAL: Duration = Duration::from_secs(1);

// Checks answered after this many newer ones are treated as expired.
const MAX_PENDING_TRANSACTIONS: usize = 16;

/// Per-session STUN agent: answers inbound binding requests with the local
/// credentials, emits an aggressive-nomination check to the primary remote
/// candidate once per second, and verifies the success responses that drive
/// the ICE-connected transition.
pub struct StunAgent {
    socket: Arc<UdpSocket>,
    candidates: Arc<Mutex<CandidateSet>>,

    local_ufrag: String,
    local_pwd: String,
    peer_ufrag: String,
    peer_pwd: String,

    pending: StdMutex<Vec<TransactionId>>,
}

impl StunAgent {
    pub fn new(
        socket: Arc<UdpSocket>,
        candidates: Arc<Mutex<CandidateSet>>,
        local_ufrag: String,
        local_pwd: String,
        peer_ufrag: String,
        peer_pwd: String,
    ) -> Arc<Self> {
        Arc::new(StunAgent {
            socket,
            candidates,
            local_ufrag,
            local_pwd,
            peer_ufrag,
            peer_pwd,
            pending: StdMutex::new(vec![]),
        })
    }

    /// Spawns the periodic connectivity checker. The ticker is bound to the
    /// session: dropping the close sender ends it.
    pub(crate) fn start(self: &Arc<Self>, mut close_rx: mpsc::Receiver<()>) {
        let agent = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(CHECK_INTERVAL);
            loop {
                tokio::select! {
                    _ = close_rx.recv() => break,
                    _ = interval.tick() => {
                        if let Err(err) = agent.send_binding_check().await {
                            debug!("binding check not sent: {err}");
                        }
                    }
                }
            }
        });
    }

    /// Classifies and handles one inbound STUN datagram. Returns true when a
    /// verified binding success response arrived, i.e. a connectivity check
    /// completed. Validation errors mean drop: the caller logs them and
    /// nothing is sent back.
    pub(crate) async fn handle_datagram(&self, data: &[u8], src: SocketAddr) -> Result<bool> {
        let mut m = Message::new();
        m.write(data)?;

        if m.typ == BINDING_REQUEST {
            let res = self.answer_binding_request(&mut m, src)?;
            self.socket.send_to(&res.raw, src).await?;
            trace!("answered binding request from {src}");
            Ok(false)
        } else if m.typ == BINDING_SUCCESS {
            self.check_binding_response(&mut m)?;
            Ok(true)
        } else {
            trace!("ignoring stun message {} from {src}", m.typ);
            Ok(false)
        }
    }

    /// Validates an inbound Binding Request against the local credentials
    /// and builds the success response: fingerprint, then integrity keyed by
    /// the local password, then the exact USERNAME.
    pub fn answer_binding_request(&self, m: &mut Message, src: SocketAddr) -> Result<Message> {
        FINGERPRINT
            .check(m)
            .map_err(|_| Error::ErrStunAuthFailed)?;
        MessageIntegrity::new_short_term_integrity(self.local_pwd.clone())
            .check(m)
            .map_err(|_| Error::ErrStunAuthFailed)?;

        let username = Username::get_from_as(m, ATTR_USERNAME)
            .map_err(|_| Error::ErrStunAuthFailed)?
            .text;
        let expected = format!("{}:{}", self.local_ufrag, self.peer_ufrag);
        if username != expected {
            return Err(Error::ErrStunUsernameMismatch);
        }

        let mut res = Message::new();
        res.build(&[
            Box::new(m.clone()),
            Box::new(BINDING_SUCCESS),
            Box::new(XorMappedAddress {
                ip: src.ip(),
                port: src.port(),
            }),
            Box::new(MessageIntegrity::new_short_term_integrity(
                self.local_pwd.clone(),
            )),
            Box::new(FINGERPRINT),
        ])?;

        Ok(res)
    }

    /// Verifies a Binding Success Response: fingerprint, integrity keyed by
    /// the peer password, and a transaction id belonging to a check this
    /// agent actually sent.
    pub fn check_binding_response(&self, m: &mut Message) -> Result<()> {
        FINGERPRINT
            .check(m)
            .map_err(|_| Error::ErrStunAuthFailed)?;
        MessageIntegrity::new_short_term_integrity(self.peer_pwd.clone())
            .check(m)
            .map_err(|_| Error::ErrStunAuthFailed)?;

        let mut pending = self.pending.lock().unwrap();
        match pending.iter().position(|id| *id == m.transaction_id) {
            Some(at) => {
                pending.remove(at);
                Ok(())
            }
            None => Err(Error::ErrUnknownStunTransaction),
        }
    }

    /// Builds one outbound connectivity check: aggressive nomination, fixed
    /// controlling tie-breaker, the advertised host priority, integrity
    /// keyed by the peer password.
    pub fn build_binding_check(&self) -> Result<Message> {
        let username = format!("{}:{}", self.peer_ufrag, self.local_ufrag);

        let mut m = Message::new();
        m.build(&[
            Box::new(BINDING_REQUEST),
            Box::new(TransactionId::new()),
            Box::new(Username::new(ATTR_USERNAME, username)),
            Box::new(UseCandidateAttr),
            Box::new(AttrControlling(ICE_CONTROLLING_TIE_BREAKER)),
            Box::new(PriorityAttr(host_priority())),
            Box::new(MessageIntegrity::new_short_term_integrity(
                self.peer_pwd.clone(),
            )),
            Box::new(FINGERPRINT),
        ])?;

        Ok(m)
    }

    async fn send_binding_check(&self) -> Result<()> {
        let primary = {
            let candidates = self.candidates.lock().await;
            if candidates.is_empty() {
                return Ok(());
            }
            candidates.primary()?
        };

        let m = self.build_binding_check()?;
        {
            let mut pending = self.pending.lock().unwrap();
            pending.push(m.transaction_id);
            if pending.len() > MAX_PENDING_TRANSACTIONS {
                pending.remove(0);
            }
        }

        let target = SocketAddr::from((primary.address, primary.port));
        if let Err(err) = self.socket.send_to(&m.raw, target).await {
            warn!("check to {target} failed: {err}");
        }
        Ok(())
    }
}
