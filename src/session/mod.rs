#[cfg(test)]
mod session_test;

pub mod sdp;
pub mod session_state;

pub use session_state::SessionState;

use crate::candidate::{Candidate, CandidateKind, CandidateSet};
use crate::credential::{generate_pwd, generate_ufrag};
use crate::data_channel::DataChannel;
use crate::endpoint::Endpoint;
use crate::error::{Error, Result};
use crate::fingerprint::Fingerprint;
use crate::mux::{match_dtls, match_stun, UnicastConn};
use crate::session::sdp::{create_answer, parse_offer, AnswerCandidate, AnswerParams};
use crate::stun_agent::StunAgent;
use crate::RECEIVE_MTU;

use dtls::config::{Config as DtlsConfig, ExtendedMasterSecretType};
use dtls::conn::DTLSConn;
use log::{debug, trace, warn};
use sctp::association::{Association, Config as SctpConfig};
use std::future::Future;
use std::net::{Ipv4Addr, SocketAddr};
use std::pin::Pin;
use std::sync::{Arc, Weak};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, Mutex};
use util::Conn;

pub type OnStateChangeHdlrFn = Box<
    dyn (FnMut(SessionState) -> Pin<Box<dyn Future<Output = ()> + Send + 'static>>)
        + Send
        + Sync,
>;

pub type OnDataChannelHdlrFn = Box<
    dyn (FnMut(Arc<DataChannel>) -> Pin<Box<dyn Future<Output = ()> + Send + 'static>>)
        + Send
        + Sync,
>;

pub type OnRemoteCandidateHdlrFn = Box<
    dyn (FnMut(Candidate) -> Pin<Box<dyn Future<Output = ()> + Send + 'static>>) + Send + Sync,
>;

pub type OnErrorHdlrFn =
    Box<dyn (FnMut(Error) -> Pin<Box<dyn Future<Output = ()> + Send + 'static>>) + Send + Sync>;

pub type OnCloseHdlrFn =
    Box<dyn (FnMut() -> Pin<Box<dyn Future<Output = ()> + Send + 'static>>) + Send + Sync>;

/// Credentials and fingerprint the offer declared for the peer. Immutable
/// once captured.
#[derive(Debug, Default, Clone)]
struct PeerParameters {
    ufrag: String,
    pwd: String,
    fingerprint: Fingerprint,
}

/// One negotiated connection: owns the UDP socket and sequences
/// SDP → ICE → DTLS → SCTP → DataChannel over it.
pub struct Session {
    local_ufrag: String,
    local_pwd: String,
    endpoint: Weak<Endpoint>,

    state: Mutex<SessionState>,
    peer: Mutex<Option<PeerParameters>>,
    answer: Mutex<Option<String>>,

    socket: Mutex<Option<Arc<UdpSocket>>>,
    candidates: Arc<Mutex<CandidateSet>>,
    unicast: Mutex<Option<Arc<UnicastConn>>>,
    stun_agent: Mutex<Option<Arc<StunAgent>>>,
    dtls_conn: Mutex<Option<Arc<DTLSConn>>>,
    association: Mutex<Option<Arc<Association>>>,

    // dropping the senders stops the demux loop and the check ticker
    close_txs: Mutex<Vec<mpsc::Sender<()>>>,

    on_state_change_handler: Arc<Mutex<Option<OnStateChangeHdlrFn>>>,
    on_data_channel_handler: Arc<Mutex<Option<OnDataChannelHdlrFn>>>,
    on_remote_candidate_handler: Arc<Mutex<Option<OnRemoteCandidateHdlrFn>>>,
    on_error_handler: Arc<Mutex<Option<OnErrorHdlrFn>>>,
    on_close_handler: Arc<Mutex<Option<OnCloseHdlrFn>>>,
}

impl Session {
    pub(crate) fn new(endpoint: Weak<Endpoint>) -> Arc<Self> {
        Arc::new(Session {
            local_ufrag: generate_ufrag(),
            local_pwd: generate_pwd(),
            endpoint,
            state: Mutex::new(SessionState::New),
            peer: Mutex::new(None),
            answer: Mutex::new(None),
            socket: Mutex::new(None),
            candidates: Arc::new(Mutex::new(CandidateSet::new())),
            unicast: Mutex::new(None),
            stun_agent: Mutex::new(None),
            dtls_conn: Mutex::new(None),
            association: Mutex::new(None),
            close_txs: Mutex::new(vec![]),
            on_state_change_handler: Arc::new(Mutex::new(None)),
            on_data_channel_handler: Arc::new(Mutex::new(None)),
            on_remote_candidate_handler: Arc::new(Mutex::new(None)),
            on_error_handler: Arc::new(Mutex::new(None)),
            on_close_handler: Arc::new(Mutex::new(None)),
        })
    }

    pub fn local_ufrag(&self) -> &str {
        &self.local_ufrag
    }

    pub fn local_pwd(&self) -> &str {
        &self.local_pwd
    }

    pub async fn state(&self) -> SessionState {
        *self.state.lock().await
    }

    /// The ufrag the peer declared in its offer, once an offer was seen.
    pub async fn peer_ufrag(&self) -> Option<String> {
        self.peer.lock().await.as_ref().map(|p| p.ufrag.clone())
    }

    /// The serialised answer, once composed.
    pub async fn answer(&self) -> Option<String> {
        self.answer.lock().await.clone()
    }

    /// The local port of the bound UDP socket.
    pub async fn port(&self) -> Option<u16> {
        match &*self.socket.lock().await {
            Some(socket) => socket.local_addr().ok().map(|a| a.port()),
            None => None,
        }
    }

    /// The remote target connectivity currently points at.
    pub async fn remote_target(&self) -> Option<SocketAddr> {
        self.unicast.lock().await.as_ref().map(|u| u.remote())
    }

    /// on_state_change sets a handler fired after every state transition.
    pub async fn on_state_change(&self, f: OnStateChangeHdlrFn) {
        let mut handler = self.on_state_change_handler.lock().await;
        *handler = Some(f);
    }

    /// on_data_channel sets a handler fired for every incoming stream the
    /// peer opens once the association is up.
    pub async fn on_data_channel(&self, f: OnDataChannelHdlrFn) {
        let mut handler = self.on_data_channel_handler.lock().await;
        *handler = Some(f);
    }

    /// on_remote_candidate sets a handler fired for every trickled candidate.
    pub async fn on_remote_candidate(&self, f: OnRemoteCandidateHdlrFn) {
        let mut handler = self.on_remote_candidate_handler.lock().await;
        *handler = Some(f);
    }

    /// on_error sets a handler fired when the session dies of a transport or
    /// handshake failure. close follows.
    pub async fn on_error(&self, f: OnErrorHdlrFn) {
        let mut handler = self.on_error_handler.lock().await;
        *handler = Some(f);
    }

    /// on_close sets a handler fired once, after teardown finished.
    pub async fn on_close(&self, f: OnCloseHdlrFn) {
        let mut handler = self.on_close_handler.lock().await;
        *handler = Some(f);
    }

    /// Consumes an offer and produces the answer: captures the peer
    /// credentials and fingerprint, seeds inline candidates, binds the UDP
    /// socket, starts the STUN agent and composes the serialised answer.
    pub async fn create_answer(self: &Arc<Self>, offer: &str) -> Result<String> {
        let parsed = parse_offer(offer)?;
        let section = parsed.data_section().ok_or(Error::ErrInvalidOffer)?;
        let peer_ufrag = section
            .ice_ufrag
            .clone()
            .ok_or(Error::ErrOfferMissingCredentials)?;
        let peer_pwd = section
            .ice_pwd
            .clone()
            .ok_or(Error::ErrOfferMissingCredentials)?;
        let peer_fingerprint = parsed
            .peer_fingerprint(section)
            .cloned()
            .ok_or(Error::ErrOfferMissingFingerprint)?;
        let mid = parsed
            .bundle_mid
            .clone()
            .unwrap_or_else(|| "data".to_owned());

        let endpoint = self.endpoint.upgrade().ok_or(Error::ErrSessionClosed)?;
        let (internal_ip, public_ip) = endpoint.addresses()?;

        if !self.transition(SessionState::New, SessionState::Offered).await {
            return Err(Error::ErrInvalidSessionState);
        }
        {
            let mut peer = self.peer.lock().await;
            *peer = Some(PeerParameters {
                ufrag: peer_ufrag.clone(),
                pwd: peer_pwd.clone(),
                fingerprint: peer_fingerprint,
            });
        }

        let socket =
            Arc::new(UdpSocket::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))).await?);
        let port = socket.local_addr()?.port();
        {
            let mut slot = self.socket.lock().await;
            *slot = Some(Arc::clone(&socket));
        }

        for candidate in &section.candidates {
            self.push_candidate(candidate.address, candidate.port, candidate.priority)
                .await?;
        }

        if !self
            .transition(SessionState::Offered, SessionState::Listening)
            .await
        {
            return Err(Error::ErrInvalidSessionState);
        }

        let agent = StunAgent::new(
            Arc::clone(&socket),
            Arc::clone(&self.candidates),
            self.local_ufrag.clone(),
            self.local_pwd.clone(),
            peer_ufrag,
            peer_pwd,
        );
        {
            let mut slot = self.stun_agent.lock().await;
            *slot = Some(Arc::clone(&agent));
        }

        let (checker_tx, checker_rx) = mpsc::channel(1);
        let (demux_tx, demux_rx) = mpsc::channel(1);
        {
            let mut close_txs = self.close_txs.lock().await;
            close_txs.push(checker_tx);
            close_txs.push(demux_tx);
        }
        agent.start(checker_rx);
        self.spawn_demux_loop(socket, agent, demux_rx);

        let params = AnswerParams {
            username: self.local_ufrag.clone(),
            password: self.local_pwd.clone(),
            fingerprint: endpoint.fingerprint().to_owned(),
            mid,
            candidates: vec![
                AnswerCandidate {
                    address: internal_ip,
                    port,
                    kind: CandidateKind::Host,
                },
                AnswerCandidate {
                    address: public_ip,
                    port,
                    kind: CandidateKind::ServerReflexive,
                },
            ],
        };
        let answer = create_answer(&params);
        {
            let mut slot = self.answer.lock().await;
            *slot = Some(answer.clone());
        }

        Ok(answer)
    }

    /// Appends a trickled candidate. The set insertion and the unicast
    /// retarget are atomic under the candidate lock.
    pub async fn append_candidate(
        &self,
        address: Ipv4Addr,
        port: u16,
        priority: u32,
    ) -> Result<()> {
        {
            let state = self.state.lock().await;
            if *state < SessionState::Offered {
                return Err(Error::ErrInvalidSessionState);
            }
            if *state == SessionState::Closed {
                return Err(Error::ErrSessionClosed);
            }
        }

        self.push_candidate(address, port, priority).await?;

        let mut handler = self.on_remote_candidate_handler.lock().await;
        if let Some(f) = &mut *handler {
            f(Candidate {
                address,
                port,
                priority,
            })
            .await;
        }
        Ok(())
    }

    async fn push_candidate(&self, address: Ipv4Addr, port: u16, priority: u32) -> Result<()> {
        let mut candidates = self.candidates.lock().await;
        candidates.push(address, port, priority);
        let primary = candidates.primary()?;
        let target = SocketAddr::from((primary.address, primary.port));

        let mut unicast = self.unicast.lock().await;
        match &*unicast {
            Some(conn) => conn.set_remote(target),
            None => {
                let socket = { self.socket.lock().await.clone() };
                if let Some(socket) = socket {
                    *unicast = Some(Arc::new(UnicastConn::new(socket, target)));
                }
            }
        }
        Ok(())
    }

    fn spawn_demux_loop(
        self: &Arc<Self>,
        socket: Arc<UdpSocket>,
        agent: Arc<StunAgent>,
        mut close_rx: mpsc::Receiver<()>,
    ) {
        let session = Arc::clone(self);
        tokio::spawn(async move {
            let mut buf = vec![0u8; RECEIVE_MTU];
            loop {
                tokio::select! {
                    _ = close_rx.recv() => break,
                    result = socket.recv_from(&mut buf) => {
                        match result {
                            Ok((n, src)) => session.handle_datagram(&agent, &buf[..n], src).await,
                            Err(err) => {
                                debug!("session {}: socket read ended: {err}", session.local_ufrag);
                                break;
                            }
                        }
                    }
                }
            }
        });
    }

    /// First-byte demultiplexing: STUN is handled here, DTLS flows to the
    /// unicast consumer, anything else is dropped.
    async fn handle_datagram(self: &Arc<Self>, agent: &Arc<StunAgent>, data: &[u8], src: SocketAddr) {
        if match_stun(data) {
            match agent.handle_datagram(data, src).await {
                Ok(true) => self.handle_ice_connected().await,
                Ok(false) => {}
                Err(err) => debug!("dropping stun datagram from {src}: {err}"),
            }
        } else if match_dtls(data) {
            let unicast = { self.unicast.lock().await.clone() };
            match unicast {
                Some(unicast) => {
                    if let Err(err) = unicast.feed(data).await {
                        debug!("dtls datagram not queued: {err}");
                    }
                }
                None => trace!("dtls datagram from {src} before any candidate, dropped"),
            }
        } else {
            trace!("unmatched datagram from {src}, dropped");
        }
    }

    /// Fired on the first verified connectivity check. Later successes keep
    /// refreshing the pair but trigger nothing.
    async fn handle_ice_connected(self: &Arc<Self>) {
        if !self
            .transition(SessionState::Listening, SessionState::IceConnected)
            .await
        {
            return;
        }

        let session = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(err) = session.run_transports().await {
                session.fail(err).await;
            }
        });
    }

    /// DTLS as client over the unicast view, then the SCTP server over DTLS,
    /// then incoming streams until the association ends.
    async fn run_transports(self: &Arc<Self>) -> Result<()> {
        let endpoint = self.endpoint.upgrade().ok_or(Error::ErrSessionClosed)?;
        let unicast = { self.unicast.lock().await.clone() }.ok_or(Error::ErrEmptyCandidateSet)?;
        let peer_fingerprint = { self.peer.lock().await.clone() }
            .ok_or(Error::ErrInvalidSessionState)?
            .fingerprint;

        let dtls_config = DtlsConfig {
            certificates: vec![endpoint.certificate().clone()],
            insecure_skip_verify: true,
            extended_master_secret: ExtendedMasterSecretType::Require,
            ..Default::default()
        };

        // a=setup:active — this side initiates the handshake
        let dtls_conn = Arc::new(
            DTLSConn::new(
                unicast as Arc<dyn Conn + Send + Sync>,
                dtls_config,
                true,
                None,
            )
            .await?,
        );

        // certificate pinning: the peer certificate must hash to the
        // fingerprint the offer declared
        let remote_certs = dtls_conn.connection_state().await.peer_certificates;
        if remote_certs.is_empty() {
            return Err(Error::ErrNoRemoteCertificate);
        }
        let remote_fingerprint = Fingerprint::sha256(&remote_certs[0]);
        if !remote_fingerprint.matches_value(&peer_fingerprint.value) {
            return Err(Error::ErrFingerprintMismatch);
        }

        {
            let mut slot = self.dtls_conn.lock().await;
            *slot = Some(Arc::clone(&dtls_conn));
        }
        if !self
            .transition(SessionState::IceConnected, SessionState::DtlsConnected)
            .await
        {
            return Ok(());
        }

        let association = Arc::new(
            Association::server(SctpConfig {
                net_conn: dtls_conn as Arc<dyn Conn + Send + Sync>,
                max_receive_buffer_size: 0,
                max_message_size: 0,
                name: String::new(),
            })
            .await?,
        );
        {
            let mut slot = self.association.lock().await;
            *slot = Some(Arc::clone(&association));
        }
        if !self
            .transition(SessionState::DtlsConnected, SessionState::SctpReady)
            .await
        {
            return Ok(());
        }

        while let Some(stream) = association.accept_stream().await {
            let channel = DataChannel::new(stream);
            debug!(
                "session {}: channel {} open",
                self.local_ufrag,
                channel.stream_identifier()
            );
            let mut handler = self.on_data_channel_handler.lock().await;
            if let Some(f) = &mut *handler {
                f(channel).await;
            }
        }

        debug!("session {}: association ended", self.local_ufrag);
        self.close().await;
        Ok(())
    }

    /// Tears the session down: stops the timers and the demux loop, closes
    /// the sub-agents, releases the socket and unregisters from the
    /// endpoint. Safe to call more than once.
    pub async fn close(self: &Arc<Self>) {
        if !self.transition_closed().await {
            return;
        }

        {
            let mut close_txs = self.close_txs.lock().await;
            close_txs.clear();
        }

        if let Some(association) = self.association.lock().await.take() {
            let _ = association.close().await;
        }
        if let Some(dtls_conn) = self.dtls_conn.lock().await.take() {
            let _ = dtls_conn.close().await;
        }
        if let Some(unicast) = self.unicast.lock().await.take() {
            unicast.close().await;
        }
        {
            let mut socket = self.socket.lock().await;
            *socket = None;
        }
        {
            let mut agent = self.stun_agent.lock().await;
            *agent = None;
        }

        if let Some(endpoint) = self.endpoint.upgrade() {
            endpoint.remove_session(&self.local_ufrag).await;
        }

        let mut handler = self.on_close_handler.lock().await;
        if let Some(f) = &mut *handler {
            f().await;
        }
    }

    /// Emits the error event and closes. Failures never cross session
    /// boundaries; siblings are untouched.
    async fn fail(self: &Arc<Self>, err: Error) {
        warn!("session {}: {err}", self.local_ufrag);
        {
            let mut handler = self.on_error_handler.lock().await;
            if let Some(f) = &mut *handler {
                f(err).await;
            }
        }
        self.close().await;
    }

    async fn transition(&self, from: SessionState, to: SessionState) -> bool {
        {
            let mut state = self.state.lock().await;
            if *state != from || !state.can_advance_to(to) {
                return false;
            }
            *state = to;
        }
        debug!("session {}: state {to}", self.local_ufrag);
        self.emit_state_change(to).await;
        true
    }

    async fn transition_closed(&self) -> bool {
        {
            let mut state = self.state.lock().await;
            if *state == SessionState::Closed {
                return false;
            }
            *state = SessionState::Closed;
        }
        debug!("session {}: state closed", self.local_ufrag);
        self.emit_state_change(SessionState::Closed).await;
        true
    }

    async fn emit_state_change(&self, state: SessionState) {
        let mut handler = self.on_state_change_handler.lock().await;
        if let Some(f) = &mut *handler {
            f(state).await;
        }
    }
}
