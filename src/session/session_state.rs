use std::fmt;

/// SessionState tracks how far a session has progressed through the
/// SDP → ICE → DTLS → SCTP pipeline. The state only ever advances, except
/// into Closed, which is reachable from anywhere.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum SessionState {
    /// The session exists but has not seen an offer yet.
    #[default]
    New,

    /// The offer is parsed and the peer credentials are captured.
    Offered,

    /// The UDP socket is bound; the STUN agent answers and emits checks.
    Listening,

    /// An outbound connectivity check succeeded; DTLS is under way.
    IceConnected,

    /// The DTLS handshake completed and the peer certificate matched.
    DtlsConnected,

    /// The SCTP association is up and incoming streams become channels.
    SctpReady,

    /// Terminal: the socket is released and the endpoint forgot the session.
    Closed,
}

const SESSION_STATE_NEW_STR: &str = "new";
const SESSION_STATE_OFFERED_STR: &str = "offered";
const SESSION_STATE_LISTENING_STR: &str = "listening";
const SESSION_STATE_ICE_CONNECTED_STR: &str = "ice-connected";
const SESSION_STATE_DTLS_CONNECTED_STR: &str = "dtls-connected";
const SESSION_STATE_SCTP_READY_STR: &str = "sctp-ready";
const SESSION_STATE_CLOSED_STR: &str = "closed";

impl SessionState {
    /// Whether moving to `next` respects the forward-only ordering.
    pub fn can_advance_to(self, next: SessionState) -> bool {
        if self == SessionState::Closed {
            return false;
        }
        next == SessionState::Closed || next > self
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            SessionState::New => SESSION_STATE_NEW_STR,
            SessionState::Offered => SESSION_STATE_OFFERED_STR,
            SessionState::Listening => SESSION_STATE_LISTENING_STR,
            SessionState::IceConnected => SESSION_STATE_ICE_CONNECTED_STR,
            SessionState::DtlsConnected => SESSION_STATE_DTLS_CONNECTED_STR,
            SessionState::SctpReady => SESSION_STATE_SCTP_READY_STR,
            SessionState::Closed => SESSION_STATE_CLOSED_STR,
        };
        write!(f, "{s}")
    }
}
