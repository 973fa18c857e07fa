use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// ErrInvalidOffer indicates an offer without a usable data section:
    /// missing media, wrong protocol, or missing ICE credentials.
    #[error("invalid offer: no DTLS/SCTP application section")]
    ErrInvalidOffer,

    /// ErrOfferMissingCredentials indicates a data section without
    /// ice-ufrag/ice-pwd attributes.
    #[error("invalid offer: missing ice credentials")]
    ErrOfferMissingCredentials,

    /// ErrOfferMissingFingerprint indicates an offer without a certificate
    /// fingerprint at either the session or the media level.
    #[error("invalid offer: missing certificate fingerprint")]
    ErrOfferMissingFingerprint,

    /// ErrInvalidCredentials indicates a malformed certificate or private
    /// key buffer at endpoint construction.
    #[error("bad certificate or private key PEM")]
    ErrInvalidCredentials,

    /// ErrStunAuthFailed indicates a STUN message whose fingerprint,
    /// integrity or username did not validate. Handled locally: the
    /// datagram is dropped.
    #[error("stun authentication failed")]
    ErrStunAuthFailed,

    /// ErrStunUsernameMismatch indicates a binding request whose USERNAME
    /// does not match the session credentials.
    #[error("stun username mismatch")]
    ErrStunUsernameMismatch,

    /// ErrUnknownStunTransaction indicates a binding response that does not
    /// answer any check in flight.
    #[error("stun response for unknown transaction")]
    ErrUnknownStunTransaction,

    /// ErrEmptyCandidateSet indicates primary() on an empty candidate set.
    #[error("candidate set is empty")]
    ErrEmptyCandidateSet,

    /// ErrNoRemoteCertificate indicates the peer completed the DTLS
    /// handshake without presenting a certificate.
    #[error("no remote certificate")]
    ErrNoRemoteCertificate,

    /// ErrFingerprintMismatch indicates the peer certificate does not hash
    /// to the fingerprint declared in the offer.
    #[error("peer certificate fingerprint mismatch")]
    ErrFingerprintMismatch,

    /// ErrInvalidSessionState indicates an operation that is not legal in
    /// the session's current state.
    #[error("invalid session state transition")]
    ErrInvalidSessionState,

    /// ErrSessionClosed indicates an operation on a closed session.
    #[error("session closed")]
    ErrSessionClosed,

    /// ErrSessionNotFound indicates no live session matches the requested
    /// peer username fragment.
    #[error("no session for username fragment")]
    ErrSessionNotFound,

    /// ErrAddressesNotDiscovered indicates an answer was requested before
    /// the endpoint discovered its public and internal addresses.
    #[error("endpoint addresses not discovered yet")]
    ErrAddressesNotDiscovered,

    /// ErrSignallingBadRequest indicates a malformed signalling body or a
    /// wrong `type` field; hosts map it to a 4xx response.
    #[error("bad signalling request")]
    ErrSignallingBadRequest,

    /// ErrDataChannelClosed indicates a read or write on a closed channel.
    #[error("data channel closed")]
    ErrDataChannelClosed,

    #[error("IoError: {0}")]
    ErrIoError(#[from] std::io::Error),
    #[error("SdpError: {0}")]
    ErrSdpError(#[from] sdp::Error),
    #[error("StunError: {0}")]
    ErrStunError(#[from] stun::Error),
    #[error("DtlsError: {0}")]
    ErrDtlsError(#[from] dtls::Error),
    #[error("SctpError: {0}")]
    ErrSctpError(#[from] sctp::Error),
    #[error("UtilError: {0}")]
    ErrUtilError(#[from] util::Error),
    #[error("JsonError: {0}")]
    ErrJsonError(#[from] serde_json::Error),

    #[error("{0}")]
    ErrOthers(String),
}
