/// MatchFunc allows custom logic for mapping packets to a consumer.
pub type MatchFunc = Box<dyn (Fn(&[u8]) -> bool) + Send + Sync>;

/// match_range is a MatchFunc that accepts packets with the first byte in
/// [lower..upper].
pub fn match_range(lower: u8, upper: u8) -> MatchFunc {
    Box::new(move |buf: &[u8]| -> bool {
        if buf.is_empty() {
            return false;
        }
        let b = buf[0];
        b >= lower && b <= upper
    })
}

// RFC 7983 5 demultiplexing: the first byte of a datagram identifies the
// protocol sharing the socket.

/// match_stun is a MatchFunc that accepts STUN packets.
pub fn match_stun(b: &[u8]) -> bool {
    match_range(0, 3)(b)
}

/// match_dtls is a MatchFunc that accepts DTLS packets.
pub fn match_dtls(b: &[u8]) -> bool {
    match_range(20, 63)(b)
}
