
use rand::{thread_rng, Rng};

/// ice-char = ALPHA / DIGIT / "+" / "/"
///
/// <https://tools.ietf.org/html/rfc5245#section-15.1>
const RUNES_ICE: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

const LEN_UFRAG: usize = 4;
const LEN_PWD: usize = 22;

/// Generates a random string of the requested length over the ICE alphabet.
/// The thread RNG is a CSPRNG reseeded from the OS.
pub fn generate_ice_string(n: usize) -> String {
    let mut rng = thread_rng();

    (0..n)
        .map(|_| {
            let idx = rng.gen_range(0..RUNES_ICE.len());
            RUNES_ICE[idx] as char
        })
        .collect()
}

/// Generates an ICE username fragment. The 4-character space is enough for
/// server-local session disambiguation.
pub fn generate_ufrag() -> String {
    generate_ice_string(LEN_UFRAG)
}

/// Generates an ICE password.
pub fn generate_pwd() -> String {
    generate_ice_string(LEN_PWD)
}
