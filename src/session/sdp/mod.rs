#[cfg(test)]
mod sdp_test;

use crate::candidate::{candidate_priority, CandidateKind, COMPONENT_RTP, LOCAL_PREFERENCE};
use crate::error::Result;
use crate::fingerprint::Fingerprint;

use log::debug;
use sdp::description::common::{Address, Attribute, ConnectionInformation};
use sdp::description::media::{MediaName, RangedPort};
use sdp::description::session::{Origin, TimeDescription};
use sdp::{MediaDescription, SessionDescription};
use std::io::Cursor;
use std::net::Ipv4Addr;

// The answer is a fixed shape; only credentials, fingerprint, mid and
// candidates vary.
const ANSWER_SESSION_ID: u64 = 3497579305088229251;
const ANSWER_SESSION_VERSION: u64 = 2;
const MEDIA_SECTION_APPLICATION: &str = "application";
const SCTP_PORT: u16 = 5000;

/// Structured view over an incoming offer.
#[derive(Debug, Default)]
pub struct ParsedOffer {
    pub media: Vec<MediaSection>,
    /// First mid of the first BUNDLE group, when the offer carries one.
    pub bundle_mid: Option<String>,
    pub session_fingerprint: Option<Fingerprint>,
}

#[derive(Debug, Default)]
pub struct MediaSection {
    pub protocol: String,
    pub ice_ufrag: Option<String>,
    pub ice_pwd: Option<String>,
    pub fingerprint: Option<Fingerprint>,
    pub candidates: Vec<OfferCandidate>,
}

/// An in-line candidate lifted from the offer. Only IPv4 candidates survive
/// parsing; everything else is skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfferCandidate {
    pub address: Ipv4Addr,
    pub port: u16,
    pub priority: u32,
    pub typ: String,
}

impl ParsedOffer {
    /// The media section this endpoint negotiates: the first one whose
    /// protocol carries DTLS/SCTP.
    pub fn data_section(&self) -> Option<&MediaSection> {
        self.media
            .iter()
            .find(|m| m.protocol.contains("DTLS/SCTP"))
    }

    /// The fingerprint pinning the peer certificate: session level wins over
    /// the media section.
    pub fn peer_fingerprint<'a>(&'a self, section: &'a MediaSection) -> Option<&'a Fingerprint> {
        self.session_fingerprint
            .as_ref()
            .or(section.fingerprint.as_ref())
    }
}

/// Parses the text of an offer into the structured view.
pub fn parse_offer(offer: &str) -> Result<ParsedOffer> {
    let mut reader = Cursor::new(offer.as_bytes());
    let sd = SessionDescription::unmarshal(&mut reader)?;

    let bundle_mid = sd
        .attribute("group")
        .and_then(|group| group.split_whitespace().nth(1))
        .map(ToOwned::to_owned);

    let session_fingerprint = sd
        .attribute("fingerprint")
        .and_then(|value| parse_fingerprint(value));

    let media = sd
        .media_descriptions
        .iter()
        .map(|md| MediaSection {
            protocol: md.media_name.protos.join("/"),
            ice_ufrag: flatten_attribute(md, "ice-ufrag"),
            ice_pwd: flatten_attribute(md, "ice-pwd"),
            fingerprint: md
                .attribute("fingerprint")
                .flatten()
                .and_then(parse_fingerprint),
            candidates: md
                .attributes
                .iter()
                .filter(|a| a.is_ice_candidate())
                .filter_map(|a| a.value.as_deref())
                .filter_map(parse_candidate)
                .collect(),
        })
        .collect();

    Ok(ParsedOffer {
        media,
        bundle_mid,
        session_fingerprint,
    })
}

fn flatten_attribute(md: &MediaDescription, key: &str) -> Option<String> {
    md.attribute(key).flatten().map(ToOwned::to_owned)
}

fn parse_fingerprint(value: &str) -> Option<Fingerprint> {
    let (algorithm, value) = value.split_once(' ')?;
    Some(Fingerprint {
        algorithm: algorithm.to_owned(),
        value: value.to_owned(),
    })
}

/// `<foundation> <component> <transport> <priority> <address> <port> typ <type> ...`
fn parse_candidate(value: &str) -> Option<OfferCandidate> {
    let fields: Vec<&str> = value.split_whitespace().collect();
    if fields.len() < 8 || fields[6] != "typ" {
        debug!("skipping malformed candidate {value:?}");
        return None;
    }

    let priority = fields[3].parse().ok()?;
    let address: Ipv4Addr = match fields[4].parse() {
        Ok(address) => address,
        Err(_) => {
            debug!("skipping non-IPv4 candidate {:?}", fields[4]);
            return None;
        }
    };
    let port = fields[5].parse().ok()?;

    Some(OfferCandidate {
        address,
        port,
        priority,
        typ: fields[7].to_owned(),
    })
}

/// A candidate the answer advertises.
#[derive(Debug, Copy, Clone)]
pub struct AnswerCandidate {
    pub address: Ipv4Addr,
    pub port: u16,
    pub kind: CandidateKind,
}

/// Everything that varies between answers.
#[derive(Debug, Default)]
pub struct AnswerParams {
    pub username: String,
    pub password: String,
    pub fingerprint: String,
    pub mid: String,
    pub candidates: Vec<AnswerCandidate>,
}

/// Serialises the answer. The shape is fixed: one application section,
/// active DTLS setup, SCTP on port 5000 bundled under the offered mid.
pub fn create_answer(params: &AnswerParams) -> String {
    let mut media = MediaDescription {
        media_name: MediaName {
            media: MEDIA_SECTION_APPLICATION.to_owned(),
            port: RangedPort {
                value: 9,
                range: None,
            },
            protos: vec!["DTLS".to_owned(), "SCTP".to_owned()],
            formats: vec![SCTP_PORT.to_string()],
        },
        media_title: None,
        connection_information: Some(ConnectionInformation {
            network_type: "IN".to_owned(),
            address_type: "IP4".to_owned(),
            address: Some(Address {
                address: "0.0.0.0".to_owned(),
                ttl: None,
                range: None,
            }),
        }),
        bandwidth: vec![],
        encryption_key: None,
        attributes: vec![],
    }
    .with_value_attribute("setup".to_owned(), "active".to_owned())
    .with_ice_credentials(params.username.clone(), params.password.clone())
    .with_value_attribute("mid".to_owned(), params.mid.clone())
    .with_fingerprint("sha-256".to_owned(), params.fingerprint.clone())
    .with_value_attribute(
        "sctpmap".to_owned(),
        format!("{SCTP_PORT} webrtc-datachannel 1024"),
    );

    let related = params
        .candidates
        .first()
        .map(|first| (first.address, first.port));
    for (foundation, candidate) in params.candidates.iter().enumerate() {
        // the first candidate is emitted bare, the rest relate back to it
        let related = if foundation == 0 { None } else { related };
        media = media.with_candidate(candidate_attribute_value(foundation, candidate, related));
    }

    SessionDescription {
        version: 0,
        origin: Origin {
            username: "-".to_owned(),
            session_id: ANSWER_SESSION_ID,
            session_version: ANSWER_SESSION_VERSION,
            network_type: "IN".to_owned(),
            address_type: "IP4".to_owned(),
            unicast_address: "127.0.0.1".to_owned(),
        },
        session_name: "-".to_owned(),
        time_descriptions: vec![TimeDescription::default()],
        attributes: vec![
            Attribute::new("group".to_owned(), Some(format!("BUNDLE {}", params.mid))),
            Attribute::new("msid-semantic".to_owned(), Some(" WMS".to_owned())),
        ],
        media_descriptions: vec![media],
        ..Default::default()
    }
    .marshal()
}

/// Formats one `a=candidate` attribute value. Foundations are the zero-based
/// index of the candidate within the answer.
pub fn candidate_attribute_value(
    foundation: usize,
    candidate: &AnswerCandidate,
    related: Option<(Ipv4Addr, u16)>,
) -> String {
    let priority = candidate_priority(candidate.kind, LOCAL_PREFERENCE, COMPONENT_RTP);
    let mut value = format!(
        "{foundation} {COMPONENT_RTP} udp {priority} {} {} typ {}",
        candidate.address, candidate.port, candidate.kind
    );
    if let Some((raddr, rport)) = related {
        value.push_str(&format!(" raddr {raddr} rport {rport}"));
    }
    value
}
