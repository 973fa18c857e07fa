
use crate::candidate::CandidateKind;
use crate::endpoint::Endpoint;
use crate::error::{Error, Result};
use crate::session::sdp::{candidate_attribute_value, AnswerCandidate};

use base64::prelude::BASE64_STANDARD;
use base64::Engine;
use log::debug;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::sync::Arc;

/// `{"type": "offer" | "answer", "sdp": "..."}` as exchanged with a browser.
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionDescriptionMessage {
    #[serde(rename = "type")]
    pub typ: String,
    pub sdp: String,
}

/// A trickled candidate addressed by the peer's own username fragment.
#[derive(Debug, Serialize, Deserialize)]
pub struct CandidateMessage {
    pub ip: String,
    pub port: u16,
    pub username: String,
    pub priority: u32,
}

/// One entry of the legacy candidate listing.
#[derive(Debug, Serialize, Deserialize)]
pub struct CandidateEntry {
    pub candidate: String,
    #[serde(rename = "sdpMLineIndex")]
    pub sdp_mline_index: u32,
    #[serde(rename = "sdpMid")]
    pub sdp_mid: String,
    #[serde(rename = "usernameFragment")]
    pub username_fragment: String,
}

/// Transport-agnostic signalling surface. A host binds these three
/// operations to whatever request/response channel it runs — typically a
/// small HTTP server, but nothing here assumes one.
pub struct Signaling {
    endpoint: Arc<Endpoint>,
}

impl Signaling {
    pub fn new(endpoint: Arc<Endpoint>) -> Self {
        Signaling { endpoint }
    }

    /// Answers an offer: creates a session and negotiates it. A body whose
    /// type is not "offer" is a bad request; an unusable offer rejects and
    /// the session is discarded.
    pub async fn offer(&self, body: SessionDescriptionMessage) -> Result<SessionDescriptionMessage> {
        if body.typ != "offer" {
            return Err(Error::ErrSignallingBadRequest);
        }

        let session = self.endpoint.create_session().await;
        match session.create_answer(&body.sdp).await {
            Ok(sdp) => Ok(SessionDescriptionMessage {
                typ: "answer".to_owned(),
                sdp,
            }),
            Err(err) => {
                session.close().await;
                Err(err)
            }
        }
    }

    /// Accepts a trickled candidate. Fire and forget: the reply is an empty
    /// acknowledgement whether or not a session matched.
    pub async fn candidate(&self, body: CandidateMessage) -> Result<()> {
        let address: Ipv4Addr = match body.ip.parse() {
            Ok(address) => address,
            Err(_) => {
                debug!("ignoring non-IPv4 trickled candidate {:?}", body.ip);
                return Ok(());
            }
        };

        match self.endpoint.session_by_peer_ufrag(&body.username).await {
            Some(session) => {
                if let Err(err) = session
                    .append_candidate(address, body.port, body.priority)
                    .await
                {
                    debug!("trickled candidate not appended: {err}");
                }
            }
            None => debug!("no session for peer ufrag {:?}", body.username),
        }
        Ok(())
    }

    /// The legacy pull path: the peer ufrag arrives base64-encoded and the
    /// reply lists the same two candidates the answer advertises.
    pub async fn candidates(&self, username_base64: &str) -> Result<Vec<CandidateEntry>> {
        let ufrag = BASE64_STANDARD
            .decode(username_base64)
            .ok()
            .and_then(|raw| String::from_utf8(raw).ok())
            .ok_or(Error::ErrSignallingBadRequest)?;

        let session = self
            .endpoint
            .session_by_peer_ufrag(&ufrag)
            .await
            .ok_or(Error::ErrSessionNotFound)?;
        let (internal_ip, public_ip) = self.endpoint.addresses()?;
        let port = session.port().await.ok_or(Error::ErrInvalidSessionState)?;

        let host = AnswerCandidate {
            address: internal_ip,
            port,
            kind: CandidateKind::Host,
        };
        let srflx = AnswerCandidate {
            address: public_ip,
            port,
            kind: CandidateKind::ServerReflexive,
        };

        Ok(vec![
            self.entry(0, &host, None, session.local_ufrag()),
            self.entry(1, &srflx, Some((internal_ip, port)), session.local_ufrag()),
        ])
    }

    /// offer over a raw JSON body, for hosts that hand bytes through.
    pub async fn offer_json(&self, body: &[u8]) -> Result<String> {
        let message: SessionDescriptionMessage =
            serde_json::from_slice(body).map_err(|_| Error::ErrSignallingBadRequest)?;
        let answer = self.offer(message).await?;
        Ok(serde_json::to_string(&answer)?)
    }

    /// candidate over a raw JSON body.
    pub async fn candidate_json(&self, body: &[u8]) -> Result<()> {
        let message: CandidateMessage =
            serde_json::from_slice(body).map_err(|_| Error::ErrSignallingBadRequest)?;
        self.candidate(message).await
    }

    fn entry(
        &self,
        foundation: usize,
        candidate: &AnswerCandidate,
        related: Option<(Ipv4Addr, u16)>,
        username_fragment: &str,
    ) -> CandidateEntry {
        CandidateEntry {
            candidate: format!(
                "candidate:{}",
                candidate_attribute_value(foundation, candidate, related)
            ),
            sdp_mline_index: 0,
            sdp_mid: "data".to_owned(),
            username_fragment: username_fragment.to_owned(),
        }
    }
}
