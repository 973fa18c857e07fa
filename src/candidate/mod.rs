
use crate::error::{Error, Result};

use std::fmt;
use std::net::Ipv4Addr;

/// Local preference used for every candidate this endpoint advertises; a
/// single-homed server has no interface ranking to express.
pub const LOCAL_PREFERENCE: u16 = 30;

/// Data channels use a single ICE component.
pub const COMPONENT_RTP: u32 = 1;

/// The candidate type, ordered by how directly it reaches the peer.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum CandidateKind {
    #[default]
    Host,
    PeerReflexive,
    ServerReflexive,
    Relay,
}

impl CandidateKind {
    /// RFC 8445 4.2 recommended type preferences.
    pub const fn type_preference(self) -> u32 {
        match self {
            CandidateKind::Host => 126,
            CandidateKind::PeerReflexive => 110,
            CandidateKind::ServerReflexive => 100,
            CandidateKind::Relay => 0,
        }
    }
}

impl fmt::Display for CandidateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            CandidateKind::Host => "host",
            CandidateKind::PeerReflexive => "prflx",
            CandidateKind::ServerReflexive => "srflx",
            CandidateKind::Relay => "relay",
        };
        write!(f, "{s}")
    }
}

/// RFC 8445 5.1.2 candidate priority.
pub fn candidate_priority(kind: CandidateKind, local_preference: u16, component: u32) -> u32 {
    (1 << 24) * kind.type_preference() + (1 << 8) * local_preference as u32 + (256 - component)
}

/// Priority of the host candidate this endpoint advertises (2113937151).
pub fn host_priority() -> u32 {
    candidate_priority(CandidateKind::Host, LOCAL_PREFERENCE, COMPONENT_RTP)
}

/// Priority of the server-reflexive candidate this endpoint advertises
/// (1677729535).
pub fn srflx_priority() -> u32 {
    candidate_priority(CandidateKind::ServerReflexive, LOCAL_PREFERENCE, COMPONENT_RTP)
}

/// A remote transport address a connectivity check may target.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub address: Ipv4Addr,
    pub port: u16,
    pub priority: u32,
}

/// Priority-ordered collection of remote candidates. Candidates are only
/// appended, never removed; duplicates are allowed.
#[derive(Debug, Default)]
pub struct CandidateSet {
    // descending priority, ties in insertion order
    candidates: Vec<Candidate>,
}

impl CandidateSet {
    pub fn new() -> Self {
        CandidateSet::default()
    }

    /// Inserts keeping the internal order by descending priority. An equal
    /// priority lands after the candidates already present.
    pub fn push(&mut self, address: Ipv4Addr, port: u16, priority: u32) {
        let candidate = Candidate {
            address,
            port,
            priority,
        };
        let at = self
            .candidates
            .iter()
            .position(|c| c.priority < priority)
            .unwrap_or(self.candidates.len());
        self.candidates.insert(at, candidate);
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Returns the highest-priority candidate.
    pub fn primary(&self) -> Result<Candidate> {
        self.candidates
            .first()
            .copied()
            .ok_or(Error::ErrEmptyCandidateSet)
    }
}
