
use crate::error::{Error, Result};
use crate::fingerprint::digest_sha256;
use crate::session::Session;

use async_trait::async_trait;
use dtls::crypto::{Certificate, CryptoPrivateKey};
use log::debug;
use std::collections::HashMap;
use std::future::Future;
use std::net::Ipv4Addr;
use std::pin::Pin;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Mutex;

pub type OnSessionHdlrFn = Box<
    dyn (FnMut(Arc<Session>) -> Pin<Box<dyn Future<Output = ()> + Send + 'static>>) + Send + Sync,
>;

pub type OnReadyHdlrFn =
    Box<dyn (FnMut() -> Pin<Box<dyn Future<Output = ()> + Send + 'static>>) + Send + Sync>;

/// How the endpoint learns the addresses it advertises in answers. Discovery
/// itself (external STUN, an HTTP probe, interface enumeration) lives with
/// the host.
#[async_trait]
pub trait AddressDiscovery {
    async fn public_ipv4(&self) -> Result<Ipv4Addr>;
    async fn internal_ipv4(&self) -> Result<Ipv4Addr>;
}

/// Fixed addresses, for deployments that already know them and for tests.
pub struct StaticAddresses {
    pub public_ip: Ipv4Addr,
    pub internal_ip: Ipv4Addr,
}

#[async_trait]
impl AddressDiscovery for StaticAddresses {
    async fn public_ipv4(&self) -> Result<Ipv4Addr> {
        Ok(self.public_ip)
    }

    async fn internal_ipv4(&self) -> Result<Ipv4Addr> {
        Ok(self.internal_ip)
    }
}

/// Process-wide endpoint: holds the server identity and the live sessions.
pub struct Endpoint {
    certificate: Certificate,
    fingerprint: String,

    // (internal, public), set once start() finished discovery
    addresses: StdMutex<Option<(Ipv4Addr, Ipv4Addr)>>,

    sessions: Mutex<HashMap<String, Arc<Session>>>,

    on_session_handler: Arc<Mutex<Option<OnSessionHdlrFn>>>,
    on_ready_handler: Arc<Mutex<Option<OnReadyHdlrFn>>>,
}

impl Endpoint {
    /// Builds the endpoint identity from PEM-encoded certificate and private
    /// key buffers. The fingerprint is computed over the certificate's DER
    /// body, the way it will be advertised in every answer.
    pub fn new(cert_pem: &[u8], key_pem: &[u8]) -> Result<Arc<Self>> {
        let cert_der = pem_certificate_der(cert_pem)?;
        let fingerprint = digest_sha256(&cert_der);

        let key_str = std::str::from_utf8(key_pem).map_err(|_| Error::ErrInvalidCredentials)?;
        let key_pair =
            rcgen::KeyPair::from_pem(key_str).map_err(|_| Error::ErrInvalidCredentials)?;
        let private_key = CryptoPrivateKey::from_key_pair(&key_pair)
            .map_err(|_| Error::ErrInvalidCredentials)?;

        let certificate = Certificate {
            certificate: vec![rustls::pki_types::CertificateDer::from(cert_der)],
            private_key,
        };

        Ok(Arc::new(Endpoint {
            certificate,
            fingerprint,
            addresses: StdMutex::new(None),
            sessions: Mutex::new(HashMap::new()),
            on_session_handler: Arc::new(Mutex::new(None)),
            on_ready_handler: Arc::new(Mutex::new(None)),
        }))
    }

    /// on_session sets a handler fired for every created session.
    pub async fn on_session(&self, f: OnSessionHdlrFn) {
        let mut handler = self.on_session_handler.lock().await;
        *handler = Some(f);
    }

    /// on_ready sets a handler fired once address discovery finished.
    pub async fn on_ready(&self, f: OnReadyHdlrFn) {
        let mut handler = self.on_ready_handler.lock().await;
        *handler = Some(f);
    }

    /// Discovers the public and internal IPv4 concurrently and stores them.
    pub async fn start(&self, discovery: &(dyn AddressDiscovery + Send + Sync)) -> Result<()> {
        let (public_ip, internal_ip) =
            tokio::try_join!(discovery.public_ipv4(), discovery.internal_ipv4())?;
        {
            let mut addresses = self.addresses.lock().unwrap();
            *addresses = Some((internal_ip, public_ip));
        }
        debug!("endpoint ready: internal {internal_ip}, public {public_ip}");

        let mut handler = self.on_ready_handler.lock().await;
        if let Some(f) = &mut *handler {
            f().await;
        }
        Ok(())
    }

    /// The advertised (internal, public) address pair.
    pub fn addresses(&self) -> Result<(Ipv4Addr, Ipv4Addr)> {
        self.addresses
            .lock()
            .unwrap()
            .ok_or(Error::ErrAddressesNotDiscovered)
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub(crate) fn certificate(&self) -> &Certificate {
        &self.certificate
    }

    /// Constructs and registers a new session.
    pub async fn create_session(self: &Arc<Self>) -> Arc<Session> {
        let session = Session::new(Arc::downgrade(self));
        {
            let mut sessions = self.sessions.lock().await;
            sessions.insert(session.local_ufrag().to_owned(), Arc::clone(&session));
        }
        debug!("session {} created", session.local_ufrag());

        let mut handler = self.on_session_handler.lock().await;
        if let Some(f) = &mut *handler {
            f(Arc::clone(&session)).await;
        }
        session
    }

    /// Live session count.
    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Finds the session negotiating with the peer that declared `ufrag`.
    pub async fn session_by_peer_ufrag(&self, ufrag: &str) -> Option<Arc<Session>> {
        let sessions: Vec<Arc<Session>> = {
            let sessions = self.sessions.lock().await;
            sessions.values().cloned().collect()
        };
        for session in sessions {
            if session.peer_ufrag().await.as_deref() == Some(ufrag) {
                return Some(session);
            }
        }
        None
    }

    pub(crate) async fn remove_session(&self, local_ufrag: &str) {
        let mut sessions = self.sessions.lock().await;
        if sessions.remove(local_ufrag).is_some() {
            debug!("session {local_ufrag} removed");
        }
    }

    /// Closes every live session.
    pub async fn close(&self) {
        let sessions: Vec<Arc<Session>> = {
            let sessions = self.sessions.lock().await;
            sessions.values().cloned().collect()
        };
        for session in sessions {
            session.close().await;
        }
    }
}

/// Pulls the DER body out of a PEM certificate buffer.
fn pem_certificate_der(cert_pem: &[u8]) -> Result<Vec<u8>> {
    let blocks = pem::parse_many(cert_pem).map_err(|_| Error::ErrInvalidCredentials)?;
    blocks
        .into_iter()
        .find(|block| block.tag() == "CERTIFICATE")
        .map(|block| block.into_contents())
        .ok_or(Error::ErrInvalidCredentials)
}
