use super::*;

use crate::endpoint::StaticAddresses;

use stun::attributes::ATTR_USERNAME;
use stun::fingerprint::FINGERPRINT;
use stun::integrity::MessageIntegrity;
use stun::message::{Getter, Message, BINDING_REQUEST, BINDING_SUCCESS};
use stun::textattrs::Username;
use stun::xoraddr::XorMappedAddress;
use tokio::time::{sleep, timeout, Duration};

const BROWSER_OFFER: &str = "v=0\r\n\
o=- 4611731400430051336 2 IN IP4 127.0.0.1\r\n\
s=-\r\n\
t=0 0\r\n\
a=group:BUNDLE data\r\n\
a=fingerprint:sha-256 58:2C:27:3A:1A:9F:3E:2B:8B:4A:D2:43:C5:A3:E1:10:6F:82:14:3E:61:70:E3:2F:3C:77:52:E8:2C:6A:9C:01\r\n\
m=application 9 DTLS/SCTP 5000\r\n\
c=IN IP4 0.0.0.0\r\n\
a=ice-ufrag:A1b2\r\n\
a=ice-pwd:abcdefghijklmnopqrstu\r\n\
a=mid:data\r\n";

const PEER_PWD: &str = "abcdefghijklmnopqrstu";

async fn endpoint_under_test() -> Result<Arc<Endpoint>> {
    let cert = rcgen::generate_simple_self_signed(vec!["localhost".to_owned()])
        .map_err(|e| Error::ErrOthers(e.to_string()))?;
    let endpoint = Endpoint::new(
        cert.cert.pem().as_bytes(),
        cert.key_pair.serialize_pem().as_bytes(),
    )?;
    endpoint
        .start(&StaticAddresses {
            public_ip: Ipv4Addr::new(203, 0, 113, 9),
            internal_ip: Ipv4Addr::new(10, 0, 0, 7),
        })
        .await?;
    Ok(endpoint)
}

async fn wait_for_state(session: &Arc<Session>, state: SessionState) -> bool {
    for _ in 0..100 {
        if session.state().await == state {
            return true;
        }
        sleep(Duration::from_millis(20)).await;
    }
    false
}

#[tokio::test]
async fn test_create_answer_shape_and_state() -> Result<()> {
    crate::test_util::init_log();

    let endpoint = endpoint_under_test().await?;
    let session = endpoint.create_session().await;

    let answer = session.create_answer(BROWSER_OFFER).await?;
    assert_eq!(session.state().await, SessionState::Listening);
    assert_eq!(session.peer_ufrag().await.as_deref(), Some("A1b2"));
    assert_eq!(session.answer().await.as_deref(), Some(answer.as_str()));

    let port = session.port().await.expect("bound port");
    assert!(answer.contains("a=setup:active"));
    assert!(answer.contains(&format!(
        "a=candidate:0 1 udp 2113937151 10.0.0.7 {port} typ host"
    )));
    assert!(answer.contains(&format!(
        "a=candidate:1 1 udp 1677729535 203.0.113.9 {port} typ srflx raddr 10.0.0.7 rport {port}"
    )));
    assert!(answer.contains(&format!("a=fingerprint:sha-256 {}", endpoint.fingerprint())));

    session.close().await;
    Ok(())
}

#[tokio::test]
async fn test_create_answer_requires_data_section() -> Result<()> {
    crate::test_util::init_log();

    let endpoint = endpoint_under_test().await?;
    let session = endpoint.create_session().await;

    let offer = BROWSER_OFFER.replace("m=application 9 DTLS/SCTP 5000", "m=audio 9 RTP/AVP 0");
    assert!(matches!(
        session.create_answer(&offer).await,
        Err(Error::ErrInvalidOffer)
    ));
    assert_eq!(session.state().await, SessionState::New);

    session.close().await;
    Ok(())
}

#[tokio::test]
async fn test_create_answer_requires_discovered_addresses() -> Result<()> {
    crate::test_util::init_log();

    let cert = rcgen::generate_simple_self_signed(vec!["localhost".to_owned()])
        .map_err(|e| Error::ErrOthers(e.to_string()))?;
    let endpoint = Endpoint::new(
        cert.cert.pem().as_bytes(),
        cert.key_pair.serialize_pem().as_bytes(),
    )?;
    let session = endpoint.create_session().await;

    assert!(matches!(
        session.create_answer(BROWSER_OFFER).await,
        Err(Error::ErrAddressesNotDiscovered)
    ));
    assert_eq!(session.state().await, SessionState::New);

    session.close().await;
    Ok(())
}

#[tokio::test]
async fn test_create_answer_only_once() -> Result<()> {
    crate::test_util::init_log();

    let endpoint = endpoint_under_test().await?;
    let session = endpoint.create_session().await;

    session.create_answer(BROWSER_OFFER).await?;
    assert!(matches!(
        session.create_answer(BROWSER_OFFER).await,
        Err(Error::ErrInvalidSessionState)
    ));

    session.close().await;
    Ok(())
}

#[tokio::test]
async fn test_inline_candidates_seed_the_unicast_target() -> Result<()> {
    crate::test_util::init_log();

    let endpoint = endpoint_under_test().await?;
    let session = endpoint.create_session().await;

    let offer = BROWSER_OFFER.replace(
        "a=mid:data\r\n",
        "a=mid:data\r\n\
         a=candidate:0 1 udp 50 1.1.1.1 1000 typ host\r\n\
         a=candidate:1 1 udp 100 2.2.2.2 2000 typ host\r\n",
    );
    session.create_answer(&offer).await?;

    assert_eq!(
        session.remote_target().await,
        Some("2.2.2.2:2000".parse().unwrap())
    );

    session.close().await;
    Ok(())
}

#[tokio::test]
async fn test_append_candidate_retargets_atomically() -> Result<()> {
    crate::test_util::init_log();

    let endpoint = endpoint_under_test().await?;
    let session = endpoint.create_session().await;

    assert!(matches!(
        session.append_candidate(Ipv4Addr::new(1, 1, 1, 1), 1000, 50).await,
        Err(Error::ErrInvalidSessionState)
    ));

    session.create_answer(BROWSER_OFFER).await?;
    assert_eq!(session.remote_target().await, None);

    session
        .append_candidate(Ipv4Addr::new(1, 1, 1, 1), 1000, 50)
        .await?;
    assert_eq!(
        session.remote_target().await,
        Some("1.1.1.1:1000".parse().unwrap())
    );

    session
        .append_candidate(Ipv4Addr::new(2, 2, 2, 2), 2000, 100)
        .await?;
    assert_eq!(
        session.remote_target().await,
        Some("2.2.2.2:2000".parse().unwrap())
    );

    // a lower priority must not steal the target
    session
        .append_candidate(Ipv4Addr::new(3, 3, 3, 3), 3000, 10)
        .await?;
    assert_eq!(
        session.remote_target().await,
        Some("2.2.2.2:2000".parse().unwrap())
    );

    session.close().await;
    Ok(())
}

#[tokio::test]
async fn test_observed_states_are_monotonic() -> Result<()> {
    crate::test_util::init_log();

    let endpoint = endpoint_under_test().await?;
    let session = endpoint.create_session().await;

    let states = Arc::new(Mutex::new(Vec::new()));
    let recorder = Arc::clone(&states);
    session
        .on_state_change(Box::new(move |state| {
            let recorder = Arc::clone(&recorder);
            Box::pin(async move {
                recorder.lock().await.push(state);
            })
        }))
        .await;

    session.create_answer(BROWSER_OFFER).await?;
    session.close().await;
    session.close().await; // idempotent

    let observed = states.lock().await.clone();
    assert_eq!(
        observed,
        vec![
            SessionState::Offered,
            SessionState::Listening,
            SessionState::Closed
        ]
    );
    assert_eq!(session.port().await, None);
    assert_eq!(endpoint.session_count().await, 0);

    Ok(())
}

#[tokio::test]
async fn test_binding_request_answered_over_udp() -> Result<()> {
    crate::test_util::init_log();

    let endpoint = endpoint_under_test().await?;
    let session = endpoint.create_session().await;
    session.create_answer(BROWSER_OFFER).await?;
    let port = session.port().await.expect("bound port");

    let client = UdpSocket::bind("127.0.0.1:0").await?;
    let mut request = Message::new();
    request.build(&[
        Box::new(BINDING_REQUEST),
        Box::new(stun::agent::TransactionId::new()),
        Box::new(Username::new(
            ATTR_USERNAME,
            format!("{}:A1b2", session.local_ufrag()),
        )),
        Box::new(MessageIntegrity::new_short_term_integrity(
            session.local_pwd().to_owned(),
        )),
        Box::new(FINGERPRINT),
    ])?;
    client.send_to(&request.raw, ("127.0.0.1", port)).await?;

    let mut buf = [0u8; 1500];
    let (n, _) = timeout(Duration::from_secs(2), client.recv_from(&mut buf))
        .await
        .expect("no binding response")?;

    let mut response = Message::new();
    response.write(&buf[..n])?;
    assert_eq!(response.typ, BINDING_SUCCESS);
    assert_eq!(response.transaction_id, request.transaction_id);

    let mut mapped = XorMappedAddress::default();
    mapped.get_from(&response)?;
    assert_eq!(mapped.ip, client.local_addr()?.ip());
    assert_eq!(mapped.port, client.local_addr()?.port());

    session.close().await;
    Ok(())
}

#[tokio::test]
async fn test_bad_binding_request_gets_no_response() -> Result<()> {
    crate::test_util::init_log();

    let endpoint = endpoint_under_test().await?;
    let session = endpoint.create_session().await;
    session.create_answer(BROWSER_OFFER).await?;
    let port = session.port().await.expect("bound port");

    let client = UdpSocket::bind("127.0.0.1:0").await?;
    let mut request = Message::new();
    request.build(&[
        Box::new(BINDING_REQUEST),
        Box::new(stun::agent::TransactionId::new()),
        // reversed username
        Box::new(Username::new(
            ATTR_USERNAME,
            format!("A1b2:{}", session.local_ufrag()),
        )),
        Box::new(MessageIntegrity::new_short_term_integrity(
            session.local_pwd().to_owned(),
        )),
        Box::new(FINGERPRINT),
    ])?;
    client.send_to(&request.raw, ("127.0.0.1", port)).await?;

    let mut buf = [0u8; 1500];
    let silent = timeout(Duration::from_millis(300), client.recv_from(&mut buf)).await;
    assert!(silent.is_err(), "a bad request must be dropped silently");

    session.close().await;
    Ok(())
}

#[tokio::test]
async fn test_verified_check_response_reaches_ice_connected() -> Result<()> {
    crate::test_util::init_log();

    let endpoint = endpoint_under_test().await?;
    let session = endpoint.create_session().await;
    session.create_answer(BROWSER_OFFER).await?;

    let client = UdpSocket::bind("127.0.0.1:0").await?;
    let client_port = client.local_addr()?.port();
    session
        .append_candidate(Ipv4Addr::new(127, 0, 0, 1), client_port, 100)
        .await?;

    // the periodic checker targets the primary candidate; answer its check
    let mut buf = [0u8; 1500];
    let (n, from) = timeout(Duration::from_secs(5), client.recv_from(&mut buf))
        .await
        .expect("no connectivity check within five ticks")?;

    let mut check = Message::new();
    check.write(&buf[..n])?;
    assert_eq!(check.typ, BINDING_REQUEST);
    let username = Username::get_from_as(&check, ATTR_USERNAME)?;
    assert_eq!(username.text, format!("A1b2:{}", session.local_ufrag()));

    let mut response = Message::new();
    response.build(&[
        Box::new(check.clone()),
        Box::new(BINDING_SUCCESS),
        Box::new(XorMappedAddress {
            ip: from.ip(),
            port: from.port(),
        }),
        Box::new(MessageIntegrity::new_short_term_integrity(
            PEER_PWD.to_owned(),
        )),
        Box::new(FINGERPRINT),
    ])?;
    client.send_to(&response.raw, from).await?;

    assert!(
        wait_for_state(&session, SessionState::IceConnected).await,
        "session never reached ice-connected"
    );

    session.close().await;
    Ok(())
}
