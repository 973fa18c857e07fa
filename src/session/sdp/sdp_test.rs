use super::*;

use crate::error::Result;

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
a=mid:data\r\n\
a=candidate:0 1 udp 2122260223 192.168.1.7 50000 typ host generation 0\r\n\
a=candidate:1 1 udp 1686052607 2001:db8::1 50001 typ srflx\r\n";

#[test]
fn test_parse_offer_data_section() -> Result<()> {
    let offer = parse_offer(BROWSER_OFFER)?;

    assert_eq!(offer.bundle_mid.as_deref(), Some("data"));

    let section = offer.data_section().expect("data section");
    assert_eq!(section.protocol, "DTLS/SCTP");
    assert_eq!(section.ice_ufrag.as_deref(), Some("A1b2"));
    assert_eq!(section.ice_pwd.as_deref(), Some("abcdefghijklmnopqrstu"));

    let fingerprint = offer.peer_fingerprint(section).expect("fingerprint");
    assert_eq!(fingerprint.algorithm, "sha-256");
    assert!(fingerprint.value.starts_with("58:2C:27"));

    // the IPv6 candidate is skipped silently
    assert_eq!(section.candidates.len(), 1);
    assert_eq!(
        section.candidates[0],
        OfferCandidate {
            address: Ipv4Addr::new(192, 168, 1, 7),
            port: 50000,
            priority: 2122260223,
            typ: "host".to_owned(),
        }
    );

    Ok(())
}

#[test]
fn test_parse_offer_media_level_fingerprint() -> Result<()> {
    let offer_str = BROWSER_OFFER.replace(
        "a=group:BUNDLE data\r\na=fingerprint:sha-256 58:2C",
        "a=group:BUNDLE data\r\na=unrelated:sha-256 58:2C",
    );
    let offer_str = offer_str.replace("a=mid:data", "a=mid:data\r\na=fingerprint:sha-256 AA:BB");

    let offer = parse_offer(&offer_str)?;
    let section = offer.data_section().expect("data section");

    assert!(offer.session_fingerprint.is_none());
    let fingerprint = offer.peer_fingerprint(section).expect("fingerprint");
    assert_eq!(fingerprint.value, "AA:BB");

    Ok(())
}

#[test]
fn test_offer_without_data_section() -> Result<()> {
    let offer_str = BROWSER_OFFER.replace("m=application 9 DTLS/SCTP 5000", "m=audio 9 RTP/AVP 0");
    let offer = parse_offer(&offer_str)?;
    assert!(offer.data_section().is_none());
    Ok(())
}

fn answer_params() -> AnswerParams {
    AnswerParams {
        username: "Zz9/".to_owned(),
        password: "0123456789abcdefghijkl".to_owned(),
        fingerprint: "AB:CD:EF:01".to_owned(),
        mid: "data".to_owned(),
        candidates: vec![
            AnswerCandidate {
                address: Ipv4Addr::new(10, 0, 0, 7),
                port: 50000,
                kind: CandidateKind::Host,
            },
            AnswerCandidate {
                address: Ipv4Addr::new(203, 0, 113, 9),
                port: 50000,
                kind: CandidateKind::ServerReflexive,
            },
        ],
    }
}

#[test]
fn test_create_answer_shape() {
    let answer = create_answer(&answer_params());

    for line in [
        "v=0",
        "o=- 3497579305088229251 2 IN IP4 127.0.0.1",
        "s=-",
        "t=0 0",
        "a=group:BUNDLE data",
        "a=msid-semantic: WMS",
        "m=application 9 DTLS/SCTP 5000",
        "c=IN IP4 0.0.0.0",
        "a=setup:active",
        "a=ice-ufrag:Zz9/",
        "a=ice-pwd:0123456789abcdefghijkl",
        "a=mid:data",
        "a=fingerprint:sha-256 AB:CD:EF:01",
        "a=sctpmap:5000 webrtc-datachannel 1024",
        "a=candidate:0 1 udp 2113937151 10.0.0.7 50000 typ host",
        "a=candidate:1 1 udp 1677729535 203.0.113.9 50000 typ srflx raddr 10.0.0.7 rport 50000",
    ] {
        assert!(
            answer.lines().any(|l| l.trim_end() == line),
            "answer is missing {line:?}:\n{answer}"
        );
    }
}

#[test]
fn test_answer_round_trips_through_parser() -> Result<()> {
    let params = answer_params();
    let offer = parse_offer(&create_answer(&params))?;

    assert_eq!(offer.bundle_mid.as_deref(), Some("data"));

    let section = offer.data_section().expect("data section");
    assert_eq!(section.ice_ufrag.as_deref(), Some(params.username.as_str()));
    assert_eq!(section.ice_pwd.as_deref(), Some(params.password.as_str()));
    assert_eq!(
        offer.peer_fingerprint(section).map(|f| f.value.as_str()),
        Some(params.fingerprint.as_str())
    );

    // candidates come back in input order with the advertised priorities
    let priorities: Vec<u32> = section.candidates.iter().map(|c| c.priority).collect();
    assert_eq!(priorities, vec![2113937151, 1677729535]);
    assert_eq!(section.candidates[0].typ, "host");
    assert_eq!(section.candidates[1].typ, "srflx");

    Ok(())
}
