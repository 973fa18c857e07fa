use super::*;

#[test]
fn test_payload_identifier_mapping() {
    assert_eq!(
        payload_identifier(false, 12),
        PayloadProtocolIdentifier::Binary
    );
    assert_eq!(
        payload_identifier(false, 0),
        PayloadProtocolIdentifier::BinaryEmpty
    );
    assert_eq!(
        payload_identifier(true, 12),
        PayloadProtocolIdentifier::String
    );
    assert_eq!(
        payload_identifier(true, 0),
        PayloadProtocolIdentifier::StringEmpty
    );
}
