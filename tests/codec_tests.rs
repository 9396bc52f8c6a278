//! Codec Tests
//!
//! Tests for request and response encoding/decoding.

use std::io::Cursor;

use optikv::protocol::{
    decode_request, decode_response, encode_request, encode_response, read_request, read_response,
    write_request, write_response, CounterKind, Mark, PerfSelection, RejectRules, Request,
    Response, Status, MAX_PAYLOAD_SIZE, REQUEST_HEADER_SIZE, RESPONSE_HEADER_SIZE, RULES_WIRE_SIZE,
};
use optikv::OptiError;

/// Build a raw request frame around an arbitrary payload
///
/// Uses an inactive counter selection and a correct checksum, so tests can
/// probe payload-level decoding errors in isolation.
fn frame_request(op: u8, payload: &[u8]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(REQUEST_HEADER_SIZE + payload.len());
    bytes.push(op);
    bytes.extend_from_slice(&[0x00, 0x00, 0x00]);
    bytes.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    bytes.extend_from_slice(&crc32fast::hash(payload).to_be_bytes());
    bytes.extend_from_slice(payload);
    bytes
}

// =============================================================================
// Request Encoding/Decoding Tests
// =============================================================================

#[test]
fn test_encode_decode_create_table() {
    let request = Request::CreateTable {
        name: "accounts".to_string(),
    };
    let encoded = encode_request(&request, PerfSelection::inactive());
    let (decoded, _) = decode_request(&encoded).unwrap();

    assert_eq!(decoded, request);
}

#[test]
fn test_encode_decode_open_table() {
    let request = Request::OpenTable {
        name: "accounts".to_string(),
    };
    let encoded = encode_request(&request, PerfSelection::inactive());
    let (decoded, _) = decode_request(&encoded).unwrap();

    assert_eq!(decoded, request);
}

#[test]
fn test_encode_decode_drop_table() {
    let request = Request::DropTable {
        name: "accounts".to_string(),
    };
    let encoded = encode_request(&request, PerfSelection::inactive());
    let (decoded, _) = decode_request(&encoded).unwrap();

    assert_eq!(decoded, request);
}

#[test]
fn test_encode_decode_read() {
    let request = Request::Read {
        table_id: 7,
        key: 42,
        rules: RejectRules::version_equals(3).and_must_exist(),
    };
    let encoded = encode_request(&request, PerfSelection::inactive());
    let (decoded, _) = decode_request(&encoded).unwrap();

    assert_eq!(decoded, request);
}

#[test]
fn test_encode_decode_write() {
    let request = Request::Write {
        table_id: 7,
        key: 42,
        rules: RejectRules::none(),
        value: b"Hello, World!".to_vec(),
    };
    let encoded = encode_request(&request, PerfSelection::inactive());
    let (decoded, _) = decode_request(&encoded).unwrap();

    assert_eq!(decoded, request);
}

#[test]
fn test_encode_decode_insert() {
    let request = Request::Insert {
        table_id: 7,
        value: b"fresh object".to_vec(),
    };
    let encoded = encode_request(&request, PerfSelection::inactive());
    let (decoded, _) = decode_request(&encoded).unwrap();

    assert_eq!(decoded, request);
}

#[test]
fn test_encode_decode_ping() {
    let request = Request::Ping;
    let encoded = encode_request(&request, PerfSelection::inactive());
    let (decoded, _) = decode_request(&encoded).unwrap();

    assert_eq!(decoded, Request::Ping);
}

#[test]
fn test_encode_decode_empty_value() {
    let request = Request::Write {
        table_id: 1,
        key: 1,
        rules: RejectRules::none(),
        value: vec![],
    };
    let encoded = encode_request(&request, PerfSelection::inactive());
    let (decoded, _) = decode_request(&encoded).unwrap();

    assert_eq!(decoded, request);
}

#[test]
fn test_encode_decode_binary_value() {
    // Binary data containing null bytes and high bytes
    let binary_value: Vec<u8> = (0..=255).collect();
    let request = Request::Write {
        table_id: 1,
        key: 9,
        rules: RejectRules::none(),
        value: binary_value.clone(),
    };
    let encoded = encode_request(&request, PerfSelection::inactive());
    let (decoded, _) = decode_request(&encoded).unwrap();

    match decoded {
        Request::Write { value, .. } => assert_eq!(value, binary_value),
        _ => panic!("Expected WRITE request"),
    }
}

#[test]
fn test_perf_selection_round_trip() {
    let perf = PerfSelection::new(
        CounterKind::Ticks,
        Mark::StoreBegin,
        Mark::StoreEnd,
    );
    let encoded = encode_request(&Request::Ping, perf);
    let (_, decoded) = decode_request(&encoded).unwrap();

    assert_eq!(decoded, perf);
}

#[test]
fn test_perf_selection_inactive_by_default() {
    let encoded = encode_request(&Request::Ping, PerfSelection::inactive());
    let (_, decoded) = decode_request(&encoded).unwrap();

    assert!(!decoded.is_active());
}

// =============================================================================
// Reject Rules Wire Tests
// =============================================================================

#[test]
fn test_rules_round_trip_all_variants() {
    let variants = [
        RejectRules::none(),
        RejectRules::must_exist(),
        RejectRules::version_equals(0),
        RejectRules::version_equals(17),
        RejectRules::version_less_than(5),
        RejectRules::version_greater_than(5),
        RejectRules::version_equals(9).and_must_exist(),
        RejectRules::version_less_than(u64::MAX).and_must_exist(),
    ];

    for rules in variants {
        let request = Request::Read {
            table_id: 1,
            key: 2,
            rules,
        };
        let encoded = encode_request(&request, PerfSelection::inactive());
        let (decoded, _) = decode_request(&encoded).unwrap();

        match decoded {
            Request::Read { rules: decoded, .. } => assert_eq!(decoded, rules),
            _ => panic!("Expected READ request"),
        }
    }
}

#[test]
fn test_unknown_guard_tag() {
    // READ payload with a guard tag that does not exist
    let mut payload = Vec::new();
    payload.extend_from_slice(&1u64.to_be_bytes()); // table_id
    payload.extend_from_slice(&2u64.to_be_bytes()); // key
    payload.push(0x00); // require_exists = false
    payload.push(0x09); // bogus guard tag
    payload.extend_from_slice(&0u64.to_be_bytes()); // guard version

    let result = decode_request(&frame_request(0x04, &payload));
    assert!(result.is_err());
    assert!(result
        .unwrap_err()
        .to_string()
        .contains("unknown version guard tag"));
}

#[test]
fn test_invalid_existence_flag() {
    let mut payload = Vec::new();
    payload.extend_from_slice(&1u64.to_be_bytes());
    payload.extend_from_slice(&2u64.to_be_bytes());
    payload.push(0x02); // existence flag must be 0 or 1
    payload.push(0x00);
    payload.extend_from_slice(&0u64.to_be_bytes());

    let result = decode_request(&frame_request(0x04, &payload));
    assert!(result.is_err());
    assert!(result
        .unwrap_err()
        .to_string()
        .contains("invalid existence flag"));
}

// =============================================================================
// Response Encoding/Decoding Tests
// =============================================================================

#[test]
fn test_encode_decode_response_ok() {
    let response = Response::ok(b"value".to_vec());
    let encoded = encode_response(&response);
    let decoded = decode_response(&encoded).unwrap();

    assert_eq!(decoded.status, Status::Ok);
    assert_eq!(decoded.payload, b"value".to_vec());
}

#[test]
fn test_encode_decode_response_counter() {
    let mut response = Response::ok(Vec::new());
    response.counter = 123_456;
    let encoded = encode_response(&response);
    let decoded = decode_response(&encoded).unwrap();

    assert_eq!(decoded.counter, 123_456);
}

#[test]
fn test_encode_decode_response_table_not_found() {
    let response = Response::table_not_found();
    let encoded = encode_response(&response);
    let decoded = decode_response(&encoded).unwrap();

    assert_eq!(decoded.status, Status::TableNotFound);
    assert!(decoded.payload.is_empty());
}

#[test]
fn test_encode_decode_response_table_exists() {
    let response = Response::table_exists();
    let encoded = encode_response(&response);
    let decoded = decode_response(&encoded).unwrap();

    assert_eq!(decoded.status, Status::TableExists);
}

#[test]
fn test_encode_decode_response_object_not_found() {
    let response = Response::object_not_found();
    let encoded = encode_response(&response);
    let decoded = decode_response(&encoded).unwrap();

    assert_eq!(decoded.status, Status::ObjectNotFound);
}

#[test]
fn test_encode_decode_response_rejected_with_version() {
    let response = Response::rejected(Some(7));
    let encoded = encode_response(&response);
    let decoded = decode_response(&encoded).unwrap();

    assert_eq!(decoded.status, Status::Rejected);
    assert_eq!(decoded.rejected_state().unwrap(), Some(7));
}

#[test]
fn test_encode_decode_response_rejected_missing_object() {
    let response = Response::rejected(None);
    let encoded = encode_response(&response);
    let decoded = decode_response(&encoded).unwrap();

    assert_eq!(decoded.status, Status::Rejected);
    assert_eq!(decoded.rejected_state().unwrap(), None);
}

#[test]
fn test_encode_decode_response_error() {
    let response = Response::error("something went wrong");
    let encoded = encode_response(&response);
    let decoded = decode_response(&encoded).unwrap();

    assert_eq!(decoded.status, Status::Error);
    assert_eq!(decoded.error_message(), "something went wrong");
}

// =============================================================================
// Error Handling Tests
// =============================================================================

#[test]
fn test_incomplete_request_header() {
    let bytes = [0x01, 0x00, 0x00]; // Only 3 bytes, need 12
    let result = decode_request(&bytes);
    assert!(result.is_err());
    assert!(result
        .unwrap_err()
        .to_string()
        .contains("incomplete request header"));
}

#[test]
fn test_incomplete_response_header() {
    let bytes = [0x00, 0x00, 0x00]; // Only 3 bytes, need 13
    let result = decode_response(&bytes);
    assert!(result.is_err());
    assert!(result
        .unwrap_err()
        .to_string()
        .contains("incomplete response header"));
}

#[test]
fn test_incomplete_payload() {
    let request = Request::CreateTable {
        name: "accounts".to_string(),
    };
    let encoded = encode_request(&request, PerfSelection::inactive());

    // Chop off the tail of the payload
    let result = decode_request(&encoded[..encoded.len() - 3]);
    assert!(result.is_err());
    assert!(result
        .unwrap_err()
        .to_string()
        .contains("incomplete payload"));
}

#[test]
fn test_unknown_request_opcode() {
    let mut encoded = encode_request(&Request::Ping, PerfSelection::inactive());
    encoded[0] = 0xFF;

    let result = decode_request(&encoded);
    assert!(result.is_err());
    assert!(result
        .unwrap_err()
        .to_string()
        .contains("unknown request opcode"));
}

#[test]
fn test_unknown_counter_kind() {
    let mut encoded = encode_request(&Request::Ping, PerfSelection::inactive());
    encoded[1] = 0x77;

    let result = decode_request(&encoded);
    assert!(result.is_err());
    assert!(result
        .unwrap_err()
        .to_string()
        .contains("unknown counter kind"));
}

#[test]
fn test_unknown_mark() {
    let mut encoded = encode_request(&Request::Ping, PerfSelection::inactive());
    encoded[2] = 0x99;

    let result = decode_request(&encoded);
    assert!(result.is_err());
    assert!(result.unwrap_err().to_string().contains("unknown start mark"));
}

#[test]
fn test_unknown_response_status() {
    let mut encoded = encode_response(&Response::ok(Vec::new()));
    encoded[0] = 0xFF;

    let result = decode_response(&encoded);
    assert!(result.is_err());
    assert!(result
        .unwrap_err()
        .to_string()
        .contains("unknown response status"));
}

#[test]
fn test_request_checksum_mismatch() {
    let request = Request::CreateTable {
        name: "accounts".to_string(),
    };
    let mut encoded = encode_request(&request, PerfSelection::inactive());

    // Flip one payload bit
    let last = encoded.len() - 1;
    encoded[last] ^= 0x01;

    let result = decode_request(&encoded);
    assert!(result.is_err());
    assert!(result
        .unwrap_err()
        .to_string()
        .contains("checksum mismatch"));
}

#[test]
fn test_response_checksum_mismatch() {
    let mut encoded = encode_response(&Response::ok(b"value".to_vec()));

    let last = encoded.len() - 1;
    encoded[last] ^= 0x01;

    let result = decode_response(&encoded);
    assert!(result.is_err());
    assert!(result
        .unwrap_err()
        .to_string()
        .contains("checksum mismatch"));
}

#[test]
fn test_corrupted_checksum_field_detected() {
    let request = Request::CreateTable {
        name: "accounts".to_string(),
    };
    let mut encoded = encode_request(&request, PerfSelection::inactive());

    // Flip a bit in the stored checksum itself rather than the payload
    encoded[8] ^= 0x01;

    let result = decode_request(&encoded);
    assert!(result.is_err());
    assert!(result
        .unwrap_err()
        .to_string()
        .contains("checksum mismatch"));
}

#[test]
fn test_payload_length_cap() {
    // Header claims a payload one byte over the cap
    let mut bytes = vec![0x07, 0x00, 0x00, 0x00];
    bytes.extend_from_slice(&(MAX_PAYLOAD_SIZE + 1).to_be_bytes());
    bytes.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]);

    let result = decode_request(&bytes);
    assert!(result.is_err());
    assert!(result
        .unwrap_err()
        .to_string()
        .contains("payload too large"));
}

#[test]
fn test_table_name_not_utf8() {
    let payload = [0x00, 0x00, 0x00, 0x01, 0xFF]; // name_len = 1, invalid byte
    let result = decode_request(&frame_request(0x01, &payload));
    assert!(result.is_err());
    assert!(result.unwrap_err().to_string().contains("not valid UTF-8"));
}

#[test]
fn test_write_value_length_mismatch() {
    // WRITE payload claiming a 5-byte value but carrying 2
    let mut payload = Vec::new();
    payload.extend_from_slice(&1u64.to_be_bytes()); // table_id
    payload.extend_from_slice(&2u64.to_be_bytes()); // key
    payload.extend_from_slice(&[0x00, 0x00]); // rules: no guard
    payload.extend_from_slice(&0u64.to_be_bytes());
    payload.extend_from_slice(&5u32.to_be_bytes()); // value_len = 5
    payload.extend_from_slice(b"hi");

    let result = decode_request(&frame_request(0x05, &payload));
    assert!(result.is_err());
    assert!(result
        .unwrap_err()
        .to_string()
        .contains("does not match remaining"));
}

#[test]
fn test_ping_with_unexpected_payload() {
    let result = decode_request(&frame_request(0x07, b"hello"));
    assert!(result.is_err());
    assert!(result
        .unwrap_err()
        .to_string()
        .contains("unexpected payload"));
}

// =============================================================================
// Stream I/O Tests
// =============================================================================

#[test]
fn test_stream_write_read_request() {
    let request = Request::Write {
        table_id: 3,
        key: 8,
        rules: RejectRules::version_equals(1),
        value: b"value".to_vec(),
    };
    let perf = PerfSelection::new(
        CounterKind::Ticks,
        Mark::RpcProcessingBegin,
        Mark::RpcProcessingEnd,
    );

    let mut buffer = Vec::new();
    write_request(&mut buffer, &request, perf).unwrap();

    let mut cursor = Cursor::new(buffer);
    let (decoded, decoded_perf) = read_request(&mut cursor).unwrap();

    assert_eq!(decoded, request);
    assert_eq!(decoded_perf, perf);
}

#[test]
fn test_stream_write_read_response() {
    let response = Response::ok(b"result".to_vec());

    let mut buffer = Vec::new();
    write_response(&mut buffer, &response).unwrap();

    let mut cursor = Cursor::new(buffer);
    let decoded = read_response(&mut cursor).unwrap();

    assert_eq!(decoded.status, Status::Ok);
    assert_eq!(decoded.payload, b"result".to_vec());
}

#[test]
fn test_stream_multiple_requests() {
    let requests = vec![
        Request::Ping,
        Request::CreateTable {
            name: "t".to_string(),
        },
        Request::Insert {
            table_id: 1,
            value: b"v1".to_vec(),
        },
        Request::Read {
            table_id: 1,
            key: 1,
            rules: RejectRules::must_exist(),
        },
        Request::DropTable {
            name: "t".to_string(),
        },
    ];

    // Write all requests to buffer
    let mut buffer = Vec::new();
    for request in &requests {
        write_request(&mut buffer, request, PerfSelection::inactive()).unwrap();
    }

    // Read them back
    let mut cursor = Cursor::new(buffer);
    for expected in &requests {
        let (decoded, _) = read_request(&mut cursor).unwrap();
        assert_eq!(&decoded, expected);
    }
}

#[test]
fn test_stream_truncated_request() {
    let request = Request::CreateTable {
        name: "accounts".to_string(),
    };
    let encoded = encode_request(&request, PerfSelection::inactive());

    // Stream ends partway through the payload
    let mut cursor = Cursor::new(encoded[..encoded.len() - 4].to_vec());
    let result = read_request(&mut cursor);

    match result {
        Err(OptiError::Io(e)) => assert_eq!(e.kind(), std::io::ErrorKind::UnexpectedEof),
        other => panic!("Expected EOF error, got {:?}", other),
    }
}

// =============================================================================
// Wire Format Verification Tests
// =============================================================================

#[test]
fn test_wire_format_ping() {
    let perf = PerfSelection::new(
        CounterKind::Ticks,
        Mark::RpcProcessingBegin,
        Mark::RpcProcessingEnd,
    );
    let encoded = encode_request(&Request::Ping, perf);

    // Expected: [0x07][0x01][0x00][0x01][len=0][crc=0]
    //           op    kind  start end   payload empty
    assert_eq!(encoded.len(), REQUEST_HEADER_SIZE);
    assert_eq!(encoded[0], 0x07);
    assert_eq!(encoded[1], 0x01);
    assert_eq!(encoded[2], 0x00);
    assert_eq!(encoded[3], 0x01);
    assert_eq!(&encoded[4..8], &[0x00, 0x00, 0x00, 0x00]);
    assert_eq!(&encoded[8..12], &[0x00, 0x00, 0x00, 0x00]);
}

#[test]
fn test_wire_format_create_table() {
    let request = Request::CreateTable {
        name: "test".to_string(),
    };
    let encoded = encode_request(&request, PerfSelection::inactive());

    // Payload: [name_len=4][t e s t]
    assert_eq!(encoded.len(), REQUEST_HEADER_SIZE + 8);
    assert_eq!(encoded[0], 0x01);
    assert_eq!(&encoded[4..8], &[0x00, 0x00, 0x00, 0x08]); // payload len = 8
    assert_eq!(
        &encoded[8..12],
        &crc32fast::hash(&encoded[12..]).to_be_bytes()
    );
    assert_eq!(&encoded[12..16], &[0x00, 0x00, 0x00, 0x04]); // name len = 4
    assert_eq!(&encoded[16..20], b"test");
}

#[test]
fn test_wire_format_read_rules() {
    let request = Request::Read {
        table_id: 1,
        key: 2,
        rules: RejectRules::version_equals(3).and_must_exist(),
    };
    let encoded = encode_request(&request, PerfSelection::inactive());

    assert_eq!(encoded.len(), REQUEST_HEADER_SIZE + 16 + RULES_WIRE_SIZE);

    // Rules block sits after table_id and key
    let rules = &encoded[REQUEST_HEADER_SIZE + 16..];
    assert_eq!(rules[0], 0x01); // require_exists
    assert_eq!(rules[1], 0x01); // guard tag: equals
    assert_eq!(&rules[2..10], &3u64.to_be_bytes());
}

#[test]
fn test_wire_format_response_ok() {
    let mut response = Response::ok(b"hi".to_vec());
    response.counter = 9;
    let encoded = encode_response(&response);

    // Expected: [0x00][counter=9][len=2][crc][h i]
    assert_eq!(encoded.len(), RESPONSE_HEADER_SIZE + 2);
    assert_eq!(encoded[0], 0x00);
    assert_eq!(&encoded[1..5], &9u32.to_be_bytes());
    assert_eq!(&encoded[5..9], &[0x00, 0x00, 0x00, 0x02]);
    assert_eq!(
        &encoded[9..13],
        &crc32fast::hash(b"hi").to_be_bytes()
    );
    assert_eq!(&encoded[13..15], b"hi");
}
