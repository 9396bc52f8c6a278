//! Protocol codec
//!
//! Encoding and decoding functions for the wire protocol.
//!
//! ## Wire Format
//!
//! ### Request Frame
//! ```text
//! ┌────────┬─────────┬──────────┬─────────┬─────────┬─────────┬──────────┐
//! │ Op (1) │ Kind(1) │ Start(1) │ End (1) │ Len (4) │ CRC (4) │ Payload  │
//! └────────┴─────────┴──────────┴─────────┴─────────┴─────────┴──────────┘
//! ```
//! Kind/Start/End carry the connection's performance counter selection.
//! CRC is a CRC32 over the payload bytes. All integers are big-endian.
//!
//! ### Payload by Opcode
//! - CREATE_TABLE / OPEN_TABLE / DROP_TABLE: name_len (4) + name (UTF-8)
//! - READ:   table_id (8) + key (8) + rules (10)
//! - WRITE:  table_id (8) + key (8) + rules (10) + value_len (4) + value
//! - INSERT: table_id (8) + value_len (4) + value
//! - PING:   empty
//!
//! Rules: require_exists (1) + guard_tag (1) + guard_version (8), where
//! guard_tag is 0 = none, 1 = equals, 2 = less-than, 3 = greater-than.
//!
//! ### Response Frame
//! ```text
//! ┌──────────┬─────────────┬─────────┬─────────┬────────────────────────┐
//! │Status(1) │ Counter (4) │ Len (4) │ CRC (4) │        Payload         │
//! └──────────┴─────────────┴─────────┴─────────┴────────────────────────┘
//! ```
//! Counter is the measured interval for the selection carried by the
//! request (0 when inactive).
//!
//! ### Payload by Status
//! - OK for OPEN_TABLE: table_id (8)
//! - OK for READ:       version (8) + value_len (4) + value
//! - OK for WRITE:      version (8)
//! - OK for INSERT:     key (8) + version (8)
//! - OK otherwise:      empty
//! - REJECTED:          exists (1) + version (8)
//! - ERROR:             UTF-8 message

use std::io::{Read, Write};

use bytes::{Buf, BufMut};

use crate::error::{OptiError, Result};

use super::{
    CounterKind, Mark, PerfSelection, RejectRules, Request, Response, Status, VersionGuard,
};

/// Request header size: opcode + counter selection (3) + length + CRC
pub const REQUEST_HEADER_SIZE: usize = 12;

/// Response header size: status + counter value (4) + length + CRC
pub const RESPONSE_HEADER_SIZE: usize = 13;

/// Encoded size of a reject-rules block
pub const RULES_WIRE_SIZE: usize = 10;

/// Maximum payload size (16 MB)
pub const MAX_PAYLOAD_SIZE: u32 = 16 * 1024 * 1024;

// =============================================================================
// Request Encoding/Decoding
// =============================================================================

/// Encode a request to bytes
///
/// Format: op (1) + perf selection (3) + payload_len (4) + payload_crc (4)
/// + payload
pub fn encode_request(request: &Request, perf: PerfSelection) -> Vec<u8> {
    // Build payload based on opcode
    let payload = match request {
        Request::CreateTable { name } | Request::OpenTable { name } | Request::DropTable { name } => {
            let mut payload = Vec::with_capacity(4 + name.len());
            payload.put_u32(name.len() as u32);
            payload.put_slice(name.as_bytes());
            payload
        }
        Request::Read {
            table_id,
            key,
            rules,
        } => {
            let mut payload = Vec::with_capacity(16 + RULES_WIRE_SIZE);
            payload.put_u64(*table_id);
            payload.put_u64(*key);
            put_rules(&mut payload, rules);
            payload
        }
        Request::Write {
            table_id,
            key,
            rules,
            value,
        } => {
            let mut payload = Vec::with_capacity(16 + RULES_WIRE_SIZE + 4 + value.len());
            payload.put_u64(*table_id);
            payload.put_u64(*key);
            put_rules(&mut payload, rules);
            payload.put_u32(value.len() as u32);
            payload.put_slice(value);
            payload
        }
        Request::Insert { table_id, value } => {
            let mut payload = Vec::with_capacity(8 + 4 + value.len());
            payload.put_u64(*table_id);
            payload.put_u32(value.len() as u32);
            payload.put_slice(value);
            payload
        }
        Request::Ping => Vec::new(),
    };

    // Build full message: header + payload
    let mut message = Vec::with_capacity(REQUEST_HEADER_SIZE + payload.len());
    message.put_u8(request.op_code() as u8);
    message.put_u8(perf.kind as u8);
    message.put_u8(perf.start as u8);
    message.put_u8(perf.end as u8);
    message.put_u32(payload.len() as u32);
    message.put_u32(crc32fast::hash(&payload));
    message.put_slice(&payload);

    message
}

/// Decode a request from bytes
///
/// Returns the request together with the counter selection carried in the
/// header.
pub fn decode_request(bytes: &[u8]) -> Result<(Request, PerfSelection)> {
    if bytes.len() < REQUEST_HEADER_SIZE {
        return Err(OptiError::Protocol(format!(
            "incomplete request header: expected {} bytes, got {}",
            REQUEST_HEADER_SIZE,
            bytes.len()
        )));
    }

    // Parse header
    let mut header = &bytes[..REQUEST_HEADER_SIZE];
    let op = header.get_u8();
    let kind_byte = header.get_u8();
    let start_byte = header.get_u8();
    let end_byte = header.get_u8();
    let payload_len = header.get_u32() as usize;
    let payload_crc = header.get_u32();

    let kind = CounterKind::from_wire(kind_byte).ok_or_else(|| {
        OptiError::Protocol(format!("unknown counter kind: 0x{:02x}", kind_byte))
    })?;
    let start = Mark::from_wire(start_byte)
        .ok_or_else(|| OptiError::Protocol(format!("unknown start mark: 0x{:02x}", start_byte)))?;
    let end = Mark::from_wire(end_byte)
        .ok_or_else(|| OptiError::Protocol(format!("unknown end mark: 0x{:02x}", end_byte)))?;
    let perf = PerfSelection::new(kind, start, end);

    let payload = frame_payload(bytes, REQUEST_HEADER_SIZE, payload_len, payload_crc)?;

    // Parse request based on opcode
    let request = match op {
        0x01 => Request::CreateTable {
            name: decode_name(payload, "CREATE_TABLE")?,
        },
        0x02 => Request::OpenTable {
            name: decode_name(payload, "OPEN_TABLE")?,
        },
        0x03 => Request::DropTable {
            name: decode_name(payload, "DROP_TABLE")?,
        },
        0x04 => decode_read(payload)?,
        0x05 => decode_write(payload)?,
        0x06 => decode_insert(payload)?,
        0x07 => decode_ping(payload)?,
        _ => {
            return Err(OptiError::Protocol(format!(
                "unknown request opcode: 0x{:02x}",
                op
            )))
        }
    };

    Ok((request, perf))
}

/// Validate payload length and checksum, returning the payload slice
fn frame_payload(bytes: &[u8], header_size: usize, payload_len: usize, crc: u32) -> Result<&[u8]> {
    if payload_len > MAX_PAYLOAD_SIZE as usize {
        return Err(OptiError::Protocol(format!(
            "payload too large: {} bytes (max {})",
            payload_len, MAX_PAYLOAD_SIZE
        )));
    }

    let total_len = header_size + payload_len;
    if bytes.len() < total_len {
        return Err(OptiError::Protocol(format!(
            "incomplete payload: expected {} bytes, got {}",
            total_len,
            bytes.len()
        )));
    }

    let payload = &bytes[header_size..total_len];
    let actual = crc32fast::hash(payload);
    if actual != crc {
        return Err(OptiError::Protocol(format!(
            "payload checksum mismatch: expected {:08x}, got {:08x}",
            crc, actual
        )));
    }

    Ok(payload)
}

/// Decode a table-name payload (CREATE_TABLE / OPEN_TABLE / DROP_TABLE)
fn decode_name(payload: &[u8], what: &str) -> Result<String> {
    if payload.len() < 4 {
        return Err(OptiError::Protocol(format!(
            "{} request: missing name length",
            what
        )));
    }

    let mut buf = payload;
    let name_len = buf.get_u32() as usize;

    if buf.remaining() != name_len {
        return Err(OptiError::Protocol(format!(
            "{} request: name length {} does not match remaining {} bytes",
            what,
            name_len,
            buf.remaining()
        )));
    }

    String::from_utf8(buf.to_vec())
        .map_err(|_| OptiError::Protocol(format!("{} request: table name is not valid UTF-8", what)))
}

/// Decode a READ payload
fn decode_read(payload: &[u8]) -> Result<Request> {
    if payload.len() != 16 + RULES_WIRE_SIZE {
        return Err(OptiError::Protocol(format!(
            "READ request: expected {} payload bytes, got {}",
            16 + RULES_WIRE_SIZE,
            payload.len()
        )));
    }

    let mut buf = payload;
    let table_id = buf.get_u64();
    let key = buf.get_u64();
    let rules = get_rules(&mut buf)?;

    Ok(Request::Read {
        table_id,
        key,
        rules,
    })
}

/// Decode a WRITE payload
fn decode_write(payload: &[u8]) -> Result<Request> {
    let fixed = 16 + RULES_WIRE_SIZE + 4;
    if payload.len() < fixed {
        return Err(OptiError::Protocol(format!(
            "WRITE request: expected at least {} payload bytes, got {}",
            fixed,
            payload.len()
        )));
    }

    let mut buf = payload;
    let table_id = buf.get_u64();
    let key = buf.get_u64();
    let rules = get_rules(&mut buf)?;
    let value_len = buf.get_u32() as usize;

    if buf.remaining() != value_len {
        return Err(OptiError::Protocol(format!(
            "WRITE request: value length {} does not match remaining {} bytes",
            value_len,
            buf.remaining()
        )));
    }

    Ok(Request::Write {
        table_id,
        key,
        rules,
        value: buf.to_vec(),
    })
}

/// Decode an INSERT payload
fn decode_insert(payload: &[u8]) -> Result<Request> {
    if payload.len() < 12 {
        return Err(OptiError::Protocol(format!(
            "INSERT request: expected at least 12 payload bytes, got {}",
            payload.len()
        )));
    }

    let mut buf = payload;
    let table_id = buf.get_u64();
    let value_len = buf.get_u32() as usize;

    if buf.remaining() != value_len {
        return Err(OptiError::Protocol(format!(
            "INSERT request: value length {} does not match remaining {} bytes",
            value_len,
            buf.remaining()
        )));
    }

    Ok(Request::Insert {
        table_id,
        value: buf.to_vec(),
    })
}

/// Decode a PING payload
fn decode_ping(payload: &[u8]) -> Result<Request> {
    if !payload.is_empty() {
        return Err(OptiError::Protocol(format!(
            "PING request: unexpected payload of {} bytes",
            payload.len()
        )));
    }
    Ok(Request::Ping)
}

// =============================================================================
// Reject Rules Encoding/Decoding
// =============================================================================

/// Append the wire form of a reject-rules block
fn put_rules(buf: &mut Vec<u8>, rules: &RejectRules) {
    buf.put_u8(rules.requires_exists() as u8);
    match rules.guard() {
        None => {
            buf.put_u8(0);
            buf.put_u64(0);
        }
        Some(VersionGuard::Equals(v)) => {
            buf.put_u8(1);
            buf.put_u64(v);
        }
        Some(VersionGuard::LessThan(v)) => {
            buf.put_u8(2);
            buf.put_u64(v);
        }
        Some(VersionGuard::GreaterThan(v)) => {
            buf.put_u8(3);
            buf.put_u64(v);
        }
    }
}

/// Consume the wire form of a reject-rules block
fn get_rules(buf: &mut &[u8]) -> Result<RejectRules> {
    if buf.remaining() < RULES_WIRE_SIZE {
        return Err(OptiError::Protocol(format!(
            "reject rules block too short: {} bytes",
            buf.remaining()
        )));
    }

    let require_exists = match buf.get_u8() {
        0 => false,
        1 => true,
        other => {
            return Err(OptiError::Protocol(format!(
                "invalid existence flag in reject rules: {}",
                other
            )))
        }
    };
    let guard_tag = buf.get_u8();
    let guard_version = buf.get_u64();

    let mut rules = match guard_tag {
        0 => RejectRules::none(),
        1 => RejectRules::version_equals(guard_version),
        2 => RejectRules::version_less_than(guard_version),
        3 => RejectRules::version_greater_than(guard_version),
        other => {
            return Err(OptiError::Protocol(format!(
                "unknown version guard tag: {}",
                other
            )))
        }
    };
    if require_exists {
        rules = rules.and_must_exist();
    }

    Ok(rules)
}

// =============================================================================
// Response Encoding/Decoding
// =============================================================================

/// Encode a response to bytes
///
/// Format: status (1) + counter (4) + payload_len (4) + payload_crc (4)
/// + payload
pub fn encode_response(response: &Response) -> Vec<u8> {
    let mut message = Vec::with_capacity(RESPONSE_HEADER_SIZE + response.payload.len());
    message.put_u8(response.status as u8);
    message.put_u32(response.counter);
    message.put_u32(response.payload.len() as u32);
    message.put_u32(crc32fast::hash(&response.payload));
    message.put_slice(&response.payload);

    message
}

/// Decode a response from bytes
pub fn decode_response(bytes: &[u8]) -> Result<Response> {
    if bytes.len() < RESPONSE_HEADER_SIZE {
        return Err(OptiError::Protocol(format!(
            "incomplete response header: expected {} bytes, got {}",
            RESPONSE_HEADER_SIZE,
            bytes.len()
        )));
    }

    // Parse header
    let mut header = &bytes[..RESPONSE_HEADER_SIZE];
    let status_byte = header.get_u8();
    let counter = header.get_u32();
    let payload_len = header.get_u32() as usize;
    let payload_crc = header.get_u32();

    let status = match status_byte {
        0x00 => Status::Ok,
        0x01 => Status::TableNotFound,
        0x02 => Status::TableExists,
        0x03 => Status::ObjectNotFound,
        0x04 => Status::Rejected,
        0x05 => Status::Error,
        _ => {
            return Err(OptiError::Protocol(format!(
                "unknown response status: 0x{:02x}",
                status_byte
            )))
        }
    };

    let payload = frame_payload(bytes, RESPONSE_HEADER_SIZE, payload_len, payload_crc)?;

    Ok(Response {
        status,
        counter,
        payload: payload.to_vec(),
    })
}

// =============================================================================
// Stream-based I/O helpers
// =============================================================================

/// Read a complete request from a stream
///
/// Blocks until a complete request is received or an error occurs
pub fn read_request<R: Read>(reader: &mut R) -> Result<(Request, PerfSelection)> {
    let full_message = read_frame(reader, REQUEST_HEADER_SIZE, 4)?;
    decode_request(&full_message)
}

/// Write a request to a stream
pub fn write_request<W: Write>(
    writer: &mut W,
    request: &Request,
    perf: PerfSelection,
) -> Result<()> {
    let bytes = encode_request(request, perf);
    writer.write_all(&bytes)?;
    writer.flush()?;
    Ok(())
}

/// Read a complete response from a stream
pub fn read_response<R: Read>(reader: &mut R) -> Result<Response> {
    let full_message = read_frame(reader, RESPONSE_HEADER_SIZE, 5)?;
    decode_response(&full_message)
}

/// Write a response to a stream
pub fn write_response<W: Write>(writer: &mut W, response: &Response) -> Result<()> {
    let bytes = encode_response(response);
    writer.write_all(&bytes)?;
    writer.flush()?;
    Ok(())
}

/// Read one frame (header + payload) into a single buffer
///
/// `len_offset` is the byte position of the payload length field within the
/// header. The length is validated against the payload cap before the payload
/// is read, so a corrupt header cannot trigger a huge allocation.
fn read_frame<R: Read>(reader: &mut R, header_size: usize, len_offset: usize) -> Result<Vec<u8>> {
    let mut header = vec![0u8; header_size];
    reader.read_exact(&mut header)?;

    let mut len_bytes = &header[len_offset..len_offset + 4];
    let payload_len = len_bytes.get_u32() as usize;

    if payload_len > MAX_PAYLOAD_SIZE as usize {
        return Err(OptiError::Protocol(format!(
            "payload too large: {} bytes (max {})",
            payload_len, MAX_PAYLOAD_SIZE
        )));
    }

    let mut full_message = header;
    full_message.resize(header_size + payload_len, 0);
    if payload_len > 0 {
        reader.read_exact(&mut full_message[header_size..])?;
    }

    Ok(full_message)
}
