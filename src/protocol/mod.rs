//! Wire protocol for client-server communication
//!
//! Defines the request and response types exchanged over TCP, the
//! optimistic-concurrency reject rules attached to object operations, the
//! performance counter selection carried in every request header, and the
//! binary codec that frames all of it.
//!
//! ## Module Organization
//!
//! - [`request`]: operation opcodes and the request enum
//! - [`response`]: status codes and the response envelope
//! - [`rules`]: version guards evaluated against stored objects
//! - [`perf`]: counter kinds and measurement marks
//! - [`codec`]: binary encoding, checksums, and stream framing
//!
//! ## Design
//!
//! Requests carry the client's counter selection in three header bytes, so
//! switching counters costs nothing until the next operation is issued.
//! Responses echo back one measured counter value next to the status byte.
//! Payloads are checksummed with CRC32; a mismatch fails the whole frame.

pub mod codec;
pub mod perf;
pub mod request;
pub mod response;
pub mod rules;

pub use codec::{
    decode_request, decode_response, encode_request, encode_response, read_request, read_response,
    write_request, write_response, MAX_PAYLOAD_SIZE, REQUEST_HEADER_SIZE, RESPONSE_HEADER_SIZE,
    RULES_WIRE_SIZE,
};
pub use perf::{CounterKind, Mark, PerfSelection};
pub use request::{OpCode, Request};
pub use response::{Response, Status};
pub use rules::{RejectRules, VersionGuard};
