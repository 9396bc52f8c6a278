//! Response definitions
//!
//! Represents server replies, including the per-call performance counter
//! value and the wire shape of rejection state.

use bytes::{Buf, BufMut};

use crate::error::{OptiError, Result};

/// Response status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Status {
    Ok = 0x00,
    TableNotFound = 0x01,
    TableExists = 0x02,
    ObjectNotFound = 0x03,
    Rejected = 0x04,
    Error = 0x05,
}

/// A response to send to the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Status code
    pub status: Status,

    /// Measured performance counter for this call (0 when the selection in
    /// the request was inactive or a requested mark was not recorded)
    pub counter: u32,

    /// Payload; shape depends on the request opcode and the status
    pub payload: Vec<u8>,
}

impl Response {
    /// Create an OK response with the given payload
    pub fn ok(payload: Vec<u8>) -> Self {
        Self {
            status: Status::Ok,
            counter: 0,
            payload,
        }
    }

    /// Create a TABLE_NOT_FOUND response
    pub fn table_not_found() -> Self {
        Self {
            status: Status::TableNotFound,
            counter: 0,
            payload: Vec::new(),
        }
    }

    /// Create a TABLE_EXISTS response
    pub fn table_exists() -> Self {
        Self {
            status: Status::TableExists,
            counter: 0,
            payload: Vec::new(),
        }
    }

    /// Create an OBJECT_NOT_FOUND response
    pub fn object_not_found() -> Self {
        Self {
            status: Status::ObjectNotFound,
            counter: 0,
            payload: Vec::new(),
        }
    }

    /// Create a REJECTED response carrying the stored version at evaluation
    /// time (`None` when no object existed at the key)
    pub fn rejected(current_version: Option<u64>) -> Self {
        let mut payload = Vec::with_capacity(9);
        match current_version {
            Some(v) => {
                payload.put_u8(1);
                payload.put_u64(v);
            }
            None => {
                payload.put_u8(0);
                payload.put_u64(0);
            }
        }
        Self {
            status: Status::Rejected,
            counter: 0,
            payload,
        }
    }

    /// Create an ERROR response with a message
    pub fn error(message: &str) -> Self {
        Self {
            status: Status::Error,
            counter: 0,
            payload: message.as_bytes().to_vec(),
        }
    }

    /// Parse the rejection state out of a REJECTED response
    pub fn rejected_state(&self) -> Result<Option<u64>> {
        if self.payload.len() < 9 {
            return Err(OptiError::Protocol(format!(
                "REJECTED payload too short: {} bytes",
                self.payload.len()
            )));
        }

        let mut buf = &self.payload[..];
        let exists = buf.get_u8();
        let version = buf.get_u64();

        match exists {
            0 => Ok(None),
            1 => Ok(Some(version)),
            other => Err(OptiError::Protocol(format!(
                "invalid existence flag in REJECTED payload: {}",
                other
            ))),
        }
    }

    /// The UTF-8 message carried by an ERROR response
    pub fn error_message(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}
