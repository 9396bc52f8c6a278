//! Request definitions
//!
//! Represents the operations a client can ask of the server.

use super::RejectRules;

/// Request opcodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpCode {
    CreateTable = 0x01,
    OpenTable = 0x02,
    DropTable = 0x03,
    Read = 0x04,
    Write = 0x05,
    Insert = 0x06,
    Ping = 0x07,
}

/// A parsed request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Create a table; fails if the name is already taken
    CreateTable { name: String },

    /// Resolve a table name to the id used by object operations
    OpenTable { name: String },

    /// Delete a table and every object in it
    DropTable { name: String },

    /// Read an object, gated by reject rules
    Read {
        table_id: u64,
        key: u64,
        rules: RejectRules,
    },

    /// Write an object at a caller-chosen key, gated by reject rules
    Write {
        table_id: u64,
        key: u64,
        rules: RejectRules,
        value: Vec<u8>,
    },

    /// Write an object at a fresh server-chosen key
    Insert { table_id: u64, value: Vec<u8> },

    /// Health check round-trip
    Ping,
}

impl Request {
    /// Get the request opcode
    pub fn op_code(&self) -> OpCode {
        match self {
            Request::CreateTable { .. } => OpCode::CreateTable,
            Request::OpenTable { .. } => OpCode::OpenTable,
            Request::DropTable { .. } => OpCode::DropTable,
            Request::Read { .. } => OpCode::Read,
            Request::Write { .. } => OpCode::Write,
            Request::Insert { .. } => OpCode::Insert,
            Request::Ping => OpCode::Ping,
        }
    }
}
