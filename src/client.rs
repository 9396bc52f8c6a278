//! Client
//!
//! Blocking TCP client for a single server.
//!
//! A [`Client`] owns one connection and issues one request at a time. Every
//! operation sends a request frame, waits for the response frame, and maps
//! the response status onto [`OptiError`]. Object operations carry
//! [`RejectRules`], so a caller can make any read or write conditional on
//! the object's stored version.
//!
//! ## Performance counters
//!
//! [`Client::select_perf_counter`] picks what the server measures while it
//! serves this connection's requests. The selection is carried in the header
//! of every request, costs nothing until the next operation is issued, and
//! the measured value for the most recent operation is available from
//! [`Client::read_perf_counter`].
//!
//! ## Failure behavior
//!
//! An I/O or framing failure leaves the connection in an unknown state, so
//! the client latches it as broken; every later call fails with
//! `ConnectionClosed` until the client is dropped. Closing is the owner's
//! move: [`Client::disconnect`] consumes the handle, and plain drop does the
//! same work.

use std::io::{BufReader, BufWriter, Write};
use std::net::{Shutdown, TcpStream};

use bytes::Buf;

use crate::error::{OptiError, Result};
use crate::protocol::{
    read_response, write_request, CounterKind, Mark, PerfSelection, RejectRules, Request, Response,
    Status,
};

/// A connection to one server
pub struct Client {
    /// TCP stream reader (buffered for efficiency)
    reader: BufReader<TcpStream>,

    /// TCP stream writer (buffered for efficiency)
    writer: BufWriter<TcpStream>,

    /// Server address for logging
    server_addr: String,

    /// Counter selection sent with every request
    perf: PerfSelection,

    /// Counter value returned by the most recent operation
    last_counter: u32,

    /// Set once an I/O or framing failure poisons the connection
    broken: bool,
}

impl Client {
    /// Connect to the server at `address:port`
    pub fn connect(address: &str, port: u16) -> Result<Self> {
        let stream = TcpStream::connect((address, port))?;
        Self::from_stream(stream, format!("{}:{}", address, port))
    }

    /// Connect to the server at a `host:port` address string
    pub fn connect_addr(addr: &str) -> Result<Self> {
        let stream = TcpStream::connect(addr)?;
        Self::from_stream(stream, addr.to_string())
    }

    fn from_stream(stream: TcpStream, server_addr: String) -> Result<Self> {
        // Disable Nagle's algorithm for low latency
        stream.set_nodelay(true)?;

        // Clone stream for separate read/write handles
        let read_stream = stream.try_clone()?;
        let write_stream = stream;

        tracing::debug!("Connected to {}", server_addr);

        Ok(Self {
            reader: BufReader::new(read_stream),
            writer: BufWriter::new(write_stream),
            server_addr,
            perf: PerfSelection::inactive(),
            last_counter: 0,
            broken: false,
        })
    }

    /// Close the connection
    ///
    /// Consumes the client, so a closed handle cannot be used again.
    /// Dropping the client has the same effect.
    pub fn disconnect(self) {
        drop(self);
    }

    /// Address this client connected to
    pub fn server_addr(&self) -> &str {
        &self.server_addr
    }

    // =========================================================================
    // Performance counters
    // =========================================================================

    /// Choose what the server measures for this connection's operations
    ///
    /// Purely local: the selection rides along in the header of every later
    /// request. Pass [`CounterKind::Inactive`] to stop measuring.
    pub fn select_perf_counter(&mut self, kind: CounterKind, start: Mark, end: Mark) {
        self.perf = PerfSelection::new(kind, start, end);
    }

    /// Counter value measured during the most recent operation
    ///
    /// Returns 0 before the first operation completes, and whenever the
    /// selection was inactive for the most recent one.
    pub fn read_perf_counter(&self) -> u32 {
        self.last_counter
    }

    // =========================================================================
    // Table namespace operations
    // =========================================================================

    /// Create a new table
    ///
    /// Fails with `TableExists` if the name is already taken.
    pub fn create_table(&mut self, name: &str) -> Result<()> {
        let response = self.call(&Request::CreateTable {
            name: name.to_string(),
        })?;
        check_status(response)?;
        Ok(())
    }

    /// Look up a table's id by name
    ///
    /// The id addresses the table in object operations until the table is
    /// dropped.
    pub fn open_table(&mut self, name: &str) -> Result<u64> {
        let response = self.call(&Request::OpenTable {
            name: name.to_string(),
        })?;
        let response = check_status(response)?;

        if response.payload.len() != 8 {
            return Err(OptiError::Protocol(format!(
                "OPEN_TABLE response: expected 8 payload bytes, got {}",
                response.payload.len()
            )));
        }
        let mut payload = response.payload.as_slice();
        Ok(payload.get_u64())
    }

    /// Drop a table and all of its objects
    ///
    /// Ids previously obtained for the table become invalid; operations
    /// using them fail with `TableNotFound`.
    pub fn drop_table(&mut self, name: &str) -> Result<()> {
        let response = self.call(&Request::DropTable {
            name: name.to_string(),
        })?;
        check_status(response)?;
        Ok(())
    }

    // =========================================================================
    // Object operations
    // =========================================================================

    /// Read an object, returning its value and version
    ///
    /// The rules are evaluated against the stored version before the read
    /// proceeds; a failed guard yields `Rejected` carrying the current
    /// version. Pass [`RejectRules::none`] for an unconditional read.
    pub fn read(&mut self, table_id: u64, key: u64, rules: RejectRules) -> Result<(Vec<u8>, u64)> {
        let response = self.call(&Request::Read {
            table_id,
            key,
            rules,
        })?;
        let response = check_status(response)?;

        if response.payload.len() < 12 {
            return Err(OptiError::Protocol(format!(
                "READ response: expected at least 12 payload bytes, got {}",
                response.payload.len()
            )));
        }
        let mut payload = response.payload.as_slice();
        let version = payload.get_u64();
        let value_len = payload.get_u32() as usize;
        if payload.remaining() != value_len {
            return Err(OptiError::Protocol(format!(
                "READ response: value length {} does not match remaining {} bytes",
                value_len,
                payload.remaining()
            )));
        }

        Ok((payload.to_vec(), version))
    }

    /// Write an object at an explicit key, returning the new version
    ///
    /// A fresh object gets version 1; an overwrite bumps the version by one.
    /// A failed guard leaves the object untouched and yields `Rejected`.
    pub fn write(
        &mut self,
        table_id: u64,
        key: u64,
        rules: RejectRules,
        value: &[u8],
    ) -> Result<u64> {
        let response = self.call(&Request::Write {
            table_id,
            key,
            rules,
            value: value.to_vec(),
        })?;
        let response = check_status(response)?;

        if response.payload.len() != 8 {
            return Err(OptiError::Protocol(format!(
                "WRITE response: expected 8 payload bytes, got {}",
                response.payload.len()
            )));
        }
        let mut payload = response.payload.as_slice();
        Ok(payload.get_u64())
    }

    /// Insert an object at a server-chosen key
    ///
    /// Returns the allocated key and the object's version. The server never
    /// hands out a key that has held an object before.
    pub fn insert(&mut self, table_id: u64, value: &[u8]) -> Result<(u64, u64)> {
        let response = self.call(&Request::Insert {
            table_id,
            value: value.to_vec(),
        })?;
        let response = check_status(response)?;

        if response.payload.len() != 16 {
            return Err(OptiError::Protocol(format!(
                "INSERT response: expected 16 payload bytes, got {}",
                response.payload.len()
            )));
        }
        let mut payload = response.payload.as_slice();
        let key = payload.get_u64();
        let version = payload.get_u64();
        Ok((key, version))
    }

    /// Verify the server is reachable and responding
    pub fn ping(&mut self) -> Result<()> {
        let response = self.call(&Request::Ping)?;
        check_status(response)?;
        Ok(())
    }

    // =========================================================================
    // Request plumbing
    // =========================================================================

    /// Send one request and wait for its response
    ///
    /// Stores the measured counter from the response. An I/O or framing
    /// failure marks the connection broken; later calls fail fast with
    /// `ConnectionClosed`.
    fn call(&mut self, request: &Request) -> Result<Response> {
        if self.broken {
            return Err(OptiError::ConnectionClosed);
        }

        tracing::trace!("Sending {:?} to {}", request.op_code(), self.server_addr);

        match self.round_trip(request) {
            Ok(response) => {
                self.last_counter = response.counter;
                Ok(response)
            }
            Err(e) => {
                if matches!(
                    e,
                    OptiError::Io(_) | OptiError::Protocol(_) | OptiError::ConnectionClosed
                ) {
                    self.broken = true;
                    tracing::debug!("Connection to {} is broken: {}", self.server_addr, e);
                }
                Err(e)
            }
        }
    }

    fn round_trip(&mut self, request: &Request) -> Result<Response> {
        write_request(&mut self.writer, request, self.perf)?;
        read_response(&mut self.reader)
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        // Teardown errors have no receiver; ignore them.
        let _ = self.writer.flush();
        let _ = self.writer.get_ref().shutdown(Shutdown::Both);
        tracing::debug!("Disconnected from {}", self.server_addr);
    }
}

/// Map a response status onto the error taxonomy
///
/// `Ok` passes the response through for payload parsing.
fn check_status(response: Response) -> Result<Response> {
    match response.status {
        Status::Ok => Ok(response),
        Status::TableNotFound => Err(OptiError::TableNotFound),
        Status::TableExists => Err(OptiError::TableExists),
        Status::ObjectNotFound => Err(OptiError::ObjectNotFound),
        Status::Rejected => Err(OptiError::Rejected {
            current_version: response.rejected_state()?,
        }),
        Status::Error => Err(OptiError::Server(response.error_message())),
    }
}
