//! Per-connection request loop
//!
//! One handler owns one client socket and serves its requests in order.
//! Each request is timestamped at fixed marks while it is served; the pair
//! selected in the request header is measured and echoed back in the
//! response, so clients can profile server-side work per call.

use std::io::{BufReader, BufWriter};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use bytes::{BufMut, Bytes};

use crate::error::{OptiError, Result};
use crate::protocol::{read_request, write_response, Mark, Request, Response};

use super::store::TableStore;
use super::timing::MarkRecorder;

/// Serves a single client socket
pub struct Connection {
    /// Buffered read half of the stream
    reader: BufReader<TcpStream>,

    /// Buffered write half of the stream
    writer: BufWriter<TcpStream>,

    /// Shared table store all handlers execute against
    store: Arc<TableStore>,

    /// Peer address, resolved once for log lines
    peer_addr: String,
}

impl Connection {
    /// Wrap an accepted stream in a handler with buffered halves
    pub fn new(stream: TcpStream, store: Arc<TableStore>) -> Result<Self> {
        // Resolve the peer address before the stream is split
        let peer_addr = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        // Request frames are small; Nagle only adds latency here
        stream.set_nodelay(true)?;

        let read_stream = stream.try_clone()?;
        let write_stream = stream;

        Ok(Self {
            reader: BufReader::new(read_stream),
            writer: BufWriter::new(write_stream),
            store,
            peer_addr,
        })
    }

    /// Apply the configured socket timeouts (0 disables)
    pub fn set_timeouts(&mut self, read_ms: u64, write_ms: u64) -> Result<()> {
        let read_stream = self.reader.get_ref();
        let write_stream = self.writer.get_ref();

        if read_ms > 0 {
            read_stream.set_read_timeout(Some(Duration::from_millis(read_ms)))?;
        }
        if write_ms > 0 {
            write_stream.set_write_timeout(Some(Duration::from_millis(write_ms)))?;
        }

        Ok(())
    }

    /// Serve requests until the client hangs up
    ///
    /// Reads one frame at a time and answers each before reading the next.
    /// A clean disconnect returns `Ok`; a fatal transport or framing error
    /// is returned after a best-effort error response.
    pub fn handle(&mut self) -> Result<()> {
        tracing::debug!("Connection established from {}", self.peer_addr);

        loop {
            let (request, perf) = match read_request(&mut self.reader) {
                Ok(decoded) => decoded,
                Err(OptiError::Io(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    // Orderly close between frames
                    tracing::debug!("Client {} disconnected", self.peer_addr);
                    return Ok(());
                }
                Err(OptiError::Io(ref e)) if e.kind() == std::io::ErrorKind::ConnectionReset => {
                    tracing::debug!("Connection reset by client {}", self.peer_addr);
                    return Ok(());
                }
                Err(OptiError::Io(ref e)) if e.kind() == std::io::ErrorKind::ConnectionAborted => {
                    tracing::debug!("Connection aborted by client {}", self.peer_addr);
                    return Ok(());
                }
                Err(OptiError::Io(ref e)) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    // Idle past the configured read timeout
                    tracing::debug!("Read timeout for client {}", self.peer_addr);
                    return Ok(());
                }
                Err(OptiError::Io(ref e)) if e.kind() == std::io::ErrorKind::TimedOut => {
                    // Some platforms report a timeout as TimedOut, not WouldBlock
                    tracing::debug!("Read timeout for client {}", self.peer_addr);
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!("Error reading from {}: {}", self.peer_addr, e);
                    // Tell the client what broke, if the socket still writes
                    let _ = self.send_response(Response::error(&e.to_string()));
                    return Err(e);
                }
            };

            tracing::trace!("Received request from {}: {:?}", self.peer_addr, request);

            // Execute request, measuring the marks selected by the client
            let mut recorder = MarkRecorder::new();
            recorder.record(Mark::RpcProcessingBegin);
            let mut response = self.execute_request(request, &mut recorder);
            recorder.record(Mark::RpcProcessingEnd);
            response.counter = recorder.counter_value(perf);

            if let Err(e) = self.send_response(response) {
                // A client gone mid-reply (abort, reset, broken pipe) ends
                // the session quietly; only other write failures propagate.
                if let OptiError::Io(ref io_err) = e {
                    match io_err.kind() {
                        std::io::ErrorKind::ConnectionAborted
                        | std::io::ErrorKind::ConnectionReset
                        | std::io::ErrorKind::BrokenPipe => {
                            tracing::debug!(
                                "Client {} disconnected before response could be sent: {}",
                                self.peer_addr,
                                e
                            );
                            return Ok(());
                        }
                        _ => {}
                    }
                }
                tracing::warn!("Error writing to {}: {}", self.peer_addr, e);
                return Err(e);
            }
        }
    }

    /// Execute a request and return a response
    fn execute_request(&self, request: Request, recorder: &mut MarkRecorder) -> Response {
        recorder.record(Mark::StoreBegin);
        let result = self.dispatch(request);
        recorder.record(Mark::StoreEnd);

        match result {
            Ok(response) => response,
            Err(OptiError::TableExists) => Response::table_exists(),
            Err(OptiError::TableNotFound) => Response::table_not_found(),
            Err(OptiError::ObjectNotFound) => Response::object_not_found(),
            Err(OptiError::Rejected { current_version }) => Response::rejected(current_version),
            Err(e) => Response::error(&e.to_string()),
        }
    }

    /// Run one request against the store and build the success payload
    fn dispatch(&self, request: Request) -> Result<Response> {
        match request {
            Request::CreateTable { name } => {
                self.store.create_table(&name)?;
                Ok(Response::ok(Vec::new()))
            }
            Request::OpenTable { name } => {
                let table_id = self.store.open_table(&name)?;
                let mut payload = Vec::with_capacity(8);
                payload.put_u64(table_id);
                Ok(Response::ok(payload))
            }
            Request::DropTable { name } => {
                self.store.drop_table(&name)?;
                Ok(Response::ok(Vec::new()))
            }
            Request::Read {
                table_id,
                key,
                rules,
            } => {
                let (value, version) = self.store.read(table_id, key, rules)?;
                let mut payload = Vec::with_capacity(12 + value.len());
                payload.put_u64(version);
                payload.put_u32(value.len() as u32);
                payload.put_slice(&value);
                Ok(Response::ok(payload))
            }
            Request::Write {
                table_id,
                key,
                rules,
                value,
            } => {
                let version = self.store.write(table_id, key, rules, Bytes::from(value))?;
                let mut payload = Vec::with_capacity(8);
                payload.put_u64(version);
                Ok(Response::ok(payload))
            }
            Request::Insert { table_id, value } => {
                let (key, version) = self.store.insert(table_id, Bytes::from(value))?;
                let mut payload = Vec::with_capacity(16);
                payload.put_u64(key);
                payload.put_u64(version);
                Ok(Response::ok(payload))
            }
            Request::Ping => Ok(Response::ok(Vec::new())),
        }
    }

    /// Write one response frame and flush it out
    fn send_response(&mut self, response: Response) -> Result<()> {
        write_response(&mut self.writer, &response)?;
        Ok(())
    }

    /// Peer address this handler is serving
    pub fn peer_addr(&self) -> &str {
        &self.peer_addr
    }
}
