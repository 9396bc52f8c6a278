//! TCP Server
//!
//! Accepts connections and dispatches to worker threads.
//!
//! A single acceptor thread polls the listener and hands accepted streams to
//! a fixed pool of workers over a bounded channel. Shutdown flips a shared
//! flag and severs every live socket, so workers blocked mid-read return
//! promptly and the pool can be joined.

use std::collections::HashMap;
use std::io;
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam::channel::{bounded, Receiver};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::Result;

use super::connection::Connection;
use super::store::TableStore;

/// How long the acceptor sleeps when no connection is pending
const ACCEPT_POLL_INTERVAL_MS: u64 = 10;

/// Live sockets by connection id, severed on shutdown
type LiveConnections = Arc<Mutex<HashMap<u64, TcpStream>>>;

/// TCP server
pub struct Server {
    /// Server configuration
    config: Config,

    /// Shared table store
    store: Arc<TableStore>,

    /// Bound listener; bound at construction so callers can bind port 0
    /// and discover the assigned port before running
    listener: TcpListener,

    /// Address the listener actually bound to
    local_addr: SocketAddr,

    /// Set by a shutdown handle to stop the accept loop
    shutdown: Arc<AtomicBool>,

    /// Sockets currently being served
    live_connections: LiveConnections,

    /// Next connection id, only touched by the accept loop
    next_connection_id: u64,
}

impl Server {
    /// Create a new server with the given config and store
    ///
    /// Binds the listener immediately; `run` starts accepting.
    pub fn new(config: Config, store: Arc<TableStore>) -> Result<Self> {
        let listener = TcpListener::bind(&config.listen_addr)?;
        let local_addr = listener.local_addr()?;

        Ok(Self {
            config,
            store,
            listener,
            local_addr,
            shutdown: Arc::new(AtomicBool::new(false)),
            live_connections: Arc::new(Mutex::new(HashMap::new())),
            next_connection_id: 0,
        })
    }

    /// Address the server is listening on
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Handle that can stop this server from another thread
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            shutdown: Arc::clone(&self.shutdown),
            live_connections: Arc::clone(&self.live_connections),
        }
    }

    /// Start the server (blocking)
    ///
    /// Spawns the worker pool, then accepts connections until a shutdown
    /// handle fires. Returns once every worker has been joined.
    pub fn run(&mut self) -> Result<()> {
        self.listener.set_nonblocking(true)?;
        info!(
            "Listening on {} with {} workers",
            self.local_addr, self.config.max_connections
        );

        let (tx, rx) = bounded::<(u64, TcpStream)>(self.config.max_connections);

        let mut workers = Vec::with_capacity(self.config.max_connections);
        for worker_id in 0..self.config.max_connections {
            let rx = rx.clone();
            let store = Arc::clone(&self.store);
            let live = Arc::clone(&self.live_connections);
            let read_ms = self.config.read_timeout_ms;
            let write_ms = self.config.write_timeout_ms;

            let handle = thread::Builder::new()
                .name(format!("optikv-worker-{}", worker_id))
                .spawn(move || worker_loop(rx, store, live, read_ms, write_ms))?;
            workers.push(handle);
        }
        drop(rx);

        while !self.shutdown.load(Ordering::SeqCst) {
            match self.listener.accept() {
                Ok((stream, addr)) => {
                    let id = self.next_connection_id;
                    self.next_connection_id += 1;

                    // Track a second handle so shutdown can sever the socket
                    // even while a worker is blocked reading from it.
                    if let Ok(handle) = stream.try_clone() {
                        self.live_connections.lock().insert(id, handle);
                    }

                    debug!("Accepted connection {} from {}", id, addr);
                    if tx.send((id, stream)).is_err() {
                        warn!("Worker pool is gone, stopping accept loop");
                        break;
                    }
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                    thread::sleep(Duration::from_millis(ACCEPT_POLL_INTERVAL_MS));
                }
                Err(e) => {
                    warn!("Failed to accept connection: {}", e);
                }
            }
        }

        info!("Shutting down, waiting for workers");
        drop(tx);
        for worker in workers {
            let _ = worker.join();
        }

        info!("Server stopped");
        Ok(())
    }
}

/// Stops a running server from another thread
#[derive(Clone)]
pub struct ShutdownHandle {
    shutdown: Arc<AtomicBool>,
    live_connections: LiveConnections,
}

impl ShutdownHandle {
    /// Signal the server to shutdown gracefully
    ///
    /// Stops the accept loop and severs every live connection. Clients with
    /// an open connection see it fail on their next call.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);

        let mut live = self.live_connections.lock();
        for (id, stream) in live.drain() {
            if let Err(e) = stream.shutdown(Shutdown::Both) {
                debug!("Failed to sever connection {}: {}", id, e);
            }
        }
    }
}

/// Worker loop: serve handed-off connections until the channel closes
fn worker_loop(
    rx: Receiver<(u64, TcpStream)>,
    store: Arc<TableStore>,
    live: LiveConnections,
    read_timeout_ms: u64,
    write_timeout_ms: u64,
) {
    while let Ok((id, stream)) = rx.recv() {
        let result = serve(stream, &store, read_timeout_ms, write_timeout_ms);

        // The socket is closed either way; stop tracking it.
        live.lock().remove(&id);

        if let Err(e) = result {
            warn!("Connection {} ended with error: {}", id, e);
        }
    }
}

fn serve(
    stream: TcpStream,
    store: &Arc<TableStore>,
    read_timeout_ms: u64,
    write_timeout_ms: u64,
) -> Result<()> {
    let mut connection = Connection::new(stream, Arc::clone(store))?;
    connection.set_timeouts(read_timeout_ms, write_timeout_ms)?;
    connection.handle()
}
