//! Server side
//!
//! The table store, the per-connection request handler, request timing
//! marks, and the TCP accept loop with its worker pool.

pub mod connection;
pub mod server;
pub mod store;
pub mod timing;

pub use connection::Connection;
pub use server::{Server, ShutdownHandle};
pub use store::TableStore;
pub use timing::MarkRecorder;
