//! # OptiKV
//!
//! A table-structured key-value store with:
//! - Named tables addressed by numeric ids
//! - Versioned objects with optimistic-concurrency reject rules
//! - Per-operation server-side performance counters
//! - Blocking TCP client with one connection per handle
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Client                                │
//! │     (blocking calls, reject rules, counter selection)        │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │  framed requests / responses (CRC32)
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                      TCP Server                              │
//! │              (acceptor + worker pool)                        │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │  timing marks around each request
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │  Namespace  │          │   Tables    │
//!   │  (RwLock)   │          │  (Mutex)    │
//!   └─────────────┘          └──────┬──────┘
//!                                   │
//!                                   ▼
//!                           ┌─────────────┐
//!                           │   Objects   │
//!                           │ (versioned) │
//!                           └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod client;
pub mod protocol;
pub mod server;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{OptiError, Result};
pub use config::Config;
pub use client::Client;
pub use protocol::{CounterKind, Mark, RejectRules, VersionGuard};
pub use server::{Server, ShutdownHandle, TableStore};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of OptiKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
