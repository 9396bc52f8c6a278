//! Performance counter selection
//!
//! A client may ask the server to measure the interval between two named
//! points ("marks") of request handling. The selection travels in the header
//! of every request; the measured value comes back in the header of every
//! response. Selection is per-connection client state, not per call.

/// What the server should count between the two marks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CounterKind {
    /// No measurement; responses carry a counter value of 0
    Inactive = 0x00,

    /// Monotonic clock ticks (nanoseconds on this server, saturated to u32)
    Ticks = 0x01,
}

impl CounterKind {
    pub(crate) fn from_wire(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(CounterKind::Inactive),
            0x01 => Some(CounterKind::Ticks),
            _ => None,
        }
    }
}

/// Named points in the server's request handling that can bound a
/// measured interval
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Mark {
    /// Request decoded, dispatch about to begin
    RpcProcessingBegin = 0x00,

    /// Response built, encoding about to begin
    RpcProcessingEnd = 0x01,

    /// Table store operation about to begin
    StoreBegin = 0x02,

    /// Table store operation finished
    StoreEnd = 0x03,
}

impl Mark {
    /// Number of distinct marks (recorder slot count)
    pub(crate) const COUNT: usize = 4;

    pub(crate) fn from_wire(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Mark::RpcProcessingBegin),
            0x01 => Some(Mark::RpcProcessingEnd),
            0x02 => Some(Mark::StoreBegin),
            0x03 => Some(Mark::StoreEnd),
            _ => None,
        }
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

/// The counter configuration a connection applies to its calls
///
/// Carried verbatim in every request header. The default selection is
/// inactive: the server records nothing and answers with a counter of 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PerfSelection {
    /// What to count
    pub kind: CounterKind,

    /// Mark opening the measured interval
    pub start: Mark,

    /// Mark closing the measured interval
    pub end: Mark,
}

impl PerfSelection {
    /// Create a selection measuring `kind` between `start` and `end`
    pub fn new(kind: CounterKind, start: Mark, end: Mark) -> Self {
        Self { kind, start, end }
    }

    /// The no-measurement selection
    pub fn inactive() -> Self {
        Self {
            kind: CounterKind::Inactive,
            start: Mark::RpcProcessingBegin,
            end: Mark::RpcProcessingEnd,
        }
    }

    /// Whether any measurement is requested
    pub fn is_active(&self) -> bool {
        self.kind != CounterKind::Inactive
    }
}

impl Default for PerfSelection {
    fn default() -> Self {
        Self::inactive()
    }
}
