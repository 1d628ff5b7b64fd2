//! Beltwatch Core
//!
//! Protocol framing and session logic for the Beltwatch client, which pairs
//! with a belt-stop sensor over a short-range link, configures it, and records
//! the stop events it reports.
//!
//! ## Architecture
//!
//! - [`framer`] - newline framing of the raw notification stream
//! - [`protocol`] - typed inbound messages and outbound commands
//! - [`session`] - connection state machine, HELLO handshake, sync/ack
//! - [`transport`] - the byte-stream interface a concrete link implements
//! - [`store`] - the event/settings persistence interface
//! - [`runtime`] - the task that feeds commands and transport events to a session
//!
//! ## Usage
//!
//! ```rust
//! use beltwatch_core::protocol::{InboundMessage, OutboundCommand};
//!
//! let message = InboundMessage::parse("SYNC,DONE,42");
//! assert_eq!(message, Some(InboundMessage::SyncDone { last_index: 42 }));
//! assert_eq!(OutboundCommand::SyncAck { index: 42 }.to_line(), "SYNC,ACK,42\n");
//! ```

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod channel;
pub mod errors;
pub mod framer;
pub mod protocol;
pub mod runtime;
pub mod session;
pub mod store;
pub mod transport;
pub mod types;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use channel::{AppEvent, Command, Effect, TransportEvent};
pub use errors::{BeltwatchError, Result, SessionError, StoreError, TransportError};
pub use framer::LineFramer;
pub use protocol::{InboundMessage, OutboundCommand};
pub use runtime::SessionRuntime;
pub use session::{ConnectionPhase, Session, SessionOptions, SessionState, SessionStatus, SyncStatus};
pub use store::{EventStore, MemoryEventStore};
pub use transport::{DeviceTransport, MockTransport};
pub use types::{
    BreakWindows, ConfigSnapshot, DeviceHandle, DeviceSelector, EventId, ScheduleWindow,
    StopEvent, SystemTimeSource, Thresholds, TimeSource,
};
