//! Beltwatch line protocol
//!
//! Newline-delimited ASCII, comma-separated fields, first field names the
//! kind. The wire format is fixed by the device firmware and must be kept
//! byte-for-byte.

mod fields;
pub mod inbound;
pub mod outbound;

pub use fields::{DecodeQuality, FIELD_SEPARATOR};
pub use inbound::{Calibration, Hello, InboundMessage, StopRecord};
pub use outbound::{OutboundCommand, LINE_TERMINATOR};
