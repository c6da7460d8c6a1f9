//! Non-fatal protocol errors.
//!
//! These are never propagated as a `Result` out of the dispatch loop; the
//! dispatcher logs them at `warn!` and drops the offending packet, leaving
//! the connection open. They exist as a type, rather than bare log calls, so
//! that tests can assert on exactly what went wrong.
use compositor_channel::Source;
use thiserror::Error;

/// A single client packet that could not be acted on.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// The packet's `ty` field is not a recognized [`compositor_proto::Msg`].
    #[error("client {source:?} sent unknown message type {ty}")]
    UnknownMessageType {
        /// The offending client.
        source: Source,
        /// The unrecognized type tag.
        ty: u32,
    },
    /// The packet's body length did not match what its type expects.
    #[error("client {source:?} sent message type {ty} with body length {got}, expected {expected}")]
    BadBodyLength {
        /// The offending client.
        source: Source,
        /// The message type.
        ty: u32,
        /// The length actually carried.
        got: usize,
        /// The length the message type requires.
        expected: usize,
    },
    /// The packet referenced a `wid` that does not exist, or that the source
    /// does not own.
    #[error("client {source:?} referenced unknown or unowned window {wid}")]
    UnknownWindow {
        /// The offending client.
        source: Source,
        /// The referenced window id.
        wid: u32,
    },
}
