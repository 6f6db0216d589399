//! Device-pair message relay.
//!
//! The relay moves a captured utterance from the device that heard it to the
//! device better placed to process it, and carries the final response back.
//! The channel between the pair is assumed unreliable: messages can be lost
//! without an error, connectivity flaps, and a peer can vanish mid-exchange.
//! Every wait is bounded and every bounded wait that expires resolves into a
//! fallback on the originating device.

mod message;
#[allow(clippy::module_inception)]
mod relay;
mod transport;

pub use message::{RelayMessage, RelayMessageKind};
pub use relay::{
    CompanionRelay, RelayAttemptState, RelayError, RelayResponder, RelayResponse,
};
pub use transport::{InProcessTransport, RelayTransport, TransportEvent};
