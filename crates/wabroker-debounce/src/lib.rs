//! Per-conversation coalescing buffer (spec §4.3).
//!
//! Messages arriving within a configurable window of each other are merged
//! into one logical Turn before being handed to the dispatcher, so the agent
//! sees one coherent message instead of several racing invocations.

pub mod engine;
pub mod error;
pub mod types;

pub use engine::Debouncer;
pub use error::{DebounceError, Result};
pub use types::{CoalescedMessage, IncomingPiece, InFlightGuard, Turn, TurnSubmitter};
