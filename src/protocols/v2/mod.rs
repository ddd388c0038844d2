//! Discriminator-tagged events emitted through `Program data:` log lines.

pub mod event_decoder;
pub mod events;

pub use event_decoder::{DecodedEvent, EventDecoder};
pub use events::{default_registry, CollectFeeEvent, LiquidityEvent, ProgramEvent, SwapEvent};
