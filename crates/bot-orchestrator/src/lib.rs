//! Bot orchestration.
//!
//! [`Bot`] owns the stores, the solver configuration, and the order
//! chain, and serializes every mutation through one event loop. The
//! transport feeds [`BotEvent`]s into the loop; timers post back into
//! the same channel, so there is exactly one writer for all state.

pub mod bot_actor;
pub mod events;
pub mod paper;

pub use bot_actor::Bot;
pub use events::BotEvent;
pub use paper::PaperTransport;
