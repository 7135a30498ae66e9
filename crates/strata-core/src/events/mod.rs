//! Lifecycle events and the broadcast bus that carries them.

mod bus;
mod event;

pub use bus::{EventBus, EventSubscriber};
pub use event::TierEvent;
