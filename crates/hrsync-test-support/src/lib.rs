//! Shared test doubles for the HR sync service.

mod clock;
mod handler;
mod queue;

pub use clock::FixedClock;
pub use handler::ScriptedHandler;
pub use queue::{FailingEventQueue, InMemoryEventQueue};
