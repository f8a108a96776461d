//! Domain event primitives and the synchronous observer interface.

pub mod event;
pub mod handler;

pub use event::Event;
pub use handler::{EventHandler, notify_all};
