pub mod events;
pub mod hub;

pub use events::{SessionEvent, SessionEventKind};
pub use hub::RealtimeHub;
