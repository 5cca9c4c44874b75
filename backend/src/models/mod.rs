//! Data models shared across database access and API handlers.

pub mod player;
pub mod session;
pub mod shelter;

pub use player::Player;
pub use session::{RaceSession, SessionState};
pub use shelter::ShelterRef;
