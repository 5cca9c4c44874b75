pub mod players;
pub mod sessions;
pub mod shelters;
