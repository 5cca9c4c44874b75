pub mod ops;
pub mod sessions;
pub mod stream;
