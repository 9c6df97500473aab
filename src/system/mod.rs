//! Core system components: shared state, hardware ownership and time
pub mod audio;
pub mod clock;
pub mod context;
pub mod distance;
pub mod error;
pub mod filter;
pub mod resources;
#[cfg(test)]
pub mod testing;
pub mod work;
