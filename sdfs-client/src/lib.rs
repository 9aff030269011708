mod block_cache;
mod channel;
mod client;
mod stubs;

#[cfg(test)]
mod channel_tests;

pub use block_cache::*;
pub use channel::*;
pub use client::*;
pub use stubs::*;
