mod config;
mod engine;
mod filetree;
mod pool;
mod server;


pub use config::*;
pub use engine::*;
pub use filetree::*;
pub use pool::*;
pub use server::*;
