mod config;
mod server;
mod store;

pub use config::*;
pub use server::*;
pub use store::*;
