pub mod config;
pub mod observability;
pub mod proxy;
pub mod server;

pub use server::{KnockServer, ServerBuilder, build_app};
