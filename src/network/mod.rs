//! Network Module
//!
//! TCP server and per-client connection handling.
//!
//! ## Architecture
//! - Single acceptor thread polling a non-blocking listener
//! - One thread per connection, commands handled sequentially
//! - All connections share one `Arc<Store>` and `Arc<CommandTable>`

mod connection;
mod server;

pub use connection::Connection;
pub use server::{Server, ShutdownHandle};
