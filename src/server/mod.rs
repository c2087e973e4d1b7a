//! # Módulo del Servidor HTTP
//! src/server/mod.rs
//!
//! - **tcp**: listener, ciclo de vida (`Server::start` / `ServerHandle`)
//! - **pool**: workers con cola FIFO acotada
//! - **connection**: un request y una respuesta por conexión

pub mod connection;
pub mod pool;
pub mod tcp;

pub use connection::handle_connection;
pub use pool::WorkerPool;
pub use tcp::{Server, ServerHandle};
