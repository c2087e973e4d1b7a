//! # Pasarela CGI
//!
//! Un subproceso por request: metadatos por variables de entorno, body por
//! stdin, respuesta por stdout.
//!
//! - **environment**: descriptor del request y variables CGI/1.1
//! - **gateway**: ciclo de vida del subproceso y traducción de su salida

pub mod environment;
pub mod gateway;

pub use environment::{build_environment, CgiRequest};
pub use gateway::CgiGateway;
