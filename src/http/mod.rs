//! # Módulo HTTP
//!
//! Protocolo HTTP/1.x implementado a mano, sin librerías de alto nivel:
//!
//! - Lectura de requests directamente desde el socket
//! - Construcción de responses
//! - Status codes
//!
//! No hay keep-alive ni chunked encoding: cada conexión lleva un request y
//! una respuesta, y se cierra.

pub mod request;   // Lectura de HTTP requests
pub mod response;  // Construcción de HTTP responses
pub mod status;    // Códigos de estado HTTP

// Re-exportamos los tipos principales para facilitar su uso
pub use request::{Method, ParseError, Request};
pub use response::{Response, HTML_CONTENT_TYPE};
pub use status::StatusCode;

/// Valor de los headers `Server` y de `SERVER_SOFTWARE` en CGI
pub const SERVER_SOFTWARE: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Escapa texto para insertarlo en HTML
pub(crate) fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
