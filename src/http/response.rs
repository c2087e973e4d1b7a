//! # Construcción de Respuestas HTTP
//!
//! API para construir respuestas y escribirlas al socket.
//!
//! ## Formato
//!
//! ```text
//! HTTP/1.1 200 OK\r\n
//! Content-Type: text/html; charset=UTF-8\r\n
//! Content-Length: 13\r\n
//! \r\n
//! <h1>Hola</h1>
//! ```
//!
//! Las respuestas con body en memoria se escriben con [`Response::write_to`].
//! Para archivos grandes se escribe solo la cabecera con
//! [`Response::write_head`] y el body se copia después directamente.
//!
//! ## Ejemplo de uso
//!
//! ```
//! use cgi_http_server::http::{Response, StatusCode};
//!
//! let response = Response::new(StatusCode::Ok)
//!     .with_header("Content-Type", "text/plain")
//!     .with_body("Hola");
//!
//! let bytes = response.to_bytes();
//! assert!(bytes.starts_with(b"HTTP/1.1 200 OK\r\n"));
//! ```

use super::{escape_html, StatusCode, SERVER_SOFTWARE};
use std::io::{self, Write};

/// Content-Type de las páginas HTML que genera el servidor
pub const HTML_CONTENT_TYPE: &str = "text/html; charset=UTF-8";

/// Representa una respuesta HTTP completa
#[derive(Debug, Clone)]
pub struct Response {
    /// Código de estado HTTP (200, 404, etc.)
    status: StatusCode,

    /// Headers en orden de inserción, sin duplicados
    headers: Vec<(String, String)>,

    /// Cuerpo de la respuesta (puede ser vacío)
    body: Vec<u8>,
}

impl Response {
    /// Crea una nueva respuesta con el código de estado especificado
    ///
    /// Por defecto, la respuesta no tiene headers ni body.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// Respuesta con los headers comunes a todo lo que envía el servidor
    ///
    /// `Server` y `Connection: close` (no hay keep-alive).
    pub fn with_defaults(status: StatusCode) -> Self {
        Self::new(status)
            .with_header("Server", SERVER_SOFTWARE)
            .with_header("Connection", "close")
    }

    /// Agrega un header a la respuesta
    ///
    /// Si el header ya existe (sin distinguir mayúsculas), se sobrescribe
    /// manteniendo su posición.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.add_header(name, value);
        self
    }

    /// Agrega un header a una respuesta existente (versión mutable)
    pub fn add_header(&mut self, name: &str, value: &str) {
        match self
            .headers
            .iter_mut()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
        {
            Some(entry) => entry.1 = value.to_string(),
            None => self.headers.push((name.to_string(), value.to_string())),
        }
    }

    /// Establece el cuerpo desde un string y calcula `Content-Length`
    pub fn with_body(self, body: &str) -> Self {
        self.with_body_bytes(body.as_bytes().to_vec())
    }

    /// Establece el cuerpo desde bytes y calcula `Content-Length`
    ///
    /// El largo declarado es siempre el largo en bytes del body.
    pub fn with_body_bytes(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        let length = self.body.len().to_string();
        self.add_header("Content-Length", &length);
        self
    }

    /// Respuesta 200 con una página HTML
    pub fn html(body: &str) -> Self {
        Self::with_defaults(StatusCode::Ok)
            .with_header("Content-Type", HTML_CONTENT_TYPE)
            .with_body(body)
    }

    /// Crea una página de error HTML
    ///
    /// El body contiene el código y la razón, por ejemplo `404 Not Found`.
    ///
    /// # Ejemplo
    /// ```
    /// use cgi_http_server::http::{Response, StatusCode};
    ///
    /// let response = Response::error(StatusCode::NotFound, "/nope.html");
    /// let body = String::from_utf8_lossy(response.body());
    /// assert!(body.contains("404"));
    /// ```
    pub fn error(status: StatusCode, message: &str) -> Self {
        let body = format!(
            "<html><head><title>{status}</title></head><body><h1>{status}</h1><p>{}</p></body></html>",
            escape_html(message)
        );
        Self::with_defaults(status)
            .with_header("Content-Type", HTML_CONTENT_TYPE)
            .with_body(&body)
    }

    /// Escribe status line, headers y la línea vacía
    pub fn write_head<W: Write + ?Sized>(&self, out: &mut W) -> io::Result<()> {
        let mut head = format!("HTTP/1.1 {}\r\n", self.status);
        for (name, value) in &self.headers {
            head.push_str(name);
            head.push_str(": ");
            head.push_str(value);
            head.push_str("\r\n");
        }
        head.push_str("\r\n");
        out.write_all(head.as_bytes())
    }

    /// Escribe la respuesta completa (cabecera + body)
    pub fn write_to<W: Write + ?Sized>(&self, out: &mut W) -> io::Result<()> {
        self.write_head(out)?;
        out.write_all(&self.body)
    }

    /// Convierte la respuesta a bytes listos para enviar por el socket
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut result = Vec::with_capacity(self.body.len() + 128);
        // Escribir en un Vec no falla
        let _ = self.write_to(&mut result);
        result
    }

    /// Obtiene el código de estado de la respuesta
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Obtiene los headers en orden
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Busca un header sin distinguir mayúsculas
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Obtiene una referencia al body
    pub fn body(&self) -> &[u8] {
        &self.body
    }
}
