//! # Resolución de tipos MIME
//! src/mime.rs
//!
//! Tipo de contenido a partir de la extensión del archivo.

use std::path::Path;

/// Tipo por defecto cuando la extensión no es conocida
pub const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// Retorna el content-type para un nombre de archivo
///
/// # Ejemplo
/// ```
/// use cgi_http_server::mime::content_type_for;
///
/// assert_eq!(content_type_for("readme.txt"), "text/plain");
/// assert_eq!(content_type_for("blob.zzz"), "application/octet-stream");
/// ```
pub fn content_type_for<P: AsRef<Path>>(file_name: P) -> String {
    mime_guess::from_path(file_name)
        .first()
        .map(|mime| mime.essence_str().to_string())
        .unwrap_or_else(|| FALLBACK_CONTENT_TYPE.to_string())
}

/// Indica si el content-type es texto (`text/*`)
pub fn is_text(content_type: &str) -> bool {
    content_type.starts_with("text/")
}
