//! # Handlers de contenido
//!
//! Escriben la respuesta directamente en la salida de la conexión y
//! retornan el status enviado.
//!
//! - **static_file**: archivos regulares (texto o binario)
//! - **listing**: listado HTML de un directorio sin index
//!
//! La ejecución de scripts vive aparte, en `crate::cgi`.

pub mod listing;
pub mod static_file;

pub use listing::serve_listing;
pub use static_file::serve_file;
