//! # Archivos estáticos
//! src/handlers/static_file.rs
//!
//! - `text/*`: se lee como UTF-8 y cada línea se termina con `\n`. El
//!   `Content-Length` se calcula sobre el texto reconstruido, que es
//!   exactamente lo que se envía.
//! - Resto: bytes tal cual, `Content-Length` = tamaño en disco.

use crate::http::{Response, StatusCode};
use crate::mime;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;

/// Envía un archivo regular como respuesta 200
pub fn serve_file<W: Write + ?Sized>(path: &Path, out: &mut W) -> io::Result<StatusCode> {
    let content_type = mime::content_type_for(path);

    if mime::is_text(&content_type) {
        serve_text(path, &content_type, out)
    } else {
        serve_binary(path, &content_type, out)
    }
}

fn serve_text<W: Write + ?Sized>(
    path: &Path,
    content_type: &str,
    out: &mut W,
) -> io::Result<StatusCode> {
    let body = match String::from_utf8(fs::read(path)?) {
        Ok(text) => normalize_newlines(&text).into_bytes(),
        // No es UTF-8: se envía sin tocar
        Err(e) => e.into_bytes(),
    };

    Response::with_defaults(StatusCode::Ok)
        .with_header("Content-Type", content_type)
        .with_body_bytes(body)
        .write_to(out)?;

    Ok(StatusCode::Ok)
}

fn serve_binary<W: Write + ?Sized>(
    path: &Path,
    content_type: &str,
    out: &mut W,
) -> io::Result<StatusCode> {
    let mut file = File::open(path)?;
    let length = file.metadata()?.len();

    Response::with_defaults(StatusCode::Ok)
        .with_header("Content-Type", content_type)
        .with_header("Content-Length", &length.to_string())
        .write_head(out)?;
    io::copy(&mut file, out)?;

    Ok(StatusCode::Ok)
}

/// Reconstruye el texto con cada línea terminada en `\n`
///
/// `\r\n` pasa a `\n` y la última línea recibe `\n` aunque no lo tuviera.
pub fn normalize_newlines(text: &str) -> String {
    let mut normalized = String::with_capacity(text.len() + 1);
    for line in text.lines() {
        normalized.push_str(line);
        normalized.push('\n');
    }
    normalized
}
