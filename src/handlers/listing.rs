//! # Listado de directorios
//! src/handlers/listing.rs
//!
//! Página HTML con una fila por hijo directo del directorio: nombre
//! (enlace), tamaño y fecha de modificación.
//!
//! Orden: primero directorios, después archivos, cada grupo por nombre.

use crate::http::{escape_html, Response, StatusCode};
use chrono::{DateTime, Local};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::time::SystemTime;

/// Caracteres que se codifican en un segmento de URL
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

const STYLE: &str = "body { font-family: Arial, sans-serif; margin: 20px; }\
h1 { color: #333; }\
table { width: 100%; border-collapse: collapse; margin-top: 20px; }\
th, td { border: 1px solid #ddd; padding: 8px; text-align: left; }\
th { background-color: #f4f4f4; font-weight: bold; }\
tr:nth-child(even) { background-color: #f9f9f9; }";

/// Un hijo del directorio listado
#[derive(Debug, Clone)]
struct Entry {
    name: String,
    is_dir: bool,
    size: u64,
    modified: Option<SystemTime>,
}

/// Envía el listado de `dir` como respuesta 200
///
/// `request_path` es el path pedido por el cliente; los enlaces se arman a
/// partir de él para que funcionen aunque falte la barra final.
pub fn serve_listing<W: Write + ?Sized>(
    dir: &Path,
    request_path: &str,
    out: &mut W,
) -> io::Result<StatusCode> {
    let html = render_listing(dir, request_path)?;
    Response::html(&html).write_to(out)?;
    Ok(StatusCode::Ok)
}

/// Genera el HTML del listado
pub fn render_listing(dir: &Path, request_path: &str) -> io::Result<String> {
    let entries = read_entries(dir)?;
    let base = encode_path(request_path);
    let title = escape_html(request_path);

    let mut html = String::with_capacity(512 + entries.len() * 160);
    html.push_str("<html><head><meta charset=\"UTF-8\">");
    html.push_str(&format!("<title>Index of {}</title>", title));
    html.push_str(&format!("<style>{}</style>", STYLE));
    html.push_str("</head><body>");
    html.push_str(&format!("<h1>Index of {}</h1>", title));
    html.push_str("<table>");
    html.push_str("<tr><th>Name</th><th>Size</th><th>Last modified</th></tr>");

    for entry in &entries {
        let suffix = if entry.is_dir { "/" } else { "" };
        let href = format!(
            "{}{}{}",
            base,
            utf8_percent_encode(&entry.name, PATH_SEGMENT),
            suffix
        );
        let size = if entry.is_dir {
            "-".to_string()
        } else {
            format_size(entry.size)
        };
        let modified = entry
            .modified
            .map(format_timestamp)
            .unwrap_or_else(|| "-".to_string());

        html.push_str(&format!(
            "<tr><td><a href=\"{}\">{}{}</a></td><td>{}</td><td>{}</td></tr>",
            escape_html(&href),
            escape_html(&entry.name),
            suffix,
            size,
            modified
        ));
    }

    html.push_str("</table></body></html>");
    Ok(html)
}

/// Lee y ordena los hijos directos
fn read_entries(dir: &Path) -> io::Result<Vec<Entry>> {
    let mut entries = Vec::new();

    for item in fs::read_dir(dir)? {
        let item = item?;
        // Se siguen symlinks; si el destino no existe se usa el propio link
        let metadata = match fs::metadata(item.path()) {
            Ok(metadata) => metadata,
            Err(_) => item.metadata()?,
        };

        entries.push(Entry {
            name: item.file_name().to_string_lossy().into_owned(),
            is_dir: metadata.is_dir(),
            size: metadata.len(),
            modified: metadata.modified().ok(),
        });
    }

    entries.sort_by(|a, b| b.is_dir.cmp(&a.is_dir).then_with(|| a.name.cmp(&b.name)));
    Ok(entries)
}

/// Codifica cada segmento del path y asegura la barra final
fn encode_path(path: &str) -> String {
    let mut encoded = String::from("/");
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        encoded.push_str(&utf8_percent_encode(segment, PATH_SEGMENT).to_string());
        encoded.push('/');
    }
    encoded
}

/// Tamaño legible: bytes exactos bajo 1024, si no dos decimales en KB/MB/GB
///
/// # Ejemplo
/// ```
/// use cgi_http_server::handlers::listing::format_size;
///
/// assert_eq!(format_size(512), "512 B");
/// assert_eq!(format_size(1536), "1.50 KB");
/// ```
pub fn format_size(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;

    let size = bytes as f64;
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if size < MB {
        format!("{:.2} KB", size / KB)
    } else if size < GB {
        format!("{:.2} MB", size / MB)
    } else {
        format!("{:.2} GB", size / GB)
    }
}

/// Fecha local con formato `yyyy-MM-dd HH:mm:ss`
pub fn format_timestamp(time: SystemTime) -> String {
    DateTime::<Local>::from(time)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(1023), "1023 B");
        assert_eq!(format_size(1024), "1.00 KB");
        assert_eq!(format_size(1024 * 1024), "1.00 MB");
        assert_eq!(format_size(5 * 1024 * 1024 + 512 * 1024), "5.50 MB");
        assert_eq!(format_size(3 * 1024 * 1024 * 1024), "3.00 GB");
    }

    #[test]
    fn test_format_timestamp_shape() {
        let formatted = format_timestamp(SystemTime::now());
        assert_eq!(formatted.len(), 19);
        assert_eq!(&formatted[4..5], "-");
        assert_eq!(&formatted[10..11], " ");
        assert_eq!(&formatted[13..14], ":");
    }

    #[test]
    fn test_encode_path() {
        assert_eq!(encode_path("/"), "/");
        assert_eq!(encode_path("/assets"), "/assets/");
        assert_eq!(encode_path("/my docs/"), "/my%20docs/");
    }

    #[test]
    fn test_listing_rows_and_order() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.txt"), vec![b'x'; 2048]).unwrap();
        fs::write(dir.path().join("a.txt"), b"hi").unwrap();
        fs::create_dir(dir.path().join("zeta")).unwrap();

        let html = render_listing(dir.path(), "/assets").unwrap();

        assert!(html.contains("<h1>Index of /assets</h1>"));
        assert!(html.contains("<a href=\"/assets/zeta/\">zeta/</a></td><td>-</td>"));
        assert!(html.contains("<a href=\"/assets/a.txt\">a.txt</a></td><td>2 B</td>"));
        assert!(html.contains("<a href=\"/assets/b.txt\">b.txt</a></td><td>2.00 KB</td>"));

        let zeta = html.find("zeta/").unwrap();
        let a = html.find("a.txt").unwrap();
        let b = html.find("b.txt").unwrap();
        assert!(zeta < a && a < b);
    }

    #[test]
    fn test_names_are_escaped() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("<b>.txt"), b"").unwrap();

        let html = render_listing(dir.path(), "/").unwrap();
        assert!(html.contains("&lt;b&gt;.txt"));
        assert!(html.contains("href=\"/%3Cb%3E.txt\""));
    }

    #[test]
    fn test_serve_listing_content_length() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("ñ.txt"), b"x").unwrap();

        let mut out = Vec::new();
        serve_listing(dir.path(), "/", &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let (head, body) = text.split_once("\r\n\r\n").unwrap();

        assert!(head.starts_with("HTTP/1.1 200 OK"));
        assert!(head.contains("Content-Type: text/html; charset=UTF-8"));
        assert!(head.contains(&format!("Content-Length: {}", body.len())));
    }
}
