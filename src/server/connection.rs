//! # Manejo de Conexiones
//! src/server/connection.rs
//!
//! Una conexión = un request = una respuesta. Toda la salida pasa por un
//! writer que cuenta bytes: si algo falla antes de enviar nada todavía se
//! puede responder 500, si ya salió la cabecera solo queda cerrar.

use crate::http::{ParseError, Request, Response, StatusCode};
use crate::router::Router;
use log::{debug, error, info, warn};
use std::fmt;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::time::{Duration, Instant};

/// Tiempo máximo descartando lo que el cliente siga enviando antes de cerrar
const LINGER_TIMEOUT: Duration = Duration::from_millis(100);

/// Bytes máximos descartados antes de cerrar
const LINGER_MAX_BYTES: u64 = 64 * 1024;

/// Writer que cuenta los bytes que lo atraviesan
pub struct CountingWriter<W: Write> {
    inner: W,
    written: u64,
}

impl<W: Write> CountingWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, written: 0 }
    }

    /// Bytes aceptados hasta ahora
    pub fn bytes_written(&self) -> u64 {
        self.written
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Dirección del peer para los logs
struct Peer(Option<SocketAddr>);

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(addr) => write!(f, "{}", addr),
            None => write!(f, "-"),
        }
    }
}

/// Atiende una conexión completa y la cierra
///
/// Nunca propaga errores: todo queda en el log.
pub fn handle_connection(stream: TcpStream, router: &Router, read_timeout: Option<Duration>) {
    let start = Instant::now();
    let peer = Peer(stream.peer_addr().ok());

    if let Err(e) = stream.set_read_timeout(read_timeout) {
        warn!("Failed to set read timeout for {}: {}", peer, e);
    }

    let read_half = match stream.try_clone() {
        Ok(read_half) => read_half,
        Err(e) => {
            error!("Failed to clone stream for {}: {}", peer, e);
            return;
        }
    };
    let mut reader = BufReader::new(read_half);
    let mut writer = CountingWriter::new(BufWriter::new(&stream));

    let (request_line, status) = match Request::read_from(&mut reader) {
        Ok(Some(request)) => {
            let request_line = format!("{} {}", request.method().as_str(), request.raw_path());
            let status = dispatch(&request, router, &mut writer, &peer);
            (request_line, status)
        }
        Ok(None) => {
            debug!("{} closed without sending a request", peer);
            return;
        }
        Err(ParseError::Io(e)) => {
            warn!("Failed to read request from {}: {}", peer, e);
            return;
        }
        Err(e) => {
            let status = match e {
                ParseError::UnsupportedMethod(_) => StatusCode::NotImplemented,
                _ => StatusCode::BadRequest,
            };
            debug!("Rejected request from {}: {}", peer, e);
            if let Err(e) = Response::error(status, &e.to_string()).write_to(&mut writer) {
                warn!("Failed to send {} to {}: {}", status, peer, e);
            }
            ("-".to_string(), status)
        }
    };

    if let Err(e) = writer.flush() {
        debug!("Failed to flush response to {}: {}", peer, e);
    }
    let bytes = writer.bytes_written();
    drop(writer);

    info!(
        "{} \"{}\" {} {} {:.2}ms",
        peer,
        request_line,
        status.as_u16(),
        bytes,
        start.elapsed().as_secs_f64() * 1000.0
    );

    linger_close(&stream, reader);
}

/// Pasa el request al router y convierte sus errores en respuesta
fn dispatch<W: Write>(
    request: &Request,
    router: &Router,
    writer: &mut CountingWriter<W>,
    peer: &Peer,
) -> StatusCode {
    match router.route(request, peer.0, writer) {
        Ok(status) => status,
        Err(e) if writer.bytes_written() == 0 => {
            error!("Failed to serve {} for {}: {}", request.raw_path(), peer, e);
            let status = StatusCode::InternalServerError;
            if let Err(e) = Response::error(status, "Internal server error").write_to(writer) {
                warn!("Failed to send {} to {}: {}", status, peer, e);
            }
            status
        }
        Err(e) => {
            // La cabecera ya salió: los handlers solo la escriben con 200
            error!(
                "Failed to serve {} for {} after sending {} bytes: {}",
                request.raw_path(),
                peer,
                writer.bytes_written(),
                e
            );
            StatusCode::Ok
        }
    }
}

/// Cierra la escritura y descarta lo que quede por leer
///
/// Cerrar con datos sin leer hace que el kernel envíe RST y el cliente puede
/// perder la respuesta.
fn linger_close(stream: &TcpStream, reader: BufReader<TcpStream>) {
    if stream.shutdown(Shutdown::Write).is_err() {
        return;
    }
    if stream.set_read_timeout(Some(LINGER_TIMEOUT)).is_err() {
        return;
    }
    let _ = io::copy(&mut reader.into_inner().take(LINGER_MAX_BYTES), &mut io::sink());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use std::fs;
    use std::net::TcpListener;
    use std::path::Path;
    use std::thread;

    fn router(root: &Path) -> Router {
        let config = ServerConfig {
            document_root: root.to_path_buf(),
            ..ServerConfig::default()
        };
        Router::new(&config, 0)
    }

    /// Acepta una conexión, la atiende y devuelve lo que recibió el cliente
    fn exchange(root: &Path, raw: &[u8]) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let router = router(root);

        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            handle_connection(stream, &router, Some(Duration::from_secs(5)));
        });

        let mut client = TcpStream::connect(addr).unwrap();
        client.write_all(raw).unwrap();
        client.shutdown(Shutdown::Write).unwrap();

        let mut buf = Vec::new();
        client.read_to_end(&mut buf).unwrap();
        server.join().unwrap();

        String::from_utf8_lossy(&buf).into_owned()
    }

    #[test]
    fn test_counting_writer() {
        let mut writer = CountingWriter::new(Vec::new());
        writer.write_all(b"hola").unwrap();
        writer.write_all(b" mundo").unwrap();

        assert_eq!(writer.bytes_written(), 10);
    }

    #[test]
    fn test_serves_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "uno\ndos\n").unwrap();

        let text = exchange(dir.path(), b"GET /a.txt HTTP/1.1\r\nHost: x\r\n\r\n");

        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("Content-Length: 8\r\n"));
        assert!(text.contains("Connection: close\r\n"));
        assert!(text.ends_with("\r\n\r\nuno\ndos\n"));
    }

    #[test]
    fn test_unsupported_method() {
        let dir = tempfile::tempdir().unwrap();
        let text = exchange(dir.path(), b"DELETE /a.txt HTTP/1.1\r\n\r\n");

        assert!(text.starts_with("HTTP/1.1 501 Not Implemented\r\n"));
    }

    #[test]
    fn test_malformed_request_line() {
        let dir = tempfile::tempdir().unwrap();
        let text = exchange(dir.path(), b"GARBAGE\r\n\r\n");

        assert!(text.starts_with("HTTP/1.1 400 Bad Request\r\n"));
    }

    #[test]
    fn test_header_without_colon() {
        let dir = tempfile::tempdir().unwrap();
        let text = exchange(dir.path(), b"GET / HTTP/1.1\r\nbroken header\r\n\r\n");

        assert!(text.starts_with("HTTP/1.1 400 Bad Request\r\n"));
    }

    #[test]
    fn test_oversized_body_is_400() {
        let dir = tempfile::tempdir().unwrap();
        let text = exchange(
            dir.path(),
            b"POST /a.php HTTP/1.1\r\nContent-Length: 99999999999\r\n\r\n",
        );

        assert!(text.starts_with("HTTP/1.1 400 Bad Request\r\n"));
    }

    #[test]
    fn test_peer_closed_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let text = exchange(dir.path(), b"");

        assert!(text.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_gateway_failure_before_head_is_500() {
        let dir = tempfile::tempdir().unwrap();
        // El script termina sin la línea vacía que separa headers y body
        fs::write(dir.path().join("bad.php"), "printf 'Content-Type: text/plain\\n'").unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let config = ServerConfig {
            document_root: dir.path().to_path_buf(),
            script_execution_enabled: true,
            interpreter: "/bin/sh".into(),
            ..ServerConfig::default()
        };
        let router = Router::new(&config, addr.port());

        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            handle_connection(stream, &router, None);
        });

        let mut client = TcpStream::connect(addr).unwrap();
        client.write_all(b"GET /bad.php HTTP/1.1\r\n\r\n").unwrap();
        let mut buf = Vec::new();
        client.read_to_end(&mut buf).unwrap();
        server.join().unwrap();

        let text = String::from_utf8_lossy(&buf);
        assert!(text.starts_with("HTTP/1.1 500 Internal Server Error\r\n"));
    }
}
