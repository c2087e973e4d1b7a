//! # Lectura de Requests HTTP/1.x
//! src/http/request.rs
//!
//! Parser incremental que lee un único request directamente del socket.
//!
//! ## Formato
//!
//! ```text
//! POST /form.php?lang=es HTTP/1.1\r\n
//! Host: localhost:1111\r\n
//! Content-Type: application/x-www-form-urlencoded\r\n
//! Content-Length: 3\r\n
//! \r\n
//! a=1
//! ```
//!
//! 1. **Request Line**: `METHOD target [VERSION]` (mínimo dos tokens)
//! 2. **Headers**: Pares `Name: Value` hasta la línea vacía
//! 3. **Body**: exactamente `Content-Length` bytes (solo POST)

use percent_encoding::percent_decode_str;
use std::io::{self, BufRead, Read};
use thiserror::Error;

/// Longitud máxima de una línea (request line o header)
const MAX_LINE_BYTES: u64 = 8192;

/// Número máximo de headers aceptados
const MAX_HEADERS: usize = 100;

/// Body máximo que se acepta en memoria (16 MiB)
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Métodos HTTP soportados
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// GET - Obtener un recurso
    GET,

    /// POST - Enviar datos a un script
    POST,
}

impl Method {
    /// Parsea un método HTTP desde un string
    ///
    /// # Errores
    ///
    /// Retorna `UnsupportedMethod` para cualquier otro token (HEAD, PUT, ...)
    fn from_str(s: &str) -> Result<Self, ParseError> {
        match s {
            "GET" => Ok(Method::GET),
            "POST" => Ok(Method::POST),
            _ => Err(ParseError::UnsupportedMethod(s.to_string())),
        }
    }

    /// Convierte el método a string
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::GET => "GET",
            Method::POST => "POST",
        }
    }
}

/// Errores que pueden ocurrir durante la lectura del request
#[derive(Debug, Error)]
pub enum ParseError {
    /// El cliente cerró sin enviar nada
    #[error("Empty request")]
    EmptyRequest,

    /// Request line con menos de dos tokens
    #[error("Invalid request line: {0:?}")]
    InvalidRequestLine(String),

    /// Método HTTP no soportado
    #[error("Unsupported HTTP method: {0}")]
    UnsupportedMethod(String),

    /// Header sin ':'
    #[error("Invalid header: {0:?}")]
    InvalidHeader(String),

    /// Línea o bloque de headers demasiado grande
    #[error("Request head too large")]
    HeadTooLarge,

    /// Content-Length no numérico
    #[error("Invalid Content-Length: {0:?}")]
    InvalidContentLength(String),

    /// Content-Length mayor que el máximo aceptado
    #[error("Request body too large: {declared} bytes (limit {limit})")]
    BodyTooLarge { declared: usize, limit: usize },

    /// El body terminó antes de Content-Length
    #[error("Incomplete body: expected {expected} bytes, got {received}")]
    IncompleteBody { expected: usize, received: usize },

    /// Error de I/O leyendo del socket
    #[error("I/O error reading request: {0}")]
    Io(#[from] io::Error),
}

/// Representa un request HTTP ya leído del socket
#[derive(Debug, Clone)]
pub struct Request {
    /// Método HTTP (GET, POST)
    method: Method,

    /// Target tal como llegó (ej: "/form.php?a=1")
    raw_path: String,

    /// Path decodificado, sin query (ej: "/form.php")
    path: String,

    /// Query string cruda, lo que sigue al primer '?' (puede ser vacía)
    query: String,

    /// Versión HTTP (HTTP/1.0 si el cliente no la envía)
    version: String,

    /// Headers en orden de llegada; la búsqueda ignora mayúsculas
    headers: Vec<(String, String)>,

    /// Body del request (vacío salvo en POST)
    body: Vec<u8>,
}

impl Request {
    /// Lee un request completo desde un lector con buffer
    ///
    /// # Retorna
    ///
    /// * `Ok(Some(Request))` - Request leído
    /// * `Ok(None)` - El cliente cerró la conexión sin enviar la request line
    /// * `Err(ParseError)` - Request malformado o error de I/O
    ///
    /// # Ejemplo
    ///
    /// ```
    /// use cgi_http_server::http::Request;
    ///
    /// let mut raw: &[u8] = b"GET /index.php?id=7 HTTP/1.1\r\n\r\n";
    /// let request = Request::read_from(&mut raw).unwrap().unwrap();
    ///
    /// assert_eq!(request.path(), "/index.php");
    /// assert_eq!(request.query(), "id=7");
    /// ```
    pub fn read_from<R: BufRead>(reader: &mut R) -> Result<Option<Self>, ParseError> {
        // 1. Request line
        let line = match Self::read_line(reader)? {
            Some(line) => line,
            None => return Ok(None),
        };
        let (method, raw_path, version) = Self::parse_request_line(&line)?;
        let (path, query) = Self::split_target(&raw_path);

        // 2. Headers
        let headers = Self::read_headers(reader)?;

        let mut request = Request {
            method,
            raw_path,
            path,
            query,
            version,
            headers,
            body: Vec::new(),
        };

        // 3. Body
        if method == Method::POST {
            request.body = request.read_body(reader)?;
        }

        Ok(Some(request))
    }

    /// Parsea un request desde bytes en memoria
    ///
    /// # Ejemplo
    ///
    /// ```
    /// use cgi_http_server::http::Request;
    ///
    /// let request = Request::parse(b"GET /readme.txt HTTP/1.0\r\n\r\n").unwrap();
    /// assert_eq!(request.path(), "/readme.txt");
    /// ```
    pub fn parse(buffer: &[u8]) -> Result<Self, ParseError> {
        let mut reader = buffer;
        Self::read_from(&mut reader)?.ok_or(ParseError::EmptyRequest)
    }

    /// Lee una línea sin el terminador (`\n` o `\r\n`)
    ///
    /// Retorna `None` en EOF sin datos.
    fn read_line<R: BufRead>(reader: &mut R) -> Result<Option<String>, ParseError> {
        let mut buf = Vec::new();
        let read = reader.by_ref().take(MAX_LINE_BYTES).read_until(b'\n', &mut buf)?;
        if read == 0 {
            return Ok(None);
        }
        if !buf.ends_with(b"\n") && read as u64 == MAX_LINE_BYTES {
            return Err(ParseError::HeadTooLarge);
        }
        while matches!(buf.last(), Some(b'\n') | Some(b'\r')) {
            buf.pop();
        }
        Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
    }

    /// Parsea la request line
    ///
    /// Formato: `GET /path?query HTTP/1.1`. La versión es opcional.
    fn parse_request_line(line: &str) -> Result<(Method, String, String), ParseError> {
        let parts: Vec<&str> = line.split_whitespace().collect();

        if parts.len() < 2 {
            return Err(ParseError::InvalidRequestLine(line.to_string()));
        }

        let method = Method::from_str(parts[0])?;
        let version = parts.get(2).copied().unwrap_or("HTTP/1.0").to_string();

        Ok((method, parts[1].to_string(), version))
    }

    /// Separa el target en path decodificado y query cruda
    ///
    /// Ejemplo: "/a%20b/x.php?q=1&r" → ("/a b/x.php", "q=1&r")
    fn split_target(target: &str) -> (String, String) {
        let (path, query) = target.split_once('?').unwrap_or((target, ""));
        let decoded = percent_decode_str(path).decode_utf8_lossy().into_owned();
        (decoded, query.to_string())
    }

    /// Lee headers hasta la línea vacía (o EOF)
    fn read_headers<R: BufRead>(reader: &mut R) -> Result<Vec<(String, String)>, ParseError> {
        let mut headers = Vec::new();

        while let Some(line) = Self::read_line(reader)? {
            if line.trim().is_empty() {
                break;
            }
            if headers.len() >= MAX_HEADERS {
                return Err(ParseError::HeadTooLarge);
            }

            match line.split_once(':') {
                Some((name, value)) => {
                    headers.push((name.trim().to_string(), value.trim().to_string()));
                }
                None => return Err(ParseError::InvalidHeader(line)),
            }
        }

        Ok(headers)
    }

    /// Lee exactamente `Content-Length` bytes de body
    fn read_body<R: BufRead>(&self, reader: &mut R) -> Result<Vec<u8>, ParseError> {
        let expected = match self.header("Content-Length") {
            Some(value) => value
                .parse::<usize>()
                .map_err(|_| ParseError::InvalidContentLength(value.to_string()))?,
            None => 0,
        };
        if expected > MAX_BODY_BYTES {
            return Err(ParseError::BodyTooLarge {
                declared: expected,
                limit: MAX_BODY_BYTES,
            });
        }

        let mut body = Vec::new();
        reader.by_ref().take(expected as u64).read_to_end(&mut body)?;

        if body.len() < expected {
            return Err(ParseError::IncompleteBody {
                expected,
                received: body.len(),
            });
        }

        Ok(body)
    }

    // === Métodos públicos para acceder a los campos ===

    /// Obtiene el método HTTP del request
    pub fn method(&self) -> Method {
        self.method
    }

    /// Target original, con query incluida
    pub fn raw_path(&self) -> &str {
        &self.raw_path
    }

    /// Obtiene el path decodificado del request
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Query string cruda (sin el '?')
    pub fn query(&self) -> &str {
        &self.query
    }

    /// Obtiene la versión HTTP
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Obtiene todos los headers en orden de llegada
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Obtiene un header específico (sin distinguir mayúsculas)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Content-Type declarado, si existe
    pub fn content_type(&self) -> Option<&str> {
        self.header("Content-Type")
    }

    /// Obtiene el body del request
    pub fn body(&self) -> &[u8] {
        &self.body
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_get() {
        let request = Request::parse(b"GET / HTTP/1.0\r\n\r\n").unwrap();

        assert_eq!(request.method(), Method::GET);
        assert_eq!(request.path(), "/");
        assert_eq!(request.query(), "");
        assert_eq!(request.version(), "HTTP/1.0");
        assert!(request.body().is_empty());
    }

    #[test]
    fn test_parse_two_tokens_defaults_version() {
        let request = Request::parse(b"GET /readme.txt\r\n\r\n").unwrap();

        assert_eq!(request.path(), "/readme.txt");
        assert_eq!(request.version(), "HTTP/1.0");
    }

    #[test]
    fn test_query_is_kept_raw() {
        let request = Request::parse(b"GET /s.php?a=1&b=%20x+y&&c HTTP/1.1\r\n\r\n").unwrap();

        assert_eq!(request.path(), "/s.php");
        assert_eq!(request.query(), "a=1&b=%20x+y&&c");
        assert_eq!(request.raw_path(), "/s.php?a=1&b=%20x+y&&c");
    }

    #[test]
    fn test_path_is_percent_decoded() {
        let request = Request::parse(b"GET /my%20docs/a+b.txt HTTP/1.1\r\n\r\n").unwrap();
        assert_eq!(request.path(), "/my docs/a+b.txt");
    }

    #[test]
    fn test_headers_case_insensitive_and_ordered() {
        let raw = b"GET / HTTP/1.1\r\nHost: localhost:1111\r\nX-B: 2\r\nx-a: 1\r\n\r\n";
        let request = Request::parse(raw).unwrap();

        assert_eq!(request.header("host"), Some("localhost:1111"));
        assert_eq!(request.header("X-A"), Some("1"));
        let names: Vec<&str> = request.headers().iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(names, vec!["Host", "X-B", "x-a"]);
    }

    #[test]
    fn test_bare_newlines_accepted() {
        let request = Request::parse(b"GET /x HTTP/1.1\nHost: a\n\n").unwrap();
        assert_eq!(request.header("Host"), Some("a"));
    }

    #[test]
    fn test_post_reads_exact_body() {
        let raw = b"POST /form.php HTTP/1.1\r\nContent-Type: text/plain\r\nContent-Length: 3\r\n\r\na=1EXTRA";
        let request = Request::parse(raw).unwrap();

        assert_eq!(request.method(), Method::POST);
        assert_eq!(request.body(), b"a=1");
        assert_eq!(request.content_type(), Some("text/plain"));
    }

    #[test]
    fn test_post_without_content_length_has_empty_body() {
        let request = Request::parse(b"POST /form.php HTTP/1.1\r\n\r\nignored").unwrap();
        assert!(request.body().is_empty());
    }

    #[test]
    fn test_get_ignores_body() {
        let raw = b"GET / HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello";
        let request = Request::parse(raw).unwrap();
        assert!(request.body().is_empty());
    }

    #[test]
    fn test_incomplete_body() {
        let raw = b"POST /f.php HTTP/1.1\r\nContent-Length: 10\r\n\r\nabc";
        let result = Request::parse(raw);

        assert!(matches!(
            result,
            Err(ParseError::IncompleteBody { expected: 10, received: 3 })
        ));
    }

    #[test]
    fn test_invalid_content_length() {
        let raw = b"POST /f.php HTTP/1.1\r\nContent-Length: abc\r\n\r\n";
        assert!(matches!(Request::parse(raw), Err(ParseError::InvalidContentLength(_))));
    }

    #[test]
    fn test_single_token_is_invalid() {
        let result = Request::parse(b"BADLINE\r\n\r\n");
        assert!(matches!(result, Err(ParseError::InvalidRequestLine(_))));
    }

    #[test]
    fn test_unsupported_method() {
        let result = Request::parse(b"DELETE /x HTTP/1.1\r\n\r\n");
        assert!(matches!(result, Err(ParseError::UnsupportedMethod(m)) if m == "DELETE"));
    }

    #[test]
    fn test_invalid_header() {
        let result = Request::parse(b"GET / HTTP/1.1\r\nnocolon\r\n\r\n");
        assert!(matches!(result, Err(ParseError::InvalidHeader(_))));
    }

    #[test]
    fn test_empty_input() {
        let mut raw: &[u8] = b"";
        assert!(Request::read_from(&mut raw).unwrap().is_none());
        assert!(matches!(Request::parse(b""), Err(ParseError::EmptyRequest)));
    }

    #[test]
    fn test_line_too_long() {
        let mut raw = b"GET /".to_vec();
        raw.extend(std::iter::repeat(b'a').take(MAX_LINE_BYTES as usize));
        raw.extend_from_slice(b" HTTP/1.1\r\n\r\n");
        assert!(matches!(Request::parse(&raw), Err(ParseError::HeadTooLarge)));
    }

    #[test]
    fn test_body_over_limit_is_rejected() {
        let raw = format!(
            "POST /upload.php HTTP/1.1\r\nContent-Length: {}\r\n\r\n",
            MAX_BODY_BYTES + 1
        );
        let result = Request::parse(raw.as_bytes());
        assert!(matches!(
            result,
            Err(ParseError::BodyTooLarge { limit, .. }) if limit == MAX_BODY_BYTES
        ));
    }
}
