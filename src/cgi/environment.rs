//! # Entorno CGI
//! src/cgi/environment.rs
//!
//! Traduce un request HTTP a las variables de entorno de CGI/1.1. El entorno
//! se arma desde cero en cada invocación; del proceso servidor solo pasan
//! las variables de `PASSTHROUGH_VARS`.

use crate::http::{Method, Request, SERVER_SOFTWARE};
use std::net::SocketAddr;
use std::path::Path;

/// Content-Type de un POST que no declara ninguno
pub const DEFAULT_POST_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Variables heredadas del servidor (el intérprete necesita PATH y temporales)
const PASSTHROUGH_VARS: &[&str] = &["PATH", "SYSTEMROOT", "TMPDIR", "TEMP", "TMP"];

/// Headers que no se exportan como `HTTP_*`
///
/// Content-Length y Content-Type ya tienen variable propia. `Proxy` se
/// descarta para que un cliente no pueda fijar `HTTP_PROXY` (httpoxy).
const SKIPPED_HEADERS: &[&str] = &["content-length", "content-type", "proxy"];

/// Lo que la pasarela necesita saber del request
#[derive(Debug, Clone)]
pub struct CgiRequest {
    pub method: Method,
    /// Query cruda, sin '?'
    pub query: String,
    pub body: Vec<u8>,
    pub content_type: Option<String>,
    /// Path URL del script, ej: "/blog/index.php"
    pub script_name: String,
    pub headers: Vec<(String, String)>,
    pub remote_addr: Option<SocketAddr>,
}

impl CgiRequest {
    /// Arma el descriptor a partir de un request ya leído
    pub fn from_request(
        request: &Request,
        script_name: String,
        remote_addr: Option<SocketAddr>,
    ) -> Self {
        Self {
            method: request.method(),
            query: request.query().to_string(),
            body: request.body().to_vec(),
            content_type: request.content_type().map(str::to_string),
            script_name,
            headers: request.headers().to_vec(),
            remote_addr,
        }
    }

    /// `REQUEST_URI`: el script, con `?query` en un GET con query
    pub fn request_uri(&self) -> String {
        if self.method == Method::GET && !self.query.is_empty() {
            format!("{}?{}", self.script_name, self.query)
        } else {
            self.script_name.clone()
        }
    }
}

/// Construye el entorno completo para una invocación
pub fn build_environment(
    script: &Path,
    request: &CgiRequest,
    server_port: u16,
) -> Vec<(String, String)> {
    let mut env: Vec<(String, String)> = PASSTHROUGH_VARS
        .iter()
        .filter_map(|name| std::env::var(name).ok().map(|value| (name.to_string(), value)))
        .collect();

    let mut set = |name: &str, value: String| env.push((name.to_string(), value));

    set("GATEWAY_INTERFACE", "CGI/1.1".to_string());
    set("SERVER_SOFTWARE", SERVER_SOFTWARE.to_string());
    set("SERVER_NAME", "localhost".to_string());
    set("SERVER_PROTOCOL", "HTTP/1.1".to_string());
    set("SERVER_PORT", server_port.to_string());
    set("REDIRECT_STATUS", "200".to_string());
    set("REQUEST_METHOD", request.method.as_str().to_string());
    set("SCRIPT_FILENAME", script.display().to_string());
    set("SCRIPT_NAME", request.script_name.clone());
    set("REQUEST_URI", request.request_uri());

    match request.method {
        Method::GET => set("QUERY_STRING", request.query.clone()),
        Method::POST => {
            set("CONTENT_LENGTH", request.body.len().to_string());
            let content_type = request
                .content_type
                .as_deref()
                .filter(|value| !value.is_empty())
                .unwrap_or(DEFAULT_POST_CONTENT_TYPE);
            set("CONTENT_TYPE", content_type.to_string());
        }
    }

    if let Some(addr) = request.remote_addr {
        set("REMOTE_ADDR", addr.ip().to_string());
    }

    for (name, value) in &request.headers {
        if let Some(var) = header_variable(name) {
            set(&var, value.clone());
        }
    }

    env
}

/// `User-Agent` → `HTTP_USER_AGENT`; `None` para headers no exportables
fn header_variable(name: &str) -> Option<String> {
    let lower = name.to_ascii_lowercase();
    if SKIPPED_HEADERS.contains(&lower.as_str()) {
        return None;
    }
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return None;
    }
    Some(format!("HTTP_{}", name.to_ascii_uppercase().replace('-', "_")))
}
