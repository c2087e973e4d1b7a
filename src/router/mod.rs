//! # Sistema de Routing
//! src/router/mod.rs
//!
//! Resuelve el path del request contra el document root y decide quién
//! responde.
//!
//! ## Arquitectura
//!
//! ```text
//! Request → resolve() → ResolvedTarget ─┬─ Missing    → 404
//!                                       ├─ Directory  → index script / index.html / listado
//!                                       ├─ ScriptFile → CGI (o 403 si está deshabilitado)
//!                                       └─ StaticFile → archivo
//! ```
//!
//! Un path que sale del document root responde 403, antes y después de
//! resolver symlinks.

use crate::cgi::{CgiGateway, CgiRequest};
use crate::config::ServerConfig;
use crate::error::{HandlerError, RouteError};
use crate::handlers::{serve_file, serve_listing};
use crate::http::{Request, Response, StatusCode};
use log::{debug, warn};
use std::fs;
use std::io::{self, Write};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Página index estática
const INDEX_HTML: &str = "index.html";

/// Clasificación del recurso pedido
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    StaticFile,
    Directory,
    ScriptFile,
    Missing,
}

/// Path canónico dentro del document root y su clasificación
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    pub path: PathBuf,
    pub kind: TargetKind,
}

/// Router de archivos y scripts bajo un document root
pub struct Router {
    document_root: PathBuf,
    script_execution_enabled: bool,
    script_extension: String,
    gateway: CgiGateway,
}

impl Router {
    /// Crea el router a partir de la configuración
    ///
    /// `server_port` es el puerto real en el que se escucha (puede diferir
    /// del configurado si éste era 0).
    pub fn new(config: &ServerConfig, server_port: u16) -> Self {
        let document_root = fs::canonicalize(&config.document_root)
            .unwrap_or_else(|_| config.document_root.clone());

        Self {
            document_root,
            script_execution_enabled: config.script_execution_enabled,
            script_extension: config.script_extension.clone(),
            gateway: CgiGateway::new(
                config.interpreter.clone(),
                server_port,
                config.cgi_timeout(),
            ),
        }
    }

    /// Document root canónico
    pub fn document_root(&self) -> &Path {
        &self.document_root
    }

    /// Resuelve un path de request (ya decodificado)
    ///
    /// # Errores
    ///
    /// `OutsideRoot` si el path sale del document root.
    pub fn resolve(&self, request_path: &str) -> Result<ResolvedTarget, RouteError> {
        // Normalización léxica antes de tocar el filesystem
        let mut relative = PathBuf::new();
        for segment in request_path.split(['/', '\\']) {
            match segment {
                "" | "." => {}
                ".." => {
                    if !relative.pop() {
                        return Err(RouteError::OutsideRoot(request_path.to_string()));
                    }
                }
                segment => relative.push(segment),
            }
        }

        let joined = self.document_root.join(&relative);
        let canonical = match fs::canonicalize(&joined) {
            Ok(path) => path,
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => return Err(e.into()),
            Err(_) => {
                return Ok(ResolvedTarget {
                    path: joined,
                    kind: TargetKind::Missing,
                })
            }
        };

        // Un symlink puede apuntar fuera del document root
        if !canonical.starts_with(&self.document_root) {
            return Err(RouteError::OutsideRoot(request_path.to_string()));
        }

        let metadata = fs::metadata(&canonical)?;
        let kind = if metadata.is_dir() {
            TargetKind::Directory
        } else if self.is_script(&canonical) {
            TargetKind::ScriptFile
        } else {
            TargetKind::StaticFile
        };

        Ok(ResolvedTarget {
            path: canonical,
            kind,
        })
    }

    /// Atiende un request escribiendo la respuesta en `out`
    ///
    /// Retorna el status enviado. Los errores de I/O y de la pasarela se
    /// propagan al handler de la conexión.
    pub fn route<W: Write + ?Sized>(
        &self,
        request: &Request,
        remote_addr: Option<SocketAddr>,
        out: &mut W,
    ) -> Result<StatusCode, HandlerError> {
        let target = match self.resolve(request.path()) {
            Ok(target) => target,
            Err(RouteError::OutsideRoot(path)) => {
                warn!("Rejected path outside document root: {:?}", path);
                return Self::respond(StatusCode::Forbidden, request.path(), out);
            }
            Err(RouteError::Io(e)) => return Err(e.into()),
        };
        debug!("{} resolved to {:?} {}", request.path(), target.kind, target.path.display());

        match target.kind {
            TargetKind::Missing => Self::respond(StatusCode::NotFound, request.path(), out),
            TargetKind::Directory => self.route_directory(&target.path, request, remote_addr, out),
            TargetKind::ScriptFile if !self.script_execution_enabled => {
                debug!("Script execution disabled: {}", target.path.display());
                Self::respond(StatusCode::Forbidden, request.path(), out)
            }
            TargetKind::ScriptFile => {
                let script_name = self.script_name(&target.path);
                self.execute_script(&target.path, script_name, request, remote_addr, out)
            }
            TargetKind::StaticFile => Ok(serve_file(&target.path, out)?),
        }
    }

    /// Directorio: index script > index.html > listado
    fn route_directory<W: Write + ?Sized>(
        &self,
        dir: &Path,
        request: &Request,
        remote_addr: Option<SocketAddr>,
        out: &mut W,
    ) -> Result<StatusCode, HandlerError> {
        let index_script = format!("index.{}", self.script_extension);
        if self.script_execution_enabled {
            if let Some(script) = self.find_index(dir, &index_script) {
                debug!("Serving {}", script.display());
                let script_name = self.script_name(&dir.join(&index_script));
                return self.execute_script(&script, script_name, request, remote_addr, out);
            }
        }

        if let Some(page) = self.find_index(dir, INDEX_HTML) {
            debug!("Serving {}", page.display());
            return Ok(serve_file(&page, out)?);
        }

        debug!("Listing {}", dir.display());
        Ok(serve_listing(dir, request.path(), out)?)
    }

    /// Index `name` de `dir`, si es un archivo dentro del document root
    ///
    /// Un index que es symlink hacia afuera del root se trata como ausente.
    fn find_index(&self, dir: &Path, name: &str) -> Option<PathBuf> {
        let candidate = fs::canonicalize(dir.join(name)).ok()?;
        if !candidate.starts_with(&self.document_root) {
            warn!(
                "Ignoring {} in {}: resolves outside document root",
                name,
                dir.display()
            );
            return None;
        }
        candidate.is_file().then_some(candidate)
    }

    fn execute_script<W: Write + ?Sized>(
        &self,
        script: &Path,
        script_name: String,
        request: &Request,
        remote_addr: Option<SocketAddr>,
        out: &mut W,
    ) -> Result<StatusCode, HandlerError> {
        let cgi_request = CgiRequest::from_request(request, script_name, remote_addr);
        Ok(self.gateway.execute(script, cgi_request, out)?)
    }

    /// Path URL de un script del document root, ej: "/blog/index.php"
    fn script_name(&self, script: &Path) -> String {
        let relative = script.strip_prefix(&self.document_root).unwrap_or(script);
        let segments: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        format!("/{}", segments.join("/"))
    }

    fn is_script(&self, path: &Path) -> bool {
        path.extension()
            .map(|ext| ext.eq_ignore_ascii_case(self.script_extension.as_str()))
            .unwrap_or(false)
    }

    fn respond<W: Write + ?Sized>(
        status: StatusCode,
        message: &str,
        out: &mut W,
    ) -> Result<StatusCode, HandlerError> {
        Response::error(status, message).write_to(out)?;
        Ok(status)
    }
}
