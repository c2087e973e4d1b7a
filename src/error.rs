//! # Errores del Servidor
//! src/error.rs
//!
//! Tipos de error por capa. `ParseError` vive junto al parser en
//! `http::request`.

use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;
use thiserror::Error;

/// Errores de configuración (fatales al arrancar)
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No se pudo leer el archivo de propiedades
    #[error("Cannot read config file {path}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Document root inválido y sin fallback posible
    #[error("Invalid document root {path}: {reason}")]
    DocumentRoot { path: PathBuf, reason: String },

    /// El intérprete configurado no existe
    #[error("Script interpreter not found: {0}")]
    InterpreterNotFound(PathBuf),

    /// Valor fuera de rango
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Errores al resolver un path contra el document root
#[derive(Debug, Error)]
pub enum RouteError {
    /// El path sale del document root (`..`, symlinks)
    #[error("Path escapes document root: {0}")]
    OutsideRoot(String),

    /// Error de I/O al canonicalizar o inspeccionar el path
    #[error("I/O error resolving path: {0}")]
    Io(#[from] io::Error),
}

/// Errores de la pasarela CGI
#[derive(Debug, Error)]
pub enum CgiError {
    /// No se pudo lanzar el intérprete
    #[error("Cannot spawn interpreter {interpreter}: {source}")]
    Spawn {
        interpreter: PathBuf,
        #[source]
        source: io::Error,
    },

    /// El script terminó sin la línea vacía que cierra los headers
    #[error("Script output ended before the header block was terminated")]
    MissingHeaderTerminator,

    /// El script terminó con código distinto de cero
    #[error("Script exited with {0}")]
    ExitStatus(ExitStatus),

    /// El script excedió el timeout y fue terminado
    #[error("Script exceeded timeout of {0:?} and was killed")]
    TimedOut(Duration),

    /// El watchdog del proceso terminó de forma anómala
    #[error("Script supervision was interrupted")]
    Interrupted,

    /// Error de I/O con el proceso o con el cliente
    #[error("I/O error during script execution: {0}")]
    Io(#[from] io::Error),
}

/// Errores al atender un request ya parseado
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Cgi(#[from] CgiError),
}
