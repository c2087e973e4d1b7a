//! # CGI HTTP Server
//! src/lib.rs
//!
//! Servidor HTTP/1.x de archivos estáticos con pasarela CGI, implementado
//! sobre sockets bloqueantes y un pool fijo de threads.
//!
//! ## Arquitectura
//!
//! El servidor está dividido en módulos especializados:
//! - `http`: lectura de requests y escritura de responses
//! - `server`: listener TCP, pool de workers y manejo de cada conexión
//! - `router`: resolución de paths contra el document root
//! - `handlers`: archivos estáticos y listados de directorio
//! - `cgi`: ejecución de scripts con un intérprete externo
//! - `mime`: Content-Type por extensión
//! - `config`: CLI, variables de entorno y archivo de propiedades
//! - `error`: tipos de error compartidos
//!
//! ## Ejemplo de uso
//!
//! ```no_run
//! use cgi_http_server::config::ServerConfig;
//! use cgi_http_server::server::Server;
//!
//! let config = ServerConfig {
//!     port: 8080,
//!     document_root: "./htdocs".into(),
//!     ..ServerConfig::default()
//! };
//! let handle = Server::start(config).expect("Error al iniciar servidor");
//! handle.join();
//! ```

pub mod cgi;
pub mod config;
pub mod error;
pub mod handlers;
pub mod http;
pub mod mime;
pub mod router;
pub mod server;
