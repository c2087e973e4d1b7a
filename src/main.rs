//! # CGI HTTP Server - Entry Point
//! src/main.rs
//!
//! Carga la configuración, arranca el servidor y bloquea hasta que termine.
//! Cualquier error de arranque termina el proceso con código 1.

use cgi_http_server::config::ServerConfig;
use cgi_http_server::server::Server;
use log::{error, info};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));

    let config = match ServerConfig::load() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };
    config.log_summary();

    match Server::start(config) {
        Ok(handle) => handle.join(),
        Err(e) => {
            error!("Failed to start server: {}", e);
            std::process::exit(1);
        }
    }
}
