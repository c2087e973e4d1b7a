//! # Servidor TCP Concurrente
//! src/server/tcp.rs
//!
//! Un thread acepta conexiones y las entrega a un pool fijo de workers. Si la
//! cola del pool está llena, el mismo thread de accept responde 503 y cierra.
//!
//! ```text
//! accept ──submit──► [cola acotada] ──► worker-0..N ──► handle_connection
//!    │
//!    └── cola llena ──► 503 Service Unavailable
//! ```

use super::connection::handle_connection;
use super::pool::WorkerPool;
use crate::config::ServerConfig;
use crate::http::{Response, StatusCode};
use crate::router::Router;
use log::{debug, error, info, warn};
use std::io::{self, Read};
use std::net::{Ipv4Addr, Ipv6Addr, Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Lecturas máximas al descartar el request rechazado
const REJECT_DRAIN_READS: usize = 16;

/// Pausa tras un error de accept (ej: EMFILE) para no girar en vacío
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(10);

/// Servidor HTTP de archivos estáticos y CGI
pub struct Server;

impl Server {
    /// Abre el socket y arranca el thread de accept y los workers
    ///
    /// Con `port = 0` el sistema elige un puerto libre; el real se consulta
    /// con [`ServerHandle::local_addr`].
    pub fn start(config: ServerConfig) -> io::Result<ServerHandle> {
        let listener = TcpListener::bind(config.address())?;
        let local_addr = listener.local_addr()?;
        info!("Listening on http://{}", local_addr);

        let router = Arc::new(Router::new(&config, local_addr.port()));
        let read_timeout = config.read_timeout();

        let pool = WorkerPool::new(
            "http-worker",
            config.workers,
            config.queue_capacity,
            move |stream: TcpStream| handle_connection(stream, &router, read_timeout),
        )?;
        info!(
            "Started {} workers (queue capacity {})",
            pool.size(),
            if pool.capacity() == 0 {
                "unbounded".to_string()
            } else {
                pool.capacity().to_string()
            }
        );

        let stopping = Arc::new(AtomicBool::new(false));
        let accept_thread = thread::Builder::new().name("http-accept".to_string()).spawn({
            let stopping = Arc::clone(&stopping);
            move || accept_loop(listener, pool, &stopping)
        })?;

        Ok(ServerHandle {
            local_addr,
            stopping,
            accept_thread: Some(accept_thread),
        })
    }
}

/// Handle de un servidor en marcha
pub struct ServerHandle {
    local_addr: SocketAddr,
    stopping: Arc<AtomicBool>,
    accept_thread: Option<JoinHandle<()>>,
}

impl ServerHandle {
    /// Dirección real en la que escucha
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Detiene el servidor
    ///
    /// Deja de aceptar conexiones, espera a que los workers terminen las que
    /// ya estaban en curso o en cola y retorna.
    pub fn stop(&mut self) {
        if self.stopping.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Stopping server on {}", self.local_addr);

        // accept() es bloqueante: una conexión propia lo despierta
        if let Err(e) = TcpStream::connect(wake_addr(self.local_addr)) {
            warn!("Failed to wake accept loop: {}", e);
        }
        self.wait();
    }

    /// Bloquea hasta que el loop de accept termine
    pub fn join(mut self) {
        self.wait();
    }

    fn wait(&mut self) {
        if let Some(handle) = self.accept_thread.take() {
            if handle.join().is_err() {
                error!("Accept thread terminated abnormally");
            }
        }
    }
}

/// Dirección para conectarse a uno mismo (0.0.0.0 no sirve como destino)
fn wake_addr(addr: SocketAddr) -> SocketAddr {
    match addr {
        SocketAddr::V4(v4) if v4.ip().is_unspecified() => {
            SocketAddr::from((Ipv4Addr::LOCALHOST, v4.port()))
        }
        SocketAddr::V6(v6) if v6.ip().is_unspecified() => {
            SocketAddr::from((Ipv6Addr::LOCALHOST, v6.port()))
        }
        addr => addr,
    }
}

fn accept_loop(listener: TcpListener, mut pool: WorkerPool<TcpStream>, stopping: &AtomicBool) {
    for stream in listener.incoming() {
        if stopping.load(Ordering::SeqCst) {
            break;
        }

        match stream {
            Ok(stream) => {
                if let Err(stream) = pool.submit(stream) {
                    reject(stream);
                }
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
                thread::sleep(ACCEPT_ERROR_BACKOFF);
            }
        }
    }

    debug!("Accept loop finished, draining {} queued connections", pool.len());
    pool.shutdown();
    info!("Server stopped");
}

/// Responde 503 desde el thread de accept
fn reject(mut stream: TcpStream) {
    let peer = stream
        .peer_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|_| "-".to_string());
    warn!("Worker queue full, rejecting {}", peer);

    // El socket queda no bloqueante: la página 503 cabe en el buffer de
    // envío y un cliente lento no puede frenar el accept
    if let Err(e) = stream.set_nonblocking(true) {
        debug!("Failed to reject {}: {}", peer, e);
        return;
    }
    let response = Response::error(
        StatusCode::ServiceUnavailable,
        "The server is too busy to handle this request",
    );
    if let Err(e) = response.write_to(&mut stream) {
        debug!("Failed to send 503 to {}: {}", peer, e);
    }

    // Descarta lo que el cliente ya envió: cerrar con datos sin leer termina
    // en RST y el cliente puede perder el 503
    let _ = stream.shutdown(Shutdown::Write);
    let mut buf = [0u8; 4096];
    for _ in 0..REJECT_DRAIN_READS {
        match stream.read(&mut buf) {
            Ok(n) if n > 0 => continue,
            _ => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Write;
    use std::time::Instant;

    #[test]
    fn test_reject_sends_503_without_blocking() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let mut client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (stream, _) = listener.accept().unwrap();

        let start = Instant::now();
        reject(stream);
        assert!(start.elapsed() < Duration::from_millis(500));

        let mut buf = Vec::new();
        client.read_to_end(&mut buf).unwrap();
        assert!(String::from_utf8_lossy(&buf).starts_with("HTTP/1.1 503 Service Unavailable\r\n"));
    }

    #[test]
    fn test_wake_addr() {
        let any: SocketAddr = "0.0.0.0:8080".parse().unwrap();
        assert_eq!(wake_addr(any), "127.0.0.1:8080".parse().unwrap());

        let any6: SocketAddr = "[::]:8080".parse().unwrap();
        assert_eq!(wake_addr(any6), "[::1]:8080".parse().unwrap());

        let local: SocketAddr = "127.0.0.1:9".parse().unwrap();
        assert_eq!(wake_addr(local), local);
    }

    #[test]
    fn test_start_serve_stop() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("index.html"), "<h1>hola</h1>").unwrap();

        let config = ServerConfig {
            port: 0,
            document_root: dir.path().to_path_buf(),
            workers: 2,
            ..ServerConfig::default()
        };
        let mut handle = Server::start(config).unwrap();
        let addr = handle.local_addr();
        assert_ne!(addr.port(), 0);

        let mut client = TcpStream::connect(addr).unwrap();
        client.write_all(b"GET / HTTP/1.1\r\n\r\n").unwrap();
        let mut buf = Vec::new();
        client.read_to_end(&mut buf).unwrap();
        let text = String::from_utf8_lossy(&buf);

        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.ends_with("<h1>hola</h1>\n"));

        handle.stop();
        assert!(TcpStream::connect(addr).is_err());
    }
}
