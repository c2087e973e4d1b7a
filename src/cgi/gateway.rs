//! # Pasarela CGI
//! src/cgi/gateway.rs
//!
//! Ejecuta un script con el intérprete configurado y traduce su salida a una
//! respuesta HTTP.
//!
//! ```text
//! SPAWN → ENV_BUILD → (BODY_WRITE si POST) → HEADER_PARSE → BODY_STREAM → EXIT_WAIT
//! ```
//!
//! stdout y stderr del intérprete comparten un solo pipe. La primera línea
//! vacía separa los headers del script de su body; de los headers solo se
//! conserva `Content-Type`. Una vez escrita la cabecera HTTP el status ya no
//! cambia: un fallo posterior solo queda en el log.

use super::environment::{build_environment, CgiRequest};
use crate::error::CgiError;
use crate::http::{Method, Response, StatusCode, HTML_CONTENT_TYPE};
use log::{debug, warn};
use std::io::{self, BufRead, BufReader, PipeReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

/// Cada cuánto el watchdog revisa si el proceso terminó
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Ejecuta scripts a través de un intérprete externo
#[derive(Debug, Clone)]
pub struct CgiGateway {
    interpreter: PathBuf,
    server_port: u16,
    timeout: Option<Duration>,
}

impl CgiGateway {
    /// `timeout = None` deja al script correr sin límite
    pub fn new(interpreter: PathBuf, server_port: u16, timeout: Option<Duration>) -> Self {
        Self {
            interpreter,
            server_port,
            timeout,
        }
    }

    /// Ejecuta `script` y escribe la respuesta en `out`
    ///
    /// Retorna `Ok(StatusCode::Ok)` si el script terminó con código 0. Los
    /// errores anteriores a la cabecera dejan `out` intacto, de modo que el
    /// llamador todavía puede responder 500.
    pub fn execute<W: Write + ?Sized>(
        &self,
        script: &Path,
        request: CgiRequest,
        out: &mut W,
    ) -> Result<StatusCode, CgiError> {
        // ENV_BUILD
        let env = build_environment(script, &request, self.server_port);
        let is_post = request.method == Method::POST;

        // SPAWN
        let (reader, writer) = io::pipe()?;
        let mut command = Command::new(&self.interpreter);
        command
            .arg(script)
            .env_clear()
            .envs(env)
            .stdin(if is_post { Stdio::piped() } else { Stdio::null() })
            .stdout(writer.try_clone()?)
            .stderr(writer);
        if let Some(dir) = script.parent() {
            command.current_dir(dir);
        }
        // Grupo propio: al vencer el timeout se mata también lo que el
        // script haya lanzado y que comparte el pipe de salida
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        let spawned = command.spawn();
        // Command guarda los extremos de escritura del pipe: sin este drop
        // el lector nunca vería EOF
        drop(command);
        let mut child = spawned.map_err(|source| CgiError::Spawn {
            interpreter: self.interpreter.clone(),
            source,
        })?;
        debug!(
            "Spawned {} {} (pid {})",
            self.interpreter.display(),
            script.display(),
            child.id()
        );

        // BODY_WRITE en su propio thread para no bloquearse contra la salida
        let feeder = child.stdin.take().map(|mut stdin| {
            let body = request.body;
            thread::spawn(move || stdin.write_all(&body))
        });

        // EXIT_WAIT corre en paralelo para poder aplicar el timeout
        let timeout = self.timeout;
        let watchdog = thread::spawn(move || wait_for_exit(child, timeout));

        // HEADER_PARSE + BODY_STREAM
        let relayed = relay_output(reader, out);

        let exit = watchdog.join().map_err(|_| CgiError::Interrupted)?;
        if let Some(feeder) = feeder {
            match feeder.join() {
                Ok(Err(e)) if e.kind() != io::ErrorKind::BrokenPipe => {
                    warn!("Failed to write request body to {}: {}", script.display(), e);
                }
                Err(_) => warn!("Request body writer for {} panicked", script.display()),
                _ => {}
            }
        }

        match (relayed, exit) {
            (_, Err(e)) => Err(e),
            (Err(e), _) => Err(e),
            (Ok(()), Ok(status)) if !status.success() => Err(CgiError::ExitStatus(status)),
            (Ok(()), Ok(_)) => Ok(StatusCode::Ok),
        }
    }
}

/// Espera a que el proceso termine, matándolo si excede el timeout
fn wait_for_exit(mut child: Child, timeout: Option<Duration>) -> Result<ExitStatus, CgiError> {
    let limit = match timeout {
        Some(limit) => limit,
        None => return Ok(child.wait()?),
    };

    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(status);
        }
        if start.elapsed() >= limit {
            // Puede haber terminado entre try_wait y kill
            let _ = kill_process_group(&mut child);
            child.wait()?;
            return Err(CgiError::TimedOut(limit));
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// Mata al intérprete y a sus descendientes
///
/// El intérprete encabeza su propio grupo de procesos, con pgid = pid.
#[cfg(unix)]
fn kill_process_group(child: &mut Child) -> io::Result<()> {
    let pgid = child.id() as libc::pid_t;
    // SAFETY: kill(2) no toca memoria; el hijo aún no fue esperado, así que
    // su pid (y el grupo) no pudo reutilizarse
    if unsafe { libc::kill(-pgid, libc::SIGKILL) } == 0 {
        return Ok(());
    }
    child.kill()
}

#[cfg(not(unix))]
fn kill_process_group(child: &mut Child) -> io::Result<()> {
    child.kill()
}

/// Lee la salida del script y la reenvía al cliente
///
/// Consume el lector: al retornar (también por error) el pipe se cierra y
/// el script recibe EPIPE si sigue escribiendo.
fn relay_output<W: Write + ?Sized>(reader: PipeReader, out: &mut W) -> Result<(), CgiError> {
    let mut reader = BufReader::new(reader);
    let mut line = Vec::new();
    let mut content_type: Option<String> = None;

    // HEADER_PARSE
    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line)? == 0 {
            return Err(CgiError::MissingHeaderTerminator);
        }

        let header = trim_line_end(&line);
        if header.is_empty() {
            break;
        }

        match content_type_value(header) {
            Some(value) if content_type.is_none() => content_type = Some(value),
            _ => debug!("Discarding script header: {}", String::from_utf8_lossy(header)),
        }
    }

    Response::with_defaults(StatusCode::Ok)
        .with_header(
            "Content-Type",
            content_type.as_deref().unwrap_or(HTML_CONTENT_TYPE),
        )
        .write_head(out)?;
    out.flush()?;

    // BODY_STREAM
    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line)? == 0 {
            break;
        }
        out.write_all(&line)?;
        if !line.ends_with(b"\n") {
            out.write_all(b"\n")?;
        }
    }
    out.flush()?;

    Ok(())
}

/// Quita `\n` / `\r\n` del final
fn trim_line_end(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Valor de una línea `Content-Type: ...` (el nombre sin distinguir mayúsculas)
fn content_type_value(header: &[u8]) -> Option<String> {
    const NAME: &[u8] = b"content-type:";
    if header.len() < NAME.len() || !header[..NAME.len()].eq_ignore_ascii_case(NAME) {
        return None;
    }
    let value = String::from_utf8_lossy(&header[NAME.len()..]).trim().to_string();
    Some(value)
}
