//! # Configuración del Servidor
//! src/config.rs
//!
//! La configuración sale de tres fuentes, en este orden de prioridad:
//!
//! 1. Argumentos CLI
//! 2. Variables de entorno
//! 3. Archivo de propiedades (`server.conf` por defecto)
//!
//! Lo que no aparezca en ninguna toma el valor por defecto.
//!
//! ## Ejemplos de uso
//!
//! ### CLI
//! ```bash
//! ./cgi_http_server --port 8080 -d ./htdocs \
//!   --php-enabled true --php-interpreter /usr/bin/php-cgi
//! ```
//!
//! ### Variables de entorno
//! ```bash
//! HTTP_PORT=8080 DOCUMENT_ROOT=/srv/www ./cgi_http_server
//! ```
//!
//! ### server.conf
//! ```text
//! # comentario
//! port=1111
//! directory=htdocs
//! php_interpreter=/usr/bin/php-cgi
//! php_enabled=true
//! ```

use crate::error::ConfigError;
use clap::Parser;
use log::{info, warn};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Archivo de propiedades que se busca si no se indica otro
pub const DEFAULT_CONFIG_FILE: &str = "server.conf";

/// Argumentos de línea de comandos
///
/// Los campos opcionales no tienen default aquí: si no llegan por CLI ni por
/// entorno se consultan en el archivo de propiedades.
#[derive(Debug, Clone, Default, Parser)]
#[command(name = "cgi_http_server")]
#[command(about = "Servidor HTTP/1.x de archivos estáticos con pasarela CGI")]
#[command(version)]
pub struct Cli {
    /// Archivo de propiedades (key=value)
    #[arg(short, long, env = "SERVER_CONF")]
    pub config: Option<PathBuf>,

    /// Puerto en el que escucha el servidor
    #[arg(short, long, env = "HTTP_PORT")]
    pub port: Option<u16>,

    /// Host/IP en el que escucha
    #[arg(long, env = "HTTP_HOST")]
    pub host: Option<String>,

    /// Document root
    #[arg(short, long, env = "DOCUMENT_ROOT")]
    pub directory: Option<PathBuf>,

    /// Intérprete CGI (php-cgi o equivalente)
    #[arg(long, env = "PHP_INTERPRETER")]
    pub php_interpreter: Option<PathBuf>,

    /// Habilita la ejecución de scripts
    #[arg(long, env = "PHP_ENABLED")]
    pub php_enabled: Option<bool>,

    /// Extensión de los scripts (sin punto)
    #[arg(long, env = "SCRIPT_EXTENSION")]
    pub script_extension: Option<String>,

    /// Número de workers del pool
    #[arg(long, env = "WORKERS")]
    pub workers: Option<usize>,

    /// Conexiones en espera antes de responder 503 (0 = sin límite)
    #[arg(long, env = "QUEUE_CAPACITY")]
    pub queue_capacity: Option<usize>,

    /// Timeout de lectura del socket en milisegundos (0 = sin timeout)
    #[arg(long, env = "READ_TIMEOUT_MS")]
    pub read_timeout_ms: Option<u64>,

    /// Timeout de ejecución de scripts en milisegundos (0 = sin timeout)
    #[arg(long, env = "CGI_TIMEOUT_MS")]
    pub cgi_timeout_ms: Option<u64>,
}

/// Configuración efectiva del servidor
///
/// Se carga una vez antes de arrancar el listener y después es de solo lectura.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub document_root: PathBuf,
    pub interpreter: PathBuf,
    pub script_execution_enabled: bool,
    pub script_extension: String,
    pub workers: usize,
    pub queue_capacity: usize,
    pub read_timeout_ms: u64,
    pub cgi_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 1111,
            document_root: PathBuf::from("htdocs"),
            interpreter: PathBuf::from("php-cgi"),
            script_execution_enabled: false,
            script_extension: "php".to_string(),
            workers: 10,
            queue_capacity: 64,
            read_timeout_ms: 30_000,
            cgi_timeout_ms: 30_000,
        }
    }
}

impl ServerConfig {
    /// Carga la configuración desde CLI, entorno y archivo, y la valida
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::from_cli(Cli::parse())?;
        config.resolve_document_root()?;
        config.validate()?;
        Ok(config)
    }

    /// Combina los argumentos con el archivo de propiedades
    ///
    /// Si `--config` no se indicó y `server.conf` no existe, se usan los
    /// defaults. Un archivo indicado explícitamente tiene que existir.
    pub fn from_cli(cli: Cli) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        let file = match &cli.config {
            Some(path) => Some(Properties::load(path)?),
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
                Some(Properties::load(Path::new(DEFAULT_CONFIG_FILE))?)
            }
            None => None,
        };
        if let Some(properties) = &file {
            config.apply_properties(properties);
        }

        if let Some(port) = cli.port {
            config.port = port;
        }
        if let Some(host) = cli.host {
            config.host = host;
        }
        if let Some(directory) = cli.directory {
            config.document_root = directory;
        }
        if let Some(interpreter) = cli.php_interpreter {
            config.interpreter = interpreter;
        }
        if let Some(enabled) = cli.php_enabled {
            config.script_execution_enabled = enabled;
        }
        if let Some(extension) = cli.script_extension {
            config.script_extension = extension;
        }
        if let Some(workers) = cli.workers {
            config.workers = workers;
        }
        if let Some(capacity) = cli.queue_capacity {
            config.queue_capacity = capacity;
        }
        if let Some(timeout) = cli.read_timeout_ms {
            config.read_timeout_ms = timeout;
        }
        if let Some(timeout) = cli.cgi_timeout_ms {
            config.cgi_timeout_ms = timeout;
        }

        config.script_extension = config.script_extension.trim_start_matches('.').to_string();
        Ok(config)
    }

    /// Aplica las claves conocidas del archivo de propiedades
    fn apply_properties(&mut self, properties: &Properties) {
        self.port = properties.get_parsed("port", self.port);
        if let Some(host) = properties.get("host") {
            self.host = host.to_string();
        }
        if let Some(directory) = properties.get("directory") {
            self.document_root = PathBuf::from(directory);
        }
        if let Some(interpreter) = properties.get("php_interpreter") {
            self.interpreter = PathBuf::from(interpreter);
        }
        self.script_execution_enabled =
            properties.get_bool("php_enabled", self.script_execution_enabled);
        if let Some(extension) = properties.get("script_extension") {
            self.script_extension = extension.to_string();
        }
        self.workers = properties.get_parsed("workers", self.workers);
        self.queue_capacity = properties.get_parsed("queue_capacity", self.queue_capacity);
        self.read_timeout_ms = properties.get_parsed("read_timeout_ms", self.read_timeout_ms);
        self.cgi_timeout_ms = properties.get_parsed("cgi_timeout_ms", self.cgi_timeout_ms);
    }

    /// Obtiene la dirección completa para bind (host:port)
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Deja `document_root` como path canónico de un directorio existente
    ///
    /// Si el directorio configurado no existe se usa `htdocs` junto al
    /// ejecutable, creándolo si hace falta.
    pub fn resolve_document_root(&mut self) -> Result<(), ConfigError> {
        if self.document_root.is_dir() {
            self.document_root = canonical_dir(&self.document_root)?;
            return Ok(());
        }

        warn!(
            "Document root {} is not a directory, falling back to htdocs next to the executable",
            self.document_root.display()
        );

        let exe = std::env::current_exe().map_err(|e| ConfigError::DocumentRoot {
            path: self.document_root.clone(),
            reason: format!("cannot locate executable: {}", e),
        })?;
        let fallback = exe
            .parent()
            .map(|dir| dir.join("htdocs"))
            .unwrap_or_else(|| PathBuf::from("htdocs"));

        if !fallback.exists() {
            info!("Creating document root {}", fallback.display());
            fs::create_dir_all(&fallback).map_err(|e| ConfigError::DocumentRoot {
                path: fallback.clone(),
                reason: e.to_string(),
            })?;
        }

        self.document_root = canonical_dir(&fallback)?;
        Ok(())
    }

    /// Valida la configuración
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::Invalid("workers must be >= 1".to_string()));
        }
        if self.script_extension.is_empty() {
            return Err(ConfigError::Invalid(
                "script extension must not be empty".to_string(),
            ));
        }

        // Un nombre suelto (php-cgi) se resuelve por PATH al lanzar el proceso
        let is_path = self.interpreter.components().count() > 1;
        if self.script_execution_enabled && is_path && !self.interpreter.exists() {
            return Err(ConfigError::InterpreterNotFound(self.interpreter.clone()));
        }

        Ok(())
    }

    /// Timeout de lectura del socket
    pub fn read_timeout(&self) -> Option<Duration> {
        non_zero_millis(self.read_timeout_ms)
    }

    /// Timeout de ejecución de scripts
    pub fn cgi_timeout(&self) -> Option<Duration> {
        non_zero_millis(self.cgi_timeout_ms)
    }

    /// Registra un resumen de la configuración
    pub fn log_summary(&self) {
        info!("Address:        {}", self.address());
        info!("Document root:  {}", self.document_root.display());
        if self.script_execution_enabled {
            info!(
                "Scripts:        enabled (*.{} via {})",
                self.script_extension,
                self.interpreter.display()
            );
        } else {
            info!("Scripts:        disabled, *.{} answers 403", self.script_extension);
        }
        let queue = match self.queue_capacity {
            0 => "unbounded".to_string(),
            n => n.to_string(),
        };
        info!("Workers:        {} (queue: {})", self.workers, queue);
        info!(
            "Timeouts:       read {}, script {}",
            describe_millis(self.read_timeout_ms),
            describe_millis(self.cgi_timeout_ms)
        );
    }
}

fn canonical_dir(path: &Path) -> Result<PathBuf, ConfigError> {
    fs::canonicalize(path).map_err(|e| ConfigError::DocumentRoot {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

fn non_zero_millis(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

fn describe_millis(ms: u64) -> String {
    match ms {
        0 => "none".to_string(),
        ms => format!("{} ms", ms),
    }
}

/// Archivo de propiedades `key=value`
///
/// Acepta `=` o `:` como separador y comentarios con `#` o `!`.
#[derive(Debug, Clone, Default)]
pub struct Properties {
    values: HashMap<String, String>,
}

impl Properties {
    /// Lee y parsea un archivo
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::File {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::parse(&text))
    }

    /// Parsea el contenido de un archivo de propiedades
    pub fn parse(text: &str) -> Self {
        let mut values = HashMap::new();

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
                continue;
            }

            let split = line.find(|c| c == '=' || c == ':');
            let (key, value) = match split {
                Some(pos) => (&line[..pos], &line[pos + 1..]),
                None => (line, ""),
            };
            values.insert(key.trim().to_string(), value.trim().to_string());
        }

        Self { values }
    }

    /// Valor crudo de una clave
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(|s| s.as_str())
    }

    /// Valor parseado; si falta o no parsea se usa el default
    pub fn get_parsed<T: FromStr>(&self, key: &str, default: T) -> T {
        self.get(key)
            .and_then(|value| value.parse().ok())
            .unwrap_or(default)
    }

    /// `true` solo si el valor es "true" (sin distinguir mayúsculas)
    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.get(key) {
            Some(value) => value.eq_ignore_ascii_case("true"),
            None => default,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 1111);
        assert_eq!(config.document_root, PathBuf::from("htdocs"));
        assert_eq!(config.interpreter, PathBuf::from("php-cgi"));
        assert!(!config.script_execution_enabled);
        assert_eq!(config.workers, 10);
    }

    #[test]
    fn test_address() {
        let mut config = ServerConfig::default();
        config.host = "0.0.0.0".to_string();
        config.port = 3000;
        assert_eq!(config.address(), "0.0.0.0:3000");
    }

    #[test]
    fn test_properties_parse() {
        let properties = Properties::parse(
            "# comentario\n! otro\nport = 8081\ndirectory: /srv/www\nphp_enabled=TRUE\n\nflag\n",
        );

        assert_eq!(properties.get("port"), Some("8081"));
        assert_eq!(properties.get("directory"), Some("/srv/www"));
        assert!(properties.get_bool("php_enabled", false));
        assert_eq!(properties.get("flag"), Some(""));
        assert_eq!(properties.get("missing"), None);
    }

    #[test]
    fn test_properties_fallbacks() {
        let properties = Properties::parse("port=abc\nphp_enabled=yes\n");

        assert_eq!(properties.get_parsed("port", 1111u16), 1111);
        assert!(!properties.get_bool("php_enabled", true));
        assert!(properties.get_bool("absent", true));
    }

    #[test]
    fn test_file_then_cli_precedence() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "port=2222\ndirectory=/tmp/www\nphp_enabled=true\nworkers=3").unwrap();

        let cli = Cli {
            config: Some(file.path().to_path_buf()),
            port: Some(3333),
            ..Cli::default()
        };
        let config = ServerConfig::from_cli(cli).unwrap();

        assert_eq!(config.port, 3333);
        assert_eq!(config.document_root, PathBuf::from("/tmp/www"));
        assert!(config.script_execution_enabled);
        assert_eq!(config.workers, 3);
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let cli = Cli {
            config: Some(PathBuf::from("/definitely/not/here.conf")),
            ..Cli::default()
        };
        assert!(matches!(ServerConfig::from_cli(cli), Err(ConfigError::File { .. })));
    }

    #[test]
    fn test_extension_dot_is_stripped() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let cli = Cli {
            config: Some(file.path().to_path_buf()),
            script_extension: Some(".cgi".to_string()),
            ..Cli::default()
        };
        let config = ServerConfig::from_cli(cli).unwrap();
        assert_eq!(config.script_extension, "cgi");
    }

    #[test]
    fn test_validate() {
        let mut config = ServerConfig::default();
        assert!(config.validate().is_ok());

        config.workers = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        config.workers = 1;
        config.script_execution_enabled = true;
        config.interpreter = PathBuf::from("/no/such/php-cgi");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InterpreterNotFound(_))
        ));

        // Un nombre suelto se busca en PATH al ejecutar
        config.interpreter = PathBuf::from("php-cgi");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_resolve_existing_document_root() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ServerConfig::default();
        config.document_root = dir.path().to_path_buf();

        config.resolve_document_root().unwrap();
        assert_eq!(config.document_root, fs::canonicalize(dir.path()).unwrap());
    }

    #[test]
    fn test_timeouts() {
        let mut config = ServerConfig::default();
        assert_eq!(config.cgi_timeout(), Some(Duration::from_secs(30)));

        config.read_timeout_ms = 0;
        assert_eq!(config.read_timeout(), None);
    }
}
