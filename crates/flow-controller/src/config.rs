// Archivo: config.rs
// Propósito: configuración del controlador y política de reintentos. Se
// carga desde variables de entorno (con `.env` opcional vía dotenvy).
use crate::errors::ControllerError;
use std::path::PathBuf;
use std::time::Duration;

/// Curva de espera entre reintentos.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// `max(1, retryCount)` segundos, igual en todos los intentos.
    Flat,
    /// `base * 2^intento`, acotado por `max`. Nunca baja de un segundo.
    Exponential { base: Duration, max: Duration },
}

/// Política de reintentos de despachos fallidos.
///
/// La política por defecto es plana y sin techo de intentos.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub backoff: Backoff,
    /// Máximo de reintentos por step; `None` = sin límite.
    pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { backoff: Backoff::Flat, max_attempts: None }
    }
}

impl RetryPolicy {
    /// Retraso antes del reintento que sigue a un fallo en el intento
    /// `attempt` (0 = invocación original) de un step con `retry_count`.
    pub fn delay_for(&self, retry_count: u32, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Flat => Duration::from_secs(u64::from(retry_count.max(1))),
            Backoff::Exponential { base, max } => {
                base.saturating_mul(2u32.saturating_pow(attempt)).min(max).max(MIN_RETRY_DELAY)
            }
        }
    }

    /// Indica si se permite el reintento número `retry` (1 = primero).
    pub fn allows(&self, retry: u32) -> bool {
        self.max_attempts.map_or(true, |max| retry <= max)
    }
}

/// Configuración del controlador.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerConfig {
    /// Cadena de conexión del almacenamiento.
    pub storage_uri: String,
    /// Namespace observado.
    pub namespace: String,
    /// Intervalo de sondeo del bucle de reintentos.
    pub poll_interval: Duration,
    pub retry: RetryPolicy,
    /// Timeout de las llamadas HTTP; `None` = sin timeout.
    pub http_timeout: Option<Duration>,
    /// Fichero JSON con recursos iniciales para el store en memoria.
    pub seed_file: Option<PathBuf>,
}

pub const DEFAULT_NAMESPACE: &str = "echoer";
pub const DEFAULT_STORAGE_URI: &str = "memory://";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);
/// Retraso mínimo entre un fallo y su reintento.
pub const MIN_RETRY_DELAY: Duration = Duration::from_secs(1);

impl Default for ControllerConfig {
    fn default() -> Self {
        Self { storage_uri: DEFAULT_STORAGE_URI.to_string(),
               namespace: DEFAULT_NAMESPACE.to_string(),
               poll_interval: DEFAULT_POLL_INTERVAL,
               retry: RetryPolicy::default(),
               http_timeout: None,
               seed_file: None }
    }
}

impl ControllerConfig {
    /// Carga la configuración del entorno del proceso (y de `.env` si existe).
    pub fn from_env() -> Result<Self, ControllerError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Construye la configuración consultando `lookup` por cada variable.
    /// Las variables ausentes o vacías toman el valor por defecto.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ControllerError>
        where F: Fn(&str) -> Option<String>
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut cfg = Self::default();

        if let Some(uri) = get("ECHOER_STORAGE_URI") {
            cfg.storage_uri = uri;
        }
        if let Some(ns) = get("ECHOER_NAMESPACE") {
            cfg.namespace = ns;
        }
        if let Some(ms) = get("ECHOER_POLL_INTERVAL_MS") {
            let ms = parse_u64("ECHOER_POLL_INTERVAL_MS", &ms)?;
            if ms == 0 {
                return Err(ControllerError::Config("ECHOER_POLL_INTERVAL_MS debe ser mayor que 0".into()));
            }
            cfg.poll_interval = Duration::from_millis(ms);
        }

        let base = match get("ECHOER_RETRY_BASE_SECS") {
            Some(v) => Duration::from_secs(parse_u64("ECHOER_RETRY_BASE_SECS", &v)?),
            None => Duration::from_secs(1),
        };
        let max = match get("ECHOER_RETRY_MAX_DELAY_SECS") {
            Some(v) => Duration::from_secs(parse_u64("ECHOER_RETRY_MAX_DELAY_SECS", &v)?),
            None => Duration::from_secs(300),
        };
        cfg.retry.backoff = match get("ECHOER_RETRY_BACKOFF").as_deref() {
            None | Some("flat") => Backoff::Flat,
            Some("exponential") => {
                if base < MIN_RETRY_DELAY {
                    return Err(ControllerError::Config("ECHOER_RETRY_BASE_SECS debe ser al menos 1".into()));
                }
                if max < base {
                    return Err(ControllerError::Config(format!("ECHOER_RETRY_MAX_DELAY_SECS ({}) menor que ECHOER_RETRY_BASE_SECS ({})",
                                                               max.as_secs(),
                                                               base.as_secs())));
                }
                Backoff::Exponential { base, max }
            }
            Some(other) => {
                return Err(ControllerError::Config(format!("ECHOER_RETRY_BACKOFF desconocido: {}", other)));
            }
        };
        if let Some(v) = get("ECHOER_RETRY_MAX_ATTEMPTS") {
            let n = parse_u64("ECHOER_RETRY_MAX_ATTEMPTS", &v)?;
            let n = u32::try_from(n).map_err(|_| ControllerError::Config("ECHOER_RETRY_MAX_ATTEMPTS fuera de rango".into()))?;
            cfg.retry.max_attempts = Some(n);
        }
        if let Some(v) = get("ECHOER_HTTP_TIMEOUT_MS") {
            cfg.http_timeout = Some(Duration::from_millis(parse_u64("ECHOER_HTTP_TIMEOUT_MS", &v)?));
        }
        cfg.seed_file = get("ECHOER_SEED_FILE").map(PathBuf::from);
        Ok(cfg)
    }
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ControllerError> {
    value.parse::<u64>()
         .map_err(|_| ControllerError::Config(format!("{} no es un entero válido: {}", key, value)))
}
