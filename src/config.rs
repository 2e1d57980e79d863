use crate::device_response::Envelope;
use crate::error::ConfigError;
use std::env;
use std::net::Ipv4Addr;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
pub const MIN_SCAN_INTERVAL_SECS: u64 = 5;
pub const MAX_SCAN_INTERVAL_SECS: u64 = 300;

/// Connection and polling settings for one Eyedro device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EyedroConfig {
    host: Ipv4Addr,
    port: u16,
    scan_interval: Duration,
    timeout: Duration,
    envelope: Envelope,
}

impl EyedroConfig {
    /// Parses a dotted-quad IPv4 host, surrounding whitespace is ignored.
    pub fn new(host: &str) -> Result<Self, ConfigError> {
        let host = parse_host(host)?;
        Ok(Self {
            host,
            port: DEFAULT_PORT,
            scan_interval: DEFAULT_SCAN_INTERVAL,
            timeout: DEFAULT_TIMEOUT,
            envelope: Envelope::default(),
        })
    }

    pub fn with_port(mut self, port: u16) -> Result<Self, ConfigError> {
        self.port = validate_port(i64::from(port))?;
        Ok(self)
    }

    pub fn with_scan_interval(mut self, scan_interval: Duration) -> Result<Self, ConfigError> {
        self.scan_interval = validate_scan_interval(scan_interval)?;
        Ok(self)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_envelope(mut self, envelope: Envelope) -> Self {
        self.envelope = envelope;
        self
    }

    /// Reads `EYEDRO_HOST`, `EYEDRO_PORT`, `EYEDRO_SCAN_INTERVAL` (seconds),
    /// `EYEDRO_TIMEOUT` (seconds) and `EYEDRO_ENVELOPE` (`flat` or `nested`).
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = env::var("EYEDRO_HOST").map_err(|_| ConfigError::Missing("EYEDRO_HOST"))?;
        let mut config = Self::new(&host)?;

        if let Some(port) = read_number("EYEDRO_PORT")? {
            config.port = validate_port(port)?;
        }
        if let Some(secs) = read_number("EYEDRO_SCAN_INTERVAL")? {
            config = config.with_scan_interval(Duration::from_secs(non_negative(
                "EYEDRO_SCAN_INTERVAL",
                secs,
            )?))?;
        }
        if let Some(secs) = read_number("EYEDRO_TIMEOUT")? {
            config = config.with_timeout(Duration::from_secs(non_negative("EYEDRO_TIMEOUT", secs)?));
        }
        if let Ok(envelope) = env::var("EYEDRO_ENVELOPE") {
            config.envelope = envelope.parse().map_err(ConfigError::InvalidEnvelope)?;
        }
        Ok(config)
    }

    pub fn host(&self) -> Ipv4Addr {
        self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn scan_interval(&self) -> Duration {
        self.scan_interval
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn envelope(&self) -> Envelope {
        self.envelope
    }

    pub fn unique_id(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn title(&self) -> String {
        format!("Eyedro {}", self.host)
    }
}

/// Only dotted-quad IPv4 addresses are accepted, hostnames are rejected.
pub fn parse_host(host: &str) -> Result<Ipv4Addr, ConfigError> {
    host.trim()
        .parse()
        .map_err(|_| ConfigError::InvalidHost(host.to_string()))
}

pub fn validate_port(port: i64) -> Result<u16, ConfigError> {
    match u16::try_from(port) {
        Ok(port) if port != 0 => Ok(port),
        _ => Err(ConfigError::InvalidPort(port)),
    }
}

pub fn validate_scan_interval(scan_interval: Duration) -> Result<Duration, ConfigError> {
    let secs = scan_interval.as_secs();
    if !(MIN_SCAN_INTERVAL_SECS..=MAX_SCAN_INTERVAL_SECS).contains(&secs)
        || scan_interval.subsec_nanos() != 0
    {
        return Err(ConfigError::ScanIntervalOutOfRange {
            min: MIN_SCAN_INTERVAL_SECS,
            max: MAX_SCAN_INTERVAL_SECS,
            actual: secs,
        });
    }
    Ok(scan_interval)
}

fn read_number(name: &'static str) -> Result<Option<i64>, ConfigError> {
    match env::var(name) {
        Ok(value) if value.trim().is_empty() => Ok(None),
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidNumber { name, value }),
        Err(_) => Ok(None),
    }
}

fn non_negative(name: &'static str, value: i64) -> Result<u64, ConfigError> {
    u64::try_from(value).map_err(|_| ConfigError::InvalidNumber {
        name,
        value: value.to_string(),
    })
}
