use std::path::PathBuf;
use std::str::FromStr;

const DEFAULT_PORT: u16 = 5433;
const DEFAULT_BIND: &str = "0.0.0.0";
const DEFAULT_DATA_DIR: &str = "./data";
const DEFAULT_PASSWORD: &str = "rentcal";
const DEFAULT_MAX_CONNECTIONS: usize = 256;
const DEFAULT_COMPACT_THRESHOLD: u64 = 1000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsPaths {
    pub cert: PathBuf,
    pub key: PathBuf,
}

/// Server settings, read from `RENTCAL_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub port: u16,
    pub bind: String,
    pub data_dir: PathBuf,
    pub password: String,
    /// `user:password` pairs, comma separated.
    pub staff: Option<String>,
    pub max_connections: usize,
    pub compact_threshold: u64,
    pub metrics_port: Option<u16>,
    pub tls: Option<TlsPaths>,
}

#[derive(Debug)]
pub enum ConfigError {
    Invalid { var: &'static str, value: String },
    PartialTls,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Invalid { var, value } => write!(f, "{var}: invalid value {value:?}"),
            ConfigError::PartialTls => write!(
                f,
                "both RENTCAL_TLS_CERT and RENTCAL_TLS_KEY must be set, or neither"
            ),
        }
    }
}

impl std::error::Error for ConfigError {}

fn parsed<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(var) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { var, value }),
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok().filter(|v| !v.is_empty()))
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let tls = match (lookup("RENTCAL_TLS_CERT"), lookup("RENTCAL_TLS_KEY")) {
            (None, None) => None,
            (Some(cert), Some(key)) => Some(TlsPaths {
                cert: cert.into(),
                key: key.into(),
            }),
            _ => return Err(ConfigError::PartialTls),
        };
        let max_connections =
            parsed(&lookup, "RENTCAL_MAX_CONNECTIONS")?.unwrap_or(DEFAULT_MAX_CONNECTIONS);
        if max_connections == 0 {
            return Err(ConfigError::Invalid {
                var: "RENTCAL_MAX_CONNECTIONS",
                value: "0".into(),
            });
        }

        Ok(Self {
            port: parsed(&lookup, "RENTCAL_PORT")?.unwrap_or(DEFAULT_PORT),
            bind: lookup("RENTCAL_BIND").unwrap_or_else(|| DEFAULT_BIND.into()),
            data_dir: lookup("RENTCAL_DATA_DIR")
                .unwrap_or_else(|| DEFAULT_DATA_DIR.into())
                .into(),
            password: lookup("RENTCAL_PASSWORD").unwrap_or_else(|| DEFAULT_PASSWORD.into()),
            staff: lookup("RENTCAL_STAFF"),
            max_connections,
            compact_threshold: parsed(&lookup, "RENTCAL_COMPACT_THRESHOLD")?
                .unwrap_or(DEFAULT_COMPACT_THRESHOLD),
            metrics_port: parsed(&lookup, "RENTCAL_METRICS_PORT")?,
            tls,
        })
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn from_pairs(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults() {
        let cfg = from_pairs(&[]).unwrap();
        assert_eq!(cfg.port, 5433);
        assert_eq!(cfg.listen_addr(), "0.0.0.0:5433");
        assert_eq!(cfg.data_dir, PathBuf::from("./data"));
        assert_eq!(cfg.password, "rentcal");
        assert_eq!(cfg.max_connections, 256);
        assert_eq!(cfg.compact_threshold, 1000);
        assert_eq!(cfg.metrics_port, None);
        assert_eq!(cfg.tls, None);
        assert_eq!(cfg.staff, None);
    }

    #[test]
    fn overrides() {
        let cfg = from_pairs(&[
            ("RENTCAL_PORT", "6000"),
            ("RENTCAL_BIND", "127.0.0.1"),
            ("RENTCAL_METRICS_PORT", "9100"),
            ("RENTCAL_COMPACT_THRESHOLD", "50"),
            ("RENTCAL_TLS_CERT", "/etc/rentcal/cert.pem"),
            ("RENTCAL_TLS_KEY", "/etc/rentcal/key.pem"),
        ])
        .unwrap();
        assert_eq!(cfg.listen_addr(), "127.0.0.1:6000");
        assert_eq!(cfg.metrics_port, Some(9100));
        assert_eq!(cfg.compact_threshold, 50);
        assert_eq!(cfg.tls.unwrap().key, PathBuf::from("/etc/rentcal/key.pem"));
    }

    #[test]
    fn bad_number_is_an_error() {
        let err = from_pairs(&[("RENTCAL_PORT", "eighty")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "RENTCAL_PORT", .. }));
        assert!(from_pairs(&[("RENTCAL_MAX_CONNECTIONS", "0")]).is_err());
    }

    #[test]
    fn half_tls_is_an_error() {
        let err = from_pairs(&[("RENTCAL_TLS_CERT", "cert.pem")]).unwrap_err();
        assert!(matches!(err, ConfigError::PartialTls));
    }
}
