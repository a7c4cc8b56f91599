use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub oracle_provider: OracleProvider,
    pub oracle_api_key: ApiKey,
    pub oracle_base_url: String,
    pub oracle_model: String,
    pub oracle_timeout_ms: u64,
    pub oracle_max_tokens: u32,
    pub rate_limit_max_requests: u32,
    pub rate_limit_window_secs: u64,
    pub rate_limit_max_keys: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OracleProvider {
    Claude,
    Gemini,
}

impl OracleProvider {
    pub fn as_str(self) -> &'static str {
        match self {
            OracleProvider::Claude => "claude",
            OracleProvider::Gemini => "gemini",
        }
    }

    pub fn default_base_url(self) -> &'static str {
        match self {
            OracleProvider::Claude => "https://api.anthropic.com/v1",
            OracleProvider::Gemini => "https://generativelanguage.googleapis.com/v1beta",
        }
    }

    pub fn default_model(self) -> &'static str {
        match self {
            OracleProvider::Claude => "claude-3-5-sonnet-latest",
            OracleProvider::Gemini => "gemini-2.0-flash",
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn expose(&self) -> &str {
        &self.0
    }
}

// The credential must never reach logs, even through a derived Debug.
impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiKey(redacted)")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartupError {
    pub code: &'static str,
    pub message: String,
}

impl std::fmt::Display for StartupError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for StartupError {}

impl ServerConfig {
    pub fn load() -> Result<Self, StartupError> {
        let mut merged = HashMap::new();

        if let Ok(config_path) = std::env::var("LOCALAUDIT_CONFIG_PATH") {
            let config_path = config_path.trim();
            if !config_path.is_empty() {
                let file_kv = parse_env_file(config_path)?;
                merged.extend(file_kv);
            }
        }

        merged.extend(std::env::vars());

        Self::from_kv(&merged)
    }

    pub fn from_kv(kv: &HashMap<String, String>) -> Result<Self, StartupError> {
        let bind_addr = parse_socket_addr(
            kv.get("LOCALAUDIT_BIND_ADDR"),
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 8080),
            "LOCALAUDIT_BIND_ADDR",
        )?;

        let oracle_provider = parse_provider(kv.get("LOCALAUDIT_ORACLE_PROVIDER"))?;

        let oracle_api_key = ApiKey(require_nonempty(kv, "LOCALAUDIT_ORACLE_API_KEY")?);

        let oracle_base_url = kv
            .get("LOCALAUDIT_ORACLE_BASE_URL")
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .unwrap_or(oracle_provider.default_base_url())
            .trim_end_matches('/')
            .to_string();

        let oracle_model = kv
            .get("LOCALAUDIT_ORACLE_MODEL")
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .unwrap_or(oracle_provider.default_model())
            .to_string();

        let oracle_timeout_ms = parse_u64(
            kv.get("LOCALAUDIT_ORACLE_TIMEOUT_MS"),
            30_000,
            "LOCALAUDIT_ORACLE_TIMEOUT_MS",
        )?;
        if oracle_timeout_ms == 0 {
            return Err(StartupError {
                code: "ERR_INVALID_CONFIG",
                message: "LOCALAUDIT_ORACLE_TIMEOUT_MS must be >= 1".to_string(),
            });
        }

        let oracle_max_tokens = parse_u32(
            kv.get("LOCALAUDIT_ORACLE_MAX_TOKENS"),
            2048,
            "LOCALAUDIT_ORACLE_MAX_TOKENS",
        )?;
        if oracle_max_tokens == 0 {
            return Err(StartupError {
                code: "ERR_INVALID_CONFIG",
                message: "LOCALAUDIT_ORACLE_MAX_TOKENS must be >= 1".to_string(),
            });
        }

        let rate_limit_max_requests = parse_u32(
            kv.get("LOCALAUDIT_RATE_LIMIT_MAX_REQUESTS"),
            5,
            "LOCALAUDIT_RATE_LIMIT_MAX_REQUESTS",
        )?;

        let rate_limit_window_secs = parse_u64(
            kv.get("LOCALAUDIT_RATE_LIMIT_WINDOW_SECS"),
            3600,
            "LOCALAUDIT_RATE_LIMIT_WINDOW_SECS",
        )?;
        if rate_limit_window_secs == 0 {
            return Err(StartupError {
                code: "ERR_INVALID_CONFIG",
                message: "LOCALAUDIT_RATE_LIMIT_WINDOW_SECS must be >= 1".to_string(),
            });
        }

        let rate_limit_max_keys = parse_usize(
            kv.get("LOCALAUDIT_RATE_LIMIT_MAX_KEYS"),
            16_384,
            "LOCALAUDIT_RATE_LIMIT_MAX_KEYS",
        )?;

        Ok(Self {
            bind_addr,
            oracle_provider,
            oracle_api_key,
            oracle_base_url,
            oracle_model,
            oracle_timeout_ms,
            oracle_max_tokens,
            rate_limit_max_requests,
            rate_limit_window_secs,
            rate_limit_max_keys,
        })
    }
}

fn parse_env_file(path: &str) -> Result<HashMap<String, String>, StartupError> {
    let contents = std::fs::read_to_string(path).map_err(|_| StartupError {
        code: "ERR_CONFIG_FILE_READ",
        message: format!("failed to read config file at {}", path),
    })?;

    let mut kv = HashMap::new();

    for (idx, raw_line) in contents.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let (key, value) = line.split_once('=').ok_or_else(|| StartupError {
            code: "ERR_CONFIG_FILE_PARSE",
            message: format!("invalid config line {} (expected KEY=VALUE)", idx + 1),
        })?;

        let key = key.trim();
        if key.is_empty() {
            return Err(StartupError {
                code: "ERR_CONFIG_FILE_PARSE",
                message: format!("invalid config line {} (empty key)", idx + 1),
            });
        }

        let mut value = value.trim().to_string();
        value = strip_quotes(&value);
        kv.insert(key.to_string(), value);
    }

    Ok(kv)
}

fn strip_quotes(s: &str) -> String {
    let bytes = s.as_bytes();
    if bytes.len() >= 2 {
        let first = bytes[0];
        let last = bytes[bytes.len() - 1];
        if (first == b'"' && last == b'"') || (first == b'\'' && last == b'\'') {
            return s[1..bytes.len() - 1].to_string();
        }
    }
    s.to_string()
}

fn require_nonempty(
    kv: &HashMap<String, String>,
    key: &'static str,
) -> Result<String, StartupError> {
    let Some(value) = kv.get(key) else {
        return Err(StartupError {
            code: "ERR_MISSING_CONFIG",
            message: format!("missing required config key {}", key),
        });
    };

    let value = value.trim();
    if value.is_empty() {
        return Err(StartupError {
            code: "ERR_MISSING_CONFIG",
            message: format!("missing required config key {}", key),
        });
    }

    Ok(value.to_string())
}

fn parse_socket_addr(
    value: Option<&String>,
    default: SocketAddr,
    key: &'static str,
) -> Result<SocketAddr, StartupError> {
    match value {
        None => Ok(default),
        Some(v) => v.parse::<SocketAddr>().map_err(|_| StartupError {
            code: "ERR_INVALID_CONFIG",
            message: format!("{} must be a valid host:port socket address", key),
        }),
    }
}

fn parse_usize(
    value: Option<&String>,
    default: usize,
    key: &'static str,
) -> Result<usize, StartupError> {
    match value {
        None => Ok(default),
        Some(v) if v.trim().is_empty() => Ok(default),
        Some(v) => v.parse::<usize>().map_err(|_| StartupError {
            code: "ERR_INVALID_CONFIG",
            message: format!("{} must be an integer", key),
        }),
    }
}

fn parse_u64(value: Option<&String>, default: u64, key: &'static str) -> Result<u64, StartupError> {
    match value {
        None => Ok(default),
        Some(v) if v.trim().is_empty() => Ok(default),
        Some(v) => v.parse::<u64>().map_err(|_| StartupError {
            code: "ERR_INVALID_CONFIG",
            message: format!("{} must be an integer", key),
        }),
    }
}

fn parse_u32(value: Option<&String>, default: u32, key: &'static str) -> Result<u32, StartupError> {
    match value {
        None => Ok(default),
        Some(v) if v.trim().is_empty() => Ok(default),
        Some(v) => v.parse::<u32>().map_err(|_| StartupError {
            code: "ERR_INVALID_CONFIG",
            message: format!("{} must be an integer", key),
        }),
    }
}

fn parse_provider(value: Option<&String>) -> Result<OracleProvider, StartupError> {
    let provider = value
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .unwrap_or("gemini");

    match provider {
        "claude" => Ok(OracleProvider::Claude),
        "gemini" => Ok(OracleProvider::Gemini),
        _ => Err(StartupError {
            code: "ERR_INVALID_CONFIG",
            message: "LOCALAUDIT_ORACLE_PROVIDER must be claude or gemini".to_string(),
        }),
    }
}
