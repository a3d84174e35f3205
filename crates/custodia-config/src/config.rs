//! Environment-sourced configuration, validated once at process boot
//! (spec.md §6). Modeled on `chronx_genesis::GenesisParams`: a plain struct
//! built exactly once, validated, and handed to every consumer by reference —
//! generalized here to read its fields from the environment instead of a
//! JSON file, since this table has no key-ceremony analog.

use std::env::VarError;

use custodia_core::types::PrincipalId;
use custodia_crypto::MasterKeyHandle;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("{0} must not be empty")]
    Empty(&'static str),

    #[error("{0} must be a positive integer, got {1:?}")]
    NotPositiveInt(&'static str, String),

    #[error("OWNER_ID must be a positive integer, got {0:?}")]
    InvalidOwnerId(String),

    #[error("MASTER_ENCRYPTION_KEY invalid: {0}")]
    InvalidMasterKey(#[from] custodia_crypto::CryptoError),

    #[error("RPC_URL must use HTTPS outside development mode, got {0:?}")]
    RpcUrlNotHttps(String),

    #[error("TRANSPORT_MODE must be one of \"polling\"/\"webhook\", got {0:?}")]
    InvalidTransportMode(String),

    #[error("TRANSPORT_MODE=webhook requires WEBHOOK_URL, and it must be HTTPS")]
    WebhookUrlNotHttps,

    #[error("QUOTE_API_KEY is required when routed quotes are enabled")]
    MissingQuoteApiKey,

    #[error("DEV_WALLET_PRIVATE_KEY is forbidden outside development mode")]
    DevWalletInProduction,
}

/// Deployment mode. Gates the two checks spec.md §6 states only apply "in
/// production": `RPC_URL` HTTPS enforcement and the `DEV_WALLET_PRIVATE_KEY`
/// ban. Sourced from `CUSTODIA_ENV`, defaulting to `Production` — an absent
/// or misspelled value must never silently relax either check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    fn from_env() -> Self {
        match std::env::var("CUSTODIA_ENV") {
            Ok(v) if v.eq_ignore_ascii_case("development") => Environment::Development,
            _ => Environment::Production,
        }
    }

    pub fn is_production(self) -> bool {
        matches!(self, Environment::Production)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportMode {
    Polling,
    Webhook,
}

/// Validated, immutable process configuration. Constructed exactly once at
/// boot via [`Config::from_env`]; every downstream crate takes `&Config`.
#[derive(Debug)]
pub struct Config {
    pub environment: Environment,
    pub transport_token: String,
    pub owner_id: PrincipalId,
    pub master_encryption_key: String,
    pub rpc_url: String,
    pub database_path: String,
    pub auth_database_path: String,
    pub http_port: u16,
    pub http_host: String,
    pub public_url: String,
    pub transport_mode: TransportMode,
    pub webhook_url: Option<String>,
    pub webhook_secret: Option<String>,
    pub dca_amount_quote: u64,
    pub dca_interval_ms: i64,
    /// SPL mint address of the fixed target allocation DCA buys into
    /// (spec.md §1 "fixed target allocation"); spec.md leaves this
    /// unspecified, so it is sourced from its own env var rather than
    /// hardcoded.
    pub dca_target_mint: String,
    pub quote_api_key: Option<String>,
    pub rate_limit_window_ms: i64,
    pub rate_limit_max_requests: u32,
    pub dev_wallet_private_key: Option<String>,
}

impl Config {
    /// Read and validate every key of spec.md §6 from the process
    /// environment. Fatal (returns `Err`) on the first violated
    /// constraint — the caller's `main` is expected to propagate this
    /// straight into an exit-with-error, never to fall back to a default.
    pub fn from_env() -> Result<Self, ConfigError> {
        let environment = Environment::from_env();

        let transport_token = required_nonempty("TRANSPORT_TOKEN")?;

        let owner_id_raw = required("OWNER_ID")?;
        let owner_id_num: i64 = owner_id_raw
            .parse()
            .map_err(|_| ConfigError::InvalidOwnerId(owner_id_raw.clone()))?;
        if owner_id_num <= 0 {
            return Err(ConfigError::InvalidOwnerId(owner_id_raw));
        }
        let owner_id = PrincipalId::new(owner_id_num.to_string());

        let master_encryption_key = required("MASTER_ENCRYPTION_KEY")?;
        // Validate shape now so a bad key fails at boot, not on first use;
        // the handle itself is reconstructed by the composition root.
        let _ = MasterKeyHandle::init(&master_encryption_key)?;

        let rpc_url = required_nonempty("RPC_URL")?;
        if environment.is_production() && !rpc_url.starts_with("https://") {
            return Err(ConfigError::RpcUrlNotHttps(rpc_url));
        }

        let database_path = required_nonempty("DATABASE_PATH")?;
        let auth_database_path = required_nonempty("AUTH_DATABASE_PATH")?;

        let http_port = positive_int("HTTP_PORT")? as u16;
        let http_host = required_nonempty("HTTP_HOST")?;
        let public_url = required_nonempty("PUBLIC_URL")?;

        let transport_mode_raw = required("TRANSPORT_MODE")?;
        let transport_mode = match transport_mode_raw.as_str() {
            "polling" => TransportMode::Polling,
            "webhook" => TransportMode::Webhook,
            other => return Err(ConfigError::InvalidTransportMode(other.to_string())),
        };

        let webhook_url = optional("WEBHOOK_URL");
        let webhook_secret = optional("WEBHOOK_SECRET");
        if transport_mode == TransportMode::Webhook {
            match &webhook_url {
                Some(url) if url.starts_with("https://") => {}
                _ => return Err(ConfigError::WebhookUrlNotHttps),
            }
        }

        let dca_amount_quote = positive_int("DCA_AMOUNT_QUOTE")? as u64;
        let dca_interval_ms = positive_int("DCA_INTERVAL_MS")?;
        let dca_target_mint = required_nonempty("DCA_TARGET_MINT")?;

        let quote_api_key = optional("QUOTE_API_KEY");

        let rate_limit_window_ms = positive_int("RATE_LIMIT_WINDOW_MS")?;
        let rate_limit_max_requests = positive_int("RATE_LIMIT_MAX_REQUESTS")? as u32;

        let dev_wallet_private_key = optional("DEV_WALLET_PRIVATE_KEY");
        if environment.is_production() && dev_wallet_private_key.is_some() {
            return Err(ConfigError::DevWalletInProduction);
        }

        Ok(Self {
            environment,
            transport_token,
            owner_id,
            master_encryption_key,
            rpc_url,
            database_path,
            auth_database_path,
            http_port,
            http_host,
            public_url,
            transport_mode,
            webhook_url,
            webhook_secret,
            dca_amount_quote,
            dca_interval_ms,
            dca_target_mint,
            quote_api_key,
            rate_limit_window_ms,
            rate_limit_max_requests,
            dev_wallet_private_key,
        })
    }

    /// `QUOTE_API_KEY` presence is what turns routed (aggregator-backed)
    /// quotes on; its absence is not an error by itself, only a missing
    /// key while a caller insists routed quotes are enabled is.
    pub fn require_quote_api_key(&self) -> Result<&str, ConfigError> {
        self.quote_api_key
            .as_deref()
            .ok_or(ConfigError::MissingQuoteApiKey)
    }
}

fn optional(key: &'static str) -> Option<String> {
    match std::env::var(key) {
        Ok(v) if !v.is_empty() => Some(v),
        _ => None,
    }
}

fn required(key: &'static str) -> Result<String, ConfigError> {
    match std::env::var(key) {
        Ok(v) => Ok(v),
        Err(VarError::NotPresent) => Err(ConfigError::Missing(key)),
        Err(VarError::NotUnicode(_)) => Err(ConfigError::Missing(key)),
    }
}

fn required_nonempty(key: &'static str) -> Result<String, ConfigError> {
    let v = required(key)?;
    if v.is_empty() {
        return Err(ConfigError::Empty(key));
    }
    Ok(v)
}

fn positive_int(key: &'static str) -> Result<i64, ConfigError> {
    let raw = required(key)?;
    let parsed: i64 = raw
        .parse()
        .map_err(|_| ConfigError::NotPositiveInt(key, raw.clone()))?;
    if parsed <= 0 {
        return Err(ConfigError::NotPositiveInt(key, raw));
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Environment variables are process-global; serialize tests that touch
    // them so they don't race each other.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear_all() {
        for key in [
            "CUSTODIA_ENV",
            "TRANSPORT_TOKEN",
            "OWNER_ID",
            "MASTER_ENCRYPTION_KEY",
            "RPC_URL",
            "DATABASE_PATH",
            "AUTH_DATABASE_PATH",
            "HTTP_PORT",
            "HTTP_HOST",
            "PUBLIC_URL",
            "TRANSPORT_MODE",
            "WEBHOOK_URL",
            "WEBHOOK_SECRET",
            "DCA_AMOUNT_QUOTE",
            "DCA_INTERVAL_MS",
            "DCA_TARGET_MINT",
            "QUOTE_API_KEY",
            "RATE_LIMIT_WINDOW_MS",
            "RATE_LIMIT_MAX_REQUESTS",
            "DEV_WALLET_PRIVATE_KEY",
        ] {
            std::env::remove_var(key);
        }
    }

    fn set_minimal_valid(env_mode: &str) {
        clear_all();
        std::env::set_var("CUSTODIA_ENV", env_mode);
        std::env::set_var("TRANSPORT_TOKEN", "tok_abc123");
        std::env::set_var("OWNER_ID", "1");
        std::env::set_var(
            "MASTER_ENCRYPTION_KEY",
            base64::Engine::encode(
                &base64::engine::general_purpose::STANDARD,
                [7u8; 32],
            ),
        );
        std::env::set_var(
            "RPC_URL",
            if env_mode == "development" {
                "http://127.0.0.1:8899"
            } else {
                "https://rpc.example.com"
            },
        );
        std::env::set_var("DATABASE_PATH", "/tmp/custodia.db");
        std::env::set_var("AUTH_DATABASE_PATH", "/tmp/custodia-auth.db");
        std::env::set_var("HTTP_PORT", "8080");
        std::env::set_var("HTTP_HOST", "0.0.0.0");
        std::env::set_var("PUBLIC_URL", "https://bot.example.com");
        std::env::set_var("TRANSPORT_MODE", "polling");
        std::env::set_var("DCA_AMOUNT_QUOTE", "1000000");
        std::env::set_var("DCA_INTERVAL_MS", "86400000");
        std::env::set_var("DCA_TARGET_MINT", "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v");
        std::env::set_var("RATE_LIMIT_WINDOW_MS", "60000");
        std::env::set_var("RATE_LIMIT_MAX_REQUESTS", "30");
    }

    #[test]
    fn minimal_valid_config_loads() {
        let _g = ENV_LOCK.lock().unwrap();
        set_minimal_valid("development");
        let cfg = Config::from_env().unwrap();
        assert_eq!(cfg.transport_mode, TransportMode::Polling);
        assert_eq!(cfg.owner_id, PrincipalId::new("1"));
        clear_all();
    }

    #[test]
    fn production_rejects_http_rpc_url() {
        let _g = ENV_LOCK.lock().unwrap();
        set_minimal_valid("production");
        std::env::set_var("RPC_URL", "http://rpc.example.com");
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::RpcUrlNotHttps(_))
        ));
        clear_all();
    }

    #[test]
    fn production_rejects_dev_wallet_key() {
        let _g = ENV_LOCK.lock().unwrap();
        set_minimal_valid("production");
        std::env::set_var("DEV_WALLET_PRIVATE_KEY", "somekey");
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::DevWalletInProduction)
        ));
        clear_all();
    }

    #[test]
    fn development_allows_dev_wallet_key() {
        let _g = ENV_LOCK.lock().unwrap();
        set_minimal_valid("development");
        std::env::set_var("DEV_WALLET_PRIVATE_KEY", "somekey");
        let cfg = Config::from_env().unwrap();
        assert_eq!(cfg.dev_wallet_private_key.as_deref(), Some("somekey"));
        clear_all();
    }

    #[test]
    fn webhook_mode_requires_https_url() {
        let _g = ENV_LOCK.lock().unwrap();
        set_minimal_valid("development");
        std::env::set_var("TRANSPORT_MODE", "webhook");
        std::env::set_var("WEBHOOK_URL", "http://not-secure.example.com");
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::WebhookUrlNotHttps)
        ));
        std::env::set_var("WEBHOOK_URL", "https://secure.example.com");
        let cfg = Config::from_env().unwrap();
        assert_eq!(cfg.transport_mode, TransportMode::Webhook);
        clear_all();
    }

    #[test]
    fn missing_required_key_is_fatal() {
        let _g = ENV_LOCK.lock().unwrap();
        set_minimal_valid("development");
        std::env::remove_var("TRANSPORT_TOKEN");
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::Missing("TRANSPORT_TOKEN"))
        ));
        clear_all();
    }

    #[test]
    fn require_quote_api_key_errors_when_absent() {
        let _g = ENV_LOCK.lock().unwrap();
        set_minimal_valid("development");
        let cfg = Config::from_env().unwrap();
        assert!(matches!(
            cfg.require_quote_api_key(),
            Err(ConfigError::MissingQuoteApiKey)
        ));
        clear_all();
    }
}
