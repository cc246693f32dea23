//! Connection parameters for the catalog database.
//!
//! Resolution order: an explicit DSN (CLI `--db-url`), then `DATABASE_URL`, then the
//! Laravel-style `DB_*` component variables. Every value is optional and falls back
//! to a local default.
use std::time::Duration;

use sqlx::postgres::{PgConnectOptions, PgSslMode};

use crate::database_ops::error::{CatalogError, CatalogResult};
use crate::util::env as env_util;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 5432;
pub const DEFAULT_USER: &str = "postgres";
pub const DEFAULT_DATABASE: &str = "postgres";
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// How a session negotiates TLS with the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsPolicy {
    /// Plain TCP. Only for local development databases.
    Disabled,
    /// Encrypted, certificate chain and hostname verified.
    VerifyFull,
    /// Encrypted, but any certificate is accepted (self-signed setups).
    /// Only reachable through an explicit opt-in.
    SkipVerify,
}

impl TlsPolicy {
    pub fn ssl_mode(self) -> PgSslMode {
        match self {
            TlsPolicy::Disabled => PgSslMode::Disable,
            TlsPolicy::VerifyFull => PgSslMode::VerifyFull,
            // sqlx's `require` encrypts without validating the chain.
            TlsPolicy::SkipVerify => PgSslMode::Require,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TlsPolicy::Disabled => "disabled",
            TlsPolicy::VerifyFull => "verify-full",
            TlsPolicy::SkipVerify => "INSECURE-skip-verify",
        }
    }
}

#[derive(Clone)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Option<String>,
    pub database: String,
    /// Optional `search_path` applied to every session.
    pub schema: Option<String>,
    pub tls: TlsPolicy,
    pub connect_timeout: Duration,
}

// Manual impl so the password can never end up in a `{:?}` log line.
impl std::fmt::Debug for DbConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("database", &self.database)
            .field("schema", &self.schema)
            .field("tls", &self.tls)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            user: DEFAULT_USER.to_string(),
            password: None,
            database: DEFAULT_DATABASE.to_string(),
            schema: None,
            tls: TlsPolicy::VerifyFull,
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        }
    }
}

impl DbConfig {
    /// Resolve from the process environment (after loading `.env`).
    pub fn from_env(url_override: Option<&str>) -> CatalogResult<Self> {
        Self::resolve(url_override, &env_util::env_opt)
    }

    /// Resolve from an arbitrary variable lookup. `from_env` is this with the real environment.
    pub fn resolve(
        url_override: Option<&str>,
        lookup: &dyn Fn(&str) -> Option<String>,
    ) -> CatalogResult<Self> {
        let mut cfg = DbConfig::default();

        if let Some(host) = lookup("DB_HOST") {
            cfg.host = host.trim().trim_matches(['[', ']']).to_string();
        }
        if let Some(port) = lookup("DB_PORT") {
            cfg.port = parse_port(&port)?;
        }
        if let Some(user) = lookup("DB_USERNAME") {
            cfg.user = user;
        }
        cfg.password = lookup("DB_PASSWORD");
        if let Some(database) = lookup("DB_DATABASE") {
            cfg.database = database;
        }
        cfg.schema = lookup("DB_SCHEMA");

        let mut tls_disabled = lookup("DB_TLS")
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "off" | "disable" | "disabled" | "0" | "false"))
            .unwrap_or(false);

        let dsn = url_override
            .map(str::to_string)
            .filter(|s| !s.trim().is_empty())
            .or_else(|| lookup("DATABASE_URL"));
        if let Some(dsn) = dsn {
            tls_disabled |= cfg.apply_url(&dsn)?;
        }

        let skip_verify = lookup("DB_TLS_INSECURE_SKIP_VERIFY")
            .map(|v| env_util::parse_flag(&v))
            .unwrap_or(false);
        cfg.tls = match (tls_disabled, skip_verify) {
            (true, _) => TlsPolicy::Disabled,
            (false, true) => TlsPolicy::SkipVerify,
            (false, false) => TlsPolicy::VerifyFull,
        };

        if let Some(raw) = lookup("DB_CONNECT_TIMEOUT_SECS") {
            let secs = raw.trim().parse::<u64>().ok().filter(|s| *s > 0).ok_or_else(|| {
                CatalogError::InvalidArgument(format!(
                    "DB_CONNECT_TIMEOUT_SECS must be a positive integer, got '{raw}'"
                ))
            })?;
            cfg.connect_timeout = Duration::from_secs(secs);
        }

        Ok(cfg)
    }

    /// Explicitly accept unverified server certificates. A disabled policy stays disabled.
    pub fn with_insecure_skip_verify(mut self) -> Self {
        if self.tls == TlsPolicy::VerifyFull {
            self.tls = TlsPolicy::SkipVerify;
        }
        self
    }

    /// Overlay the components of a postgres DSN. Returns true when it asks for `sslmode=disable`.
    fn apply_url(&mut self, dsn: &str) -> CatalogResult<bool> {
        let invalid = |why: &str| {
            CatalogError::InvalidArgument(format!(
                "database url {}: {why}",
                env_util::redact_postgres_url(dsn)
            ))
        };
        let parsed = url::Url::parse(dsn.trim()).map_err(|e| invalid(&e.to_string()))?;
        if !matches!(parsed.scheme(), "postgres" | "postgresql") {
            return Err(invalid("scheme must be postgres:// or postgresql://"));
        }
        if let Some(host) = parsed.host_str().filter(|h| !h.is_empty()) {
            self.host = host.trim_matches(['[', ']']).to_string();
        }
        if let Some(port) = parsed.port() {
            self.port = port;
        }
        if !parsed.username().is_empty() {
            self.user = decode_component(parsed.username()).map_err(|_| invalid("bad user encoding"))?;
        }
        if let Some(password) = parsed.password() {
            self.password =
                Some(decode_component(password).map_err(|_| invalid("bad password encoding"))?);
        }
        let database = parsed.path().trim_start_matches('/');
        if !database.is_empty() {
            self.database = decode_component(database).map_err(|_| invalid("bad database encoding"))?;
        }

        let mut tls_disabled = false;
        for (key, value) in parsed.query_pairs() {
            match key.as_ref() {
                "sslmode" => tls_disabled = value.eq_ignore_ascii_case("disable"),
                "search_path" | "currentSchema" => self.schema = Some(value.into_owned()),
                _ => {}
            }
        }
        Ok(tls_disabled)
    }

    pub fn connect_options(&self) -> PgConnectOptions {
        let mut opts = PgConnectOptions::new_without_pgpass()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .database(&self.database)
            .ssl_mode(self.tls.ssl_mode())
            .application_name("catalog-ops")
            // PgBouncer txn mode safe
            .statement_cache_capacity(0);
        if let Some(password) = &self.password {
            opts = opts.password(password);
        }
        if let Some(schema) = &self.schema {
            opts = opts.options([("search_path", schema.as_str())]);
        }
        opts
    }

    /// Credential-free description of the target, safe for logs and error messages.
    pub fn redacted_target(&self) -> String {
        let host = if self.host.contains(':') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };
        format!("postgres://***@{host}:{}/{}", self.port, self.database)
    }
}

fn parse_port(raw: &str) -> CatalogResult<u16> {
    raw.trim()
        .parse::<u16>()
        .map_err(|_| CatalogError::InvalidArgument(format!("DB_PORT must be a valid port, got '{raw}'")))
}

fn decode_component(raw: &str) -> Result<String, std::string::FromUtf8Error> {
    urlencoding::decode(raw).map(|c| c.into_owned())
}
