use std::collections::HashMap;
use std::env;

use serde::Deserialize;

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub cors_origins: Vec<String>,
    pub db: DbConfig,
    pub session: SessionConfig,
    pub auth: AuthConfig,
    pub iris: IrisConfig,
    pub policy: PolicyConfig,
    pub supported_timezones: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
    pub pool_min: u32,
    pub pool_max: u32,
    pub migrate_on_startup: bool,
}

#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub secret: String,
    pub cookie_name: String,
    pub expiry_secs: i64,
    pub secure_cookie: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthBackend {
    /// Every credential pair is accepted. Development only.
    Debug,
    /// bcrypt hashes stored on the user row.
    Local,
    Ldap,
}

impl AuthBackend {
    fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "debug" => AuthBackend::Debug,
            "ldap" => AuthBackend::Ldap,
            _ => AuthBackend::Local,
        }
    }
}

#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub backend: AuthBackend,
    pub ldap_domains: HashMap<String, LdapDomainConfig>,
    pub default_domain: Option<String>,
}

/// Per-domain directory settings, read from the `LDAP_DOMAINS` JSON object.
#[derive(Clone, Debug, Deserialize)]
pub struct LdapDomainConfig {
    pub url: String,
    #[serde(default)]
    pub base_dn: String,
    #[serde(default)]
    pub bind_user: Option<String>,
    #[serde(default)]
    pub bind_password: Option<String>,
    /// Search filter with a single `%s` placeholder for the username.
    #[serde(default)]
    pub search_filter: String,
    #[serde(default)]
    pub user_suffix: String,
    #[serde(default)]
    pub cert_path: Option<String>,
    #[serde(default)]
    pub import_user: bool,
    /// Local profile field -> directory attribute.
    #[serde(default)]
    pub attrs: HashMap<String, String>,
}

#[derive(Clone, Debug)]
pub struct IrisConfig {
    pub api_host: String,
    pub app: String,
    pub key: String,
}

impl IrisConfig {
    pub fn enabled(&self) -> bool {
        !self.api_host.is_empty()
    }
}

#[derive(Clone, Debug)]
pub struct PolicyConfig {
    pub minimum_display_order_to_see_admins: i32,
}

pub const DEFAULT_TIMEZONES: &[&str] = &[
    "US/Pacific",
    "US/Eastern",
    "US/Central",
    "US/Mountain",
    "US/Alaska",
    "US/Hawaii",
    "Asia/Kolkata",
    "Asia/Shanghai",
    "Asia/Singapore",
    "Australia/Sydney",
    "Europe/London",
    "Europe/Dublin",
    "Europe/Berlin",
    "Europe/Amsterdam",
    "Europe/Zurich",
    "UTC",
];

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_or_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_ldap_domains(raw: &str) -> HashMap<String, LdapDomainConfig> {
    if raw.trim().is_empty() {
        return HashMap::new();
    }
    serde_json::from_str(raw).unwrap_or_else(|e| {
        tracing::warn!("Ignoring malformed LDAP_DOMAINS: {e}");
        HashMap::new()
    })
}

impl Config {
    pub fn from_env() -> Self {
        let timezones = env::var("SUPPORTED_TIMEZONES")
            .map(|v| split_list(&v))
            .unwrap_or_else(|_| DEFAULT_TIMEZONES.iter().map(|s| s.to_string()).collect());

        Self {
            port: env_or_parse("PORT", 8080),
            cors_origins: split_list(&env_or("CORS_ORIGINS", "http://localhost:8080")),
            db: DbConfig {
                host: env_or("DB_HOST", "localhost"),
                port: env_or_parse("DB_PORT", 5432),
                database: env_or("DB_NAME", "oncall"),
                user: env_or("DB_USER", "oncall"),
                password: env_or("DB_PASSWORD", ""),
                pool_min: env_or_parse("DB_POOL_MIN", 2),
                pool_max: env_or_parse("DB_POOL_MAX", 20),
                migrate_on_startup: env_or_parse("DB_MIGRATE_ON_STARTUP", false),
            },
            session: SessionConfig {
                secret: env_or("SESSION_SECRET", "change-me-to-a-secure-random-string"),
                cookie_name: env_or("SESSION_COOKIE", "oncall-session"),
                expiry_secs: parse_duration_to_secs(&env_or("SESSION_EXPIRY", "12h")),
                secure_cookie: env_or_parse("SESSION_SECURE_COOKIE", false),
            },
            auth: AuthConfig {
                backend: AuthBackend::parse(&env_or("AUTH_BACKEND", "local")),
                ldap_domains: parse_ldap_domains(&env_or("LDAP_DOMAINS", "")),
                default_domain: env::var("LDAP_DEFAULT_DOMAIN").ok().filter(|s| !s.is_empty()),
            },
            iris: IrisConfig {
                api_host: env_or("IRIS_API_HOST", ""),
                app: env_or("IRIS_APP", "oncall"),
                key: env_or("IRIS_KEY", ""),
            },
            policy: PolicyConfig {
                minimum_display_order_to_see_admins: env_or_parse(
                    "MINIMUM_DISPLAY_ORDER_TO_SEE_ADMINS",
                    2,
                ),
            },
            supported_timezones: timezones,
        }
    }

    pub fn database_url(&self) -> String {
        if let Ok(url) = env::var("DATABASE_URL") {
            return url;
        }
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.db.user, self.db.password, self.db.host, self.db.port, self.db.database
        )
    }
}

fn parse_duration_to_secs(s: &str) -> i64 {
    let s = s.trim();
    if s.is_empty() {
        return 3600;
    }
    let split = s.char_indices().last().map_or(0, |(i, _)| i);
    let (num_str, unit) = s.split_at(split);
    let num: i64 = num_str.parse().unwrap_or(1);
    match unit {
        "s" => num,
        "m" => num * 60,
        "h" => num * 3600,
        "d" => num * 86400,
        _ => s.parse().unwrap_or(3600),
    }
}
