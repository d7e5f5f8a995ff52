use std::{env, fmt::Display, str::FromStr};

use anyhow::{Result, anyhow, bail};
use tracing::{info, warn};

const DEV_JWT_SECRET: &str = "healtha-development-secret-change-me";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
    Test,
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            "test" => Ok(Environment::Test),
            other => Err(format!("unknown environment '{other}'")),
        }
    }
}

impl Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Environment::Development => "development",
            Environment::Production => "production",
            Environment::Test => "test",
        };
        f.write_str(name)
    }
}

#[derive(Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub db_pool_size: u32,
    pub jwt_secret: String,
    pub jwt_refresh_secret: String,
    pub jwt_expires_hours: i64,
    pub jwt_refresh_expires_days: i64,
    pub bcrypt_rounds: u32,
    pub environment: Environment,
    pub upload_dir: String,
    pub reminders_enabled: bool,
    pub reminder_interval_secs: u64,
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup so it can be
    /// exercised without touching the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment: Environment = try_load(&lookup, "NODE_ENV", "development")?;

        let jwt_secret = match lookup("JWT_SECRET").filter(|s| !s.trim().is_empty()) {
            Some(secret) => secret,
            None if environment == Environment::Production => {
                bail!("JWT_SECRET must be set in production")
            }
            None => {
                warn!("JWT_SECRET not set, using the development secret");
                DEV_JWT_SECRET.to_string()
            }
        };

        let jwt_refresh_secret = lookup("JWT_REFRESH_SECRET")
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| {
                warn!("JWT_REFRESH_SECRET not set, deriving it from JWT_SECRET");
                format!("{jwt_secret}-refresh")
            });

        let bcrypt_rounds: u32 = try_load(&lookup, "BCRYPT_ROUNDS", "10")?;
        if !(4..=31).contains(&bcrypt_rounds) {
            bail!("BCRYPT_ROUNDS must be between 4 and 31, got {bcrypt_rounds}");
        }

        let db_pool_size: u32 = try_load(&lookup, "DB_POOL_SIZE", "10")?;
        if db_pool_size == 0 {
            bail!("DB_POOL_SIZE must be positive");
        }

        Ok(Self {
            host: try_load(&lookup, "HOST", "0.0.0.0")?,
            port: try_load(&lookup, "PORT", "3000")?,
            database_url: database_url(&lookup)?,
            db_pool_size,
            jwt_secret,
            jwt_refresh_secret,
            jwt_expires_hours: try_load(&lookup, "JWT_EXPIRES_HOURS", "24")?,
            jwt_refresh_expires_days: try_load(&lookup, "JWT_REFRESH_EXPIRES_DAYS", "7")?,
            bcrypt_rounds,
            environment,
            upload_dir: try_load(&lookup, "UPLOAD_DIR", "uploads")?,
            reminders_enabled: try_load(&lookup, "REMINDERS_ENABLED", "false")?,
            reminder_interval_secs: try_load(&lookup, "REMINDER_INTERVAL_SECS", "3600")?,
        })
    }

    pub fn is_development(&self) -> bool {
        self.environment == Environment::Development
    }

    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self::from_lookup(|key| match key {
            "NODE_ENV" => Some("test".to_string()),
            "JWT_SECRET" => Some("test-access-secret".to_string()),
            "JWT_REFRESH_SECRET" => Some("test-refresh-secret".to_string()),
            "BCRYPT_ROUNDS" => Some("4".to_string()),
            "DATABASE_URL" => Some("postgres://localhost/healtha_test".to_string()),
            _ => None,
        })
        .expect("test configuration is valid")
    }
}

fn database_url<F>(lookup: &F) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(url) = lookup("DATABASE_URL").filter(|s| !s.trim().is_empty()) {
        return Ok(url);
    }

    let host: String = try_load(lookup, "DB_HOST", "localhost")?;
    let port: u16 = try_load(lookup, "DB_PORT", "5432")?;
    let user: String = try_load(lookup, "DB_USER", "postgres")?;
    let name: String = try_load(lookup, "DB_NAME", "lansia_monitoring")?;
    let password = lookup("DB_PASSWORD").unwrap_or_default();

    let credentials = if password.is_empty() {
        user
    } else {
        format!("{user}:{password}")
    };

    Ok(format!("postgres://{credentials}@{host}:{port}/{name}"))
}

fn try_load<F, T>(lookup: &F, key: &str, default: &str) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    let raw = lookup(key).unwrap_or_else(|| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });

    raw.trim()
        .parse()
        .map_err(|e| anyhow!("Invalid {key} value '{raw}': {e}"))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_in_development() {
        let config = Config::from_lookup(lookup_from(&[])).unwrap();

        assert_eq!(config.port, 3000);
        assert_eq!(config.db_pool_size, 10);
        assert_eq!(config.bcrypt_rounds, 10);
        assert_eq!(config.jwt_expires_hours, 24);
        assert!(config.is_development());
        assert!(!config.reminders_enabled);
        assert_eq!(
            config.database_url,
            "postgres://postgres@localhost:5432/lansia_monitoring"
        );
        assert_eq!(config.jwt_refresh_secret, format!("{DEV_JWT_SECRET}-refresh"));
    }

    #[test]
    fn database_url_is_assembled_from_parts() {
        let config = Config::from_lookup(lookup_from(&[
            ("DB_HOST", "db"),
            ("DB_USER", "healtha"),
            ("DB_PASSWORD", "s3cret"),
            ("DB_NAME", "monitoring"),
        ]))
        .unwrap();

        assert_eq!(config.database_url, "postgres://healtha:s3cret@db:5432/monitoring");
    }

    #[test]
    fn explicit_database_url_wins() {
        let config = Config::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://elsewhere/db"),
            ("DB_HOST", "ignored"),
        ]))
        .unwrap();

        assert_eq!(config.database_url, "postgres://elsewhere/db");
    }

    #[test]
    fn production_requires_jwt_secret() {
        let result = Config::from_lookup(lookup_from(&[("NODE_ENV", "production")]));
        assert!(result.is_err());

        let config = Config::from_lookup(lookup_from(&[
            ("NODE_ENV", "production"),
            ("JWT_SECRET", "prod-secret"),
        ]))
        .unwrap();
        assert!(!config.is_development());
        assert_eq!(config.jwt_secret, "prod-secret");
    }

    #[test]
    fn rejects_malformed_values() {
        assert!(Config::from_lookup(lookup_from(&[("PORT", "eighty")])).is_err());
        assert!(Config::from_lookup(lookup_from(&[("BCRYPT_ROUNDS", "2")])).is_err());
        assert!(Config::from_lookup(lookup_from(&[("DB_POOL_SIZE", "0")])).is_err());
        assert!(Config::from_lookup(lookup_from(&[("NODE_ENV", "staging")])).is_err());
    }
}
