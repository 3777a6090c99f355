//! CLI argument parsing, validation, and startup helpers.

use std::time::Duration;

use crate::ServerConfig;
use crate::db::Database;
use crate::jwt::{TokenCodec, parse_algorithm};
use crate::rate_limit::RateLimitConfig;
use clap::{Parser, Subcommand};
use rand::{Rng, distr::Alphanumeric};
use tracing::{error, info, warn};

const MIN_SECRET_LENGTH: usize = 32;
/// One day
const MAX_ACCESS_TTL_MINUTES: u64 = 24 * 60;
/// Ten years
const MAX_REFRESH_TTL_DAYS: u64 = 3650;

pub const ACCESS_SECRET_ENV: &str = "ACCESS_TOKEN_SECRET";
pub const REFRESH_SECRET_ENV: &str = "REFRESH_TOKEN_SECRET";

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "gatehouse",
    about = "Password login with IP-bound refresh tokens"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value = "8080")]
    pub port: u16,

    /// Path to SQLite database file
    #[arg(short, long, env = "DATABASE_PATH", default_value = "gatehouse.db")]
    pub database: String,

    /// Path to file containing the access token secret. Prefer the ACCESS_TOKEN_SECRET env var
    #[arg(long)]
    pub access_secret_file: Option<String>,

    /// Path to file containing the refresh token secret. Prefer the REFRESH_TOKEN_SECRET env var
    #[arg(long)]
    pub refresh_secret_file: Option<String>,

    /// Token signing algorithm (HS256, HS384 or HS512)
    #[arg(long, env = "TOKEN_ALGORITHM", default_value = "HS256")]
    pub algorithm: String,

    /// Access token lifetime in minutes
    #[arg(long, env = "ACCESS_TOKEN_EXPIRE_MINUTES", default_value = "15",
        value_parser = clap::value_parser!(u64).range(1..=MAX_ACCESS_TTL_MINUTES))]
    pub access_ttl_minutes: u64,

    /// Refresh token lifetime in days
    #[arg(long, env = "REFRESH_TOKEN_EXPIRE_DAYS", default_value = "7",
        value_parser = clap::value_parser!(u64).range(1..=MAX_REFRESH_TTL_DAYS))]
    pub refresh_ttl_days: u64,

    /// Role assigned to newly created accounts
    #[arg(long, env = "DEFAULT_ROLE", default_value = "user")]
    pub default_role: String,

    /// Omit the Secure flag on the refresh cookie (local development over plain HTTP)
    #[arg(long)]
    pub insecure_cookies: bool,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Print a fresh pair of access and refresh token secrets
    Keygen {
        /// Length of each secret in characters
        #[arg(short, long, default_value = "64")]
        length: usize,
    },
}

/// Initialize logging based on the specified format.
pub fn init_logging(format: &LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
    }
}

/// Random alphanumeric secret of `length` characters.
pub fn generate_secret(length: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

/// Handle the `keygen` subcommand: print env-file lines for both secrets.
pub fn handle_keygen(length: usize) {
    if length < MIN_SECRET_LENGTH {
        warn!(
            length,
            minimum = MIN_SECRET_LENGTH,
            "Secrets shorter than the minimum will be rejected at startup"
        );
    }
    println!("{}={}", ACCESS_SECRET_ENV, generate_secret(length));
    println!("{}={}", REFRESH_SECRET_ENV, generate_secret(length));
}

/// Load a signing secret from an environment variable or file.
/// Returns None and logs an error if the secret cannot be loaded.
pub fn load_secret(env_var: &str, secret_file: Option<&str>) -> Option<String> {
    let secret = if let Ok(secret) = std::env::var(env_var) {
        // Clear the environment variable to prevent leaking
        // SAFETY: We're single-threaded at this point during startup,
        // and no other code is reading this environment variable.
        unsafe { std::env::remove_var(env_var) };
        secret
    } else if let Some(path) = secret_file {
        match std::fs::read_to_string(path) {
            Ok(content) => content.trim().to_string(),
            Err(e) => {
                error!(path = %path, error = %e, "Failed to read secret file");
                return None;
            }
        }
    } else {
        error!(
            env_var,
            "Secret is required. Set the environment variable (recommended) or pass a secret file"
        );
        return None;
    };

    if secret.len() < MIN_SECRET_LENGTH {
        error!(
            env_var,
            "Secret is shorter than {} characters. Use a longer secret", MIN_SECRET_LENGTH
        );
        return None;
    }

    Some(secret)
}

/// Build ServerConfig from validated arguments.
/// Returns None and logs an error if the token settings are unusable.
pub fn build_config(
    args: &Args,
    db: Database,
    access_secret: String,
    refresh_secret: String,
) -> Option<ServerConfig> {
    let algorithm = match parse_algorithm(&args.algorithm) {
        Ok(algorithm) => algorithm,
        Err(e) => {
            error!(algorithm = %args.algorithm, error = %e, "Invalid token algorithm");
            return None;
        }
    };

    let codec = match TokenCodec::new(
        algorithm,
        access_secret.as_bytes(),
        refresh_secret.as_bytes(),
        Duration::from_secs(args.access_ttl_minutes * 60),
        Duration::from_secs(args.refresh_ttl_days * 24 * 60 * 60),
    ) {
        Ok(codec) => codec,
        Err(e) => {
            error!(error = %e, "Invalid token configuration");
            return None;
        }
    };

    if args.insecure_cookies {
        warn!("Refresh cookies will be sent without the Secure flag");
    }

    Some(ServerConfig {
        db,
        codec,
        default_role: args.default_role.clone(),
        secure_cookies: !args.insecure_cookies,
        rate_limit: RateLimitConfig::new(),
    })
}

/// Open the database, logging errors if it fails.
pub async fn open_database(path: &str) -> Option<Database> {
    match Database::open(path).await {
        Ok(db) => {
            info!(path = %path, "Database opened");
            Some(db)
        }
        Err(e) => {
            error!(path = %path, error = %e, "Failed to open database");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(["gatehouse"]).unwrap();
        assert_eq!(args.algorithm, "HS256");
        assert_eq!(args.default_role, "user");
        assert!(!args.insecure_cookies);
        assert!(args.command.is_none());
    }

    #[test]
    fn test_zero_ttl_rejected() {
        assert!(Args::try_parse_from(["gatehouse", "--access-ttl-minutes", "0"]).is_err());
    }

    #[test]
    fn test_ttl_upper_bounds() {
        assert!(Args::try_parse_from(["gatehouse", "--refresh-ttl-days", "3650"]).is_ok());
        assert!(Args::try_parse_from(["gatehouse", "--refresh-ttl-days", "3651"]).is_err());
        assert!(
            Args::try_parse_from(["gatehouse", "--refresh-ttl-days", "18446744073709551615"])
                .is_err()
        );
        assert!(Args::try_parse_from(["gatehouse", "--access-ttl-minutes", "1441"]).is_err());
    }

    #[test]
    fn test_keygen_subcommand() {
        let args = Args::try_parse_from(["gatehouse", "keygen", "--length", "48"]).unwrap();
        assert!(matches!(args.command, Some(Command::Keygen { length: 48 })));
    }

    #[test]
    fn test_generate_secret() {
        let a = generate_secret(64);
        let b = generate_secret(64);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_load_secret_from_file() {
        let path = std::env::temp_dir().join(format!("gatehouse-secret-{}", uuid::Uuid::new_v4()));
        std::fs::write(&path, format!("{}\n", "s".repeat(40))).unwrap();

        let secret = load_secret("GATEHOUSE_TEST_UNSET_SECRET", path.to_str());
        assert_eq!(secret.as_deref(), Some("s".repeat(40).as_str()));

        std::fs::write(&path, "short").unwrap();
        assert!(load_secret("GATEHOUSE_TEST_UNSET_SECRET", path.to_str()).is_none());

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_missing_secret() {
        assert!(load_secret("GATEHOUSE_TEST_UNSET_SECRET", None).is_none());
    }
}
