use std::env;
use std::net::SocketAddr;

use tracing::info;

use crate::error::AppError;

const DEFAULT_DATABASE_URL: &str = "sqlite://course_catalog.db?mode=rwc";
const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";

/// Which persistence strategy backs the course repository.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BackendKind {
    Local,
    Remote { base_url: String },
}

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub backend: BackendKind,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let database_url = env::var("DATABASE_URL").unwrap_or_else(|_| {
            info!("DATABASE_URL not set, using default: {}", DEFAULT_DATABASE_URL);
            DEFAULT_DATABASE_URL.to_string()
        });

        let bind_addr = env::var("BIND_ADDR")
            .unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string())
            .parse::<SocketAddr>()
            .map_err(|e| AppError::BadRequest(format!("BIND_ADDR is invalid: {}", e)))?;

        let backend = parse_backend(
            env::var("CATALOG_BACKEND").ok().as_deref(),
            env::var("COURSE_API_URL").ok(),
        )?;

        Ok(Self {
            database_url,
            bind_addr,
            backend,
        })
    }
}

fn parse_backend(kind: Option<&str>, api_url: Option<String>) -> Result<BackendKind, AppError> {
    match kind.map(str::trim).unwrap_or("local") {
        "" | "local" => Ok(BackendKind::Local),
        "remote" => {
            let base_url = api_url
                .filter(|url| !url.trim().is_empty())
                .ok_or_else(|| {
                    AppError::BadRequest(
                        "COURSE_API_URL is not set (required when CATALOG_BACKEND=remote)"
                            .to_string(),
                    )
                })?;
            Ok(BackendKind::Remote {
                base_url: base_url.trim_end_matches('/').to_string(),
            })
        }
        other => Err(AppError::BadRequest(format!(
            "CATALOG_BACKEND must be 'local' or 'remote', got '{}'",
            other
        ))),
    }
}
