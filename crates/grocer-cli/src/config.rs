use std::path::PathBuf;

const DEFAULT_DB_PATH: &str = "grocer.db";
const DEFAULT_JWT_SECRET: &str = "dev-secret-change-me";
const DEFAULT_SESSION_PATH: &str = ".grocer-session";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub session_path: PathBuf,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str, default: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default.into())
        };

        Self {
            db_path: var("GROCER_DB_PATH", DEFAULT_DB_PATH).into(),
            jwt_secret: var("GROCER_JWT_SECRET", DEFAULT_JWT_SECRET),
            session_path: var("GROCER_SESSION_PATH", DEFAULT_SESSION_PATH).into(),
        }
    }
}
