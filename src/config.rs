use std::env;

/// Process settings read from the environment (and `.env` when present).
#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub base_url: String,
    pub admin_user: String,
    pub admin_password: String,
    pub admin_email: String,
    pub activation_ttl_hours: i64,
}

impl Config {
    pub fn from_env() -> Self {
        if let Err(err) = dotenvy::dotenv() {
            log::debug!("No .env file loaded: {err}");
        }

        let port = env::var("PORT")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(8080);

        Self {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://./data/pitchbook.db".to_string()),
            port,
            base_url: env::var("BASE_URL").unwrap_or_else(|_| format!("http://localhost:{port}")),
            admin_user: env::var("ADMIN_USER").unwrap_or_else(|_| "admin".to_string()),
            admin_password: env::var("ADMIN_PASSWORD").unwrap_or_else(|_| "admin".to_string()),
            admin_email: env::var("ADMIN_EMAIL").unwrap_or_default(),
            activation_ttl_hours: env::var("ACTIVATION_TTL_HOURS")
                .ok()
                .and_then(|value| value.parse().ok())
                .filter(|hours| *hours > 0)
                .unwrap_or(24),
        }
    }

    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            port: 0,
            base_url: "http://localhost".to_string(),
            admin_user: "admin".to_string(),
            admin_password: "admin-secret".to_string(),
            admin_email: "admin@example.com".to_string(),
            activation_ttl_hours: 24,
        }
    }
}
