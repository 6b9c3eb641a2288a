use std::env;

/// Infrastructure configuration loaded from environment variables.
/// The harvest definition itself (search terms, tunables) comes from a
/// TOML file, not from here.
#[derive(Debug, Clone)]
pub struct Config {
    // Postgres
    pub database_url: String,

    // Browserless
    pub browserless_url: String,
    pub browserless_token: Option<String>,

    // Upstream proxy credentials for the browser session
    pub proxy_username: Option<String>,
    pub proxy_password: Option<String>,

    // Authenticated session cookies, exported from a logged-in browser
    pub cookie_path: String,

    // Status API
    pub api_host: String,
    pub api_port: u16,
}

impl Config {
    /// Load configuration for the harvester binary.
    /// Panics with a clear message if required vars are missing.
    pub fn harvester_from_env() -> Self {
        Self {
            database_url: required_env("DATABASE_URL"),
            browserless_url: required_env("BROWSERLESS_URL"),
            browserless_token: env::var("BROWSERLESS_TOKEN").ok(),
            proxy_username: env::var("PROXY_USERNAME").ok(),
            proxy_password: env::var("PROXY_PASSWORD").ok(),
            cookie_path: env::var("COOKIE_PATH").unwrap_or_else(|_| "cookie.json".to_string()),
            api_host: env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            api_port: api_port_env(),
        }
    }

    /// Load a minimal config for the status API (read-only, no browser).
    pub fn api_from_env() -> Self {
        Self {
            database_url: required_env("DATABASE_URL"),
            browserless_url: String::new(),
            browserless_token: None,
            proxy_username: None,
            proxy_password: None,
            cookie_path: String::new(),
            api_host: env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            api_port: api_port_env(),
        }
    }
}

fn api_port_env() -> u16 {
    env::var("API_PORT")
        .unwrap_or_else(|_| "3000".to_string())
        .parse()
        .expect("API_PORT must be a number")
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}
