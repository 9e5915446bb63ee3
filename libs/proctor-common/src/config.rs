// Process-level settings shared by the API, worker and CLI

pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";
pub const DEFAULT_API_ADDR: &str = "0.0.0.0:3000";

pub struct Config {
    pub redis_url: String,
    pub api_addr: String,
}

impl Config {
    pub fn new() -> Self {
        Self {
            redis_url: DEFAULT_REDIS_URL.to_string(),
            api_addr: DEFAULT_API_ADDR.to_string(),
        }
    }

    /// Read `REDIS_URL` / `API_ADDR`, falling back to local defaults
    pub fn from_env() -> Self {
        let defaults = Self::new();
        Self {
            redis_url: std::env::var("REDIS_URL").unwrap_or(defaults.redis_url),
            api_addr: std::env::var("API_ADDR").unwrap_or(defaults.api_addr),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}
