#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
}

impl Config {
    pub fn from_env() -> Self {
        let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        Self { log_level }
    }
}
