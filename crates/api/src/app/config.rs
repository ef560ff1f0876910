//! Process configuration read from the environment at startup.

use fiscalbridge_infra::DispatchConfig;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    /// Bearer key for `/internal`. When unset every internal call is rejected.
    pub internal_api_key: Option<String>,
    pub use_persistent_stores: bool,
    pub database_url: Option<String>,
    pub redis_url: String,
    pub dispatch: DispatchConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            internal_api_key: None,
            use_persistent_stores: false,
            database_url: None,
            redis_url: "redis://localhost:6379".to_string(),
            dispatch: DispatchConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let internal_api_key = lookup("INTERNAL_API_KEY").filter(|k| !k.trim().is_empty());
        if internal_api_key.is_none() {
            tracing::warn!("INTERNAL_API_KEY not set; internal API is disabled");
        }

        let use_persistent_stores = match lookup("USE_PERSISTENT_STORES") {
            None => false,
            Some(raw) => raw.trim().parse::<bool>().unwrap_or_else(|_| {
                tracing::warn!(key = "USE_PERSISTENT_STORES", value = %raw, "invalid boolean; using false");
                false
            }),
        };

        Self {
            bind_addr: lookup("BIND_ADDR").unwrap_or(defaults.bind_addr),
            internal_api_key,
            use_persistent_stores,
            database_url: lookup("DATABASE_URL"),
            redis_url: lookup("REDIS_URL").unwrap_or(defaults.redis_url),
            dispatch: DispatchConfig::from_lookup(&lookup),
        }
    }
}
