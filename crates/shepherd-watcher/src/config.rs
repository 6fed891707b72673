use std::env;

#[derive(Clone, Debug)]
pub struct WatcherConfig {
    pub namespace: String,
    pub adapter_hmac_secret: String,
}

impl WatcherConfig {
    pub fn from_env() -> Self {
        Self {
            namespace: env::var("SHEPHERD_NAMESPACE").unwrap_or_else(|_| "default".to_string()),
            adapter_hmac_secret: env::var("SHEPHERD_ADAPTER_HMAC_SECRET").unwrap_or_else(|_| "changeme".to_string()),
        }
    }
}
