use std::env;
use std::path::PathBuf;

/// Environment-driven configuration for the ingress process, following the
/// same `from_env` + `unwrap_or_else` default idiom used across this project.
#[derive(Clone, Debug)]
pub struct IngressConfig {
    pub public_addr: String,
    pub internal_addr: String,
    pub adapter_hmac_secret: String,
    pub namespace: String,
    pub github_app_id: String,
    pub github_app_installation_id: String,
    pub github_app_private_key_path: PathBuf,
    pub event_ring_capacity: usize,
    pub event_subscriber_capacity: usize,
    pub cors_origins: Vec<String>,
}

impl IngressConfig {
    pub fn from_env() -> Self {
        let public_addr = env::var("SHEPHERD_PUBLIC_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
        let internal_addr =
            env::var("SHEPHERD_INTERNAL_ADDR").unwrap_or_else(|_| "0.0.0.0:8081".to_string());
        let adapter_hmac_secret =
            env::var("SHEPHERD_ADAPTER_HMAC_SECRET").unwrap_or_else(|_| "changeme".to_string());
        let namespace = env::var("SHEPHERD_NAMESPACE").unwrap_or_else(|_| "default".to_string());
        let github_app_id = env::var("SHEPHERD_GITHUB_APP_ID").unwrap_or_default();
        let github_app_installation_id = env::var("SHEPHERD_GITHUB_APP_INSTALLATION_ID").unwrap_or_default();
        let github_app_private_key_path = env::var("SHEPHERD_GITHUB_APP_PRIVATE_KEY_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./github-app.pem"));
        let event_ring_capacity = env::var("SHEPHERD_EVENT_RING_CAPACITY")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(1000);
        let event_subscriber_capacity = env::var("SHEPHERD_EVENT_SUBSCRIBER_CAPACITY")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(64);
        let cors_origins = env::var("SHEPHERD_CORS_ORIGINS")
            .unwrap_or_else(|_| "*".to_string())
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect::<Vec<_>>();

        Self {
            public_addr,
            internal_addr,
            adapter_hmac_secret,
            namespace,
            github_app_id,
            github_app_installation_id,
            github_app_private_key_path,
            event_ring_capacity,
            event_subscriber_capacity,
            cors_origins,
        }
    }

    pub fn allow_all_cors(&self) -> bool {
        self.cors_origins.iter().any(|origin| origin == "*")
    }
}
