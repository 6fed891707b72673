use std::env;

/// Environment-driven configuration for the controller process, following the
/// same `from_env` idiom as the ingress service.
#[derive(Clone, Debug)]
pub struct ControllerConfig {
    pub namespace: String,
    pub internal_api_url: String,
    pub leader_election_enabled: bool,
    pub lease_name: String,
    pub lease_duration_secs: i64,
    pub health_addr: String,
    pub max_assignment_failures: u32,
}

impl ControllerConfig {
    pub fn from_env() -> Self {
        let namespace = env::var("SHEPHERD_NAMESPACE").unwrap_or_else(|_| "default".to_string());
        let internal_api_url =
            env::var("SHEPHERD_INTERNAL_API_URL").unwrap_or_else(|_| "http://shepherd-ingress-internal:8081".to_string());
        let leader_election_enabled = env::var("SHEPHERD_LEADER_ELECTION")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);
        let lease_name = env::var("SHEPHERD_LEASE_NAME").unwrap_or_else(|_| "shepherd-controller".to_string());
        let lease_duration_secs = env::var("SHEPHERD_LEASE_DURATION_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(15);
        let health_addr = env::var("SHEPHERD_HEALTH_ADDR").unwrap_or_else(|_| "0.0.0.0:8082".to_string());
        let max_assignment_failures = env::var("SHEPHERD_MAX_ASSIGNMENT_FAILURES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(5);

        Self {
            namespace,
            internal_api_url,
            leader_election_enabled,
            lease_name,
            lease_duration_secs,
            health_addr,
            max_assignment_failures,
        }
    }
}
