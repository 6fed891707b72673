use std::sync::Arc;

use axum::extract::FromRef;
use kube::Client;

use crate::config::IngressConfig;
use crate::event_hub::EventHub;
use crate::security::CredentialIssuer;

#[derive(Clone)]
pub struct AppState {
    pub client: Client,
    pub config: IngressConfig,
    pub events: Arc<EventHub>,
    pub credentials: Arc<CredentialIssuer>,
}

impl AppState {
    pub fn new(client: Client, config: IngressConfig) -> Self {
        let events = Arc::new(EventHub::new(config.event_ring_capacity, config.event_subscriber_capacity));
        let credentials = Arc::new(CredentialIssuer::new(&config));
        Self {
            client,
            config,
            events,
            credentials,
        }
    }
}

impl FromRef<AppState> for Client {
    fn from_ref(state: &AppState) -> Self {
        state.client.clone()
    }
}

impl FromRef<AppState> for IngressConfig {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}

impl FromRef<AppState> for Arc<EventHub> {
    fn from_ref(state: &AppState) -> Self {
        state.events.clone()
    }
}

impl FromRef<AppState> for Arc<CredentialIssuer> {
    fn from_ref(state: &AppState) -> Self {
        state.credentials.clone()
    }
}
