use axum::body::Body as ResponseBody;
use axum::http::{Request, Response};
use kube::Client;
use kube::client::Body as RequestBody;
use reqwest::Client as HttpClient;
use shepherd_ingress::{internal_router, public_router};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tower::BoxError;

use shepherd_ingress::config::IngressConfig;
use shepherd_ingress::state::AppState;

/// A `kube::Client` whose transport always errors. Good enough for exercising
/// routes that must reject a request before ever touching the Kubernetes API;
/// if one of them regresses into calling out, the test sees a 500/502 instead
/// of the expected status rather than hanging on a real cluster.
fn unreachable_client() -> Client {
    let service = tower::service_fn(|_req: Request<RequestBody>| async move {
        Err::<Response<ResponseBody>, BoxError>("kubernetes API should not be reached by this test".into())
    });
    Client::new(service, "default")
}

#[allow(dead_code)]
pub struct TestApp {
    pub client: HttpClient,
    pub public_url: String,
    pub internal_url: String,
    shutdown_txs: Vec<oneshot::Sender<()>>,
}

impl TestApp {
    #[allow(dead_code)]
    pub async fn spawn() -> Self {
        Self::spawn_with(|_| {}).await
    }

    pub async fn spawn_with<F>(configure: F) -> Self
    where
        F: FnOnce(&mut IngressConfig),
    {
        let mut config = IngressConfig::from_env();
        config.namespace = "shepherd-test".to_string();
        config.adapter_hmac_secret = "test-secret".to_string();
        configure(&mut config);

        let state = AppState::new(unreachable_client(), config);

        let public_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let public_addr = public_listener.local_addr().unwrap();
        let internal_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let internal_addr = internal_listener.local_addr().unwrap();

        let (public_shutdown_tx, public_shutdown_rx) = oneshot::channel();
        let (internal_shutdown_tx, internal_shutdown_rx) = oneshot::channel();

        let public_app = public_router(state.clone());
        let internal_app = internal_router(state);
        tokio::spawn(async move {
            axum::serve(public_listener, public_app)
                .with_graceful_shutdown(async move {
                    let _ = public_shutdown_rx.await;
                })
                .await
                .unwrap();
        });
        tokio::spawn(async move {
            axum::serve(internal_listener, internal_app)
                .with_graceful_shutdown(async move {
                    let _ = internal_shutdown_rx.await;
                })
                .await
                .unwrap();
        });

        let client = HttpClient::new();
        let public_url = format!("http://{}:{}", public_addr.ip(), public_addr.port());
        let internal_url = format!("http://{}:{}", internal_addr.ip(), internal_addr.port());
        for _ in 0..50 {
            if client.get(format!("{public_url}/healthz")).send().await.is_ok() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }

        Self {
            client,
            public_url,
            internal_url,
            shutdown_txs: vec![public_shutdown_tx, internal_shutdown_tx],
        }
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        for tx in self.shutdown_txs.drain(..) {
            let _ = tx.send(());
        }
    }
}
