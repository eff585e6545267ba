// tests/common/mod.rs
pub use axum::Router;
pub use tokio::task::JoinHandle;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;

use crate::broker::Broker;
use crate::config::providers::{MicrosoftConfig, RancherConfig};
use crate::config::settings::MetricsConfig;
use crate::observability::metrics::get_metrics;
use crate::server::server::{router, AppState};
use crate::sources::Provider;

pub const TEST_API_KEY: &str = "test-api-key";

/// Spawn an Axum router on an ephemeral port and return (JoinHandle, SocketAddr)
pub async fn spawn_axum(router: Router) -> (JoinHandle<()>, SocketAddr) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind failed");
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, router).await.expect("server failed");
    });
    (handle, addr)
}

pub fn build_reqwest_client() -> Client {
    Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .expect("reqwest client")
}

/// Shared upstream call counter.
#[derive(Clone, Default)]
pub struct Hits(Arc<AtomicUsize>);

impl Hits {
    /// Records a call and returns its zero-based index.
    pub fn record(&self) -> usize {
        self.0.fetch_add(1, Ordering::SeqCst)
    }

    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

pub fn microsoft_config(name: &str, login_endpoint: String) -> MicrosoftConfig {
    MicrosoftConfig {
        name: name.to_owned(),
        client_id: "client-id".into(),
        client_secret: "client-secret".into(),
        resource: "https://graph.microsoft.com".into(),
        login_endpoint,
        timeout: Duration::from_secs(2),
    }
}

pub fn rancher_config(name: &str, url: String) -> RancherConfig {
    RancherConfig {
        name: name.to_owned(),
        url,
        username: "svc-user".into(),
        password: "svc-password".into(),
        ca_certs: None,
        timeout: Duration::from_secs(2),
        short_expiration: None,
    }
}

/// Serves `broker` behind the real router and returns its base url.
pub async fn spawn_broker(broker: Broker) -> (JoinHandle<()>, String) {
    let state = AppState::new(Arc::new(broker), TEST_API_KEY, get_metrics().await);
    let metrics_config = MetricsConfig {
        path: "/metrics".into(),
        is_enabled: true,
    };
    let (handle, addr) = spawn_axum(router(state, &metrics_config)).await;
    (handle, format!("http://{}", addr))
}

pub fn broker_of(providers: Vec<Provider>) -> Broker {
    Broker::from_providers(providers).expect("unique provider names")
}
