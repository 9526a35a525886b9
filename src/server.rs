//! HTTP exposition server
//!
//! Serves a fresh collection cycle on the telemetry path, a landing page on
//! `/` and a liveness check on `/healthz`.

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::collector::BillingCollector;
use crate::config::ServerConfig;
use crate::error::Result;

const HEALTH_PATH: &str = "/healthz";

struct State {
    collector: Arc<BillingCollector>,
    telemetry_path: String,
}

/// Metrics HTTP server
pub struct MetricsServer {
    listen_address: SocketAddr,
    state: Arc<State>,
}

impl MetricsServer {
    pub fn new(config: ServerConfig, collector: Arc<BillingCollector>) -> Self {
        Self {
            listen_address: config.listen_address,
            state: Arc::new(State {
                collector,
                telemetry_path: config.telemetry_path,
            }),
        }
    }

    /// Bind the configured address and serve until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        let listener = TcpListener::bind(self.listen_address).await?;
        self.serve(listener, cancel).await
    }

    /// Serve connections from `listener` until `cancel` fires.
    ///
    /// Open connections finish their current request; in-flight collection
    /// cycles observe the same token and stop early.
    pub async fn serve(self, listener: TcpListener, cancel: CancellationToken) -> Result<()> {
        info!(
            address = %listener.local_addr()?,
            telemetry_path = %self.state.telemetry_path,
            "Metrics server listening"
        );

        loop {
            let (stream, peer) = tokio::select! {
                _ = cancel.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!(error = %e, "Metrics server accept error");
                        continue;
                    }
                },
            };

            let io = TokioIo::new(stream);
            let state = self.state.clone();
            let cancel = cancel.clone();

            tokio::spawn(async move {
                let service = {
                    let cancel = cancel.clone();
                    service_fn(move |req| route(state.clone(), cancel.clone(), req))
                };
                let conn = http1::Builder::new().serve_connection(io, service);
                tokio::pin!(conn);

                let result = tokio::select! {
                    result = conn.as_mut() => result,
                    _ = cancel.cancelled() => {
                        conn.as_mut().graceful_shutdown();
                        conn.as_mut().await
                    }
                };
                if let Err(e) = result {
                    debug!(%peer, error = %e, "Metrics server connection error");
                }
            });
        }

        info!("Metrics server stopped accepting connections");
        Ok(())
    }
}

async fn route<B>(
    state: Arc<State>,
    cancel: CancellationToken,
    req: Request<B>,
) -> std::result::Result<Response<Full<Bytes>>, Infallible> {
    let path = req.uri().path();
    let response = if path == state.telemetry_path {
        metrics(&state, &cancel).await
    } else if path == "/" {
        respond(
            StatusCode::OK,
            "text/html; charset=utf-8",
            landing_page(&state.telemetry_path),
        )
    } else if path == HEALTH_PATH {
        respond(StatusCode::OK, "text/plain; charset=utf-8", "ok".to_string())
    } else {
        respond(StatusCode::NOT_FOUND, "text/plain; charset=utf-8", "not found".to_string())
    };
    Ok(response)
}

async fn metrics(state: &State, cancel: &CancellationToken) -> Response<Full<Bytes>> {
    let snapshot = state.collector.collect(&cancel.child_token()).await;
    match snapshot.encode_text() {
        Ok(body) => respond(StatusCode::OK, prometheus::TEXT_FORMAT, body),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            respond(
                StatusCode::INTERNAL_SERVER_ERROR,
                "text/plain; charset=utf-8",
                format!("failed to encode metrics: {}", e),
            )
        }
    }
}

fn respond(status: StatusCode, content_type: &'static str, body: String) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

// =============================================================================
// Shutdown
// =============================================================================

/// Resolves on SIGINT or SIGTERM.
pub async fn shutdown_signal() -> std::io::Result<()> {
    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result,
        _ = terminate.recv() => Ok(()),
    }
}

/// Cancel `cancel` once `signal` fires. A failed listener leaves the token
/// untouched and hands the error back.
pub async fn cancel_on<F>(signal: F, cancel: CancellationToken) -> std::io::Result<()>
where
    F: Future<Output = std::io::Result<()>>,
{
    signal.await?;
    info!("Shutdown requested");
    cancel.cancel();
    Ok(())
}

fn landing_page(telemetry_path: &str) -> String {
    format!(
        "<html>\n\
         <head><title>GitHub Billing Exporter</title></head>\n\
         <body>\n\
         <h1>GitHub Billing Exporter</h1>\n\
         <p><a href=\"{path}\">Metrics</a></p>\n\
         </body>\n\
         </html>\n",
        path = telemetry_path
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::testing::FakeBillingApi;
    use crate::collector::CollectorRegistry;
    use crate::github::StorageBilling;
    use http_body_util::BodyExt;

    async fn state() -> Arc<State> {
        let api = FakeBillingApi::new().with_storage(
            "acme",
            StorageBilling {
                days_left_in_billing_cycle: 3.0,
                ..Default::default()
            },
        );
        let mut registry = CollectorRegistry::with_defaults();
        registry.retain(&["storage_org"]).unwrap();
        let collector = registry
            .instantiate(api.config(&["acme"]), CancellationToken::new())
            .await
            .unwrap();
        Arc::new(State {
            collector: Arc::new(collector),
            telemetry_path: "/metrics".to_string(),
        })
    }

    async fn get(state: Arc<State>, path: &str) -> (StatusCode, Option<String>, String) {
        let req = Request::builder().uri(path).body(()).unwrap();
        let response = route(state, CancellationToken::new(), req).await.unwrap();
        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .map(|v| v.to_str().unwrap().to_string());
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, content_type, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_metrics_route() {
        let (status, content_type, body) = get(state().await, "/metrics").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type.as_deref(), Some(prometheus::TEXT_FORMAT));
        assert!(body.contains("github_billing_storage_org_billing_cycle_days{org=\"acme\"} 3"));
        assert!(body.contains("github_billing_collector_up{collector=\"storage_org\"} 1"));
    }

    #[tokio::test]
    async fn test_landing_page_links_metrics() {
        let (status, _, body) = get(state().await, "/").await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("<a href=\"/metrics\">"));
    }

    #[tokio::test]
    async fn test_health_and_not_found() {
        let state = state().await;

        let (status, _, body) = get(state.clone(), "/healthz").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "ok");

        let (status, _, _) = get(state, "/nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_serve_stops_on_cancel() {
        let state = state().await;
        let server = MetricsServer {
            listen_address: "127.0.0.1:0".parse().unwrap(),
            state,
        };
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(server.serve(listener, cancel.clone()));
        cancel.cancel();

        let result = tokio::time::timeout(std::time::Duration::from_secs(5), handle).await;
        assert!(matches!(result, Ok(Ok(Ok(())))));
    }

    #[tokio::test]
    async fn test_failed_signal_listener_does_not_cancel() {
        let cancel = CancellationToken::new();
        let failed = futures::future::ready(Err(std::io::Error::other("no signal driver")));

        let result = cancel_on(failed, cancel.clone()).await;

        assert!(result.is_err());
        assert!(!cancel.is_cancelled());
    }

    #[tokio::test]
    async fn test_delivered_signal_cancels() {
        let cancel = CancellationToken::new();

        cancel_on(futures::future::ready(Ok(())), cancel.clone()).await.unwrap();

        assert!(cancel.is_cancelled());
    }
}
