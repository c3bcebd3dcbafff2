//! HTTP server assembly.

use crate::handlers::{containers, health};
use axum::routing::{get, post};
use axum::Router;
use repobox_core::ContainerService;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Default gateway port.
pub const DEFAULT_PORT: u16 = 8000;

/// Gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Address to bind.
    pub host: String,

    /// Port number.
    pub port: u16,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
        }
    }
}

/// Build the full route table over a shared service.
pub fn router(service: Arc<ContainerService>) -> Router {
    Router::new()
        .route("/", get(health::root))
        .route("/info", get(health::info))
        .route("/health", get(health::health))
        .route("/health/ready", get(health::ready))
        .route("/health/live", get(health::live))
        .route("/containers", post(containers::create).get(containers::list))
        .route(
            "/containers/:id",
            get(containers::get).delete(containers::delete),
        )
        .route("/containers/:id/execute", post(containers::execute))
        .route("/containers/:id/browse", get(containers::browse))
        .route("/containers/:id/files", get(containers::read_file))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(service)
}

/// Bind and serve until `shutdown` resolves.
pub async fn serve(
    config: GatewayConfig,
    service: Arc<ContainerService>,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Gateway listening on {addr}");
    axum::serve(listener, router(service))
        .with_graceful_shutdown(shutdown)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use repobox_core::runtime::MemoryRuntime;
    use repobox_core::Settings;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn app() -> (Arc<MemoryRuntime>, Router) {
        let runtime = Arc::new(MemoryRuntime::new());
        let service = Arc::new(ContainerService::new(Settings::default(), runtime.clone()));
        (runtime, router(service))
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn create_container(app: &Router) -> String {
        let response = app
            .clone()
            .oneshot(post_json(
                "/containers",
                json!({ "repo_url": "https://example.com/org/repo" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        body_json(response).await["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_create_returns_created_view() {
        let (_, app) = app();
        let response = app
            .oneshot(post_json(
                "/containers",
                json!({
                    "repo_url": "https://example.com/org/repo",
                    "branch": "develop",
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let body = body_json(response).await;
        assert_eq!(body["status"], "running");
        assert_eq!(body["branch"], "develop");
        assert!(body["commit"].is_null());
        assert!(body["id"].as_str().unwrap().starts_with("sbx-"));
        assert!(body.get("handle").is_none());
    }

    #[tokio::test]
    async fn test_create_with_bad_url_is_bad_request() {
        let (_, app) = app();
        let response = app
            .oneshot(post_json("/containers", json!({ "repo_url": "ftp://nope" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = body_json(response).await;
        assert_eq!(body["error"], "validation_error");
        assert!(body["detail"].is_string());
        assert!(body["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_get_unknown_is_not_found() {
        let (_, app) = app();
        let response = app.oneshot(get_req("/containers/sbx-ghost")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["error"], "not_found");
    }

    #[tokio::test]
    async fn test_list_counts_containers() {
        let (_, app) = app();
        create_container(&app).await;
        create_container(&app).await;

        let response = app.oneshot(get_req("/containers")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["total_count"], 2);
        assert_eq!(body["active_count"], 2);
        assert_eq!(body["containers"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_delete_then_get() {
        let (_, app) = app();
        let id = create_container(&app).await;

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri(format!("/containers/{id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app
            .oneshot(get_req(&format!("/containers/{id}")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_execute_returns_outcome() {
        let (runtime, app) = app();
        let id = create_container(&app).await;
        runtime.script_exec(|_, spec| MemoryRuntime::ok_output(format!("ran:{}", spec.command)));

        let response = app
            .oneshot(post_json(
                &format!("/containers/{id}/execute"),
                json!({ "command": "ls -la" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["exit_code"], 0);
        assert_eq!(body["stdout"], "ran:ls -la");
        assert_eq!(body["timed_out"], false);
    }

    #[tokio::test]
    async fn test_execute_empty_command_is_bad_request() {
        let (_, app) = app();
        let id = create_container(&app).await;

        let response = app
            .oneshot(post_json(
                &format!("/containers/{id}/execute"),
                json!({ "command": "  " }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_browse_traversal_is_bad_request() {
        let (_, app) = app();
        let id = create_container(&app).await;

        let response = app
            .oneshot(get_req(&format!(
                "/containers/{id}/browse?path=../../etc"
            )))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "path_traversal");
    }

    #[tokio::test]
    async fn test_read_file_decodes_content() {
        let (runtime, app) = app();
        let id = create_container(&app).await;
        runtime.script_exec(|_, spec| {
            if spec.command.starts_with("stat") {
                MemoryRuntime::ok_output("regular file:5")
            } else {
                MemoryRuntime::ok_output("aGVsbG8=")
            }
        });

        let response = app
            .oneshot(get_req(&format!(
                "/containers/{id}/files?file_path=README.md"
            )))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["content"], "hello");
        assert_eq!(body["size"], 5);
        assert_eq!(body["is_binary"], false);
        assert_eq!(body["path"], "/workspace/README.md");
    }

    #[tokio::test]
    async fn test_health_reports_engine_state() {
        let (runtime, app) = app();

        let response = app.clone().oneshot(get_req("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "healthy");

        runtime.set_fail_ping(true);
        let response = app.clone().oneshot(get_req("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "degraded");

        let response = app.oneshot(get_req("/health/ready")).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_liveness_and_root() {
        let (_, app) = app();
        let response = app.clone().oneshot(get_req("/health/live")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app.oneshot(get_req("/")).await.unwrap();
        assert_eq!(body_json(response).await["service"], "repobox");
    }
}
