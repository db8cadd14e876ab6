use std::net::SocketAddr;

use axum::{
    http::{header, HeaderValue, Method},
    middleware,
    routing::get,
    Router,
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use crate::{analysis, auth, config::ServerConfig, content, state::AppState};

pub fn build_app(state: AppState) -> Router {
    let mut gated = Router::new()
        .merge(content::router())
        .merge(analysis::router());
    if state.config.server.protect_content_routes {
        gated = gated.route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_bearer,
        ));
    }

    Router::new()
        .nest(
            "/api",
            Router::new()
                .merge(auth::router())
                .merge(gated)
                .route("/health", get(|| async { "ok" })),
        )
        .layer(cors_layer(&state.config.server))
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!("http_request", %method, uri = %uri, status = tracing::field::Empty)
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     _latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        if status.is_server_error() {
                            tracing::error!(%status, "response");
                        } else {
                            tracing::info!(%status, "response");
                        }
                    },
                ),
        )
}

/// No configured origins: mirror the caller's origin and allow credentials.
fn cors_layer(cfg: &ServerConfig) -> CorsLayer {
    if cfg.cors_allowed_origins.is_empty() {
        return CorsLayer::very_permissive();
    }
    let origins: Vec<HeaderValue> = cfg
        .cors_allowed_origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(origin = %o, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true)
}

pub async fn serve(app: Router, cfg: &ServerConfig) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port).parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        analysis::{AnalysisProvider, ChartImage},
        content::FsContentStore,
        config::ContentConfig,
    };
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use serde_json::{json, Value};
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    };
    use tower::ServiceExt;

    async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let res = app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
        (status, body)
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str, token: Option<&str>) -> Request<Body> {
        let mut req = Request::get(uri);
        if let Some(t) = token {
            req = req.header(header::AUTHORIZATION, format!("Bearer {t}"));
        }
        req.body(Body::empty()).unwrap()
    }

    async fn register_and_login(app: &Router, email: &str, password: &str) -> String {
        let (status, _) = send(
            app,
            post_json(
                "/api/register",
                json!({"email": email, "password": password, "full_name": "Ada Lovelace"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, body) = send(
            app,
            post_json("/api/login", json!({"email": email, "password": password})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        body["token"].as_str().unwrap().to_string()
    }

    fn with_content_dir(state: AppState, dir: &std::path::Path) -> AppState {
        let content = FsContentStore::new(&ContentConfig {
            dir: dir.to_path_buf(),
            news_file: "news_links.json".into(),
            market_summary_file: "market-summary-1.json".into(),
        });
        AppState {
            content: Arc::new(content),
            ..state
        }
    }

    #[derive(Default)]
    struct RecordingAnalysis {
        calls: AtomicUsize,
        last: Mutex<Option<(String, ChartImage)>>,
    }

    #[async_trait::async_trait]
    impl AnalysisProvider for RecordingAnalysis {
        async fn analyze(&self, ticker: &str, image: &ChartImage) -> anyhow::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last.lock().unwrap() = Some((ticker.to_string(), image.clone()));
            Ok("Bullish.".into())
        }
    }

    struct FailingAnalysis;

    #[async_trait::async_trait]
    impl AnalysisProvider for FailingAnalysis {
        async fn analyze(&self, _ticker: &str, _image: &ChartImage) -> anyhow::Result<String> {
            anyhow::bail!("upstream exploded with secret detail")
        }
    }

    #[tokio::test]
    async fn health_is_ok() {
        let app = build_app(AppState::fake());
        let (status, body) = send(&app, get("/api/health", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, Value::String("ok".into()));
    }

    #[tokio::test]
    async fn register_then_duplicate() {
        let app = build_app(AppState::fake());
        let body = json!({"email": "ada@example.com", "password": "pw", "full_name": "Ada"});

        let (status, res) = send(&app, post_json("/api/register", body.clone())).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(res, json!({"message": "Registration successful"}));

        let (status, res) = send(&app, post_json("/api/register", body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(res, json!({"message": "Email already registered"}));
    }

    #[tokio::test]
    async fn register_missing_fields_and_bad_json() {
        let app = build_app(AppState::fake());
        let (status, res) = send(
            &app,
            post_json("/api/register", json!({"email": "a@b.c", "password": "pw"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(res, json!({"message": "Missing required fields"}));

        let req = Request::post("/api/register")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let (status, _) = send(&app, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn login_response_never_carries_digest() {
        let app = build_app(AppState::fake());
        send(
            &app,
            post_json(
                "/api/register",
                json!({"email": "ada@example.com", "password": "pw", "full_name": "Ada Lovelace"}),
            ),
        )
        .await;
        let (status, body) = send(
            &app,
            post_json("/api/login", json!({"email": "ada@example.com", "password": "pw"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body["user"],
            json!({"email": "ada@example.com", "full_name": "Ada Lovelace"})
        );
        assert!(body["token"].as_str().is_some_and(|t| !t.is_empty()));
        assert!(!body.to_string().contains("argon2"));
    }

    #[tokio::test]
    async fn login_token_opens_protected_route() {
        let app = build_app(AppState::fake());
        let token = register_and_login(&app, "ada@example.com", "pw").await;

        let (status, body) = send(&app, get("/api/protected", Some(&token))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"logged_in_as": "ada@example.com"}));
    }

    #[tokio::test]
    async fn protected_rejects_missing_and_bad_tokens() {
        let app = build_app(AppState::fake());
        let (status, body) = send(&app, get("/api/protected", None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, json!({"message": "Missing Authorization Header"}));

        let (status, body) = send(&app, get("/api/protected", Some("abc.def.ghi"))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, json!({"message": "Invalid token"}));
    }

    #[tokio::test]
    async fn bad_login_answers_are_indistinguishable() {
        let app = build_app(AppState::fake());
        register_and_login(&app, "ada@example.com", "pw").await;

        let wrong_pw = send(
            &app,
            post_json("/api/login", json!({"email": "ada@example.com", "password": "nope"})),
        )
        .await;
        let unknown = send(
            &app,
            post_json("/api/login", json!({"email": "ghost@example.com", "password": "pw"})),
        )
        .await;
        assert_eq!(wrong_pw.0, StatusCode::UNAUTHORIZED);
        assert_eq!(wrong_pw, unknown);
        assert_eq!(wrong_pw.1, json!({"message": "Invalid email or password"}));
    }

    #[tokio::test]
    async fn login_missing_fields_is_400() {
        let app = build_app(AppState::fake());
        let (status, body) =
            send(&app, post_json("/api/login", json!({"email": "ada@example.com"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({"message": "Missing email or password"}));
    }

    #[tokio::test]
    async fn news_all_flattens_categories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("news_links.json"),
            r#"{"stocks": [{"t": 1}, {"t": 2}], "crypto": [{"t": 3}], "forex": []}"#,
        )
        .unwrap();
        let app = build_app(with_content_dir(AppState::fake(), dir.path()));

        let (status, body) = send(&app, get("/api/news?category=all", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([{"t": 1}, {"t": 2}, {"t": 3}]));

        let (_, default_body) = send(&app, get("/api/news", None)).await;
        assert_eq!(default_body, body);

        let (status, body) = send(&app, get("/api/news?category=crypto", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([{"t": 3}]));

        let (status, body) = send(&app, get("/api/news?category=sports", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([]));
    }

    #[tokio::test]
    async fn market_summary_statuses() {
        let dir = tempfile::tempdir().unwrap();
        let app = build_app(with_content_dir(AppState::fake(), dir.path()));

        let (status, body) = send(&app, get("/api/market-summary", None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({"error": "market-summary-1.json file not found"}));

        std::fs::write(dir.path().join("market-summary-1.json"), "{broken").unwrap();
        let (status, body) = send(&app, get("/api/market-summary", None)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({"error": "Error decoding the JSON file"}));

        std::fs::write(
            dir.path().join("market-summary-1.json"),
            r#"{"indices": [{"name": "NIFTY 50", "change": 0.4}]}"#,
        )
        .unwrap();
        let (status, body) = send(&app, get("/api/market-summary", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["indices"][0]["name"], "NIFTY 50");
    }

    #[tokio::test]
    async fn analyze_strips_data_url_prefix() {
        let provider = Arc::new(RecordingAnalysis::default());
        let state = AppState {
            analysis: provider.clone(),
            ..AppState::fake()
        };
        let app = build_app(state);

        let (status, body) = send(
            &app,
            post_json(
                "/api/analyze",
                json!({"script": "INFY", "image": "data:image/png;base64,iVBORw0KGgo="}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"analysis": "Bullish."}));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);

        let (ticker, image) = provider.last.lock().unwrap().clone().unwrap();
        assert_eq!(ticker, "INFY");
        assert_eq!(image.mime_type, "image/png");
        assert_eq!(&image.bytes[..], b"\x89PNG\r\n\x1a\n");
    }

    #[tokio::test]
    async fn analyze_missing_fields_never_calls_provider() {
        let provider = Arc::new(RecordingAnalysis::default());
        let state = AppState {
            analysis: provider.clone(),
            ..AppState::fake()
        };
        let app = build_app(state);

        for body in [
            json!({"image": "iVBORw0KGgo="}),
            json!({"script": "INFY"}),
            json!({"script": "", "image": "iVBORw0KGgo="}),
        ] {
            let (status, res) = send(&app, post_json("/api/analyze", body)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(res, json!({"error": "Missing script or image data"}));
        }

        let (status, _) = send(
            &app,
            post_json("/api/analyze", json!({"script": "INFY", "image": "%%%"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn analyze_failure_is_generic_500() {
        let state = AppState {
            analysis: Arc::new(FailingAnalysis),
            ..AppState::fake()
        };
        let app = build_app(state);
        let (status, body) = send(
            &app,
            post_json("/api/analyze", json!({"script": "INFY", "image": "iVBORw0KGgo="})),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({"error": "Analysis failed. Please try again."}));
    }

    #[tokio::test]
    async fn content_routes_are_public_by_default() {
        let app = build_app(AppState::fake());
        let (status, _) = send(&app, get("/api/news", None)).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = send(&app, get("/api/market-summary", None)).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn protect_toggle_gates_content_and_analysis() {
        let state = AppState::fake();
        let mut config = (*state.config).clone();
        config.server.protect_content_routes = true;
        let app = build_app(AppState {
            config: Arc::new(config),
            ..state
        });

        let (status, _) = send(&app, get("/api/news", None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) = send(&app, get("/api/market-summary", None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) = send(
            &app,
            post_json("/api/analyze", json!({"script": "INFY", "image": "iVBORw0KGgo="})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let token = register_and_login(&app, "ada@example.com", "pw").await;
        let (status, _) = send(&app, get("/api/news", Some(&token))).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send(&app, get("/api/health", None)).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn cors_mirrors_origin_with_credentials() {
        let app = build_app(AppState::fake());
        let req = Request::get("/api/health")
            .header(header::ORIGIN, "http://localhost:3000")
            .body(Body::empty())
            .unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(
            res.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "http://localhost:3000"
        );
        assert_eq!(
            res.headers()[header::ACCESS_CONTROL_ALLOW_CREDENTIALS],
            "true"
        );
    }
}
