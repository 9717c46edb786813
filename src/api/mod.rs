use anyhow::Result;
use axum::{
    Extension, Router,
    body::Body,
    extract::MatchedPath,
    http::{HeaderName, HeaderValue, Request},
    routing::{get, options, post},
};
use std::sync::Arc;
use tokio::{net::TcpListener, signal};
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{Span, info, info_span};
use ulid::Ulid;
use utoipa_axum::router::OpenApiRouter;

pub(crate) mod handlers;
// OpenAPI router wiring and route registration live in openapi.rs.
mod openapi;
mod state;

pub use handlers::ajax::{ActionRegistry, AjaxAction, SessionState, VALIDATE_SESSION_ACTION};
pub use openapi::openapi;
pub use state::{
    AppState, DEFAULT_ADMIN_ROLE, DEFAULT_CHAT_PATH, DEFAULT_LOGIN_RETURN_PARAM, DEFAULT_LOGIN_URL,
    SsoConfig,
};

use handlers::{ajax, bridge, gateway, health, settings};

pub const ADMIN_AJAX_ALIAS: &str = "/wp-admin/admin-ajax.php";

/// Documented routes only.
#[must_use]
pub fn router() -> OpenApiRouter {
    openapi::api_router()
}

/// Full application router, including the routes that depend on runtime
/// configuration (chat path, gateway secret).
#[must_use]
pub fn app(state: Arc<AppState>) -> Router {
    let (router, _openapi) = router().split_for_parts();

    let chat = format!("/{}", state.config().chat_path());
    let mut app = router
        .route(&chat, get(bridge::protected_route))
        .route(&format!("{chat}/"), get(bridge::protected_route))
        .route("/admin-ajax", post(ajax::admin_ajax).options(ajax::admin_ajax))
        .route(
            ADMIN_AJAX_ALIAS,
            get(ajax::admin_ajax)
                .post(ajax::admin_ajax)
                .options(ajax::admin_ajax),
        )
        .route(
            "/settings",
            get(settings::settings_page).post(settings::save_settings),
        )
        .route("/health", options(health::health));

    if state.config().gateway_secret().is_some() {
        app = app.route("/internal/gateway-headers", get(gateway::gateway_headers));
    }

    app.layer(
        ServiceBuilder::new()
            .layer(SetRequestHeaderLayer::if_not_present(
                HeaderName::from_static("x-request-id"),
                |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
            ))
            .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                "x-request-id",
            )))
            .layer(TraceLayer::new_for_http().make_span_with(make_span))
            .layer(Extension(state)),
    )
}

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new(port: u16, state: Arc<AppState>) -> Result<()> {
    let app = app(state);

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl-c: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                tracing::error!("Failed to listen for SIGTERM: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Gracefully shutdown");
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}
