//! The HTTP middleware stack wrapped around every route.
//!
//! Layers are listed outermost first. Request ids are assigned before
//! anything logs, and the request scope is opened last so that interceptors
//! see the per-request logger attached just outside it.

use std::sync::Arc;

use axum::http::header::HeaderName;
use axum::http::{Method, StatusCode};
use gaekit_core::ContextStore;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use super::lifecycle::{InFlightLayer, Lifecycle};
use crate::config::AppConfig;
use crate::logging::RequestLoggerLayer;
use crate::scope::{InterceptorRegistry, RequestScopeLayer};

/// The composed Tower layer type produced by [`build_http_layers`].
///
/// Each layer wraps the next in a `Stack`, from innermost (first type
/// argument) to outermost (last applied).
type HttpLayers = tower::layer::util::Stack<
    RequestScopeLayer,
    tower::layer::util::Stack<
        RequestLoggerLayer,
        tower::layer::util::Stack<
            InFlightLayer,
            tower::layer::util::Stack<
                PropagateRequestIdLayer,
                tower::layer::util::Stack<
                    TimeoutLayer,
                    tower::layer::util::Stack<
                        CorsLayer,
                        tower::layer::util::Stack<
                            TraceLayer<
                                tower_http::classify::SharedClassifier<
                                    tower_http::classify::ServerErrorsAsFailures,
                                >,
                            >,
                            tower::layer::util::Stack<
                                SetRequestIdLayer<MakeRequestUuid>,
                                tower::layer::util::Identity,
                            >,
                        >,
                    >,
                >,
            >,
        >,
    >,
>;

/// Builds the layer stack applied to the router, outermost first:
///
/// 1. `SetRequestId`: UUID v4 `x-request-id` when the client sent none
/// 2. `Trace`: request/response spans
/// 3. `Cors`
/// 4. `Timeout`: `408` after `network.request_timeout`
/// 5. `PropagateRequestId`: echoes `x-request-id` on the response
/// 6. `InFlight`: counted for graceful drain
/// 7. `RequestLogger`: per-request logger, hosted only
/// 8. `RequestScope`: namespace and interceptors
#[must_use]
pub fn build_http_layers(
    config: &AppConfig,
    store: Arc<ContextStore>,
    interceptors: InterceptorRegistry,
    lifecycle: Arc<Lifecycle>,
) -> HttpLayers {
    let x_request_id = HeaderName::from_static("x-request-id");

    let cors = build_cors_layer(&config.network.cors_origins);

    ServiceBuilder::new()
        .layer(SetRequestIdLayer::new(
            x_request_id.clone(),
            MakeRequestUuid,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            config.network.request_timeout,
        ))
        .layer(PropagateRequestIdLayer::new(x_request_id))
        .layer(InFlightLayer::new(lifecycle))
        .layer(RequestLoggerLayer::new(config.hosted))
        .layer(RequestScopeLayer::new(store, interceptors))
        .into_inner()
}

/// CORS for the configured origins: `"*"` allows any, otherwise an allowlist.
/// Origins that are not valid header values are skipped.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        let parsed: Vec<_> = origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        AllowOrigin::list(parsed)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any)
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::header::{
        ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_REQUEST_METHOD, ORIGIN,
    };
    use axum::http::Request;
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    use super::*;

    fn app(origins: &[&str]) -> Router {
        let mut config = AppConfig::default();
        config.network.cors_origins = origins.iter().map(ToString::to_string).collect();
        let layers = build_http_layers(
            &config,
            Arc::new(ContextStore::new(&config.request_scope)),
            InterceptorRegistry::new(),
            Arc::new(Lifecycle::new()),
        );
        Router::new()
            .route("/ping", get(|| async { "pong" }))
            .layer(layers)
    }

    fn preflight(origin: &str) -> Request<Body> {
        Request::builder()
            .method(Method::OPTIONS)
            .uri("/ping")
            .header(ORIGIN, origin)
            .header(ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn wildcard_origin_allows_any() {
        let resp = app(&["*"])
            .oneshot(preflight("https://anywhere.example"))
            .await
            .unwrap();

        assert_eq!(resp.headers()[ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    }

    #[tokio::test]
    async fn allowlist_echoes_listed_origin_only() {
        let origins = ["http://localhost:3000", "https://example.com"];

        let listed = app(&origins)
            .oneshot(preflight("https://example.com"))
            .await
            .unwrap();
        assert_eq!(
            listed.headers()[ACCESS_CONTROL_ALLOW_ORIGIN],
            "https://example.com"
        );

        let unlisted = app(&origins)
            .oneshot(preflight("https://evil.example"))
            .await
            .unwrap();
        assert!(unlisted.headers().get(ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
    }

    #[tokio::test]
    async fn responses_carry_generated_request_id() {
        let resp = app(&["*"])
            .oneshot(Request::get("/ping").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        let id = resp.headers()["x-request-id"].to_str().unwrap();
        assert!(uuid::Uuid::parse_str(id).is_ok());
    }
}
