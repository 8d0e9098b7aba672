//! Route table and admission middleware.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Request, State};
use axum::handler::Handler;
use axum::http::{header, HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use tracing::{info, instrument, warn};

use super::handlers;
use super::store::RecordStore;
use crate::config::RouteConfig;
use crate::error::Result;
use crate::ratelimit::{Admission, PolicyRegistry, RateLimiter, Rejection};

/// Maps method and path to handlers, each guarded by its policy.
///
/// Policies are resolved when the dispatcher is built, so a route bound to
/// an unknown policy fails at startup rather than on the first request.
pub struct Dispatcher {
    store: Arc<RecordStore>,
    list_people: RateLimiter,
    get_person: RateLimiter,
    create_person: RateLimiter,
    update_person: RateLimiter,
    delete_person: RateLimiter,
}

impl Dispatcher {
    /// Create a dispatcher, resolving every route's policy.
    pub fn new(store: Arc<RecordStore>, registry: &PolicyRegistry, routes: &RouteConfig) -> Result<Self> {
        let dispatcher = Self {
            store,
            list_people: registry.resolve(&routes.list_people)?,
            get_person: registry.resolve(&routes.get_person)?,
            create_person: registry.resolve(&routes.create_person)?,
            update_person: registry.resolve(&routes.update_person)?,
            delete_person: registry.resolve(&routes.delete_person)?,
        };

        info!(
            list_people = dispatcher.list_people.name(),
            get_person = dispatcher.get_person.name(),
            create_person = dispatcher.create_person.name(),
            update_person = dispatcher.update_person.name(),
            delete_person = dispatcher.delete_person.name(),
            "Routes bound to rate limit policies"
        );
        Ok(dispatcher)
    }

    /// Build the axum router.
    pub fn router(&self) -> Router {
        let people = get(handlers::list_people.layer(middleware::from_fn_with_state(
            self.list_people.clone(),
            admit,
        )))
        .post(handlers::create_person.layer(middleware::from_fn_with_state(
            self.create_person.clone(),
            admit,
        )));

        let person = get(handlers::get_person.layer(middleware::from_fn_with_state(
            self.get_person.clone(),
            admit,
        )))
        .put(handlers::update_person.layer(middleware::from_fn_with_state(
            self.update_person.clone(),
            admit,
        )))
        .delete(handlers::delete_person.layer(middleware::from_fn_with_state(
            self.delete_person.clone(),
            admit,
        )));

        Router::new()
            .route("/people", people)
            .route("/people/:id", person)
            .route("/health", get(handlers::health))
            .with_state(Arc::clone(&self.store))
            .layer(middleware::from_fn(log_request))
    }
}

/// Hold one permit of the route's policy for the duration of the handler.
async fn admit(State(limiter): State<RateLimiter>, request: Request, next: Next) -> Response {
    match limiter.acquire(1).await {
        Admission::Granted(lease) => {
            let response = next.run(request).await;
            drop(lease);
            response
        }
        Admission::Rejected(rejection) => {
            warn!(
                policy = %rejection.policy,
                reason = ?rejection.reason,
                path = %request.uri().path(),
                "Request rejected by rate limiter"
            );
            too_many_requests(&rejection)
        }
    }
}

fn too_many_requests(rejection: &Rejection) -> Response {
    let mut response = (
        StatusCode::TOO_MANY_REQUESTS,
        Json(json!({
            "error": "too_many_requests",
            "policy": rejection.policy,
        })),
    )
        .into_response();

    if let Some(retry_after) = rejection.retry_after {
        let seconds = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
        response
            .headers_mut()
            .insert(header::RETRY_AFTER, HeaderValue::from(seconds));
    }
    response
}

#[instrument(skip_all, fields(method = %request.method(), path = %request.uri().path()))]
async fn log_request(request: Request, next: Next) -> Response {
    let started = Instant::now();
    let response = next.run(request).await;

    info!(
        status = response.status().as_u16(),
        latency_ms = started.elapsed().as_millis() as u64,
        "Handled request"
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TurnstileError;
    use crate::ratelimit::{default_policies, RejectReason};
    use std::time::Duration;

    #[test]
    fn test_unknown_route_policy_fails() {
        let registry = PolicyRegistry::from_config(&default_policies()).unwrap();
        let routes = RouteConfig {
            create_person: "missing".to_string(),
            ..RouteConfig::default()
        };

        let result = Dispatcher::new(Arc::new(RecordStore::new()), &registry, &routes);
        assert!(matches!(result, Err(TurnstileError::UnknownPolicy(name)) if name == "missing"));
    }

    #[test]
    fn test_too_many_requests_sets_retry_after() {
        let rejection = Rejection {
            policy: "fixed".to_string(),
            reason: RejectReason::QueueFull,
            retry_after: Some(Duration::from_millis(2500)),
        };

        let response = too_many_requests(&rejection);
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "3");
    }

    #[test]
    fn test_too_many_requests_without_hint() {
        let rejection = Rejection {
            policy: "concurrency".to_string(),
            reason: RejectReason::QueueFull,
            retry_after: None,
        };

        let response = too_many_requests(&rejection);
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(response.headers().get(header::RETRY_AFTER).is_none());
    }
}
