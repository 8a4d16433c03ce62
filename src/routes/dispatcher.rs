//! Routes upgrade requests on the shared listener to the owning service.

use crate::error::UpgradeError;
use crate::metrics;
use actix_web::{http::StatusCode, web, HttpRequest, HttpResponse};
use async_trait::async_trait;
use futures::FutureExt;
use serde_json::json;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// A real-time service reachable through the dispatcher.
///
/// Services authenticate for themselves; the dispatcher only picks one.
#[async_trait(?Send)]
pub trait RealtimeService: Send + Sync {
    fn name(&self) -> &'static str;

    fn path(&self) -> &str;

    fn matches(&self, path: &str) -> bool {
        path.trim_end_matches('/') == self.path()
    }

    async fn accept_connection(
        &self,
        req: &HttpRequest,
        payload: web::Payload,
    ) -> Result<HttpResponse, UpgradeError>;
}

#[derive(Default, Clone)]
pub struct UpgradeDispatcher {
    services: Vec<Arc<dyn RealtimeService>>,
}

impl UpgradeDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a service. Refused when its path overlaps an existing service.
    pub fn register(&mut self, service: Arc<dyn RealtimeService>) -> Result<(), String> {
        if let Some(existing) = self
            .services
            .iter()
            .find(|s| s.matches(service.path()) || service.matches(s.path()))
        {
            return Err(format!(
                "{} at {} overlaps {} at {}",
                service.name(),
                service.path(),
                existing.name(),
                existing.path()
            ));
        }
        tracing::info!(service = service.name(), path = service.path(), "registered realtime service");
        self.services.push(service);
        Ok(())
    }

    pub fn services(&self) -> impl Iterator<Item = &Arc<dyn RealtimeService>> {
        self.services.iter()
    }

    pub async fn dispatch(&self, req: HttpRequest, payload: web::Payload) -> HttpResponse {
        let path = req.path().to_string();
        let mut candidates = self.services.iter().filter(|s| s.matches(&path));

        let service = match (candidates.next(), candidates.next()) {
            (Some(service), None) => service.clone(),
            (None, _) => {
                tracing::debug!(path = %path, "no realtime service for path");
                return reject("no_route", StatusCode::NOT_FOUND);
            }
            (Some(first), Some(second)) => {
                tracing::error!(
                    path = %path,
                    first = first.name(),
                    second = second.name(),
                    "ambiguous realtime route"
                );
                return reject("ambiguous_route", StatusCode::INTERNAL_SERVER_ERROR);
            }
        };

        let accepted = AssertUnwindSafe(service.accept_connection(&req, payload))
            .catch_unwind()
            .await;

        match accepted {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                tracing::warn!(
                    service = service.name(),
                    path = %path,
                    error = %e,
                    "upgrade rejected"
                );
                reject(e.reason(), e.status())
            }
            Err(_) => {
                tracing::error!(service = service.name(), path = %path, "service panicked during accept");
                reject("panic", StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }
}

fn reject(reason: &str, status: StatusCode) -> HttpResponse {
    metrics::UPGRADE_REJECTIONS_TOTAL
        .with_label_values(&[reason])
        .inc();
    HttpResponse::build(status)
        .force_close()
        .json(json!({ "success": false, "error": reason }))
}

/// Default service: everything the HTTP routes did not claim.
pub async fn dispatch_upgrade(
    req: HttpRequest,
    payload: web::Payload,
    dispatcher: web::Data<UpgradeDispatcher>,
) -> HttpResponse {
    dispatcher.dispatch(req, payload).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AuthError;
    use actix_web::{test, App};

    struct Fake {
        name: &'static str,
        path: &'static str,
        outcome: fn() -> Result<HttpResponse, UpgradeError>,
    }

    #[async_trait(?Send)]
    impl RealtimeService for Fake {
        fn name(&self) -> &'static str {
            self.name
        }

        fn path(&self) -> &str {
            self.path
        }

        async fn accept_connection(
            &self,
            _req: &HttpRequest,
            _payload: web::Payload,
        ) -> Result<HttpResponse, UpgradeError> {
            (self.outcome)()
        }
    }

    fn accepting(name: &'static str, path: &'static str) -> Arc<dyn RealtimeService> {
        Arc::new(Fake {
            name,
            path,
            outcome: || Ok(HttpResponse::Ok().body("accepted")),
        })
    }

    fn dispatcher() -> UpgradeDispatcher {
        let mut dispatcher = UpgradeDispatcher::new();
        dispatcher.register(accepting("chat", "/ws/chat")).unwrap();
        dispatcher.register(accepting("meeting", "/ws/meeting")).unwrap();
        dispatcher
            .register(Arc::new(Fake {
                name: "locked",
                path: "/ws/locked",
                outcome: || Err(UpgradeError::Auth(AuthError::Missing)),
            }))
            .unwrap();
        dispatcher
            .register(Arc::new(Fake {
                name: "broken",
                path: "/ws/broken",
                outcome: || panic!("boom"),
            }))
            .unwrap();
        dispatcher
    }

    #[actix_web::test]
    async fn test_overlapping_paths_are_refused() {
        let mut dispatcher = UpgradeDispatcher::new();
        dispatcher.register(accepting("chat", "/ws/chat")).unwrap();
        assert!(dispatcher.register(accepting("other", "/ws/chat")).is_err());
        assert_eq!(dispatcher.services().count(), 1);
    }

    #[actix_web::test]
    async fn test_routes_by_path() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(dispatcher()))
                .default_service(web::to(dispatch_upgrade)),
        )
        .await;

        let resp = test::call_service(&app, test::TestRequest::get().uri("/ws/chat").to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = test::call_service(
            &app,
            test::TestRequest::get().uri("/ws/meeting?room=a").to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[actix_web::test]
    async fn test_unmatched_path_is_refused() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(dispatcher()))
                .default_service(web::to(dispatch_upgrade)),
        )
        .await;

        let resp = test::call_service(&app, test::TestRequest::get().uri("/ws/unknown").to_request()).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_service_errors_are_contained() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(dispatcher()))
                .default_service(web::to(dispatch_upgrade)),
        )
        .await;

        let resp = test::call_service(&app, test::TestRequest::get().uri("/ws/locked").to_request()).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let resp = test::call_service(&app, test::TestRequest::get().uri("/ws/broken").to_request()).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

        // the app keeps serving after a panicking service
        let resp = test::call_service(&app, test::TestRequest::get().uri("/ws/chat").to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
