//! Route configuration.

use crate::auth::auth_middleware;
use crate::handlers;
use crate::metrics::metrics_handler;
use crate::state::AppState;
use axum::Router;
use axum::middleware;
use axum::routing::{get, post, put};
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        // Status (intentionally unauthenticated for load balancers/k8s probes)
        .route("/v1/status", get(handlers::status))
        // Tenants
        .route("/v1/tenant", get(handlers::list_tenants))
        .route(
            "/v1/tenant/{tenant}",
            post(handlers::register_tenant).get(handlers::get_tenant),
        )
        // Subprojects
        .route(
            "/v1/subproject/tenant/{tenant}",
            get(handlers::list_subprojects),
        )
        .route(
            "/v1/subproject/tenant/{tenant}/subproject/{subproject}",
            post(handlers::create_subproject)
                .get(handlers::get_subproject)
                .patch(handlers::patch_subproject)
                .delete(handlers::delete_subproject),
        );

    let dataset_routes = Router::new()
        .route(
            "/v1/dataset/tenant/{tenant}/subproject/{subproject}",
            get(handlers::list_datasets),
        )
        .route(
            "/v1/dataset/tenant/{tenant}/subproject/{subproject}/content",
            get(handlers::list_content),
        )
        .route(
            "/v1/dataset/tenant/{tenant}/subproject/{subproject}/exist",
            post(handlers::datasets_exist),
        )
        .route(
            "/v1/dataset/tenant/{tenant}/subproject/{subproject}/sizes",
            post(handlers::dataset_sizes),
        )
        .route(
            "/v1/dataset/tenant/{tenant}/subproject/{subproject}/dataset/{dataset}",
            post(handlers::register_dataset)
                .get(handlers::get_dataset)
                .patch(handlers::patch_dataset)
                .delete(handlers::delete_dataset),
        )
        .route(
            "/v1/dataset/tenant/{tenant}/subproject/{subproject}/dataset/{dataset}/lock",
            put(handlers::lock_dataset),
        )
        .route(
            "/v1/dataset/tenant/{tenant}/subproject/{subproject}/dataset/{dataset}/unlock",
            put(handlers::unlock_dataset),
        )
        .route(
            "/v1/dataset/tenant/{tenant}/subproject/{subproject}/dataset/{dataset}/ctagcheck",
            get(handlers::check_ctag),
        )
        .route(
            "/v1/dataset/tenant/{tenant}/subproject/{subproject}/dataset/{dataset}/permission",
            get(handlers::dataset_permissions),
        )
        .route(
            "/v1/dataset/tenant/{tenant}/subproject/{subproject}/dataset/{dataset}/gtags",
            put(handlers::put_gtags),
        )
        .route(
            "/v1/dataset/tenant/{tenant}/subproject/{subproject}/dataset/{dataset}/signed-url",
            get(handlers::signed_url),
        );

    // Signed object access; the signature replaces the bearer token.
    let blob_routes = Router::new().route(
        "/blob/{bucket}/{*object}",
        get(handlers::download_blob).put(handlers::upload_blob),
    );

    let mut router = Router::new()
        .merge(api_routes)
        .merge(dataset_routes)
        .merge(blob_routes);

    // Conditionally add metrics endpoint based on config.
    // SECURITY: When enabled, this endpoint MUST be network-restricted
    // to authorized Prometheus scraper IPs only.
    // See crate::metrics module documentation for details.
    if state.config.server.metrics_enabled {
        let metrics_routes = Router::new().route("/metrics", get(metrics_handler));
        router = router.merge(metrics_routes);
    }

    // Order of execution: TraceLayer -> Auth -> Handler
    router
        // Auth middleware (resolves the bearer token and sets the AuthenticatedUser extension)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
