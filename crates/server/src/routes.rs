//! Route configuration.

use crate::handlers;
use crate::state::AppState;
use axum::Router;
use axum::routing::{any, get, post, put};
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Liveness (intentionally unauthenticated, never proxied)
        .route("/healthz", get(handlers::health_check))
        // Decrypting downloads
        .route("/d/{*path}", get(handlers::download::download))
        .route("/p/{*path}", get(handlers::download::download))
        .route("/redirect/{key}", get(handlers::download::redirect))
        // Intercepted Alist API surface
        .route("/api/fs/list", post(handlers::fs::fs_list))
        .route("/api/fs/get", post(handlers::fs::fs_get))
        .route("/api/fs/put", put(handlers::fs::fs_put))
        .route("/api/fs/remove", post(handlers::fs::fs_remove))
        .route("/api/fs/rename", post(handlers::fs::fs_rename))
        .route("/api/fs/move", post(handlers::fs::fs_move))
        .route("/api/fs/copy", post(handlers::fs::fs_copy))
        // WebDAV (dispatches on method, including the extension methods)
        .route("/dav", any(handlers::webdav::dispatch))
        .route("/dav/", any(handlers::webdav::dispatch))
        .route("/dav/{*path}", any(handlers::webdav::dispatch))
        // Everything else passes through (with 302 interception)
        .fallback(handlers::proxy::fallback)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
