//! Axum router construction.
//!
//! Builds the full application router with all route groups and middleware
//! layers. Thumbnails and media routes are public; catalog management sits
//! under `/api`.

use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::context::AppContext;
use crate::routes;

/// Build the complete Axum router.
pub fn build_router(ctx: AppContext) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Catalog management.
    let api = Router::new()
        .route("/videos", get(routes::videos::list_videos))
        .route("/videos", post(routes::videos::create_video))
        .route("/videos/{id}", delete(routes::videos::delete_video))
        .route(
            "/videos/{id}/preview/retranscode",
            post(routes::videos::retranscode_preview),
        );

    // Player-facing media routes. The static `index.m3u8` segment takes
    // precedence over the dynamic `{segment}` match.
    let media = Router::new()
        .route(
            "/video/{id}/{resolution}/index.m3u8",
            get(routes::streaming::get_playlist),
        )
        .route(
            "/video/{id}/{resolution}/{segment}",
            get(routes::streaming::get_segment),
        )
        .route(
            "/preview/{id}/index.m3u8",
            get(routes::previews::get_preview_playlist),
        )
        .route(
            "/preview/{id}/{segment}",
            get(routes::previews::get_preview_segment),
        )
        .route(
            "/thumbnail/{video_dir}/thumbnail.jpg",
            get(routes::thumbnails::get_thumbnail),
        );

    Router::new()
        .route("/health", get(routes::health_check))
        .nest("/api", api)
        .merge(media)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(ctx)
}
