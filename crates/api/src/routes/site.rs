//! Static website files and the JSON 404 for everything else.

use axum::{handler::HandlerWithoutStateExt, http::StatusCode, Json, Router};
use serde_json::{json, Value};
use tower_http::services::ServeDir;

/// Serves `public_dir` as-is. Directory paths (including `/`) resolve to
/// their `index.html`; misses of any method get [`not_found`].
pub fn public_files<S>(public_dir: &str) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    let files = ServeDir::new(public_dir)
        .append_index_html_on_directories(true)
        .call_fallback_on_method_not_allowed(true)
        .not_found_service(not_found.into_service());

    Router::new().fallback_service(files)
}

pub async fn not_found() -> (StatusCode, Json<Value>) {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "Not found" })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request};
    use tower::ServiceExt;

    fn temp_site() -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("websited-site-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("index.html"), "<h1>Websited</h1>").unwrap();
        std::fs::write(dir.join("styles.css"), "body{}").unwrap();
        dir
    }

    #[tokio::test]
    async fn test_root_serves_index() {
        let dir = temp_site();
        let app: Router = public_files(dir.to_str().unwrap());

        let response = app
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"<h1>Websited</h1>");
    }

    #[tokio::test]
    async fn test_existing_asset_is_served() {
        let dir = temp_site();
        let app: Router = public_files(dir.to_str().unwrap());

        let response = app
            .oneshot(Request::get("/styles.css").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_missing_path_is_json_404() {
        let dir = temp_site();
        let app: Router = public_files(dir.to_str().unwrap());

        let response = app
            .oneshot(Request::get("/nope.html").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "Not found");
    }

    #[tokio::test]
    async fn test_unknown_post_is_json_404() {
        let dir = temp_site();
        let app: Router = public_files(dir.to_str().unwrap());

        let response = app
            .oneshot(
                Request::post("/api/unknown")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
