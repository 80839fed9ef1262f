//! REST API endpoints — each maps one request onto one service call.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use emoticon_core::types::{ActorContext, Outcome};

use super::AppState;

/// Header carrying the caller's display name.
pub const ACTOR_HEADER: &str = "x-actor";

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/emoticons", get(search).post(upload))
        .route(
            "/api/emoticons/{name}",
            get(fetch).put(update).delete(delete),
        )
        .route("/api/emoticons/{name}/content", get(content))
        .route("/api/emoticons/{name}/duplicate", post(duplicate))
        .route("/api/emoticons/{name}/equivalents", get(equivalents))
        .route("/api/emoticons/{name}/group", get(group))
        .route("/api/emoticons/{name}/history", get(history))
        .route("/api/names", get(names))
}

/// Who is calling, and the request line that stands in for their command.
pub fn actor_from(headers: &HeaderMap, method: &Method, uri: &Uri) -> ActorContext {
    let author = headers
        .get(ACTOR_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or("anonymous");
    ActorContext::new(author, format!("{} {}", method, uri))
}

/// `{"ok", "code", "result" | "error"}` for any outcome.
pub fn render<T: Serialize>(outcome: Outcome<T>) -> Json<Value> {
    let code = outcome.code();
    match outcome {
        Outcome::Ok(v) => Json(json!({"ok": true, "code": code, "result": v})),
        Outcome::Conflict => Json(json!({"ok": false, "code": code, "error": "name already exists"})),
        Outcome::NotFound => Json(json!({"ok": false, "code": code, "error": "not found"})),
        Outcome::InternalError(e) => {
            Json(json!({"ok": false, "code": code, "error": format!("internal error: {}", e)}))
        }
    }
}

fn disabled(state: &AppState) -> Option<Json<Value>> {
    if state.service.config().emoticon_enabled {
        None
    } else {
        Some(Json(json!({"ok": false, "error": "emoticons are disabled"})))
    }
}

fn required(field: &str, value: Option<&str>) -> Result<String, Json<Value>> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(Json(json!({"ok": false, "error": format!("{} is required", field)}))),
    }
}

// --- Upload / search ---

#[derive(Deserialize)]
struct UploadBody {
    name: Option<String>,
    url: Option<String>,
}

async fn upload(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    method: Method,
    uri: Uri,
    Json(body): Json<UploadBody>,
) -> Json<Value> {
    if let Some(off) = disabled(&state) {
        return off;
    }
    let name = match required("name", body.name.as_deref()) {
        Ok(n) => n,
        Err(e) => return e,
    };
    let url = match required("url", body.url.as_deref()) {
        Ok(u) => u,
        Err(e) => return e,
    };
    let ctx = actor_from(&headers, &method, &uri);
    render(state.service.upload(&ctx, &name, &url).await.map(|r| r.name))
}

#[derive(Deserialize)]
struct SearchQuery {
    search: Option<String>,
}

async fn search(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    method: Method,
    uri: Uri,
    Query(q): Query<SearchQuery>,
) -> Json<Value> {
    if let Some(off) = disabled(&state) {
        return off;
    }
    let ctx = actor_from(&headers, &method, &uri);
    let pattern = q.search.unwrap_or_default();
    render(state.service.search(&ctx, &pattern).await)
}

// --- Single emoticon ---

async fn fetch(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    method: Method,
    uri: Uri,
    Path(name): Path<String>,
) -> Json<Value> {
    if let Some(off) = disabled(&state) {
        return off;
    }
    let ctx = actor_from(&headers, &method, &uri);
    render(
        state
            .service
            .fetch(&ctx, &name)
            .await
            .map(|p| p.to_string_lossy().to_string()),
    )
}

async fn content(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    method: Method,
    uri: Uri,
    Path(name): Path<String>,
) -> Response {
    if let Some(off) = disabled(&state) {
        return (StatusCode::SERVICE_UNAVAILABLE, off).into_response();
    }
    let ctx = actor_from(&headers, &method, &uri);
    match state.service.content(&ctx, &name).await {
        Outcome::Ok((path, bytes)) => {
            ([(header::CONTENT_TYPE, mime_for(&path))], bytes).into_response()
        }
        Outcome::NotFound => {
            (StatusCode::NOT_FOUND, render(Outcome::<()>::NotFound)).into_response()
        }
        other => (StatusCode::INTERNAL_SERVER_ERROR, render(other.map(|_| ()))).into_response(),
    }
}

fn mime_for(path: &std::path::Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        _ => "application/octet-stream",
    }
}

#[derive(Deserialize)]
struct UpdateBody {
    url: Option<String>,
}

async fn update(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    method: Method,
    uri: Uri,
    Path(name): Path<String>,
    Json(body): Json<UpdateBody>,
) -> Json<Value> {
    if let Some(off) = disabled(&state) {
        return off;
    }
    let url = match required("url", body.url.as_deref()) {
        Ok(u) => u,
        Err(e) => return e,
    };
    let ctx = actor_from(&headers, &method, &uri);
    render(state.service.update(&ctx, &name, &url).await)
}

async fn delete(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    method: Method,
    uri: Uri,
    Path(name): Path<String>,
) -> Json<Value> {
    if let Some(off) = disabled(&state) {
        return off;
    }
    let ctx = actor_from(&headers, &method, &uri);
    render(state.service.delete(&ctx, &name).await.map(|r| r.name))
}

#[derive(Deserialize)]
struct DuplicateBody {
    target: Option<String>,
}

async fn duplicate(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    method: Method,
    uri: Uri,
    Path(name): Path<String>,
    Json(body): Json<DuplicateBody>,
) -> Json<Value> {
    if let Some(off) = disabled(&state) {
        return off;
    }
    let target = match required("target", body.target.as_deref()) {
        Ok(t) => t,
        Err(e) => return e,
    };
    let ctx = actor_from(&headers, &method, &uri);
    render(
        state
            .service
            .duplicate(&ctx, &name, &target)
            .await
            .map(|r| r.name),
    )
}

// --- Group views ---

async fn equivalents(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Json<Value> {
    if let Some(off) = disabled(&state) {
        return off;
    }
    render(state.service.get_equivalents(&name).await)
}

async fn group(State(state): State<Arc<AppState>>, Path(name): Path<String>) -> Json<Value> {
    if let Some(off) = disabled(&state) {
        return off;
    }
    render(
        state
            .service
            .group(&name)
            .await
            .map(|members| members.into_iter().map(|m| m.name).collect::<Vec<_>>()),
    )
}

async fn history(State(state): State<Arc<AppState>>, Path(name): Path<String>) -> Json<Value> {
    if let Some(off) = disabled(&state) {
        return off;
    }
    Json(json!(state.service.history(&name).await))
}

async fn names(State(state): State<Arc<AppState>>) -> Json<Value> {
    if let Some(off) = disabled(&state) {
        return off;
    }
    render(state.service.list_names().await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use emoticon_core::config::Config;
    use emoticon_core::service::EmoticonService;
    use tower::ServiceExt;

    async fn app(config: Config) -> Router {
        let service = EmoticonService::open(config).await.unwrap();
        super::super::router(Arc::new(AppState {
            service: Arc::new(service),
        }))
    }

    async fn body_json(resp: Response) -> Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_render_codes() {
        assert_eq!(render(Outcome::Ok("x")).0["code"], 1);
        assert_eq!(render(Outcome::<()>::Conflict).0["code"], -1);
        assert_eq!(render(Outcome::<()>::NotFound).0["code"], -2);
        let internal = render(Outcome::<()>::InternalError("disk".into())).0;
        assert_eq!(internal["code"], 0);
        assert_eq!(internal["ok"], false);
    }

    #[test]
    fn test_actor_from_header() {
        let mut headers = HeaderMap::new();
        headers.insert(ACTOR_HEADER, "carol#42".parse().unwrap());
        let uri: Uri = "/api/emoticons/smile".parse().unwrap();
        let ctx = actor_from(&headers, &Method::GET, &uri);
        assert_eq!(ctx.author, "carol#42");
        assert_eq!(ctx.content, "GET /api/emoticons/smile");

        let anon = actor_from(&HeaderMap::new(), &Method::GET, &uri);
        assert_eq!(anon.author, "anonymous");
    }

    #[tokio::test]
    async fn test_names_empty_and_fetch_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let app = app(Config::rooted_at(tmp.path())).await;

        let resp = app
            .clone()
            .oneshot(Request::get("/api/names").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(body_json(resp).await, json!({"ok": true, "code": 1, "result": []}));

        let resp = app
            .oneshot(
                Request::get("/api/emoticons/ghost")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(body_json(resp).await["code"], -2);
    }

    #[tokio::test]
    async fn test_disabled_flag_refuses_commands() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config {
            emoticon_enabled: false,
            ..Config::rooted_at(tmp.path())
        };
        let app = app(config).await;
        for route in ["/api/names", "/api/emoticons/smile/history"] {
            let resp = app
                .clone()
                .oneshot(Request::get(route).body(Body::empty()).unwrap())
                .await
                .unwrap();
            let body = body_json(resp).await;
            assert_eq!(body["ok"], false, "{}", route);
            assert_eq!(body["error"], "emoticons are disabled");
        }
    }

    #[tokio::test]
    async fn test_upload_requires_url() {
        let tmp = tempfile::tempdir().unwrap();
        let app = app(Config::rooted_at(tmp.path())).await;
        let resp = app
            .oneshot(
                Request::post("/api/emoticons")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"name":"smile"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(body_json(resp).await["error"], "url is required");
    }
}
