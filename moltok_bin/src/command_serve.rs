use anyhow::{Context, Result};
use axum::{
    extract::{Path as UrlPath, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use log::{info, warn};
use moltok::prelude::*;
use std::{
    path::{Component, Path, PathBuf},
    sync::Arc,
};

struct ServerState {
    query: TokenQuery,
    structures: PathBuf,
    static_dir: Option<PathBuf>,
}

/// Error answered as `{"error": "..."}`.
struct ApiError(StatusCode, String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(serde_json::json!({ "error": self.1 }))).into_response()
    }
}

impl From<QueryError> for ApiError {
    fn from(e: QueryError) -> Self {
        Self(StatusCode::NOT_FOUND, e.to_string())
    }
}

fn not_found(what: &str) -> ApiError {
    ApiError(StatusCode::NOT_FOUND, format!("no file {what}"))
}

const STRUCTURE_EXTENSIONS: [&str; 2] = ["xyz", "pdb"];

fn has_extension(name: &str, extensions: &[&str]) -> bool {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| extensions.contains(&e))
}

/// Relative path without `..`, root or prefix components.
fn is_plain_relative(path: &str) -> bool {
    !path.is_empty()
        && Path::new(path)
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
}

fn content_type(name: &str) -> &'static str {
    match Path::new(name).extension().and_then(|e| e.to_str()) {
        Some("html") => "text/html; charset=utf-8",
        Some("js") => "text/javascript",
        Some("css") => "text/css",
        Some("json") => "application/json",
        Some("xyz" | "pdb") => "text/plain",
        _ => "application/octet-stream",
    }
}

async fn read_file(dir: &Path, rel: &str) -> Result<Response, ApiError> {
    let bytes = tokio::fs::read(dir.join(rel))
        .await
        .map_err(|_| not_found(rel))?;
    Ok(([(header::CONTENT_TYPE, content_type(rel))], bytes).into_response())
}

async fn list_files(dir: &Path, extensions: &[&str]) -> Result<Json<Vec<String>>, ApiError> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| ApiError(StatusCode::NOT_FOUND, e.to_string()))?;
    let mut names = vec![];
    while let Ok(Some(entry)) = entries.next_entry().await {
        let name = entry.file_name().to_string_lossy().into_owned();
        if has_extension(&name, extensions) {
            names.push(name);
        }
    }
    names.sort();
    Ok(Json(names))
}

async fn list_structures(State(state): State<Arc<ServerState>>) -> Result<Json<Vec<String>>, ApiError> {
    list_files(&state.structures, &STRUCTURE_EXTENSIONS).await
}

/// Listing for the viewer, which parses every file as XYZ.
async fn list_xyz(State(state): State<Arc<ServerState>>) -> Result<Json<Vec<String>>, ApiError> {
    list_files(&state.structures, &["xyz"]).await
}

async fn get_structure(
    State(state): State<Arc<ServerState>>,
    UrlPath(name): UrlPath<String>,
) -> Result<Response, ApiError> {
    // Only plain file names inside the structure directory
    if name.contains(['/', '\\']) || name.starts_with('.') || !has_extension(&name, &STRUCTURE_EXTENSIONS) {
        return Err(not_found(&name));
    }
    read_file(&state.structures, &name).await
}

async fn get_tokens(
    State(state): State<Arc<ServerState>>,
    UrlPath(frame): UrlPath<usize>,
) -> Result<Json<FrameTokens>, ApiError> {
    let tokens = state.query.frame(frame).inspect_err(|e| warn!("Frame {frame}: {e}"))?;
    Ok(Json(tokens))
}

async fn get_index(State(state): State<Arc<ServerState>>) -> Result<Response, ApiError> {
    let dir = state.static_dir.as_deref().ok_or_else(|| not_found("index.html"))?;
    read_file(dir, "index.html").await
}

async fn get_static(
    State(state): State<Arc<ServerState>>,
    UrlPath(path): UrlPath<String>,
) -> Result<Response, ApiError> {
    let dir = state.static_dir.as_deref().ok_or_else(|| not_found(&path))?;
    if !is_plain_relative(&path) {
        return Err(not_found(&path));
    }
    read_file(&dir.join("static"), &path).await
}

fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/", get(get_index))
        .route("/static/*path", get(get_static))
        .route("/structures", get(list_structures))
        .route("/structures/:name", get(get_structure))
        // Routes used by the web viewer
        .route("/xyz_files", get(list_xyz))
        .route("/xyz/:name", get(get_structure))
        .route("/tokens/:frame", get(get_tokens))
        .with_state(state)
}

pub(super) fn command_serve(
    token_map: &Path,
    structures: &Path,
    static_dir: Option<&Path>,
    addr: &str,
) -> Result<()> {
    let query = TokenQuery::load(token_map)
        .with_context(|| format!("loading token map '{}'", token_map.display()))?;
    info!(
        "Loaded tokens of {} frames from '{}'",
        query.token_map().len(),
        token_map.display()
    );

    let state = Arc::new(ServerState {
        query,
        structures: structures.to_owned(),
        static_dir: static_dir.map(Path::to_owned),
    });

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    rt.block_on(async {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("binding to {addr}"))?;
        info!("Listening on http://{addr}");
        axum::serve(listener, router(state)).await?;
        Ok::<_, anyhow::Error>(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    fn state(dir: &Path, static_dir: Option<&Path>) -> Arc<ServerState> {
        let map: TokenMap = [(
            0usize,
            [(10, TokenEntry { token: 7 }), (11, TokenEntry { token: 3 })]
                .into_iter()
                .collect(),
        )]
        .into_iter()
        .collect();
        Arc::new(ServerState {
            query: TokenQuery::new(map),
            structures: dir.to_owned(),
            static_dir: static_dir.map(Path::to_owned),
        })
    }

    async fn body_json(resp: Response) -> anyhow::Result<serde_json::Value> {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    #[tokio::test]
    async fn tokens_route() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let st = state(dir.path(), None);

        let ok = get_tokens(State(st.clone()), UrlPath(0)).await.into_response();
        assert_eq!(ok.status(), StatusCode::OK);
        let v = body_json(ok).await?;
        assert_eq!(v["tokenMin"], 3);
        assert_eq!(v["tokenMax"], 7);
        assert_eq!(v["frameData"]["10"]["token"], 7);

        let missing = get_tokens(State(st), UrlPath(5)).await.into_response();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(missing).await?["error"], "no data for frame 5");
        Ok(())
    }

    #[tokio::test]
    async fn structure_routes() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::write(dir.path().join("frame_0.xyz"), "1\n\nC 0 0 0\n")?;
        std::fs::write(dir.path().join("frame_0.pdb"), "END\n")?;
        std::fs::write(dir.path().join("notes.txt"), "")?;
        let st = state(dir.path(), None);

        let Json(names) = list_structures(State(st.clone()))
            .await
            .map_err(|e| anyhow::anyhow!(e.1))?;
        assert_eq!(names, vec!["frame_0.pdb", "frame_0.xyz"]);

        let Json(names) = list_xyz(State(st.clone()))
            .await
            .map_err(|e| anyhow::anyhow!(e.1))?;
        assert_eq!(names, vec!["frame_0.xyz"]);

        let ok = get_structure(State(st.clone()), UrlPath("frame_0.xyz".into()))
            .await
            .into_response();
        assert_eq!(ok.status(), StatusCode::OK);
        let body = to_bytes(ok.into_body(), usize::MAX).await?;
        assert_eq!(&body[..], b"1\n\nC 0 0 0\n");

        for bad in ["../frame_0.xyz", "notes.txt", "frame_9.xyz"] {
            let resp = get_structure(State(st.clone()), UrlPath(bad.into()))
                .await
                .into_response();
            assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        }

        // No static directory configured
        let resp = get_index(State(st)).await.into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        Ok(())
    }

    #[tokio::test]
    async fn viewer_assets() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let web = tempfile::tempdir()?;
        std::fs::create_dir_all(web.path().join("static/js"))?;
        std::fs::write(web.path().join("index.html"), "<html></html>")?;
        std::fs::write(web.path().join("static/js/main.js"), "loadXYZFiles();")?;
        std::fs::write(dir.path().join("secret.js"), "")?;
        let st = state(dir.path(), Some(web.path()));

        let index = get_index(State(st.clone())).await.into_response();
        assert_eq!(index.status(), StatusCode::OK);
        assert_eq!(
            index.headers()[header::CONTENT_TYPE],
            "text/html; charset=utf-8"
        );

        let js = get_static(State(st.clone()), UrlPath("js/main.js".into()))
            .await
            .into_response();
        assert_eq!(js.status(), StatusCode::OK);
        assert_eq!(js.headers()[header::CONTENT_TYPE], "text/javascript");
        let body = to_bytes(js.into_body(), usize::MAX).await?;
        assert_eq!(&body[..], b"loadXYZFiles();");

        for bad in ["../index.html", "/etc/passwd", "js/missing.js"] {
            let resp = get_static(State(st.clone()), UrlPath(bad.into()))
                .await
                .into_response();
            assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        }
        Ok(())
    }
}
