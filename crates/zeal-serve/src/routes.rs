//! HTTP routes binding the transport to core operations.
//!
//! Repository-facing endpoints dispatch first-match-wins across the fixed
//! repository list. Handlers that touch SQLite or the filesystem run on
//! the blocking pool; the async side only shuffles bytes.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, put};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tracing::warn;
use zeal_core::{DocsRepo, Group};

use crate::state::SharedState;
use crate::ws;

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/index", get(index_root))
        .route("/index/{id}/repos", get(index_repos))
        .route("/repo/{id}/items", get(repo_items))
        .route("/item", get(installed_items).post(install_item))
        .route("/item/{id}", delete(remove_item))
        .route("/item/{docset}/symbols/{symbol_type}", get(docset_symbols))
        .route("/item/{docset}/chapters", get(docset_chapters_root))
        .route("/item/{docset}/chapters/{*path}", get(docset_chapters))
        .route("/search", get(ws::search))
        .route("/search/group/{id}", get(ws::search_group))
        .route("/download_progress", get(ws::download_progress))
        .route("/docs/{*path}", get(serve_doc))
        .route("/group", get(list_groups).post(create_group))
        .route("/group/{id}", put(update_group).delete(delete_group))
        .with_state(state)
}

fn core_error(err: zeal_core::Error) -> Response {
    if err.is_not_found() {
        (StatusCode::NOT_FOUND, err.to_string()).into_response()
    } else {
        (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
    }
}

async fn index_root() -> Response {
    Json(json!([{"name": "api.zealdocs.org", "id": 1}])).into_response()
}

async fn index_repos(Path(id): Path<String>) -> Response {
    if id == "1" {
        Json(json!([{"name": "com.kapeli", "id": 1}])).into_response()
    } else {
        StatusCode::NOT_FOUND.into_response()
    }
}

async fn repo_items(State(state): State<SharedState>, Path(id): Path<usize>) -> Response {
    // Repo ids 1..=3 are the Dash repositories, in registration order.
    if id == 0 || id > 3 || id > state.repos.len() {
        return StatusCode::NOT_FOUND.into_response();
    }
    let repo = Arc::clone(&state.repos[id - 1]);
    match tokio::task::spawn_blocking(move || repo.get_available_for_install()).await {
        Ok(Ok(items)) => Json(items).into_response(),
        Ok(Err(err)) => core_error(err),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct InstallRequest {
    #[serde(rename = "Id", alias = "id")]
    id: String,
    #[serde(rename = "Repo", alias = "repo", default)]
    repo: Option<String>,
}

async fn install_item(
    State(state): State<SharedState>,
    Json(request): Json<InstallRequest>,
) -> Response {
    let result = tokio::task::spawn_blocking(move || {
        for repo in &state.repos {
            if let Some(wanted) = &request.repo {
                if repo.name() != wanted {
                    continue;
                }
            }
            let index = Arc::clone(&state.index);
            let reindex_repo = Arc::clone(repo);
            let id = request.id.clone();
            let short_name = repo.start_docset_install_by_id(
                &request.id,
                Arc::clone(&state.progress),
                Box::new(move || {
                    if let Err(err) = reindex_repo.index_doc_by_id(&index, &id) {
                        warn!(%err, %id, "post-install reindex failed");
                    }
                }),
            );
            if !short_name.is_empty() {
                return Some(short_name);
            }
        }
        None
    })
    .await;
    match result {
        Ok(Some(short_name)) => short_name.into_response(),
        Ok(None) => (StatusCode::NOT_FOUND, "no repository can install this id").into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response(),
    }
}

async fn installed_items(State(state): State<SharedState>) -> Response {
    let result = tokio::task::spawn_blocking(move || {
        state
            .repos
            .iter()
            .flat_map(|repo| repo.get_installed())
            .collect::<Vec<_>>()
    })
    .await;
    match result {
        Ok(items) => Json(items).into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response(),
    }
}

async fn remove_item(State(state): State<SharedState>, Path(id): Path<String>) -> Response {
    let result = tokio::task::spawn_blocking(move || {
        state
            .repos
            .iter()
            .any(|repo| repo.remove_docset(&id, &state.index))
    })
    .await;
    match result {
        Ok(true) => StatusCode::OK.into_response(),
        Ok(false) => (StatusCode::NOT_FOUND, "docset not found").into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response(),
    }
}

async fn docset_symbols(
    State(state): State<SharedState>,
    Path((docset, symbol_type)): Path<(String, String)>,
) -> Response {
    let result = tokio::task::spawn_blocking(move || {
        state
            .repos
            .iter()
            .map(|repo| repo.get_symbols(&state.index, &docset, &symbol_type))
            .find(|symbols| !symbols.is_empty())
            .unwrap_or_default()
    })
    .await;
    match result {
        Ok(symbols) => Json(symbols).into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response(),
    }
}

async fn docset_chapters_root(
    state: State<SharedState>,
    Path(docset): Path<String>,
) -> Response {
    chapters_response(state.0, docset, String::new()).await
}

async fn docset_chapters(
    State(state): State<SharedState>,
    Path((docset, path)): Path<(String, String)>,
) -> Response {
    chapters_response(state, docset, path).await
}

async fn chapters_response(state: SharedState, docset: String, path: String) -> Response {
    let result = tokio::task::spawn_blocking(move || {
        state
            .repos
            .iter()
            .map(|repo| repo.get_chapters(&docset, &path))
            .find(|chapters| !chapters.is_empty())
            .unwrap_or_default()
    })
    .await;
    match result {
        Ok(chapters) => Json(chapters).into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response(),
    }
}

async fn serve_doc(State(state): State<SharedState>, Path(path): Path<String>) -> Response {
    let mime = content_type_for(&path);
    let result = tokio::task::spawn_blocking(move || -> Result<Vec<u8>, zeal_core::Error> {
        let mut last_err = zeal_core::Error::NotFound(path.clone());
        for repo in &state.repos {
            let mut body = Vec::new();
            match repo.get_page(&path, &mut body) {
                Ok(()) => return Ok(body),
                Err(err) if err.is_not_found() => last_err = err,
                Err(err) => return Err(err),
            }
        }
        Err(last_err)
    })
    .await;
    match result {
        Ok(Ok(body)) => ([(header::CONTENT_TYPE, mime)], body).into_response(),
        Ok(Err(err)) => core_error(err),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response(),
    }
}

fn content_type_for(path: &str) -> &'static str {
    match path.rsplit('.').next().unwrap_or("") {
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css",
        "js" => "text/javascript",
        "json" => "application/json",
        "png" => "image/png",
        "gif" => "image/gif",
        "jpg" | "jpeg" => "image/jpeg",
        "svg" => "image/svg+xml",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "txt" => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}

async fn list_groups(State(state): State<SharedState>) -> Response {
    let result = tokio::task::spawn_blocking(move || state.catalog.groups()).await;
    match result {
        Ok(Ok(groups)) => Json(groups).into_response(),
        Ok(Err(err)) => core_error(err),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response(),
    }
}

async fn create_group(
    State(state): State<SharedState>,
    Json(group): Json<Group>,
) -> Response {
    let result = tokio::task::spawn_blocking(move || {
        state
            .catalog
            .add_group(&group.icon, &group.name, &group.docs)
            .map(|id| Group { id, ..group })
    })
    .await;
    match result {
        Ok(Ok(group)) => Json(group).into_response(),
        Ok(Err(err)) => core_error(err),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response(),
    }
}

async fn update_group(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Json(group): Json<Group>,
) -> Response {
    let result = tokio::task::spawn_blocking(move || {
        state.catalog.update_group(&Group { id, ..group })
    })
    .await;
    match result {
        Ok(Ok(true)) => StatusCode::OK.into_response(),
        Ok(Ok(false)) => (StatusCode::NOT_FOUND, "group not found").into_response(),
        Ok(Err(err)) => core_error(err),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response(),
    }
}

async fn delete_group(State(state): State<SharedState>, Path(id): Path<i64>) -> Response {
    let result = tokio::task::spawn_blocking(move || state.catalog.delete_group(id)).await;
    match result {
        Ok(Ok(true)) => StatusCode::OK.into_response(),
        Ok(Ok(false)) => (StatusCode::NOT_FOUND, "group not found").into_response(),
        Ok(Err(err)) => core_error(err),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response(),
    }
}
