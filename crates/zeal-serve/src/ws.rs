//! WebSocket endpoints: streaming search and install progress.
//!
//! Search protocol: each client text frame is a query (up to 1024 bytes,
//! trailing NULs trimmed). Per query the server sends a single `" "`
//! framing sentinel, then one JSON object per result, then a final
//! `"<queryId>;<duration>"` frame. The final frame is only sent if the
//! query was not superseded by a newer one on the same socket.

use std::cell::Cell;
use std::collections::HashSet;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tokio::sync::mpsc;
use tracing::debug;
use zeal_core::Searcher;

use crate::state::SharedState;

/// Longest accepted query, in bytes.
const MAX_QUERY_LEN: usize = 1024;

pub async fn search(ws: WebSocketUpgrade, State(state): State<SharedState>) -> Response {
    ws.on_upgrade(move |socket| search_loop(socket, state, None))
}

pub async fn search_group(
    ws: WebSocketUpgrade,
    Path(id): Path<i64>,
    State(state): State<SharedState>,
) -> Response {
    let lookup = {
        let state = Arc::clone(&state);
        tokio::task::spawn_blocking(move || state.catalog.group_by_id(id)).await
    };
    let scope: HashSet<String> = match lookup {
        Ok(Ok(Some(group))) => group.docs.into_iter().collect(),
        Ok(Ok(None)) => return (StatusCode::NOT_FOUND, "group not found").into_response(),
        Ok(Err(err)) => {
            return (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
        },
        Err(err) => return (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response(),
    };
    ws.on_upgrade(move |socket| search_loop(socket, state, Some(scope)))
}

async fn search_loop(mut socket: WebSocket, state: SharedState, scope: Option<HashSet<String>>) {
    // One preemption counter per connection: a new frame supersedes the
    // query currently streaming on this socket, nobody else's.
    let searcher = Searcher::new(Arc::clone(&state.index), Arc::new(AtomicUsize::new(0)));
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    loop {
        tokio::select! {
            incoming = socket.recv() => {
                let Some(Ok(message)) = incoming else { break };
                let query = match message {
                    Message::Text(text) => text.as_str().trim_matches('\0').to_string(),
                    Message::Binary(bytes) => String::from_utf8_lossy(&bytes)
                        .trim_matches('\0')
                        .to_string(),
                    Message::Close(_) => break,
                    _ => continue,
                };
                let query = clamp_query(query);
                debug!(%query, "search query received");

                let searcher = searcher.clone();
                let tx = tx.clone();
                let scope = scope.clone();
                tokio::task::spawn_blocking(move || {
                    run_query(&searcher, &query, scope.as_ref(), &tx);
                });
            },
            outgoing = rx.recv() => {
                // The sender half lives in this loop, so recv never yields None.
                let Some(message) = outgoing else { break };
                if socket.send(message).await.is_err() {
                    break;
                }
            },
        }
    }
}

fn clamp_query(mut query: String) -> String {
    if query.len() > MAX_QUERY_LEN {
        let mut end = MAX_QUERY_LEN;
        while !query.is_char_boundary(end) {
            end -= 1;
        }
        query.truncate(end);
    }
    query
}

fn run_query(
    searcher: &Searcher,
    query: &str,
    scope: Option<&HashSet<String>>,
    tx: &mpsc::UnboundedSender<Message>,
) {
    let first = Cell::new(true);
    searcher.search_all_docs(
        query,
        scope,
        |result| {
            if first.replace(false) {
                let _ = tx.send(Message::Text(" ".into()));
            }
            if let Ok(body) = serde_json::to_string(&result) {
                let _ = tx.send(Message::Text(body.into()));
            }
        },
        |query_id, elapsed| {
            if first.get() {
                let _ = tx.send(Message::Text(" ".into()));
            }
            let _ = tx.send(Message::Text(format!("{query_id};{elapsed:?}").into()));
        },
    );
}

pub async fn download_progress(ws: WebSocketUpgrade, State(state): State<SharedState>) -> Response {
    ws.on_upgrade(move |socket| progress_loop(socket, state))
}

async fn progress_loop(mut socket: WebSocket, state: SharedState) {
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let subscription = state.progress.add(Box::new(move |event| {
        if let Ok(body) = serde_json::to_string(event) {
            let _ = tx.send(body);
        }
    }));

    loop {
        tokio::select! {
            incoming = socket.recv() => {
                match incoming {
                    None | Some(Err(_)) | Some(Ok(Message::Close(_))) => break,
                    _ => {},
                }
            },
            event = rx.recv() => {
                let Some(body) = event else { break };
                if socket.send(Message::Text(body.into())).await.is_err() {
                    break;
                }
            },
        }
    }
    state.progress.remove(subscription);
}
