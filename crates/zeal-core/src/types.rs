//! Wire-level data structures shared by the repositories and the transport.
//!
//! Serialized field names are PascalCase to match the catalog JSON stored in
//! `zealcore_cache.sqlite3` and the payloads the web UI consumes; aliases
//! accept the camelCase spellings used by the upstream mirrors.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Extra per-docset metadata carried by the upstream catalog.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RepoItemExtra {
    #[serde(rename = "IndexFilePath", alias = "indexFilePath")]
    pub index_file_path: String,
}

/// One installable (or installed) docset as described by a repository
/// catalog.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RepoItem {
    #[serde(rename = "SourceId", alias = "sourceId")]
    pub source_id: String,
    #[serde(rename = "Name", alias = "name")]
    pub name: String,
    #[serde(rename = "Title", alias = "title")]
    pub title: String,
    #[serde(rename = "Versions", alias = "versions")]
    pub versions: Vec<String>,
    #[serde(rename = "Revision", alias = "revision")]
    pub revision: String,
    #[serde(rename = "Icon", alias = "icon")]
    pub icon: String,
    #[serde(rename = "Icon2x", alias = "icon2x")]
    pub icon2x: String,
    #[serde(rename = "Language", alias = "language")]
    pub language: String,
    #[serde(rename = "Extra", alias = "extra")]
    pub extra: RepoItemExtra,
    /// Catalog row id; assigned locally, not by the upstream mirror.
    #[serde(rename = "Id", alias = "id")]
    pub id: String,
    #[serde(rename = "Archive", alias = "archive")]
    pub archive: String,
    #[serde(rename = "ContribRepoKey", alias = "contribRepoKey")]
    pub contrib_repo_key: String,
    /// Normalized type label -> number of indexed symbols, memoized at
    /// import time.
    #[serde(rename = "SymbolCounts", alias = "symbolCounts")]
    pub symbol_counts: BTreeMap<String, u64>,
}

/// A single ranked search hit streamed over the search socket.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    #[serde(rename = "QueryId")]
    pub query_id: usize,
    #[serde(rename = "Score")]
    pub score: i32,
    #[serde(rename = "Type")]
    pub symbol_type: String,
    #[serde(rename = "Res")]
    pub name: String,
    #[serde(rename = "Path")]
    pub path: String,
    #[serde(rename = "RepoName")]
    pub repo_name: String,
    #[serde(rename = "DocsetName")]
    pub docset_name: String,
    #[serde(rename = "DocsetId")]
    pub docset_id: String,
}

/// A user-defined search scope over a subset of installed docsets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    #[serde(rename = "Id", default)]
    pub id: i64,
    #[serde(rename = "Icon", default)]
    pub icon: String,
    #[serde(rename = "Name")]
    pub name: String,
    /// Docset short names this group restricts search to.
    #[serde(rename = "Docs", default)]
    pub docs: Vec<String>,
}
