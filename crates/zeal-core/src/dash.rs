//! Dash-style docset repositories.
//!
//! Three repositories share this implementation: the official Kapeli feed
//! (`com.kapeli`), the user-contributed feed (`com.kapeli.contrib`), and
//! locally uploaded docsets (`com.kapeli.local`). All three install into
//! `<title>.zealdocset` archives and index symbols out of the docset's
//! bundled `docSet.dsidx` SQLite database, which comes in two schemas: the
//! modern flat `searchIndex` table and the older Core-Data table set.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::LazyLock;

use parking_lot::RwLock;
use rand::seq::SliceRandom;
use regex::Regex;
use rusqlite::Connection;
use serde::Deserialize;
use tracing::{error, info, warn};

use crate::archive::extract_file;
use crate::cache::CatalogDb;
use crate::config::Config;
use crate::index::{DocsetRef, GlobalIndex, SymbolRow};
use crate::ingest::install_stream;
use crate::matcher::munge;
use crate::progress::{ProgressEvent, ProgressHandlers};
use crate::repo::{symbols_for_docset, CompletionFn, DocsRepo};
use crate::type_map::map_type;
use crate::types::RepoItem;
use crate::{Error, Result};

/// Mirror cities for the user-contributed feed.
const MIRROR_CITIES: &[&str] = &["sanfrancisco", "newyork", "london", "frankfurt"];

static DASH_ENTRY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("<dash_entry_.*>").unwrap());

/// One docset this repository has indexed, with the archive backing its
/// pages.
struct InstalledDocset {
    short_name: String,
    archive: PathBuf,
}

/// A Dash-flavored repository backed by the shared catalog database.
pub struct DashRepo {
    repo_id: i64,
    config: Config,
    catalog: Arc<CatalogDb>,
    api_base: String,
    download_base: String,
    feeds_base: Option<String>,
    docsets: RwLock<Vec<InstalledDocset>>,
    symbol_counts: RwLock<HashMap<String, BTreeMap<String, u64>>>,
}

impl DashRepo {
    /// The official Kapeli repository (`com.kapeli`).
    pub fn official(config: Config, catalog: Arc<CatalogDb>) -> Self {
        Self::with_repo_id(1, config, catalog)
    }

    /// The user-contributed repository (`com.kapeli.contrib`).
    pub fn contrib(config: Config, catalog: Arc<CatalogDb>) -> Self {
        Self::with_repo_id(2, config, catalog)
    }

    /// The local-upload repository (`com.kapeli.local`).
    pub fn local(config: Config, catalog: Arc<CatalogDb>) -> Self {
        Self::with_repo_id(3, config, catalog)
    }

    fn with_repo_id(repo_id: i64, config: Config, catalog: Arc<CatalogDb>) -> Self {
        Self {
            repo_id,
            config,
            catalog,
            api_base: "http://api.zealdocs.org".to_string(),
            download_base: "https://go.zealdocs.org".to_string(),
            feeds_base: None,
            docsets: RwLock::new(Vec::new()),
            symbol_counts: RwLock::new(HashMap::new()),
        }
    }

    /// Overrides the catalog API endpoint (tests).
    #[must_use]
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    /// Overrides the official download endpoint (tests).
    #[must_use]
    pub fn with_download_base(mut self, base: impl Into<String>) -> Self {
        self.download_base = base.into();
        self
    }

    /// Overrides mirror selection for the contributed feed (tests).
    #[must_use]
    pub fn with_feeds_base(mut self, base: impl Into<String>) -> Self {
        self.feeds_base = Some(base.into());
        self
    }

    fn feeds_base(&self) -> String {
        self.feeds_base.clone().unwrap_or_else(|| {
            let city = MIRROR_CITIES
                .choose(&mut rand::thread_rng())
                .copied()
                .unwrap_or("sanfrancisco");
            format!("https://{city}.kapeli.com")
        })
    }

    fn item_in_repo(&self, id: &str) -> Option<RepoItem> {
        self.catalog
            .available_in_repo_by_id(id, self.repo_id)
            .ok()
            .flatten()
    }

    fn fetch_official_catalog(&self) -> Result<Vec<RepoItem>> {
        let url = format!("{}/v1/docsets", self.api_base);
        let body = reqwest::blocking::get(&url)?.error_for_status()?.text()?;
        self.catalog
            .kv_set(&format!("repo_json_{}", self.repo_id), &body)?;
        let mut items: Vec<RepoItem> = serde_json::from_str(&body)?;
        self.catalog.upsert_available(self.repo_id, &mut items)?;
        info!(count = items.len(), "fetched official docset catalog");
        Ok(items)
    }

    fn fetch_contrib_catalog(&self) -> Result<Vec<RepoItem>> {
        let url = format!(
            "{}/feeds/zzz/user_contributed/build/index.json",
            self.feeds_base()
        );
        let body = reqwest::blocking::get(&url)?.error_for_status()?.text()?;
        self.catalog
            .kv_set(&format!("repo_json_{}", self.repo_id), &body)?;
        let listing: ContribIndex = serde_json::from_str(&body)?;
        let mut items: Vec<RepoItem> = listing
            .docsets
            .into_iter()
            .map(|(key, entry)| RepoItem {
                source_id: "com.kapeli.contrib".to_string(),
                name: entry.name.clone(),
                title: entry.name,
                icon: entry.icon,
                icon2x: entry.icon2x,
                archive: entry.archive,
                contrib_repo_key: key,
                ..RepoItem::default()
            })
            .collect();
        items.sort_by(|a, b| a.name.cmp(&b.name));
        self.catalog.upsert_available(self.repo_id, &mut items)?;
        info!(count = items.len(), "fetched contributed docset catalog");
        Ok(items)
    }

    fn download_url(&self, item: &RepoItem) -> Option<String> {
        match self.repo_id {
            1 => Some(format!(
                "{}/d/com.kapeli/{}/latest",
                self.download_base, item.name
            )),
            2 => Some(format!(
                "{}/feeds/zzz/user_contributed/build/{}/{}",
                self.feeds_base(),
                item.contrib_repo_key,
                item.archive
            )),
            _ => None,
        }
    }

    /// Runs the archive ingest for `stream` on a fresh thread and performs
    /// the completion protocol: catalog bookkeeping, the caller's reindex
    /// callback, then the terminal progress event.
    fn spawn_install(
        &self,
        stream_total: Option<u64>,
        stream: InstallSource,
        item: RepoItem,
        progress: Arc<ProgressHandlers>,
        on_complete: CompletionFn,
    ) {
        let source_id = if item.source_id.is_empty() {
            self.name().to_string()
        } else {
            item.source_id.clone()
        };
        let title = item.title.clone();
        let id = item.id.clone();
        let archive_path = self.config.archive_path(&title);
        let catalog = Arc::clone(&self.catalog);

        std::thread::spawn(move || {
            let outcome =
                std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| -> Result<u64> {
                    let (reader, total): (Box<dyn Read>, u64) = match stream {
                        InstallSource::Url(url) => {
                            let resp = reqwest::blocking::get(&url)?.error_for_status()?;
                            let total = resp.content_length().unwrap_or(0);
                            (Box::new(resp), total)
                        },
                        InstallSource::Stream(reader) => {
                            (reader, stream_total.unwrap_or(0))
                        },
                    };
                    install_stream(reader, &source_id, &title, total, &archive_path, &progress)?;
                    catalog.mark_installed(&id)?;
                    Ok(total)
                }));
            match outcome {
                Ok(Ok(total)) => {
                    on_complete();
                    // 100% only goes out once the index rebuild is done.
                    progress.broadcast(&ProgressEvent::new(&source_id, &title, total, total));
                },
                Ok(Err(err)) => {
                    error!(%err, %title, "docset install failed");
                    progress.broadcast(&ProgressEvent::failed(
                        &source_id,
                        &title,
                        0,
                        err.to_string(),
                    ));
                },
                Err(_) => {
                    error!(%title, "docset install panicked");
                    progress.broadcast(&ProgressEvent::failed(
                        &source_id,
                        &title,
                        0,
                        "install task panicked".to_string(),
                    ));
                },
            }
        });
    }
}

enum InstallSource {
    Url(String),
    Stream(Box<dyn Read + Send>),
}

impl DocsRepo for DashRepo {
    fn name(&self) -> &str {
        match self.repo_id {
            1 => "com.kapeli",
            2 => "com.kapeli.contrib",
            _ => "com.kapeli.local",
        }
    }

    fn import_all(&self, index: &GlobalIndex) -> Result<()> {
        for item in self.catalog.installed(self.repo_id)? {
            if !self.config.archive_path(&item.title).is_file() {
                warn!(title = %item.title, "installed docset has no archive on disk");
                continue;
            }
            if let Err(err) = self.index_doc_by_id(index, &item.id) {
                warn!(%err, title = %item.title, "failed to index docset");
            }
        }
        Ok(())
    }

    fn get_installed(&self) -> Vec<RepoItem> {
        let mut items = self.catalog.installed(self.repo_id).unwrap_or_default();
        let counts = self.symbol_counts.read();
        for item in &mut items {
            if let Some(c) = counts.get(&item.title) {
                item.symbol_counts = c.clone();
            }
        }
        items
    }

    fn get_available_for_install(&self) -> Result<Vec<RepoItem>> {
        let cached = self.catalog.available(self.repo_id)?;
        if !cached.is_empty() {
            return Ok(cached);
        }
        match self.repo_id {
            1 => self.fetch_official_catalog(),
            2 => self.fetch_contrib_catalog(),
            _ => Ok(Vec::new()),
        }
    }

    fn start_docset_install_by_id(
        &self,
        id: &str,
        progress: Arc<ProgressHandlers>,
        on_complete: CompletionFn,
    ) -> String {
        let Some(item) = self.item_in_repo(id) else {
            return String::new();
        };
        let Some(url) = self.download_url(&item) else {
            return String::new();
        };
        let name = item.name.clone();
        self.spawn_install(None, InstallSource::Url(url), item, progress, on_complete);
        name
    }

    fn start_docset_install_by_io(
        &self,
        stream: Box<dyn Read + Send>,
        item: RepoItem,
        length: u64,
        progress: Arc<ProgressHandlers>,
        on_complete: CompletionFn,
    ) -> String {
        let mut item = item;
        if item.source_id.is_empty() {
            item.source_id = self.name().to_string();
        }
        if item.title.is_empty() {
            item.title = item.name.clone();
        }
        if let Err(err) = self
            .catalog
            .upsert_available(self.repo_id, std::slice::from_mut(&mut item))
        {
            error!(%err, "failed to register uploaded docset");
            return String::new();
        }
        let title = item.title.clone();
        self.spawn_install(
            Some(length),
            InstallSource::Stream(stream),
            item,
            progress,
            on_complete,
        );
        title
    }

    fn get_symbols(&self, index: &GlobalIndex, id: &str, symbol_type: &str) -> Vec<[String; 2]> {
        match self.item_in_repo(id) {
            Some(item) => symbols_for_docset(index, self.name(), &item.title, symbol_type),
            None => Vec::new(),
        }
    }

    fn get_chapters(&self, _id: &str, _path: &str) -> Vec<[String; 2]> {
        Vec::new()
    }

    fn get_page(&self, path: &str, sink: &mut dyn std::io::Write) -> Result<()> {
        for docset in self.docsets.read().iter() {
            let prefix = format!("{}.docset/", docset.short_name);
            if path.starts_with(&prefix) {
                return extract_file(&docset.archive, path, sink);
            }
        }
        Err(Error::NotFound(path.to_string()))
    }

    fn remove_docset(&self, id: &str, index: &GlobalIndex) -> bool {
        let Some(item) = self.item_in_repo(id) else {
            return false;
        };
        let archive = self.config.archive_path(&item.title);
        if std::fs::remove_file(&archive).is_err() {
            return false;
        }
        if let Err(err) = self.catalog.remove_installed(id) {
            warn!(%err, "failed to update catalog after docset removal");
        }
        if let Some(num) = index.docset_number(self.name(), &item.title) {
            index.remove_by_docset(num);
        }
        self.docsets
            .write()
            .retain(|d| d.short_name != item.title);
        self.symbol_counts.write().remove(&item.title);
        info!(title = %item.title, "docset removed");
        true
    }

    fn index_doc_by_id(&self, index: &GlobalIndex, id: &str) -> Result<()> {
        let item = self
            .item_in_repo(id)
            .ok_or_else(|| Error::NotFound(format!("docset id {id}")))?;
        let archive = self.config.archive_path(&item.title);
        let docset_name = format!("{}.docset", item.title);

        // The bundled index database (and its journal siblings, when the
        // docset ships them) must be extracted to real files before SQLite
        // can open it.
        let tmp = tempfile::tempdir()?;
        let idx_path = tmp.path().join("docSet.dsidx");
        let mut f = File::create(&idx_path)?;
        extract_file(
            &archive,
            &format!("{docset_name}/Contents/Resources/docSet.dsidx"),
            &mut f,
        )?;
        drop(f);
        for suffix in ["-shm", "-wal"] {
            let sibling = tmp.path().join(format!("docSet.dsidx{suffix}"));
            let mut f = File::create(&sibling)?;
            let _ = extract_file(
                &archive,
                &format!("{docset_name}/Contents/Resources/docSet.dsidx{suffix}"),
                &mut f,
            );
        }

        let conn = Connection::open(&idx_path)?;
        let docset_num = index.register_docset(DocsetRef {
            repo_name: self.name().to_string(),
            short_name: item.title.clone(),
            id: item.id.clone(),
        });
        let rows = import_rows(&conn, &docset_name, docset_num)?;
        let row_count = rows.len();
        index.append_batch(rows);

        let counts = symbol_counts(&conn)?;
        self.symbol_counts
            .write()
            .insert(item.title.clone(), counts);
        self.docsets.write().push(InstalledDocset {
            short_name: item.title.clone(),
            archive,
        });
        info!(title = %item.title, rows = row_count, "docset indexed");
        Ok(())
    }
}

#[derive(Deserialize)]
struct ContribIndex {
    docsets: HashMap<String, ContribEntry>,
}

#[derive(Deserialize)]
struct ContribEntry {
    name: String,
    #[serde(default)]
    icon: String,
    #[serde(default, rename = "icon@2x")]
    icon2x: String,
    #[serde(default)]
    archive: String,
}

/// Ensures `searchIndexView` exists over whichever schema the docset
/// database uses.
fn ensure_search_index_view(conn: &Connection) -> Result<()> {
    let mut stmt = conn.prepare("SELECT name FROM sqlite_master WHERE type='table'")?;
    let mut has_search_index = false;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        if row.get::<_, String>(0)? == "searchIndex" {
            has_search_index = true;
        }
    }
    drop(rows);
    drop(stmt);

    if has_search_index {
        conn.execute_batch(
            "CREATE VIEW IF NOT EXISTS searchIndexView AS
               SELECT name, type, path, '' AS fragment FROM searchIndex",
        )?;
    } else {
        conn.execute_batch(
            "CREATE VIEW IF NOT EXISTS searchIndexView AS
               SELECT
                 ztokenname AS name,
                 ztypename AS type,
                 zpath AS path,
                 zanchor AS fragment
               FROM ztoken
               INNER JOIN ztokenmetainformation
                 ON ztoken.zmetainformation = ztokenmetainformation.z_pk
               INNER JOIN zfilepath
                 ON ztokenmetainformation.zfile = zfilepath.z_pk
               INNER JOIN ztokentype
                 ON ztoken.ztokentype = ztokentype.z_pk",
        )?;
    }
    Ok(())
}

/// Reads every symbol row out of a docset index database.
fn import_rows(conn: &Connection, docset_name: &str, docset_num: usize) -> Result<Vec<SymbolRow>> {
    ensure_search_index_view(conn)?;

    let mut stmt = conn.prepare(
        "SELECT name, type, path, coalesce(fragment, '')
         FROM searchIndexView ORDER BY name ASC",
    )?;
    let mut rows = stmt.query([])?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let name: String = row.get(0)?;
        let symbol_type: String = row.get(1)?;
        let path: String = row.get(2)?;
        let fragment: String = row.get(3)?;

        let path = DASH_ENTRY_RE.replace_all(&path, "");
        let fragment = if fragment.is_empty() {
            String::new()
        } else {
            format!("#{}", DASH_ENTRY_RE.replace_all(&fragment, ""))
        };

        out.push(SymbolRow {
            munged: munge(&name),
            path: format!("{docset_name}/Contents/Resources/Documents/{path}{fragment}"),
            docset: docset_num,
            symbol_type: map_type(&symbol_type).to_string(),
            name,
        });
    }
    Ok(out)
}

/// Per-type symbol counts, aggregated after normalization.
fn symbol_counts(conn: &Connection) -> Result<BTreeMap<String, u64>> {
    ensure_search_index_view(conn)?;
    let mut stmt =
        conn.prepare("SELECT type, COUNT(*) FROM searchIndexView GROUP BY type")?;
    let mut rows = stmt.query([])?;
    let mut counts = BTreeMap::new();
    while let Some(row) = rows.next()? {
        let raw: String = row.get(0)?;
        let count: u64 = row.get(1)?;
        *counts.entry(map_type(&raw).to_string()).or_insert(0) += count;
    }
    Ok(counts)
}
