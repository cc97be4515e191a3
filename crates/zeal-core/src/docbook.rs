//! Devhelp / GTK-Doc book repository (`org.gnome`).
//!
//! Books are discovered on disk rather than installed: every XDG data
//! directory is scanned for `devhelp/books/*/*` and `gtk-doc/html/*/*`
//! entries ending in `.devhelp.gz`, `.devhelp2`, or `.devhelp`. The XML
//! table of contents carries a chapter tree plus flat function/keyword
//! lists, which flatten into global index rows; the HTML pages next to the
//! index file are served directly from disk.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use flate2::read::GzDecoder;
use parking_lot::RwLock;
use quick_xml::events::Event;
use quick_xml::Reader as XmlReader;
use rayon::prelude::*;
use regex::Regex;
use tracing::{debug, warn};

use crate::index::{DocsetRef, GlobalIndex, SymbolRow};
use crate::matcher::munge;
use crate::progress::ProgressHandlers;
use crate::repo::{symbols_for_docset, CompletionFn, DocsRepo};
use crate::type_map::map_type;
use crate::types::RepoItem;
use crate::{Error, Result};

/// GIR-generated keywords look like `getv() (GObject.Object method)`; the
/// parenthesized owner and kind are folded back into the display name.
static KEYWORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.*) \(([^()]+) ([^()]+)\)$").unwrap());

/// A function or keyword entry of a book's flat symbol list.
#[derive(Debug, Clone, Default)]
pub struct DocbookKeyword {
    pub link: String,
    pub name: String,
    pub kind: String,
    pub since: String,
}

/// One node of the chapter tree.
#[derive(Debug, Clone, Default)]
pub struct DocbookChapter {
    pub link: String,
    pub name: String,
    pub subs: Vec<DocbookChapter>,
}

/// A parsed Devhelp book.
#[derive(Debug, Clone, Default)]
pub struct Docbook {
    pub language: String,
    pub link: String,
    pub name: String,
    pub title: String,
    pub version: String,
    pub chapters: Vec<DocbookChapter>,
    pub functions: Vec<DocbookKeyword>,
    pub keywords: Vec<DocbookKeyword>,
}

/// Parses a Devhelp XML table of contents.
pub fn parse_docbook(input: impl BufRead) -> Result<Docbook> {
    let mut reader = XmlReader::from_reader(input);
    let mut buf = Vec::new();

    let mut book = Docbook::default();
    let mut in_chapters = false;
    let mut in_functions = false;
    let mut chapter_stack: Vec<DocbookChapter> = Vec::new();

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| Error::Corrupt(format!("bad devhelp XML: {e}")))?;
        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                let empty = matches!(event, Event::Empty(_));
                match e.local_name().as_ref() {
                    b"book" => {
                        for attr in e.attributes().flatten() {
                            let value = attr.unescape_value().unwrap_or_default().into_owned();
                            match attr.key.as_ref() {
                                b"language" => book.language = value,
                                b"link" => book.link = value,
                                b"name" => book.name = value,
                                b"title" => book.title = value,
                                b"version" => book.version = value,
                                _ => {},
                            }
                        }
                    },
                    b"chapters" => in_chapters = !empty,
                    b"functions" => in_functions = !empty,
                    b"sub" if in_chapters => {
                        let mut chapter = DocbookChapter::default();
                        for attr in e.attributes().flatten() {
                            let value = attr.unescape_value().unwrap_or_default().into_owned();
                            match attr.key.as_ref() {
                                b"link" => chapter.link = value,
                                b"name" => chapter.name = value,
                                _ => {},
                            }
                        }
                        if empty {
                            attach_chapter(&mut book, &mut chapter_stack, chapter);
                        } else {
                            chapter_stack.push(chapter);
                        }
                    },
                    tag @ (b"function" | b"keyword") if in_functions => {
                        let mut kw = DocbookKeyword::default();
                        for attr in e.attributes().flatten() {
                            let value = attr.unescape_value().unwrap_or_default().into_owned();
                            match attr.key.as_ref() {
                                b"link" => kw.link = value,
                                b"name" => kw.name = value,
                                b"type" => kw.kind = value,
                                b"since" => kw.since = value,
                                _ => {},
                            }
                        }
                        if tag == b"function" {
                            book.functions.push(kw);
                        } else {
                            book.keywords.push(kw);
                        }
                    },
                    _ => {},
                }
            },
            Event::End(ref e) => match e.local_name().as_ref() {
                b"chapters" => in_chapters = false,
                b"functions" => in_functions = false,
                b"sub" if in_chapters => {
                    if let Some(chapter) = chapter_stack.pop() {
                        attach_chapter(&mut book, &mut chapter_stack, chapter);
                    }
                },
                _ => {},
            },
            Event::Eof => break,
            _ => {},
        }
        buf.clear();
    }

    Ok(book)
}

fn attach_chapter(
    book: &mut Docbook,
    stack: &mut Vec<DocbookChapter>,
    chapter: DocbookChapter,
) {
    match stack.last_mut() {
        Some(parent) => parent.subs.push(chapter),
        None => book.chapters.push(chapter),
    }
}

/// Loads a book from disk, gunzipping `.devhelp.gz` files.
pub fn load_docbook(path: &Path, gz: bool) -> Result<Docbook> {
    let file = File::open(path)?;
    if gz {
        parse_docbook(BufReader::new(GzDecoder::new(file)))
    } else {
        parse_docbook(BufReader::new(file))
    }
}

/// Go-style query unescaping for chapter path components: `+` means space,
/// `%XX` is percent-decoded.
fn query_unescape(s: &str) -> String {
    let plus_replaced = s.replace('+', " ");
    match percent_encoding::percent_decode_str(&plus_replaced).decode_utf8() {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => plus_replaced,
    }
}

struct LoadedBook {
    book: Docbook,
    dir: PathBuf,
}

/// The Devhelp/GTK-Doc repository.
pub struct DocbooksRepo {
    data_dirs: Vec<PathBuf>,
    books: RwLock<Vec<LoadedBook>>,
    symbol_counts: RwLock<HashMap<String, BTreeMap<String, u64>>>,
}

impl DocbooksRepo {
    /// Scans the standard XDG data directories plus the user data home.
    #[must_use]
    pub fn new() -> Self {
        Self::with_data_dirs(xdg_data_dirs())
    }

    /// Scans an explicit set of data directories.
    #[must_use]
    pub fn with_data_dirs(data_dirs: Vec<PathBuf>) -> Self {
        Self {
            data_dirs,
            books: RwLock::new(Vec::new()),
            symbol_counts: RwLock::new(HashMap::new()),
        }
    }

    /// Finds candidate book index files, deduplicated by file name across
    /// data directories.
    fn scan_candidates(&self) -> Vec<(PathBuf, PathBuf, bool)> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut candidates = Vec::new();
        for data_dir in &self.data_dirs {
            for root in [data_dir.join("devhelp/books"), data_dir.join("gtk-doc/html")] {
                let Ok(entries) = std::fs::read_dir(&root) else {
                    continue;
                };
                for book_dir in entries.flatten() {
                    let dir = book_dir.path();
                    let Ok(files) = std::fs::read_dir(&dir) else {
                        continue;
                    };
                    for file in files.flatten() {
                        let name = file.file_name().to_string_lossy().into_owned();
                        let gz = if name.ends_with(".devhelp.gz") {
                            true
                        } else if name.ends_with(".devhelp2") || name.ends_with(".devhelp") {
                            false
                        } else {
                            continue;
                        };
                        if seen.insert(name) {
                            candidates.push((file.path(), dir.clone(), gz));
                        }
                    }
                }
            }
        }
        candidates
    }

    fn index_book(&self, index: &GlobalIndex, book: &Docbook) {
        let docset_num = index.register_docset(DocsetRef {
            repo_name: self.name().to_string(),
            short_name: book.name.clone(),
            id: book.name.clone(),
        });

        let mut counts: BTreeMap<String, u64> = BTreeMap::new();
        let mut rows = Vec::with_capacity(book.functions.len() + book.keywords.len());
        for kw in book.functions.iter().chain(book.keywords.iter()) {
            let mut display = kw.name.clone();
            let mut kind = kw.kind.clone();
            if let Some(caps) = KEYWORD_RE.captures(&kw.name) {
                if &caps[2] != "built-in" {
                    // `getv() (GObject.Object method)` -> `GObject.Object.getv()`,
                    // consistent with how Dash names the same symbols.
                    display = format!("{}.{}", &caps[2], &caps[1]);
                }
                kind = caps[3].to_string();
            }
            let symbol_type = map_type(&kind).to_string();
            *counts.entry(symbol_type.clone()).or_insert(0) += 1;
            rows.push(SymbolRow {
                munged: munge(&display),
                name: display,
                path: format!("{}.docbook/{}", book.name, kw.link),
                docset: docset_num,
                symbol_type,
            });
        }
        let row_count = rows.len();
        index.append_batch(rows);
        self.symbol_counts
            .write()
            .insert(book.name.clone(), counts);
        debug!(book = %book.name, rows = row_count, "docbook indexed");
    }
}

impl Default for DocbooksRepo {
    fn default() -> Self {
        Self::new()
    }
}

impl DocsRepo for DocbooksRepo {
    fn name(&self) -> &str {
        "org.gnome"
    }

    fn import_all(&self, index: &GlobalIndex) -> Result<()> {
        let candidates = self.scan_candidates();
        let loaded: Vec<LoadedBook> = candidates
            .into_par_iter()
            .filter_map(|(file, dir, gz)| match load_docbook(&file, gz) {
                Ok(book) if !book.name.is_empty() => Some(LoadedBook { book, dir }),
                Ok(_) => None,
                Err(err) => {
                    warn!(%err, file = %file.display(), "skipping unreadable devhelp book");
                    None
                },
            })
            .collect();

        self.symbol_counts.write().clear();
        *self.books.write() = loaded;

        let books = self.books.read();
        for loaded in books.iter() {
            self.index_book(index, &loaded.book);
        }
        Ok(())
    }

    fn get_installed(&self) -> Vec<RepoItem> {
        let icon = gnome_icon("16x16");
        let icon2x = gnome_icon("32x32");
        let counts = self.symbol_counts.read();
        self.books
            .read()
            .iter()
            .map(|loaded| RepoItem {
                source_id: self.name().to_string(),
                name: loaded.book.name.clone(),
                title: loaded.book.name.clone(),
                language: loaded.book.language.clone(),
                icon: icon.clone(),
                icon2x: icon2x.clone(),
                id: loaded.book.name.clone(),
                symbol_counts: counts.get(&loaded.book.name).cloned().unwrap_or_default(),
                ..RepoItem::default()
            })
            .collect()
    }

    fn get_available_for_install(&self) -> Result<Vec<RepoItem>> {
        // Books come from installed -dev packages, not from this server.
        Ok(Vec::new())
    }

    fn start_docset_install_by_id(
        &self,
        _id: &str,
        _progress: std::sync::Arc<ProgressHandlers>,
        _on_complete: CompletionFn,
    ) -> String {
        String::new()
    }

    fn start_docset_install_by_io(
        &self,
        _stream: Box<dyn Read + Send>,
        _item: RepoItem,
        _length: u64,
        _progress: std::sync::Arc<ProgressHandlers>,
        _on_complete: CompletionFn,
    ) -> String {
        String::new()
    }

    fn get_symbols(&self, index: &GlobalIndex, id: &str, symbol_type: &str) -> Vec<[String; 2]> {
        symbols_for_docset(index, self.name(), id, symbol_type)
    }

    fn get_chapters(&self, id: &str, path: &str) -> Vec<[String; 2]> {
        let books = self.books.read();
        for loaded in books.iter() {
            if loaded.book.name != id {
                continue;
            }
            let mut chapters = &loaded.book.chapters;
            for part in path.split('/') {
                let unescaped = query_unescape(part);
                if let Some(child) = chapters.iter().find(|c| c.name == unescaped) {
                    chapters = &child.subs;
                }
            }
            return chapters
                .iter()
                .map(|c| {
                    [
                        c.name.clone(),
                        format!("docs/{}.docbook/{}", id, c.link),
                    ]
                })
                .collect();
        }
        Vec::new()
    }

    fn get_page(&self, path: &str, sink: &mut dyn io::Write) -> Result<()> {
        let books = self.books.read();
        for loaded in books.iter() {
            let prefix = format!("{}.docbook/", loaded.book.name);
            if let Some(rest) = path.strip_prefix(&prefix) {
                return copy_page(&loaded.dir.join(rest), sink);
            }
            // Cross-book links address the HTML directory by its own name.
            if let Some(base) = loaded.dir.file_name().and_then(|n| n.to_str()) {
                if let Some(rest) = path.strip_prefix(&format!("{base}/")) {
                    return copy_page(&loaded.dir.join(rest), sink);
                }
            }
        }
        Err(Error::NotFound(path.to_string()))
    }

    fn remove_docset(&self, id: &str, index: &GlobalIndex) -> bool {
        let mut books = self.books.write();
        let Some(pos) = books.iter().position(|b| b.book.name == id) else {
            return false;
        };
        if let Some(num) = index.docset_number(self.name(), id) {
            index.remove_by_docset(num);
        }
        books.remove(pos);
        self.symbol_counts.write().remove(id);
        true
    }

    fn index_doc_by_id(&self, index: &GlobalIndex, id: &str) -> Result<()> {
        let books = self.books.read();
        let loaded = books
            .iter()
            .find(|b| b.book.name == id)
            .ok_or_else(|| Error::NotFound(format!("docbook {id}")))?;
        self.index_book(index, &loaded.book);
        Ok(())
    }
}

fn copy_page(path: &Path, sink: &mut dyn io::Write) -> Result<()> {
    let mut file = File::open(path)
        .map_err(|_| Error::NotFound(path.display().to_string()))?;
    io::copy(&mut file, sink)?;
    Ok(())
}

fn gnome_icon(size: &str) -> String {
    for root in ["/app/share", "/usr/share"] {
        let path = format!("{root}/icons/gnome/{size}/places/gnome-foot.png");
        if let Ok(bytes) = std::fs::read(&path) {
            return BASE64.encode(bytes);
        }
    }
    String::new()
}

fn xdg_data_dirs() -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = std::env::var("XDG_DATA_DIRS")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| "/usr/local/share:/usr/share".to_string())
        .split(':')
        .filter(|p| !p.is_empty())
        .map(PathBuf::from)
        .collect();

    if let Ok(home) = std::env::var("XDG_DATA_HOME") {
        if !home.trim().is_empty() {
            dirs.push(PathBuf::from(home));
            return dirs;
        }
    }
    if let Some(base) = directories::BaseDirs::new() {
        dirs.push(base.home_dir().join(".local/share"));
    }
    dirs
}
