//! The capability set every documentation repository implements.
//!
//! The transport holds a fixed, ordered list of repositories and dispatches
//! each request to the first one that answers: `com.kapeli`,
//! `com.kapeli.contrib`, `com.kapeli.local`, then `org.gnome`.

use std::io::{Read, Write};
use std::sync::Arc;

use crate::index::GlobalIndex;
use crate::progress::ProgressHandlers;
use crate::types::RepoItem;
use crate::Result;

/// Invoked once a background install has finished writing its archive,
/// before the terminal progress event is broadcast. The transport reindexes
/// the docset here.
pub type CompletionFn = Box<dyn FnOnce() + Send + 'static>;

/// A source of installable documentation.
pub trait DocsRepo: Send + Sync {
    /// Stable repository identifier, e.g. `com.kapeli` or `org.gnome`.
    fn name(&self) -> &str;

    /// Scans disk (and environment) and appends every installed docset of
    /// this repository to the global index.
    fn import_all(&self, index: &GlobalIndex) -> Result<()>;

    fn get_installed(&self) -> Vec<RepoItem>;

    /// The repository catalog; may hit the network once and is cached in
    /// the catalog database afterwards.
    fn get_available_for_install(&self) -> Result<Vec<RepoItem>>;

    /// Fetches and installs a docset in a background thread, returning its
    /// short name immediately. Returns an empty string when this repository
    /// cannot install `id`.
    fn start_docset_install_by_id(
        &self,
        id: &str,
        progress: Arc<ProgressHandlers>,
        on_complete: CompletionFn,
    ) -> String;

    /// Same contract as [`Self::start_docset_install_by_id`] for a locally
    /// supplied tarball stream.
    fn start_docset_install_by_io(
        &self,
        stream: Box<dyn Read + Send>,
        item: RepoItem,
        length: u64,
        progress: Arc<ProgressHandlers>,
        on_complete: CompletionFn,
    ) -> String;

    /// All `[name, href]` symbol pairs of one type in one docset.
    fn get_symbols(&self, index: &GlobalIndex, id: &str, symbol_type: &str) -> Vec<[String; 2]>;

    /// Child chapters under a chapter path; empty for non-book repositories.
    fn get_chapters(&self, id: &str, path: &str) -> Vec<[String; 2]>;

    /// Streams one documentation page into `sink`.
    fn get_page(&self, path: &str, sink: &mut dyn Write) -> Result<()>;

    /// Removes an installed docset: its index rows, its archive, and its
    /// catalog bookkeeping. False when `id` is not this repository's.
    fn remove_docset(&self, id: &str, index: &GlobalIndex) -> bool;

    /// (Re)indexes one installed docset into the global index.
    fn index_doc_by_id(&self, index: &GlobalIndex, id: &str) -> Result<()>;
}

/// Collects `[name, "docs/" + path]` pairs for one docset and symbol type
/// straight from the index arrays.
pub(crate) fn symbols_for_docset(
    index: &GlobalIndex,
    repo_name: &str,
    short_name: &str,
    symbol_type: &str,
) -> Vec<[String; 2]> {
    let data = index.read();
    let refs = data.docset_refs();
    let mut out = Vec::new();
    for i in 0..data.len() {
        let docset = &refs[data.docsets()[i]];
        if docset.repo_name != repo_name || docset.short_name != short_name {
            continue;
        }
        if data.types()[i] == symbol_type {
            out.push([
                data.names()[i].clone(),
                format!("docs/{}", data.paths()[i]),
            ]);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{DocsetRef, SymbolRow};
    use crate::matcher::munge;

    #[test]
    fn symbols_filter_by_docset_and_type() {
        let index = GlobalIndex::new();
        let qt = index.register_docset(DocsetRef {
            repo_name: "com.kapeli".into(),
            short_name: "Qt".into(),
            id: "1".into(),
        });
        let glib = index.register_docset(DocsetRef {
            repo_name: "org.gnome".into(),
            short_name: "GLib".into(),
            id: "GLib".into(),
        });
        let row = |name: &str, docset: usize, tp: &str| SymbolRow {
            name: name.into(),
            munged: munge(name),
            path: format!("{name}.html"),
            docset,
            symbol_type: tp.into(),
        };
        index.append_batch(vec![
            row("QString", qt, "Class"),
            row("QString::arg", qt, "Method"),
            row("GString", glib, "Structure"),
        ]);

        let classes = symbols_for_docset(&index, "com.kapeli", "Qt", "Class");
        assert_eq!(classes, vec![["QString".to_string(), "docs/QString.html".to_string()]]);
        assert!(symbols_for_docset(&index, "com.kapeli", "Qt", "Structure").is_empty());
        assert!(symbols_for_docset(&index, "org.gnome", "Qt", "Class").is_empty());
    }
}
