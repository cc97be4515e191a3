//! The in-memory global symbol index.
//!
//! Symbols from every installed docset live in five parallel arrays indexed
//! by position, which keeps the munged match strings contiguous for the
//! scan in [`crate::search`]. A single reader/writer lock protects the
//! arrays: searches hold it for read, importers and removal rebuilds for
//! write. Docset numbers are positions into the docset table and stay
//! stable for the process lifetime; removing a docset drops its symbol
//! rows but keeps its table entry.

use parking_lot::{RwLock, RwLockReadGuard};

/// Identity of one docset inside the index: owning repository name, docset
/// short name, and the opaque catalog id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocsetRef {
    pub repo_name: String,
    pub short_name: String,
    pub id: String,
}

/// One symbol entry produced by an importer.
#[derive(Debug, Clone)]
pub struct SymbolRow {
    pub name: String,
    pub munged: String,
    pub path: String,
    pub docset: usize,
    pub symbol_type: String,
}

/// The five parallel arrays plus the docset table.
///
/// All five arrays always have the same length; positions are only valid
/// while the owning [`GlobalIndex`] lock is held.
#[derive(Debug, Default)]
pub struct IndexData {
    names: Vec<String>,
    munged: Vec<String>,
    paths: Vec<String>,
    docsets: Vec<usize>,
    types: Vec<String>,
    docset_refs: Vec<DocsetRef>,
}

impl IndexData {
    /// Number of symbol positions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    #[must_use]
    pub fn munged(&self) -> &[String] {
        &self.munged
    }

    #[must_use]
    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    #[must_use]
    pub fn docsets(&self) -> &[usize] {
        &self.docsets
    }

    #[must_use]
    pub fn types(&self) -> &[String] {
        &self.types
    }

    /// The docset table. Entries persist after removal so that docset
    /// numbers held elsewhere stay valid.
    #[must_use]
    pub fn docset_refs(&self) -> &[DocsetRef] {
        &self.docset_refs
    }

    fn push(&mut self, row: SymbolRow) {
        debug_assert!(row.docset < self.docset_refs.len());
        self.names.push(row.name);
        self.munged.push(row.munged);
        self.paths.push(row.path);
        self.docsets.push(row.docset);
        self.types.push(row.symbol_type);
    }
}

/// Owner of the parallel arrays and the docset table.
#[derive(Debug, Default)]
pub struct GlobalIndex {
    data: RwLock<IndexData>,
}

impl GlobalIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the read lock. Multiple readers run concurrently; writers wait.
    pub fn read(&self) -> RwLockReadGuard<'_, IndexData> {
        self.data.read()
    }

    /// Atomically replaces the whole index.
    pub fn rebuild_to(&self, new: IndexData) {
        *self.data.write() = new;
    }

    /// Appends a docset table entry, returning its docset number.
    pub fn register_docset(&self, docset: DocsetRef) -> usize {
        let mut data = self.data.write();
        data.docset_refs.push(docset);
        data.docset_refs.len() - 1
    }

    /// Appends importer rows under the writer lock.
    pub fn append_batch(&self, rows: Vec<SymbolRow>) {
        let mut data = self.data.write();
        for row in rows {
            data.push(row);
        }
    }

    /// Rebuilds the arrays in place, dropping every position that belongs
    /// to `docset`.
    pub fn remove_by_docset(&self, docset: usize) {
        let mut data = self.data.write();
        let keep: Vec<bool> = data.docsets.iter().map(|&d| d != docset).collect();
        let mut iter = keep.iter().copied();
        data.names = filter_by(std::mem::take(&mut data.names), &keep);
        data.munged = filter_by(std::mem::take(&mut data.munged), &keep);
        data.paths = filter_by(std::mem::take(&mut data.paths), &keep);
        data.types = filter_by(std::mem::take(&mut data.types), &keep);
        data.docsets.retain(|_| iter.next().unwrap_or(true));
    }

    /// Resolves a docset number from repository and short name.
    #[must_use]
    pub fn docset_number(&self, repo_name: &str, short_name: &str) -> Option<usize> {
        self.data
            .read()
            .docset_refs
            .iter()
            .position(|r| r.repo_name == repo_name && r.short_name == short_name)
    }
}

fn filter_by<T>(values: Vec<T>, keep: &[bool]) -> Vec<T> {
    values
        .into_iter()
        .zip(keep.iter().copied())
        .filter_map(|(v, k)| k.then_some(v))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::munge;

    fn row(name: &str, docset: usize) -> SymbolRow {
        SymbolRow {
            name: name.to_string(),
            munged: munge(name),
            path: format!("{name}.html"),
            docset,
            symbol_type: "Class".to_string(),
        }
    }

    fn docset(short: &str) -> DocsetRef {
        DocsetRef {
            repo_name: "com.kapeli".to_string(),
            short_name: short.to_string(),
            id: short.to_string(),
        }
    }

    fn lengths(data: &IndexData) -> [usize; 5] {
        [
            data.names().len(),
            data.munged().len(),
            data.paths().len(),
            data.docsets().len(),
            data.types().len(),
        ]
    }

    #[test]
    fn arrays_stay_parallel() {
        let index = GlobalIndex::new();
        let a = index.register_docset(docset("A"));
        let b = index.register_docset(docset("B"));
        index.append_batch(vec![row("Foo", a), row("Bar", b), row("Baz", a)]);

        let data = index.read();
        assert_eq!(lengths(&data), [3; 5]);
        drop(data);

        index.remove_by_docset(a);
        let data = index.read();
        assert_eq!(lengths(&data), [1; 5]);
        assert_eq!(data.names(), ["Bar"]);
        assert_eq!(data.docsets(), [b]);
    }

    #[test]
    fn docset_numbers_survive_removal() {
        let index = GlobalIndex::new();
        let a = index.register_docset(docset("A"));
        let b = index.register_docset(docset("B"));
        index.append_batch(vec![row("Foo", a), row("Bar", b)]);
        index.remove_by_docset(a);

        // B's number still resolves and its rows still point at it.
        assert_eq!(index.docset_number("com.kapeli", "B"), Some(b));
        let data = index.read();
        assert_eq!(data.docset_refs().len(), 2);
        assert_eq!(data.docsets(), [b]);
    }

    #[test]
    fn install_then_remove_restores_contents() {
        let index = GlobalIndex::new();
        let a = index.register_docset(docset("A"));
        index.append_batch(vec![row("Foo", a), row("Bar", a)]);

        let snapshot: Vec<(String, String, String)> = {
            let data = index.read();
            (0..data.len())
                .map(|i| {
                    (
                        data.names()[i].clone(),
                        data.paths()[i].clone(),
                        data.types()[i].clone(),
                    )
                })
                .collect()
        };

        let b = index.register_docset(docset("B"));
        index.append_batch(vec![row("Qux", b)]);
        index.remove_by_docset(b);

        let data = index.read();
        let after: Vec<(String, String, String)> = (0..data.len())
            .map(|i| {
                (
                    data.names()[i].clone(),
                    data.paths()[i].clone(),
                    data.types()[i].clone(),
                )
            })
            .collect();
        assert_eq!(after, snapshot);
    }

    #[test]
    fn rebuild_to_swaps_everything() {
        let index = GlobalIndex::new();
        let a = index.register_docset(docset("A"));
        index.append_batch(vec![row("Foo", a)]);
        index.rebuild_to(IndexData::default());
        assert!(index.read().is_empty());
        assert!(index.read().docset_refs().is_empty());
    }
}
