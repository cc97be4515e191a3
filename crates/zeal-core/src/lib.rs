//! zeal-core: the engine behind the zealcore documentation server.
//!
//! Docsets from several repositories (Dash feeds, user uploads,
//! Devhelp/GTK-Doc books) are installed into per-docset archives and merged
//! into one in-memory symbol index, which answers ranked streaming queries
//! with DevDocs-compatible scoring.

pub mod archive;
pub mod cache;
pub mod config;
pub mod dash;
pub mod docbook;
pub mod error;
pub mod index;
pub mod ingest;
pub mod matcher;
pub mod progress;
pub mod repo;
pub mod search;
pub mod type_map;
pub mod types;

pub use archive::{extract_file, DocsetArchive};
pub use cache::CatalogDb;
pub use config::Config;
pub use dash::DashRepo;
pub use docbook::DocbooksRepo;
pub use error::{Error, Result};
pub use index::{DocsetRef, GlobalIndex, IndexData, SymbolRow};
pub use ingest::{install_stream, ReaderWithProgress};
pub use matcher::{match_fuzzy, munge, score_exact, score_fuzzy};
pub use progress::{ProgressEvent, ProgressHandlers};
pub use repo::{CompletionFn, DocsRepo};
pub use search::Searcher;
pub use type_map::map_type;
pub use types::{Group, RepoItem, RepoItemExtra, SearchResult};
