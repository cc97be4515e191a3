//! Shared server state: the global index, the fixed repository list, and
//! the progress broadcaster.

use std::sync::Arc;

use tracing::{info, warn};
use zeal_core::{CatalogDb, Config, DashRepo, DocbooksRepo, DocsRepo, GlobalIndex, ProgressHandlers};

/// Everything a request handler needs, shared across connections.
pub struct AppState {
    pub config: Config,
    pub index: Arc<GlobalIndex>,
    /// Dispatch order is fixed: com.kapeli, com.kapeli.contrib,
    /// com.kapeli.local, org.gnome. First match wins.
    pub repos: Vec<Arc<dyn DocsRepo>>,
    pub progress: Arc<ProgressHandlers>,
    pub catalog: Arc<CatalogDb>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    /// Opens the catalog, builds the repository set, and imports every
    /// installed docset into a fresh index. Blocking; call off the runtime.
    pub fn build(config: Config) -> zeal_core::Result<SharedState> {
        let catalog = Arc::new(CatalogDb::open(&config.catalog_path())?);
        let repos: Vec<Arc<dyn DocsRepo>> = vec![
            Arc::new(DashRepo::official(config.clone(), Arc::clone(&catalog))),
            Arc::new(DashRepo::contrib(config.clone(), Arc::clone(&catalog))),
            Arc::new(DashRepo::local(config.clone(), Arc::clone(&catalog))),
            Arc::new(DocbooksRepo::new()),
        ];
        Self::build_with(config, catalog, repos)
    }

    /// Like [`Self::build`] with an explicit repository set (tests).
    pub fn build_with(
        config: Config,
        catalog: Arc<CatalogDb>,
        repos: Vec<Arc<dyn DocsRepo>>,
    ) -> zeal_core::Result<SharedState> {
        let index = Arc::new(GlobalIndex::new());
        for repo in &repos {
            if let Err(err) = repo.import_all(&index) {
                warn!(%err, repo = repo.name(), "import failed");
            }
        }
        info!(symbols = index.read().len(), "global index ready");

        Ok(Arc::new(Self {
            config,
            index,
            repos,
            progress: Arc::new(ProgressHandlers::new()),
            catalog,
        }))
    }
}
