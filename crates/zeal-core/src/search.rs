//! Parallel ranked search over the global index.
//!
//! A query scans the whole index, sharded across one worker thread per
//! core. Each worker ranks its shard locally; the shards are then merged
//! into a single descending stream and handed to the caller's callback.
//!
//! Preemption uses a shared sequence counter: every query bumps it and
//! remembers its own number, and workers bail out as soon as the counter
//! moves past them. The counter is advisory (relaxed ordering); the read
//! lock on the index, not the counter, is what keeps positions valid.

use std::cmp::Ordering as CmpOrdering;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::index::{GlobalIndex, IndexData};
use crate::matcher::{match_fuzzy, munge, score_exact, score_fuzzy};
use crate::types::SearchResult;

/// Results delivered per query before the stream is cut off.
const MAX_RESULTS: usize = 100;

/// Exact substring hits outrank every fuzzy hit by this margin.
const EXACT_BONUS: i32 = 100;

/// A search front-end bound to one connection.
///
/// The connection owns the query sequence counter; queries submitted
/// through the same `Searcher` supersede each other.
#[derive(Clone)]
pub struct Searcher {
    index: Arc<GlobalIndex>,
    last_query: Arc<AtomicUsize>,
}

impl Searcher {
    #[must_use]
    pub fn new(index: Arc<GlobalIndex>, last_query: Arc<AtomicUsize>) -> Self {
        Self { index, last_query }
    }

    /// Runs one query to completion or preemption.
    ///
    /// `scope` restricts results to docsets whose short name is in the set;
    /// `None` searches everything. Results arrive through `result_cb` in
    /// strictly non-increasing score order (ties by name, bytewise).
    /// `time_cb` fires with the query number and elapsed time only if this
    /// query is still the connection's latest once emission finishes.
    pub fn search_all_docs(
        &self,
        query: &str,
        scope: Option<&HashSet<String>>,
        mut result_cb: impl FnMut(SearchResult),
        time_cb: impl FnOnce(usize, Duration),
    ) {
        let cur_query = self.last_query.fetch_add(1, Ordering::Relaxed) + 1;
        let started = Instant::now();
        let q_munged = munge(query);
        let last_query = self.last_query.as_ref();

        let data = self.index.read();
        let total = data.len();
        let threads = std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get);

        let shards: Vec<Vec<SearchResult>> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..threads)
                .map(|t| {
                    let data = &data;
                    let q = q_munged.as_str();
                    let lo = t * total / threads;
                    let hi = (t + 1) * total / threads;
                    s.spawn(move || scan_shard(data, q, lo, hi, cur_query, last_query, scope))
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap_or_default())
                .collect()
        });
        // Rows are owned copies now; let readers of the next query in.
        drop(data);

        let candidates: usize = shards.iter().map(Vec::len).sum();
        let mut indices = vec![0usize; shards.len()];
        let mut returned = 0usize;
        while returned < candidates {
            if last_query.load(Ordering::Relaxed) != cur_query || returned >= MAX_RESULTS {
                break;
            }
            let mut best: Option<usize> = None;
            for (t, shard) in shards.iter().enumerate() {
                if indices[t] < shard.len() {
                    best = Some(match best {
                        Some(b) if rank(&shard[indices[t]], &shards[b][indices[b]])
                            != CmpOrdering::Less =>
                        {
                            b
                        },
                        _ => t,
                    });
                }
            }
            let Some(t) = best else { break };
            let mut result = shards[t][indices[t]].clone();
            indices[t] += 1;
            result.query_id = cur_query;
            result_cb(result);
            returned += 1;
        }

        if last_query.load(Ordering::Relaxed) == cur_query {
            debug!(query = %query, results = returned, elapsed = ?started.elapsed(), "search finished");
            time_cb(cur_query, started.elapsed());
        } else {
            debug!(query = %query, "search superseded");
        }
    }
}

/// Orders results best-first: score descending, then name ascending.
fn rank(a: &SearchResult, b: &SearchResult) -> CmpOrdering {
    b.score
        .cmp(&a.score)
        .then_with(|| a.name.cmp(&b.name))
}

fn scan_shard(
    data: &IndexData,
    q_munged: &str,
    lo: usize,
    hi: usize,
    cur_query: usize,
    last_query: &AtomicUsize,
    scope: Option<&HashSet<String>>,
) -> Vec<SearchResult> {
    let names = data.names();
    let munged = data.munged();
    let paths = data.paths();
    let docsets = data.docsets();
    let types = data.types();
    let refs = data.docset_refs();

    let mut results = Vec::new();
    for i in lo..hi {
        if last_query.load(Ordering::Relaxed) != cur_query {
            break;
        }
        let docset = &refs[docsets[i]];
        if let Some(allow) = scope {
            if !allow.contains(docset.short_name.as_str()) {
                continue;
            }
        }

        let value = munged[i].as_str();
        let score = if let Some(pos) = value.find(q_munged) {
            score_exact(pos, q_munged.len(), value) + EXACT_BONUS
        } else if let Some((start, length)) = match_fuzzy(q_munged, value) {
            score_fuzzy(value, start, length)
        } else {
            continue;
        };

        results.push(SearchResult {
            query_id: 0,
            score,
            symbol_type: types[i].clone(),
            name: names[i].clone(),
            path: paths[i].clone(),
            repo_name: docset.repo_name.clone(),
            docset_name: docset.short_name.clone(),
            docset_id: docset.id.clone(),
        });
    }

    results.sort_by(rank);
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{DocsetRef, SymbolRow};

    fn docset(repo: &str, short: &str, id: &str) -> DocsetRef {
        DocsetRef {
            repo_name: repo.to_string(),
            short_name: short.to_string(),
            id: id.to_string(),
        }
    }

    fn row(name: &str, docset: usize, symbol_type: &str) -> SymbolRow {
        SymbolRow {
            name: name.to_string(),
            munged: munge(name),
            path: format!("{name}.html"),
            docset,
            symbol_type: symbol_type.to_string(),
        }
    }

    fn fixture() -> (Arc<GlobalIndex>, Searcher) {
        let index = Arc::new(GlobalIndex::new());
        let qt = index.register_docset(docset("com.kapeli", "Qt", "1"));
        let glib = index.register_docset(docset("org.gnome", "GLib", "GLib"));
        index.append_batch(vec![
            row("QString::arg", qt, "Method"),
            row("QString::append", qt, "Method"),
            row("QStringList", qt, "Class"),
            row("g_string_append", glib, "Function"),
            row("GString", glib, "Structure"),
        ]);
        let searcher = Searcher::new(Arc::clone(&index), Arc::new(AtomicUsize::new(0)));
        (index, searcher)
    }

    fn collect(searcher: &Searcher, query: &str, scope: Option<&HashSet<String>>) -> Vec<SearchResult> {
        let mut results = Vec::new();
        searcher.search_all_docs(query, scope, |r| results.push(r), |_, _| {});
        results
    }

    #[test]
    fn results_are_ranked_and_tagged() {
        let (_index, searcher) = fixture();
        let results = collect(&searcher, "qstring", None);
        assert!(!results.is_empty());
        // Non-increasing scores, ties broken by name ascending.
        for pair in results.windows(2) {
            assert!(pair[0].score >= pair[1].score);
            if pair[0].score == pair[1].score {
                assert!(pair[0].name <= pair[1].name);
            }
        }
        // Exact prefix hit leads and carries docset identity.
        assert!(results[0].name.starts_with("QString"));
        assert_eq!(results[0].repo_name, "com.kapeli");
        assert_eq!(results[0].docset_name, "Qt");
        assert!(results.iter().all(|r| r.query_id == 1));
    }

    #[test]
    fn exact_outranks_fuzzy() {
        let (_index, searcher) = fixture();
        let results = collect(&searcher, "gstring", None);
        let exact = results.iter().position(|r| r.name == "GString").unwrap();
        let fuzzy = results.iter().position(|r| r.name == "g_string_append");
        if let Some(fuzzy) = fuzzy {
            assert!(exact < fuzzy);
        }
        assert!(results[exact].score > 100);
    }

    #[test]
    fn munged_query_matches_separators() {
        let (_index, searcher) = fixture();
        // "::" in the query collapses to "." just like the indexed side.
        let results = collect(&searcher, "QString::a", None);
        assert!(results.iter().any(|r| r.name == "QString::arg"));
    }

    #[test]
    fn scope_restricts_docsets() {
        let (_index, searcher) = fixture();
        let scope: HashSet<String> = ["Qt".to_string()].into();
        let results = collect(&searcher, "string", Some(&scope));
        assert!(!results.is_empty());
        assert!(results.iter().all(|r| r.docset_name == "Qt"));
    }

    #[test]
    fn superseded_query_stops_and_skips_timing() {
        let (_index, searcher) = fixture();
        let counter = Arc::clone(&searcher.last_query);
        let mut seen = 0usize;
        let mut timed = false;
        searcher.search_all_docs(
            "string",
            None,
            |_| {
                seen += 1;
                // A newer query arrives mid-stream.
                counter.fetch_add(1, Ordering::Relaxed);
            },
            |_, _| timed = true,
        );
        assert_eq!(seen, 1, "emission stops at the next preemption check");
        assert!(!timed, "superseded query must not emit its timing frame");
    }

    #[test]
    fn emission_is_capped() {
        let index = Arc::new(GlobalIndex::new());
        let num = index.register_docset(docset("com.kapeli", "Big", "9"));
        index.append_batch(
            (0..250)
                .map(|i| row(&format!("entry{i:03}"), num, "Constant"))
                .collect(),
        );
        let searcher = Searcher::new(Arc::clone(&index), Arc::new(AtomicUsize::new(0)));
        let mut results = Vec::new();
        searcher.search_all_docs("entry", None, |r| results.push(r), |_, _| {});
        assert_eq!(results.len(), 100);
    }

    #[test]
    fn timing_callback_reports_query_number() {
        let (_index, searcher) = fixture();
        let mut reported = None;
        searcher.search_all_docs("qstring", None, |_| {}, |id, _| reported = Some(id));
        assert_eq!(reported, Some(1));
        searcher.search_all_docs("qstring", None, |_| {}, |id, _| reported = Some(id));
        assert_eq!(reported, Some(2));
    }
}
