//! Randomized (but seeded) checks of the scoring and index invariants over
//! a corpus that looks like a mix of real docsets.

use std::sync::atomic::AtomicUsize;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use zeal_core::{
    match_fuzzy, munge, score_exact, score_fuzzy, DocsetRef, GlobalIndex, Searcher, SymbolRow,
};

const SEPARATORS: &[&str] = &["::", ".", " ", "/", "_"];
const WORDS: &[&str] = &[
    "string", "vector", "object", "widget", "builder", "client", "reader", "writer", "signal",
    "buffer", "array", "index", "parse", "append", "remove", "notify", "render",
];

fn random_symbol(rng: &mut StdRng) -> String {
    let parts = rng.gen_range(1..=4);
    let mut name = String::new();
    for i in 0..parts {
        if i > 0 {
            name.push_str(SEPARATORS.choose(rng).unwrap());
        }
        name.push_str(WORDS.choose(rng).unwrap());
    }
    if rng.gen_bool(0.3) {
        name.push_str("()");
    }
    name
}

fn is_subsequence(needle: &str, haystack: &str) -> bool {
    let mut chars = haystack.bytes();
    needle
        .bytes()
        .all(|n| chars.by_ref().any(|h| h == n))
}

#[test]
fn munge_is_idempotent_over_corpus() {
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..500 {
        let symbol = random_symbol(&mut rng);
        let once = munge(&symbol);
        assert_eq!(munge(&once), once, "munge must be idempotent for {symbol:?}");
    }
}

#[test]
fn match_scores_stay_in_range() {
    let mut rng = StdRng::seed_from_u64(11);
    for _ in 0..2000 {
        let haystack = munge(&random_symbol(&mut rng));
        let needle = munge(WORDS.choose(&mut rng).unwrap());

        if let Some(pos) = haystack.find(&needle) {
            let score = score_exact(pos, needle.len(), &haystack);
            assert!(
                (0..=100).contains(&score),
                "score_exact({pos}, {}, {haystack:?}) = {score}",
                needle.len()
            );
            if score == 0 {
                // Zero only rejects loose single-character matches.
                assert_eq!(needle.len(), 1);
            }
        } else if let Some((start, length)) = match_fuzzy(&needle, &haystack) {
            assert!(start >= 1);
            let score = score_fuzzy(&haystack, start, length);
            assert!(
                (1..=100).contains(&score),
                "score_fuzzy({haystack:?}, {start}, {length}) = {score}"
            );
            // A successful fuzzy match implies the needle is a subsequence.
            assert!(
                is_subsequence(&needle, &haystack),
                "{needle:?} not a subsequence of {haystack:?}"
            );
        }
    }
}

#[test]
fn search_emits_sorted_capped_streams_over_random_corpus() {
    let mut rng = StdRng::seed_from_u64(23);
    let index = Arc::new(GlobalIndex::new());
    let docsets: Vec<usize> = (0..5)
        .map(|i| {
            index.register_docset(DocsetRef {
                repo_name: "com.kapeli".to_string(),
                short_name: format!("D{i}"),
                id: i.to_string(),
            })
        })
        .collect();

    let rows: Vec<SymbolRow> = (0..5000)
        .map(|i| {
            let name = random_symbol(&mut rng);
            SymbolRow {
                munged: munge(&name),
                path: format!("D{}.docset/Contents/Resources/Documents/{i}.html", i % 5),
                docset: docsets[i % docsets.len()],
                symbol_type: "Method".to_string(),
                name,
            }
        })
        .collect();
    index.append_batch(rows);

    let searcher = Searcher::new(Arc::clone(&index), Arc::new(AtomicUsize::new(0)));
    for query in ["string", "obj", "render()", "vector/index", "zz"] {
        let mut results = Vec::new();
        searcher.search_all_docs(query, None, |r| results.push(r), |_, _| {});

        assert!(results.len() <= 100, "{query}: cap exceeded");
        for pair in results.windows(2) {
            assert!(
                pair[0].score > pair[1].score
                    || (pair[0].score == pair[1].score && pair[0].name <= pair[1].name),
                "{query}: order violated between {:?} and {:?}",
                pair[0].name,
                pair[1].name
            );
        }
    }
}

#[test]
fn interleaved_installs_and_removals_keep_arrays_parallel() {
    let mut rng = StdRng::seed_from_u64(41);
    let index = GlobalIndex::new();
    let mut live: Vec<usize> = Vec::new();

    for round in 0..40 {
        if live.is_empty() || rng.gen_bool(0.6) {
            let num = index.register_docset(DocsetRef {
                repo_name: "com.kapeli".to_string(),
                short_name: format!("S{round}"),
                id: round.to_string(),
            });
            let rows: Vec<SymbolRow> = (0..rng.gen_range(1..50))
                .map(|i| {
                    let name = random_symbol(&mut rng);
                    SymbolRow {
                        munged: munge(&name),
                        path: format!("{i}.html"),
                        docset: num,
                        symbol_type: "Function".to_string(),
                        name,
                    }
                })
                .collect();
            index.append_batch(rows);
            live.push(num);
        } else {
            let victim = live.swap_remove(rng.gen_range(0..live.len()));
            index.remove_by_docset(victim);
        }

        let data = index.read();
        let len = data.len();
        assert_eq!(data.names().len(), len);
        assert_eq!(data.munged().len(), len);
        assert_eq!(data.paths().len(), len);
        assert_eq!(data.docsets().len(), len);
        assert_eq!(data.types().len(), len);
        for &d in data.docsets() {
            assert!(live.contains(&d), "row points at a removed docset");
        }
    }
}
