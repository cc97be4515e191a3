//! Benchmarks for the hot search path: munging, fuzzy matching, and a full
//! sharded query over a synthetic six-figure index.

use std::collections::HashSet;
use std::hint::black_box;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion};
use zeal_core::{
    match_fuzzy, munge, score_exact, DocsetRef, GlobalIndex, Searcher, SymbolRow,
};

const NAMESPACES: &[&str] = &[
    "QString", "QWidget", "GObject.Object", "std::vec::Vec", "fmt", "strings.Builder",
    "NSView", "http.Client", "tokio::sync", "Array.prototype",
];

const MEMBERS: &[&str] = &[
    "append", "arg", "split", "insert", "remove", "len", "clear", "iter", "push",
    "get", "set", "notify", "connect", "render", "flush", "read", "write",
];

/// A deterministic index shaped like a handful of real installed docsets.
fn synthetic_index(symbols: usize) -> Arc<GlobalIndex> {
    let index = Arc::new(GlobalIndex::new());
    let docsets: Vec<usize> = (0..8)
        .map(|i| {
            index.register_docset(DocsetRef {
                repo_name: "com.kapeli".to_string(),
                short_name: format!("Docset{i}"),
                id: i.to_string(),
            })
        })
        .collect();

    let mut rows = Vec::with_capacity(symbols);
    for i in 0..symbols {
        let name = format!(
            "{}::{}{}",
            NAMESPACES[i % NAMESPACES.len()],
            MEMBERS[i % MEMBERS.len()],
            i % 977
        );
        rows.push(SymbolRow {
            munged: munge(&name),
            path: format!("Docset{}.docset/Contents/Resources/Documents/{i}.html", i % 8),
            docset: docsets[i % docsets.len()],
            symbol_type: "Method".to_string(),
            name,
        });
    }
    index.append_batch(rows);
    index
}

fn bench_munge(c: &mut Criterion) {
    c.bench_function("munge_symbol", |b| {
        b.iter(|| munge(black_box("GObject.Object.getv() (GObject.Object method)")));
    });
}

fn bench_scoring(c: &mut Criterion) {
    let value = munge("QString::arg");
    c.bench_function("score_exact", |b| {
        b.iter(|| score_exact(black_box(8), black_box(3), black_box(&value)));
    });
    c.bench_function("match_fuzzy_hit", |b| {
        b.iter(|| match_fuzzy(black_box("qsarg"), black_box(&value)));
    });
    c.bench_function("match_fuzzy_miss", |b| {
        b.iter(|| match_fuzzy(black_box("zzz"), black_box(&value)));
    });
}

fn bench_search(c: &mut Criterion) {
    let index = synthetic_index(200_000);
    let searcher = Searcher::new(Arc::clone(&index), Arc::new(AtomicUsize::new(0)));

    c.bench_function("search_200k_exact", |b| {
        b.iter(|| {
            let mut hits = 0usize;
            searcher.search_all_docs(black_box("qstring.arg"), None, |_| hits += 1, |_, _| {});
            black_box(hits)
        });
    });

    c.bench_function("search_200k_fuzzy", |b| {
        b.iter(|| {
            let mut hits = 0usize;
            searcher.search_all_docs(black_box("qsg"), None, |_| hits += 1, |_, _| {});
            black_box(hits)
        });
    });

    let scope: HashSet<String> = ["Docset3".to_string()].into();
    c.bench_function("search_200k_scoped", |b| {
        b.iter(|| {
            let mut hits = 0usize;
            searcher.search_all_docs(black_box("append"), Some(&scope), |_| hits += 1, |_, _| {});
            black_box(hits)
        });
    });
}

criterion_group!(benches, bench_munge, bench_scoring, bench_search);
criterion_main!(benches);
