//! Parse, save and merge throughput on generated documents

use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use std::hint::black_box;

use pdf_editor_core::{add_page, add_text, encrypt, merge, Document, EncryptOptions, PageSize, SaveOptions, TextOptions};

/// Document with `pages` pages, each carrying one line of text
fn generate_document(pages: usize) -> Document {
    (0..pages)
        .try_fold(Document::new(), |document, index| {
            let document = add_page(&document, PageSize::A4, None)?;
            add_text(&document, index, &format!("Page {}", index + 1), 72.0, 720.0, &TextOptions::default())
        })
        .expect("generated document")
}

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse");

    for pages in [10, 100, 500] {
        let table = generate_document(pages).to_bytes().expect("table bytes");
        group.bench_with_input(BenchmarkId::new("xref_table", pages), &table, |b, bytes| {
            b.iter(|| black_box(Document::parse(bytes).expect("parse")))
        });

        let stream = generate_document(pages)
            .to_bytes_with(&SaveOptions::default().with_xref_stream().with_compression(true))
            .expect("stream bytes");
        group.bench_with_input(BenchmarkId::new("xref_stream", pages), &stream, |b, bytes| {
            b.iter(|| black_box(Document::parse(bytes).expect("parse")))
        });
    }

    group.finish();
}

fn bench_save(c: &mut Criterion) {
    let mut group = c.benchmark_group("save");

    for pages in [10, 100, 500] {
        let document = generate_document(pages);
        group.bench_with_input(BenchmarkId::new("plain", pages), &document, |b, document| {
            b.iter(|| black_box(document.to_bytes().expect("save")))
        });

        let encrypted = encrypt(&document, &EncryptOptions::new("bench")).expect("encrypt");
        group.bench_with_input(BenchmarkId::new("aes256", pages), &encrypted, |b, document| {
            b.iter(|| black_box(document.to_bytes().expect("save")))
        });
    }

    group.finish();
}

fn bench_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge");

    for inputs in [2, 8] {
        let documents: Vec<Document> = (0..inputs).map(|_| generate_document(50)).collect();
        group.bench_with_input(BenchmarkId::new("50_pages_each", inputs), &documents, |b, documents| {
            b.iter_batched(
                || documents.clone(),
                |documents| black_box(merge(&documents).expect("merge")),
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

criterion_group!(benches, bench_parse, bench_save, bench_merge);
criterion_main!(benches);
