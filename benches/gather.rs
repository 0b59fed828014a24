use criterion::{black_box, criterion_group, criterion_main, Criterion};

use hashpile::collection::Collection;
use hashpile::encodings::HashFunctions;
use hashpile::gather::gather;
use hashpile::index::{Index, LinearIndex};
use hashpile::signature::Signature;
use hashpile::sketch::minhash::{max_hash_for_scaled, KmerMinHash};
use hashpile::sketch::Sketch;

fn make_sig(name: &str, hashes: &[u64]) -> Signature {
    let mut mh = KmerMinHash::new(0, 21, HashFunctions::Murmur64Dna, 42, max_hash_for_scaled(1), false);
    mh.add_many(hashes);
    Signature::builder().name(name).signatures(vec![Sketch::MinHash(mh)]).build()
}

fn gather_benchmarks(c: &mut Criterion) {
    let references: Vec<Signature> = (0..50)
        .map(|i| {
            let start = i * 100;
            make_sig(&format!("ref{i}"), &(start..start + 100).collect::<Vec<_>>())
        })
        .collect();
    let collection = Collection::from_sigs(references).unwrap();
    let index = Index::Linear(LinearIndex::new(collection.try_into().unwrap()));

    let query = make_sig("query", &(0..2_000).collect::<Vec<_>>());

    let mut group = c.benchmark_group("gather");
    group.sample_size(10);

    group.bench_function("full_run_50_refs", |b| {
        b.iter(|| {
            gather(black_box(&index), black_box(&query), black_box(1)).unwrap();
        });
    });

    group.finish();
}

criterion_group!(gather_bench, gather_benchmarks);
criterion_main!(gather_bench);
