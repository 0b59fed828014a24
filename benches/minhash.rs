use criterion::{criterion_group, criterion_main, Criterion};

use hashpile::encodings::HashFunctions;
use hashpile::sketch::minhash::{max_hash_for_scaled, KmerMinHash};

fn intersection(c: &mut Criterion) {
    let mut mh = KmerMinHash::new(0, 21, HashFunctions::Murmur64Dna, 42, max_hash_for_scaled(1), false);
    let mut mh2 = KmerMinHash::new(0, 21, HashFunctions::Murmur64Dna, 42, max_hash_for_scaled(1), false);
    for i in 0..10_000u64 {
        if i % 3 == 0 {
            mh.add_hash(i);
        }
        if i % 5 == 0 {
            mh2.add_hash(i);
        }
    }

    let mut group = c.benchmark_group("minhash");
    group.sample_size(10);

    group.bench_function("intersection", |b| {
        b.iter(|| {
            mh.intersection(&mh2).unwrap();
        });
    });

    group.bench_function("intersection_size", |b| {
        b.iter(|| {
            mh.count_common(&mh2, false).unwrap();
        });
    });

    let mut mh1_large = KmerMinHash::new(0, 21, HashFunctions::Murmur64Dna, 42, 1_000_000, false);
    let mut mh2_large = KmerMinHash::new(0, 21, HashFunctions::Murmur64Dna, 42, 1_000_000, false);
    for i in 0..=1_000_000u64 {
        if i % 2 == 0 {
            mh1_large.add_hash(i);
        }
        if i % 45 == 0 {
            mh2_large.add_hash(i);
        }
    }

    group.bench_function("large intersection", |b| {
        b.iter(|| {
            mh1_large.intersection(&mh2_large).unwrap();
        });
    });

    group.bench_function("large intersection_size", |b| {
        b.iter(|| {
            mh1_large.count_common(&mh2_large, false).unwrap();
        });
    });

    group.finish();
}

fn jaccard_and_containment(c: &mut Criterion) {
    let mut mh = KmerMinHash::new(0, 31, HashFunctions::Murmur64Dna, 42, max_hash_for_scaled(1000), false);
    let mut mh2 = KmerMinHash::new(0, 31, HashFunctions::Murmur64Dna, 42, max_hash_for_scaled(1000), false);
    for i in 0..50_000u64 {
        if i % 7 == 0 {
            mh.add_hash(i);
        }
        if i % 11 == 0 {
            mh2.add_hash(i);
        }
    }

    let mut group = c.benchmark_group("minhash_similarity");
    group.sample_size(20);

    group.bench_function("jaccard", |b| {
        b.iter(|| mh.jaccard(&mh2).unwrap());
    });

    group.bench_function("containment", |b| {
        b.iter(|| mh.containment(&mh2).unwrap());
    });

    group.finish();
}

criterion_group!(minhash, intersection, jaccard_and_containment);
criterion_main!(minhash);
