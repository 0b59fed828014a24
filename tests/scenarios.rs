//! Black-box scenarios exercised against the public API only, one per
//! major user-facing capability: similarity round-trip, gather, SBT/linear
//! agreement, LCA classification (unambiguous and disagreeing), and
//! manifest-driven selection.

use std::collections::HashMap;

use hashpile::collection::Collection;
use hashpile::encodings::HashFunctions;
use hashpile::index::{Index, LinearIndex};
use hashpile::lca_db::{ClassifyStatus, LcaDb, Lineage};
use hashpile::sbt::{SBTParams, SBT};
use hashpile::search::SearchType;
use hashpile::selection::Selection;
use hashpile::signature::Signature;
use hashpile::sketch::minhash::{max_hash_for_scaled, KmerMinHash};
use hashpile::sketch::Sketch;

fn sig_from_hashes(name: &str, hashes: &[u64], scaled: u64) -> Signature {
    let mut mh = KmerMinHash::new(0, 21, HashFunctions::Murmur64Dna, 42, max_hash_for_scaled(scaled), false);
    mh.add_many(hashes);
    Signature::builder()
        .hash_function("0.murmur64")
        .name(name)
        .filename(None)
        .signatures(vec![Sketch::MinHash(mh)])
        .build()
}

/// Scenario: two sketches built from overlapping hash sets should report
/// the Jaccard similarity their overlap implies, and agree in both
/// directions.
#[test]
fn dna_similarity_round_trip() {
    let a = sig_from_hashes("a", &[1, 2, 3, 4], 1).minhash().unwrap().clone();
    let b = sig_from_hashes("b", &[3, 4, 5, 6], 1).minhash().unwrap().clone();

    let similarity_ab = a.similarity(&b, true).unwrap();
    let similarity_ba = b.similarity(&a, true).unwrap();

    assert!((similarity_ab - 2.0 / 6.0).abs() < 1e-9);
    assert_eq!(similarity_ab, similarity_ba);
}

/// Scenario: a query built from two known references, searched with
/// `gather`, should peel off both in decreasing order of unique
/// contribution and leave nothing further to report.
#[test]
fn gather_decomposes_synthetic_mixture() {
    let ref_a = sig_from_hashes("ref_a", &(0..20).collect::<Vec<_>>(), 1);
    let ref_b = sig_from_hashes("ref_b", &(20..30).collect::<Vec<_>>(), 1);
    let query = sig_from_hashes("query", &(0..30).collect::<Vec<_>>(), 1);

    let collection = Collection::from_sigs(vec![ref_a, ref_b]).unwrap();
    let index = Index::Linear(LinearIndex::new(collection.try_into().unwrap()));

    let results = hashpile::gather::gather(&index, &query, 1).unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].record().name(), "ref_a");
    assert_eq!(results[1].record().name(), "ref_b");
    assert!(results[0].f_unique_to_query() > results[1].f_unique_to_query());
}

/// Scenario: an SBT built over the same signatures as a linear index must
/// return the same search results -- tree pruning is an optimization, not
/// a change in semantics.
#[test]
fn sbt_agrees_with_linear_index() {
    let sigs = vec![
        sig_from_hashes("one", &[1, 2, 3, 4, 5], 1),
        sig_from_hashes("two", &[4, 5, 6, 7, 8], 1),
        sig_from_hashes("three", &[100, 101, 102], 1),
    ];
    let query = sig_from_hashes("query", &[1, 2, 3, 4, 5, 6], 1);

    let collection = Collection::from_sigs(sigs.clone()).unwrap();
    let linear = Index::Linear(LinearIndex::new(collection.clone().try_into().unwrap()));

    let mut sbt = SBT::new(SBTParams::default());
    for (i, sig) in sigs.into_iter().enumerate() {
        let record = collection.manifest().iter().nth(i).unwrap().clone();
        sbt.insert(sig, record).unwrap();
    }
    let sbt = Index::Sbt(sbt);

    let mut linear_hits = linear
        .search(&query, 0.1, SearchType::Jaccard, false)
        .unwrap()
        .into_iter()
        .map(|r| r.record().name())
        .collect::<Vec<_>>();
    let mut sbt_hits = sbt
        .search(&query, 0.1, SearchType::Jaccard, false)
        .unwrap()
        .into_iter()
        .map(|r| r.record().name())
        .collect::<Vec<_>>();
    linear_hits.sort();
    sbt_hits.sort();

    assert_eq!(linear_hits, sbt_hits);
    assert!(linear_hits.contains(&"one".to_string()));
    assert!(linear_hits.contains(&"two".to_string()));
    assert!(!linear_hits.contains(&"three".to_string()));
}

fn lineage(pairs: &[(&str, &str)]) -> Lineage {
    pairs.iter().map(|(rank, name)| (rank.to_string(), name.to_string())).collect()
}

/// Scenario: every indexed hash a query matches traces back to the same
/// lineage, so classification should come back unambiguously `found`.
#[test]
fn lca_classify_unambiguous_lineage_is_found() {
    let lin = lineage(&[("superkingdom", "Bacteria"), ("genus", "Escherichia"), ("species", "coli")]);
    let sig = sig_from_hashes("ecoli", &(0..20).collect::<Vec<_>>(), 1);

    let mut db = LcaDb::new(21, 1, HashFunctions::Murmur64Dna);
    db.insert(&sig, Some("ecoli"), Some(lin.clone())).unwrap();

    let query = sig_from_hashes("query", &(0..20).collect::<Vec<_>>(), 1);
    let result = db.classify(&query, 1, false).unwrap();

    assert_eq!(result.status, ClassifyStatus::Found);
    assert_eq!(result.lineage, lin);
}

/// Scenario: a query evenly split between two references whose lineages
/// diverge below genus should come back `disagree`, truncated to their
/// shared ancestor.
#[test]
fn lca_classify_disagreeing_lineages_truncate_to_common_ancestor() {
    let lin_a = lineage(&[("superkingdom", "Bacteria"), ("phylum", "Proteobacteria"), ("genus", "Escherichia")]);
    let lin_b = lineage(&[("superkingdom", "Bacteria"), ("phylum", "Proteobacteria"), ("genus", "Salmonella")]);

    let sig_a = sig_from_hashes("a", &(0..10).collect::<Vec<_>>(), 1);
    let sig_b = sig_from_hashes("b", &(10..20).collect::<Vec<_>>(), 1);

    let mut db = LcaDb::new(21, 1, HashFunctions::Murmur64Dna);
    db.insert(&sig_a, Some("a"), Some(lin_a)).unwrap();
    db.insert(&sig_b, Some("b"), Some(lin_b)).unwrap();

    let query = sig_from_hashes("query", &(0..20).collect::<Vec<_>>(), 1);
    let result = db.classify(&query, 1, false).unwrap();

    assert_eq!(result.status, ClassifyStatus::Disagree);
    assert_eq!(result.lineage, lineage(&[("superkingdom", "Bacteria"), ("phylum", "Proteobacteria")]));
}

/// Scenario: selecting a collection down to a single ksize should drop
/// every record built at a different ksize while keeping the rest.
#[test]
fn selection_filters_manifest_by_ksize() {
    let mut mh21 = KmerMinHash::new(0, 21, HashFunctions::Murmur64Dna, 42, max_hash_for_scaled(1), false);
    mh21.add_many(&[1, 2, 3]);
    let sig21 = Signature::builder()
        .hash_function("0.murmur64")
        .name("k21")
        .filename(None)
        .signatures(vec![Sketch::MinHash(mh21)])
        .build();

    let mut mh31 = KmerMinHash::new(0, 31, HashFunctions::Murmur64Dna, 42, max_hash_for_scaled(1), false);
    mh31.add_many(&[4, 5, 6]);
    let sig31 = Signature::builder()
        .hash_function("0.murmur64")
        .name("k31")
        .filename(None)
        .signatures(vec![Sketch::MinHash(mh31)])
        .build();

    let collection = Collection::from_sigs(vec![sig21, sig31]).unwrap();
    let selection = Selection::builder().ksize(21).build();

    use hashpile::prelude::Select;
    let selected = collection.select(&selection).unwrap();

    assert_eq!(selected.len(), 1);
    assert_eq!(selected.manifest().iter().next().unwrap().name(), "k21");
}

/// Scenario: `lca_db::LcaDb::build` skips signatures whose identifier has
/// no taxonomy entry rather than erroring, still indexing their hashes.
#[test]
fn lca_build_indexes_unassigned_signatures_without_lineage() {
    let assigned = sig_from_hashes("assigned", &[1, 2, 3], 1);
    let unassigned = sig_from_hashes("unassigned", &[4, 5, 6], 1);

    let mut taxonomy = HashMap::new();
    taxonomy.insert("assigned".to_string(), lineage(&[("superkingdom", "Bacteria")]));

    let db = LcaDb::build(21, 1, HashFunctions::Murmur64Dna, &[assigned, unassigned], &taxonomy).unwrap();
    assert_eq!(db.len(), 2);

    let query = sig_from_hashes("query", &[4, 5, 6], 1);
    let result = db.classify(&query, 1, false).unwrap();
    assert_eq!(result.status, ClassifyStatus::NoMatch);
}
