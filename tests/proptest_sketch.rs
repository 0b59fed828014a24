//! Property tests for the quantified sketch invariants: scaled containment,
//! Jaccard symmetry/reflexivity, containment ordering, md5 order-independence,
//! downsample idempotence, and merge associativity/commutativity.

use proptest::collection::vec;
use proptest::num::u64;
use proptest::prelude::*;

use hashpile::encodings::HashFunctions;
use hashpile::sketch::minhash::{max_hash_for_scaled, KmerMinHash};

fn scaled_mh(scaled: u64, hashes: &[u64]) -> KmerMinHash {
    let mut mh = KmerMinHash::new(0, 21, HashFunctions::Murmur64Dna, 42, max_hash_for_scaled(scaled), false);
    mh.add_many(hashes);
    mh
}

proptest! {
    #[test]
    fn scaled_sketch_never_retains_hashes_above_max_hash(hashes in vec(u64::ANY, 0..500)) {
        let mh = scaled_mh(1000, &hashes);
        let max_hash = mh.max_hash();
        for h in mh.mins() {
            prop_assert!(h < max_hash);
        }
    }

    #[test]
    fn num_sketch_never_exceeds_its_bound(hashes in vec(u64::ANY, 0..2000)) {
        let mut mh = KmerMinHash::new(50, 21, HashFunctions::Murmur64Dna, 42, 0, false);
        mh.add_many(&hashes);
        prop_assert!(mh.size() <= 50);
    }

    #[test]
    fn md5_is_independent_of_insertion_order(hashes in vec(u64::ANY, 1..500)) {
        let forward = scaled_mh(1000, &hashes);
        let mut reversed_input = hashes.clone();
        reversed_input.reverse();
        let backward = scaled_mh(1000, &reversed_input);
        prop_assert_eq!(forward.md5sum(), backward.md5sum());
    }

    #[test]
    fn jaccard_is_symmetric_and_bounded(a in vec(u64::ANY, 0..300), b in vec(u64::ANY, 0..300)) {
        let mh_a = scaled_mh(1000, &a);
        let mh_b = scaled_mh(1000, &b);
        let jab = mh_a.jaccard(&mh_b).unwrap();
        let jba = mh_b.jaccard(&mh_a).unwrap();
        prop_assert!((jab - jba).abs() < 1e-12);
        prop_assert!((0.0..=1.0).contains(&jab));
    }

    #[test]
    fn jaccard_of_a_sketch_with_itself_is_one(hashes in vec(u64::ANY, 1..300)) {
        let mh = scaled_mh(1000, &hashes);
        prop_assert!((mh.jaccard(&mh).unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn containment_is_bounded_by_max_containment(a in vec(u64::ANY, 1..300), b in vec(u64::ANY, 1..300)) {
        let mh_a = scaled_mh(1000, &a);
        let mh_b = scaled_mh(1000, &b);
        let c_ab = mh_a.containment(&mh_b).unwrap();
        let c_ba = mh_b.containment(&mh_a).unwrap();
        let max_c = mh_a.max_containment(&mh_b).unwrap();
        prop_assert!(c_ab <= max_c + 1e-12);
        prop_assert!(c_ab.min(c_ba) <= max_c + 1e-12);
        prop_assert!(max_c <= 1.0 + 1e-12);
    }

    #[test]
    fn downsample_is_idempotent(hashes in vec(u64::ANY, 0..2000)) {
        let mh = scaled_mh(100, &hashes);
        let once = mh.downsample_scaled(5000).unwrap();
        let twice = once.downsample_scaled(5000).unwrap();
        prop_assert_eq!(once.mins(), twice.mins());
    }

    #[test]
    fn merge_is_commutative(a in vec(u64::ANY, 0..300), b in vec(u64::ANY, 0..300)) {
        let mut ab = scaled_mh(1000, &a);
        ab.merge(&scaled_mh(1000, &b)).unwrap();

        let mut ba = scaled_mh(1000, &b);
        ba.merge(&scaled_mh(1000, &a)).unwrap();

        prop_assert_eq!(ab.mins(), ba.mins());
    }

    #[test]
    fn merge_is_associative(
        a in vec(u64::ANY, 0..200),
        b in vec(u64::ANY, 0..200),
        c in vec(u64::ANY, 0..200),
    ) {
        let mut ab_c = scaled_mh(1000, &a);
        ab_c.merge(&scaled_mh(1000, &b)).unwrap();
        ab_c.merge(&scaled_mh(1000, &c)).unwrap();

        let mut bc = scaled_mh(1000, &b);
        bc.merge(&scaled_mh(1000, &c)).unwrap();
        let mut a_bc = scaled_mh(1000, &a);
        a_bc.merge(&bc).unwrap();

        prop_assert_eq!(ab_c.mins(), a_bc.mins());
    }
}
