//! Scenario C from the design notes: an SBT built over a batch of random
//! sketches must return exactly the same hits as a linear scan for the same
//! query and threshold -- tree pruning is an optimization, never a change
//! in which signatures match.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use hashpile::collection::Collection;
use hashpile::encodings::HashFunctions;
use hashpile::index::{Index, LinearIndex};
use hashpile::sbt::{SBTParams, SBT};
use hashpile::search::SearchType;
use hashpile::signature::Signature;
use hashpile::sketch::minhash::{max_hash_for_scaled, KmerMinHash};
use hashpile::sketch::Sketch;

fn random_sig(rng: &mut StdRng, name: &str, n_hashes: usize, universe: u64) -> Signature {
    let mut mh = KmerMinHash::new(0, 21, HashFunctions::Murmur64Dna, 42, max_hash_for_scaled(1), false);
    let hashes: Vec<u64> = (0..n_hashes).map(|_| rng.gen_range(0..universe)).collect();
    mh.add_many(&hashes);
    Signature::builder().name(name).signatures(vec![Sketch::MinHash(mh)]).build()
}

#[test]
fn sbt_search_agrees_with_linear_index_over_random_sketches() {
    let mut rng = StdRng::seed_from_u64(0xC0FFEE);
    let universe = 5_000u64;

    let sigs: Vec<Signature> = (0..200)
        .map(|i| random_sig(&mut rng, &format!("sig{i}"), 100, universe))
        .collect();

    let collection = Collection::from_sigs(sigs.clone()).unwrap();
    let linear = Index::Linear(LinearIndex::new(collection.clone().try_into().unwrap()));
    let sbt = Index::Sbt(SBT::from_collection(&collection.try_into().unwrap(), SBTParams::default()).unwrap());

    for q in 0..20 {
        let query = random_sig(&mut rng, &format!("query{q}"), 100, universe);

        let mut linear_hits: Vec<String> = linear
            .search(&query, 0.05, SearchType::Containment, false)
            .unwrap()
            .into_iter()
            .map(|r| r.record().name())
            .collect();
        let mut sbt_hits: Vec<String> = sbt
            .search(&query, 0.05, SearchType::Containment, false)
            .unwrap()
            .into_iter()
            .map(|r| r.record().name())
            .collect();
        linear_hits.sort();
        sbt_hits.sort();

        assert_eq!(linear_hits, sbt_hits, "mismatch on query {q}");
    }
}
