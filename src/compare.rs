//! All-pairs similarity over a batch of sketches: the one explicit
//! concurrency seam in this crate. The output matrix is row-major and
//! symmetric; each row is independent of every other, so with the
//! `parallel` feature enabled rows are dispatched to a `rayon` thread pool
//! instead of computed serially, mirroring the
//! `#[cfg(feature = "parallel")]` row-chunking used by
//! [`crate::index::LinearIndex`]'s reference-signature scan.

use cfg_if::cfg_if;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::errors::Result;
use crate::sketch::minhash::KmerMinHash;

/// A dense `n x n` row-major similarity matrix over the sketches passed to
/// [`compare_all`]/[`compare_all_containment`]. `matrix[i * n + j]` is the
/// score of sketch `i` against sketch `j`; the diagonal is always `1.0`.
#[derive(Debug, Clone)]
pub struct CompareMatrix {
    n: usize,
    values: Vec<f64>,
}

impl CompareMatrix {
    pub fn n(&self) -> usize {
        self.n
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.values[i * self.n + j]
    }

    pub fn row(&self, i: usize) -> &[f64] {
        &self.values[i * self.n..(i + 1) * self.n]
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }
}

fn compute_row(i: usize, sketches: &[KmerMinHash], n: usize, containment: bool) -> Result<Vec<f64>> {
    let mut row = vec![0.0; n];
    for j in 0..n {
        if i == j {
            row[j] = 1.0;
            continue;
        }
        row[j] = if containment {
            sketches[i].containment(&sketches[j])?
        } else {
            sketches[i].similarity(&sketches[j], true)?
        };
    }
    Ok(row)
}

fn compare_rows(sketches: &[KmerMinHash], containment: bool) -> Result<Vec<Vec<f64>>> {
    let n = sketches.len();

    cfg_if! {
        if #[cfg(feature = "parallel")] {
            (0..n)
                .into_par_iter()
                .map(|i| compute_row(i, sketches, n, containment))
                .collect()
        } else {
            (0..n).map(|i| compute_row(i, sketches, n, containment)).collect()
        }
    }
}

/// Jaccard similarity between every pair of `sketches`.
pub fn compare_all(sketches: &[KmerMinHash]) -> Result<CompareMatrix> {
    let n = sketches.len();
    let rows = compare_rows(sketches, false)?;
    Ok(CompareMatrix {
        n,
        values: rows.into_iter().flatten().collect(),
    })
}

/// Containment of row against column (`row.containment(&column)`) for every
/// pair of `sketches`; unlike Jaccard this matrix is not symmetric.
pub fn compare_all_containment(sketches: &[KmerMinHash]) -> Result<CompareMatrix> {
    let n = sketches.len();
    let rows = compare_rows(sketches, true)?;
    Ok(CompareMatrix {
        n,
        values: rows.into_iter().flatten().collect(),
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::encodings::HashFunctions;
    use crate::sketch::minhash::max_hash_for_scaled;

    fn mh(hashes: &[u64]) -> KmerMinHash {
        let mut mh = KmerMinHash::new(0, 21, HashFunctions::Murmur64Dna, 42, max_hash_for_scaled(1), false);
        mh.add_many(hashes);
        mh
    }

    #[test]
    fn diagonal_is_always_one() {
        let sketches = vec![mh(&[1, 2, 3]), mh(&[4, 5, 6]), mh(&[1, 4, 7])];
        let matrix = compare_all(&sketches).unwrap();
        for i in 0..matrix.n() {
            assert_eq!(matrix.get(i, i), 1.0);
        }
    }

    #[test]
    fn jaccard_matrix_is_symmetric() {
        let sketches = vec![mh(&[1, 2, 3, 4]), mh(&[3, 4, 5, 6])];
        let matrix = compare_all(&sketches).unwrap();
        assert_eq!(matrix.get(0, 1), matrix.get(1, 0));
        assert!((matrix.get(0, 1) - 2.0 / 6.0).abs() < 1e-9);
    }

    #[test]
    fn containment_matrix_need_not_be_symmetric() {
        let sketches = vec![mh(&[1, 2, 3, 4]), mh(&[1, 2])];
        let matrix = compare_all_containment(&sketches).unwrap();
        assert_eq!(matrix.get(1, 0), 1.0);
        assert!((matrix.get(0, 1) - 0.5).abs() < 1e-9);
    }
}
