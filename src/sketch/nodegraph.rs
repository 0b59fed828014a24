//! Packed-bitset Bloom filter used for SBT inner nodes.

use fixedbitset::FixedBitSet;

use crate::errors::Result;
use crate::HashIntoType;

/// A counting-free Bloom filter: `n_tables` independent bitsets of
/// `tablesize` bits each, addressed by `hash.wrapping_mul(seed_i) % tablesize`
/// for `n_tables` distinct odd seeds. A hash is "present" iff every table's
/// corresponding bit is set.
#[derive(Debug, Clone)]
pub struct Nodegraph {
    bitsets: Vec<FixedBitSet>,
    tablesize: usize,
    n_occupied: usize,
}

/// Odd multipliers used to derive independent bit positions per table,
/// cheaper than re-hashing with distinct seeds per insert.
const TABLE_SEEDS: [u64; 4] = [
    0x9E3779B97F4A7C15,
    0xC2B2AE3D27D4EB4F,
    0x165667B19E3779F9,
    0x27D4EB2F165667C5,
];

impl Default for Nodegraph {
    fn default() -> Self {
        Nodegraph::with_tables(1 << 20, 2)
    }
}

impl Nodegraph {
    pub fn with_tables(tablesize: usize, n_tables: usize) -> Nodegraph {
        let n_tables = n_tables.clamp(1, TABLE_SEEDS.len());
        Nodegraph {
            bitsets: (0..n_tables).map(|_| FixedBitSet::with_capacity(tablesize)).collect(),
            tablesize,
            n_occupied: 0,
        }
    }

    fn positions(&self, hash: HashIntoType) -> Vec<usize> {
        self.bitsets
            .iter()
            .enumerate()
            .map(|(i, _)| (hash.wrapping_mul(TABLE_SEEDS[i]) as usize) % self.tablesize)
            .collect()
    }

    /// Insert a hash; returns `true` if it was already present in every
    /// table (a likely-duplicate, modulo false positives).
    pub fn count(&mut self, hash: HashIntoType) -> bool {
        let positions = self.positions(hash);
        let already_present = positions
            .iter()
            .zip(self.bitsets.iter())
            .all(|(&p, bs)| bs[p]);

        for (p, bs) in positions.into_iter().zip(self.bitsets.iter_mut()) {
            if !bs[p] {
                bs.insert(p);
            }
        }
        if !already_present {
            self.n_occupied += 1;
        }
        already_present
    }

    pub fn get(&self, hash: HashIntoType) -> bool {
        self.positions(hash)
            .into_iter()
            .zip(self.bitsets.iter())
            .all(|(p, bs)| bs[p])
    }

    /// Update `self`'s bits to the union of `self` and `other`. Both must
    /// share the same table layout.
    pub fn update(&mut self, other: &Nodegraph) {
        for (mine, theirs) in self.bitsets.iter_mut().zip(other.bitsets.iter()) {
            mine.union_with(theirs);
        }
        self.n_occupied = self.bitsets[0].count_ones(..);
    }

    /// Count how many of `hashes` test present (an upper bound on the true
    /// intersection size, modulo Bloom false positives).
    pub fn count_matches(&self, hashes: &[HashIntoType]) -> usize {
        hashes.iter().filter(|h| self.get(**h)).count()
    }

    pub fn n_occupied(&self) -> usize {
        self.n_occupied
    }

    pub fn tablesize(&self) -> usize {
        self.tablesize
    }

    pub fn ntables(&self) -> usize {
        self.bitsets.len()
    }

    /// Expected false-positive rate of a membership test, from the standard
    /// Bloom filter formula `(occupancy)^n_tables`.
    pub fn expected_collisions(&self) -> f64 {
        if self.tablesize == 0 {
            return 0.0;
        }
        let occupancy = self.n_occupied as f64 / self.tablesize as f64;
        occupancy.powi(self.bitsets.len() as i32)
    }

    /// Drop the Bloom filter bytes, e.g. after cache eviction. The node
    /// remains addressable but must be reloaded from storage before the
    /// next query.
    pub fn unload(&mut self) {
        self.bitsets.clear();
        self.n_occupied = 0;
    }

    pub fn is_unloaded(&self) -> bool {
        self.bitsets.is_empty()
    }

    pub fn save_to_writer<W: std::io::Write>(&self, writer: &mut W) -> Result<()> {
        use byteorder::{LittleEndian, WriteBytesExt};
        writer.write_u64::<LittleEndian>(self.tablesize as u64)?;
        writer.write_u64::<LittleEndian>(self.bitsets.len() as u64)?;
        for bs in &self.bitsets {
            let bytes: Vec<u8> = bs.as_slice().iter().flat_map(|b| b.to_le_bytes()).collect();
            writer.write_u64::<LittleEndian>(bytes.len() as u64)?;
            writer.write_all(&bytes)?;
        }
        Ok(())
    }

    pub fn from_reader<R: std::io::Read>(mut reader: R) -> Result<Nodegraph> {
        use byteorder::{LittleEndian, ReadBytesExt};
        let tablesize = reader.read_u64::<LittleEndian>()? as usize;
        let n_tables = reader.read_u64::<LittleEndian>()? as usize;
        let mut bitsets = Vec::with_capacity(n_tables);
        let mut n_occupied = 0usize;
        for i in 0..n_tables {
            let nbytes = reader.read_u64::<LittleEndian>()? as usize;
            let mut raw = vec![0u8; nbytes];
            reader.read_exact(&mut raw)?;
            let mut bs = FixedBitSet::with_capacity(tablesize);
            for (bit_idx, chunk) in raw.chunks(4).enumerate() {
                let mut buf = [0u8; 4];
                buf[..chunk.len()].copy_from_slice(chunk);
                let word = u32::from_le_bytes(buf);
                for b in 0..32 {
                    let pos = bit_idx * 32 + b;
                    if pos < tablesize && (word >> b) & 1 == 1 {
                        bs.insert(pos);
                    }
                }
            }
            if i == 0 {
                n_occupied = bs.count_ones(..);
            }
            bitsets.push(bs);
        }
        Ok(Nodegraph {
            bitsets,
            tablesize,
            n_occupied,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn insert_then_contains() {
        let mut ng = Nodegraph::with_tables(4096, 2);
        ng.count(12345);
        assert!(ng.get(12345));
        assert!(!ng.get(99999999));
    }

    #[test]
    fn update_is_union() {
        let mut a = Nodegraph::with_tables(4096, 2);
        a.count(1);
        let mut b = Nodegraph::with_tables(4096, 2);
        b.count(2);
        a.update(&b);
        assert!(a.get(1));
        assert!(a.get(2));
    }

    #[test]
    fn unload_clears_bytes() {
        let mut ng = Nodegraph::with_tables(4096, 2);
        ng.count(1);
        ng.unload();
        assert!(ng.is_unloaded());
    }

    #[test]
    fn roundtrip_save_load() {
        let mut ng = Nodegraph::with_tables(4096, 2);
        for h in 0..50u64 {
            ng.count(h);
        }
        let mut buf = Vec::new();
        ng.save_to_writer(&mut buf).unwrap();
        let loaded = Nodegraph::from_reader(&buf[..]).unwrap();
        for h in 0..50u64 {
            assert!(loaded.get(h));
        }
    }
}
