//! Tabular summary of a signature collection: one row per sketch, enabling
//! selection before any sketch payload is loaded from storage.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::ops::Deref;
use std::str::FromStr;

use camino::Utf8PathBuf as PathBuf;
use getset::{CopyGetters, Getters, Setters};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::encodings::HashFunctions;
use crate::errors::{Error, Result};
use crate::prelude::Select;
use crate::selection::Selection;
use crate::signature::Signature;
use crate::sketch::Sketch;

fn bool_to_int<S>(value: &bool, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_u8(if *value { 1 } else { 0 })
}

fn int_to_bool<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    Ok(matches!(s.trim(), "1" | "true" | "True" | "TRUE"))
}

/// One row of a [`Manifest`]: the sketch parameters and identity of one
/// sketch inside one signature file.
#[derive(Debug, Clone, Serialize, Deserialize, Getters, CopyGetters, Setters)]
pub struct Record {
    #[getset(get = "pub", set = "pub")]
    internal_location: PathBuf,

    #[getset(get = "pub", set = "pub")]
    md5: String,

    #[getset(get = "pub", set = "pub")]
    md5short: String,

    #[getset(get_copy = "pub", set = "pub")]
    ksize: u32,

    #[getset(set = "pub")]
    moltype: String,

    #[getset(get_copy = "pub", set = "pub")]
    num: u32,

    #[getset(get_copy = "pub", set = "pub")]
    scaled: u64,

    #[getset(get_copy = "pub", set = "pub")]
    n_hashes: usize,

    #[getset(get_copy = "pub", set = "pub")]
    #[serde(serialize_with = "bool_to_int", deserialize_with = "int_to_bool")]
    with_abundance: bool,

    #[getset(get = "pub", set = "pub")]
    name: Option<String>,

    #[getset(get = "pub", set = "pub")]
    filename: Option<String>,
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.ksize == other.ksize
            && self.moltype == other.moltype
            && self.num == other.num
            && self.scaled == other.scaled
            && self.with_abundance == other.with_abundance
    }
}

impl Record {
    /// One `Record` per sketch in `sig`, with `internal_location` set to
    /// `path`.
    pub fn from_sig(sig: &Signature, path: &str) -> Vec<Record> {
        sig.sketches()
            .iter()
            .map(|sketch| {
                let ksize = if sketch.hash_function().is_amino_acid() {
                    sketch.ksize() / 3
                } else {
                    sketch.ksize()
                };
                let md5 = sketch.md5sum();
                let md5short = md5.chars().take(8).collect();
                Record {
                    internal_location: path.into(),
                    md5,
                    md5short,
                    ksize,
                    moltype: sketch.hash_function().to_string(),
                    num: sketch.num(),
                    scaled: sketch.scaled(),
                    n_hashes: sketch.size(),
                    with_abundance: sketch.track_abundance(),
                    name: Some(sig.name()).filter(|s| !s.is_empty()),
                    filename: sig.filename(),
                }
            })
            .collect()
    }

    pub fn moltype(&self) -> Result<HashFunctions> {
        HashFunctions::from_str(&self.moltype)
    }

    pub fn check_compatible(&self, other: &Record) -> Result<()> {
        if self != other {
            return Err(Error::IncompatibleIndex(format!(
                "manifest rows are not compatible: {:?} vs {:?}",
                self, other
            )));
        }
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn dummy_named(name: &str) -> Record {
        Record {
            internal_location: "".into(),
            md5: format!("{:x}", md5::compute(name)),
            md5short: "".into(),
            ksize: 21,
            moltype: "DNA".into(),
            num: 0,
            scaled: 1000,
            n_hashes: 0,
            with_abundance: false,
            name: Some(name.into()),
            filename: None,
        }
    }
}

/// Ordered collection of [`Record`]s describing a signature collection.
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    records: Vec<Record>,
}

impl Deref for Manifest {
    type Target = Vec<Record>;
    fn deref(&self) -> &Self::Target {
        &self.records
    }
}

impl From<Vec<Record>> for Manifest {
    fn from(records: Vec<Record>) -> Self {
        Manifest { records }
    }
}

impl Manifest {
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.records.iter()
    }

    pub fn internal_locations(&self) -> impl Iterator<Item = &str> {
        self.records.iter().map(|r| r.internal_location.as_str())
    }

    /// Parse a manifest CSV, skipping the leading `# SOURMASH-MANIFEST-VERSION` comment.
    pub fn from_reader<R: Read>(mut rdr: R) -> Result<Manifest> {
        let mut contents = String::new();
        rdr.read_to_string(&mut contents)?;
        let body = contents
            .strip_prefix('#')
            .map(|rest| rest.splitn(2, '\n').nth(1).unwrap_or(""))
            .unwrap_or(&contents);

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(body.as_bytes());
        let mut records = Vec::new();
        for result in reader.deserialize() {
            let record: Record = result?;
            records.push(record);
        }
        Ok(Manifest { records })
    }

    pub fn to_writer<W: Write>(&self, mut wtr: W) -> Result<()> {
        wtr.write_all(b"# SOURMASH-MANIFEST-VERSION: 1.0\n")?;
        let mut csv_writer = csv::Writer::from_writer(wtr);
        for record in &self.records {
            csv_writer.serialize(record)?;
        }
        csv_writer.flush()?;
        Ok(())
    }

    /// Group records by `(ksize, moltype, num, scaled, with_abundance)`,
    /// accumulating row count and total hash count per group.
    pub fn summarize(&self) -> Vec<RecordSummary> {
        let mut groups: HashMap<(u32, String, u32, u64, bool), RecordSummary> = HashMap::new();
        for r in &self.records {
            let key = (r.ksize, r.moltype.clone(), r.num, r.scaled, r.with_abundance);
            let entry = groups.entry(key.clone()).or_insert_with(|| RecordSummary {
                ksize: r.ksize,
                moltype: r.moltype.clone(),
                num: r.num,
                scaled: r.scaled,
                with_abundance: r.with_abundance,
                count: 0,
                total_n_hashes: 0,
            });
            entry.count += 1;
            entry.total_n_hashes += r.n_hashes;
        }
        let mut out: Vec<_> = groups.into_values().collect();
        out.sort_by_key(|s| (s.ksize, s.moltype.clone(), s.num, s.scaled));
        out
    }

    pub fn write_summary<W: Write>(&self, mut w: W) -> Result<()> {
        writeln!(w, "{:<6}{:<10}{:>8}{:>10}{:>12}{:>10}", "ksize", "moltype", "num", "scaled", "n_hashes", "count")?;
        for s in self.summarize() {
            writeln!(
                w,
                "{:<6}{:<10}{:>8}{:>10}{:>12}{:>10}",
                s.ksize, s.moltype, s.num, s.scaled, s.total_n_hashes, s.count
            )?;
        }
        Ok(())
    }
}

impl Select for Manifest {
    fn select(mut self, selection: &Selection) -> Result<Self> {
        self.records.retain(|row| {
            if let Some(ksize) = selection.ksize() {
                if row.ksize != ksize {
                    return false;
                }
            }
            if let Some(abund) = selection.abund() {
                if row.with_abundance != abund {
                    return false;
                }
            }
            if let Some(moltype) = selection.moltype() {
                if row.moltype != moltype.to_string() {
                    return false;
                }
            }
            if let Some(scaled) = selection.scaled() {
                if row.scaled == 0 || row.scaled > scaled as u64 {
                    return false;
                }
            }
            if let Some(num) = selection.num() {
                if row.num != num {
                    return false;
                }
            }
            if let Some(picklist) = selection.picklist() {
                if !picklist.matches(row) {
                    return false;
                }
            }
            true
        });

        if self.records.is_empty() {
            return Err(Error::EmptyIndex);
        }
        Ok(self)
    }
}

/// One row of [`Manifest::summarize`].
#[derive(Debug, Clone, Serialize)]
pub struct RecordSummary {
    pub ksize: u32,
    pub moltype: String,
    pub num: u32,
    pub scaled: u64,
    pub with_abundance: bool,
    pub count: usize,
    pub total_n_hashes: usize,
}

#[cfg(test)]
mod test {
    use super::*;

    fn dummy_record(ksize: u32, moltype: &str, scaled: u64) -> Record {
        Record {
            internal_location: "sig.sig".into(),
            md5: "abcd1234".into(),
            md5short: "abcd1234"[..8].into(),
            ksize,
            moltype: moltype.into(),
            num: 0,
            scaled,
            n_hashes: 100,
            with_abundance: false,
            name: Some("test".into()),
            filename: None,
        }
    }

    #[test]
    fn select_filters_by_ksize() {
        let manifest: Manifest = vec![
            dummy_record(21, "DNA", 1000),
            dummy_record(31, "DNA", 1000),
            dummy_record(51, "DNA", 1000),
        ]
        .into();

        let selection = Selection::builder().ksize(31).build();
        let selected = manifest.select(&selection).unwrap();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].ksize(), 31);
    }

    #[test]
    fn select_on_scaled_keeps_coarser_or_equal() {
        let manifest: Manifest = vec![
            dummy_record(21, "DNA", 1000),
            dummy_record(21, "DNA", 2000),
            dummy_record(21, "DNA", 500),
        ]
        .into();

        let selection = Selection::builder().scaled(1000).build();
        let selected = manifest.select(&selection).unwrap();
        let scaled_values: Vec<u64> = selected.iter().map(|r| r.scaled()).collect();
        assert_eq!(scaled_values, vec![1000, 2000]);
    }

    #[test]
    fn csv_roundtrip() {
        let manifest: Manifest = vec![dummy_record(21, "DNA", 1000)].into();
        let mut buf = Vec::new();
        manifest.to_writer(&mut buf).unwrap();
        let loaded = Manifest::from_reader(&buf[..]).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].ksize(), 21);
    }

    #[test]
    fn summarize_groups_by_params() {
        let manifest: Manifest = vec![
            dummy_record(21, "DNA", 1000),
            dummy_record(21, "DNA", 1000),
            dummy_record(31, "DNA", 1000),
        ]
        .into();
        let summary = manifest.summarize();
        assert_eq!(summary.len(), 2);
        let k21 = summary.iter().find(|s| s.ksize == 21).unwrap();
        assert_eq!(k21.count, 2);
    }
}
