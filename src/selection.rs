//! Predicate describing which sketches of a collection a caller wants,
//! applied by [`crate::prelude::Select`] implementors before any payload is
//! loaded.

use getset::{CopyGetters, Getters, Setters};
use typed_builder::TypedBuilder;

use crate::encodings::HashFunctions;
use crate::errors::Result;
use crate::manifest::Record;
use crate::sketch::Sketch;

#[derive(Default, Debug, TypedBuilder, Clone)]
pub struct Selection {
    #[builder(default, setter(strip_option))]
    ksize: Option<u32>,

    #[builder(default, setter(strip_option))]
    abund: Option<bool>,

    #[builder(default, setter(strip_option))]
    num: Option<u32>,

    #[builder(default, setter(strip_option))]
    scaled: Option<u32>,

    #[builder(default, setter(strip_option))]
    containment: Option<bool>,

    #[builder(default, setter(strip_option))]
    moltype: Option<HashFunctions>,

    #[builder(default, setter(strip_option))]
    picklist: Option<Picklist>,

    #[builder(default, setter(strip_option))]
    sketchtype: Option<Sketch>,
}

impl Selection {
    pub fn ksize(&self) -> Option<u32> {
        self.ksize
    }
    pub fn set_ksize(&mut self, ksize: u32) {
        self.ksize = Some(ksize);
    }

    pub fn abund(&self) -> Option<bool> {
        self.abund
    }
    pub fn set_abund(&mut self, value: bool) {
        self.abund = Some(value);
    }

    pub fn num(&self) -> Option<u32> {
        self.num
    }
    pub fn set_num(&mut self, num: u32) {
        self.num = Some(num);
    }

    pub fn scaled(&self) -> Option<u32> {
        self.scaled
    }
    pub fn set_scaled(&mut self, scaled: u32) {
        self.scaled = Some(scaled);
    }

    pub fn containment(&self) -> Option<bool> {
        self.containment
    }
    pub fn set_containment(&mut self, containment: bool) {
        self.containment = Some(containment);
    }

    pub fn moltype(&self) -> Option<HashFunctions> {
        self.moltype
    }
    pub fn set_moltype(&mut self, value: HashFunctions) {
        self.moltype = Some(value);
    }

    pub fn picklist(&self) -> Option<&Picklist> {
        self.picklist.as_ref()
    }
    pub fn set_picklist(&mut self, value: Picklist) {
        self.picklist = Some(value);
    }

    pub fn sketchtype(&self) -> Option<&Sketch> {
        self.sketchtype.as_ref()
    }
    pub fn set_sketchtype(&mut self, value: Sketch) {
        self.sketchtype = Some(value);
    }

    /// Derive a selection that matches exactly one manifest row's
    /// parameters, used by [`crate::collection::Collection::sig_for_dataset`]
    /// to pick the right sketch back out of a multi-sketch file.
    pub fn from_record(row: &Record) -> Result<Self> {
        Ok(Self {
            ksize: Some(*row.ksize()),
            abund: Some(*row.with_abundance()),
            moltype: Some(row.moltype()?),
            num: None,
            scaled: None,
            containment: None,
            picklist: None,
            sketchtype: None,
        })
    }
}

#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub enum PickStyle {
    #[default]
    Include,
    Exclude,
}

/// Include/exclude membership test keyed by one column of an external CSV,
/// applied during `select`/`find` (spec §4.4).
#[derive(Default, TypedBuilder, CopyGetters, Getters, Setters, Clone, Debug)]
pub struct Picklist {
    #[getset(get = "pub", set = "pub")]
    #[builder(default = "".into())]
    coltype: String,

    #[getset(get = "pub", set = "pub")]
    #[builder(default = "".into())]
    pickfile: String,

    #[getset(get = "pub", set = "pub")]
    #[builder(default = "".into())]
    column_name: String,

    #[getset(get_copy = "pub", set = "pub")]
    #[builder(default)]
    pickstyle: PickStyle,

    #[builder(default)]
    values: std::collections::HashSet<String>,
}

impl Picklist {
    /// Load the set of values to match from a CSV file (by convention,
    /// another tool's result table): `column_name` names the column to
    /// read, one value per data row.
    pub fn load_values<R: std::io::Read>(&mut self, reader: R) -> Result<()> {
        let mut rdr = csv::ReaderBuilder::new().has_headers(true).from_reader(reader);
        let headers = rdr.headers()?.clone();
        let idx = headers
            .iter()
            .position(|h| h == self.column_name)
            .ok_or_else(|| {
                crate::errors::Error::InvalidArgument(format!(
                    "picklist column '{}' not found",
                    self.column_name
                ))
            })?;
        for result in rdr.records() {
            let record = result?;
            if let Some(value) = record.get(idx) {
                self.values.insert(value.to_string());
            }
        }
        Ok(())
    }

    fn key_for(&self, record: &Record) -> String {
        match self.coltype.as_str() {
            "md5" => record.md5().clone(),
            "md5prefix8" => record.md5short().clone(),
            "name" => record.name().clone().unwrap_or_default(),
            "ident" | "identprefix" => record
                .name()
                .clone()
                .unwrap_or_default()
                .split_whitespace()
                .next()
                .unwrap_or("")
                .to_string(),
            _ => record.md5().clone(),
        }
    }

    /// Whether `record` should be retained under this picklist's
    /// include/exclude semantics.
    pub fn matches(&self, record: &Record) -> bool {
        let present = self.values.contains(&self.key_for(record));
        match self.pickstyle {
            PickStyle::Include => present,
            PickStyle::Exclude => !present,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn picklist_include_exclude() {
        let mut pl = Picklist::builder().coltype("name".to_string()).build();
        pl.values.insert("wanted".into());

        let wanted = Record::dummy_named("wanted");
        let unwanted = Record::dummy_named("unwanted");

        assert!(pl.matches(&wanted));
        assert!(!pl.matches(&unwanted));

        pl.pickstyle = PickStyle::Exclude;
        assert!(!pl.matches(&wanted));
        assert!(pl.matches(&unwanted));
    }
}
