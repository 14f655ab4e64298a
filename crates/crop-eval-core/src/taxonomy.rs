//! Canonical crop-type dictionary.
//!
//! Each canonical label owns a set of raw vocabulary strings (ground-truth
//! aliases) and a stable numeric class id (model output). The table is built
//! once at startup and passed by reference to everything that resolves
//! labels.
//!
//! Alias resolution is first-declared-wins. [`LabelTaxonomy::new`] refuses an
//! alias claimed by two labels; [`LabelTaxonomy::with_alias_overlap`] accepts
//! it, logs a warning, and keeps the first declaration.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, Error, TaxonomyError};

/// Numeric class id as written by the model into the class band.
pub type ClassId = i64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalLabel {
    pub name: String,
    pub numeric_id: ClassId,
    pub aliases: Vec<String>,
}

impl CanonicalLabel {
    pub fn new(name: &str, numeric_id: ClassId, aliases: &[&str]) -> Self {
        Self {
            name: name.to_owned(),
            numeric_id,
            aliases: aliases.iter().map(|a| (*a).to_owned()).collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LabelTaxonomy {
    labels: Vec<CanonicalLabel>,
    by_name: HashMap<String, usize>,
    by_alias: HashMap<String, usize>,
    by_id: HashMap<ClassId, usize>,
}

impl LabelTaxonomy {
    /// Build a taxonomy, rejecting duplicate names, ids and aliases.
    pub fn new(labels: Vec<CanonicalLabel>) -> Result<Self, TaxonomyError> {
        Self::build(labels, false)
    }

    /// Build a taxonomy that tolerates an alias shared by two labels.
    /// The first declared label keeps the alias.
    pub fn with_alias_overlap(labels: Vec<CanonicalLabel>) -> Result<Self, TaxonomyError> {
        Self::build(labels, true)
    }

    fn build(labels: Vec<CanonicalLabel>, allow_overlap: bool) -> Result<Self, TaxonomyError> {
        if labels.is_empty() {
            return Err(TaxonomyError::Empty);
        }
        let (taxonomy, conflicts) = Self::index(labels);
        for conflict in conflicts {
            match conflict {
                TaxonomyError::DuplicateAlias { alias, first, second } if allow_overlap => {
                    warn!(
                        event = "taxonomy.alias_overlap",
                        alias = %alias,
                        kept = %first,
                        ignored = %second,
                    );
                }
                other => return Err(other),
            }
        }
        Ok(taxonomy)
    }

    /// Index `labels` by name, id and alias. The first declaration wins every
    /// collision; later ones are returned in declaration order.
    fn index(labels: Vec<CanonicalLabel>) -> (Self, Vec<TaxonomyError>) {
        let mut by_name: HashMap<String, usize> = HashMap::new();
        let mut by_alias: HashMap<String, usize> = HashMap::new();
        let mut by_id: HashMap<ClassId, usize> = HashMap::new();
        let mut conflicts = Vec::new();

        for (idx, label) in labels.iter().enumerate() {
            if by_name.contains_key(&label.name) {
                conflicts.push(TaxonomyError::DuplicateName(label.name.clone()));
                continue;
            }
            by_name.insert(label.name.clone(), idx);

            match by_id.get(&label.numeric_id).copied() {
                Some(first) => conflicts.push(TaxonomyError::DuplicateId {
                    id: label.numeric_id,
                    first: labels[first].name.clone(),
                    second: label.name.clone(),
                }),
                None => {
                    by_id.insert(label.numeric_id, idx);
                }
            }

            for alias in &label.aliases {
                match by_alias.get(alias).copied() {
                    None => {
                        by_alias.insert(alias.clone(), idx);
                    }
                    Some(owner) if owner == idx => {}
                    Some(owner) => conflicts.push(TaxonomyError::DuplicateAlias {
                        alias: alias.clone(),
                        first: labels[owner].name.clone(),
                        second: label.name.clone(),
                    }),
                }
            }
        }

        (Self { labels, by_name, by_alias, by_id }, conflicts)
    }

    /// Built-in crop dictionary used by the evaluation tool.
    pub fn crops() -> Self {
        let labels = vec![
            CanonicalLabel::new("Grassland Cultivated", 0, &["grassland_cultivated"]),
            CanonicalLabel::new("Grassland Nature", 1, &["grassland_nature"]),
            CanonicalLabel::new("Clover", 2, &["clover"]),
            CanonicalLabel::new("Alfalfa", 3, &["alfalfa"]),
            CanonicalLabel::new("Ryegrass", 4, &["ryegrass"]),
            CanonicalLabel::new("Winter Barley", 5, &["barley_winter"]),
            CanonicalLabel::new("Spring Barley", 6, &["barley_spring", "barley_summer"]),
            CanonicalLabel::new("Winter Wheat", 7, &["wheat_winter"]),
            CanonicalLabel::new("Triticale", 8, &["triticale_winter", "triticale_spring"]),
            CanonicalLabel::new("Winter Rye", 9, &["rye_winter"]),
            CanonicalLabel::new("Spring Rye", 10, &["rye_spring"]),
            CanonicalLabel::new("Spring Wheat", 11, &["wheat_spring"]),
            CanonicalLabel::new("Rice", 12, &["rice"]),
            CanonicalLabel::new("Millet", 13, &["millet"]),
            CanonicalLabel::new("Sorghum", 14, &["sorghum", "Sorghum"]),
            CanonicalLabel::new("Spring Oats", 15, &["oats_spring"]),
            CanonicalLabel::new("Winter Oats", 16, &["oats_winter"]),
            CanonicalLabel::new("Sunflowers", 17, &["sunflowers", "sunflower"]),
            CanonicalLabel::new("Flax", 18, &["flax"]),
            CanonicalLabel::new("Canola", 19, &["canola_spring", "canola_winter"]),
            CanonicalLabel::new("Grain Corn", 20, &["corn_grain"]),
            CanonicalLabel::new("Silage Corn", 21, &["corn_silage"]),
            CanonicalLabel::new("Potatoes", 22, &["potatoes"]),
            CanonicalLabel::new("Sugarbeets", 23, &["sugarbeets", "beets"]),
            CanonicalLabel::new("Soybeans", 24, &["soybeans"]),
            CanonicalLabel::new("Peas", 25, &["peas", "peas_winter"]),
            CanonicalLabel::new("Beans", 26, &["beans"]),
            CanonicalLabel::new("Lentils", 27, &["lentils"]),
            CanonicalLabel::new("Fallow", 28, &["fallow"]),
            CanonicalLabel::new("Turnips", 29, &["turnips", "turnip"]),
            CanonicalLabel::new("Trees", 30, &["trees", "orchard", "orchards", "bananas"]),
            CanonicalLabel::new("Vineyard", 31, &["vineyard"]),
        ];
        let (taxonomy, conflicts) = Self::index(labels);
        for conflict in &conflicts {
            warn!(event = "taxonomy.builtin_conflict", error = %conflict);
        }
        taxonomy
    }

    /// Load a taxonomy from a JSON array of `{name, numeric_id, aliases}`.
    /// Alias overlap is fatal here.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let text = fs::read_to_string(path).map_err(|e| ConfigError::Load {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let labels: Vec<CanonicalLabel> =
            serde_json::from_str(&text).map_err(|e| ConfigError::Load {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        Ok(Self::new(labels)?)
    }

    /// Canonical name owning the raw ground-truth string, if any.
    pub fn normalize_ground_truth(&self, raw: &str) -> Option<&str> {
        self.by_alias.get(raw).map(|&i| self.labels[i].name.as_str())
    }

    /// Canonical name for a model class id, if any.
    pub fn normalize_prediction(&self, id: ClassId) -> Option<&str> {
        self.by_id.get(&id).map(|&i| self.labels[i].name.as_str())
    }

    /// Labels in declared order.
    pub fn labels(&self) -> &[CanonicalLabel] {
        &self.labels
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(|l| l.name.as_str())
    }

    /// Declared position of a canonical name.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_table_passes_strict_validation() {
        let crops = LabelTaxonomy::crops();
        let (_, conflicts) = LabelTaxonomy::index(crops.labels().to_vec());
        assert!(conflicts.is_empty(), "{conflicts:?}");
        let strict = LabelTaxonomy::new(crops.labels().to_vec()).unwrap();
        assert_eq!(strict.len(), 32);
        assert_eq!(crops.len(), 32);
    }

    #[test]
    fn every_alias_resolves_to_its_owner() {
        let t = LabelTaxonomy::crops();
        for label in t.labels() {
            for alias in &label.aliases {
                let owner = t.normalize_ground_truth(alias);
                assert_eq!(owner, Some(label.name.as_str()), "alias {alias}");
            }
            assert_eq!(t.normalize_prediction(label.numeric_id), Some(label.name.as_str()));
        }
    }

    #[test]
    fn undeclared_strings_do_not_resolve() {
        let t = LabelTaxonomy::crops();
        assert_eq!(t.normalize_ground_truth("quinoa"), None);
        assert_eq!(t.normalize_ground_truth(""), None);
        assert_eq!(t.normalize_ground_truth("WHEAT_WINTER"), None);
        assert_eq!(t.normalize_prediction(32), None);
        assert_eq!(t.normalize_prediction(-99), None);
    }

    #[test]
    fn canonical_names_are_not_aliases_unless_declared() {
        let t = LabelTaxonomy::crops();
        assert_eq!(t.normalize_ground_truth("Winter Wheat"), None);
        // "Sorghum" is listed among its own aliases.
        assert_eq!(t.normalize_ground_truth("Sorghum"), Some("Sorghum"));
    }

    #[test]
    fn strict_build_rejects_shared_alias() {
        let labels = vec![
            CanonicalLabel::new("Sugarbeets", 0, &["beets"]),
            CanonicalLabel::new("Turnips", 1, &["turnip", "beets"]),
        ];
        let err = LabelTaxonomy::new(labels).unwrap_err();
        assert_eq!(
            err,
            TaxonomyError::DuplicateAlias {
                alias: "beets".into(),
                first: "Sugarbeets".into(),
                second: "Turnips".into(),
            }
        );
    }

    #[test]
    fn overlap_build_keeps_first_declaration() {
        let labels = vec![
            CanonicalLabel::new("Sugarbeets", 0, &["beets"]),
            CanonicalLabel::new("Turnips", 1, &["turnip", "beets"]),
        ];
        let t = LabelTaxonomy::with_alias_overlap(labels).unwrap();
        assert_eq!(t.normalize_ground_truth("beets"), Some("Sugarbeets"));
        assert_eq!(t.normalize_ground_truth("turnip"), Some("Turnips"));
    }

    #[test]
    fn duplicate_ids_and_names_are_fatal() {
        let ids = vec![CanonicalLabel::new("A", 0, &["a"]), CanonicalLabel::new("B", 0, &["b"])];
        assert!(matches!(
            LabelTaxonomy::with_alias_overlap(ids),
            Err(TaxonomyError::DuplicateId { id: 0, .. })
        ));
        let names = vec![CanonicalLabel::new("A", 0, &["a"]), CanonicalLabel::new("A", 1, &["b"])];
        let err = LabelTaxonomy::new(names).unwrap_err();
        assert_eq!(err, TaxonomyError::DuplicateName("A".into()));
        assert_eq!(LabelTaxonomy::new(vec![]).unwrap_err(), TaxonomyError::Empty);
    }

    #[test]
    fn load_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("taxonomy.json");
        fs::write(
            &path,
            r#"[{"name": "Rice", "numeric_id": 4, "aliases": ["rice", "paddy"]},
                {"name": "Flax", "numeric_id": 9, "aliases": ["flax"]}]"#,
        )
        .unwrap();
        let t = LabelTaxonomy::load(&path).unwrap();
        assert_eq!(t.normalize_ground_truth("paddy"), Some("Rice"));
        assert_eq!(t.normalize_prediction(9), Some("Flax"));
        assert_eq!(t.names().collect::<Vec<_>>(), vec!["Rice", "Flax"]);
    }
}
