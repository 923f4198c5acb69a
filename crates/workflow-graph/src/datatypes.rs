//! Datatype lattice used to validate connections
//!
//! Terminals declare datatype extensions (`bam`, `sam`, `tabular`...). The
//! lattice maps every extension to a datatype class name, and every class
//! name to the set of classes it may stand in for. Lookups never fail:
//! anything unknown is simply incompatible.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};

/// Extension that matches anything on either side of a connection
pub const WILDCARD_TYPE: &str = "input";

/// Immutable extension/class compatibility mapping
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatatypeLattice {
    /// Extension → class name
    #[serde(default)]
    ext_to_class_name: HashMap<String, String>,
    /// Class name → classes it is compatible with (its ancestors)
    #[serde(default, deserialize_with = "deserialize_class_sets")]
    class_to_classes: HashMap<String, HashSet<String>>,
}

impl DatatypeLattice {
    /// Create an empty lattice (every distinct pair is incompatible)
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the service's datatype mapping payload
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Register an extension and its class. The class is always compatible
    /// with itself.
    pub fn with_extension(mut self, ext: impl Into<String>, class: impl Into<String>) -> Self {
        let class = class.into();
        self.class_to_classes
            .entry(class.clone())
            .or_default()
            .insert(class.clone());
        self.ext_to_class_name.insert(ext.into(), class);
        self
    }

    /// Declare that `class` may be used wherever `ancestor` is accepted
    pub fn with_ancestor(mut self, class: impl Into<String>, ancestor: impl Into<String>) -> Self {
        let class = class.into();
        let entry = self.class_to_classes.entry(class.clone()).or_default();
        entry.insert(class);
        entry.insert(ancestor.into());
        self
    }

    /// Class name registered for an extension
    pub fn class_name(&self, ext: &str) -> Option<&str> {
        self.ext_to_class_name.get(ext).map(String::as_str)
    }

    /// Whether the extension is known to the lattice
    pub fn is_known(&self, ext: &str) -> bool {
        self.ext_to_class_name.contains_key(ext)
    }

    /// Check whether data of type `child` is acceptable where `parent` is
    /// expected.
    ///
    /// Reflexive for every type, known or not. Unresolvable types otherwise
    /// compare as incompatible.
    pub fn is_subtype(&self, child: &str, parent: &str) -> bool {
        if child == parent {
            return true;
        }
        let (Some(child_class), Some(parent_class)) =
            (self.class_name(child), self.class_name(parent))
        else {
            return false;
        };
        self.class_to_classes
            .get(child_class)
            .is_some_and(|classes| classes.contains(parent_class))
    }

    /// Check whether an output producing `produced` may feed an input
    /// accepting `accepted`.
    ///
    /// True if any produced type is a subtype of any accepted type, or if
    /// either side carries the wildcard.
    pub fn accepts(&self, produced: &[String], accepted: &[String]) -> bool {
        if accepted.iter().any(|t| t == WILDCARD_TYPE) || produced.iter().any(|t| t == WILDCARD_TYPE) {
            return true;
        }
        produced
            .iter()
            .any(|p| accepted.iter().any(|a| self.is_subtype(p, a)))
    }
}

/// The service encodes each class set as `{"Binary": true, "Data": true}`;
/// plain lists are accepted as well.
fn deserialize_class_sets<'de, D>(
    deserializer: D,
) -> Result<HashMap<String, HashSet<String>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum ClassSet {
        Flags(BTreeMap<String, bool>),
        List(BTreeSet<String>),
    }

    let raw: HashMap<String, ClassSet> = HashMap::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|(class, set)| {
            let members = match set {
                ClassSet::Flags(flags) => flags
                    .into_iter()
                    .filter(|(_, on)| *on)
                    .map(|(name, _)| name)
                    .collect(),
                ClassSet::List(list) => list.into_iter().collect(),
            };
            (class, members)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_lattice() -> DatatypeLattice {
        DatatypeLattice::new()
            .with_extension("bam", "Bam")
            .with_extension("sam", "Sam")
            .with_extension("tabular", "Tabular")
            .with_extension("txt", "Text")
            .with_ancestor("Bam", "Binary")
            .with_extension("binary", "Binary")
            .with_ancestor("Sam", "Tabular")
            .with_ancestor("Sam", "Text")
            .with_ancestor("Tabular", "Text")
    }

    #[test]
    fn test_is_subtype_reflexive() {
        let lattice = make_lattice();
        for ext in ["bam", "sam", "tabular", "unknown-ext", ""] {
            assert!(lattice.is_subtype(ext, ext), "{ext} should be a subtype of itself");
        }
    }

    #[test]
    fn test_is_subtype_follows_ancestors() {
        let lattice = make_lattice();
        assert!(lattice.is_subtype("sam", "tabular"));
        assert!(lattice.is_subtype("sam", "txt"));
        assert!(lattice.is_subtype("bam", "binary"));
        assert!(!lattice.is_subtype("tabular", "sam"));
        assert!(!lattice.is_subtype("bam", "sam"));
    }

    #[test]
    fn test_unresolvable_types_fail_closed() {
        let lattice = make_lattice();
        assert!(!lattice.is_subtype("vcf", "bam"));
        assert!(!lattice.is_subtype("bam", "vcf"));
        assert!(!lattice.is_subtype("nope", "also-nope"));
    }

    #[test]
    fn test_accepts_wildcard_and_sets() {
        let lattice = make_lattice();
        let s = |v: &[&str]| v.iter().map(|t| t.to_string()).collect::<Vec<_>>();

        assert!(lattice.accepts(&s(&["bam"]), &s(&["bam", "sam"])));
        assert!(lattice.accepts(&s(&["sam"]), &s(&["txt"])));
        assert!(!lattice.accepts(&s(&["bam"]), &s(&["vcf"])));
        assert!(lattice.accepts(&s(&["vcf"]), &s(&[WILDCARD_TYPE])));
        assert!(lattice.accepts(&s(&[WILDCARD_TYPE]), &s(&["vcf"])));
        assert!(!lattice.accepts(&[], &s(&["bam"])));
    }

    #[test]
    fn test_from_service_mapping() {
        let json = r#"{
            "ext_to_class_name": {"bam": "Bam", "binary": "Binary", "txt": "Text"},
            "class_to_classes": {
                "Bam": {"Bam": true, "Binary": true, "Text": false},
                "Text": ["Text"]
            }
        }"#;
        let lattice = DatatypeLattice::from_json(json).unwrap();
        assert!(lattice.is_subtype("bam", "binary"));
        assert!(!lattice.is_subtype("bam", "txt"));
        assert_eq!(lattice.class_name("txt"), Some("Text"));
    }
}
