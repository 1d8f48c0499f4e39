//! Operator-supplied rename table for schema evolution.
//!
//! Text form, one entry per line:
//!
//! ```text
//! // comments start with two slashes
//! app.Point;app.Coordinate
//! app.Point#x;app.Coordinate#posX
//! obsolete;
//! ;app.Coordinate#posZ
//! ```
//!
//! `source;target` renames, `source;` discards the source member, and
//! `;target` declares a brand-new member that must never be matched
//! automatically.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use objgraph_types::TypeId;

use crate::error::{DictionaryError, DictionaryResult};

/// Where an old member goes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MemberTarget {
    /// The old member's value is read and dropped.
    Discard,
    /// The old member maps onto the current member with this identifier.
    /// `type_name` is set when the entry named the target type explicitly.
    Member {
        type_name: Option<String>,
        identifier: String,
    },
}

/// Immutable old-to-new identifier table consulted before automatic matching.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RefactoringMapping {
    entries: BTreeMap<String, String>,
    new_elements: BTreeSet<String>,
}

impl RefactoringMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a `source -> target` entry. An empty target discards the source.
    pub fn with_entry(mut self, source: impl Into<String>, target: impl Into<String>) -> Self {
        self.entries.insert(source.into(), target.into());
        self
    }

    /// Declare a current member identifier as new.
    pub fn with_new_element(mut self, identifier: impl Into<String>) -> Self {
        self.new_elements.insert(identifier.into());
        self
    }

    /// Parse the text form.
    pub fn parse(text: &str) -> DictionaryResult<Self> {
        let mut mapping = Self::new();
        for (i, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with("//") {
                continue;
            }
            let (source, target) = line.split_once(';').ok_or_else(|| {
                DictionaryError::parse(i + 1, format!("expected 'source;target', found '{line}'"))
            })?;
            let (source, target) = (source.trim(), target.trim());
            match (source.is_empty(), target.is_empty()) {
                (true, true) => {
                    return Err(DictionaryError::parse(i + 1, "entry has neither source nor target"))
                }
                (true, false) => {
                    mapping.new_elements.insert(target.to_string());
                }
                (false, _) => {
                    mapping.entries.insert(source.to_string(), target.to_string());
                }
            }
        }
        Ok(mapping)
    }

    /// Read and parse a mapping file.
    pub fn load(path: impl AsRef<Path>) -> DictionaryResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.new_elements.is_empty()
    }

    /// Raw target for a source key. An empty string means discard.
    pub fn lookup(&self, source: &str) -> Option<&str> {
        self.entries.get(source).map(String::as_str)
    }

    /// Resolve an old member. Keys are tried from most to least specific:
    /// `typeId:Type#member`, `Type#member`, `member`.
    pub fn lookup_member(
        &self,
        old_type_id: TypeId,
        old_type_name: &str,
        identifier: &str,
    ) -> Option<MemberTarget> {
        let keys = [
            format!("{}:{old_type_name}#{identifier}", old_type_id.as_u64()),
            format!("{old_type_name}#{identifier}"),
            identifier.to_string(),
        ];
        let target = keys.iter().find_map(|k| self.lookup(k))?;
        Some(Self::parse_target(target))
    }

    fn parse_target(target: &str) -> MemberTarget {
        if target.is_empty() {
            return MemberTarget::Discard;
        }
        match target.split_once('#') {
            Some((type_name, identifier)) => MemberTarget::Member {
                type_name: Some(type_name.to_string()),
                identifier: identifier.to_string(),
            },
            None => MemberTarget::Member {
                type_name: None,
                identifier: target.to_string(),
            },
        }
    }

    /// Returns `true` if the current member is declared new.
    pub fn is_new_element(&self, type_name: &str, identifier: &str) -> bool {
        self.new_elements.contains(&format!("{type_name}#{identifier}"))
            || self.new_elements.contains(identifier)
    }

    /// Current type name an old type name maps to.
    ///
    /// An explicit type entry wins. Otherwise the target is inferred from
    /// member entries of the old type; member entries pointing at more than
    /// one target type are an error.
    pub fn resolve_type_name(&self, old_type_name: &str) -> DictionaryResult<Option<String>> {
        if let Some(target) = self.lookup(old_type_name) {
            return Ok((!target.is_empty()).then(|| target.to_string()));
        }

        let mut targets = BTreeSet::new();
        for (source, target) in &self.entries {
            // Strip an optional "typeId:" prefix.
            let source = source.split_once(':').map_or(source.as_str(), |(_, s)| s);
            let Some((source_type, _)) = source.split_once('#') else {
                continue;
            };
            if source_type != old_type_name {
                continue;
            }
            if let Some((target_type, _)) = target.split_once('#') {
                targets.insert(target_type.to_string());
            }
        }

        match targets.len() {
            0 => Ok(None),
            1 => Ok(targets.into_iter().next()),
            _ => Err(DictionaryError::AmbiguousTypeMapping {
                source_type: old_type_name.to_string(),
                targets: targets.into_iter().collect(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const POINT: TypeId = TypeId::from_raw(1_000_001);

    #[test]
    fn member_lookup_precedence() {
        let mapping = RefactoringMapping::new()
            .with_entry("x", "generic")
            .with_entry("app.Point#x", "app.Coordinate#posX")
            .with_entry("1000001:app.Point#y", "app.Coordinate#posY");

        assert_eq!(
            mapping.lookup_member(POINT, "app.Point", "x"),
            Some(MemberTarget::Member {
                type_name: Some("app.Coordinate".into()),
                identifier: "posX".into()
            })
        );
        assert_eq!(
            mapping.lookup_member(POINT, "app.Point", "y"),
            Some(MemberTarget::Member {
                type_name: Some("app.Coordinate".into()),
                identifier: "posY".into()
            })
        );
        // The id-qualified key only applies to that exact type id.
        assert_eq!(
            mapping.lookup_member(TypeId::from_raw(1_000_009), "app.Point", "y"),
            None
        );
        assert_eq!(
            mapping.lookup_member(POINT, "app.Other", "x"),
            Some(MemberTarget::Member {
                type_name: None,
                identifier: "generic".into()
            })
        );
    }

    #[test]
    fn discard_and_new_elements() {
        let mapping = RefactoringMapping::new()
            .with_entry("app.Point#legacy", "")
            .with_new_element("app.Coordinate#posZ");
        assert_eq!(
            mapping.lookup_member(POINT, "app.Point", "legacy"),
            Some(MemberTarget::Discard)
        );
        assert!(mapping.is_new_element("app.Coordinate", "posZ"));
        assert!(!mapping.is_new_element("app.Coordinate", "posX"));
    }

    #[test]
    fn type_name_resolution() {
        let explicit = RefactoringMapping::new().with_entry("app.Point", "app.Coordinate");
        assert_eq!(
            explicit.resolve_type_name("app.Point").unwrap().as_deref(),
            Some("app.Coordinate")
        );

        let inferred = RefactoringMapping::new()
            .with_entry("app.Point#x", "app.Coordinate#posX")
            .with_entry("1000001:app.Point#y", "app.Coordinate#posY");
        assert_eq!(
            inferred.resolve_type_name("app.Point").unwrap().as_deref(),
            Some("app.Coordinate")
        );
        assert_eq!(inferred.resolve_type_name("app.Line").unwrap(), None);

        let ambiguous = RefactoringMapping::new()
            .with_entry("app.Point#x", "app.Coordinate#posX")
            .with_entry("app.Point#y", "app.Vector#dy");
        assert!(matches!(
            ambiguous.resolve_type_name("app.Point"),
            Err(DictionaryError::AmbiguousTypeMapping { .. })
        ));
    }

    #[test]
    fn parse_text_form() {
        let text = "\
// rename Point
app.Point;app.Coordinate
app.Point#x ; app.Coordinate#posX
app.Point#legacy;
;app.Coordinate#posZ
";
        let mapping = RefactoringMapping::parse(text).unwrap();
        assert_eq!(mapping.lookup("app.Point"), Some("app.Coordinate"));
        assert_eq!(mapping.lookup("app.Point#x"), Some("app.Coordinate#posX"));
        assert_eq!(mapping.lookup("app.Point#legacy"), Some(""));
        assert!(mapping.is_new_element("app.Coordinate", "posZ"));

        match RefactoringMapping::parse("ok;fine\nbroken line\n") {
            Err(DictionaryError::Parse { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected parse error, got {other:?}"),
        }
        assert!(RefactoringMapping::parse(";\n").is_err());
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "app.Point#x;app.Coordinate#posX").unwrap();
        let mapping = RefactoringMapping::load(file.path()).unwrap();
        assert!(!mapping.is_empty());
        assert!(RefactoringMapping::load("/nonexistent/mapping.csv").is_err());
    }
}
