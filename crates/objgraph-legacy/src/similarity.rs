use std::collections::HashMap;

use objgraph_dictionary::{MemberKind, TypeMember};
use objgraph_model::Value;
use objgraph_types::PrimitiveKind;
use serde::{Deserialize, Serialize};

/// Score given to lossless widening conversions by default.
pub const DEFAULT_WIDENING_SIMILARITY: f64 = 0.75;

/// Edit distance between two strings, counted in chars.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];
    for (i, ca) in a.chars().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != *cb);
            current[j + 1] = substitution.min(previous[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[b.len()]
}

/// `1 - distance / longer length`, in `[0.0, 1.0]`. Two empty strings are equal.
pub fn name_similarity(a: &str, b: &str) -> f64 {
    let longest = a.chars().count().max(b.chars().count());
    if longest == 0 {
        return 1.0;
    }
    1.0 - levenshtein(a, b) as f64 / longest as f64
}

/// One configured score for a pair of primitive kinds.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TypeSimilarityEntry {
    pub from: PrimitiveKind,
    pub to: PrimitiveKind,
    pub score: f64,
}

/// Scores for converting a stored primitive kind into a different current one.
#[derive(Clone, Debug)]
pub struct TypeSimilarity {
    scores: HashMap<(PrimitiveKind, PrimitiveKind), f64>,
}

impl TypeSimilarity {
    /// No compatible pairs.
    pub fn empty() -> Self {
        Self {
            scores: HashMap::new(),
        }
    }

    /// Set the score for one pair, clamped to `[0.0, 1.0]`.
    pub fn with(mut self, from: PrimitiveKind, to: PrimitiveKind, score: f64) -> Self {
        self.scores.insert((from, to), score.clamp(0.0, 1.0));
        self
    }

    pub fn with_entries(self, entries: &[TypeSimilarityEntry]) -> Self {
        entries
            .iter()
            .fold(self, |acc, e| acc.with(e.from, e.to, e.score))
    }

    pub fn lookup(&self, from: PrimitiveKind, to: PrimitiveKind) -> Option<f64> {
        if from == to {
            return Some(1.0);
        }
        self.scores.get(&(from, to)).copied()
    }
}

impl Default for TypeSimilarity {
    /// Every lossless widening conversion scores [`DEFAULT_WIDENING_SIMILARITY`].
    fn default() -> Self {
        let mut table = Self::empty();
        for from in PrimitiveKind::ALL {
            for to in PrimitiveKind::ALL {
                if from != to && Value::widens(from, to) {
                    table = table.with(from, to, DEFAULT_WIDENING_SIMILARITY);
                }
            }
        }
        table
    }
}

/// Scores how likely an old member is to have become a current member.
#[derive(Clone, Debug, Default)]
pub struct MemberSimilator {
    types: TypeSimilarity,
}

impl MemberSimilator {
    pub fn new(types: TypeSimilarity) -> Self {
        Self { types }
    }

    /// Average of name and type similarity, in `[0.0, 1.0]`.
    ///
    /// `current_type_name` maps an old reference target name to its current
    /// name. Enum constants only ever match enum constants.
    pub fn evaluate(
        &self,
        old: &TypeMember,
        current: &TypeMember,
        current_type_name: &dyn Fn(&str) -> String,
    ) -> f64 {
        let old_constant = old.kind == MemberKind::EnumConstant;
        if old_constant != (current.kind == MemberKind::EnumConstant) {
            return 0.0;
        }
        let qualifier_factor = if old.qualifier == current.qualifier {
            1.0
        } else {
            0.5
        };
        let by_name = name_similarity(&old.name, &current.name) * qualifier_factor;
        let by_type = self.type_similarity(&old.kind, &current.kind, current_type_name);
        (by_name + by_type) / 2.0
    }

    fn type_similarity(
        &self,
        old: &MemberKind,
        current: &MemberKind,
        current_type_name: &dyn Fn(&str) -> String,
    ) -> f64 {
        match (old, current) {
            (MemberKind::Primitive(a), MemberKind::Primitive(b)) => {
                self.types.lookup(*a, *b).unwrap_or(0.0)
            }
            (MemberKind::Reference(a), MemberKind::Reference(b)) => {
                if current_type_name(a) == *b {
                    1.0
                } else {
                    0.0
                }
            }
            (a, b) if a == b => 1.0,
            _ => 0.0,
        }
    }
}

/// Returns `true` if a stored value of kind `old` can populate a member of
/// kind `current`.
///
/// References convert only if the old target type, renamed by
/// `current_type_name`, is the current target type.
pub fn convertible(
    old: &MemberKind,
    current: &MemberKind,
    current_type_name: &dyn Fn(&str) -> String,
) -> bool {
    match (old, current) {
        (MemberKind::Primitive(a), MemberKind::Primitive(b)) => Value::widens(*a, *b) || a == b,
        (MemberKind::Reference(a), MemberKind::Reference(b)) => current_type_name(a) == *b,
        (a, b) => a == b,
    }
}

/// Convert a stored value for a member of kind `current`.
pub fn convert(value: Value, current: &MemberKind) -> Option<Value> {
    match current {
        MemberKind::Primitive(kind) => value.widen_to(*kind),
        MemberKind::Reference(_) => matches!(value, Value::Null | Value::Ref(_)).then_some(value),
        MemberKind::Text => matches!(value, Value::Text(_)).then_some(value),
        MemberKind::Bytes => matches!(value, Value::Bytes(_)).then_some(value),
        _ => None,
    }
}
