use std::fmt;
use std::sync::Arc;

use objgraph_dictionary::TypeMember;

use crate::similarity::convertible;

/// Default minimum similarity for an automatic match.
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.5;

/// Veto over automatically matched member pairs.
///
/// `current_type_name` maps a type name found in the old definition to its
/// current name.
pub trait MatchValidator: Send + Sync {
    fn is_valid(
        &self,
        old: &TypeMember,
        current: &TypeMember,
        similarity: f64,
        current_type_name: &dyn Fn(&str) -> String,
    ) -> bool;
}

/// Allows a pair only if the stored value converts to the current kind.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConvertibleValidator;

impl MatchValidator for ConvertibleValidator {
    fn is_valid(
        &self,
        old: &TypeMember,
        current: &TypeMember,
        _similarity: f64,
        current_type_name: &dyn Fn(&str) -> String,
    ) -> bool {
        convertible(&old.kind, &current.kind, current_type_name)
    }
}

/// One selected (old member, current member) pair.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MemberMatch {
    pub old_index: usize,
    pub current_index: usize,
    pub similarity: f64,
}

/// Greedy best-match selection over a similarity matrix.
#[derive(Clone)]
pub struct MemberMatcher {
    threshold: f64,
    validator: Arc<dyn MatchValidator>,
}

impl MemberMatcher {
    pub fn new(threshold: f64, validator: Arc<dyn MatchValidator>) -> Self {
        Self {
            threshold,
            validator,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Pick a 1:1 partial mapping between `old` and `current` candidates.
    ///
    /// Candidates are `(declaration index, member)` pairs. Eligible pairs
    /// score at least the threshold and pass the validator. The highest
    /// score wins; ties go to the lower old index, then the lower current
    /// index. Matches are returned ordered by current index.
    pub fn select(
        &self,
        old: &[(usize, &TypeMember)],
        current: &[(usize, &TypeMember)],
        score: &dyn Fn(&TypeMember, &TypeMember) -> f64,
        current_type_name: &dyn Fn(&str) -> String,
    ) -> Vec<MemberMatch> {
        let mut pairs = Vec::new();
        for &(old_index, o) in old {
            for &(current_index, c) in current {
                let similarity = score(o, c);
                if similarity >= self.threshold
                    && self.validator.is_valid(o, c, similarity, current_type_name)
                {
                    pairs.push(MemberMatch {
                        old_index,
                        current_index,
                        similarity,
                    });
                }
            }
        }
        pairs.sort_by(|a, b| {
            b.similarity
                .total_cmp(&a.similarity)
                .then(a.old_index.cmp(&b.old_index))
                .then(a.current_index.cmp(&b.current_index))
        });

        let mut old_taken = Vec::new();
        let mut current_taken = Vec::new();
        let mut selected = Vec::new();
        for pair in pairs {
            if old_taken.contains(&pair.old_index) || current_taken.contains(&pair.current_index) {
                continue;
            }
            old_taken.push(pair.old_index);
            current_taken.push(pair.current_index);
            selected.push(pair);
        }
        selected.sort_by_key(|m| m.current_index);
        selected
    }
}

impl Default for MemberMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_SIMILARITY_THRESHOLD, Arc::new(ConvertibleValidator))
    }
}

impl fmt::Debug for MemberMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemberMatcher")
            .field("threshold", &self.threshold)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::similarity::MemberSimilator;
    use objgraph_dictionary::MemberKind;
    use objgraph_types::PrimitiveKind;
    use proptest::prelude::*;

    fn i32_member(name: &str) -> TypeMember {
        TypeMember::new(name, MemberKind::Primitive(PrimitiveKind::I32))
    }

    fn indexed(members: &[TypeMember]) -> Vec<(usize, &TypeMember)> {
        members.iter().enumerate().collect()
    }

    fn run(old: &[TypeMember], current: &[TypeMember]) -> Vec<(usize, usize)> {
        let similator = MemberSimilator::default();
        let same = |n: &str| n.to_string();
        MemberMatcher::default()
            .select(
                &indexed(old),
                &indexed(current),
                &|o, c| similator.evaluate(o, c, &same),
                &same,
            )
            .into_iter()
            .map(|m| (m.old_index, m.current_index))
            .collect()
    }

    #[test]
    fn exact_names_win() {
        let old = [i32_member("x"), i32_member("y")];
        let current = [i32_member("y"), i32_member("z"), i32_member("x")];
        assert_eq!(run(&old, &current), vec![(1, 0), (0, 2)]);
    }

    #[test]
    fn ties_break_by_declaration_order() {
        // Every pair scores the same.
        let old = [i32_member("a"), i32_member("b")];
        let current = [i32_member("c"), i32_member("d")];
        assert_eq!(run(&old, &current), vec![(0, 0), (1, 1)]);
    }

    #[test]
    fn validator_vetoes_narrowing() {
        let old = [TypeMember::new("count", MemberKind::Primitive(PrimitiveKind::I64))];
        let current = [i32_member("count")];
        assert!(run(&old, &current).is_empty());
    }

    #[test]
    fn references_to_unrelated_types_are_vetoed() {
        let old = [TypeMember::new("at", MemberKind::Reference("app.Point".into()))];
        let current = [TypeMember::new("at", MemberKind::Reference("app.Node".into()))];
        assert!(run(&old, &current).is_empty());
        let same_type = [TypeMember::new("at", MemberKind::Reference("app.Point".into()))];
        assert_eq!(run(&old, &same_type), vec![(0, 0)]);
    }

    #[test]
    fn below_threshold_is_unmatched() {
        let old = [TypeMember::new("x", MemberKind::Text)];
        let current = [i32_member("y")];
        assert!(run(&old, &current).is_empty());
    }

    fn member_strategy() -> impl Strategy<Value = TypeMember> {
        ("[a-d]{1,4}", prop_oneof![Just(PrimitiveKind::I32), Just(PrimitiveKind::I64)])
            .prop_map(|(name, kind)| TypeMember::new(name, MemberKind::Primitive(kind)))
    }

    proptest! {
        #[test]
        fn selection_is_deterministic_and_one_to_one(
            old in proptest::collection::vec(member_strategy(), 0..6),
            current in proptest::collection::vec(member_strategy(), 0..6),
        ) {
            let first = run(&old, &current);
            prop_assert_eq!(&first, &run(&old, &current));

            let mut olds: Vec<usize> = first.iter().map(|p| p.0).collect();
            let mut currents: Vec<usize> = first.iter().map(|p| p.1).collect();
            olds.sort_unstable();
            olds.dedup();
            currents.sort_unstable();
            currents.dedup();
            prop_assert_eq!(olds.len(), first.len());
            prop_assert_eq!(currents.len(), first.len());
        }
    }
}
