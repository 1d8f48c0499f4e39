use std::fmt;
use std::sync::Arc;

use objgraph_dictionary::{MemberKind, MemberTarget, RefactoringMapping, TypeDefinition, TypeMember};
use objgraph_handler::{HandlerError, HandlerResult, LegacyTypeHandlerCreator, TypeHandler};

use crate::error::{LegacyError, LegacyResult};
use crate::handler::{LegacyEnumHandler, LegacyTypeHandler};
use crate::mapping::{LegacyTypeMapper, LegacyTypeMapping, MemberSource};
use crate::matcher::MemberMatcher;
use crate::resultor::{LoggingResultor, MappingResultor};
use crate::similarity::{MemberSimilator, TypeSimilarity};

/// Builds legacy handlers for stored definitions that no longer match the
/// runtime shape of their type.
#[derive(Clone)]
pub struct LegacyTypeResolver {
    refactoring: Arc<RefactoringMapping>,
    similator: MemberSimilator,
    matcher: MemberMatcher,
    resultor: Arc<dyn MappingResultor>,
}

impl LegacyTypeResolver {
    pub fn new(refactoring: Arc<RefactoringMapping>) -> Self {
        Self {
            refactoring,
            similator: MemberSimilator::default(),
            matcher: MemberMatcher::default(),
            resultor: Arc::new(LoggingResultor),
        }
    }

    pub fn with_type_similarity(mut self, types: TypeSimilarity) -> Self {
        self.similator = MemberSimilator::new(types);
        self
    }

    pub fn with_matcher(mut self, matcher: MemberMatcher) -> Self {
        self.matcher = matcher;
        self
    }

    pub fn with_resultor(mut self, resultor: Arc<dyn MappingResultor>) -> Self {
        self.resultor = resultor;
        self
    }

    fn mapper(&self) -> LegacyTypeMapper {
        LegacyTypeMapper::new(
            Arc::clone(&self.refactoring),
            self.similator.clone(),
            self.matcher.clone(),
        )
    }

    /// Accepted member mapping between two record definitions.
    pub fn map_record(
        &self,
        old: &Arc<TypeDefinition>,
        current: &Arc<TypeDefinition>,
    ) -> LegacyResult<LegacyTypeMapping> {
        let mapping = self.mapper().map(old, current)?;
        self.resultor.accept(&mapping)?;
        Ok(mapping)
    }

    /// Accepted constant mapping between two enum definitions, plus the
    /// current ordinal for each old ordinal.
    ///
    /// Refactoring entries apply first, then equal names, then name
    /// similarity. An old constant whose best candidates score equally is
    /// rejected rather than guessed.
    pub fn map_enum(
        &self,
        old: &Arc<TypeDefinition>,
        current: &Arc<TypeDefinition>,
    ) -> LegacyResult<(LegacyTypeMapping, Vec<Option<u32>>)> {
        let old_constants = old.enum_constants();
        let current_constants = current.enum_constants();
        let invalid = |detail: String| LegacyError::InvalidMapping {
            type_name: current.type_name.clone(),
            detail,
        };

        let mut ordinals: Vec<Option<u32>> = vec![None; old_constants.len()];
        let mut explicit = vec![false; old_constants.len()];
        let mut old_done = vec![false; old_constants.len()];
        let mut claimed = vec![false; current_constants.len()];

        for (i, name) in old_constants.iter().enumerate() {
            match self.refactoring.lookup_member(old.type_id, &old.type_name, name) {
                Some(MemberTarget::Discard) => {
                    old_done[i] = true;
                    explicit[i] = true;
                }
                Some(MemberTarget::Member { identifier, .. }) => {
                    let c = current_constants
                        .iter()
                        .position(|n| *n == identifier)
                        .ok_or_else(|| invalid(format!("no current constant {identifier}")))?;
                    if claimed[c] {
                        return Err(invalid(format!("{identifier} is mapped twice")));
                    }
                    claimed[c] = true;
                    ordinals[i] = Some(c as u32);
                    old_done[i] = true;
                    explicit[i] = true;
                }
                None => {}
            }
        }

        for (i, name) in old_constants.iter().enumerate() {
            if old_done[i] {
                continue;
            }
            if let Some(c) = current_constants.iter().position(|n| n == name) {
                if !claimed[c] {
                    claimed[c] = true;
                    ordinals[i] = Some(c as u32);
                    old_done[i] = true;
                }
            }
        }

        let old_members: Vec<TypeMember> = old_constants
            .iter()
            .map(|n| TypeMember::new(*n, MemberKind::EnumConstant))
            .collect();
        let current_members: Vec<TypeMember> = current_constants
            .iter()
            .map(|n| TypeMember::new(*n, MemberKind::EnumConstant))
            .collect();
        let old_open: Vec<(usize, &TypeMember)> = old_members
            .iter()
            .enumerate()
            .filter(|(i, _)| !old_done[*i])
            .collect();
        let current_open: Vec<(usize, &TypeMember)> = current_members
            .iter()
            .enumerate()
            .filter(|(c, _)| !claimed[*c])
            .collect();
        let same = |n: &str| n.to_string();
        let score = |o: &TypeMember, c: &TypeMember| self.similator.evaluate(o, c, &same);

        for &(i, o) in &old_open {
            let scores: Vec<(f64, &str)> = current_open
                .iter()
                .map(|&(_, c)| (score(o, c), c.name.as_str()))
                .collect();
            let best = scores.iter().map(|s| s.0).fold(f64::MIN, f64::max);
            if best < self.matcher.threshold() {
                continue;
            }
            let candidates: Vec<String> = scores
                .iter()
                .filter(|s| s.0 == best)
                .map(|s| s.1.to_string())
                .collect();
            if candidates.len() > 1 {
                return Err(LegacyError::AmbiguousConstant {
                    type_name: current.type_name.clone(),
                    constant: old_constants[i].to_string(),
                    candidates,
                });
            }
        }
        for m in self.matcher.select(&old_open, &current_open, &score, &same) {
            ordinals[m.old_index] = Some(m.current_index as u32);
        }

        let mapping = enum_mapping(old, current, &ordinals, &explicit, &self.refactoring);
        self.resultor.accept(&mapping)?;
        Ok((mapping, ordinals))
    }

    fn build(
        &self,
        old: Arc<TypeDefinition>,
        current: Arc<dyn TypeHandler>,
    ) -> LegacyResult<Arc<dyn TypeHandler>> {
        let current_definition = Arc::clone(current.definition());
        match (old.is_enum(), current_definition.is_enum()) {
            (true, true) => {
                let (_, ordinals) = self.map_enum(&old, &current_definition)?;
                Ok(Arc::new(LegacyEnumHandler::new(old, current, ordinals)))
            }
            (false, false) => {
                let mapping = self.map_record(&old, &current_definition)?;
                Ok(Arc::new(LegacyTypeHandler::new(mapping, current)?))
            }
            _ => Err(LegacyError::KindChanged {
                type_name: current_definition.type_name.clone(),
            }),
        }
    }
}

/// Mapping table for an enum: the ordinal maps onto the ordinal, constants
/// onto their matched constants.
fn enum_mapping(
    old: &Arc<TypeDefinition>,
    current: &Arc<TypeDefinition>,
    ordinals: &[Option<u32>],
    explicit: &[bool],
    refactoring: &RefactoringMapping,
) -> LegacyTypeMapping {
    // Constant members follow the ordinal member in both definitions.
    let mut sources: Vec<MemberSource> = current
        .members
        .iter()
        .map(|m| MemberSource::New {
            declared: m.kind == MemberKind::Ordinal
                || refactoring.is_new_element(&current.type_name, &m.identifier()),
        })
        .collect();
    if !sources.is_empty() && !old.members.is_empty() {
        sources[0] = MemberSource::Old {
            old_index: 0,
            similarity: 1.0,
            explicit: false,
        };
    }
    let mut discarded = Vec::new();
    for (i, ordinal) in ordinals.iter().enumerate() {
        match ordinal {
            Some(c) => {
                sources[*c as usize + 1] = MemberSource::Old {
                    old_index: i + 1,
                    similarity: 1.0,
                    explicit: explicit[i],
                }
            }
            None => discarded.push((i + 1, explicit[i])),
        }
    }
    LegacyTypeMapping {
        old: Arc::clone(old),
        current: Arc::clone(current),
        sources,
        discarded,
    }
}

impl LegacyTypeHandlerCreator for LegacyTypeResolver {
    fn resolve_type_name(&self, old: &TypeDefinition) -> HandlerResult<Option<String>> {
        Ok(self.refactoring.resolve_type_name(&old.type_name)?)
    }

    fn create_legacy_handler(
        &self,
        old: Arc<TypeDefinition>,
        current: Arc<dyn TypeHandler>,
    ) -> HandlerResult<Arc<dyn TypeHandler>> {
        let old_type_id = old.type_id;
        let current_type_id = current.type_id();
        let type_name = current.type_name().to_string();
        self.build(old, current).map_err(|err| match err {
            LegacyError::Handler(e) => e,
            LegacyError::Dictionary(e) => HandlerError::Dictionary(e),
            other => HandlerError::SchemaMismatch {
                type_name,
                old_type_id,
                current_type_id,
                reason: other.to_string(),
            },
        })
    }
}

impl fmt::Debug for LegacyTypeResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LegacyTypeResolver")
            .field("matcher", &self.matcher)
            .field("refactoring_empty", &self.refactoring.is_empty())
            .finish()
    }
}
