use std::fmt::{self, Write as _};
use std::sync::Arc;

use objgraph_dictionary::{MemberKind, MemberTarget, RefactoringMapping, TypeDefinition, TypeMember};

use crate::error::{LegacyError, LegacyResult};
use crate::matcher::MemberMatcher;
use crate::similarity::{convertible, MemberSimilator};

/// Where a current member gets its value from.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MemberSource {
    /// Read from this old member.
    Old {
        old_index: usize,
        similarity: f64,
        explicit: bool,
    },
    /// Left at its default value.
    New { declared: bool },
}

/// How the members of one stored definition map onto the current definition.
#[derive(Clone, Debug)]
pub struct LegacyTypeMapping {
    pub old: Arc<TypeDefinition>,
    pub current: Arc<TypeDefinition>,
    /// Source of each current member, by current member index.
    pub sources: Vec<MemberSource>,
    /// Old members whose values are dropped, with whether a refactoring
    /// entry asked for it.
    pub discarded: Vec<(usize, bool)>,
}

impl LegacyTypeMapping {
    /// Current member index fed by each old member.
    pub fn old_targets(&self) -> Vec<Option<usize>> {
        let mut targets = vec![None; self.old.members.len()];
        for (current_index, source) in self.sources.iter().enumerate() {
            if let MemberSource::Old { old_index, .. } = source {
                targets[*old_index] = Some(current_index);
            }
        }
        targets
    }

    /// Old members discarded without a refactoring entry saying so.
    pub fn implicit_discards(&self) -> Vec<&TypeMember> {
        self.discarded
            .iter()
            .filter(|(_, explicit)| !explicit)
            .map(|(i, _)| &self.old.members[*i])
            .collect()
    }

    /// Current members left at their defaults without being declared new.
    pub fn implicit_new_members(&self) -> Vec<&TypeMember> {
        self.sources
            .iter()
            .enumerate()
            .filter(|(_, s)| matches!(s, MemberSource::New { declared: false }))
            .map(|(i, _)| &self.current.members[i])
            .collect()
    }

    /// Mapping table, one line per current member, then discarded members.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "{} {} -> {} {}",
            self.old.type_id, self.old.type_name, self.current.type_id, self.current.type_name
        );
        for (current_index, source) in self.sources.iter().enumerate() {
            let current = &self.current.members[current_index];
            match source {
                MemberSource::Old {
                    old_index,
                    similarity,
                    explicit,
                } => {
                    let token = if *explicit {
                        "explicit".to_string()
                    } else {
                        format!("{:.3}", similarity)
                    };
                    let _ = writeln!(
                        out,
                        "  {} -{token}-> {}",
                        self.old.members[*old_index], current
                    );
                }
                MemberSource::New { .. } => {
                    let _ = writeln!(out, "  [new] {current}");
                }
            }
        }
        for (old_index, _) in &self.discarded {
            let _ = writeln!(out, "  {} [discarded]", self.old.members[*old_index]);
        }
        out
    }
}

impl fmt::Display for LegacyTypeMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Builds [`LegacyTypeMapping`]s: refactoring entries first, then automatic
/// matching of whatever is left.
#[derive(Clone, Debug)]
pub struct LegacyTypeMapper {
    refactoring: Arc<RefactoringMapping>,
    similator: MemberSimilator,
    matcher: MemberMatcher,
}

impl LegacyTypeMapper {
    pub fn new(
        refactoring: Arc<RefactoringMapping>,
        similator: MemberSimilator,
        matcher: MemberMatcher,
    ) -> Self {
        Self {
            refactoring,
            similator,
            matcher,
        }
    }

    pub fn refactoring(&self) -> &Arc<RefactoringMapping> {
        &self.refactoring
    }

    /// Current name of a type referenced by an old definition.
    pub fn current_type_name(&self, old_type_name: &str) -> String {
        match self.refactoring.resolve_type_name(old_type_name) {
            Ok(Some(name)) => name,
            _ => old_type_name.to_string(),
        }
    }

    fn invalid(current: &TypeDefinition, detail: String) -> LegacyError {
        LegacyError::InvalidMapping {
            type_name: current.type_name.clone(),
            detail,
        }
    }

    /// Map the members of `old` onto `current`.
    pub fn map(
        &self,
        old: &Arc<TypeDefinition>,
        current: &Arc<TypeDefinition>,
    ) -> LegacyResult<LegacyTypeMapping> {
        let mut sources: Vec<Option<MemberSource>> = vec![None; current.members.len()];
        let mut old_done = vec![false; old.members.len()];
        let mut discarded = Vec::new();
        let rename = |name: &str| self.current_type_name(name);

        for (index, member) in current.members.iter().enumerate() {
            if self
                .refactoring
                .is_new_element(&current.type_name, &member.identifier())
            {
                sources[index] = Some(MemberSource::New { declared: true });
            }
        }

        for (old_index, member) in old.members.iter().enumerate() {
            let Some(target) =
                self.refactoring
                    .lookup_member(old.type_id, &old.type_name, &member.identifier())
            else {
                continue;
            };
            match target {
                MemberTarget::Discard => {
                    old_done[old_index] = true;
                    discarded.push((old_index, true));
                }
                MemberTarget::Member {
                    type_name,
                    identifier,
                } => {
                    if type_name.is_some_and(|t| t != current.type_name) {
                        continue;
                    }
                    let current_index = current.member_position(&identifier).ok_or_else(|| {
                        Self::invalid(current, format!("no current member {identifier}"))
                    })?;
                    let target = &current.members[current_index];
                    if !convertible(&member.kind, &target.kind, &rename) {
                        return Err(Self::invalid(
                            current,
                            format!("{member} cannot be read as {target}"),
                        ));
                    }
                    if sources[current_index].is_some() {
                        return Err(Self::invalid(
                            current,
                            format!("{identifier} is already mapped or declared new"),
                        ));
                    }
                    sources[current_index] = Some(MemberSource::Old {
                        old_index,
                        similarity: 1.0,
                        explicit: true,
                    });
                    old_done[old_index] = true;
                }
            }
        }

        let old_open: Vec<(usize, &TypeMember)> = old
            .members
            .iter()
            .enumerate()
            .filter(|(i, m)| !old_done[*i] && m.kind != MemberKind::Ordinal)
            .collect();
        let current_open: Vec<(usize, &TypeMember)> = current
            .members
            .iter()
            .enumerate()
            .filter(|(i, m)| sources[*i].is_none() && m.kind != MemberKind::Ordinal)
            .collect();
        let matches = self.matcher.select(
            &old_open,
            &current_open,
            &|o, c| self.similator.evaluate(o, c, &rename),
            &rename,
        );
        for m in matches {
            sources[m.current_index] = Some(MemberSource::Old {
                old_index: m.old_index,
                similarity: m.similarity,
                explicit: false,
            });
            old_done[m.old_index] = true;
        }

        // A reference member that kept its name but now points at another
        // type must be mapped, discarded or declared new explicitly.
        for (old_index, member) in old.members.iter().enumerate() {
            let MemberKind::Reference(old_target) = &member.kind else {
                continue;
            };
            if old_done[old_index] {
                continue;
            }
            let Some(current_index) = current.member_position(&member.identifier()) else {
                continue;
            };
            if let (None, MemberKind::Reference(current_target)) =
                (&sources[current_index], &current.members[current_index].kind)
            {
                return Err(Self::invalid(
                    current,
                    format!(
                        "{} referenced {old_target}, which is not the current {current_target}",
                        member.identifier()
                    ),
                ));
            }
        }

        for (old_index, member) in old.members.iter().enumerate() {
            if !old_done[old_index] && member.kind != MemberKind::Ordinal {
                discarded.push((old_index, false));
            }
        }
        discarded.sort_unstable();

        let sources = sources
            .into_iter()
            .zip(&current.members)
            .map(|(source, member)| match (source, &member.kind) {
                (Some(s), _) => s,
                (None, MemberKind::Ordinal) => MemberSource::New { declared: true },
                (None, _) => MemberSource::New { declared: false },
            })
            .collect();

        Ok(LegacyTypeMapping {
            old: Arc::clone(old),
            current: Arc::clone(current),
            sources,
            discarded,
        })
    }
}
