use tracing::info;

use crate::error::{LegacyError, LegacyResult};
use crate::mapping::LegacyTypeMapping;

/// Decides whether a computed member mapping may be used.
pub trait MappingResultor: Send + Sync {
    fn accept(&self, mapping: &LegacyTypeMapping) -> LegacyResult<()>;
}

/// Accepts every mapping and logs its table.
#[derive(Clone, Copy, Debug, Default)]
pub struct LoggingResultor;

impl MappingResultor for LoggingResultor {
    fn accept(&self, mapping: &LegacyTypeMapping) -> LegacyResult<()> {
        info!(
            old_type_id = %mapping.old.type_id,
            current_type_id = %mapping.current.type_id,
            type_name = %mapping.current.type_name,
            discarded = mapping.discarded.len(),
            "legacy type mapping\n{}",
            mapping.render()
        );
        Ok(())
    }
}

/// Rejects mappings that drop an old member or leave a current member
/// unfilled, unless a refactoring entry asked for it.
#[derive(Clone, Copy, Debug, Default)]
pub struct StrictResultor;

impl MappingResultor for StrictResultor {
    fn accept(&self, mapping: &LegacyTypeMapping) -> LegacyResult<()> {
        let discarded: Vec<String> = mapping
            .implicit_discards()
            .iter()
            .map(|m| m.identifier())
            .collect();
        let unmapped: Vec<String> = mapping
            .implicit_new_members()
            .iter()
            .map(|m| m.identifier())
            .collect();
        if discarded.is_empty() && unmapped.is_empty() {
            return LoggingResultor.accept(mapping);
        }
        Err(LegacyError::UnmappedMembers {
            type_name: mapping.current.type_name.clone(),
            discarded,
            unmapped,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::MemberSource;
    use objgraph_dictionary::{MemberKind, TypeDefinition, TypeMember};
    use objgraph_types::{PrimitiveKind, TypeId};
    use std::sync::Arc;

    fn mapping(discarded: Vec<(usize, bool)>, sources: Vec<MemberSource>) -> LegacyTypeMapping {
        let member = |n: &str| TypeMember::new(n, MemberKind::Primitive(PrimitiveKind::I32));
        LegacyTypeMapping {
            old: Arc::new(TypeDefinition::new(TypeId::from_raw(1_000_000), "app.P", vec![member("a")])),
            current: Arc::new(TypeDefinition::new(TypeId::from_raw(1_000_001), "app.P", vec![member("b")])),
            sources,
            discarded,
        }
    }

    #[test]
    fn strict_rejects_implicit_changes() {
        let m = mapping(vec![(0, false)], vec![MemberSource::New { declared: false }]);
        assert!(LoggingResultor.accept(&m).is_ok());
        match StrictResultor.accept(&m) {
            Err(LegacyError::UnmappedMembers {
                discarded,
                unmapped,
                ..
            }) => {
                assert_eq!(discarded, vec!["a"]);
                assert_eq!(unmapped, vec!["b"]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn strict_accepts_declared_changes() {
        let m = mapping(vec![(0, true)], vec![MemberSource::New { declared: true }]);
        assert!(StrictResultor.accept(&m).is_ok());
    }
}
