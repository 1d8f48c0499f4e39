use std::collections::BTreeMap;
use std::sync::Arc;

use objgraph_types::TypeId;
use serde::{Deserialize, Serialize};

use crate::member::{MemberKind, TypeMember};

/// One immutable structural version of a type.
///
/// Members are listed in persisted order: the order their values appear in a
/// binary record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDefinition {
    pub type_id: TypeId,
    pub type_name: String,
    pub members: Vec<TypeMember>,
}

impl TypeDefinition {
    pub fn new(type_id: TypeId, type_name: impl Into<String>, members: Vec<TypeMember>) -> Self {
        Self {
            type_id,
            type_name: type_name.into(),
            members,
        }
    }

    /// Member sequences match in kind and declared type, names ignored.
    pub fn structurally_equal(&self, other: &TypeDefinition) -> bool {
        self.members.len() == other.members.len()
            && self
                .members
                .iter()
                .zip(&other.members)
                .all(|(a, b)| a.structurally_equal(b))
    }

    /// Same type name and member-for-member description equality. Ids are
    /// not compared.
    pub fn description_equal(&self, other: &TypeDefinition) -> bool {
        self.type_name == other.type_name && self.members == other.members
    }

    /// Returns `true` if this definition describes an enum.
    pub fn is_enum(&self) -> bool {
        self.members.first().map(|m| &m.kind) == Some(&MemberKind::Ordinal)
    }

    /// Enum constant names in ordinal order.
    pub fn enum_constants(&self) -> Vec<&str> {
        self.members
            .iter()
            .filter(|m| m.kind == MemberKind::EnumConstant)
            .map(|m| m.name.as_str())
            .collect()
    }

    /// Returns `true` if any member holds object ids.
    pub fn has_references(&self) -> bool {
        self.members.iter().any(|m| {
            matches!(
                m.kind,
                MemberKind::Reference(_) | MemberKind::References | MemberKind::Entries
            )
        })
    }

    /// Smallest possible record content length.
    pub fn persisted_length_min(&self) -> u64 {
        self.members
            .iter()
            .map(|m| m.kind.persisted_length_min())
            .sum()
    }

    /// Position of the member with this identifier.
    pub fn member_position(&self, identifier: &str) -> Option<usize> {
        self.members.iter().position(|m| m.identifier() == identifier)
    }
}

/// Version history of one logical type.
#[derive(Clone, Debug, Default)]
pub struct TypeLineage {
    pub type_name: String,
    /// Every definition ever assigned to this type, by id.
    pub entries: BTreeMap<TypeId, Arc<TypeDefinition>>,
    /// The definition matching the current runtime shape, once known.
    pub runtime: Option<Arc<TypeDefinition>>,
}

impl TypeLineage {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            ..Self::default()
        }
    }

    /// Most recently assigned definition.
    pub fn latest(&self) -> Option<&Arc<TypeDefinition>> {
        self.entries.values().next_back()
    }

    /// Existing definition with the same description as `definition`.
    pub fn find_description_equal(&self, definition: &TypeDefinition) -> Option<&Arc<TypeDefinition>> {
        self.entries
            .values()
            .find(|d| d.description_equal(definition))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use objgraph_types::PrimitiveKind;

    fn i32_member(name: &str) -> TypeMember {
        TypeMember::new(name, MemberKind::Primitive(PrimitiveKind::I32))
    }

    #[test]
    fn structural_vs_description_equality() {
        let point = TypeDefinition::new(
            TypeId::from_raw(1_000_000),
            "app.Point",
            vec![i32_member("x"), i32_member("y")],
        );
        let coord = TypeDefinition::new(
            TypeId::from_raw(1_000_001),
            "app.Coordinate",
            vec![i32_member("posX"), i32_member("posY")],
        );
        assert!(point.structurally_equal(&coord));
        assert!(!point.description_equal(&coord));

        let mut again = point.clone();
        again.type_id = TypeId::from_raw(1_000_002);
        assert!(point.description_equal(&again));
    }

    #[test]
    fn enum_definitions() {
        let def = TypeDefinition::new(
            TypeId::from_raw(1_000_000),
            "app.Color",
            vec![
                TypeMember::new("ordinal", MemberKind::Ordinal),
                TypeMember::new("RED", MemberKind::EnumConstant),
                TypeMember::new("GREEN", MemberKind::EnumConstant),
            ],
        );
        assert!(def.is_enum());
        assert_eq!(def.enum_constants(), vec!["RED", "GREEN"]);
        assert_eq!(def.persisted_length_min(), 4);
        assert!(!def.has_references());
    }

    #[test]
    fn lineage_latest_and_lookup() {
        let mut lineage = TypeLineage::new("app.Point");
        assert!(lineage.is_empty());
        let v1 = Arc::new(TypeDefinition::new(
            TypeId::from_raw(1_000_000),
            "app.Point",
            vec![i32_member("x")],
        ));
        let v2 = Arc::new(TypeDefinition::new(
            TypeId::from_raw(1_000_005),
            "app.Point",
            vec![i32_member("x"), i32_member("y")],
        ));
        lineage.entries.insert(v1.type_id, v1.clone());
        lineage.entries.insert(v2.type_id, v2.clone());
        assert_eq!(lineage.latest().unwrap().type_id, v2.type_id);

        let candidate = TypeDefinition::new(TypeId::NULL, "app.Point", vec![i32_member("x")]);
        assert_eq!(lineage.find_description_equal(&candidate).unwrap().type_id, v1.type_id);
    }
}
