//! Per-member encoding shared by the reflective and legacy handlers.

use objgraph_binary::{RecordReader, RecordWriter};
use objgraph_dictionary::{MemberKind, TypeMember};
use objgraph_model::Value;
use objgraph_types::{ObjectId, PrimitiveKind};

use crate::error::{HandlerError, HandlerResult};
use crate::handler::ReferenceResolver;

/// A member value as read from a record, before references are resolved.
#[derive(Clone, Debug, PartialEq)]
pub enum RawValue {
    Value(Value),
    Reference(ObjectId),
}

/// Write one record member.
pub fn write_member(
    writer: &mut RecordWriter,
    type_name: &str,
    member: &TypeMember,
    value: &Value,
    resolver: &mut dyn ReferenceResolver,
) -> HandlerResult<()> {
    match (&member.kind, value) {
        (MemberKind::Primitive(kind), v) if v.primitive_kind() == Some(*kind) => {
            write_primitive(writer, v);
        }
        (MemberKind::Reference(_), Value::Null) => writer.write_object_id(ObjectId::NULL),
        (MemberKind::Reference(_), Value::Ref(target)) => {
            let id = resolver.resolve(target)?;
            writer.write_object_id(id);
        }
        (MemberKind::Text, Value::Text(s)) => writer.write_text(s),
        (MemberKind::Bytes, Value::Bytes(b)) => writer.write_bytes(b),
        (_, v) => {
            return Err(HandlerError::ValueMismatch {
                type_name: type_name.to_string(),
                member: member.identifier(),
                found: format!("{v:?}"),
            })
        }
    }
    Ok(())
}

fn write_primitive(writer: &mut RecordWriter, value: &Value) {
    match value {
        Value::Bool(v) => writer.write_bool(*v),
        Value::I8(v) => writer.write_i8(*v),
        Value::I16(v) => writer.write_i16(*v),
        Value::I32(v) => writer.write_i32(*v),
        Value::I64(v) => writer.write_i64(*v),
        Value::F32(v) => writer.write_f32(*v),
        Value::F64(v) => writer.write_f64(*v),
        Value::Char(v) => writer.write_char(*v),
        _ => {}
    }
}

fn read_primitive(reader: &mut RecordReader, kind: PrimitiveKind) -> HandlerResult<Value> {
    Ok(match kind {
        PrimitiveKind::Bool => Value::Bool(reader.read_bool()?),
        PrimitiveKind::I8 => Value::I8(reader.read_i8()?),
        PrimitiveKind::I16 => Value::I16(reader.read_i16()?),
        PrimitiveKind::I32 => Value::I32(reader.read_i32()?),
        PrimitiveKind::I64 => Value::I64(reader.read_i64()?),
        PrimitiveKind::F32 => Value::F32(reader.read_f32()?),
        PrimitiveKind::F64 => Value::F64(reader.read_f64()?),
        PrimitiveKind::Char => Value::Char(reader.read_char()?),
    })
}

/// Read one record member. Only kinds a record member can have are accepted.
pub fn read_member(
    reader: &mut RecordReader,
    type_name: &str,
    member: &TypeMember,
) -> HandlerResult<RawValue> {
    Ok(match &member.kind {
        MemberKind::Primitive(kind) => RawValue::Value(read_primitive(reader, *kind)?),
        MemberKind::Reference(_) => RawValue::Reference(reader.read_object_id()?),
        MemberKind::Text => RawValue::Value(Value::Text(reader.read_text()?)),
        MemberKind::Bytes => RawValue::Value(Value::Bytes(reader.read_bytes()?)),
        other => {
            return Err(HandlerError::ValueMismatch {
                type_name: type_name.to_string(),
                member: member.identifier(),
                found: other.token().to_string(),
            })
        }
    })
}

/// Consume one member without decoding it.
pub fn skip_member(reader: &mut RecordReader, kind: &MemberKind) -> HandlerResult<()> {
    if kind.is_fixed_length() {
        reader.skip(kind.persisted_length_min())?;
    } else {
        reader.skip_variable()?;
    }
    Ok(())
}

/// Report every non-null object id held by the members of a record.
pub fn visit_member_references(
    reader: &mut RecordReader,
    members: &[TypeMember],
    visit: &mut dyn FnMut(ObjectId),
) -> HandlerResult<()> {
    for member in members {
        match member.kind {
            MemberKind::Reference(_) => {
                let id = reader.read_object_id()?;
                if !id.is_null() {
                    visit(id);
                }
            }
            MemberKind::References => {
                for id in reader.read_id_list()? {
                    if !id.is_null() {
                        visit(id);
                    }
                }
            }
            MemberKind::Entries => {
                for (key, value) in reader.read_entries()? {
                    for id in [key, value] {
                        if !id.is_null() {
                            visit(id);
                        }
                    }
                }
            }
            ref kind => skip_member(reader, kind)?,
        }
    }
    Ok(())
}
