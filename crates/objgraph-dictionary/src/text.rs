//! Line-oriented text form of the type dictionary.
//!
//! ```text
//! 0000000000001000001 app.Point
//! {
//!     i32 x,
//!     i32 y,
//!     app.Node next,
//!     [text] app.Shape#label,
//! }
//! ```
//!
//! Type ids are zero-padded to 19 digits. Member lines are tab-indented and
//! hold a type token followed by `name` or `Qualifier#name`.

use std::fmt::Write as _;

use objgraph_types::TypeId;

use crate::definition::TypeDefinition;
use crate::error::{DictionaryError, DictionaryResult};
use crate::member::{MemberKind, TypeMember};

/// Append the text form of one definition.
pub fn assemble_definition(definition: &TypeDefinition, out: &mut String) {
    let _ = writeln!(out, "{:019} {}", definition.type_id.as_u64(), definition.type_name);
    out.push_str("{\n");
    for member in &definition.members {
        let _ = writeln!(out, "\t{} {},", member.kind.token(), member.identifier());
    }
    out.push_str("}\n");
}

/// Text form of a set of definitions, separated by blank lines.
pub fn assemble<'a>(definitions: impl IntoIterator<Item = &'a TypeDefinition>) -> String {
    let mut out = String::new();
    for (i, definition) in definitions.into_iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        assemble_definition(definition, &mut out);
    }
    out
}

/// Parse the text form. Errors carry the 1-based line number.
pub fn parse(text: &str) -> DictionaryResult<Vec<TypeDefinition>> {
    let mut definitions = Vec::new();
    let mut lines = text
        .lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty());

    while let Some((line_no, header)) = lines.next() {
        let (type_id, type_name) = parse_header(line_no, header)?;

        match lines.next() {
            Some((_, "{")) => {}
            Some((n, other)) => {
                return Err(DictionaryError::parse(n, format!("expected '{{', found '{other}'")))
            }
            None => return Err(DictionaryError::parse(line_no, "missing '{' after header")),
        }

        let mut members = Vec::new();
        loop {
            match lines.next() {
                Some((_, "}")) => break,
                Some((n, line)) => members.push(parse_member(n, line)?),
                None => {
                    return Err(DictionaryError::parse(
                        line_no,
                        format!("unterminated definition of {type_name}"),
                    ))
                }
            }
        }
        definitions.push(TypeDefinition::new(type_id, type_name, members));
    }
    Ok(definitions)
}

fn parse_header(line_no: usize, line: &str) -> DictionaryResult<(TypeId, String)> {
    let (id, name) = line
        .split_once(char::is_whitespace)
        .ok_or_else(|| DictionaryError::parse(line_no, "expected '<type id> <type name>'"))?;
    let id: u64 = id
        .parse()
        .map_err(|_| DictionaryError::parse(line_no, format!("invalid type id '{id}'")))?;
    let type_id = TypeId::new(id).map_err(|e| DictionaryError::parse(line_no, e.to_string()))?;
    let name = name.trim();
    if name.is_empty() || name.contains(char::is_whitespace) {
        return Err(DictionaryError::parse(line_no, format!("invalid type name '{name}'")));
    }
    Ok((type_id, name.to_string()))
}

fn parse_member(line_no: usize, line: &str) -> DictionaryResult<TypeMember> {
    let body = line
        .strip_suffix(',')
        .ok_or_else(|| DictionaryError::parse(line_no, "member declaration must end with ','"))?;
    let mut parts = body.split_whitespace();
    let (Some(token), Some(identifier), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(DictionaryError::parse(
            line_no,
            format!("expected '<type> <identifier>', found '{body}'"),
        ));
    };
    let (qualifier, name) = TypeMember::split_identifier(identifier);
    if name.is_empty() {
        return Err(DictionaryError::parse(line_no, "empty member name"));
    }
    let member = TypeMember::new(name, MemberKind::from_token(token));
    Ok(match qualifier {
        Some(q) => member.qualified(q),
        None => member,
    })
}
