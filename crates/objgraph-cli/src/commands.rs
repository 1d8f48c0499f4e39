use std::collections::HashMap;
use std::path::Path;

use anyhow::{bail, Context};
use colored::Colorize;
use objgraph_binary::BinaryRecord;
use objgraph_dictionary::{text, MemberKind, TypeDefinition};
use objgraph_handler::codec::{self, RawValue};
use objgraph_model::Value;
use objgraph_store::{FileChannel, FileChannelConfig, PersistenceSource};
use objgraph_types::{ObjectId, TypeId};
use serde_json::json;
use tracing::debug;

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let format = cli.format;
    match cli.command {
        Command::Types(args) => cmd_types(args),
        Command::Records(args) => cmd_records(args, format),
        Command::Show(args) => cmd_show(args, format),
        Command::Stats(args) => cmd_stats(args, format),
    }
}

/// Read access to one storage directory.
struct Inspector {
    channel: FileChannel,
    types: HashMap<TypeId, TypeDefinition>,
}

impl Inspector {
    fn open(dir: &Path) -> anyhow::Result<Self> {
        if !dir.is_dir() {
            bail!("{} is not a directory", dir.display());
        }
        let channel = FileChannel::open(dir, FileChannelConfig::default())
            .with_context(|| format!("opening storage in {}", dir.display()))?;
        let types = text::parse(&channel.read_type_dictionary()?)?
            .into_iter()
            .map(|d| (d.type_id, d))
            .collect::<HashMap<_, _>>();
        debug!(dir = %dir.display(), types = types.len(), "storage opened");
        Ok(Self { channel, types })
    }

    fn type_name(&self, type_id: TypeId) -> &str {
        self.types
            .get(&type_id)
            .map(|d| d.type_name.as_str())
            .unwrap_or("?")
    }

    fn records(&self, type_name: Option<&str>) -> anyhow::Result<Vec<BinaryRecord>> {
        let mut records = self.channel.read_all()?;
        if let Some(name) = type_name {
            records.retain(|r| self.type_name(r.type_id) == name);
        }
        records.sort_by_key(|r| r.object_id);
        Ok(records)
    }
}

/// Decode every member of `record` as text, using the stored definition.
fn decode_record(
    definition: &TypeDefinition,
    record: &BinaryRecord,
) -> anyhow::Result<Vec<(String, String)>> {
    let constants = definition.enum_constants();
    let mut reader = record.reader();
    let mut fields = Vec::new();
    for member in &definition.members {
        let rendered = match &member.kind {
            MemberKind::EnumConstant => continue,
            MemberKind::Ordinal => {
                let ordinal = reader.read_u32()?;
                let name = constants.get(ordinal as usize).copied().unwrap_or("?");
                format!("{ordinal} ({name})")
            }
            MemberKind::References => id_list(reader.read_id_list()?),
            MemberKind::Entries => {
                let entries: Vec<String> = reader
                    .read_entries()?
                    .into_iter()
                    .map(|(k, v)| format!("{} => {}", id_text(k), id_text(v)))
                    .collect();
                format!("{{{}}}", entries.join(", "))
            }
            _ => match codec::read_member(&mut reader, &definition.type_name, member)? {
                RawValue::Reference(id) => id_text(id),
                RawValue::Value(value) => render_value(&value),
            },
        };
        fields.push((member.identifier(), rendered));
    }
    reader.finish()?;
    Ok(fields)
}

fn render_value(value: &Value) -> String {
    match value {
        Value::Bytes(bytes) => format!("0x{}", hex::encode(bytes)),
        other => format!("{other:?}"),
    }
}

fn id_text(id: ObjectId) -> String {
    if id.is_null() {
        "null".to_string()
    } else {
        format!("@{id}")
    }
}

fn id_list(ids: Vec<ObjectId>) -> String {
    let items: Vec<String> = ids.into_iter().map(id_text).collect();
    format!("[{}]", items.join(", "))
}

fn cmd_types(args: DirArgs) -> anyhow::Result<()> {
    let inspector = Inspector::open(&args.dir)?;
    let mut definitions: Vec<&TypeDefinition> = inspector.types.values().collect();
    definitions.sort_by_key(|d| d.type_id);
    if definitions.is_empty() {
        println!("No types stored.");
        return Ok(());
    }
    print!("{}", text::assemble(definitions));
    Ok(())
}

fn cmd_records(args: RecordsArgs, format: OutputFormat) -> anyhow::Result<()> {
    let inspector = Inspector::open(&args.dir)?;
    let records = inspector.records(args.type_name.as_deref())?;
    if format == OutputFormat::Json {
        let rows: Vec<_> = records
            .iter()
            .map(|r| {
                json!({
                    "object_id": r.object_id.as_u64(),
                    "type_id": r.type_id.as_u64(),
                    "type_name": inspector.type_name(r.type_id),
                    "len": r.encoded_len(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }
    for r in &records {
        println!(
            "{}  {} {}  {} bytes",
            r.object_id.to_string().yellow(),
            inspector.type_name(r.type_id).cyan(),
            r.type_id.to_string().dimmed(),
            r.encoded_len()
        );
    }
    println!("{} records", records.len().to_string().bold());
    Ok(())
}

fn cmd_show(args: ShowArgs, format: OutputFormat) -> anyhow::Result<()> {
    let inspector = Inspector::open(&args.dir)?;
    let object_id = ObjectId::new(args.object_id)?;
    let Some(record) = inspector
        .channel
        .read_by_object_ids(&[object_id])?
        .into_iter()
        .next()
    else {
        bail!("no record for object {object_id}");
    };
    let definition = inspector
        .types
        .get(&record.type_id)
        .with_context(|| format!("type {} is not in the dictionary", record.type_id))?;
    let fields = decode_record(definition, &record)?;

    if format == OutputFormat::Json {
        let members: serde_json::Map<String, serde_json::Value> = fields
            .into_iter()
            .map(|(k, v)| (k, serde_json::Value::String(v)))
            .collect();
        let out = json!({
            "object_id": object_id.as_u64(),
            "type_name": definition.type_name,
            "members": members,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }
    println!(
        "{} {} ({})",
        object_id.to_string().yellow().bold(),
        definition.type_name.cyan(),
        record.type_id
    );
    for (name, value) in fields {
        println!("  {name}: {value}");
    }
    Ok(())
}

fn cmd_stats(args: DirArgs, format: OutputFormat) -> anyhow::Result<()> {
    let inspector = Inspector::open(&args.dir)?;
    let stats = inspector.channel.stats();
    let segment_bytes = inspector.channel.offset();
    if format == OutputFormat::Json {
        let out = json!({
            "commits": stats.commits,
            "records": stats.records,
            "record_bytes": stats.record_bytes,
            "types": inspector.types.len(),
            "segment_bytes": segment_bytes,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }
    println!("Commits:       {}", stats.commits.to_string().bold());
    println!("Records:       {}", stats.records.to_string().bold());
    println!("Record bytes:  {}", stats.record_bytes);
    println!("Types:         {}", inspector.types.len());
    println!("Segment bytes: {}", segment_bytes);
    Ok(())
}
