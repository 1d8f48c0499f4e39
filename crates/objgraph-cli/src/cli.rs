use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "objgraph", about = "Inspect objgraph storage directories", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Log storage recovery and decoding at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Print the stored type dictionary
    Types(DirArgs),
    /// List stored records
    Records(RecordsArgs),
    /// Decode one record using its stored type definition
    Show(ShowArgs),
    /// Record, type and byte counts
    Stats(DirArgs),
}

#[derive(Args)]
pub struct DirArgs {
    /// Storage directory
    pub dir: PathBuf,
}

#[derive(Args)]
pub struct RecordsArgs {
    /// Storage directory
    pub dir: PathBuf,
    /// Only list records of this type name
    #[arg(long = "type", short = 't')]
    pub type_name: Option<String>,
}

#[derive(Args)]
pub struct ShowArgs {
    /// Storage directory
    pub dir: PathBuf,
    /// Object id to decode
    pub object_id: u64,
}
