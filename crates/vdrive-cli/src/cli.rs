use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use vdrive_types::SortRule;

#[derive(Parser)]
#[command(
    name = "vdrive",
    about = "vdrive: browse and edit storage volumes through node hashes",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// TOML file describing the volumes to mount
    #[arg(short, long, global = true, conflicts_with = "root")]
    pub config: Option<PathBuf>,

    /// Mount a single local directory instead of a config file
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

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
    /// List mounted volumes
    Volumes,
    /// Show the attributes of a node
    Info(NodeArgs),
    /// List a directory
    Ls(LsArgs),
    /// Show every directory below a node
    Tree(NodeArgs),
    /// Create a directory
    Mkdir(CreateArgs),
    /// Create an empty file
    Mkfile(CreateArgs),
    /// Print the content of a file
    Cat(NodeArgs),
    /// Replace the content of a file from a local file or stdin
    Put(PutArgs),
    /// Remove a node, recursively
    Rm(NodeArgs),
    /// Rename a node in place
    Rename(RenameArgs),
    /// Copy a node next to itself
    Dup(NodeArgs),
    /// Copy a file into a directory, possibly on another volume
    Cp(CpArgs),
    /// Search a volume by name mask
    Find(FindArgs),
    /// Show the volume and path a hash addresses
    Decode(DecodeArgs),
    /// Show diagnostics of one or every volume
    Debug(DebugArgs),
}

#[derive(Args)]
pub struct NodeArgs {
    /// Node hash; `/` is the root of the first volume
    #[arg(default_value = "/")]
    pub hash: String,
}

#[derive(Args)]
pub struct LsArgs {
    #[arg(default_value = "/")]
    pub hash: String,
    /// name, size, modified or kind-then-name; the volume default otherwise
    #[arg(long)]
    pub sort: Option<SortRule>,
}

#[derive(Args)]
pub struct CreateArgs {
    /// Hash of the parent directory
    pub parent: String,
    pub name: String,
}

#[derive(Args)]
pub struct PutArgs {
    pub hash: String,
    /// Local file to read, or `-` for stdin
    pub source: String,
}

#[derive(Args)]
pub struct RenameArgs {
    pub hash: String,
    pub name: String,
}

#[derive(Args)]
pub struct CpArgs {
    pub src: String,
    /// Hash of the destination directory
    pub dst_parent: String,
    /// Name of the copy; the source name by default
    #[arg(long)]
    pub name: Option<String>,
}

#[derive(Args)]
pub struct FindArgs {
    pub mask: String,
    /// Node hash selecting the volume to search
    #[arg(long = "in", default_value = "/")]
    pub within: String,
}

#[derive(Args)]
pub struct DecodeArgs {
    pub hash: String,
}

#[derive(Args)]
pub struct DebugArgs {
    /// Volume id, e.g. `v1`; every volume when omitted
    pub volume: Option<String>,
}
