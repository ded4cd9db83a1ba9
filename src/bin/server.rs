//! `weave-cli`: a local, non-networked test-drive binary for the document
//! engine (design §6 — no HTTP/WebSocket surface; snapshot files on disk are
//! the only persistence this binary knows about).

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use weave_core::document::Document;
use weave_core::node::NodeSpec;

#[derive(Parser)]
#[command(name = "weave-cli", about = "Exercise the weave document engine from the command line")]
struct Cli {
    /// Path to a snapshot file to load before running the command.
    #[arg(long, global = true)]
    snapshot: Option<PathBuf>,

    /// Peer id to construct the document with (ignored if --snapshot loads one).
    #[arg(long, default_value_t = 1)]
    peer_id: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a root element and print its id.
    Init {
        #[arg(long, default_value = "div")]
        tag: String,
    },
    /// Append a text value node under `--parent`.
    AddText {
        #[arg(long)]
        parent: String,
        #[arg(long)]
        text: String,
    },
    /// Print the document tree as indented tags/values.
    Tree,
    /// Print the recorded patch history as JSON.
    History,
    /// Undo the last local mutation.
    Undo,
    /// Redo the last undone mutation.
    Redo,
    /// Write a snapshot to `--out`.
    Export {
        #[arg(long)]
        out: PathBuf,
    },
    /// Replay a JSON patch array (as produced by `history`) rooted at `--start`.
    Replay {
        #[arg(long)]
        patches: PathBuf,
        #[arg(long)]
        start: String,
    },
}

fn main() -> Result<()> {
    weave_core::observability::init_logging(&weave_core::observability::LoggingConfig::default())
        .context("initializing logging")?;

    let cli = Cli::parse();
    let doc = match &cli.snapshot {
        Some(path) if path.exists() => {
            let doc = Document::new(cli.peer_id)?;
            let bytes = std::fs::read(path).with_context(|| format!("reading snapshot {}", path.display()))?;
            doc.import(&bytes)?;
            doc
        }
        _ => Document::new(cli.peer_id)?,
    };

    match cli.command {
        Command::Init { tag } => {
            let root = doc.root();
            let ids = doc.mutate().add_children(
                root,
                vec![NodeSpec::Element { tag, attrs: BTreeMap::new() }],
                None,
            );
            for id in ids {
                println!("{id}");
            }
        }
        Command::AddText { parent, text } => {
            let parent_id = weave_core::types::parse_node_id(&parent)
                .with_context(|| format!("'{parent}' is not a valid node id"))?;
            let ids = doc.mutate().add_children(parent_id, vec![NodeSpec::Value { value: text }], None);
            for id in ids {
                println!("{id}");
            }
        }
        Command::Tree => print_tree(&doc, doc.root(), 0),
        Command::History => {
            let history = doc.history();
            println!("{}", serde_json::to_string_pretty(&history)?);
        }
        Command::Undo => {
            println!("{}", doc.undo_manager().undo());
        }
        Command::Redo => {
            println!("{}", doc.undo_manager().redo());
        }
        Command::Export { out } => {
            let bytes = doc.export_snapshot()?;
            std::fs::write(&out, bytes).with_context(|| format!("writing snapshot {}", out.display()))?;
        }
        Command::Replay { patches, start } => {
            let text = std::fs::read_to_string(&patches)
                .with_context(|| format!("reading patch file {}", patches.display()))?;
            let patches: Vec<weave_core::patch::Patch> = serde_json::from_str(&text)?;
            let start_id = weave_core::types::parse_node_id(&start)
                .with_context(|| format!("'{start}' is not a valid node id"))?;
            doc.replay(&patches, start_id);
        }
    }

    Ok(())
}

fn print_tree(doc: &Document, id: weave_core::NodeId, depth: usize) {
    let indent = "  ".repeat(depth);
    match doc.node(id) {
        Some(weave_core::node::NodeSnapshot::Element { tag, .. }) => println!("{indent}<{tag}> {id}"),
        Some(weave_core::node::NodeSnapshot::Value { text }) => println!("{indent}\"{text}\" {id}"),
        Some(other) => println!("{indent}{:?} {id}", other.kind()),
        None => println!("{indent}<missing {id}>"),
    }
    for child in doc.children(id) {
        print_tree(doc, child, depth + 1);
    }
}
