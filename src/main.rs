mod config;
mod editor;
mod index;
mod paths;
mod resolver;
mod watcher;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use config::Config;
use editor::ImportStyle;
use index::{FileIndex, FileSnapshot};
use resolver::{ModuleCandidate, Resolver};
use watcher::{FileWatcher, PathFilter, WatchOptions};

#[derive(Parser)]
#[command(
    name = "impjs",
    version,
    about = "Resolve bare JavaScript identifiers to project modules and rewrite the import block"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve an identifier to candidate modules
    Resolve {
        identifier: String,

        /// Project root (defaults to current directory)
        #[arg(short, long, default_value = ".")]
        dir: PathBuf,

        /// Output format: text, json
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Merge imports for identifiers into a file's leading require block
    Add {
        /// File whose import block is rewritten
        file: PathBuf,

        /// Identifiers to import (e.g. from a linter's undefined list)
        #[arg(required = true)]
        identifiers: Vec<String>,

        /// Rewrite the file in place instead of printing to stdout
        #[arg(long)]
        write: bool,

        /// Chooser decision IDENT=MODULE, bypassing resolution for IDENT
        #[arg(long = "path", value_name = "IDENT=MODULE")]
        chosen: Vec<String>,

        /// Project root (defaults to current directory)
        #[arg(short, long, default_value = ".")]
        dir: PathBuf,
    },

    /// Watch a project and report index updates (diagnostic surface)
    Watch {
        /// Project root (defaults to current directory)
        #[arg(default_value = ".")]
        dir: PathBuf,

        /// Skip push notifications; force the polling fallback
        #[arg(long)]
        poll: bool,
    },

    /// Show effective configuration
    Config {
        /// Project root (defaults to current directory)
        #[arg(default_value = ".")]
        dir: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Resolve {
            identifier,
            dir,
            format,
        } => run_resolve(&identifier, &dir, format),
        Commands::Add {
            file,
            identifiers,
            write,
            chosen,
            dir,
        } => run_add(&file, &identifiers, write, &chosen, &dir),
        Commands::Watch { dir, poll } => run_watch(&dir, poll, cli.verbose),
        Commands::Config { dir } => config::show_config(&dir),
    }
}

/// One-shot index seeding for the non-daemon commands: a single full
/// enumeration stands in for a live watcher.
fn seeded_snapshot(root: &Path, config: &Config) -> Result<FileSnapshot> {
    let root = root
        .canonicalize()
        .with_context(|| format!("Failed to resolve project root {}", root.display()))?;
    let filter = PathFilter::new(config)?;
    let index = FileIndex::new();
    index.upsert(watcher::enumerate(&root, &filter)?);
    Ok(index.snapshot())
}

fn run_resolve(identifier: &str, dir: &Path, format: OutputFormat) -> Result<()> {
    let config = Config::load(dir)?;
    let snapshot = seeded_snapshot(dir, &config)?;
    let resolver = Resolver::new(&config)?;
    let candidates = resolver.resolve(identifier, &snapshot);

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&candidates)?);
        }
        OutputFormat::Text => {
            if candidates.is_empty() {
                eprintln!("impjs: no module found for '{identifier}'");
            }
            for candidate in &candidates {
                println!("{}", candidate.display_name.cyan());
            }
        }
    }
    Ok(())
}

fn run_add(
    file: &Path,
    identifiers: &[String],
    write: bool,
    chosen: &[String],
    dir: &Path,
) -> Result<()> {
    let config = Config::load(dir)?;
    let snapshot = seeded_snapshot(dir, &config)?;
    let resolver = Resolver::new(&config)?;
    let style = ImportStyle {
        declaration_keyword: config.declaration_keyword.as_str().to_string(),
        text_width: config.text_width,
        indent_unit: config.indent_unit.clone(),
    };

    let chosen = parse_chosen(chosen)?;

    let mut buffer = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;

    for identifier in identifiers {
        // A chooser decision bypasses resolution for this identifier.
        if let Some(module) = chosen.get(identifier.as_str()) {
            let destructured = config
                .aliases
                .get(identifier)
                .map(|alias| alias.destructured())
                .unwrap_or(false);
            let candidate = ModuleCandidate {
                lookup_path: None,
                import_path: module.clone(),
                display_name: module.clone(),
                is_destructured: destructured,
            };
            buffer = editor::merge(&buffer, identifier, &candidate, &style);
            continue;
        }

        let candidates = resolver.resolve(identifier, &snapshot);
        match candidates.as_slice() {
            [] => eprintln!("impjs: no module found for '{identifier}'"),
            [only] => buffer = editor::merge(&buffer, identifier, only, &style),
            many => {
                // Disambiguation belongs to the external chooser; report the
                // options and leave the buffer unchanged for this identifier.
                eprintln!("impjs: '{identifier}' is ambiguous:");
                for candidate in many {
                    eprintln!("  {}", candidate.display_name);
                }
            }
        }
    }

    if write {
        std::fs::write(file, &buffer)
            .with_context(|| format!("Failed to write {}", file.display()))?;
    } else {
        print!("{buffer}");
    }
    Ok(())
}

fn parse_chosen(pairs: &[String]) -> Result<HashMap<&str, String>> {
    let mut chosen = HashMap::new();
    for pair in pairs {
        let Some((identifier, module)) = pair.split_once('=') else {
            bail!("Invalid --path value '{pair}', expected IDENT=MODULE");
        };
        chosen.insert(identifier, module.to_string());
    }
    Ok(chosen)
}

fn run_watch(dir: &Path, poll: bool, verbose: u8) -> Result<()> {
    let config = Config::load(dir)?;
    let watcher = FileWatcher::start(
        dir,
        &config,
        WatchOptions {
            poll_interval: Duration::from_secs(config.poll_interval_secs),
            force_polling: poll,
            verbose: verbose.max(1),
        },
    )?;
    eprintln!(
        "impjs.watch indexed {} files under {}",
        watcher.index().len(),
        watcher.root().display()
    );

    loop {
        std::thread::sleep(Duration::from_secs(1));
        if let Err(err) = watcher.status() {
            // SubscriptionLost is surfaced, not auto-recovered; the owner
            // decides whether to reinitialize.
            bail!(err);
        }
    }
}
