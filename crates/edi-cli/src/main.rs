//! # edi-cli
//!
//! The `edi` command: parse, translate and split EDI files with grammars
//! from a grammar directory.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use edi_adapter_csv::LexedTableWriter;
use edi_engine::{Engine, EngineConfig};
use edi_grammar::Editype;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "edi")]
#[command(about = "EDI translation engine")]
#[command(version)]
struct Cli {
    /// Path to configuration file (YAML or JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Grammar directory; replaces the configured search paths
    #[arg(short, long, global = true)]
    grammars: Vec<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

/// Grammar selection shared by the subcommands
#[derive(Args)]
struct GrammarArgs {
    /// Editype of the grammar (edifact, x12, csv, fixed, xml, json, ...)
    #[arg(short, long)]
    editype: Editype,

    /// Grammar name, e.g. the envelope grammar `edifact` or a message type
    #[arg(short = 'm', long)]
    messagetype: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a file and print the document as JSON
    Parse {
        input: PathBuf,

        #[command(flatten)]
        grammar: GrammarArgs,

        /// Pretty-print the JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// Parse a file and write every message with another grammar
    Translate {
        input: PathBuf,

        #[command(flatten)]
        grammar: GrammarArgs,

        /// Editype of the output grammar
        #[arg(long)]
        to_editype: Editype,

        /// Name of the output grammar
        #[arg(long)]
        to_messagetype: String,

        /// Output file; message numbers are added when there are several
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List the messages a file splits into
    Split {
        input: PathBuf,

        #[command(flatten)]
        grammar: GrammarArgs,
    },

    /// Print the lexed records of a file as CSV, one row per token
    Lex {
        input: PathBuf,

        #[command(flatten)]
        grammar: GrammarArgs,

        /// Column delimiter of the output
        #[arg(long, default_value_t = ',')]
        delimiter: char,
    },

    /// Compile a grammar and report problems
    CheckGrammar {
        #[command(flatten)]
        grammar: GrammarArgs,
    },

    /// Parse a file and print the value found with an mpath
    Get {
        input: PathBuf,

        #[command(flatten)]
        grammar: GrammarArgs,

        /// Mpath like `UNB/UNH[0062=?]`
        mpath: String,
    },
}

/// One line of `edi split` output
#[derive(Serialize)]
struct MessageSummary {
    number: Option<usize>,
    total: Option<usize>,
    messagetype: Option<String>,
    record_count: usize,
    attributes: BTreeMap<String, String>,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> Result<EngineConfig> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::from_path(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => EngineConfig::default(),
    };
    if !cli.grammars.is_empty() {
        config = config.with_grammar_paths(cli.grammars.clone());
    }
    Ok(config)
}

async fn read_input(path: &Path) -> Result<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))
}

/// Output path for message `number`: `out.txt` becomes `out.2.txt`.
fn numbered(path: &Path, number: usize) -> PathBuf {
    let stem = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    let name = match path.extension() {
        Some(extension) => format!("{stem}.{number}.{}", extension.to_string_lossy()),
        None => format!("{stem}.{number}"),
    };
    path.with_file_name(name)
}

fn to_json<T: Serialize>(value: &T, pretty: bool) -> Result<String> {
    let text = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    Ok(text)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let engine = Engine::new(load_config(&cli)?);

    match cli.command {
        Commands::Parse { input, grammar, pretty } => {
            let raw = read_input(&input).await?;
            let document = engine
                .parse(&raw, grammar.editype, &grammar.messagetype)
                .with_context(|| format!("failed to parse {}", input.display()))?;
            println!("{}", to_json(&document, pretty)?);
        }
        Commands::Translate {
            input,
            grammar,
            to_editype,
            to_messagetype,
            output,
        } => {
            let raw = read_input(&input).await?;
            let outputs = engine
                .translate(
                    &raw,
                    (grammar.editype, &grammar.messagetype),
                    (to_editype, &to_messagetype),
                )
                .with_context(|| format!("failed to translate {}", input.display()))?;
            tracing::info!(input = %input.display(), messages = outputs.len(), "translation done");
            match output {
                Some(path) if outputs.len() == 1 => {
                    tokio::fs::write(&path, &outputs[0])
                        .await
                        .with_context(|| format!("failed to write {}", path.display()))?;
                }
                Some(path) => {
                    for (index, bytes) in outputs.iter().enumerate() {
                        let target = numbered(&path, index + 1);
                        tokio::fs::write(&target, bytes)
                            .await
                            .with_context(|| format!("failed to write {}", target.display()))?;
                    }
                }
                None => {
                    for bytes in &outputs {
                        println!("{}", String::from_utf8_lossy(bytes));
                    }
                }
            }
        }
        Commands::Split { input, grammar } => {
            let raw = read_input(&input).await?;
            let mut document = engine
                .parse(&raw, grammar.editype, &grammar.messagetype)
                .with_context(|| format!("failed to parse {}", input.display()))?;
            let messages = engine.split(&mut document, grammar.editype, &grammar.messagetype)?;
            for message in messages {
                let summary = MessageSummary {
                    number: message.metadata.message_number,
                    total: message.metadata.total_messages,
                    messagetype: message.metadata.messagetype,
                    record_count: message.metadata.record_count,
                    attributes: message.metadata.attributes,
                };
                println!("{}", to_json(&summary, false)?);
            }
        }
        Commands::Lex { input, grammar, delimiter } => {
            let raw = read_input(&input).await?;
            let records = engine
                .lex(&raw, grammar.editype, &grammar.messagetype)
                .with_context(|| format!("failed to lex {}", input.display()))?;
            let delimiter = u8::try_from(delimiter).context("delimiter must be a single byte character")?;
            LexedTableWriter::new()
                .with_delimiter(delimiter)
                .write(std::io::stdout().lock(), &records)?;
        }
        Commands::CheckGrammar { grammar } => {
            let compiled = engine
                .grammar(grammar.editype, &grammar.messagetype)
                .with_context(|| format!("grammar {} {} is not valid", grammar.editype, grammar.messagetype))?;
            println!(
                "OK: {} {} ({} record definitions)",
                compiled.editype,
                compiled.name,
                compiled.recorddefs.len()
            );
        }
        Commands::Get { input, grammar, mpath } => {
            let raw = read_input(&input).await?;
            let mut document = engine
                .parse(&raw, grammar.editype, &grammar.messagetype)
                .with_context(|| format!("failed to parse {}", input.display()))?;
            match engine.query(&mut document, grammar.editype, &grammar.messagetype, &mpath)? {
                Some(value) => println!("{value}"),
                None => anyhow::bail!("nothing found for {mpath}"),
            }
        }
    }
    Ok(())
}
