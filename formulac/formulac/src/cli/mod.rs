#![cfg(not(target_family = "wasm"))]

use std::env;
use std::fs::File;
use std::io::{self, BufWriter, IsTerminal, Read, Write};
use std::path::{Path, PathBuf};
use std::process::exit;
use std::str::FromStr;

use anstream::{eprintln, println};
use anyhow::{anyhow, Result};
use bitflags::Flags;
use clap::{Parser, Subcommand, ValueHint};
use clap_verbosity_flag::LogLevel;
use clio::{ClioPath, Output};
use itertools::Itertools;
use schemars::schema_for;
use serde::de::DeserializeOwned;
use serde::Serialize;

use formulac::debug;
use formulac::ir::CompiledMultiLevelQuery;
use formulac::query::{render_dependencies, sanitize_multi_query, scan_and_fork_multi_query};
use formulac::translation::{registry, DialectSet, TranslatedQuery};
use formulac::{compile_plan, optimize_formula, translate_plan};
use formulac::{DisplayOptions, ErrorMessages, FormulaItem, Options};

/// Entrypoint called by [`crate::main`]
pub fn main() -> color_eyre::eyre::Result<()> {
    let mut cli = Cli::parse();

    // redirect all log messages into the [debug::DebugLog]
    static LOGGER: debug::MessageLogger = debug::MessageLogger {
        max_level: log::LevelFilter::Trace,
    };
    log::set_logger(&LOGGER)
        .map(|()| log::set_max_level(cli.verbose.log_level_filter()))
        .map_err(|e| color_eyre::eyre::eyre!("cannot install logger: {e}"))?;

    color_eyre::install()?;
    cli.color.write_global();

    if let Err(error) = cli.command.run() {
        eprintln!("{error}");
        fn backtrace_enabled() -> bool {
            match env::var("RUST_LIB_BACKTRACE") {
                Ok(s) => s != "0",
                Err(_) => match env::var("RUST_BACKTRACE") {
                    Ok(s) => s != "0",
                    Err(_) => false,
                },
            }
        }
        if backtrace_enabled() {
            eprintln!("{:#}", error.backtrace());
        }

        exit(1)
    }

    Ok(())
}

#[derive(Parser, Debug, Clone)]
struct Cli {
    #[command(subcommand)]
    command: Command,
    #[command(flatten)]
    color: colorchoice_clap::Color,

    #[command(flatten)]
    verbose: clap_verbosity_flag::Verbosity<LoggingHelp>,
}

#[derive(Subcommand, Debug, Clone)]
#[command(name = env!("CARGO_PKG_NAME"), about, version)]
enum Command {
    /// Simplify a single formula
    Optimize {
        #[command(flatten)]
        io_args: IoArgs,
        #[arg(value_enum, long, default_value = "yaml")]
        format: Format,
    },

    /// Split query forks of a plan into sibling queries
    Fork {
        #[command(flatten)]
        io_args: IoArgs,
        #[arg(value_enum, long, default_value = "yaml")]
        format: Format,
    },

    /// Remove select columns of a plan that no consumer reads
    Sanitize {
        #[command(flatten)]
        io_args: IoArgs,
        #[arg(value_enum, long, default_value = "yaml")]
        format: Format,
    },

    /// Optimize, fork & sanitize a plan
    Compile {
        #[command(flatten)]
        io_args: IoArgs,
        #[arg(value_enum, long, default_value = "yaml")]
        format: Format,

        /// Keep formulas as they are
        #[arg(long = "no-optimize", action = clap::ArgAction::SetFalse)]
        optimize: bool,

        /// Leave query forks in place
        #[arg(long = "no-fork", action = clap::ArgAction::SetFalse)]
        fork: bool,

        /// Keep unused select columns
        #[arg(long = "no-sanitize", action = clap::ArgAction::SetFalse)]
        sanitize: bool,

        /// Upper bound of rewrite iterations per formula
        #[arg(long)]
        max_mutation_iterations: Option<usize>,

        /// File path into which to write the debug log to.
        #[arg(long, env = "FORMULAC_DEBUG_LOG")]
        debug_log: Option<PathBuf>,
    },

    /// Render every formula of a compiled plan as SQL
    Translate {
        #[command(flatten)]
        io_args: IoArgs,
        #[arg(value_enum, long, default_value = "yaml")]
        format: Format,

        /// Dialects to translate for, such as `POSTGRESQL_9_4 | SQLITE`
        #[arg(short, long, default_value = "ANY", env = "FORMULAC_DIALECT")]
        dialect: String,
    },

    /// Show the dependencies between the queries of a plan
    Graph(IoArgs),

    /// Show available dialect and dialect family names
    Dialects,

    /// Show the built-in translations
    Registry {
        /// Only show translations applicable to these dialects
        #[arg(short, long)]
        dialect: Option<String>,
    },

    #[command(subcommand)]
    Debug(DebugCommand),
}

/// Commands for meant for debugging, prone to change
#[derive(Subcommand, Debug, Clone)]
enum DebugCommand {
    /// Print JSON Schema
    JsonSchema {
        #[arg(value_enum, long)]
        schema_type: SchemaType,
    },
}

#[derive(clap::Args, Default, Debug, Clone)]
pub struct IoArgs {
    #[arg(value_parser, default_value = "-", value_hint(ValueHint::FilePath))]
    input: ClioPath,

    #[arg(value_parser, default_value = "-", value_hint(ValueHint::FilePath))]
    output: Output,
}

#[derive(Copy, Clone, Debug, Default)]
struct LoggingHelp;

impl LogLevel for LoggingHelp {
    /// By default, this will only report errors.
    fn default() -> Option<log::Level> {
        Some(log::Level::Error)
    }
    fn verbose_help() -> Option<&'static str> {
        Some("Increase logging verbosity")
    }

    fn verbose_long_help() -> Option<&'static str> {
        Some(
            r#"More `v`s, More vebose logging:
-v shows warnings
-vv shows info
-vvv shows debug
-vvvv shows trace"#,
        )
    }

    fn quiet_help() -> Option<&'static str> {
        Some("Silences logging output")
    }

    fn quiet_long_help() -> Option<&'static str> {
        Some("Silences logging output")
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum Format {
    Json,
    Yaml,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum SchemaType {
    Formula,
    Plan,
    Translated,
}

impl Command {
    /// Entrypoint called by [`main`]
    pub fn run(&mut self) -> Result<()> {
        match self {
            Command::Dialects => {
                println!("{}", list_dialects());
                Ok(())
            }
            Command::Registry { dialect } => {
                let dialects = dialect.as_deref().map(parse_dialects).transpose()?;
                println!("{}", list_translations(dialects));
                Ok(())
            }
            Command::Debug(DebugCommand::JsonSchema { schema_type }) => {
                let schema = match schema_type {
                    SchemaType::Formula => schema_for!(FormulaItem),
                    SchemaType::Plan => schema_for!(CompiledMultiLevelQuery),
                    SchemaType::Translated => schema_for!(Vec<TranslatedQuery>),
                };
                io::stdout().write_all(&serde_json::to_string_pretty(&schema)?.into_bytes())?;
                Ok(())
            }
            _ => self.run_io_command(),
        }
    }

    fn run_io_command(&mut self) -> Result<()> {
        let source = self.read_input()?;

        self.execute(&source)
            .and_then(|buf| Ok(self.write_output(&buf)?))
    }

    fn execute(&self, source: &str) -> Result<Vec<u8>> {
        let display = DisplayOptions::AnsiColor;
        Ok(match self {
            Command::Optimize { format, .. } => {
                let item: FormulaItem = read_document(source)?;
                let item = optimize_formula(&item, &Options::default())?;
                write_document(&item, *format)?
            }
            Command::Fork { format, .. } => {
                let plan: CompiledMultiLevelQuery = read_document(source)?;
                let plan = scan_and_fork_multi_query(plan)
                    .map_err(|e| ErrorMessages::from(e).composed(&display))?;
                write_document(&plan, *format)?
            }
            Command::Sanitize { format, .. } => {
                let plan: CompiledMultiLevelQuery = read_document(source)?;
                write_document(&sanitize_multi_query(plan), *format)?
            }
            Command::Compile {
                format,
                optimize,
                fork,
                sanitize,
                max_mutation_iterations,
                debug_log,
                ..
            } => {
                if debug_log.is_some() {
                    debug::log_start();
                }

                let mut opts = Options::default()
                    .with_optimize(*optimize)
                    .with_fork(*fork)
                    .with_sanitize(*sanitize);
                if let Some(max) = max_mutation_iterations {
                    opts = opts.with_max_mutation_iterations(*max);
                }

                let res = read_document(source)
                    .and_then(|plan| Ok(compile_plan(plan, &opts)?));

                if let Some(path) = debug_log {
                    write_log(path)?;
                }

                write_document(&res?, *format)?
            }
            Command::Translate {
                format, dialect, ..
            } => {
                let opts = Options::default().with_dialect(parse_dialects(dialect)?);
                let plan: CompiledMultiLevelQuery = read_document(source)?;
                write_document(&translate_plan(&plan, &opts)?, *format)?
            }
            Command::Graph(_) => {
                let plan: CompiledMultiLevelQuery = read_document(source)?;
                (render_dependencies(&plan) + "\n").into_bytes()
            }
            _ => unreachable!("Other commands shouldn't reach `execute`"),
        })
    }

    fn io_args(&mut self) -> &mut IoArgs {
        use Command::*;
        match self {
            Optimize { io_args, .. }
            | Fork { io_args, .. }
            | Sanitize { io_args, .. }
            | Compile { io_args, .. }
            | Translate { io_args, .. }
            | Graph(io_args) => io_args,
            Dialects | Registry { .. } | Debug(_) => {
                unreachable!("Only io commands have io args")
            }
        }
    }

    fn read_input(&mut self) -> Result<String> {
        let input = self.io_args().input.clone();

        // Don't wait without a prompt when reading from an interactive stdin.
        if input.path() == Path::new("-") && io::stdin().is_terminal() {
            #[cfg(unix)]
            eprintln!("Enter a JSON or YAML document, then press ctrl-d:\n");
            #[cfg(windows)]
            eprintln!("Enter a JSON or YAML document, then press ctrl-z:\n");
        }

        let mut source = String::new();
        input.open()?.read_to_string(&mut source)?;
        Ok(source)
    }

    fn write_output(&mut self, data: &[u8]) -> io::Result<()> {
        self.io_args().output.write_all(data)
    }
}

fn parse_dialects(text: &str) -> Result<DialectSet> {
    Ok(DialectSet::from_str(text).map_err(ErrorMessages::from)?)
}

/// Reads JSON, or YAML when the document doesn't look like JSON.
fn read_document<T: DeserializeOwned>(source: &str) -> Result<T> {
    let trimmed = source.trim_start();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        Ok(serde_json::from_str(source)?)
    } else {
        Ok(serde_yaml::from_str(source)?)
    }
}

fn write_document<T: Serialize>(value: &T, format: Format) -> Result<Vec<u8>> {
    Ok(match format {
        Format::Json => (serde_json::to_string_pretty(value)? + "\n").into_bytes(),
        Format::Yaml => serde_yaml::to_string(value)?.into_bytes(),
    })
}

/// One line per named dialect set; families list their members.
fn list_dialects() -> String {
    DialectSet::FLAGS
        .iter()
        .map(|flag| {
            let members = flag.value().dialects();
            if members.len() == 1 {
                flag.name().to_string()
            } else {
                format!("{} = {}", flag.name(), members.iter().join(" | "))
            }
        })
        .join("\n")
}

fn list_translations(dialects: Option<DialectSet>) -> String {
    let registry = registry();
    registry
        .names()
        .flat_map(|name| registry.variants(name))
        .filter(|t| dialects.map_or(true, |d| t.dialects.intersects(d)))
        .map(|t| {
            format!(
                "{} [{}] on {}: {}",
                t.name,
                t.arity,
                t.dialects,
                t.op.describe()
            )
        })
        .join("\n")
}

pub fn write_log(path: &Path) -> Result<()> {
    let debug_log = if let Some(debug_log) = debug::log_finish() {
        debug_log
    } else {
        return Err(anyhow!(
            "debug log was started, but it cannot be found after compilation"
        ));
    };
    match path.extension().and_then(|s| s.to_str()) {
        Some("json") => {
            let file = BufWriter::new(File::create(path)?);
            serde_json::to_writer(file, &debug_log)?;
        }
        Some("yaml" | "yml") => {
            let file = BufWriter::new(File::create(path)?);
            serde_yaml::to_writer(file, &debug_log)?;
        }
        _ => {
            return Err(anyhow!("unknown debug log format for file {path:?}"));
        }
    }
    Ok(())
}
