use std::path::PathBuf;
use std::process;

use argscope_core::{DwarfReader, NodeKind, ReaderOptions, Result as DwarfResult};
use argscope_utils::{debug, init_logging, init_logging_to_dir, init_logging_with_level, LogFormat, LogLevel};
use clap::{Parser, Subcommand, ValueEnum};

/// Inspect argument, return-value and struct layouts recorded in a binary's DWARF.
#[derive(Parser, Debug)]
#[command(name = "argscope")]
#[command(version)]
#[command(about = "Inspect argument, return-value and struct layouts recorded in a binary's DWARF", long_about = None)]
struct Cli
{
    /// Binary with DWARF debug info (ELF or Mach-O)
    binary: PathBuf,

    /// Scan the debug info on every query instead of building a name index
    #[arg(long, default_value_t = false)]
    no_index: bool,

    /// Log level (error, warn, info, debug, trace); overrides RUST_LOG
    #[arg(long)]
    log_level: Option<LogLevel>,

    /// Log format (pretty or json)
    #[arg(long, default_value = "pretty")]
    log_format: LogFormat,

    /// Also write logs to a dated file in this directory
    #[arg(long)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands
{
    /// Show the binary's predominant source language
    Language,
    /// List every debug-info entry answering to a name
    Find
    {
        name: String,
        /// Only show entries of this kind
        #[arg(long, value_enum)]
        kind: Option<KindArg>,
    },
    /// Byte offset of a struct member
    Member
    {
        #[arg(value_name = "STRUCT")]
        struct_name: String,
        member: String,
    },
    /// Byte size of a function argument
    Size
    {
        function: String,
        arg: String,
    },
    /// Where a function argument lives at entry
    Location
    {
        function: String,
        arg: String,
    },
    /// Type and location of every argument and return slot
    Args
    {
        function: String,
    },
    /// Declared return type of a function
    Retval
    {
        function: String,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum KindArg
{
    Function,
    Parameter,
    Variable,
    Struct,
    Member,
    Typedef,
    Base,
}

impl From<KindArg> for NodeKind
{
    fn from(kind: KindArg) -> Self
    {
        match kind {
            KindArg::Function => NodeKind::Function,
            KindArg::Parameter => NodeKind::Parameter,
            KindArg::Variable => NodeKind::Variable,
            KindArg::Struct => NodeKind::Struct,
            KindArg::Member => NodeKind::Member,
            KindArg::Typedef => NodeKind::Typedef,
            KindArg::Base => NodeKind::BaseType,
        }
    }
}

fn main()
{
    let cli = Cli::parse();

    let logging = match (&cli.log_dir, cli.log_level) {
        (Some(dir), level) => init_logging_to_dir(level.unwrap_or(LogLevel::Info), cli.log_format, dir).map(|_| ()),
        (None, Some(level)) => init_logging_with_level(level, cli.log_format),
        (None, None) => init_logging(),
    };
    if let Err(e) = logging {
        eprintln!("Failed to initialize logging: {e}");
        process::exit(1);
    }

    if let Err(e) = run_command(cli) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run_command(cli: Cli) -> DwarfResult<()>
{
    let options = ReaderOptions::default().with_index(!cli.no_index);
    let reader = DwarfReader::open_with(&cli.binary, options)?;
    debug!(binary = %cli.binary.display(), "loaded");

    match cli.command {
        Commands::Language => match reader.source_language() {
            Some(language) => println!("{language} ({})", language.family()),
            None => println!("unknown"),
        },
        Commands::Find { name, kind } => {
            let matches = reader.matching_nodes(&name, kind.map(NodeKind::from));
            if matches.is_empty() {
                println!("no entries named {name}");
            }
            for node in matches {
                println!(
                    "{:>8}  {:<12} {}{}",
                    node.id().to_string(),
                    node.kind().to_string(),
                    node.qualified_name().or(node.name()).unwrap_or("<anonymous>"),
                    if node.is_declaration() { "  (declaration)" } else { "" }
                );
            }
        }
        Commands::Member { struct_name, member } => {
            let offset = reader.struct_member_offset(&struct_name, &member)?;
            println!("{struct_name}.{member} at offset {offset}");
        }
        Commands::Size { function, arg } => {
            let size = reader.argument_byte_size(&function, &arg)?;
            println!("{size}");
        }
        Commands::Location { function, arg } => {
            let location = reader.argument_location(&function, &arg)?;
            println!("{location}");
        }
        Commands::Args { function } => {
            let args = reader.function_arg_info(&function)?;
            let mut ordered: Vec<_> = args.iter().collect();
            ordered.sort_by_key(|(_, info)| info.location.offset);
            for (name, info) in ordered {
                println!(
                    "{name:<12} {:<8} {:<24} {}{}",
                    info.var_type.to_string(),
                    info.type_name,
                    info.location,
                    if info.is_retval { "  (return)" } else { "" }
                );
            }
        }
        Commands::Retval { function } => {
            let retval = reader.function_retval_info(&function)?;
            println!("{} {} ({} bytes)", retval.var_type, retval.type_name, retval.byte_size);
        }
    }

    Ok(())
}
