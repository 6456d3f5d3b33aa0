//! SIN compiler CLI.
//!
//! `sinc build` drives the whole pipeline (compile, assemble, link);
//! `sinc asm` and `sinc link` expose the later stages on their own.

use clap::{CommandFactory, Parser as ClapParser, Subcommand};
use clap_complete::{generate, Shell};
use std::io;
use std::path::PathBuf;
use std::process;

use sinc::{assemble_file_to_object, build_file, link_files, CompilerConfig};

#[derive(ClapParser)]
#[command(name = "sinc")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "SIN compiler - compile .sin programs for the SINVM", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a .sin file to a flat .sml binary
    Build {
        /// Input .sin source file
        input: PathBuf,

        /// Output path (defaults to the input filename with .sml)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Keep the intermediate assembly file (.sina)
        #[arg(long)]
        keep_asm: bool,

        /// Do not link the builtins runtime-support routines
        #[arg(long)]
        no_builtins: bool,

        /// Path to a TOML build configuration
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Assemble a .sina file to a .sinc object
    Asm {
        /// Input .sina assembly file
        input: PathBuf,

        /// Output path (defaults to the input filename with .sinc)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Link .sinc objects into a flat .sml binary
    Link {
        /// Object files, in link order
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Output path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Build {
            input,
            output,
            keep_asm,
            no_builtins,
            config,
        } => {
            let mut config = match config {
                Some(path) => match CompilerConfig::load(&path) {
                    Ok(config) => config,
                    Err(e) => fail(e),
                },
                None => CompilerConfig::default(),
            };
            if keep_asm {
                config.keep_asm = true;
            }
            if no_builtins {
                config.include_builtins = false;
            }
            let output = output.unwrap_or_else(|| input.with_extension("sml"));
            if let Err(e) = build_file(&input, &output, &config) {
                fail(e);
            }
        }
        Commands::Asm { input, output } => {
            let output = output.unwrap_or_else(|| input.with_extension("sinc"));
            if let Err(e) = assemble_file_to_object(&input, &output) {
                fail(e);
            }
        }
        Commands::Link { inputs, output } => {
            if let Err(e) = link_files(&inputs, &output) {
                fail(e);
            }
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "sinc", &mut io::stdout());
        }
    }
}

fn fail(error: impl std::fmt::Display) -> ! {
    eprintln!("{}", error);
    process::exit(1);
}
