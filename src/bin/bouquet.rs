use std::{
    path::{Path, PathBuf},
    process::ExitCode,
};

use clap::{Parser, Subcommand};
use log::debug;

use bouquet::{BouquetError, LoaderConfig, Module, Repl, loader};

#[derive(Parser)]
#[command(author, version, about = "Module loader and runner for bouquet scripts")]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run a script or compiled artifact
    Run {
        script: PathBuf,
        /// Extra search path, may be repeated
        #[arg(short = 'I', long = "include")]
        include: Vec<PathBuf>,
    },
    /// Evaluate a snippet and print its value
    Eval {
        source: String,
        #[arg(short = 'I', long = "include")]
        include: Vec<PathBuf>,
    },
    /// Write a compiled artifact for a script
    Compile {
        script: PathBuf,
        /// Output path, defaults to the script path with a `.nsc` extension
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Start an interactive session
    Repl {
        #[arg(short = 'I', long = "include")]
        include: Vec<PathBuf>,
    },
}

fn main() -> ExitCode {
    env_logger::Builder::from_default_env()
        .format_timestamp(None)
        .init();

    match run(Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<(), BouquetError> {
    match args.command.unwrap_or(Command::Repl {
        include: Vec::new(),
    }) {
        Command::Run { script, include } => {
            let root = script.parent().unwrap_or(Path::new(".")).to_path_buf();
            let module = root_module(&script_name(&script), root, include);
            module.run_file(&script)?;
            Ok(())
        }
        Command::Eval { source, include } => {
            let module = root_module("eval", PathBuf::from("."), include);
            let value = module.eval(&source)?;
            if !value.is_unit() {
                println!("{value}");
            }
            Ok(())
        }
        Command::Compile { script, output } => {
            let output =
                output.unwrap_or_else(|| script.with_extension(loader::COMPILED_EXTENSION));
            loader::compile_file(&script, &output)
        }
        Command::Repl { include } => {
            let module = root_module("repl", PathBuf::from("."), include);
            Repl::new(module).run()
        }
    }
}

/// Search order: the root directory, then `-I` entries, then `BOUQUET_PATH`.
/// Relative entries other than the root are taken from the working directory.
fn root_module(name: &str, root: PathBuf, include: Vec<PathBuf>) -> Module {
    let mut config = LoaderConfig::new([PathBuf::from(".")]);
    let extra = include
        .into_iter()
        .chain(LoaderConfig::from_env().search_paths)
        .map(|path| std::path::absolute(&path).unwrap_or(path));
    config.extend(LoaderConfig::new(extra));
    debug!("search paths for `{name}`: {:?}", config.search_paths);
    Module::new(name, root, config)
}

fn script_name(script: &Path) -> String {
    script
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("main")
        .to_string()
}
