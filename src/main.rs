use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use is_terminal::IsTerminal;
use owo_colors::OwoColorize;

use codetrace::{IndexError, Session, Settings};

#[derive(Parser)]
#[command(name = "codetrace")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Persistent, incremental source-code index for TypeScript-family projects")]
struct Cli {
    /// Project root to operate on (defaults to the current directory)
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default `.codetrace/settings.toml`
    Init {
        /// Overwrite an existing configuration file
        #[arg(short, long)]
        force: bool,
    },

    /// Print the effective configuration
    Config,

    /// Run a full index, then exit (ignores `indexing.watch_mode`)
    Index,

    /// Run a full index and keep watching for changes until interrupted
    Watch,

    /// Query the index
    Query {
        #[command(subcommand)]
        query: Query,
    },

    /// Show index totals for a project
    Stats {
        /// Project name (defaults to the workspace's default project)
        #[arg(short, long)]
        project: Option<String>,
    },

    /// List the projects discovered in this workspace
    Projects,
}

#[derive(Subcommand)]
enum Query {
    /// Look up a symbol by its qualified name
    Symbol {
        name: String,
        #[arg(short, long)]
        project: Option<String>,
    },

    /// Symbols and relations extracted from one file
    File {
        rel_path: String,
        #[arg(short, long)]
        project: Option<String>,
    },

    /// Files a given file imports, directly
    Dependencies {
        rel_path: String,
        #[arg(short, long)]
        project: Option<String>,
    },

    /// Files that import a given file, directly
    Dependents {
        rel_path: String,
        #[arg(short, long)]
        project: Option<String>,
    },

    /// The full transitive import closure of a file
    Transitive {
        rel_path: String,
        #[arg(short, long)]
        project: Option<String>,
    },

    /// Every file reachable (transitively) from a changed set
    Affected {
        rel_paths: Vec<String>,
        #[arg(short, long)]
        project: Option<String>,
    },

    /// Report whether the project's import graph has a cycle
    HasCycle {
        #[arg(short, long)]
        project: Option<String>,
    },

    /// Enumerate import cycles
    Cycles {
        #[arg(short, long)]
        project: Option<String>,
        #[arg(long)]
        max: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    // Piping output to a file or another process should produce plain text,
    // not raw ANSI escapes or spinner control characters.
    if !std::io::stderr().is_terminal() {
        owo_colors::set_override(false);
    }

    let cli = Cli::parse();
    let root = match cli.root.clone().map(Ok).unwrap_or_else(std::env::current_dir) {
        Ok(root) => root,
        Err(err) => {
            eprintln!("{} could not resolve current directory: {err}", "error:".red().bold());
            return ExitCode::FAILURE;
        }
    };
    let root = match root.canonicalize() {
        Ok(root) => root,
        Err(err) => {
            eprintln!("{} {}: {err}", "error:".red().bold(), root.display());
            return ExitCode::FAILURE;
        }
    };

    if let Commands::Init { force } = &cli.command {
        return match Settings::init_config_file(&root, *force) {
            Ok(path) => {
                println!("wrote {}", path.display());
                ExitCode::SUCCESS
            }
            Err(err) => {
                eprintln!("{} {err}", "error:".red().bold());
                ExitCode::FAILURE
            }
        };
    }

    if let Err(warning) = Settings::check_init(&root) {
        eprintln!("{} {warning}", "warning:".yellow().bold());
    }

    let mut settings = match Settings::load(&root) {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("{} configuration error: {err}", "error:".red().bold());
            return ExitCode::FAILURE;
        }
    };
    settings.project_root = root;
    codetrace::logging::init_with_config(&settings.logging);

    if let Commands::Config = &cli.command {
        match toml::to_string_pretty(&settings) {
            Ok(pretty) => println!("{pretty}"),
            Err(err) => eprintln!("{} {err}", "error:".red().bold()),
        }
        return ExitCode::SUCCESS;
    }

    match &cli.command {
        Commands::Index => settings.indexing.watch_mode = false,
        Commands::Watch => settings.indexing.watch_mode = true,
        _ => {}
    }

    let session = match Session::open(settings).await {
        Ok(session) => session,
        Err(err) => {
            eprintln!("{} {err}", "error:".red().bold());
            return ExitCode::FAILURE;
        }
    };

    let outcome = run(&session, &cli.command).await;

    if let Err(err) = session.close().await {
        eprintln!("{} failed to close session cleanly: {err}", "warning:".yellow().bold());
    }

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{} {err}", "error:".red().bold());
            ExitCode::FAILURE
        }
    }
}

async fn run(session: &Session, command: &Commands) -> Result<(), IndexError> {
    match command {
        Commands::Init { .. } | Commands::Config => unreachable!("handled before session open"),

        Commands::Index => {
            let spinner = spinner("indexing...");
            let report = session.reindex().await?;
            spinner.finish_and_clear();
            print_report(&report);
            Ok(())
        }

        Commands::Watch => {
            println!(
                "watching {} ({})",
                session.default_project(),
                format!("{:?}", session.role()).to_lowercase()
            );
            tokio::signal::ctrl_c().await.ok();
            Ok(())
        }

        Commands::Projects => {
            for project in session.projects() {
                println!("{:<24} {}", project.name, project.directory);
            }
            Ok(())
        }

        Commands::Stats { project } => {
            let stats = session.stats(project.as_deref())?;
            println!("files:     {}", stats.file_count);
            println!("symbols:   {}", stats.symbol_count);
            println!("relations: {}", stats.relation_count);
            Ok(())
        }

        Commands::Query { query } => run_query(session, query),
    }
}

fn run_query(session: &Session, query: &Query) -> Result<(), IndexError> {
    match query {
        Query::Symbol { name, project } => {
            match session.find_symbol(project.as_deref(), name)? {
                Some(symbol) => println!(
                    "{} ({:?}) at {}:{}-{}",
                    symbol.qualified_name, symbol.kind, symbol.rel_path, symbol.span.start_line, symbol.span.end_line
                ),
                None => println!("no symbol named {name:?}"),
            }
            Ok(())
        }

        Query::File { rel_path, project } => {
            for symbol in session.file_symbols(project.as_deref(), rel_path)? {
                println!("{:?} {}", symbol.kind, symbol.qualified_name);
            }
            Ok(())
        }

        Query::Dependencies { rel_path, project } => {
            print_list(session.get_dependencies(project.as_deref(), rel_path)?);
            Ok(())
        }

        Query::Dependents { rel_path, project } => {
            print_list(session.get_dependents(project.as_deref(), rel_path)?);
            Ok(())
        }

        Query::Transitive { rel_path, project } => {
            print_list(session.get_transitive_dependencies(project.as_deref(), rel_path)?);
            Ok(())
        }

        Query::Affected { rel_paths, project } => {
            print_list(session.get_affected_by_change(project.as_deref(), rel_paths)?);
            Ok(())
        }

        Query::HasCycle { project } => {
            println!("{}", session.has_cycle(project.as_deref())?);
            Ok(())
        }

        Query::Cycles { project, max } => {
            for cycle in session.get_cycle_paths(project.as_deref(), *max)? {
                println!("{}", cycle.join(" -> "));
            }
            Ok(())
        }
    }
}

fn spinner(message: &'static str) -> ProgressBar {
    let bar = if std::io::stderr().is_terminal() {
        ProgressBar::new_spinner()
    } else {
        ProgressBar::hidden()
    };
    bar.set_style(ProgressStyle::with_template("{spinner} {msg}").unwrap());
    bar.enable_steady_tick(std::time::Duration::from_millis(100));
    bar.set_message(message);
    bar
}

fn print_list(items: Vec<String>) {
    for item in items {
        println!("{item}");
    }
}

fn print_report(report: &codetrace::IndexReport) {
    println!(
        "indexed {} files, removed {} in {}ms ({} symbols, {} relations, {} failed)",
        report.indexed_files,
        report.removed_files,
        report.duration_ms,
        report.total_symbols,
        report.total_relations,
        report.failed_files.len(),
    );
}
