// src/main.rs

use anyhow::{Result, anyhow};
use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use pkgcore::commit::{
    Collaborators, CommitEngine, CommitOptions, LogProgress, ProcessRunner, StateInstaller,
    StdinPrompt,
};
use pkgcore::db::{self, SqliteConfigStore};
use pkgcore::graph::PackageDb;
use pkgcore::output::Output;
use pkgcore::repository::{PlanSolver, RepositoryIndex, SolverPlan};
use std::path::PathBuf;
use tracing::info;

const DEFAULT_DB_PATH: &str = "/var/lib/pkgcore/pkgcore.db";

#[derive(Parser)]
#[command(name = "pkgcore")]
#[command(author, version, about = "Package commit engine with unsatisfiable-world diagnostics", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Inputs describing the package universe and the solver's decision
#[derive(Args)]
struct SolveArgs {
    /// JSON repository index
    #[arg(short, long)]
    index: PathBuf,
    /// JSON solver plan (target world and ordered changes)
    #[arg(short, long)]
    plan: PathBuf,
    /// Database path (default: /var/lib/pkgcore/pkgcore.db)
    #[arg(short, long, default_value = DEFAULT_DB_PATH)]
    db_path: String,
    /// Treat every non-local repository as unreachable
    #[arg(long)]
    no_network: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the pkgcore database
    Init {
        /// Database path (default: /var/lib/pkgcore/pkgcore.db)
        #[arg(short, long, default_value = DEFAULT_DB_PATH)]
        db_path: String,
    },
    /// Apply a solver plan and persist its world
    Commit {
        #[command(flatten)]
        solve: SolveArgs,
        /// Filesystem root packages are installed into
        #[arg(short, long, default_value = "/")]
        root: PathBuf,
        /// Show what would be done without doing it
        #[arg(short, long)]
        simulate: bool,
        /// List changes and ask before applying them
        #[arg(short = 'I', long)]
        interactive: bool,
        /// Do not run hooks or trigger scripts
        #[arg(long)]
        no_scripts: bool,
        /// Report commit hooks instead of running them
        #[arg(long)]
        no_commit_hooks: bool,
        /// Commit even if world dependencies reference unknown repository tags
        #[arg(long)]
        force_broken_world: bool,
        /// More output; repeat for more
        #[arg(short, long, action = clap::ArgAction::Count)]
        verbose: u8,
        /// Less output
        #[arg(short, long, action = clap::ArgAction::Count)]
        quiet: u8,
    },
    /// Explain why a plan's world cannot be satisfied
    Explain {
        #[command(flatten)]
        solve: SolveArgs,
    },
    /// Show the persisted world
    World {
        /// Database path (default: /var/lib/pkgcore/pkgcore.db)
        #[arg(short, long, default_value = DEFAULT_DB_PATH)]
        db_path: String,
    },
    /// Show commit history
    History {
        /// Database path (default: /var/lib/pkgcore/pkgcore.db)
        #[arg(short, long, default_value = DEFAULT_DB_PATH)]
        db_path: String,
    },
    /// Generate shell completion scripts
    Completions {
        /// Shell type
        shell: Shell,
    },
}

/// Build the package graph from the index and the persisted installed set
fn load_graph(solve: &SolveArgs, conn: &rusqlite::Connection) -> Result<PackageDb> {
    let mut graph = PackageDb::new();
    graph.no_network = solve.no_network;
    RepositoryIndex::from_file(&solve.index)?.load_into(&mut graph)?;
    let installed = db::load_installed(conn, &mut graph)?;
    db::load_world(conn, &mut graph)?;
    info!(
        "Loaded {} packages, {} installed",
        graph.num_packages(),
        installed
    );
    Ok(graph)
}

fn main() -> Result<()> {
    // Initialize tracing subscriber for logging
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Init { db_path }) => {
            info!("Initializing pkgcore database at: {}", db_path);
            db::init(&db_path)?;
            println!("Database initialized successfully at: {}", db_path);
            Ok(())
        }
        Some(Commands::Commit {
            solve,
            root,
            simulate,
            interactive,
            no_scripts,
            no_commit_hooks,
            force_broken_world,
            verbose,
            quiet,
        }) => {
            let mut store = SqliteConfigStore::new(db::open(&solve.db_path)?).simulate(simulate);
            let mut graph = load_graph(&solve, store.connection())?;
            let plan = SolverPlan::from_file(&solve.plan)?;
            let world = plan.world(&mut graph)?;
            let mut solver = PlanSolver::new(plan);

            let options = CommitOptions {
                simulate,
                interactive,
                no_scripts,
                no_commit_hooks,
                force_broken_world,
                verbosity: 1 + i32::from(verbose) - i32::from(quiet),
                root: root.clone(),
                ..CommitOptions::default()
            };
            let mut out = Output::terminal(options.verbosity);
            let runner = ProcessRunner::new(&root).with_scripts_dir(options.scripts_dir.clone());
            let (mut hooks, mut triggers) = (runner.clone(), runner);
            let mut installer = StateInstaller::new();
            let mut prompt = StdinPrompt;
            let mut progress = LogProgress;

            let io = Collaborators {
                installer: &mut installer,
                triggers: &mut triggers,
                hooks: &mut hooks,
                config: &mut store,
                prompt: &mut prompt,
                progress: &mut progress,
            };
            let errors = CommitEngine::new(options, io).commit_world(
                &mut graph,
                &mut solver,
                &world,
                &mut out,
            )?;
            if errors > 0 {
                return Err(anyhow!("Commit finished with {} errors", errors));
            }
            Ok(())
        }
        Some(Commands::Explain { solve }) => {
            let conn = db::open(&solve.db_path)?;
            let mut graph = load_graph(&solve, &conn)?;
            let plan = SolverPlan::from_file(&solve.plan)?;
            let world = plan.world(&mut graph)?;
            let partial = plan.changeset(&mut graph)?;

            let report = pkgcore::diagnose(&mut graph, &partial, &world);
            let mut out = Output::terminal(1);
            report.render(&mut out);
            Ok(())
        }
        Some(Commands::World { db_path }) => {
            let conn = db::open(&db_path)?;
            let mut graph = PackageDb::new();
            for dep in db::load_world(&conn, &mut graph)? {
                println!("{}", graph.dep_spec(&dep));
            }
            Ok(())
        }
        Some(Commands::History { db_path }) => {
            let conn = db::open(&db_path)?;
            let commits = db::history(&conn)?;
            if commits.is_empty() {
                println!("No commits recorded");
            }
            for commit in commits {
                println!(
                    "{} {} ({} packages, {} MiB) {}",
                    commit.id.unwrap_or_default(),
                    commit.committed_at,
                    commit.packages,
                    commit.installed_bytes / (1024 * 1024),
                    commit.world
                );
            }
            Ok(())
        }
        Some(Commands::Completions { shell }) => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "pkgcore", &mut std::io::stdout());
            Ok(())
        }
        None => {
            // No command provided, show help
            println!("pkgcore v{}", env!("CARGO_PKG_VERSION"));
            println!("Run 'pkgcore --help' for usage information");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_commit_flags_parse() {
        let cli = Cli::try_parse_from([
            "pkgcore", "commit", "--index", "i.json", "--plan", "p.json", "-s", "-vv", "--no-scripts",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Commit {
                simulate,
                verbose,
                no_scripts,
                solve,
                ..
            }) => {
                assert!(simulate);
                assert!(no_scripts);
                assert_eq!(verbose, 2);
                assert_eq!(solve.db_path, DEFAULT_DB_PATH);
            }
            _ => panic!("expected commit"),
        }
    }
}
