// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::io;
use std::path::PathBuf;

const DEFAULT_DB_PATH: &str = "/var/lib/pkgcore/pkgcore.db";

fn db_path_arg() -> Arg {
    Arg::new("db_path")
        .short('d')
        .long("db-path")
        .value_name("PATH")
        .default_value(DEFAULT_DB_PATH)
        .help("Database path")
}

fn solve_args(cmd: Command) -> Command {
    cmd.arg(
        Arg::new("index")
            .short('i')
            .long("index")
            .value_name("FILE")
            .required(true)
            .help("JSON repository index"),
    )
    .arg(
        Arg::new("plan")
            .short('p')
            .long("plan")
            .value_name("FILE")
            .required(true)
            .help("JSON solver plan (target world and ordered changes)"),
    )
    .arg(db_path_arg())
    .arg(
        Arg::new("no_network")
            .long("no-network")
            .action(ArgAction::SetTrue)
            .help("Treat every non-local repository as unreachable"),
    )
}

fn flag(id: &'static str, long: &'static str, help: &'static str) -> Arg {
    Arg::new(id).long(long).action(ArgAction::SetTrue).help(help)
}

fn build_cli() -> Command {
    Command::new("pkgcore")
        .version(env!("CARGO_PKG_VERSION"))
        .author("pkgcore Contributors")
        .about("Package commit engine with unsatisfiable-world diagnostics")
        .subcommand_required(false)
        .subcommand(
            Command::new("init")
                .about("Initialize the pkgcore database")
                .arg(db_path_arg()),
        )
        .subcommand(
            solve_args(Command::new("commit"))
                .about("Apply a solver plan and persist its world")
                .arg(
                    Arg::new("root")
                        .short('r')
                        .long("root")
                        .default_value("/")
                        .help("Filesystem root packages are installed into"),
                )
                .arg(flag("simulate", "simulate", "Show what would be done without doing it").short('s'))
                .arg(flag("interactive", "interactive", "List changes and ask before applying them").short('I'))
                .arg(flag("no_scripts", "no-scripts", "Do not run hooks or trigger scripts"))
                .arg(flag("no_commit_hooks", "no-commit-hooks", "Report commit hooks instead of running them"))
                .arg(flag(
                    "force_broken_world",
                    "force-broken-world",
                    "Commit even if world dependencies reference unknown repository tags",
                ))
                .arg(
                    Arg::new("verbose")
                        .short('v')
                        .long("verbose")
                        .action(ArgAction::Count)
                        .help("More output; repeat for more"),
                )
                .arg(
                    Arg::new("quiet")
                        .short('q')
                        .long("quiet")
                        .action(ArgAction::Count)
                        .help("Less output"),
                ),
        )
        .subcommand(
            solve_args(Command::new("explain"))
                .about("Explain why a plan's world cannot be satisfied"),
        )
        .subcommand(
            Command::new("world")
                .about("Show the persisted world")
                .arg(db_path_arg()),
        )
        .subcommand(
            Command::new("history")
                .about("Show commit history")
                .arg(db_path_arg()),
        )
        .subcommand(
            Command::new("completions")
                .about("Generate shell completion scripts")
                .arg(Arg::new("shell").required(true).help("Shell type")),
        )
}

fn main() -> io::Result<()> {
    println!("cargo:rerun-if-changed=build.rs");

    let out_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").map_err(io::Error::other)?);
    let man_dir = out_dir.join("man");
    fs::create_dir_all(&man_dir)?;

    let man = Man::new(build_cli());
    let mut buffer = Vec::new();
    man.render(&mut buffer)?;

    let man_path = man_dir.join("pkgcore.1");
    fs::write(&man_path, buffer)?;

    println!("cargo:warning=Man page generated at {}", man_path.display());
    Ok(())
}
