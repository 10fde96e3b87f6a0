// build.rs

use clap::{Arg, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

fn build_cli() -> Command {
    Command::new("arkiv")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Arkiv Contributors")
        .about("Database preservation engine: copy and archive relational data")
        .subcommand_required(false)
        .subcommand(
            Command::new("copy")
                .about("Copy a source database into a target database or project")
                .arg(
                    Arg::new("source")
                        .short('s')
                        .long("source")
                        .required(true)
                        .help("Source connection URL or alias"),
                )
                .arg(
                    Arg::new("target")
                        .short('t')
                        .long("target")
                        .required(true)
                        .help("Target connection URL, alias or project name"),
                )
                .arg(
                    Arg::new("stop")
                        .long("stop")
                        .value_parser(["tables", "json", "ddl", "copy"])
                        .help("Pause after a phase for manual editing"),
                )
                .arg(
                    Arg::new("test")
                        .long("test")
                        .action(clap::ArgAction::SetTrue)
                        .help("Delete copied data after verification"),
                )
                .arg(
                    Arg::new("debug")
                        .long("debug")
                        .action(clap::ArgAction::SetTrue)
                        .help("Print generated SQL"),
                )
                .arg(
                    Arg::new("no_blobs")
                        .long("no-blobs")
                        .action(clap::ArgAction::SetTrue)
                        .help("Suppress blob copy"),
                )
                .arg(
                    Arg::new("schema")
                        .long("schema")
                        .help("Source schema override"),
                )
                .arg(
                    Arg::new("project_dir")
                        .short('p')
                        .long("project-dir")
                        .default_value(".")
                        .help("Project root directory"),
                )
                .arg(
                    Arg::new("config")
                        .short('c')
                        .long("config")
                        .help("Driver/alias configuration file (YAML)"),
                ),
        )
        .subcommand(
            Command::new("archive")
                .about("Archive a copied project as validated TSV files")
                .arg(
                    Arg::new("source")
                        .short('s')
                        .long("source")
                        .required(true)
                        .help("Project name or path"),
                )
                .arg(
                    Arg::new("target")
                        .short('t')
                        .long("target")
                        .help("Output project name or path (defaults to source)"),
                )
                .arg(
                    Arg::new("project_dir")
                        .short('p')
                        .long("project-dir")
                        .default_value(".")
                        .help("Project root directory"),
                ),
        )
        .subcommand(
            Command::new("completions")
                .about("Generate shell completion scripts")
                .arg(
                    Arg::new("shell")
                        .required(true)
                        .value_parser(["bash", "zsh", "fish", "powershell"])
                        .help("Shell type"),
                ),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // Create man directory
    let out_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
    let man_dir = out_dir.join("man");
    fs::create_dir_all(&man_dir).expect("Failed to create man directory");

    // Generate main man page
    let cmd = build_cli();
    let man = Man::new(cmd);
    let mut buffer = Vec::new();
    man.render(&mut buffer).expect("Failed to render man page");

    let man_path = man_dir.join("arkiv.1");
    fs::write(&man_path, buffer).expect("Failed to write man page");
}
