// src/main.rs

use anyhow::Result;
use arkiv::config::{RunOptions, Settings, StopPhase};
use arkiv::datapackage::Package;
use arkiv::db::models::{Subsystem, TableEntry};
use arkiv::dialect::DbKind;
use arkiv::project::Project;
use arkiv::source::{self, DbUrl};
use arkiv::{copyplan, datapackage, db, ddl, executor, export, reflect, resolver};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{Shell, generate};
use std::io;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser)]
#[command(name = "arkiv")]
#[command(author, version, about = "Database preservation engine: copy and archive relational data", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Copy a source database into a target database or project
    Copy {
        /// Source connection URL or alias
        #[arg(short, long)]
        source: String,
        /// Target connection URL, alias or project name
        #[arg(short, long)]
        target: String,
        /// Pause after a phase for manual editing (tables, json, ddl, copy)
        #[arg(long, value_enum)]
        stop: Option<StopPhase>,
        /// Delete copied data after verification (pipeline test run)
        #[arg(long)]
        test: bool,
        /// Print generated SQL
        #[arg(long)]
        debug: bool,
        /// Suppress blob copy (blob columns become NULL in the target)
        #[arg(long)]
        no_blobs: bool,
        /// Source schema override
        #[arg(long)]
        schema: Option<String>,
        /// Project root directory (default: current directory)
        #[arg(short, long, default_value = ".")]
        project_dir: String,
        /// Driver/alias configuration file (YAML)
        #[arg(short, long)]
        config: Option<String>,
    },
    /// Archive a copied project as validated TSV files
    Archive {
        /// Project name or path
        #[arg(short, long)]
        source: String,
        /// Output project name or path (defaults to source)
        #[arg(short, long)]
        target: Option<String>,
        /// Project root directory (default: current directory)
        #[arg(short, long, default_value = ".")]
        project_dir: String,
    },
    /// Generate shell completion scripts
    Completions {
        /// Shell type (bash, zsh, fish, powershell)
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Subsystem name derived from a target connection URL.
fn subsystem_name(url: &DbUrl) -> String {
    if let Some(path) = url.sqlite_path() {
        if let Some(stem) = Path::new(path).file_stem() {
            return stem.to_string_lossy().to_lowercase();
        }
    }
    if !url.user.is_empty() {
        return url.user.to_lowercase();
    }
    if !url.schema.is_empty() {
        return url.schema.to_lowercase();
    }
    "system".to_string()
}

/// A project name may only contain identifier-safe characters.
fn valid_project_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn load_settings(config: Option<&str>) -> arkiv::Result<Settings> {
    match config {
        Some(path) => Settings::load(Path::new(path)),
        None => Ok(Settings::default()),
    }
}

#[allow(clippy::too_many_arguments)]
fn run_copy(
    source_spec: &str,
    target_spec: &str,
    stop: Option<StopPhase>,
    test: bool,
    debug: bool,
    no_blobs: bool,
    schema: Option<String>,
    project_dir: &str,
    config: Option<&str>,
) -> arkiv::Result<()> {
    let settings = load_settings(config)?;
    let mut opts = RunOptions::new();
    opts.stop = stop;
    opts.test = test;
    opts.debug = debug;
    opts.no_blobs = no_blobs;
    opts.schema = schema;

    let source_url = DbUrl::parse(source_spec, &settings)?;

    // The target is either a connection URL/alias or a project name; a
    // project gets a managed SQLite database under its content directory
    let expanded_target = settings.expand_alias(target_spec).to_string();
    let (target_url, name) = if expanded_target.contains(':') {
        let url = DbUrl::parse(&expanded_target, &settings)?;
        let name = subsystem_name(&url);
        (url, name)
    } else {
        if !valid_project_name(&expanded_target) {
            return Err(arkiv::Error::Configuration(format!(
                "'{expanded_target}' is not a valid target"
            )));
        }
        let project = Project::new(project_dir, &expanded_target);
        project.ensure_dirs()?;
        let db_path = project.content_dir().join(format!("{expanded_target}.db"));
        let url = DbUrl::parse(&format!("jdbc:sqlite:{}", db_path.display()), &settings)?;
        (url, expanded_target)
    };

    if source_url.url == target_url.url {
        return Err(arkiv::Error::Configuration(
            "Source and target cannot be the same".to_string(),
        ));
    }

    let project = Project::new(project_dir, &name);
    project.ensure_dirs()?;
    let store = db::open(&project.config_db_path())?;

    let invocation: Vec<String> = std::env::args().skip(1).collect();
    Subsystem {
        name: name.clone(),
        source_schema: Some(opts.schema.clone().unwrap_or_else(|| source_url.schema.clone())),
        target_schema: Some(target_url.schema.clone()),
        source_type: source_url.kind.as_str().to_string(),
        target_type: target_url.kind.as_str().to_string(),
        invocation: Some(invocation.join(" ")),
    }
    .upsert(&store)?;

    let source = source::connect(&source_url, &settings)?;
    let target = source::connect(&target_url, &settings)?;

    // PHASE 1: source metadata and the editable table list
    let (_tables, changed) = reflect::ensure_include_tables(
        source.as_ref(),
        Some(target.as_ref()),
        &store,
        &project.tables_file(),
        &opts,
    )?;
    if opts.stop == Some(StopPhase::Tables) {
        println!(
            "Stopped after table listing. Edit '{}' and re-run.",
            project.tables_file().display()
        );
        return Ok(());
    }

    // PHASE 2: dependency order and the datapackage descriptor
    if changed {
        resolver::resolve(&store, &project.deps_file())?;
    }
    datapackage::create_schema(
        &store,
        &project.datapackage_path(),
        &name,
        source_url.kind,
        &[],
        changed,
    )?;
    if opts.stop == Some(StopPhase::Json) {
        println!(
            "Stopped after schema generation. Edit '{}' and re-run.",
            project.datapackage_path().display()
        );
        return Ok(());
    }

    // PHASE 3: target schema
    let diff_tables = TableEntry::tables_diff(&store)?;
    let mut ddl_failures = Vec::new();
    if !diff_tables.is_empty() || opts.stop == Some(StopPhase::Ddl) || changed {
        let target_dialect = target_url.kind.as_str();
        let ddl_file = ddl::create_ddl(
            &project.datapackage_path(),
            &project.ddl_path(target_dialect),
            &project.fk_ddl_path(target_dialect),
            target_url.kind,
            changed,
        )?;
        if opts.stop == Some(StopPhase::Ddl) {
            println!(
                "Stopped after DDL generation. Edit '{}' and re-run.",
                ddl_file.display()
            );
            return Ok(());
        }
        ddl_failures = executor::apply_ddl(target.as_ref(), &store, &ddl_file, &opts)?;
    } else {
        println!("Target schema already created.");
    }

    // PHASE 4: data copy
    let diff_data = TableEntry::data_diff(&store)?;
    let copy_result = if !diff_data.is_empty() || opts.stop == Some(StopPhase::Copy) || opts.test {
        copyplan::create_plan(
            &project.datapackage_path(),
            &project.copy_file(),
            &source_url,
            &target_url,
            &settings,
            &opts,
            !diff_data.is_empty(),
        )?;
        if opts.stop == Some(StopPhase::Copy) {
            println!(
                "Stopped after copy planning. Edit '{}' and re-run.",
                project.copy_file().display()
            );
            return Ok(());
        }
        executor::run_plan(source.as_ref(), target.as_ref(), &store, &project.copy_file(), &opts)
    } else {
        println!("All data copied previously.");
        Ok(())
    };

    match copy_result {
        Ok(()) => {
            if !ddl_failures.is_empty() {
                return Err(arkiv::Error::Ddl {
                    tables: ddl_failures,
                });
            }
        }
        Err(arkiv::Error::Copy { mut tables }) => {
            for failed in ddl_failures {
                if !tables.contains(&failed) {
                    tables.push(failed);
                }
            }
            return Err(arkiv::Error::Copy { tables });
        }
        Err(other) => return Err(other),
    }

    // PHASE 5: verification
    if !diff_data.is_empty() && !opts.test {
        reflect::reflect_target(target.as_ref(), &store)?;
        let remaining = TableEntry::data_diff(&store)?;
        if !remaining.is_empty() {
            let mut tables: Vec<String> = remaining.into_keys().collect();
            tables.sort();
            return Err(arkiv::Error::Copy { tables });
        }
    }

    // The run completed; scratch intermediates are no longer needed
    project.clean_scratch()?;

    if opts.test {
        println!("Test run completed!");
    } else {
        println!("All data copied successfully!");
    }
    Ok(())
}

/// Subsystem directories under a project's content root that carry both
/// a datapackage descriptor and a managed database.
fn archive_sources(content_root: &Path) -> arkiv::Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in std::fs::read_dir(content_root)? {
        let entry = entry?;
        if !entry.path().is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if name == "documents" {
            continue;
        }
        let descriptor = entry.path().join("datapackage.json");
        let database = entry.path().join(format!("{name}.db"));
        if !descriptor.is_file() || !database.is_file() {
            return Err(arkiv::Error::Configuration(format!(
                "'{}' is not a valid source",
                entry.path().display()
            )));
        }
        names.push(name);
    }
    names.sort();
    Ok(names)
}

fn resolve_project_root(spec: &str, project_dir: &str) -> PathBuf {
    let direct = PathBuf::from(spec);
    if direct.is_dir() {
        direct
    } else {
        Path::new(project_dir).join(spec)
    }
}

fn run_archive(source_spec: &str, target_spec: Option<&str>, project_dir: &str) -> arkiv::Result<()> {
    let source_root = resolve_project_root(source_spec, project_dir);
    if !source_root.join("content").is_dir() {
        return Err(arkiv::Error::Configuration(format!(
            "'{}' is not a valid source",
            source_root.display()
        )));
    }
    let target_root = match target_spec {
        Some(spec) => resolve_project_root(spec, project_dir),
        None => source_root.clone(),
    };

    let opts = RunOptions::new();
    let names = archive_sources(&source_root.join("content"))?;
    if names.is_empty() {
        return Err(arkiv::Error::Configuration(format!(
            "'{}' holds no archivable subsystems",
            source_root.display()
        )));
    }

    for name in names {
        let project = Project::with_tmp_root(&source_root, &target_root, &name);
        std::fs::create_dir_all(project.tmp_dir())?;
        let store = db::open(&project.config_db_path())?;

        let package = Package::from_path(&project.datapackage_path())?;
        export::seed_store_from_package(&store, &package)?;

        println!("Exporting '{name}' to tsv files:");
        let db_path = project.content_dir().join(format!("{name}.db"));
        let url = DbUrl::parse(
            &format!("jdbc:sqlite:{}", db_path.display()),
            &Settings::default(),
        )?;
        let conn = source::connect(&url, &Settings::default())?;
        export::archive_tables(
            conn.as_ref(),
            &store,
            &package,
            &project,
            DbKind::Sqlite,
            &opts,
        )?;

        project.clean_scratch()?;
        println!("Datapackage validated!");
    }

    Ok(())
}

fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Copy {
            source,
            target,
            stop,
            test,
            debug,
            no_blobs,
            schema,
            project_dir,
            config,
        } => {
            info!("Copy run: {source} -> {target}");
            run_copy(
                &source,
                &target,
                stop,
                test,
                debug,
                no_blobs,
                schema,
                &project_dir,
                config.as_deref(),
            )?;
        }
        Commands::Archive {
            source,
            target,
            project_dir,
        } => {
            info!("Archive run: {source}");
            run_archive(&source, target.as_deref(), &project_dir)?;
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "arkiv", &mut io::stdout());
        }
    }
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let Some(command) = cli.command else {
        Cli::command().print_help().ok();
        return;
    };

    if let Err(err) = run(command) {
        eprintln!("ERROR: {err}");
        let code = err
            .downcast_ref::<arkiv::Error>()
            .map(arkiv::Error::exit_code)
            .unwrap_or(1);
        std::process::exit(code);
    }
}
