//! Trestle CLI - work breakdown structures and task schedules.

use chrono::Utc;
use clap::Parser;
use std::env;
use std::path::{Path, PathBuf};
use std::process;
use std::time::Instant;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use trestle::action_log::{self, ActionLog};
use trestle::cli::{
    Cli, Commands, ConfigCommands, NodeCommands, ProjectCommands, SystemCommands, TaskCommands,
    describe,
};
use trestle::commands::{self, Output, Session};
use trestle::config::{ConfigOverrides, OutputFormat, resolve_config};
use trestle::storage::{Storage, find_git_root, get_storage_dir};

fn env_bool(name: &str, default: bool) -> bool {
    env::var(name)
        .ok()
        .and_then(|v| match v.as_str() {
            "1" | "true" | "TRUE" | "yes" | "YES" => Some(true),
            "0" | "false" | "FALSE" | "no" | "NO" => Some(false),
            _ => None,
        })
        .unwrap_or(default)
}

/// Log to stderr, filtered by `TRESTLE_LOG` (default `warn`).
fn init_tracing() {
    let filter = EnvFilter::try_from_env("TRESTLE_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    if env_bool("TRESTLE_LOG_JSON", false) {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn main() {
    init_tracing();

    let cli = Cli::parse();

    // Determine repo path: --repo flag > TRESTLE_REPO env > auto-detect git root > cwd
    let repo_path = resolve_repo_path(cli.repo_path, cli.human_readable);
    let actor = cli.actor.unwrap_or_else(action_log::get_current_user);

    let mut overrides = ConfigOverrides::new();
    if cli.human_readable {
        overrides = overrides.with_output_format(OutputFormat::Human);
    }
    if let Some(depth) = cli.max_cascade_depth {
        overrides = overrides.with_max_cascade_depth(depth);
    }

    // -H wins; otherwise the configured output-format decides
    let human = match resolve_config(storage_root(&repo_path).as_deref(), &overrides) {
        Ok(config) => config.output_format() == OutputFormat::Human,
        Err(_) => cli.human_readable,
    };

    let (cmd_name, args_json) = describe(&cli.command);
    let start = Instant::now();

    let result = run_command(cli.command, &repo_path, &overrides, &actor, human);

    let duration_ms = start.elapsed().as_millis() as u64;
    let (success, error) = match &result {
        Ok(_) => (true, None),
        Err(e) => (false, Some(e.to_string())),
    };
    record_action(
        &repo_path,
        &overrides,
        ActionLog {
            timestamp: Utc::now(),
            repo_path: repo_path.display().to_string(),
            command: cmd_name,
            args: args_json,
            success,
            error,
            duration_ms,
            actor,
        },
    );

    if let Err(e) = result {
        if human {
            eprintln!("Error: {}", e);
        } else {
            eprintln!("{}", serde_json::json!({ "error": e.to_string() }));
        }
        process::exit(1);
    }
}

/// Storage directory of an initialized repository.
fn storage_root(repo_path: &Path) -> Option<PathBuf> {
    match Storage::exists(repo_path) {
        Ok(true) => get_storage_dir(repo_path).ok(),
        _ => None,
    }
}

/// Append to the action log when storage exists and logging is enabled.
fn record_action(repo_path: &Path, overrides: &ConfigOverrides, entry: ActionLog) {
    let Some(root) = storage_root(repo_path) else {
        return;
    };
    match resolve_config(Some(&root), overrides) {
        Ok(config) if !config.action_log() => {}
        _ => action_log::log_action(&root, entry),
    }
}

/// Resolve the repository path based on explicit flag, environment variable, or auto-detection.
///
/// When an explicit path is given (via -C/--repo or TRESTLE_REPO) it is used
/// literally. Otherwise the git root of the current directory is used so that
/// every subdirectory shares one store.
fn resolve_repo_path(explicit_path: Option<PathBuf>, human: bool) -> PathBuf {
    match explicit_path {
        Some(path) => {
            if !path.exists() {
                let message = format!("Specified repo path does not exist: {}", path.display());
                if human {
                    eprintln!("Error: {}", message);
                } else {
                    eprintln!("{}", serde_json::json!({ "error": message }));
                }
                process::exit(1);
            }
            path
        }
        None => {
            let cwd = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
            find_git_root(&cwd).unwrap_or(cwd)
        }
    }
}

fn run_command(
    command: Commands,
    repo_path: &Path,
    overrides: &ConfigOverrides,
    actor: &str,
    human: bool,
) -> Result<(), trestle::Error> {
    match command {
        Commands::System { command } => match command {
            SystemCommands::Init => output(&commands::system_init(repo_path)?, human),
            SystemCommands::Info => output(&commands::system_info(repo_path)?, human),
            SystemCommands::Rebuild => {
                let mut session = Session::open(repo_path, overrides, actor)?;
                output(&commands::system_rebuild(&mut session)?, human)
            }
        },

        Commands::Config { command } => match command {
            ConfigCommands::Get { key } => {
                output(&commands::config_get(repo_path, overrides, &key)?, human)
            }
            ConfigCommands::Set { key, value, system } => {
                output(&commands::config_set(repo_path, &key, &value, system)?, human)
            }
            ConfigCommands::List => output(&commands::config_list(repo_path, overrides)?, human),
        },

        Commands::Project { command } => {
            let mut session = Session::open(repo_path, overrides, actor)?;
            match command {
                ProjectCommands::Create { name, start, end } => output(
                    &commands::project_create(&mut session, &name, start, end)?,
                    human,
                ),
                ProjectCommands::Show { id } => {
                    output(&commands::project_show(&session, &id)?, human)
                }
                ProjectCommands::List => output(&commands::project_list(&session)?, human),
            }
        }

        Commands::Node { command } => {
            let mut session = Session::open(repo_path, overrides, actor)?;
            match command {
                NodeCommands::Create {
                    name,
                    project,
                    parent,
                    level,
                    group,
                    fields,
                } => output(
                    &commands::node_create(&mut session, &name, project, parent, level, group, fields)?,
                    human,
                ),
                NodeCommands::Child {
                    parent,
                    name,
                    group,
                    fields,
                } => output(
                    &commands::node_child(&mut session, &parent, &name, group, fields)?,
                    human,
                ),
                NodeCommands::Update {
                    id,
                    name,
                    parent,
                    no_parent,
                    level,
                    group,
                    fields,
                } => output(
                    &commands::node_update(
                        &mut session,
                        &id,
                        name,
                        parent,
                        no_parent,
                        level,
                        group,
                        fields,
                    )?,
                    human,
                ),
                NodeCommands::Show { id } => output(&commands::node_show(&session, &id)?, human),
                NodeCommands::List { project, parent } => {
                    output(&commands::node_list(&session, project, parent)?, human)
                }
                NodeCommands::Tree { id } => output(&commands::node_tree(&session, &id)?, human),
                NodeCommands::Delete { id } => {
                    output(&commands::node_delete(&mut session, &id)?, human)
                }
                NodeCommands::Resource {
                    id,
                    description,
                    estimated,
                    actual,
                } => output(
                    &commands::node_resource(&mut session, &id, &description, estimated, actual)?,
                    human,
                ),
            }
        }

        Commands::Task { command } => {
            let mut session = Session::open(repo_path, overrides, actor)?;
            match command {
                TaskCommands::Create {
                    subject,
                    project,
                    wbs,
                    depends_on,
                    fields,
                } => output(
                    &commands::task_create(&mut session, &subject, &project, wbs, depends_on, fields)?,
                    human,
                ),
                TaskCommands::FromWbs { wbs_id } => {
                    output(&commands::task_from_wbs(&mut session, &wbs_id)?, human)
                }
                TaskCommands::Update {
                    id,
                    subject,
                    fields,
                } => output(
                    &commands::task_update(&mut session, &id, subject, fields)?,
                    human,
                ),
                TaskCommands::Depend { id, depends_on } => output(
                    &commands::task_depend(&mut session, &id, &depends_on)?,
                    human,
                ),
                TaskCommands::Undepend { id, depends_on } => output(
                    &commands::task_undepend(&mut session, &id, &depends_on)?,
                    human,
                ),
                TaskCommands::Show { id } => output(&commands::task_show(&session, &id)?, human),
                TaskCommands::List {
                    project,
                    wbs,
                    depends_on,
                } => output(
                    &commands::task_list(&session, project, wbs, depends_on)?,
                    human,
                ),
            }
        }
    }
    Ok(())
}

fn output<T: Output>(result: &T, human: bool) {
    if human {
        println!("{}", result.to_human());
    } else {
        println!("{}", result.to_json());
    }
}
