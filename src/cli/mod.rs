//! CLI argument definitions for trestle.

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

/// Trestle - work breakdown structures and task schedules for construction projects.
///
/// Start with `wbs system init`, then create a project and its WBS nodes.
#[derive(Parser, Debug)]
#[command(name = "wbs")]
#[command(author, version, about = "Work breakdown structure and task schedule tracking", long_about = None)]
pub struct Cli {
    /// Output in human-readable format instead of JSON
    #[arg(short = 'H', long = "human", global = true)]
    pub human_readable: bool,

    /// Run as if wbs was started in <path> instead of the current directory.
    /// Can also be set via TRESTLE_REPO environment variable.
    #[arg(short = 'C', long = "repo", global = true, env = "TRESTLE_REPO")]
    pub repo_path: Option<std::path::PathBuf>,

    /// Name recorded as the author of changes (defaults to $USER)
    #[arg(long, global = true, env = "TRESTLE_ACTOR")]
    pub actor: Option<String>,

    /// Maximum number of ancestors re-saved after a node changes
    #[arg(long, global = true)]
    pub max_cascade_depth: Option<usize>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Storage management
    System {
        #[command(subcommand)]
        command: SystemCommands,
    },

    /// Project management
    Project {
        #[command(subcommand)]
        command: ProjectCommands,
    },

    /// WBS node management
    Node {
        #[command(subcommand)]
        command: NodeCommands,
    },

    /// Task management
    Task {
        #[command(subcommand)]
        command: TaskCommands,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand, Debug)]
pub enum SystemCommands {
    /// Create storage for the current repository
    Init,

    /// Show build and storage information
    Info,

    /// Rebuild the SQLite cache from the JSONL logs
    Rebuild,
}

#[derive(Subcommand, Debug)]
pub enum ProjectCommands {
    /// Create a project
    Create {
        /// Project name
        name: String,

        /// Expected start date (YYYY-MM-DD)
        #[arg(long)]
        start: Option<NaiveDate>,

        /// Expected end date (YYYY-MM-DD)
        #[arg(long)]
        end: Option<NaiveDate>,
    },

    /// Show a project
    Show {
        /// Project ID (e.g., prj-a1b2)
        id: String,
    },

    /// List projects
    List,
}

/// Fields shared by `node create`, `node child`, and `node update`.
#[derive(Args, Debug, Default)]
pub struct NodeFields {
    /// Outline code (e.g., 1.2.3)
    #[arg(long)]
    pub code: Option<String>,

    /// Description
    #[arg(short, long)]
    pub description: Option<String>,

    /// Planned start date (YYYY-MM-DD)
    #[arg(long)]
    pub start: Option<NaiveDate>,

    /// Planned end date (YYYY-MM-DD)
    #[arg(long)]
    pub end: Option<NaiveDate>,

    /// Progress percentage (0-100)
    #[arg(long)]
    pub progress: Option<f64>,

    /// Weight in the parent's progress average
    #[arg(long)]
    pub weight: Option<f64>,

    /// Estimated cost (leaves without resource lines)
    #[arg(long)]
    pub estimated_cost: Option<f64>,

    /// Actual cost (leaves without resource lines)
    #[arg(long)]
    pub actual_cost: Option<f64>,

    /// Progress mode (manual, derived-from-tasks)
    #[arg(long)]
    pub progress_mode: Option<String>,

    /// Create a linked task when this leaf is saved
    #[arg(long)]
    pub create_tasks: Option<bool>,

    /// Predecessor note for the gantt export (e.g. "1.2, 1.3")
    #[arg(long)]
    pub dependencies: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum NodeCommands {
    /// Create a WBS node
    Create {
        /// Node name
        name: String,

        /// Project the node belongs to
        #[arg(short, long)]
        project: Option<String>,

        /// Parent node ID
        #[arg(long)]
        parent: Option<String>,

        /// Depth in the tree (defaults to parent level + 1, or 1)
        #[arg(long)]
        level: Option<u32>,

        /// Make this a group node that rolls up its children
        #[arg(long)]
        group: bool,

        #[command(flatten)]
        fields: NodeFields,
    },

    /// Create a child under an existing node, inheriting project and numbering
    Child {
        /// Parent node ID
        parent: String,

        /// Node name
        name: String,

        /// Make this a group node
        #[arg(long)]
        group: bool,

        #[command(flatten)]
        fields: NodeFields,
    },

    /// Update a WBS node
    Update {
        /// Node ID
        id: String,

        /// New name
        #[arg(long)]
        name: Option<String>,

        /// New parent node ID
        #[arg(long)]
        parent: Option<String>,

        /// Detach from the current parent
        #[arg(long, conflicts_with = "parent")]
        no_parent: bool,

        /// New level
        #[arg(long)]
        level: Option<u32>,

        /// Set whether this is a group node
        #[arg(long)]
        group: Option<bool>,

        #[command(flatten)]
        fields: NodeFields,
    },

    /// Show a WBS node with its children and linked tasks
    Show {
        /// Node ID (e.g., wbs-a1b2)
        id: String,
    },

    /// List WBS nodes
    List {
        /// Filter by project
        #[arg(short, long)]
        project: Option<String>,

        /// Filter by parent node
        #[arg(long)]
        parent: Option<String>,
    },

    /// Export the subtree under a node
    Tree {
        /// Root node ID
        id: String,
    },

    /// Delete a WBS node (children are left in place)
    Delete {
        /// Node ID
        id: String,
    },

    /// Add a resource line to a leaf node
    Resource {
        /// Node ID
        id: String,

        /// Resource description
        description: String,

        /// Estimated cost
        #[arg(long, default_value_t = 0.0)]
        estimated: f64,

        /// Actual cost
        #[arg(long, default_value_t = 0.0)]
        actual: f64,
    },
}

/// Fields shared by `task create` and `task update`.
#[derive(Args, Debug, Default)]
pub struct TaskFields {
    /// Description
    #[arg(short, long)]
    pub description: Option<String>,

    /// Planned start date (YYYY-MM-DD)
    #[arg(long)]
    pub start: Option<NaiveDate>,

    /// Planned end date (YYYY-MM-DD)
    #[arg(long)]
    pub end: Option<NaiveDate>,

    /// Actual start date (YYYY-MM-DD)
    #[arg(long)]
    pub actual_start: Option<NaiveDate>,

    /// Actual end date (YYYY-MM-DD)
    #[arg(long)]
    pub actual_end: Option<NaiveDate>,

    /// Status (not_started, in_progress, completed)
    #[arg(long)]
    pub status: Option<String>,

    /// Progress percentage (0-100)
    #[arg(long)]
    pub progress: Option<f64>,

    /// Labor cost
    #[arg(long)]
    pub labor: Option<f64>,

    /// Material cost
    #[arg(long)]
    pub material: Option<f64>,

    /// Equipment cost
    #[arg(long)]
    pub equipment: Option<f64>,

    /// Subcontract cost
    #[arg(long)]
    pub subcontract: Option<f64>,
}

#[derive(Subcommand, Debug)]
pub enum TaskCommands {
    /// Create a task
    Create {
        /// Task subject
        subject: String,

        /// Project the task belongs to
        #[arg(short, long)]
        project: String,

        /// Linked WBS node
        #[arg(long)]
        wbs: Option<String>,

        /// Tasks this one depends on
        #[arg(long = "depends-on")]
        depends_on: Vec<String>,

        #[command(flatten)]
        fields: TaskFields,
    },

    /// Create a task mapped from a WBS node
    FromWbs {
        /// WBS node ID
        wbs_id: String,
    },

    /// Update a task
    Update {
        /// Task ID
        id: String,

        /// New subject
        #[arg(long)]
        subject: Option<String>,

        #[command(flatten)]
        fields: TaskFields,
    },

    /// Add a dependency (task waits for depends_on)
    Depend {
        /// Dependent task ID
        id: String,

        /// Task it depends on
        depends_on: String,
    },

    /// Remove a dependency
    Undepend {
        /// Dependent task ID
        id: String,

        /// Task it no longer depends on
        depends_on: String,
    },

    /// Show a task
    Show {
        /// Task ID (e.g., tsk-a1b2)
        id: String,
    },

    /// List tasks
    List {
        /// Filter by project
        #[arg(short, long)]
        project: Option<String>,

        /// Filter by linked WBS node
        #[arg(long)]
        wbs: Option<String>,

        /// Only tasks depending on this task
        #[arg(long = "depends-on")]
        depends_on: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Get a configuration value with its source
    Get {
        /// Configuration key
        key: String,
    },

    /// Set a configuration value
    Set {
        /// Configuration key
        key: String,

        /// Configuration value
        value: String,

        /// Write to the system config instead of the repository's
        #[arg(long)]
        system: bool,
    },

    /// List resolved configuration values
    List,
}

/// Command name and arguments recorded in the action log.
pub fn describe(command: &Commands) -> (String, serde_json::Value) {
    use serde_json::json;

    match command {
        Commands::System { command } => match command {
            SystemCommands::Init => ("system init".to_string(), json!({})),
            SystemCommands::Info => ("system info".to_string(), json!({})),
            SystemCommands::Rebuild => ("system rebuild".to_string(), json!({})),
        },
        Commands::Project { command } => match command {
            ProjectCommands::Create { name, start, end } => (
                "project create".to_string(),
                json!({ "name": name, "start": start, "end": end }),
            ),
            ProjectCommands::Show { id } => ("project show".to_string(), json!({ "id": id })),
            ProjectCommands::List => ("project list".to_string(), json!({})),
        },
        Commands::Node { command } => match command {
            NodeCommands::Create {
                name,
                project,
                parent,
                group,
                ..
            } => (
                "node create".to_string(),
                json!({ "name": name, "project": project, "parent": parent, "group": group }),
            ),
            NodeCommands::Child { parent, name, .. } => (
                "node child".to_string(),
                json!({ "parent": parent, "name": name }),
            ),
            NodeCommands::Update { id, .. } => ("node update".to_string(), json!({ "id": id })),
            NodeCommands::Show { id } => ("node show".to_string(), json!({ "id": id })),
            NodeCommands::List { project, parent } => (
                "node list".to_string(),
                json!({ "project": project, "parent": parent }),
            ),
            NodeCommands::Tree { id } => ("node tree".to_string(), json!({ "id": id })),
            NodeCommands::Delete { id } => ("node delete".to_string(), json!({ "id": id })),
            NodeCommands::Resource {
                id,
                description,
                estimated,
                actual,
            } => (
                "node resource".to_string(),
                json!({ "id": id, "description": description, "estimated": estimated, "actual": actual }),
            ),
        },
        Commands::Task { command } => match command {
            TaskCommands::Create {
                subject,
                project,
                wbs,
                depends_on,
                ..
            } => (
                "task create".to_string(),
                json!({ "subject": subject, "project": project, "wbs": wbs, "depends_on": depends_on }),
            ),
            TaskCommands::FromWbs { wbs_id } => {
                ("task from-wbs".to_string(), json!({ "wbs_id": wbs_id }))
            }
            TaskCommands::Update { id, fields, .. } => (
                "task update".to_string(),
                json!({ "id": id, "status": fields.status }),
            ),
            TaskCommands::Depend { id, depends_on } => (
                "task depend".to_string(),
                json!({ "id": id, "depends_on": depends_on }),
            ),
            TaskCommands::Undepend { id, depends_on } => (
                "task undepend".to_string(),
                json!({ "id": id, "depends_on": depends_on }),
            ),
            TaskCommands::Show { id } => ("task show".to_string(), json!({ "id": id })),
            TaskCommands::List {
                project,
                wbs,
                depends_on,
            } => (
                "task list".to_string(),
                json!({ "project": project, "wbs": wbs, "depends_on": depends_on }),
            ),
        },
        Commands::Config { command } => match command {
            ConfigCommands::Get { key } => ("config get".to_string(), json!({ "key": key })),
            ConfigCommands::Set { key, value, system } => (
                "config set".to_string(),
                json!({ "key": key, "value": value, "system": system }),
            ),
            ConfigCommands::List => ("config list".to_string(), json!({})),
        },
    }
}
