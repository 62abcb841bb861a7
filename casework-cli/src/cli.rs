use casework_core::{BackendType, WorkItemStatus};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Case management: teams, users, work items and issues")]
pub struct Cli {
    /// Path to the config file (defaults to $CASEWORK_CONFIG or the user config dir)
    #[clap(long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to the database file, overriding the config
    #[clap(long, global = true)]
    pub database: Option<PathBuf>,

    /// Storage backend (sqlite or memory), overriding the config
    #[clap(long, global = true)]
    pub backend: Option<BackendType>,

    /// Name recorded as responsible for changes
    #[clap(long, global = true)]
    pub auditor: Option<String>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[clap(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Manage teams
    #[clap(subcommand)]
    Team(TeamCommand),

    /// Manage users
    #[clap(subcommand)]
    User(UserCommand),

    /// Manage work items
    #[clap(subcommand)]
    WorkItem(WorkItemCommand),

    /// Manage issues
    #[clap(subcommand)]
    Issue(IssueCommand),

    /// Database and configuration maintenance
    #[clap(subcommand)]
    Db(DbCommand),
}

#[derive(Subcommand, Debug)]
pub enum TeamCommand {
    /// Create a new team
    Create {
        /// Unique team name
        name: String,
    },

    /// Show a team by UUID or name
    Show { team: String },

    /// List all teams
    List,

    /// Rename an active team
    Rename {
        /// Team UUID or name
        team: String,
        new_name: String,
    },

    /// Mark a team active
    Activate { team: String },

    /// Mark a team inactive
    Deactivate { team: String },

    /// Add a user to a team
    AddUser {
        /// Team UUID or name
        team: String,
        user_number: i64,
    },

    /// Remove a user from a team
    RemoveUser {
        /// Team UUID or name
        team: String,
        user_number: i64,
    },

    /// List the members of a team
    Members { team: String },

    /// Delete a team, detaching its members
    Remove { team: String },
}

#[derive(Subcommand, Debug)]
pub enum UserCommand {
    /// Create a new user
    Create {
        /// External user number
        #[clap(long)]
        number: i64,

        /// Username (at least 10 characters by default)
        #[clap(long)]
        username: String,

        #[clap(long)]
        first_name: String,

        #[clap(long)]
        last_name: String,
    },

    /// Show a user by user number
    Show { user_number: i64 },

    /// Change the username of an active user
    SetUsername { user_number: i64, username: String },

    /// Change the first name of an active user
    SetFirstName { user_number: i64, first_name: String },

    /// Change the last name of an active user
    SetLastName { user_number: i64, last_name: String },

    /// Reactivate a user
    Activate { user_number: i64 },

    /// Deactivate a user, resetting its work items to unstarted
    Deactivate { user_number: i64 },

    /// Search users by name fragments
    Search {
        #[clap(long)]
        first_name: Option<String>,

        #[clap(long)]
        last_name: Option<String>,

        #[clap(long)]
        username: Option<String>,
    },

    /// List the users of a team
    ByTeam {
        /// Team UUID or name
        team: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum WorkItemCommand {
    /// Create a new work item
    Create {
        /// Unique description
        description: String,
    },

    /// Show a work item
    Show { id: Uuid },

    /// Set the status (unstarted, started, done)
    Status { id: Uuid, status: WorkItemStatus },

    /// Assign the work item to a user
    Assign { id: Uuid, user_number: i64 },

    /// Attach an issue to a done work item
    AddIssue { id: Uuid, issue_id: Uuid },

    /// Detach and delete the work item's issue
    RemoveIssue { id: Uuid },

    /// List work items matching one filter
    List {
        #[clap(long, conflicts_with_all = ["team", "user", "contains", "from"])]
        status: Option<WorkItemStatus>,

        /// Team UUID or name
        #[clap(long, conflicts_with_all = ["user", "contains", "from"])]
        team: Option<String>,

        /// Owner's user number
        #[clap(long, conflicts_with_all = ["contains", "from"])]
        user: Option<i64>,

        /// Description substring
        #[clap(long, conflicts_with = "from")]
        contains: Option<String>,

        /// Created at or after (RFC 3339)
        #[clap(long, requires = "to")]
        from: Option<DateTime<Utc>>,

        /// Created at or before (RFC 3339)
        #[clap(long, requires = "from")]
        to: Option<DateTime<Utc>>,
    },

    /// Delete a work item and its issue
    Remove { id: Uuid },
}

#[derive(Subcommand, Debug)]
pub enum IssueCommand {
    /// Create a new issue
    Create { description: String },

    /// Show an issue
    Show { id: Uuid },

    /// Change the description of an active issue
    Describe { id: Uuid, description: String },

    /// Mark an issue active
    Activate { id: Uuid },

    /// Mark an issue inactive
    Deactivate { id: Uuid },

    /// Find issues by exact description
    Find { description: String },

    /// List issues one page at a time
    List {
        /// Zero-based page number
        #[clap(long, default_value_t = 0)]
        page: usize,

        #[clap(long, default_value_t = 20)]
        size: usize,
    },

    /// Delete an issue
    Remove { id: Uuid },
}

#[derive(Subcommand, Debug)]
pub enum DbCommand {
    /// Write a default config file (if missing) and create the database
    Init,

    /// Print the config and database paths in use
    Path,

    /// Print row counts
    Stats,

    /// Export every row to a JSON or YAML file
    Export { file: PathBuf },

    /// Import rows from a JSON or YAML export
    Import { file: PathBuf },

    /// Copy every row of the current store into a SQLite database
    Migrate {
        /// Destination database file
        to: PathBuf,
    },
}
