mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use colored::{ColoredString, Colorize};
use std::path::Path;
use uuid::Uuid;

use casework_core::db::{
    export_snapshot, export_to_file, import_from_file, import_snapshot, migrate,
};
use casework_core::{
    get_config_path, AuditContext, BackendType, CaseStore, CaseworkConfig, EntityMeta, Issue,
    MemoryBackend, Services, SqliteBackend, Team, User, UserSearch, WorkItem, WorkItemStatus,
};

use crate::cli::{Cli, Command, DbCommand, IssueCommand, TeamCommand, UserCommand, WorkItemCommand};

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => get_config_path()?,
    };

    if let Command::Db(DbCommand::Init) = &cli.command {
        CaseworkConfig::create_default(&config_path)?;
        println!("{} {:?}", "Config:".bold(), config_path);
    }

    let mut config = CaseworkConfig::load_or_default(&config_path)?;
    if let Some(database) = &cli.database {
        config.database.path = database.clone();
    }
    if let Some(backend) = cli.backend {
        config.database.backend_type = backend;
    }

    let audit = resolve_auditor(cli.auditor.as_deref(), &config);
    log::debug!("Acting as {} on {} backend", audit, config.database.backend_type);

    match config.database.backend_type {
        BackendType::Sqlite => {
            let store = SqliteBackend::open(&config.database).with_context(|| {
                format!("Failed to open database {:?}", config.database.path)
            })?;
            run(&cli, &config, &config_path, &audit, store)
        }
        BackendType::Memory => run(&cli, &config, &config_path, &audit, MemoryBackend::new()),
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

/// `--auditor`, then the configured default, then the login name
fn resolve_auditor(flag: Option<&str>, config: &CaseworkConfig) -> AuditContext {
    flag.map(str::to_string)
        .or_else(|| config.default_auditor.clone())
        .or_else(|| std::env::var("USER").ok())
        .or_else(|| std::env::var("USERNAME").ok())
        .map(AuditContext::new)
        .unwrap_or_else(AuditContext::system)
}

fn run<S: CaseStore>(
    cli: &Cli,
    config: &CaseworkConfig,
    config_path: &Path,
    audit: &AuditContext,
    store: S,
) -> Result<()> {
    let services = Services::new(store, config.limits);

    match &cli.command {
        Command::Team(cmd) => handle_team_command(cmd, &services, audit),
        Command::User(cmd) => handle_user_command(cmd, &services, audit),
        Command::WorkItem(cmd) => handle_work_item_command(cmd, &services, audit),
        Command::Issue(cmd) => handle_issue_command(cmd, &services, audit),
        Command::Db(cmd) => handle_db_command(cmd, &services, config, config_path),
    }
}

/// Accepts either a team UUID or a team name
fn resolve_team<S: CaseStore>(services: &Services<S>, team: &str) -> Result<Team> {
    let found = match Uuid::parse_str(team) {
        Ok(id) => services.teams.get_by_id(&id)?,
        Err(_) => services.teams.get_by_name(team)?,
    };
    Ok(found)
}

fn handle_team_command<S: CaseStore>(
    cmd: &TeamCommand,
    services: &Services<S>,
    audit: &AuditContext,
) -> Result<()> {
    match cmd {
        TeamCommand::Create { name } => {
            let team = services.teams.create(audit, name)?;
            println!("{} {}", "Created team".green(), team.id());
        }
        TeamCommand::Show { team } => {
            let team = resolve_team(services, team)?;
            print_team(&team);
        }
        TeamCommand::List => {
            let teams = services.teams.get_all()?;
            println!("{:<36} | {:<30} | {:<8}", "UUID", "Name", "Active");
            println!("{}", "-".repeat(80));
            for team in &teams {
                println!(
                    "{:<36} | {:<30} | {}",
                    team.id(),
                    truncate(&team.name, 30),
                    active_label(team.active)
                );
            }
        }
        TeamCommand::Rename { team, new_name } => {
            let team = resolve_team(services, team)?;
            let team = services.teams.update_name(audit, &team.id(), new_name)?;
            println!("{} {}", "Renamed team to".green(), team.name);
        }
        TeamCommand::Activate { team } => {
            let team = resolve_team(services, team)?;
            services.teams.set_active(audit, true, &team.id())?;
            println!("{} {}", "Activated team".green(), team.name);
        }
        TeamCommand::Deactivate { team } => {
            let team = resolve_team(services, team)?;
            services.teams.set_active(audit, false, &team.id())?;
            println!("{} {}", "Deactivated team".yellow(), team.name);
        }
        TeamCommand::AddUser { team, user_number } => {
            let team = resolve_team(services, team)?;
            let user = services.users.get_by_user_number(*user_number)?;
            services
                .teams
                .add_user_to_team(audit, &team.id(), &user.id())?;
            println!(
                "{} {} to {}",
                "Added".green(),
                user.username,
                team.name
            );
        }
        TeamCommand::RemoveUser { team, user_number } => {
            let team = resolve_team(services, team)?;
            let user = services.users.get_by_user_number(*user_number)?;
            services
                .teams
                .remove_user_from_team(audit, &team.id(), &user.id())?;
            println!(
                "{} {} from {}",
                "Removed".yellow(),
                user.username,
                team.name
            );
        }
        TeamCommand::Members { team } => {
            let team = resolve_team(services, team)?;
            let members = services.teams.get_members(&team.id())?;
            print_users(&members);
        }
        TeamCommand::Remove { team } => {
            let team = resolve_team(services, team)?;
            services.teams.remove_by_id(audit, &team.id())?;
            println!("{} {}", "Removed team".yellow(), team.name);
        }
    }
    Ok(())
}

fn handle_user_command<S: CaseStore>(
    cmd: &UserCommand,
    services: &Services<S>,
    audit: &AuditContext,
) -> Result<()> {
    match cmd {
        UserCommand::Create {
            number,
            username,
            first_name,
            last_name,
        } => {
            let user = services
                .users
                .create(audit, *number, username, first_name, last_name)?;
            println!("{} {} ({})", "Created user".green(), user.username, user.id());
        }
        UserCommand::Show { user_number } => {
            let user = services.users.get_by_user_number(*user_number)?;
            print_user(&user);
        }
        UserCommand::SetUsername {
            user_number,
            username,
        } => {
            let user = services
                .users
                .update_username(audit, *user_number, username)?;
            println!("{} {}", "Updated user".green(), user);
        }
        UserCommand::SetFirstName {
            user_number,
            first_name,
        } => {
            let user = services
                .users
                .update_first_name(audit, *user_number, first_name)?;
            println!("{} {}", "Updated user".green(), user);
        }
        UserCommand::SetLastName {
            user_number,
            last_name,
        } => {
            let user = services
                .users
                .update_last_name(audit, *user_number, last_name)?;
            println!("{} {}", "Updated user".green(), user);
        }
        UserCommand::Activate { user_number } => {
            let user = services.users.activate(audit, *user_number)?;
            println!("{} {}", "Activated user".green(), user.username);
        }
        UserCommand::Deactivate { user_number } => {
            let user = services.users.inactivate(audit, *user_number)?;
            println!("{} {}", "Deactivated user".yellow(), user.username);
        }
        UserCommand::Search {
            first_name,
            last_name,
            username,
        } => {
            let search = UserSearch {
                first_name: first_name.clone(),
                last_name: last_name.clone(),
                username: username.clone(),
            };
            let users = services.users.search(&search)?;
            print_users(&users);
        }
        UserCommand::ByTeam { team } => {
            let team = resolve_team(services, team)?;
            let users = services.users.get_all_by_team_id(&team.id())?;
            print_users(&users);
        }
    }
    Ok(())
}

fn handle_work_item_command<S: CaseStore>(
    cmd: &WorkItemCommand,
    services: &Services<S>,
    audit: &AuditContext,
) -> Result<()> {
    match cmd {
        WorkItemCommand::Create { description } => {
            let item = services.work_items.create(audit, description)?;
            println!("{} {}", "Created work item".green(), item.id());
        }
        WorkItemCommand::Show { id } => {
            let item = services.work_items.get_by_id(id)?;
            print_work_item(&item);
        }
        WorkItemCommand::Status { id, status } => {
            let item = services.work_items.set_status(audit, id, *status)?;
            println!("{} {}", "Work item is now".green(), status_label(item.status));
        }
        WorkItemCommand::Assign { id, user_number } => {
            services.work_items.set_user(audit, *user_number, id)?;
            println!(
                "{} {} to user {}",
                "Assigned".green(),
                id,
                user_number
            );
        }
        WorkItemCommand::AddIssue { id, issue_id } => {
            services
                .work_items
                .add_issue_to_work_item(audit, issue_id, id)?;
            println!("{} {} to {}", "Attached issue".green(), issue_id, id);
        }
        WorkItemCommand::RemoveIssue { id } => {
            services.work_items.remove_issue_from_work_item(audit, id)?;
            println!("{} {}", "Removed issue from".yellow(), id);
        }
        WorkItemCommand::List {
            status,
            team,
            user,
            contains,
            from,
            to,
        } => {
            let items = if let Some(status) = status {
                services.work_items.get_by_status(*status)?
            } else if let Some(team) = team {
                let team = resolve_team(services, team)?;
                services.work_items.get_by_team_id(&team.id())?
            } else if let Some(user_number) = user {
                services.work_items.get_by_user_number(*user_number)?
            } else if let Some(text) = contains {
                services.work_items.get_by_description_contains(text)?
            } else if let (Some(from), Some(to)) = (from, to) {
                services.work_items.get_by_created_between_dates(*from, *to)?
            } else {
                anyhow::bail!("Specify one of --status, --team, --user, --contains or --from/--to");
            };
            print_work_items(&items);
        }
        WorkItemCommand::Remove { id } => {
            let item = services.work_items.remove_by_id(audit, id)?;
            println!("{} {}", "Removed work item".yellow(), item.description);
        }
    }
    Ok(())
}

fn handle_issue_command<S: CaseStore>(
    cmd: &IssueCommand,
    services: &Services<S>,
    audit: &AuditContext,
) -> Result<()> {
    match cmd {
        IssueCommand::Create { description } => {
            let issue = services.issues.create(audit, description)?;
            println!("{} {}", "Created issue".green(), issue.id());
        }
        IssueCommand::Show { id } => {
            let issue = services.issues.get_by_id(id)?;
            print_issue(&issue);
        }
        IssueCommand::Describe { id, description } => {
            services.issues.update_description(audit, id, description)?;
            println!("{} {}", "Updated issue".green(), id);
        }
        IssueCommand::Activate { id } => {
            services.issues.activate(audit, id)?;
            println!("{} {}", "Activated issue".green(), id);
        }
        IssueCommand::Deactivate { id } => {
            services.issues.inactivate(audit, id)?;
            println!("{} {}", "Deactivated issue".yellow(), id);
        }
        IssueCommand::Find { description } => {
            let issues = services.issues.get_by_description(description)?;
            print_issues(&issues);
        }
        IssueCommand::List { page, size } => {
            let issues = services.issues.get_all_by_page(*page, *size)?;
            print_issues(&issues);
        }
        IssueCommand::Remove { id } => {
            let issue = services.issues.remove_by_id(audit, id)?;
            println!("{} {}", "Removed issue".yellow(), issue.description);
        }
    }
    Ok(())
}

fn handle_db_command<S: CaseStore>(
    cmd: &DbCommand,
    services: &Services<S>,
    config: &CaseworkConfig,
    config_path: &Path,
) -> Result<()> {
    match cmd {
        DbCommand::Init => {
            println!("{} {:?}", "Database:".bold(), config.database.path);
            println!("{}", "Database ready.".green());
        }
        DbCommand::Path => {
            println!("{} {:?}", "Config:".bold(), config_path);
            println!("{} {}", "Backend:".bold(), config.database.backend_type);
            println!("{} {:?}", "Database:".bold(), config.database.path);
        }
        DbCommand::Stats => {
            let stats = services.store().stats()?;
            println!("{} {}", "Backend:".bold(), stats.backend_type);
            println!("{:<12} {}", "Teams:", stats.team_count);
            println!("{:<12} {}", "Users:", stats.user_count);
            println!("{:<12} {}", "Work items:", stats.work_item_count);
            println!("{:<12} {}", "Issues:", stats.issue_count);
        }
        DbCommand::Export { file } => {
            let snapshot = export_snapshot(services.store())?;
            export_to_file(&snapshot, file)?;
            println!(
                "{} {} records to {:?}",
                "Exported".green(),
                snapshot.entity_count(),
                file
            );
        }
        DbCommand::Import { file } => {
            let snapshot = import_from_file(file)?;
            let count = import_snapshot(services.store(), &snapshot)?;
            println!("{} {} records from {:?}", "Imported".green(), count, file);
        }
        DbCommand::Migrate { to } => {
            let target = SqliteBackend::new(to)?;
            let count = migrate(services.store(), &target)?;
            println!("{} {} records to {:?}", "Migrated".green(), count, target.path());
        }
    }
    Ok(())
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let mut short: String = text.chars().take(width.saturating_sub(3)).collect();
    short.push_str("...");
    short
}

fn active_label(active: bool) -> ColoredString {
    if active {
        "yes".green()
    } else {
        "no".red()
    }
}

fn status_label(status: WorkItemStatus) -> ColoredString {
    match status {
        WorkItemStatus::Unstarted => status.as_str().yellow(),
        WorkItemStatus::Started => status.as_str().blue(),
        WorkItemStatus::Done => status.as_str().green(),
    }
}

fn optional_id(id: Option<Uuid>) -> String {
    id.map(|id| id.to_string()).unwrap_or_else(|| "-".to_string())
}

fn print_meta(meta: &EntityMeta) {
    println!("{:<12} {}", "UUID:".bold(), meta.id);
    println!(
        "{:<12} {} by {}",
        "Created:".bold(),
        meta.created_at.format("%Y-%m-%d %H:%M:%S"),
        meta.created_by
    );
    println!(
        "{:<12} {} by {}",
        "Modified:".bold(),
        meta.modified_at.format("%Y-%m-%d %H:%M:%S"),
        meta.modified_by
    );
}

fn print_team(team: &Team) {
    println!("{:<12} {}", "Name:".bold(), team.name);
    println!("{:<12} {}", "Active:".bold(), active_label(team.active));
    print_meta(&team.meta);
}

fn print_user(user: &User) {
    println!("{:<12} {}", "Number:".bold(), user.user_number);
    println!("{:<12} {}", "Username:".bold(), user.username);
    println!(
        "{:<12} {} {}",
        "Name:".bold(),
        user.first_name,
        user.last_name
    );
    println!("{:<12} {}", "Active:".bold(), active_label(user.active));
    println!("{:<12} {}", "Team:".bold(), optional_id(user.team_id));
    print_meta(&user.meta);
}

fn print_work_item(item: &WorkItem) {
    println!("{:<12} {}", "Description:".bold(), item.description);
    println!("{:<12} {}", "Status:".bold(), status_label(item.status));
    println!("{:<12} {}", "Owner:".bold(), optional_id(item.user_id));
    println!("{:<12} {}", "Issue:".bold(), optional_id(item.issue_id));
    print_meta(&item.meta);
}

fn print_issue(issue: &Issue) {
    println!("{:<12} {}", "Description:".bold(), issue.description);
    println!("{:<12} {}", "Active:".bold(), active_label(issue.active));
    println!("{:<12} {}", "Work item:".bold(), optional_id(issue.work_item_id));
    print_meta(&issue.meta);
}

fn print_users(users: &[User]) {
    println!(
        "{:<8} | {:<20} | {:<30} | {:<8}",
        "Number", "Username", "Name", "Active"
    );
    println!("{}", "-".repeat(76));
    for user in users {
        println!(
            "{:<8} | {:<20} | {:<30} | {}",
            user.user_number,
            truncate(&user.username, 20),
            truncate(&format!("{} {}", user.first_name, user.last_name), 30),
            active_label(user.active)
        );
    }
}

fn print_work_items(items: &[WorkItem]) {
    println!("{:<36} | {:<40} | {:<10}", "UUID", "Description", "Status");
    println!("{}", "-".repeat(94));
    for item in items {
        println!(
            "{:<36} | {:<40} | {}",
            item.id(),
            truncate(&item.description, 40),
            status_label(item.status)
        );
    }
}

fn print_issues(issues: &[Issue]) {
    println!("{:<36} | {:<40} | {:<8}", "UUID", "Description", "Active");
    println!("{}", "-".repeat(92));
    for issue in issues {
        println!(
            "{:<36} | {:<40} | {}",
            issue.id(),
            truncate(&issue.description, 40),
            active_label(issue.active)
        );
    }
}
