//! Command line surface and startup.

use std::env;

use clap::{ArgAction, Parser, Subcommand};
use tracing::{info, warn};

use crate::api::{get_password, normalize_base_url, store_password};
use crate::bridge::{connect, JiraBridge, Protocol};
use crate::cache::{loader, CacheStore};
use crate::commands::{
    view_mode, AddCommand, AdjustEstimateCommand, ListCommand, ListKind, Selection, Session,
    UpdateCommand, ViewCommand, WorkLogCommand,
};
use crate::config::Config;
use crate::editor::ExternalEditor;
use crate::error::{AppError, Result};
use crate::logging;
use crate::output::Console;

/// Environment variable consulted for the password when none is stored.
pub const PASSWORD_ENV: &str = "JIRA_PASSWORD";

#[derive(Parser, Debug)]
#[command(name = "jiracli")]
#[command(about = "View, search, create and update JIRA issues")]
#[command(version)]
pub struct Cli {
    /// Base URL of the JIRA instance
    #[arg(long = "jira-url", global = true)]
    pub jira_url: Option<String>,

    /// Format string with %key, %status, %summary... placeholders
    #[arg(long, global = true)]
    pub format: Option<String>,

    /// One line per issue
    #[arg(long, global = true)]
    pub oneline: bool,

    /// More detail; repeat for more
    #[arg(short = 'v', action = ArgAction::Count, global = true)]
    pub verbosity: u8,

    #[arg(short, long, global = true)]
    pub username: Option<String>,

    #[arg(short, long, global = true)]
    pub password: Option<String>,

    /// Wire protocol of the JIRA instance
    #[arg(long, global = true, value_parser = ["rest", "rpc", "soap"])]
    pub protocol: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show issues
    View {
        /// Issue keys
        ids: Vec<String>,

        /// Free-text search over summary and description
        #[arg(long = "search", short = 's')]
        search: Option<String>,

        /// JQL search
        #[arg(long = "search-jql", short = 'j', conflicts_with = "filter")]
        search_jql: Option<String>,

        /// Saved filter names
        #[arg(long, num_args = 1..)]
        filter: Vec<String>,

        /// Restrict searches to a project
        #[arg(long)]
        project: Option<String>,

        /// Show only the comments
        #[arg(long)]
        comments_only: bool,
    },

    /// Create an issue
    New {
        title: String,

        #[arg(long)]
        project: Option<String>,

        /// Issue type (default: bug, or sub-task with --parent)
        #[arg(long = "type")]
        issue_type: Option<String>,

        #[arg(long, default_value = "minor")]
        priority: String,

        /// Opens the editor when omitted
        #[arg(long)]
        description: Option<String>,

        /// Key of the parent issue
        #[arg(long)]
        parent: Option<String>,

        #[arg(long)]
        assignee: Option<String>,

        #[arg(long)]
        reporter: Option<String>,

        #[arg(long = "label")]
        labels: Vec<String>,

        #[arg(long = "component")]
        components: Vec<String>,

        /// Extra fields as key=value
        #[arg(long = "extra")]
        extras: Vec<String>,
    },

    /// Change an issue
    Update {
        issue: String,

        /// Add a comment; opens the editor without a value
        #[arg(long, num_args = 0..=1)]
        comment: Option<Option<String>>,

        #[arg(long)]
        priority: Option<String>,

        #[arg(long = "component")]
        components: Vec<String>,

        #[arg(long)]
        transition: Option<String>,

        /// Resolution to set with --transition
        #[arg(long, requires = "transition")]
        resolution: Option<String>,

        #[arg(long)]
        assign: Option<String>,

        #[arg(long = "label")]
        labels: Vec<String>,

        #[arg(long = "affects-version")]
        affects_versions: Vec<String>,

        #[arg(long = "remove-affects-version")]
        remove_affects_versions: Vec<String>,

        #[arg(long = "fix-version")]
        fix_versions: Vec<String>,

        #[arg(long = "remove-fix-version")]
        remove_fix_versions: Vec<String>,

        /// Extra fields as key=value
        #[arg(long = "extra")]
        extras: Vec<String>,
    },

    /// List reference data
    List {
        kind: ListKind,

        /// Project for components and versions
        #[arg(long)]
        project: Option<String>,

        /// Issue for transitions
        #[arg(long)]
        issue: Option<String>,
    },

    /// Log work and show the work log of an issue
    WorkLog {
        issue: String,

        /// Time spent, e.g. 2h 30m
        #[arg(long)]
        spent: Option<String>,

        #[arg(long)]
        comment: Option<String>,

        /// New remaining estimate; adjusted automatically when omitted
        #[arg(long)]
        remaining: Option<String>,
    },

    /// Take logged time out of the estimates of parent stories
    AdjustEstimate {
        ids: Vec<String>,

        #[arg(long = "search", short = 's')]
        search: Option<String>,

        #[arg(long = "search-jql", short = 'j', conflicts_with = "filter")]
        search_jql: Option<String>,

        #[arg(long, num_args = 1..)]
        filter: Vec<String>,

        #[arg(long)]
        project: Option<String>,

        /// Print the plan without changing anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Store the JIRA location, username, protocol and password
    Configure,

    /// Remove cached reference data
    #[command(alias = "clear_cache")]
    ClearCache {
        /// Only these loaders (filters, projects, components, versions, priorities,
        /// issue_types, subtask_types, statuses, resolutions); everything when omitted
        names: Vec<String>,
    },
}

/// Run one invocation.
pub async fn run(cli: Cli) -> Result<()> {
    let mut config = Config::load()?;
    match &cli.command {
        Command::Configure => return configure(&cli, &mut config),
        Command::ClearCache { names } => return clear_cache(names),
        _ => {}
    }

    let bridge = initialize(&cli, &mut config, CacheStore::new())
        .await
        .map_err(|err| {
            if err.is_recoverable_by_login() {
                warn!("Login failed; 'jiracli configure' updates the stored location and credentials");
            }
            err
        })?;
    let editor = ExternalEditor::new();
    let mut session = Session::new(bridge.as_ref(), Console::stdout(), &editor);
    dispatch(&cli, &config, &mut session).await
}

/// Build a logged-in bridge.
///
/// The location comes from `--jira-url` or the configuration. A still valid
/// session is reused; otherwise the credentials come from the flags, the
/// configuration, the keyring or `JIRA_PASSWORD`. Unless `--username` or
/// `--jira-url` was given, the location and any session token are saved.
pub async fn initialize(
    cli: &Cli,
    config: &mut Config,
    cache: CacheStore,
) -> Result<Box<dyn JiraBridge>> {
    let base_url = cli
        .jira_url
        .clone()
        .or_else(|| config.base_url.clone())
        .ok_or_else(|| {
            if config.is_first_run() {
                AppError::usage("jiracli is not configured yet. Run 'jiracli configure'")
            } else {
                AppError::usage("no jira location given. Use --jira-url or run 'jiracli configure'")
            }
        })?;
    let protocol = resolve_protocol(config.protocol.as_deref(), cli.protocol.as_deref())?;
    let persist = cli.username.is_none() && cli.jira_url.is_none();

    let mut bridge = connect(protocol, &base_url, cache, config.token.clone()).await?;
    if !bridge.ping().await {
        let username = cli
            .username
            .clone()
            .or_else(|| config.username.clone())
            .ok_or_else(|| AppError::usage("no username given. Use --username"))?;
        let password = match &cli.password {
            Some(password) => password.clone(),
            None => stored_password(&username)?,
        };
        bridge.login(&username, &password).await?;
        info!("Logged in to {} as {}", bridge.describe(), username);
    }

    if persist {
        config.base_url = Some(normalize_base_url(&base_url));
        if let Some(token) = bridge.session_token() {
            config.token = Some(token.to_string());
        }
        if let Err(e) = config.save() {
            warn!("Could not save configuration: {}", e);
        }
    }
    Ok(bridge)
}

/// The configured protocol wins over the flag; `rest` when neither is set.
fn resolve_protocol(configured: Option<&str>, flag: Option<&str>) -> Result<Protocol> {
    match configured.or(flag) {
        Some(name) => name.parse(),
        None => Ok(Protocol::default()),
    }
}

fn stored_password(username: &str) -> Result<String> {
    match get_password(username) {
        Ok(password) => Ok(password),
        Err(e) => {
            warn!("No password in the keyring: {}", e);
            env::var(PASSWORD_ENV).map_err(|_| {
                AppError::usage(format!(
                    "no password for {}. Use --password, run 'jiracli configure' or set {}",
                    username, PASSWORD_ENV
                ))
            })
        }
    }
}

fn clear_cache(names: &[String]) -> Result<()> {
    let cache = CacheStore::new();
    let mut console = Console::stdout();
    if names.is_empty() {
        cache.clear()?;
        return Ok(console.line("cache cleared")?);
    }
    let names: Vec<&str> = names.iter().map(String::as_str).collect();
    if let Some(unknown) = names.iter().find(|n| !loader::is_known(n)) {
        return Err(AppError::usage(format!(
            "unknown cache name '{}'. Use one of [{}]",
            unknown,
            loader::ALL.join(",")
        )));
    }
    let removed = cache.clear_named(&names)?;
    Ok(console.line(&format!("removed {} cached entries", removed))?)
}

fn configure(cli: &Cli, config: &mut Config) -> Result<()> {
    let base_url = cli
        .jira_url
        .as_deref()
        .or(config.base_url.as_deref())
        .map(normalize_base_url)
        .ok_or_else(|| AppError::usage("--jira-url is required to configure jiracli"))?;
    let username = cli
        .username
        .clone()
        .or_else(|| config.username.clone())
        .ok_or_else(|| AppError::usage("--username is required to configure jiracli"))?;
    let protocol = match cli.protocol.as_deref() {
        Some(name) => name.parse()?,
        None => resolve_protocol(config.protocol.as_deref(), None)?,
    };

    config.base_url = Some(base_url);
    config.username = Some(username.clone());
    config.protocol = Some(protocol.as_str().to_string());
    config.token = None;
    config.validate()?;
    config.save()?;
    if let Some(password) = &cli.password {
        store_password(&username, password).map_err(|e| AppError::cli(e.to_string()))?;
    }

    let mut console = Console::stdout();
    if let Some(path) = config.path() {
        console.line(&format!("configuration written to {}", path.display()))?;
    }
    if let Some(dir) = logging::log_directory() {
        console.line(&format!("logs are written to {}", dir.display()))?;
    }
    Ok(())
}

async fn dispatch<W: std::io::Write>(
    cli: &Cli,
    config: &Config,
    session: &mut Session<'_, W>,
) -> Result<()> {
    match &cli.command {
        Command::View {
            ids,
            search,
            search_jql,
            filter,
            project,
            comments_only,
        } => {
            ViewCommand {
                selection: Selection {
                    ids: ids.clone(),
                    search: search.clone(),
                    jql: search_jql.clone(),
                    filters: filter.clone(),
                    project: project.clone(),
                },
                mode: view_mode(cli.oneline, cli.verbosity),
                template: cli.format.clone(),
                comments_only: *comments_only,
            }
            .run(session)
            .await
        }
        Command::New {
            title,
            project,
            issue_type,
            priority,
            description,
            parent,
            assignee,
            reporter,
            labels,
            components,
            extras,
        } => {
            AddCommand {
                title: title.clone(),
                project: project.clone(),
                issue_type: issue_type.clone(),
                priority: Some(priority.clone()),
                description: description.clone(),
                parent: parent.clone(),
                assignee: assignee.clone(),
                reporter: reporter.clone(),
                labels: labels.clone(),
                components: components.clone(),
                extras: extras.clone(),
            }
            .run(session)
            .await
        }
        Command::Update {
            issue,
            comment,
            priority,
            components,
            transition,
            resolution,
            assign,
            labels,
            affects_versions,
            remove_affects_versions,
            fix_versions,
            remove_fix_versions,
            extras,
        } => {
            UpdateCommand {
                issue: issue.clone(),
                comment: comment.clone(),
                priority: priority.clone(),
                components: components.clone(),
                transition: transition.clone(),
                resolution: resolution.clone(),
                assignee: assign.clone(),
                labels: labels.clone(),
                affects_versions: affects_versions.clone(),
                remove_affects_versions: remove_affects_versions.clone(),
                fix_versions: fix_versions.clone(),
                remove_fix_versions: remove_fix_versions.clone(),
                extras: extras.clone(),
            }
            .run(session)
            .await
        }
        Command::List {
            kind,
            project,
            issue,
        } => {
            ListCommand {
                kind: *kind,
                project: project.clone(),
                issue: issue.clone(),
            }
            .run(session)
            .await
        }
        Command::WorkLog {
            issue,
            spent,
            comment,
            remaining,
        } => {
            WorkLogCommand {
                issue: issue.clone(),
                spent: spent.clone(),
                comment: comment.clone(),
                remaining: remaining.clone(),
            }
            .run(session)
            .await
        }
        Command::AdjustEstimate {
            ids,
            search,
            search_jql,
            filter,
            project,
            dry_run,
        } => {
            AdjustEstimateCommand {
                selection: Selection {
                    ids: ids.clone(),
                    search: search.clone(),
                    jql: search_jql.clone(),
                    filters: filter.clone(),
                    project: project.clone(),
                },
                dry_run: *dry_run,
                verbose: cli.verbosity > 0,
                settings: config.estimate.clone(),
            }
            .run(session)
            .await
        }
        Command::Configure | Command::ClearCache { .. } => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_view_with_global_flags() {
        let cli = parse(&["jiracli", "view", "TP-1", "TP-2", "--oneline", "--jira-url", "https://j"]);
        assert!(cli.oneline);
        assert_eq!(cli.jira_url.as_deref(), Some("https://j"));
        match cli.command {
            Command::View { ids, .. } => assert_eq!(ids, vec!["TP-1", "TP-2"]),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_verbosity_counts() {
        let cli = parse(&["jiracli", "-vvv", "view", "TP-1"]);
        assert_eq!(cli.verbosity, 3);
    }

    #[test]
    fn test_search_jql_conflicts_with_filter() {
        let result = Cli::try_parse_from([
            "jiracli",
            "view",
            "--search-jql",
            "status=Open",
            "--filter",
            "Nightly",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_update_comment_without_text_uses_editor() {
        let cli = parse(&["jiracli", "update", "TP-1", "--comment"]);
        match cli.command {
            Command::Update { comment, .. } => assert_eq!(comment, Some(None)),
            other => panic!("unexpected {:?}", other),
        }
        let cli = parse(&["jiracli", "update", "TP-1", "--comment", "looks good"]);
        match cli.command {
            Command::Update { comment, .. } => {
                assert_eq!(comment, Some(Some("looks good".to_string())))
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_clear_cache_alias() {
        assert!(matches!(
            parse(&["jiracli", "clear_cache"]).command,
            Command::ClearCache { .. }
        ));
        match parse(&["jiracli", "clear-cache", "priorities", "statuses"]).command {
            Command::ClearCache { names } => assert_eq!(names, vec!["priorities", "statuses"]),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_clear_cache_rejects_unknown_name() {
        let err = clear_cache(&["issuetypes".to_string()]).unwrap_err();
        assert!(matches!(err, AppError::Usage(_)));
        assert!(err.to_string().contains("issue_types,subtask_types"));
    }

    #[test]
    fn test_protocol_values() {
        assert_eq!(
            parse(&["jiracli", "--protocol", "soap", "configure"]).protocol.as_deref(),
            Some("soap")
        );
        assert!(Cli::try_parse_from(["jiracli", "--protocol", "xmlrpc", "configure"]).is_err());
    }

    #[test]
    fn test_list_kind_argument() {
        match parse(&["jiracli", "list", "issue_types"]).command {
            Command::List { kind, .. } => assert_eq!(kind, ListKind::IssueTypes),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_new_defaults() {
        match parse(&["jiracli", "new", "Crash", "--project", "TP"]).command {
            Command::New {
                priority,
                issue_type,
                ..
            } => {
                assert_eq!(priority, "minor");
                assert_eq!(issue_type, None);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_resolve_protocol() {
        assert_eq!(resolve_protocol(None, None).unwrap(), Protocol::Rest);
        assert_eq!(resolve_protocol(None, Some("rpc")).unwrap(), Protocol::Rpc);
        assert_eq!(resolve_protocol(Some("rest"), Some("rpc")).unwrap(), Protocol::Rest);
        assert!(resolve_protocol(Some("carrier-pigeon"), None).is_err());
    }

    #[tokio::test]
    async fn test_initialize_without_location_is_usage_error() {
        let cli = parse(&["jiracli", "view", "TP-1"]);
        let mut config = Config::ephemeral();
        let err = initialize(&cli, &mut config, CacheStore::disabled())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, AppError::Usage(_)));
        assert!(err.to_string().contains("not configured yet"));

        config.username = Some("admin".to_string());
        let err = initialize(&cli, &mut config, CacheStore::disabled())
            .await
            .err()
            .unwrap();
        assert!(err.to_string().starts_with("no jira location given"));
    }
}
