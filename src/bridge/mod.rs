//! The protocol bridges.
//!
//! A bridge is the one object a command talks to. [`JiraBridge`] is the
//! uniform issue-tracker contract; [`RestBridge`] and [`RpcBridge`] implement
//! it against the two wire protocols and hand back only canonical shapes:
//! [`Issue`], [`Entity`] maps, [`Comment`]s and [`Worklog`]s.

mod entity;
pub mod format;
mod issue;
mod rest;
mod rpc;

#[cfg(test)]
pub(crate) mod testing;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use regex::Regex;
use tracing::info;

use crate::api::{resolve_redirect, JsonRpcClient, RestClient};
use crate::cache::CacheStore;
use crate::error::{AppError, Result};

pub use entity::{
    entity_map_from, index_by_name, lookup, names, object_from_key, Entity, EntityMap, RefKind,
};
pub use format::{DisplayMode, IssueFormatter};
pub use issue::{
    clean_fields, Comment, FieldUpdate, Issue, NamedRef, NewIssue, VersionKind, Worklog,
    EPIC_NAME_FIELD,
};
pub use rest::RestBridge;
pub use rpc::RpcBridge;

/// Default number of issues a search returns.
pub const DEFAULT_SEARCH_LIMIT: usize = 100;

/// The wire protocol a bridge speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Protocol {
    /// JIRA REST API v2.
    #[default]
    Rest,
    /// The legacy RPC service.
    Rpc,
}

impl Protocol {
    /// The configuration name of the protocol.
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Rest => "rest",
            Protocol::Rpc => "rpc",
        }
    }

    /// The name of the bridge implementing the protocol.
    pub fn bridge_name(&self) -> &'static str {
        match self {
            Protocol::Rest => "RestBridge",
            Protocol::Rpc => "RpcBridge",
        }
    }
}

impl FromStr for Protocol {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "rest" => Ok(Protocol::Rest),
            "rpc" | "soap" => Ok(Protocol::Rpc),
            other => Err(AppError::usage(format!(
                "unknown protocol '{}'. Use one of [rest,rpc]",
                other
            ))),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The uniform issue-tracker contract.
///
/// Every operation returns canonical shapes. Reference loaders are memoized
/// through the bridge's [`CacheStore`], keyed by loader name, [`describe`]
/// and the loader arguments.
///
/// [`describe`]: JiraBridge::describe
#[async_trait]
pub trait JiraBridge: Send + Sync {
    /// The base URL of the instance, without trailing slash.
    fn base_url(&self) -> &str;

    fn protocol(&self) -> Protocol;

    /// `<Bridge>(<base_url>)`.
    fn describe(&self) -> String {
        format!("{}({})", self.protocol().bridge_name(), self.base_url())
    }

    /// The session token to persist, for protocols that have one.
    fn session_token(&self) -> Option<&str> {
        None
    }

    /// Establish a session.
    ///
    /// Fails with `Authentication` on bad credentials and with
    /// `Initialization` when the endpoint cannot be reached.
    async fn login(&mut self, username: &str, password: &str) -> Result<()>;

    /// Whether the current session is usable. Never fails.
    async fn ping(&mut self) -> bool;

    /// A single issue, or `None` when it does not exist.
    async fn get_issue(&self, id: &str) -> Result<Option<Issue>>;

    /// Free-text search over summary and description, ordered by key.
    async fn search_issues(
        &self,
        free_text: &str,
        project: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Issue>>;

    /// JQL search.
    async fn search_issues_jql(
        &self,
        query: &str,
        limit: usize,
        project: Option<&str>,
    ) -> Result<Vec<Issue>>;

    /// The issues of one or more saved filters, in order.
    ///
    /// Fails with `Usage` naming the filter when a name is unknown.
    async fn get_issues_by_filter(&self, filters: &[String]) -> Result<Vec<Issue>>;

    /// Create an issue and return it as stored remotely.
    ///
    /// Follow-up writes (assignee, then reporter, then labels where the
    /// protocol needs it) are separate calls and are not rolled back.
    async fn create_issue(&self, issue: NewIssue) -> Result<Issue>;

    /// Partial update.
    async fn update_issue(&self, id: &str, updates: Vec<FieldUpdate>) -> Result<()>;

    async fn assign_issue(&self, id: &str, assignee: &str) -> Result<()>;

    async fn change_reporter(&self, id: &str, reporter: &str) -> Result<()>;

    /// Add labels. Fails with `UsageWarning` when all are already present.
    async fn add_labels(&self, id: &str, labels: &[String]) -> Result<()>;

    async fn add_versions(&self, id: &str, versions: &[String], kind: VersionKind) -> Result<()>;

    async fn remove_versions(&self, id: &str, versions: &[String], kind: VersionKind)
        -> Result<()>;

    /// Transitions available on the issue, keyed by lower-cased name.
    async fn get_available_transitions(&self, id: &str) -> Result<EntityMap>;

    /// Move the issue through the named transition.
    ///
    /// Fails with `Cli` listing the valid names when `transition` is unknown.
    async fn transition_issue(
        &self,
        id: &str,
        transition: &str,
        resolution: Option<&str>,
    ) -> Result<()>;

    async fn get_filters(&self) -> Result<EntityMap>;

    async fn get_projects(&self) -> Result<EntityMap>;

    async fn get_components(&self, project: &str) -> Result<EntityMap>;

    async fn list_versions(&self, project: &str) -> Result<EntityMap>;

    async fn get_priorities(&self) -> Result<EntityMap>;

    /// Top-level issue types.
    async fn get_issue_types(&self) -> Result<EntityMap>;

    async fn get_subtask_issue_types(&self) -> Result<EntityMap>;

    async fn get_statuses(&self) -> Result<EntityMap>;

    async fn get_resolutions(&self) -> Result<EntityMap>;

    async fn get_issue_comments(&self, id: &str) -> Result<Vec<Comment>>;

    async fn add_comment(&self, id: &str, body: &str) -> Result<()>;

    /// Log time on an issue. With `remaining` the remaining estimate is set
    /// to it; otherwise it is adjusted automatically.
    async fn log_work(
        &self,
        id: &str,
        spent: &str,
        comment: &str,
        remaining: Option<&str>,
    ) -> Result<()>;

    async fn get_worklogs(&self, id: &str) -> Result<Vec<Worklog>>;

    /// The reference data a [`RefKind`] resolves through.
    async fn reference(&self, kind: RefKind) -> Result<EntityMap> {
        match kind {
            RefKind::Status => self.get_statuses().await,
            RefKind::Priority => self.get_priorities().await,
            RefKind::IssueType => self.get_issue_types().await,
            RefKind::SubtaskIssueType => self.get_subtask_issue_types().await,
            RefKind::Resolution => self.get_resolutions().await,
            RefKind::AnyIssueType => {
                let mut types = self.get_issue_types().await?;
                types.extend(self.get_subtask_issue_types().await?);
                Ok(types)
            }
        }
    }
}

/// Restrict a JQL query to a project, keeping any trailing `order by` clause last.
pub fn scope_jql(query: &str, project: Option<&str>) -> String {
    let Some(project) = project.filter(|p| !p.is_empty()) else {
        return query.to_string();
    };
    let (condition, order) = match Regex::new(r"(?i)\border\s+by\b") {
        Ok(re) => match re.find(query) {
            Some(m) => (query[..m.start()].trim(), Some(query[m.start()..].trim())),
            None => (query.trim(), None),
        },
        Err(_) => (query.trim(), None),
    };
    let mut scoped = if condition.is_empty() {
        format!("project={}", project)
    } else {
        format!("project={} and ({})", project, condition)
    };
    if let Some(order) = order {
        scoped.push(' ');
        scoped.push_str(order);
    }
    scoped
}

/// The JQL of a free-text search over summary and description.
pub fn free_text_jql(free_text: &str, project: Option<&str>) -> String {
    let text = free_text.replace('"', "\\\"");
    let query = format!("(summary~\"{}\" or description~\"{}\")", text, text);
    format!("{} order by key", scope_jql(&query, project))
}

/// Build the bridge for `protocol` against `base_url`.
///
/// A single 301/302 redirect of the base URL is followed first. `token` is
/// a previously persisted session token for protocols that keep one.
pub async fn connect(
    protocol: Protocol,
    base_url: &str,
    cache: CacheStore,
    token: Option<String>,
) -> Result<Box<dyn JiraBridge>> {
    let base_url = resolve_redirect(base_url).await;
    info!("Connecting to {} over {}", base_url, protocol);
    let bridge: Box<dyn JiraBridge> = match protocol {
        Protocol::Rest => Box::new(RestBridge::new(
            RestClient::new(&base_url).map_err(|e| AppError::Initialization(e.to_string()))?,
            cache,
        )),
        Protocol::Rpc => Box::new(RpcBridge::new(
            JsonRpcClient::new(&base_url).map_err(|e| AppError::Initialization(e.to_string()))?,
            cache,
            token,
        )),
    };
    Ok(bridge)
}
