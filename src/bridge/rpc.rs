//! Bridge over the legacy RPC service.
//!
//! Every call but `login` carries the session token as its first parameter.
//! Issues come back as flat `RemoteIssue` objects whose custom fields sit in a
//! `customFieldValues` list; those are lifted to top-level fields.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Map, Value};
use tracing::{debug, info, instrument, warn};

use super::entity::{entity_map_from, lookup, names, EntityMap};
use super::issue::{
    clean_fields, Comment, FieldUpdate, Issue, NewIssue, VersionKind, Worklog, EPIC_NAME_FIELD,
    RPC_FIELDS,
};
use super::{scope_jql, JiraBridge, Protocol};
use crate::api::{ApiError, JsonRpcClient, RpcTransport};
use crate::cache::{loader, CacheStore};
use crate::error::{AppError, Result};

/// The legacy RPC protocol bridge.
pub struct RpcBridge<T: RpcTransport = JsonRpcClient> {
    transport: T,
    cache: CacheStore,
    token: Option<String>,
}

impl<T: RpcTransport> RpcBridge<T> {
    /// A bridge resuming `token`, if one was persisted.
    pub fn new(transport: T, cache: CacheStore, token: Option<String>) -> Self {
        Self {
            transport,
            cache,
            token,
        }
    }

    /// Call `method` with the session token prepended to `params`.
    async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value> {
        let token = Value::String(self.token.clone().unwrap_or_default());
        let params = std::iter::once(token).chain(params).collect();
        Ok(self.transport.call(method, params).await?)
    }

    /// Memoize a reference-data call.
    async fn cached_call(&self, name: &str, method: &str, params: Vec<Value>) -> Result<Value> {
        let describe = self.describe();
        let rendered: Vec<String> = params.iter().map(Value::to_string).collect();
        let mut args = vec![describe.as_str()];
        args.extend(rendered.iter().map(String::as_str));
        self.cache
            .cached(name, &args, move || self.call(method, params))
            .await
    }

    /// The versions of the issue's project, keyed by lower-cased name.
    pub async fn versions_for_issue(&self, id: &str) -> Result<EntityMap> {
        let project = id.split('-').next().unwrap_or_default();
        self.list_versions(project).await
    }

    async fn issues(&self, method: &str, params: Vec<Value>) -> Result<Vec<Issue>> {
        let raw = self.call(method, params).await?;
        let issues: Vec<Issue> = raw
            .as_array()
            .map(|arr| arr.iter().map(clean_issue).collect())
            .unwrap_or_default();
        debug!("{} returned {} issues", method, issues.len());
        Ok(issues)
    }

    async fn existing_issue(&self, id: &str) -> Result<Issue> {
        self.get_issue(id)
            .await?
            .ok_or_else(|| AppError::usage(format!("issue {} not found", id)))
    }
}

/// Reduce a `RemoteIssue` to its canonical form.
pub(crate) fn clean_issue(raw: &Value) -> Issue {
    let empty = Map::new();
    let mut fields = raw.as_object().unwrap_or(&empty).clone();
    if let Some(Value::Array(custom)) = fields.remove("customFieldValues") {
        for entry in custom {
            let Some(id) = entry.get("customfieldId").and_then(Value::as_str) else {
                continue;
            };
            let value = match entry.get("values") {
                Some(Value::Array(values)) if values.len() == 1 => values[0].clone(),
                Some(other) => other.clone(),
                None => Value::Null,
            };
            fields.insert(id.to_string(), value);
        }
    }
    Issue::from_fields(clean_fields(&fields, RPC_FIELDS))
}

/// A `RemoteFieldValue`: the field id and its values as strings.
fn field_value(field: &str, value: &Value) -> Value {
    let values: Vec<Value> = match value {
        Value::Array(items) => items.iter().map(as_remote_string).collect(),
        Value::Null => Vec::new(),
        other => vec![as_remote_string(other)],
    };
    json!({ "id": field, "values": values })
}

fn as_remote_string(value: &Value) -> Value {
    match value {
        Value::String(_) => value.clone(),
        Value::Object(obj) => obj
            .get("id")
            .or_else(|| obj.get("name"))
            .map(as_remote_string)
            .unwrap_or_else(|| Value::String(value.to_string())),
        other => Value::String(other.to_string()),
    }
}

fn text_of(value: &Value, field: &str) -> String {
    match value.get(field) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

#[async_trait]
impl<T: RpcTransport> JiraBridge for RpcBridge<T> {
    fn base_url(&self) -> &str {
        self.transport.base_url()
    }

    fn protocol(&self) -> Protocol {
        Protocol::Rpc
    }

    fn session_token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    #[instrument(skip(self, password))]
    async fn login(&mut self, username: &str, password: &str) -> Result<()> {
        if self.token.is_some() && self.ping().await {
            debug!("Reusing session token");
            return Ok(());
        }
        let result = self
            .transport
            .call("login", vec![json!(username), json!(password)])
            .await;
        match result {
            Ok(Value::String(token)) if !token.is_empty() => {
                self.token = Some(token);
                info!("Logged in to {} as {}", self.base_url(), username);
                Ok(())
            }
            Ok(other) => {
                self.token = None;
                debug!("Unexpected login result: {}", other);
                Err(AppError::Authentication(String::new()))
            }
            Err(ApiError::Fault { message, .. }) => {
                self.token = None;
                debug!("Login rejected: {}", message);
                Err(AppError::Authentication(String::new()))
            }
            Err(ApiError::Unauthorized) | Err(ApiError::Forbidden) => {
                self.token = None;
                Err(AppError::Authentication(String::new()))
            }
            Err(e) => {
                self.token = None;
                debug!("Login failed: {}", e);
                Err(AppError::Initialization(String::new()))
            }
        }
    }

    async fn ping(&mut self) -> bool {
        if self.token.is_none() {
            return false;
        }
        match self.call("getIssueTypes", vec![]).await {
            Ok(_) => true,
            Err(e) => {
                warn!("Session token rejected: {}", e);
                self.token = None;
                false
            }
        }
    }

    #[instrument(skip(self))]
    async fn get_issue(&self, id: &str) -> Result<Option<Issue>> {
        let token = Value::String(self.token.clone().unwrap_or_default());
        match self.transport.call("getIssue", vec![token, json!(id)]).await {
            Ok(Value::Null) => Ok(None),
            Ok(raw) => Ok(Some(clean_issue(&raw))),
            Err(e) if e.is_not_found() => {
                debug!("Issue {} not found: {}", id, e);
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn search_issues(
        &self,
        free_text: &str,
        project: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Issue>> {
        match project.filter(|p| !p.is_empty()) {
            None => {
                self.issues("getIssuesFromTextSearch", vec![json!(free_text)])
                    .await
            }
            Some(project) => {
                self.issues(
                    "getIssuesFromTextSearchWithProject",
                    vec![json!([project]), json!(free_text), json!(limit)],
                )
                .await
            }
        }
    }

    async fn search_issues_jql(
        &self,
        query: &str,
        limit: usize,
        project: Option<&str>,
    ) -> Result<Vec<Issue>> {
        self.issues(
            "getIssuesFromJqlSearch",
            vec![json!(scope_jql(query, project)), json!(limit)],
        )
        .await
    }

    async fn get_issues_by_filter(&self, filters: &[String]) -> Result<Vec<Issue>> {
        let known = self.get_filters().await?;
        let mut issues = Vec::new();
        for name in filters {
            let filter = lookup(&known, name)
                .ok_or_else(|| AppError::usage(format!("filter {} not found", name)))?;
            issues.extend(
                self.issues("getIssuesFromFilter", vec![json!(filter.id)])
                    .await?,
            );
        }
        Ok(issues)
    }

    #[instrument(skip(self, issue), fields(project = %issue.project))]
    async fn create_issue(&self, issue: NewIssue) -> Result<Issue> {
        let priorities = self.get_priorities().await?;
        let priority = lookup(&priorities, &issue.priority).ok_or_else(|| {
            AppError::usage(format!(
                "Invalid priority '{}'. Use one of [{}]",
                issue.priority,
                names(&priorities)
            ))
        })?;
        let types = if issue.parent.is_some() {
            self.get_subtask_issue_types().await?
        } else {
            self.get_issue_types().await?
        };
        let issue_type = lookup(&types, &issue.issue_type).ok_or_else(|| {
            AppError::usage(format!(
                "Invalid issue type '{}'. Use one of [{}]",
                issue.issue_type,
                names(&types)
            ))
        })?;

        let mut remote = Map::new();
        remote.insert("project".into(), json!(issue.project.to_uppercase()));
        remote.insert("summary".into(), json!(issue.summary));
        remote.insert("description".into(), json!(issue.description));
        remote.insert("priority".into(), json!(priority.id));
        remote.insert("type".into(), json!(issue_type.id));
        if !issue.components.is_empty() {
            let components: Vec<Value> = issue
                .components
                .iter()
                .map(|(name, id)| json!({ "name": name, "id": id }))
                .collect();
            remote.insert("components".into(), Value::Array(components));
        }

        let mut custom = Vec::new();
        if issue.issue_type.eq_ignore_ascii_case("epic") {
            custom.push(json!({ "customfieldId": EPIC_NAME_FIELD, "values": [issue.summary] }));
        }
        for (field, value) in issue.extras {
            if field.starts_with("customfield_") {
                let values = match value {
                    Value::Array(items) => items,
                    other => vec![other],
                };
                custom.push(json!({ "customfieldId": field, "values": values }));
            } else {
                remote.insert(field, value);
            }
        }
        if !custom.is_empty() {
            remote.insert("customFieldValues".into(), Value::Array(custom));
        }

        let created = match &issue.parent {
            Some(parent) => {
                self.call(
                    "createIssueWithParent",
                    vec![Value::Object(remote), json!(parent)],
                )
                .await?
            }
            None => self.call("createIssue", vec![Value::Object(remote)]).await?,
        };
        let key = text_of(&created, "key");
        info!("Created issue {}", key);

        if let Some(assignee) = issue.assignee.as_deref().filter(|a| !a.is_empty()) {
            self.assign_issue(&key, assignee).await?;
        }
        if let Some(reporter) = issue.reporter.as_deref().filter(|r| !r.is_empty()) {
            self.change_reporter(&key, reporter).await?;
        }
        if !issue.labels.is_empty() {
            self.update_issue(&key, vec![FieldUpdate::set("labels", issue.labels.clone())])
                .await?;
        }

        match self.get_issue(&key).await? {
            Some(fetched) => Ok(fetched),
            None => Ok(clean_issue(&created)),
        }
    }

    #[instrument(skip(self, updates))]
    async fn update_issue(&self, id: &str, updates: Vec<FieldUpdate>) -> Result<()> {
        let mut values = Vec::with_capacity(updates.len());
        for change in &updates {
            match change {
                FieldUpdate::Set(field, value) => values.push(field_value(field, value)),
                other => {
                    return Err(AppError::usage(format!(
                        "adding to or removing from '{}' is not supported by the rpc protocol",
                        other.field()
                    )))
                }
            }
        }
        if values.is_empty() {
            return Ok(());
        }
        self.call("updateIssue", vec![json!(id), Value::Array(values)])
            .await?;
        Ok(())
    }

    async fn assign_issue(&self, id: &str, assignee: &str) -> Result<()> {
        self.update_issue(id, vec![FieldUpdate::set("assignee", assignee)])
            .await
    }

    async fn change_reporter(&self, id: &str, reporter: &str) -> Result<()> {
        self.update_issue(id, vec![FieldUpdate::set("reporter", reporter)])
            .await
    }

    async fn add_labels(&self, id: &str, labels: &[String]) -> Result<()> {
        let mut current = self.existing_issue(id).await?.labels();
        let missing: Vec<String> = labels
            .iter()
            .filter(|l| !current.contains(l))
            .cloned()
            .collect();
        if missing.is_empty() {
            return Err(AppError::warning(format!(
                "{} already has the label(s) {}",
                id,
                labels.join(",")
            )));
        }
        current.extend(missing);
        self.update_issue(id, vec![FieldUpdate::set("labels", current)])
            .await
    }

    async fn add_versions(&self, id: &str, versions: &[String], kind: VersionKind) -> Result<()> {
        let known = self.versions_for_issue(id).await?;
        let mut ids = Vec::new();
        for name in versions {
            let version = lookup(&known, name).ok_or_else(|| {
                AppError::usage(format!("{} is not a valid version for issue {}", name, id))
            })?;
            ids.push(version.id.clone());
        }
        let issue = self.existing_issue(id).await?;
        for current in issue.refs(kind.canonical_field()) {
            if !ids.contains(&current.id) {
                ids.push(current.id);
            }
        }
        self.update_issue(id, vec![FieldUpdate::set(kind.remote_field(), ids)])
            .await
    }

    async fn remove_versions(
        &self,
        id: &str,
        versions: &[String],
        kind: VersionKind,
    ) -> Result<()> {
        let current = self.existing_issue(id).await?.refs(kind.canonical_field());
        let before = current.len();
        let remaining: Vec<String> = current
            .into_iter()
            .filter(|v| !versions.iter().any(|name| name.eq_ignore_ascii_case(&v.name)))
            .map(|v| v.id)
            .collect();
        if remaining.len() == before {
            return Err(AppError::warning(format!(
                "{} has none of the version(s) {}",
                id,
                versions.join(",")
            )));
        }
        self.update_issue(id, vec![FieldUpdate::set(kind.remote_field(), remaining)])
            .await
    }

    async fn get_available_transitions(&self, id: &str) -> Result<EntityMap> {
        let raw = self.call("getAvailableActions", vec![json!(id)]).await?;
        let transitions = entity_map_from(&raw);
        if transitions.is_empty() {
            return Err(AppError::cli(format!("No transitions found for issue {}", id)));
        }
        Ok(transitions)
    }

    #[instrument(skip(self))]
    async fn transition_issue(
        &self,
        id: &str,
        transition: &str,
        resolution: Option<&str>,
    ) -> Result<()> {
        let transitions = self.get_available_transitions(id).await?;
        let target = lookup(&transitions, transition).ok_or_else(|| {
            AppError::cli(format!(
                "Invalid transition '{}'. Use one of [{}]",
                transition,
                names(&transitions)
            ))
        })?;

        let mut fields = Vec::new();
        if let Some(resolution) = resolution {
            let resolutions = self.get_resolutions().await?;
            let resolved = lookup(&resolutions, resolution).ok_or_else(|| {
                AppError::usage(format!(
                    "Invalid resolution '{}'. Use one of [{}]",
                    resolution,
                    names(&resolutions)
                ))
            })?;
            fields.push(field_value("resolution", &json!(resolved.id)));
        }

        self.call(
            "progressWorkflowAction",
            vec![json!(id), json!(target.id), Value::Array(fields)],
        )
        .await?;
        Ok(())
    }

    /// Saved and favourite filters, cached together as one entry.
    async fn get_filters(&self) -> Result<EntityMap> {
        let describe = self.describe();
        let raw: Value = self
            .cache
            .cached(loader::FILTERS, &[describe.as_str()], || async {
                let mut filters = Vec::new();
                for method in ["getSavedFilters", "getFavouriteFilters"] {
                    if let Value::Array(found) = self.call(method, vec![]).await? {
                        filters.extend(found);
                    }
                }
                Ok::<_, AppError>(Value::Array(filters))
            })
            .await?;
        Ok(entity_map_from(&raw))
    }

    async fn get_projects(&self) -> Result<EntityMap> {
        let raw = self
            .cached_call(loader::PROJECTS, "getProjectsNoSchemes", vec![])
            .await?;
        Ok(entity_map_from(&raw))
    }

    async fn get_components(&self, project: &str) -> Result<EntityMap> {
        let raw = self
            .cached_call(loader::COMPONENTS, "getComponents", vec![json!(project)])
            .await?;
        Ok(entity_map_from(&raw))
    }

    async fn list_versions(&self, project: &str) -> Result<EntityMap> {
        let raw = self
            .cached_call(loader::VERSIONS, "getVersions", vec![json!(project)])
            .await?;
        Ok(entity_map_from(&raw))
    }

    async fn get_priorities(&self) -> Result<EntityMap> {
        let raw = self.cached_call(loader::PRIORITIES, "getPriorities", vec![]).await?;
        Ok(entity_map_from(&raw))
    }

    async fn get_issue_types(&self) -> Result<EntityMap> {
        let raw = self.cached_call(loader::ISSUE_TYPES, "getIssueTypes", vec![]).await?;
        Ok(entity_map_from(&raw))
    }

    async fn get_subtask_issue_types(&self) -> Result<EntityMap> {
        let raw = self
            .cached_call(loader::SUBTASK_TYPES, "getSubTaskIssueTypes", vec![])
            .await?;
        Ok(entity_map_from(&raw))
    }

    async fn get_statuses(&self) -> Result<EntityMap> {
        let raw = self.cached_call(loader::STATUSES, "getStatuses", vec![]).await?;
        Ok(entity_map_from(&raw))
    }

    async fn get_resolutions(&self) -> Result<EntityMap> {
        let raw = self.cached_call(loader::RESOLUTIONS, "getResolutions", vec![]).await?;
        Ok(entity_map_from(&raw))
    }

    async fn get_issue_comments(&self, id: &str) -> Result<Vec<Comment>> {
        let raw = self.call("getComments", vec![json!(id)]).await?;
        Ok(raw
            .as_array()
            .map(|arr| {
                arr.iter()
                    .map(|c| Comment {
                        author: text_of(c, "author"),
                        body: text_of(c, "body"),
                        created: text_of(c, "created"),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn add_comment(&self, id: &str, body: &str) -> Result<()> {
        self.call("addComment", vec![json!(id), json!({ "body": body })])
            .await?;
        Ok(())
    }

    #[instrument(skip(self, comment))]
    async fn log_work(
        &self,
        id: &str,
        spent: &str,
        comment: &str,
        remaining: Option<&str>,
    ) -> Result<()> {
        let worklog = json!({
            "timeSpent": spent,
            "comment": comment,
            "startDate": Utc::now().to_rfc3339(),
        });
        match remaining {
            Some(estimate) => {
                self.call(
                    "addWorklogWithNewRemainingEstimate",
                    vec![json!(id), worklog, json!(estimate)],
                )
                .await?
            }
            None => {
                self.call(
                    "addWorklogAndAutoAdjustRemainingEstimate",
                    vec![json!(id), worklog],
                )
                .await?
            }
        };
        Ok(())
    }

    async fn get_worklogs(&self, id: &str) -> Result<Vec<Worklog>> {
        let raw = self.call("getWorklogs", vec![json!(id)]).await?;
        Ok(raw
            .as_array()
            .map(|arr| {
                arr.iter()
                    .map(|w| Worklog {
                        author: text_of(w, "author"),
                        comment: text_of(w, "comment"),
                        created: text_of(w, "created"),
                        time_spent: text_of(w, "timeSpent"),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }
}
