//! Bridge over the JIRA REST API v2.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::{debug, info, instrument};

use super::entity::{entity_map_from, lookup, names, Entity, EntityMap};
use super::issue::{
    clean_fields, Comment, FieldUpdate, Issue, NewIssue, VersionKind, Worklog, EPIC_NAME_FIELD,
    REST_FIELDS,
};
use super::{free_text_jql, scope_jql, JiraBridge, Protocol, DEFAULT_SEARCH_LIMIT};
use crate::api::{ApiError, Auth, RestClient, RestTransport};
use crate::cache::{loader, CacheStore};
use crate::error::{AppError, Result};

/// The REST protocol bridge.
pub struct RestBridge<T: RestTransport = RestClient> {
    transport: T,
    cache: CacheStore,
}

impl<T: RestTransport> RestBridge<T> {
    pub fn new(transport: T, cache: CacheStore) -> Self {
        Self { transport, cache }
    }

    /// Memoize a GET of reference data.
    async fn cached_get(&self, name: &str, path: &str, scope: &[&str]) -> Result<Value> {
        let describe = self.describe();
        let mut args = vec![describe.as_str()];
        args.extend_from_slice(scope);
        let transport = &self.transport;
        self.cache
            .cached(name, &args, move || async move {
                transport.get(path).await.map_err(AppError::from)
            })
            .await
    }

    /// Issue types split by whether they are subtask types.
    ///
    /// REST serves both kinds from one resource; each half is cached under
    /// its own loader name.
    async fn issue_types_where(&self, subtask: bool) -> Result<EntityMap> {
        let name = if subtask {
            loader::SUBTASK_TYPES
        } else {
            loader::ISSUE_TYPES
        };
        let describe = self.describe();
        let transport = &self.transport;
        let raw: Value = self
            .cache
            .cached(name, &[describe.as_str()], move || async move {
                let all = transport.get("issuetype").await?;
                let kept: Vec<Value> = all
                    .as_array()
                    .into_iter()
                    .flatten()
                    .filter(|t| Entity::from_value(t).is_some_and(|e| e.is_subtask() == subtask))
                    .cloned()
                    .collect();
                Ok::<_, AppError>(Value::Array(kept))
            })
            .await?;
        Ok(entity_map_from(&raw))
    }

    async fn version_ids(&self, id: &str, versions: &[String]) -> Result<Vec<String>> {
        let project = id.split('-').next().unwrap_or_default();
        let known = self.list_versions(project).await?;
        versions
            .iter()
            .map(|name| {
                lookup(&known, name).map(|v| v.id.clone()).ok_or_else(|| {
                    AppError::usage(format!("{} is not a valid version for issue {}", name, id))
                })
            })
            .collect()
    }
}

/// Reduce a REST issue (`{id, key, fields}`) to its canonical form.
pub(crate) fn clean_issue(raw: &Value) -> Issue {
    let empty = Map::new();
    let fields = raw.get("fields").and_then(Value::as_object).unwrap_or(&empty);
    let mut out = clean_fields(fields, REST_FIELDS);
    for envelope in ["id", "key"] {
        if let Some(v) = raw.get(envelope).filter(|v| !v.is_null()) {
            out.insert(envelope.to_string(), v.clone());
        }
    }
    if let Some(issuetype) = out.get("issuetype").cloned() {
        out.insert("type".to_string(), issuetype);
    }
    Issue::from_fields(out)
}

fn username(user: &Value) -> String {
    ["name", "accountId", "displayName"]
        .iter()
        .find_map(|k| user.get(*k).and_then(Value::as_str))
        .unwrap_or_default()
        .to_string()
}

fn text_of(value: &Value, field: &str) -> String {
    value
        .get(field)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Map a failed login call onto the two login error kinds.
fn login_error(err: ApiError) -> AppError {
    match err {
        ApiError::Unauthorized | ApiError::Forbidden => {
            AppError::Authentication("failure to authenticate".to_string())
        }
        other => {
            debug!("Login failed: {}", other);
            AppError::Initialization("failure to communicate with jira".to_string())
        }
    }
}

/// Translate updates into the REST `{fields, update}` edit body.
fn edit_body(updates: Vec<FieldUpdate>) -> Value {
    let mut fields = Map::new();
    let mut update: Map<String, Value> = Map::new();
    for change in updates {
        match change {
            FieldUpdate::Set(field, value) => {
                fields.insert(field, value);
            }
            FieldUpdate::Add(field, value) => push_op(&mut update, field, "add", value),
            FieldUpdate::Remove(field, value) => push_op(&mut update, field, "remove", value),
        }
    }
    let mut body = Map::new();
    if !fields.is_empty() {
        body.insert("fields".to_string(), Value::Object(fields));
    }
    if !update.is_empty() {
        body.insert("update".to_string(), Value::Object(update));
    }
    Value::Object(body)
}

fn push_op(update: &mut Map<String, Value>, field: String, op: &str, value: Value) {
    let ops = update
        .entry(field)
        .or_insert_with(|| Value::Array(Vec::new()));
    if let Value::Array(list) = ops {
        let mut entry = Map::new();
        entry.insert(op.to_string(), value);
        list.push(Value::Object(entry));
    }
}

#[async_trait]
impl<T: RestTransport> JiraBridge for RestBridge<T> {
    fn base_url(&self) -> &str {
        self.transport.base_url()
    }

    fn protocol(&self) -> Protocol {
        Protocol::Rest
    }

    #[instrument(skip(self, password))]
    async fn login(&mut self, username: &str, password: &str) -> Result<()> {
        self.transport.authenticate(Auth::new(username, password));
        self.transport.get("myself").await.map_err(login_error)?;
        info!("Logged in to {} as {}", self.base_url(), username);
        Ok(())
    }

    async fn ping(&mut self) -> bool {
        self.transport.is_authenticated() && self.transport.get("myself").await.is_ok()
    }

    #[instrument(skip(self))]
    async fn get_issue(&self, id: &str) -> Result<Option<Issue>> {
        match self.transport.get(&format!("issue/{}", id)).await {
            Ok(raw) => Ok(Some(clean_issue(&raw))),
            Err(e) if e.is_not_found() => {
                debug!("Issue {} not found", id);
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
        self.search_issues_jql(&free_text_jql(free_text, project), limit, None)
            .await
    }

    #[instrument(skip(self))]
    async fn search_issues_jql(
        &self,
        query: &str,
        limit: usize,
        project: Option<&str>,
    ) -> Result<Vec<Issue>> {
        let jql = scope_jql(query, project);
        let path = format!(
            "search?jql={}&maxResults={}&fields=*all",
            urlencoding::encode(&jql),
            limit
        );
        let result = self.transport.get(&path).await?;
        let issues: Vec<Issue> = result
            .get("issues")
            .and_then(Value::as_array)
            .map(|arr| arr.iter().map(clean_issue).collect())
            .unwrap_or_default();
        debug!("Found {} issues", issues.len());
        Ok(issues)
    }

    async fn get_issues_by_filter(&self, filters: &[String]) -> Result<Vec<Issue>> {
        let known = self.get_filters().await?;
        let mut issues = Vec::new();
        for name in filters {
            let filter = lookup(&known, name)
                .ok_or_else(|| AppError::usage(format!("filter {} not found", name)))?;
            let query = format!("filter={}", filter.id);
            issues.extend(
                self.search_issues_jql(&query, DEFAULT_SEARCH_LIMIT, None)
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

        let mut fields = Map::new();
        fields.insert("project".into(), json!({ "key": issue.project.to_uppercase() }));
        fields.insert("summary".into(), json!(issue.summary));
        fields.insert("description".into(), json!(issue.description));
        fields.insert("priority".into(), json!({ "id": priority.id }));
        fields.insert("issuetype".into(), json!({ "id": issue_type.id }));
        if issue.issue_type.eq_ignore_ascii_case("epic") {
            fields.insert(EPIC_NAME_FIELD.into(), json!(issue.summary));
        }
        if let Some(parent) = &issue.parent {
            fields.insert("parent".into(), json!({ "key": parent }));
        }
        if !issue.labels.is_empty() {
            fields.insert("labels".into(), json!(issue.labels));
        }
        if !issue.components.is_empty() {
            let components: Vec<Value> = issue
                .components
                .iter()
                .map(|(_, id)| json!({ "id": id }))
                .collect();
            fields.insert("components".into(), Value::Array(components));
        }
        fields.extend(issue.extras);

        let created = self
            .transport
            .post("issue", &json!({ "fields": fields }))
            .await?;
        let key = text_of(&created, "key");
        info!("Created issue {}", key);

        if let Some(assignee) = issue.assignee.as_deref().filter(|a| !a.is_empty()) {
            self.assign_issue(&key, assignee).await?;
        }
        if let Some(reporter) = issue.reporter.as_deref().filter(|r| !r.is_empty()) {
            self.change_reporter(&key, reporter).await?;
        }

        self.get_issue(&key)
            .await?
            .ok_or_else(|| AppError::cli(format!("created issue {} could not be read back", key)))
    }

    #[instrument(skip(self, updates))]
    async fn update_issue(&self, id: &str, updates: Vec<FieldUpdate>) -> Result<()> {
        if updates.is_empty() {
            return Ok(());
        }
        self.transport
            .put(&format!("issue/{}", id), &edit_body(updates))
            .await?;
        Ok(())
    }

    async fn assign_issue(&self, id: &str, assignee: &str) -> Result<()> {
        self.transport
            .put(&format!("issue/{}/assignee", id), &json!({ "name": assignee }))
            .await?;
        Ok(())
    }

    async fn change_reporter(&self, id: &str, reporter: &str) -> Result<()> {
        self.update_issue(id, vec![FieldUpdate::set("reporter", json!({ "name": reporter }))])
            .await
    }

    async fn add_labels(&self, id: &str, labels: &[String]) -> Result<()> {
        let existing = self
            .get_issue(id)
            .await?
            .map(|issue| issue.labels())
            .unwrap_or_default();
        let missing: Vec<&String> = labels.iter().filter(|l| !existing.contains(l)).collect();
        if missing.is_empty() {
            return Err(AppError::warning(format!(
                "{} already has the label(s) {}",
                id,
                labels.join(",")
            )));
        }
        let updates = missing
            .into_iter()
            .map(|label| FieldUpdate::add("labels", label.as_str()))
            .collect();
        self.update_issue(id, updates).await
    }

    async fn add_versions(&self, id: &str, versions: &[String], kind: VersionKind) -> Result<()> {
        let ids = self.version_ids(id, versions).await?;
        let updates = ids
            .into_iter()
            .map(|vid| FieldUpdate::add(kind.remote_field(), json!({ "id": vid })))
            .collect();
        self.update_issue(id, updates).await
    }

    async fn remove_versions(
        &self,
        id: &str,
        versions: &[String],
        kind: VersionKind,
    ) -> Result<()> {
        let Some(issue) = self.get_issue(id).await? else {
            return Err(AppError::usage(format!("issue {} not found", id)));
        };
        let updates: Vec<FieldUpdate> = issue
            .refs(kind.canonical_field())
            .into_iter()
            .filter(|v| versions.iter().any(|name| name.eq_ignore_ascii_case(&v.name)))
            .map(|v| FieldUpdate::remove(kind.remote_field(), json!({ "id": v.id })))
            .collect();
        if updates.is_empty() {
            return Err(AppError::warning(format!(
                "{} has none of the version(s) {}",
                id,
                versions.join(",")
            )));
        }
        self.update_issue(id, updates).await
    }

    async fn get_available_transitions(&self, id: &str) -> Result<EntityMap> {
        let raw = self
            .transport
            .get(&format!("issue/{}/transitions", id))
            .await?;
        Ok(entity_map_from(raw.get("transitions").unwrap_or(&Value::Null)))
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

        let mut body = json!({ "transition": { "id": target.id } });
        if let Some(resolution) = resolution {
            let resolutions = self.get_resolutions().await?;
            let resolved = lookup(&resolutions, resolution).ok_or_else(|| {
                AppError::usage(format!(
                    "Invalid resolution '{}'. Use one of [{}]",
                    resolution,
                    names(&resolutions)
                ))
            })?;
            body["fields"] = json!({ "resolution": { "id": resolved.id } });
        }

        self.transport
            .post(&format!("issue/{}/transitions", id), &body)
            .await?;
        Ok(())
    }

    async fn get_filters(&self) -> Result<EntityMap> {
        let raw = self.cached_get(loader::FILTERS, "filter/favourite", &[]).await?;
        Ok(entity_map_from(&raw))
    }

    async fn get_projects(&self) -> Result<EntityMap> {
        let raw = self.cached_get(loader::PROJECTS, "project", &[]).await?;
        Ok(entity_map_from(&raw))
    }

    async fn get_components(&self, project: &str) -> Result<EntityMap> {
        let path = format!("project/{}/components", project);
        let raw = self.cached_get(loader::COMPONENTS, &path, &[project]).await?;
        Ok(entity_map_from(&raw))
    }

    async fn list_versions(&self, project: &str) -> Result<EntityMap> {
        let path = format!("project/{}/versions", project);
        let raw = self.cached_get(loader::VERSIONS, &path, &[project]).await?;
        Ok(entity_map_from(&raw))
    }

    async fn get_priorities(&self) -> Result<EntityMap> {
        let raw = self.cached_get(loader::PRIORITIES, "priority", &[]).await?;
        Ok(entity_map_from(&raw))
    }

    async fn get_issue_types(&self) -> Result<EntityMap> {
        self.issue_types_where(false).await
    }

    async fn get_subtask_issue_types(&self) -> Result<EntityMap> {
        self.issue_types_where(true).await
    }

    async fn get_statuses(&self) -> Result<EntityMap> {
        let raw = self.cached_get(loader::STATUSES, "status", &[]).await?;
        Ok(entity_map_from(&raw))
    }

    async fn get_resolutions(&self) -> Result<EntityMap> {
        let raw = self.cached_get(loader::RESOLUTIONS, "resolution", &[]).await?;
        Ok(entity_map_from(&raw))
    }

    async fn get_issue_comments(&self, id: &str) -> Result<Vec<Comment>> {
        let raw = self.transport.get(&format!("issue/{}/comment", id)).await?;
        Ok(raw
            .get("comments")
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .map(|c| Comment {
                        author: c.get("author").map(username).unwrap_or_default(),
                        body: text_of(c, "body"),
                        created: text_of(c, "created"),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn add_comment(&self, id: &str, body: &str) -> Result<()> {
        self.transport
            .post(&format!("issue/{}/comment", id), &json!({ "body": body }))
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
        let adjust = match remaining {
            Some(estimate) => format!(
                "adjustEstimate=new&newEstimate={}",
                urlencoding::encode(estimate)
            ),
            None => "adjustEstimate=auto".to_string(),
        };
        self.transport
            .post(
                &format!("issue/{}/worklog?{}", id, adjust),
                &json!({ "timeSpent": spent, "comment": comment }),
            )
            .await?;
        Ok(())
    }

    async fn get_worklogs(&self, id: &str) -> Result<Vec<Worklog>> {
        let raw = self.transport.get(&format!("issue/{}/worklog", id)).await?;
        Ok(raw
            .get("worklogs")
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .map(|w| Worklog {
                        author: w.get("author").map(username).unwrap_or_default(),
                        comment: text_of(w, "comment"),
                        created: text_of(w, "created"),
                        time_spent: text_of(w, "timeSpent"),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }
}
