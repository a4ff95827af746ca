//! Test doubles: scripted transports for both wire protocols and an
//! in-memory bridge for formatter and command tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{json, Value};

use super::entity::{index_by_name, lookup, names, Entity, EntityMap};
use super::issue::{Comment, FieldUpdate, Issue, NewIssue, VersionKind, Worklog};
use super::{JiraBridge, Protocol};
use crate::api::error::Result as ApiResult;
use crate::api::{ApiError, Auth, RestTransport, RpcTransport};
use crate::error::{AppError, Result};

pub(crate) const BASE_URL: &str = "https://jira.example.com";

/// What a scripted transport answers.
#[derive(Debug, Clone)]
pub(crate) enum Reply {
    Json(Value),
    /// An HTTP error status.
    Status(u16),
    /// A raw RPC fault string.
    Fault(String),
}

impl From<Value> for Reply {
    fn from(value: Value) -> Self {
        Reply::Json(value)
    }
}

impl Reply {
    fn answer(&self, context: &str) -> ApiResult<Value> {
        match self {
            Reply::Json(v) => Ok(v.clone()),
            Reply::Status(code) => Err(ApiError::from_status(
                StatusCode::from_u16(*code).unwrap(),
                context,
            )),
            Reply::Fault(raw) => Err(ApiError::fault(0, raw)),
        }
    }
}

/// A REST transport answering from a fixed route table.
///
/// Routes match on method and on the path without its query string.
pub(crate) struct ScriptedRest {
    routes: Vec<(String, String, Reply)>,
    calls: Mutex<Vec<(String, String, Option<Value>)>>,
    authenticated: bool,
}

impl ScriptedRest {
    pub fn new() -> Self {
        Self {
            routes: Vec::new(),
            calls: Mutex::new(Vec::new()),
            authenticated: false,
        }
    }

    pub fn on(mut self, method: &str, path: &str, reply: impl Into<Reply>) -> Self {
        self.routes
            .push((method.to_string(), path.to_string(), reply.into()));
        self
    }

    fn respond(&self, method: &str, path: &str, body: Option<&Value>) -> ApiResult<Value> {
        self.calls
            .lock()
            .unwrap()
            .push((method.to_string(), path.to_string(), body.cloned()));
        let route = path.split('?').next().unwrap_or_default();
        self.routes
            .iter()
            .find(|(m, p, _)| m == method && p == route)
            .map(|(_, _, reply)| reply.answer(path))
            .unwrap_or_else(|| Err(ApiError::NotFound(format!("no route for {} {}", method, path))))
    }

    /// POST and PUT calls in order: method, full path, body.
    pub fn writes(&self) -> Vec<(String, String, Value)> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, _, _)| m != "GET")
            .map(|(m, p, b)| (m.clone(), p.clone(), b.clone().unwrap_or(Value::Null)))
            .collect()
    }

    /// The full path of the last call to a route.
    pub fn last_path(&self, method: &str, route: &str) -> Option<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(m, p, _)| m == method && p.split('?').next() == Some(route))
            .map(|(_, p, _)| p.clone())
    }

    pub fn count(&self, method: &str, route: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, p, _)| m == method && p.split('?').next() == Some(route))
            .count()
    }
}

#[async_trait]
impl RestTransport for ScriptedRest {
    fn base_url(&self) -> &str {
        BASE_URL
    }

    fn authenticate(&mut self, _auth: Auth) {
        self.authenticated = true;
    }

    fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    async fn get(&self, path: &str) -> ApiResult<Value> {
        self.respond("GET", path, None)
    }

    async fn post(&self, path: &str, body: &Value) -> ApiResult<Value> {
        self.respond("POST", path, Some(body))
    }

    async fn put(&self, path: &str, body: &Value) -> ApiResult<Value> {
        self.respond("PUT", path, Some(body))
    }
}

/// An RPC transport answering from a method table.
pub(crate) struct ScriptedRpc {
    routes: Vec<(String, Reply)>,
    calls: Mutex<Vec<(String, Vec<Value>)>>,
}

impl ScriptedRpc {
    pub fn new() -> Self {
        Self {
            routes: Vec::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn on(mut self, method: &str, reply: impl Into<Reply>) -> Self {
        self.routes.push((method.to_string(), reply.into()));
        self
    }

    pub fn calls(&self) -> Vec<(String, Vec<Value>)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn methods(&self) -> Vec<String> {
        self.calls().into_iter().map(|(m, _)| m).collect()
    }
}

#[async_trait]
impl RpcTransport for ScriptedRpc {
    fn base_url(&self) -> &str {
        BASE_URL
    }

    async fn call(&self, method: &str, params: Vec<Value>) -> ApiResult<Value> {
        self.calls
            .lock()
            .unwrap()
            .push((method.to_string(), params));
        self.routes
            .iter()
            .find(|(m, _)| m == method)
            .map(|(_, reply)| reply.answer(method))
            .unwrap_or_else(|| {
                Err(ApiError::fault(
                    0,
                    &format!("NoSuchMethodException: no route for {}", method),
                ))
            })
    }
}

/// Build a canonical issue from a JSON object literal.
pub(crate) fn issue(value: Value) -> Issue {
    Issue::from_fields(value.as_object().cloned().unwrap_or_default())
}

fn entities(pairs: &[(&str, &str)]) -> EntityMap {
    index_by_name(pairs.iter().map(|(id, name)| Entity::new(*id, *name)))
}

/// An in-memory bridge with a small fixed reference set.
///
/// Writes are applied to the stored issues and recorded in `log`.
pub(crate) struct StubBridge {
    pub issues: Mutex<BTreeMap<String, Issue>>,
    pub comments: Mutex<HashMap<String, Vec<Comment>>>,
    pub worklogs: HashMap<String, Vec<Worklog>>,
    pub statuses: EntityMap,
    pub priorities: EntityMap,
    pub issue_types: EntityMap,
    pub subtask_types: EntityMap,
    pub resolutions: EntityMap,
    pub filters: EntityMap,
    pub projects: EntityMap,
    pub components: EntityMap,
    pub versions: EntityMap,
    pub transitions: EntityMap,
    pub log: Mutex<Vec<String>>,
}

impl StubBridge {
    pub fn new() -> Self {
        let mut project = Entity::new("10000", "Test Project");
        project.extra.insert("key".into(), json!("TP"));
        Self {
            issues: Mutex::new(BTreeMap::new()),
            comments: Mutex::new(HashMap::new()),
            worklogs: HashMap::new(),
            statuses: entities(&[
                ("1", "Open"),
                ("3", "In Progress"),
                ("5", "Resolved"),
                ("6", "Closed"),
                ("10001", "To Do"),
            ]),
            priorities: entities(&[("3", "Major"), ("4", "Minor")]),
            issue_types: entities(&[("1", "Bug"), ("6", "Epic"), ("7", "Story")]),
            subtask_types: entities(&[("5", "Sub-task")]),
            resolutions: entities(&[("1", "Fixed"), ("2", "Won't Fix")]),
            filters: entities(&[("10100", "Nightly")]),
            projects: index_by_name(vec![project]),
            components: entities(&[("10", "core"), ("11", "cli")]),
            versions: entities(&[("100", "1.0"), ("101", "1.1")]),
            transitions: entities(&[("4", "Start Progress"), ("5", "Resolve Issue")]),
            log: Mutex::new(Vec::new()),
        }
    }

    pub fn with_issue(self, issue: Issue) -> Self {
        self.issues
            .lock()
            .unwrap()
            .insert(issue.key().to_string(), issue);
        self
    }

    pub fn with_comment(self, key: &str, author: &str, body: &str, created: &str) -> Self {
        self.comments
            .lock()
            .unwrap()
            .entry(key.to_string())
            .or_default()
            .push(Comment {
                author: author.into(),
                body: body.into(),
                created: created.into(),
            });
        self
    }

    pub fn logged(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    fn record(&self, entry: String) {
        self.log.lock().unwrap().push(entry);
    }

    fn set_field(&self, id: &str, field: &str, value: Value) {
        let mut issues = self.issues.lock().unwrap();
        if let Some(existing) = issues.get(id) {
            let mut fields = existing.fields().clone();
            fields.insert(field.to_string(), value);
            issues.insert(id.to_string(), Issue::from_fields(fields));
        }
    }

    fn all(&self) -> Vec<Issue> {
        self.issues.lock().unwrap().values().cloned().collect()
    }
}

#[async_trait]
impl JiraBridge for StubBridge {
    fn base_url(&self) -> &str {
        BASE_URL
    }

    fn protocol(&self) -> Protocol {
        Protocol::Rest
    }

    async fn login(&mut self, username: &str, _password: &str) -> Result<()> {
        self.record(format!("login {}", username));
        Ok(())
    }

    async fn ping(&mut self) -> bool {
        true
    }

    async fn get_issue(&self, id: &str) -> Result<Option<Issue>> {
        Ok(self.issues.lock().unwrap().get(id).cloned())
    }

    async fn search_issues(
        &self,
        free_text: &str,
        _project: Option<&str>,
        _limit: usize,
    ) -> Result<Vec<Issue>> {
        self.record(format!("search {}", free_text));
        Ok(self
            .all()
            .into_iter()
            .filter(|i| i.text("summary").contains(free_text))
            .collect())
    }

    async fn search_issues_jql(
        &self,
        query: &str,
        _limit: usize,
        _project: Option<&str>,
    ) -> Result<Vec<Issue>> {
        self.record(format!("jql {}", query));
        match query.strip_prefix("parent=") {
            Some(parent) => Ok(self
                .all()
                .into_iter()
                .filter(|i| i.str("parent") == Some(parent))
                .collect()),
            None => Ok(self.all()),
        }
    }

    async fn get_issues_by_filter(&self, filters: &[String]) -> Result<Vec<Issue>> {
        for name in filters {
            if lookup(&self.filters, name).is_none() {
                return Err(AppError::usage(format!("filter {} not found", name)));
            }
        }
        Ok(self.all())
    }

    async fn create_issue(&self, new: NewIssue) -> Result<Issue> {
        let key = format!("{}-{}", new.project.to_uppercase(), self.issues.lock().unwrap().len() + 100);
        self.record(format!("create {} {} {}", key, new.issue_type, new.summary));
        let mut fields = new.extras.clone();
        fields.insert("key".into(), json!(key));
        fields.insert("summary".into(), json!(new.summary));
        fields.insert("description".into(), json!(new.description));
        fields.insert("status".into(), json!("1"));
        if let Some(t) = lookup(&self.issue_types, &new.issue_type)
            .or_else(|| lookup(&self.subtask_types, &new.issue_type))
        {
            fields.insert("type".into(), json!(t.id));
        }
        if let Some(parent) = &new.parent {
            fields.insert("parent".into(), json!(parent));
        }
        self.issues
            .lock()
            .unwrap()
            .insert(key.clone(), Issue::from_fields(fields));
        if let Some(assignee) = new.assignee.as_deref().filter(|a| !a.is_empty()) {
            self.assign_issue(&key, assignee).await?;
        }
        if let Some(reporter) = new.reporter.as_deref().filter(|r| !r.is_empty()) {
            self.change_reporter(&key, reporter).await?;
        }
        self.get_issue(&key)
            .await?
            .ok_or_else(|| AppError::cli("created issue vanished"))
    }

    async fn update_issue(&self, id: &str, updates: Vec<FieldUpdate>) -> Result<()> {
        for change in updates {
            match change {
                FieldUpdate::Set(field, value) => {
                    self.record(format!("update {} {}={}", id, field, value));
                    self.set_field(id, &field, value);
                }
                FieldUpdate::Add(field, value) => {
                    self.record(format!("update {} {}+={}", id, field, value))
                }
                FieldUpdate::Remove(field, value) => {
                    self.record(format!("update {} {}-={}", id, field, value))
                }
            }
        }
        Ok(())
    }

    async fn assign_issue(&self, id: &str, assignee: &str) -> Result<()> {
        self.record(format!("assign {} {}", id, assignee));
        self.set_field(id, "assignee", json!(assignee));
        Ok(())
    }

    async fn change_reporter(&self, id: &str, reporter: &str) -> Result<()> {
        self.record(format!("reporter {} {}", id, reporter));
        self.set_field(id, "reporter", json!(reporter));
        Ok(())
    }

    async fn add_labels(&self, id: &str, labels: &[String]) -> Result<()> {
        let existing = self
            .get_issue(id)
            .await?
            .map(|i| i.labels())
            .unwrap_or_default();
        if labels.iter().all(|l| existing.contains(l)) {
            return Err(AppError::warning(format!(
                "{} already has the label(s) {}",
                id,
                labels.join(",")
            )));
        }
        self.record(format!("labels {} {}", id, labels.join(",")));
        Ok(())
    }

    async fn add_versions(&self, id: &str, versions: &[String], kind: VersionKind) -> Result<()> {
        self.record(format!(
            "add {} {} {}",
            kind.remote_field(),
            id,
            versions.join(",")
        ));
        Ok(())
    }

    async fn remove_versions(
        &self,
        id: &str,
        versions: &[String],
        kind: VersionKind,
    ) -> Result<()> {
        let present = self
            .get_issue(id)
            .await?
            .map(|i| i.refs(kind.canonical_field()))
            .unwrap_or_default();
        if !present
            .iter()
            .any(|v| versions.iter().any(|name| name.eq_ignore_ascii_case(&v.name)))
        {
            return Err(AppError::warning(format!(
                "{} has none of the version(s) {}",
                id,
                versions.join(",")
            )));
        }
        self.record(format!(
            "remove {} {} {}",
            kind.remote_field(),
            id,
            versions.join(",")
        ));
        Ok(())
    }

    async fn get_available_transitions(&self, _id: &str) -> Result<EntityMap> {
        Ok(self.transitions.clone())
    }

    async fn transition_issue(
        &self,
        id: &str,
        transition: &str,
        resolution: Option<&str>,
    ) -> Result<()> {
        if lookup(&self.transitions, transition).is_none() {
            return Err(AppError::cli(format!(
                "Invalid transition '{}'. Use one of [{}]",
                transition,
                names(&self.transitions)
            )));
        }
        self.record(format!(
            "transition {} {} {}",
            id,
            transition.to_lowercase(),
            resolution.unwrap_or("-")
        ));
        Ok(())
    }

    async fn get_filters(&self) -> Result<EntityMap> {
        Ok(self.filters.clone())
    }

    async fn get_projects(&self) -> Result<EntityMap> {
        Ok(self.projects.clone())
    }

    async fn get_components(&self, _project: &str) -> Result<EntityMap> {
        Ok(self.components.clone())
    }

    async fn list_versions(&self, _project: &str) -> Result<EntityMap> {
        Ok(self.versions.clone())
    }

    async fn get_priorities(&self) -> Result<EntityMap> {
        Ok(self.priorities.clone())
    }

    async fn get_issue_types(&self) -> Result<EntityMap> {
        Ok(self.issue_types.clone())
    }

    async fn get_subtask_issue_types(&self) -> Result<EntityMap> {
        Ok(self.subtask_types.clone())
    }

    async fn get_statuses(&self) -> Result<EntityMap> {
        Ok(self.statuses.clone())
    }

    async fn get_resolutions(&self) -> Result<EntityMap> {
        Ok(self.resolutions.clone())
    }

    async fn get_issue_comments(&self, id: &str) -> Result<Vec<Comment>> {
        Ok(self
            .comments
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .unwrap_or_default())
    }

    async fn add_comment(&self, id: &str, body: &str) -> Result<()> {
        self.record(format!("comment {} {}", id, body));
        self.comments
            .lock()
            .unwrap()
            .entry(id.to_string())
            .or_default()
            .push(Comment {
                author: "admin".into(),
                body: body.into(),
                created: "2024-01-01".into(),
            });
        Ok(())
    }

    async fn log_work(
        &self,
        id: &str,
        spent: &str,
        comment: &str,
        remaining: Option<&str>,
    ) -> Result<()> {
        self.record(format!(
            "worklog {} {} {} {}",
            id,
            spent,
            comment,
            remaining.unwrap_or("auto")
        ));
        Ok(())
    }

    async fn get_worklogs(&self, id: &str) -> Result<Vec<Worklog>> {
        Ok(self.worklogs.get(id).cloned().unwrap_or_default())
    }
}
