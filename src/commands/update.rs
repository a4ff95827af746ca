use std::io::Write;

use serde_json::{json, Value};

use super::{extract_extras, project_of, Session};
use crate::bridge::{lookup, names, FieldUpdate, VersionKind};
use crate::error::{AppError, Result};

/// Change an existing issue.
///
/// Comment, priority, components, transition, assignee and labels are
/// alternatives: the first one given is applied. Extra fields are set first
/// and version changes last, independently of the others.
#[derive(Debug, Clone, Default)]
pub struct UpdateCommand {
    pub issue: String,
    /// `Some(None)` asks for the comment in the editor.
    pub comment: Option<Option<String>>,
    pub priority: Option<String>,
    pub components: Vec<String>,
    pub transition: Option<String>,
    pub resolution: Option<String>,
    pub assignee: Option<String>,
    pub labels: Vec<String>,
    pub affects_versions: Vec<String>,
    pub remove_affects_versions: Vec<String>,
    pub fix_versions: Vec<String>,
    pub remove_fix_versions: Vec<String>,
    pub extras: Vec<String>,
}

impl UpdateCommand {
    pub async fn run<W: Write>(&self, session: &mut Session<'_, W>) -> Result<()> {
        let bridge = session.bridge;
        let palette = session.palette();
        let id = self.issue.as_str();

        if !self.extras.is_empty() {
            let updates = extract_extras(&self.extras)?
                .into_iter()
                .map(|(field, value)| FieldUpdate::Set(field, value))
                .collect();
            bridge.update_issue(id, updates).await?;
        }

        if let Some(comment) = &self.comment {
            let body = session.text_or_editor(comment.as_deref())?;
            bridge.add_comment(id, &body).await?;
            if let Some(issue) = bridge.get_issue(id).await? {
                let text = session.formatter().format_comments(&issue).await?;
                session.say(&text)?;
            }
        } else if let Some(priority) = &self.priority {
            let priorities = bridge.get_priorities().await?;
            let entity = lookup(&priorities, priority).ok_or_else(|| {
                AppError::usage(format!(
                    "Invalid priority '{}'. Use one of [{}]",
                    priority,
                    names(&priorities)
                ))
            })?;
            bridge
                .update_issue(id, vec![FieldUpdate::set("priority", json!({ "id": entity.id }))])
                .await?;
        } else if !self.components.is_empty() {
            self.add_components(session).await?;
        } else if let Some(transition) = &self.transition {
            bridge
                .transition_issue(id, &transition.to_lowercase(), self.resolution.as_deref())
                .await?;
            session.say(&palette.green(&format!("{} transitioned to \"{}\"", id, transition)))?;
        } else if let Some(assignee) = &self.assignee {
            bridge.assign_issue(id, assignee).await?;
            session.say(&palette.green(&format!("{} assigned to {}", id, assignee)))?;
        } else if !self.labels.is_empty() {
            bridge.add_labels(id, &self.labels).await?;
            session.say(&palette.green(&format!(
                "{} labelled with {}",
                id,
                self.labels.join(",")
            )))?;
        }

        let version_changes = [
            (&self.affects_versions, VersionKind::Affects, true),
            (&self.remove_affects_versions, VersionKind::Affects, false),
            (&self.fix_versions, VersionKind::Fix, true),
            (&self.remove_fix_versions, VersionKind::Fix, false),
        ];
        for (versions, kind, add) in version_changes {
            if versions.is_empty() {
                continue;
            }
            let label = match kind {
                VersionKind::Affects => "affected",
                VersionKind::Fix => "fixed",
            };
            let message = if add {
                bridge.add_versions(id, versions, kind).await?;
                palette.green(&format!(
                    "Added {} version(s) {} to {}",
                    label,
                    versions.join(","),
                    id
                ))
            } else {
                bridge.remove_versions(id, versions, kind).await?;
                palette.blue(&format!(
                    "Removed {} version(s) {} from {}",
                    label,
                    versions.join(","),
                    id
                ))
            };
            session.say(&message)?;
        }
        Ok(())
    }

    async fn add_components<W: Write>(&self, session: &mut Session<'_, W>) -> Result<()> {
        let bridge = session.bridge;
        let id = self.issue.as_str();
        let project = project_of(id);
        let valid = bridge.get_components(project).await?;
        let issue = bridge
            .get_issue(id)
            .await?
            .ok_or_else(|| AppError::usage(format!("issue {} not found", id)))?;
        let current = issue.refs("components");
        let has = |name: &str| current.iter().any(|c| c.name.eq_ignore_ascii_case(name));
        if self.components.iter().all(|name| has(name.as_str())) {
            return Err(AppError::warning(format!(
                "component(s):[{}] already exist in {}",
                self.components.join(","),
                id
            )));
        }

        let mut ids: Vec<Value> = current.iter().map(|c| json!({ "id": c.id })).collect();
        for name in self.components.iter().filter(|name| !has(name.as_str())) {
            let component = lookup(&valid, name).ok_or_else(|| {
                AppError::usage(format!(
                    "components for project {} should be one of {{{}}}",
                    project,
                    names(&valid)
                ))
            })?;
            ids.push(json!({ "id": component.id }));
        }
        bridge
            .update_issue(id, vec![FieldUpdate::set("components", Value::Array(ids))])
            .await?;
        let message = session.palette().green(&format!(
            "component(s): {} added to {}",
            self.components.join(","),
            id
        ));
        session.say(&message)
    }
}
