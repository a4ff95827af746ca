use std::io::Write;

use super::{extract_extras, Session};
use crate::bridge::{lookup, names, DisplayMode, NewIssue};
use crate::error::{AppError, Result};

/// Create an issue.
#[derive(Debug, Clone, Default)]
pub struct AddCommand {
    pub title: String,
    pub project: Option<String>,
    /// Defaults to `bug`, or `sub-task` when a parent is given.
    pub issue_type: Option<String>,
    pub priority: Option<String>,
    /// Composed in the editor when absent.
    pub description: Option<String>,
    pub parent: Option<String>,
    pub assignee: Option<String>,
    pub reporter: Option<String>,
    pub labels: Vec<String>,
    pub components: Vec<String>,
    pub extras: Vec<String>,
}

impl AddCommand {
    pub async fn run<W: Write>(&self, session: &mut Session<'_, W>) -> Result<()> {
        let bridge = session.bridge;
        let extras = extract_extras(&self.extras)?;
        let project = self
            .project
            .as_deref()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| AppError::usage("project must be specified when creating an issue"))?;

        let issue_type = match (&self.issue_type, &self.parent) {
            (Some(t), _) => t.to_lowercase(),
            (None, Some(_)) => "sub-task".to_string(),
            (None, None) => "bug".to_string(),
        };
        let types = bridge.get_issue_types().await?;
        let subtask_types = bridge.get_subtask_issue_types().await?;
        if lookup(&types, &issue_type).is_none() && lookup(&subtask_types, &issue_type).is_none() {
            return Err(AppError::usage(format!(
                "invalid issue type: {} (try using jiracli list issue_types or jiracli list subtask_types)",
                issue_type
            )));
        }
        if self.parent.is_some() && lookup(&subtask_types, &issue_type).is_none() {
            return Err(AppError::usage(format!(
                "issues created with parents must be one of {{{}}}",
                names(&subtask_types)
            )));
        }

        let mut components = Vec::with_capacity(self.components.len());
        if !self.components.is_empty() {
            let valid = bridge.get_components(project).await?;
            for name in &self.components {
                let component = lookup(&valid, name).ok_or_else(|| {
                    AppError::usage(format!(
                        "components for project {} should be one of {{{}}}",
                        project,
                        names(&valid)
                    ))
                })?;
                components.push((component.name.clone(), component.id.clone()));
            }
        }

        let description = session.text_or_editor(self.description.as_deref())?;
        let created = bridge
            .create_issue(NewIssue {
                project: project.to_string(),
                issue_type,
                summary: self.title.clone(),
                description,
                priority: self.priority.clone().unwrap_or_else(|| "minor".to_string()),
                parent: self.parent.clone(),
                assignee: self.assignee.clone(),
                reporter: self.reporter.clone(),
                labels: self.labels.clone(),
                components,
                extras,
            })
            .await?;
        let text = session
            .formatter()
            .format(&created, DisplayMode::Minimal)
            .await?;
        session.say(&text)
    }
}
