use std::fmt;
use std::io::Write;

use clap::ValueEnum;
use colored::Color;

use super::Session;
use crate::bridge::EntityMap;
use crate::error::{AppError, Result};

/// What `list` can show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ListKind {
    Filters,
    Projects,
    #[value(name = "issue_types", alias = "issue-types")]
    IssueTypes,
    #[value(name = "subtask_types", alias = "subtask-types")]
    SubtaskTypes,
    Priorities,
    Statuses,
    Components,
    Versions,
    Resolutions,
    Transitions,
}

impl ListKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListKind::Filters => "filters",
            ListKind::Projects => "projects",
            ListKind::IssueTypes => "issue_types",
            ListKind::SubtaskTypes => "subtask_types",
            ListKind::Priorities => "priorities",
            ListKind::Statuses => "statuses",
            ListKind::Components => "components",
            ListKind::Versions => "versions",
            ListKind::Resolutions => "resolutions",
            ListKind::Transitions => "transitions",
        }
    }
}

impl fmt::Display for ListKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// List reference data.
#[derive(Debug, Clone)]
pub struct ListCommand {
    pub kind: ListKind,
    /// Needed for components and versions.
    pub project: Option<String>,
    /// Needed for transitions.
    pub issue: Option<String>,
}

impl ListCommand {
    pub async fn run<W: Write>(&self, session: &mut Session<'_, W>) -> Result<()> {
        let bridge = session.bridge;
        let entities: EntityMap = match self.kind {
            ListKind::Filters => bridge.get_filters().await?,
            ListKind::Projects => bridge.get_projects().await?,
            ListKind::IssueTypes => bridge.get_issue_types().await?,
            ListKind::SubtaskTypes => bridge.get_subtask_issue_types().await?,
            ListKind::Priorities => bridge.get_priorities().await?,
            ListKind::Statuses => bridge.get_statuses().await?,
            ListKind::Resolutions => bridge.get_resolutions().await?,
            ListKind::Components => {
                bridge
                    .get_components(self.required(&self.project, "project")?)
                    .await?
            }
            ListKind::Versions => {
                bridge
                    .list_versions(self.required(&self.project, "project")?)
                    .await?
            }
            ListKind::Transitions => {
                bridge
                    .get_available_transitions(self.required(&self.issue, "issue")?)
                    .await?
            }
        };
        if entities.is_empty() {
            return Err(AppError::warning(format!("No {} found.", self.kind)));
        }

        let palette = session.palette();
        for entity in entities.values() {
            let mut line = palette.paint(&entity.name, Color::White);
            if let Some(key) = entity.key() {
                line.push_str(&format!(" [{}]", palette.paint(key, Color::Magenta)));
            }
            if let Some(description) = entity.description() {
                line.push_str(&format!(" [{}]", palette.green(description)));
            }
            session.say(&line)?;
        }
        Ok(())
    }

    fn required<'v>(&self, value: &'v Option<String>, flag: &str) -> Result<&'v str> {
        value.as_deref().filter(|v| !v.is_empty()).ok_or_else(|| {
            AppError::usage(format!(
                "'--{}' is required for listing '{}'",
                flag, self.kind
            ))
        })
    }
}
