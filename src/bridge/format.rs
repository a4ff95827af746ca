//! Rendering canonical issues as text.

use std::collections::HashMap;
use std::io;

use colored::{Color, Colorize};
use is_terminal::IsTerminal;
use regex::Regex;

use super::entity::{object_from_key, RefKind};
use super::issue::Issue;
use super::JiraBridge;
use crate::error::{AppError, Result};

const LABEL_WIDTH: usize = 20;
const DESCRIPTION_INDENT: usize = LABEL_WIDTH + 3;
const TOKEN_PATTERN: &str = r"%([A-Za-z0-9_]+)";

/// The colour a status name renders in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusColor {
    Green,
    Red,
    Blue,
}

impl StatusColor {
    /// Classify a status name, case-insensitively.
    pub fn classify(status: &str) -> Self {
        match status.trim().to_lowercase().as_str() {
            "resolved" | "closed" | "done" => StatusColor::Green,
            "open" | "unassigned" | "reopened" | "to do" => StatusColor::Red,
            _ => StatusColor::Blue,
        }
    }
}

/// Terminal colours, or none at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    enabled: bool,
}

impl Palette {
    /// Colour when stdout is a terminal and `NO_COLOR` is unset.
    pub fn detect() -> Self {
        Self {
            enabled: io::stdout().is_terminal() && std::env::var_os("NO_COLOR").is_none(),
        }
    }

    pub fn plain() -> Self {
        Self { enabled: false }
    }

    pub fn colored() -> Self {
        Self { enabled: true }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// `text` in `color`, or unchanged when colour is off.
    pub fn paint(&self, text: &str, color: Color) -> String {
        if self.enabled {
            text.color(color).to_string()
        } else {
            text.to_string()
        }
    }

    pub fn status(&self, text: &str, color: StatusColor) -> String {
        let color = match color {
            StatusColor::Green => Color::Green,
            StatusColor::Red => Color::Red,
            StatusColor::Blue => Color::Blue,
        };
        self.paint(text, color)
    }

    pub fn link(&self, url: &str) -> String {
        if self.enabled {
            url.white().underline().to_string()
        } else {
            url.to_string()
        }
    }

    pub fn red(&self, text: &str) -> String {
        self.paint(text, Color::Red)
    }

    pub fn green(&self, text: &str) -> String {
        self.paint(text, Color::Green)
    }

    pub fn blue(&self, text: &str) -> String {
        self.paint(text, Color::Blue)
    }

    pub fn yellow(&self, text: &str) -> String {
        self.paint(text, Color::Yellow)
    }
}

/// How much of an issue to show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DisplayMode {
    /// Key, summary and link on one line.
    Oneline,
    /// Key, status, people, summary and link.
    Minimal,
    /// Minimal plus description, priority, type and comments.
    Verbose,
    /// Verbose plus an indented description and the subtasks.
    Detailed,
}

impl DisplayMode {
    /// Map a numeric verbosity (`< 0`, `0`, `1`, `> 1`) to a mode.
    pub fn from_level(level: i32) -> Self {
        match level {
            l if l < 0 => DisplayMode::Oneline,
            0 => DisplayMode::Minimal,
            1 => DisplayMode::Verbose,
            _ => DisplayMode::Detailed,
        }
    }
}

/// Renders issues of one bridge.
pub struct IssueFormatter<'a> {
    bridge: &'a dyn JiraBridge,
    palette: Palette,
}

impl<'a> IssueFormatter<'a> {
    pub fn new(bridge: &'a dyn JiraBridge, palette: Palette) -> Self {
        Self { bridge, palette }
    }

    pub fn palette(&self) -> Palette {
        self.palette
    }

    /// Render an issue, honouring a template or comments-only request first.
    pub async fn render(
        &self,
        issue: &Issue,
        mode: DisplayMode,
        template: Option<&str>,
        comments_only: bool,
    ) -> Result<String> {
        if let Some(template) = template {
            return self.format_template(issue, template).await;
        }
        if comments_only {
            return self.format_comments(issue).await;
        }
        self.format(issue, mode).await
    }

    /// Render an issue in one of the display modes.
    pub async fn format(&self, issue: &Issue, mode: DisplayMode) -> Result<String> {
        let status = self.resolve(RefKind::Status, issue.str("status")).await?;
        let color = StatusColor::classify(&status);
        let link = self.palette.link(&self.browse_url(issue.key()));

        if mode == DisplayMode::Oneline {
            let mut line = format!(
                "{} {} {}",
                self.palette.status(issue.key(), color),
                issue.text("summary"),
                link
            );
            if !self.palette.enabled() {
                line.push_str(&format!(" [{}]", status));
            }
            return Ok(line);
        }

        let mut fields = vec![
            ("issue", issue.key().to_string()),
            ("status", self.palette.status(&status, color)),
            ("reporter", issue.text("reporter")),
            ("assignee", issue.text("assignee")),
            ("summary", issue.text("summary")),
            ("link", link),
        ];
        if mode >= DisplayMode::Verbose {
            let description = issue.text("description");
            let description = if mode == DisplayMode::Detailed {
                description
                    .split('\n')
                    .collect::<Vec<_>>()
                    .join(&format!("\n{}", " ".repeat(DESCRIPTION_INDENT)))
            } else {
                description
            };
            let type_kind = if issue.has_parent() {
                RefKind::SubtaskIssueType
            } else {
                RefKind::IssueType
            };
            fields.push(("description", description));
            fields.push((
                "priority",
                self.resolve(RefKind::Priority, issue.str("priority")).await?,
            ));
            fields.push(("type", self.resolve(type_kind, issue.str("type")).await?));
        }

        let mut out = fields
            .iter()
            .map(|(label, value)| field_line(label, value))
            .collect::<Vec<_>>()
            .join("\n");
        out.push('\n');
        if mode == DisplayMode::Detailed {
            out.push_str(&self.children(issue).await?);
        }
        if mode >= DisplayMode::Verbose {
            out.push_str(&self.comment_block(issue).await?);
        }
        Ok(out)
    }

    /// Only the comment thread, trimmed.
    pub async fn format_comments(&self, issue: &Issue) -> Result<String> {
        Ok(self.comment_block(issue).await?.trim().to_string())
    }

    /// Substitute `%token` placeholders.
    ///
    /// `status`, `priority` and `type` resolve to display names; every other
    /// token is the raw field value, empty when absent.
    pub async fn format_template(&self, issue: &Issue, template: &str) -> Result<String> {
        let re = Regex::new(TOKEN_PATTERN).map_err(|e| AppError::cli(e.to_string()))?;
        let mut values: HashMap<String, String> = HashMap::new();
        let tokens: Vec<String> = re
            .captures_iter(template)
            .map(|caps| caps[1].to_string())
            .collect();
        for token in tokens {
            if values.contains_key(&token) {
                continue;
            }
            let value = match RefKind::for_token(&token) {
                Some(kind) => {
                    self.resolve(kind, issue.str(&token.to_lowercase()))
                        .await?
                }
                None => issue.text(&token),
            };
            values.insert(token, value);
        }
        Ok(re
            .replace_all(template, |caps: &regex::Captures| {
                values.get(&caps[1]).cloned().unwrap_or_default()
            })
            .into_owned())
    }

    fn browse_url(&self, key: &str) -> String {
        format!("{}/browse/{}", self.bridge.base_url(), key)
    }

    /// The display name behind a reference id; empty when it has drifted.
    async fn resolve(&self, kind: RefKind, id: Option<&str>) -> Result<String> {
        let Some(id) = id.filter(|id| !id.is_empty()) else {
            return Ok(String::new());
        };
        let map = self.bridge.reference(kind).await?;
        Ok(object_from_key(id, &map)
            .map(|e| e.name.clone())
            .unwrap_or_default())
    }

    async fn children(&self, issue: &Issue) -> Result<String> {
        let query = format!("parent={}", issue.key());
        let children = self
            .bridge
            .search_issues_jql(&query, super::DEFAULT_SEARCH_LIMIT, None)
            .await?;
        let mut out = String::new();
        for child in children {
            let kind = self
                .resolve(RefKind::SubtaskIssueType, child.str("type"))
                .await?
                .to_lowercase();
            let value = format!(
                "{} ({}) {}",
                child.key(),
                child.text("summary"),
                self.palette.link(&self.browse_url(child.key()))
            );
            out.push_str(&field_line(&kind, &value));
            out.push('\n');
        }
        Ok(out)
    }

    async fn comment_block(&self, issue: &Issue) -> Result<String> {
        let comments = self.bridge.get_issue_comments(issue.key()).await?;
        let mut out = String::from("\n");
        for comment in comments {
            out.push_str(&format!(
                "{} {} : {}\n",
                self.palette.blue(&comment.created),
                self.palette.green(&comment.author),
                comment.body.trim()
            ));
        }
        Ok(out)
    }
}

fn field_line(label: &str, value: &str) -> String {
    format!("{:<width$} : {}", label, value, width = LABEL_WIDTH)
}
