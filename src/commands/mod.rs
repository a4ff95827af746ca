//! Command processors.
//!
//! One processor per user intent. A processor validates its arguments
//! against the remote reference data, drives the bridge, and writes what
//! happened through the session console.

mod add;
mod estimate;
mod list;
mod update;
mod view;
mod worklog;

use std::io::Write;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::bridge::format::Palette;
use crate::bridge::{Issue, IssueFormatter, JiraBridge, DEFAULT_SEARCH_LIMIT};
use crate::editor::TextSource;
use crate::error::{AppError, Result};
use crate::output::{print_error, Console};

pub use add::AddCommand;
pub use estimate::{secs_to_human_readable, AdjustEstimateCommand};
pub use list::{ListCommand, ListKind};
pub use update::UpdateCommand;
pub use view::{view_mode, ViewCommand};
pub use worklog::WorkLogCommand;

/// What a processor works with: the bridge, the console and a source of
/// free text for when a comment or description was not given.
pub struct Session<'a, W: Write> {
    pub bridge: &'a dyn JiraBridge,
    pub console: Console<W>,
    pub editor: &'a dyn TextSource,
}

impl<'a, W: Write> Session<'a, W> {
    pub fn new(bridge: &'a dyn JiraBridge, console: Console<W>, editor: &'a dyn TextSource) -> Self {
        Self {
            bridge,
            console,
            editor,
        }
    }

    pub fn formatter(&self) -> IssueFormatter<'a> {
        IssueFormatter::new(self.bridge, self.console.palette())
    }

    pub fn palette(&self) -> Palette {
        self.console.palette()
    }

    /// Write a block of output.
    pub fn say(&mut self, text: &str) -> Result<()> {
        self.console.line(text)?;
        Ok(())
    }

    /// Report a non-fatal problem and carry on.
    pub fn warn(&mut self, text: &str) {
        warn!("{}", text);
        print_error(&AppError::warning(text));
    }

    /// `given`, or text from the editor when absent.
    pub fn text_or_editor(&self, given: Option<&str>) -> Result<String> {
        match given {
            Some(text) => Ok(text.to_string()),
            None => Ok(self.editor.text()?),
        }
    }

    /// The console's underlying writer.
    pub fn into_output(self) -> W {
        self.console.into_inner()
    }
}

/// Which issues a command works on.
///
/// The first of free-text search, JQL, and filters that is set wins; with
/// none set, the listed ids are fetched one by one and missing ones skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub ids: Vec<String>,
    pub search: Option<String>,
    pub jql: Option<String>,
    pub filters: Vec<String>,
    pub project: Option<String>,
}

impl Selection {
    pub async fn fetch(&self, bridge: &dyn JiraBridge) -> Result<Vec<Issue>> {
        let project = self.project.as_deref();
        if let Some(text) = &self.search {
            return bridge
                .search_issues(text, project, DEFAULT_SEARCH_LIMIT)
                .await;
        }
        if let Some(query) = &self.jql {
            return bridge
                .search_issues_jql(query, DEFAULT_SEARCH_LIMIT, project)
                .await;
        }
        if !self.filters.is_empty() {
            return bridge.get_issues_by_filter(&self.filters).await;
        }
        let mut issues = Vec::with_capacity(self.ids.len());
        for id in &self.ids {
            match bridge.get_issue(id).await? {
                Some(issue) => issues.push(issue),
                None => debug!("Issue {} not found, skipping", id),
            }
        }
        Ok(issues)
    }
}

/// Parse `key=value` pairs into extra issue fields.
///
/// Values that are valid JSON are taken as JSON, anything else as a string.
/// Repeating a key collects its values into a list.
pub fn extract_extras(items: &[String]) -> Result<Map<String, Value>> {
    let mut extras = Map::new();
    for item in items {
        let Some((key, raw)) = item.split_once('=') else {
            return Err(AppError::warning(format!(
                "Unknown extra fields [{}]",
                items.join(", ")
            )));
        };
        let value = serde_json::from_str::<Value>(raw)
            .unwrap_or_else(|_| Value::String(raw.to_string()));
        match extras.get_mut(key) {
            Some(Value::Array(list)) => list.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                extras.insert(key.to_string(), value);
            }
        }
    }
    Ok(extras)
}

/// The project key of an issue key, `TP` for `TP-12`.
pub fn project_of(issue_key: &str) -> &str {
    issue_key.split('-').next().unwrap_or(issue_key)
}

#[cfg(test)]
pub(crate) mod testing {
    use crate::editor::{ExternalEditorError, TextSource};

    /// Free text that never opens an editor.
    pub struct FixedText(pub &'static str);

    impl TextSource for FixedText {
        fn text(&self) -> Result<String, ExternalEditorError> {
            Ok(self.0.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::testing::{issue, StubBridge};
    use serde_json::json;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_extract_extras_parses_json_values() {
        let extras = extract_extras(&strings(&[
            "customfield_10010=5",
            "duedate=2024-03-01",
            "flag=true",
        ]))
        .unwrap();
        assert_eq!(extras["customfield_10010"], json!(5));
        assert_eq!(extras["duedate"], json!("2024-03-01"));
        assert_eq!(extras["flag"], json!(true));
    }

    #[test]
    fn test_extract_extras_repeated_keys_collect() {
        let extras = extract_extras(&strings(&["labels=a", "labels=b", "labels=c"])).unwrap();
        assert_eq!(extras["labels"], json!(["a", "b", "c"]));
    }

    #[test]
    fn test_extract_extras_keeps_equals_in_value() {
        let extras = extract_extras(&strings(&["environment=a=b"])).unwrap();
        assert_eq!(extras["environment"], json!("a=b"));
    }

    #[test]
    fn test_extract_extras_without_equals_is_warning() {
        let err = extract_extras(&strings(&["broken"])).unwrap_err();
        assert!(matches!(err, AppError::UsageWarning(_)));
        assert!(err.to_string().contains("broken"));
    }

    #[test]
    fn test_project_of() {
        assert_eq!(project_of("TP-12"), "TP");
        assert_eq!(project_of("TP"), "TP");
    }

    #[tokio::test]
    async fn test_selection_skips_missing_ids() {
        let bridge = StubBridge::new().with_issue(issue(json!({"key": "TP-1", "summary": "a"})));
        let selection = Selection {
            ids: strings(&["TP-1", "TP-404"]),
            ..Default::default()
        };
        let issues = selection.fetch(&bridge).await.unwrap();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].key(), "TP-1");
    }

    #[tokio::test]
    async fn test_selection_search_wins_over_ids() {
        let bridge = StubBridge::new()
            .with_issue(issue(json!({"key": "TP-1", "summary": "crash on start"})))
            .with_issue(issue(json!({"key": "TP-2", "summary": "typo"})));
        let selection = Selection {
            ids: strings(&["TP-2"]),
            search: Some("crash".into()),
            ..Default::default()
        };
        let issues = selection.fetch(&bridge).await.unwrap();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].key(), "TP-1");
    }

    #[tokio::test]
    async fn test_selection_unknown_filter_is_usage_error() {
        let bridge = StubBridge::new();
        let selection = Selection {
            filters: strings(&["nonexistent-filter"]),
            ..Default::default()
        };
        let err = selection.fetch(&bridge).await.unwrap_err();
        assert!(matches!(err, AppError::Usage(_)));
        assert!(err.to_string().contains("nonexistent-filter"));
    }
}
