use std::io::Write;

use colored::Color;
use serde_json::Value;

use super::{secs_to_human_readable, Session};
use crate::bridge::format::Palette;
use crate::bridge::{Issue, Worklog};
use crate::error::Result;

/// Log work on an issue and show its time tracking.
#[derive(Debug, Clone, Default)]
pub struct WorkLogCommand {
    pub issue: String,
    pub spent: Option<String>,
    pub comment: Option<String>,
    pub remaining: Option<String>,
}

impl WorkLogCommand {
    pub async fn run<W: Write>(&self, session: &mut Session<'_, W>) -> Result<()> {
        let bridge = session.bridge;
        if let Some(spent) = &self.spent {
            bridge
                .log_work(
                    &self.issue,
                    spent,
                    self.comment.as_deref().unwrap_or_default(),
                    self.remaining.as_deref(),
                )
                .await?;
        }

        let Some(issue) = bridge.get_issue(&self.issue).await? else {
            return Ok(());
        };
        let palette = session.palette();
        for line in time_tracking(&issue, palette) {
            session.say(&line)?;
        }
        session.say("")?;
        for worklog in bridge.get_worklogs(&self.issue).await? {
            session.say(&format_worklog(&worklog, palette))?;
        }
        Ok(())
    }
}

/// Estimated, remaining and logged time; logged turns red once it
/// exceeds the original estimate.
fn time_tracking(issue: &Issue, palette: Palette) -> Vec<String> {
    let Some(tracking) = issue.get("timetracking").and_then(Value::as_object) else {
        return Vec::new();
    };
    let Some(estimated) = tracking.get("originalEstimate").and_then(Value::as_str) else {
        return Vec::new();
    };
    let remaining = tracking
        .get("remainingEstimate")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let estimate_secs = tracking
        .get("originalEstimateSeconds")
        .and_then(Value::as_i64)
        .unwrap_or_default();
    let spent_secs = tracking
        .get("timeSpentSeconds")
        .and_then(Value::as_i64)
        .unwrap_or_default();
    let spent = tracking
        .get("timeSpent")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| secs_to_human_readable(spent_secs));
    let color = if spent_secs <= estimate_secs {
        Color::Green
    } else {
        Color::Red
    };
    let label = |text: &str| palette.paint(text, Color::White);
    vec![
        format!("{}: {}", label("Estimated"), palette.blue(estimated)),
        format!("{}: {}", label("Remaining"), palette.blue(remaining)),
        format!("{}: {}", label("Logged   "), palette.paint(&spent, color)),
    ]
}

fn format_worklog(worklog: &Worklog, palette: Palette) -> String {
    format!(
        "{} {} : {} {}",
        palette.blue(&worklog.created),
        palette.paint(&worklog.author, Color::White),
        worklog.comment,
        palette.green(&format!("[{}]", worklog.time_spent))
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::testing::{issue, StubBridge};
    use crate::commands::testing::FixedText;
    use crate::output::Console;
    use serde_json::json;

    fn bridge(spent_secs: i64) -> StubBridge {
        let mut bridge = StubBridge::new().with_issue(issue(json!({
            "key": "TP-1",
            "timetracking": {
                "originalEstimate": "1d",
                "remainingEstimate": "4h",
                "originalEstimateSeconds": 28800,
                "timeSpentSeconds": spent_secs
            }
        })));
        bridge.worklogs.insert(
            "TP-1".into(),
            vec![Worklog {
                author: "bob".into(),
                comment: "debugging".into(),
                created: "2024-03-01".into(),
                time_spent: "4h".into(),
            }],
        );
        bridge
    }

    async fn run(bridge: &StubBridge, command: WorkLogCommand) -> String {
        let editor = FixedText("");
        let mut session = Session::new(bridge, Console::new(Vec::new(), Palette::plain()), &editor);
        command.run(&mut session).await.unwrap();
        String::from_utf8(session.into_output()).unwrap()
    }

    #[tokio::test]
    async fn test_shows_tracking_and_entries() {
        let bridge = bridge(14400);
        let out = run(
            &bridge,
            WorkLogCommand {
                issue: "TP-1".into(),
                ..Default::default()
            },
        )
        .await;
        assert_eq!(
            out,
            "Estimated: 1d\nRemaining: 4h\nLogged   : 4h\n\n2024-03-01 bob : debugging [4h]\n"
        );
        assert!(bridge.logged().is_empty());
    }

    #[tokio::test]
    async fn test_logs_work_before_showing() {
        let bridge = bridge(0);
        run(
            &bridge,
            WorkLogCommand {
                issue: "TP-1".into(),
                spent: Some("2h".into()),
                comment: Some("review".into()),
                remaining: None,
            },
        )
        .await;
        assert_eq!(bridge.logged(), vec!["worklog TP-1 2h review auto"]);
    }

    #[test]
    fn test_logged_prefers_time_spent_text() {
        let tracking = issue(json!({
            "key": "TP-1",
            "timetracking": {
                "originalEstimate": "1h",
                "originalEstimateSeconds": 3600,
                "timeSpentSeconds": 7200,
                "timeSpent": "2h"
            }
        }));
        let lines = time_tracking(&tracking, Palette::plain());
        assert_eq!(lines[2], "Logged   : 2h");
        assert!(time_tracking(&issue(json!({"key": "TP-2"})), Palette::plain()).is_empty());
    }
}
