use std::io::Write;

use super::{Selection, Session};
use crate::bridge::DisplayMode;
use crate::error::Result;

/// The display mode of `view`: `--oneline` wins, a `-v` count above one
/// shows detail, anything else is minimal.
pub fn view_mode(oneline: bool, verbosity: u8) -> DisplayMode {
    if oneline {
        DisplayMode::Oneline
    } else if verbosity > 1 {
        DisplayMode::from_level(i32::from(verbosity))
    } else {
        DisplayMode::Minimal
    }
}

/// Show issues.
#[derive(Debug, Clone)]
pub struct ViewCommand {
    pub selection: Selection,
    pub mode: DisplayMode,
    pub template: Option<String>,
    pub comments_only: bool,
}

impl ViewCommand {
    pub async fn run<W: Write>(&self, session: &mut Session<'_, W>) -> Result<()> {
        let issues = self.selection.fetch(session.bridge).await?;
        let formatter = session.formatter();
        for issue in &issues {
            let text = formatter
                .render(
                    issue,
                    self.mode,
                    self.template.as_deref(),
                    self.comments_only,
                )
                .await?;
            session.say(&text)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::format::Palette;
    use crate::bridge::testing::{issue, StubBridge};
    use crate::commands::testing::FixedText;
    use crate::output::Console;
    use serde_json::json;

    fn bridge() -> StubBridge {
        StubBridge::new()
            .with_issue(issue(json!({"key": "TP-1", "status": "1", "summary": "Crash"})))
            .with_issue(issue(json!({"key": "TP-2", "status": "5", "summary": "Typo"})))
    }

    async fn run(bridge: &StubBridge, command: ViewCommand) -> String {
        let editor = FixedText("");
        let mut session = Session::new(bridge, Console::new(Vec::new(), Palette::plain()), &editor);
        command.run(&mut session).await.unwrap();
        String::from_utf8(session.into_output()).unwrap()
    }

    #[test]
    fn test_view_mode() {
        assert_eq!(view_mode(true, 3), DisplayMode::Oneline);
        assert_eq!(view_mode(false, 0), DisplayMode::Minimal);
        assert_eq!(view_mode(false, 1), DisplayMode::Minimal);
        assert_eq!(view_mode(false, 2), DisplayMode::Detailed);
    }

    #[tokio::test]
    async fn test_view_ids_oneline() {
        let bridge = bridge();
        let out = run(
            &bridge,
            ViewCommand {
                selection: Selection {
                    ids: vec!["TP-2".into(), "TP-1".into(), "TP-9".into()],
                    ..Default::default()
                },
                mode: DisplayMode::Oneline,
                template: None,
                comments_only: false,
            },
        )
        .await;
        assert_eq!(
            out,
            "TP-2 Typo https://jira.example.com/browse/TP-2 [Resolved]\n\
             TP-1 Crash https://jira.example.com/browse/TP-1 [Open]\n"
        );
    }

    #[tokio::test]
    async fn test_view_with_template() {
        let bridge = bridge();
        let out = run(
            &bridge,
            ViewCommand {
                selection: Selection {
                    jql: Some("status=Open".into()),
                    ..Default::default()
                },
                mode: DisplayMode::Minimal,
                template: Some("%key|%status".into()),
                comments_only: false,
            },
        )
        .await;
        assert_eq!(out, "TP-1|Open\nTP-2|Resolved\n");
        assert!(bridge.logged().contains(&"jql status=Open".to_string()));
    }
}
