//! Parent-estimate bookkeeping.
//!
//! Time logged on an issue is taken out of the budget of the story it is
//! linked to, and the story gets a comment naming the issue so that the same
//! issue is never subtracted twice.

use std::io::Write;

use serde_json::{json, Value};
use tracing::info;

use super::{Selection, Session};
use crate::bridge::{FieldUpdate, Issue};
use crate::config::EstimateSettings;
use crate::error::Result;

const MINUTE: i64 = 60;
const HOUR: i64 = 60 * MINUTE;
const DAY: i64 = 8 * HOUR;
const WEEK: i64 = 5 * DAY;

/// Render seconds as `1w 2d 3h 4m 5s` with 5-day weeks and 8-hour days.
pub fn secs_to_human_readable(secs: i64) -> String {
    let mut rest = secs;
    let mut parts = Vec::new();
    for (unit, size) in [("w", WEEK), ("d", DAY), ("h", HOUR), ("m", MINUTE)] {
        let count = rest / size;
        if count != 0 {
            parts.push(format!("{}{}", count, unit));
            rest %= size;
        }
    }
    if rest != 0 {
        parts.push(format!("{}s", rest));
    }
    parts.join(" ")
}

/// Subtract logged time of issues from the estimates of their parent stories.
#[derive(Debug, Clone)]
pub struct AdjustEstimateCommand {
    pub selection: Selection,
    /// Print the plan without changing anything.
    pub dry_run: bool,
    pub verbose: bool,
    pub settings: EstimateSettings,
}

impl AdjustEstimateCommand {
    pub async fn run<W: Write>(&self, session: &mut Session<'_, W>) -> Result<()> {
        let bridge = session.bridge;
        let issues = self.selection.fetch(bridge).await?;
        for issue in &issues {
            let key = issue.key();
            if issue.labels().contains(&self.settings.excluded_label) {
                session.say(&format!(
                    "{} is labelled {}, skipping...",
                    key, self.settings.excluded_label
                ))?;
                continue;
            }
            if booked_time(issue).is_none() {
                session.warn(&format!("{} has no time estimate", key));
                continue;
            }
            let Some(story) = self.parent_story(session, issue).await? else {
                session.warn(&format!(
                    "{} has no parent story. Assignee: {}",
                    key,
                    issue.text("assignee")
                ));
                continue;
            };
            let comments = bridge.get_issue_comments(story.key()).await?;
            if comments.iter().any(|c| c.body.contains(key)) {
                session.say(&format!(
                    "{} already mentioned in the comments of {}",
                    key,
                    story.key()
                ))?;
                continue;
            }
            self.adjust(session, &story, issue).await?;
        }
        Ok(())
    }

    /// The story an issue is linked to through the configured link type.
    async fn parent_story<W: Write>(
        &self,
        session: &Session<'_, W>,
        issue: &Issue,
    ) -> Result<Option<Issue>> {
        let links = issue
            .get("issuelinks")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let parent = links.iter().find_map(|link| {
            let kind = link.get("type")?;
            let outward = link.get("outwardIssue")?;
            let parent_type = outward
                .pointer("/fields/issuetype/name")
                .and_then(Value::as_str)?;
            let matches = kind.get("name").and_then(Value::as_str)
                == Some(self.settings.link_type.as_str())
                && kind.get("outward").and_then(Value::as_str)
                    == Some(self.settings.link_outward.as_str())
                && parent_type == self.settings.parent_type;
            if matches {
                outward.get("key").and_then(Value::as_str).map(str::to_string)
            } else {
                None
            }
        });
        match parent {
            Some(key) => session.bridge.get_issue(&key).await,
            None => Ok(None),
        }
    }

    async fn adjust<W: Write>(
        &self,
        session: &mut Session<'_, W>,
        story: &Issue,
        issue: &Issue,
    ) -> Result<()> {
        let (estimate, logged) = booked_time(issue).unwrap_or_default();
        if logged > estimate {
            session.warn(&format!(
                "Attention: {} was overbooked by {}",
                issue.key(),
                secs_to_human_readable(logged - estimate)
            ));
        }
        let reduction = estimate.min(logged);
        let reduction_text = secs_to_human_readable(reduction);
        let message = format!(
            "{}: {}: reduced by {}",
            issue.text("assignee"),
            issue.key(),
            reduction_text
        );

        let tracking = story.get("timetracking").cloned().unwrap_or(Value::Null);
        let seconds = |field: &str| tracking.get(field).and_then(Value::as_i64).unwrap_or(0);
        let text = |field: &str| {
            tracking
                .get(field)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        let new_original = seconds("originalEstimateSeconds") - reduction;
        let new_remaining = seconds("remainingEstimateSeconds") - reduction;
        if new_original < 0 || new_remaining < 0 {
            session.warn(&format!(
                "Story {} full. Estimate would become negative, skipping",
                story.key()
            ));
            return Ok(());
        }
        let new_original = secs_to_human_readable(new_original);
        let new_remaining = secs_to_human_readable(new_remaining);

        if self.verbose || self.dry_run {
            let palette = session.palette();
            session.say(&palette.blue(&format!(
                "Adjusting estimate of story [{}]: {}\nby issue [{}]: {}",
                story.key(),
                story.text("summary"),
                issue.key(),
                issue.text("summary")
            )))?;
            session.say(&format!(
                "Original Estimate: {} - {} = {}",
                text("originalEstimate"),
                reduction_text,
                new_original
            ))?;
            session.say(&format!(
                "Remaining Estimate: {} - {} = {}",
                text("remainingEstimate"),
                reduction_text,
                new_remaining
            ))?;
            session.say(&format!("comment: {}", message))?;
            session.say("")?;
        }
        if self.dry_run {
            return Ok(());
        }

        info!("Reducing estimate of {} by {}", story.key(), reduction_text);
        session
            .bridge
            .update_issue(
                story.key(),
                vec![FieldUpdate::set(
                    "timetracking",
                    json!({
                        "originalEstimate": new_original,
                        "remainingEstimate": new_remaining
                    }),
                )],
            )
            .await?;
        session.bridge.add_comment(story.key(), &message).await
    }
}

/// `(original estimate, logged time)` in seconds, when both are non-zero.
fn booked_time(issue: &Issue) -> Option<(i64, i64)> {
    let logged = issue.number("aggregatetimespent").filter(|s| *s != 0)?;
    let estimate = issue.number("timeoriginalestimate").filter(|s| *s != 0)?;
    Some((estimate, logged))
}
