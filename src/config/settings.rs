//! Settings for the parent-estimate bookkeeping workflow.

use serde::{Deserialize, Serialize};

/// How `adjust-estimate` finds the story that carries an issue's budget.
///
/// The defaults match the workflow the command was written for: subtasks are
/// linked to their story with a "Refinement" link reading "has parent", and
/// issues labelled "student" are not booked against the story.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EstimateSettings {
    /// Issues carrying this label are skipped.
    pub excluded_label: String,
    /// Name of the issue link type that points at the parent story.
    pub link_type: String,
    /// Outward description of that link type.
    pub link_outward: String,
    /// Issue type name the linked parent must have.
    pub parent_type: String,
}

impl Default for EstimateSettings {
    fn default() -> Self {
        Self {
            excluded_label: "student".to_string(),
            link_type: "Refinement".to_string(),
            link_outward: "has parent".to_string(),
            parent_type: "Story".to_string(),
        }
    }
}
