//! Free text entry through the user's preferred text editor.
//!
//! When a comment or description is not given on the command line, a
//! temporary file pre-filled with instructions is opened in `$EDITOR`. Lines
//! starting with the comment marker are dropped from what comes back.

use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;

/// Lines starting with this marker are removed from the edited text.
pub const COMMENT_MARKER: &str = "--";

/// Text the temporary file starts with.
pub const DEFAULT_EDITOR_TEXT: &str = "-- enter your text here\n\
-- all lines starting with '--' will be removed";

static TEMP_FILE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Errors that can occur during external editor operations.
#[derive(Debug, Error)]
pub enum ExternalEditorError {
    /// Failed to create the temporary file.
    #[error("Failed to create temporary file: {0}")]
    TempFileCreation(#[source] io::Error),

    /// Failed to spawn the editor process.
    #[error("Failed to launch editor '{editor}': {source}")]
    EditorSpawn {
        editor: String,
        #[source]
        source: io::Error,
    },

    /// Editor exited with a non-zero status code.
    #[error("Editor exited with status code {0}")]
    EditorExecution(i32),

    /// Editor was terminated by a signal.
    #[error("Editor was terminated by a signal")]
    EditorTerminated,

    /// Failed to read content back from the temporary file.
    #[error("Failed to read content from temporary file: {0}")]
    ContentRead(#[source] io::Error),
}

/// External editor utility for launching text editors with temporary files.
#[derive(Debug, Clone)]
pub struct ExternalEditor {
    /// The editor command to use.
    editor: String,
}

impl ExternalEditor {
    /// Create a new external editor using `$EDITOR`, then `$VISUAL`, then `vi`.
    pub fn new() -> Self {
        Self {
            editor: get_editor(),
        }
    }

    /// Create an external editor instance with a specific editor command.
    pub fn with_editor(editor: impl Into<String>) -> Self {
        Self {
            editor: editor.into(),
        }
    }

    /// Get the editor command that will be used.
    pub fn editor(&self) -> &str {
        &self.editor
    }

    /// Ask the user for text, starting from `initial`.
    ///
    /// Returns the edited text with comment lines stripped.
    pub fn compose(&self, initial: &str) -> Result<String, ExternalEditorError> {
        let temp_path = create_temp_file(initial)?;

        let result = self.launch_editor(&temp_path);

        // Always try to read and clean up, even if the editor failed.
        let read_result = read_and_cleanup(&temp_path);

        result?;
        Ok(strip_comment_lines(&read_result?))
    }

    /// Launch the editor process with the given file path.
    fn launch_editor(&self, path: &Path) -> Result<(), ExternalEditorError> {
        // $EDITOR may carry arguments, e.g. "code --wait".
        let mut parts = self.editor.split_whitespace();
        let program = parts.next().unwrap_or("vi");
        let status = Command::new(program)
            .args(parts)
            .arg(path)
            .status()
            .map_err(|e| ExternalEditorError::EditorSpawn {
                editor: self.editor.clone(),
                source: e,
            })?;

        if status.success() {
            Ok(())
        } else {
            match status.code() {
                Some(code) => Err(ExternalEditorError::EditorExecution(code)),
                None => Err(ExternalEditorError::EditorTerminated),
            }
        }
    }
}

impl Default for ExternalEditor {
    fn default() -> Self {
        Self::new()
    }
}

/// Supplies free text when a command was not given any.
pub trait TextSource {
    fn text(&self) -> Result<String, ExternalEditorError>;
}

impl TextSource for ExternalEditor {
    /// Compose text starting from [`DEFAULT_EDITOR_TEXT`].
    fn text(&self) -> Result<String, ExternalEditorError> {
        self.compose(DEFAULT_EDITOR_TEXT)
    }
}

/// Detect the user's preferred editor from environment variables.
pub fn get_editor() -> String {
    env::var("EDITOR")
        .or_else(|_| env::var("VISUAL"))
        .unwrap_or_else(|_| "vi".to_string())
}

/// Remove every line that starts with [`COMMENT_MARKER`].
pub fn strip_comment_lines(text: &str) -> String {
    text.split('\n')
        .filter(|line| !line.starts_with(COMMENT_MARKER))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Create a temporary file named `jiracli-{pid}-{n}.txt` holding `content`.
fn create_temp_file(content: &str) -> Result<PathBuf, ExternalEditorError> {
    let n = TEMP_FILE_COUNTER.fetch_add(1, Ordering::Relaxed);
    let path = env::temp_dir().join(format!("jiracli-{}-{}.txt", std::process::id(), n));
    fs::write(&path, content).map_err(ExternalEditorError::TempFileCreation)?;
    Ok(path)
}

/// Read the temporary file and remove it.
fn read_and_cleanup(path: &Path) -> Result<String, ExternalEditorError> {
    let content = fs::read_to_string(path).map_err(ExternalEditorError::ContentRead)?;

    if let Err(e) = fs::remove_file(path) {
        tracing::warn!("Failed to clean up temporary file {:?}: {}", path, e);
    }

    Ok(content)
}
