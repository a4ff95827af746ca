//! Authentication handling for JIRA.
//!
//! REST requests carry a Basic Auth header built from username and password.
//! Passwords the user chose to remember are kept in the OS keyring, never in
//! the config file.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use thiserror::Error;

/// The keyring service name for jiracli passwords.
const KEYRING_SERVICE: &str = "jiracli";

/// Errors raised by the keyring.
#[derive(Debug, Error)]
#[error("Keyring error: {0}")]
pub struct KeyringError(String);

/// Authentication credentials for JIRA.
#[derive(Clone)]
pub struct Auth {
    /// The username.
    username: String,
    /// The Base64-encoded authorization header value.
    auth_header: String,
}

impl Auth {
    /// Create new credentials from username and password.
    ///
    /// The password is immediately encoded and the raw value is not stored.
    pub fn new(username: &str, password: &str) -> Self {
        Self {
            username: username.to_string(),
            auth_header: build_auth_header(username, password),
        }
    }

    /// Get the authorization header value for HTTP requests.
    pub fn header_value(&self) -> &str {
        &self.auth_header
    }

    /// Get the username.
    pub fn username(&self) -> &str {
        &self.username
    }
}

impl std::fmt::Debug for Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Auth")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// Build the Basic Auth header value.
fn build_auth_header(username: &str, password: &str) -> String {
    let credentials = format!("{}:{}", username, password);
    format!("Basic {}", BASE64.encode(credentials.as_bytes()))
}

/// Store a password in the OS keyring under the given username.
pub fn store_password(username: &str, password: &str) -> Result<(), KeyringError> {
    let entry = keyring::Entry::new(KEYRING_SERVICE, username)
        .map_err(|e| KeyringError(format!("failed to create keyring entry: {}", e)))?;

    entry
        .set_password(password)
        .map_err(|e| KeyringError(format!("failed to store password: {}", e)))
}

/// Retrieve a stored password from the OS keyring.
pub fn get_password(username: &str) -> Result<String, KeyringError> {
    let entry = keyring::Entry::new(KEYRING_SERVICE, username)
        .map_err(|e| KeyringError(format!("failed to access keyring: {}", e)))?;

    entry
        .get_password()
        .map_err(|e| KeyringError(format!("failed to retrieve password: {}", e)))
}
