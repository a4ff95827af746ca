//! jiracli - view, search, create and update JIRA issues from the command line.
//!
//! The [`bridge`] module is the heart of the crate: one [`bridge::JiraBridge`]
//! contract, implemented once per wire protocol, that hands canonical issues
//! to the [`commands`] and the formatter.

pub mod api;
pub mod bridge;
pub mod cache;
pub mod cli;
pub mod commands;
pub mod config;
pub mod editor;
pub mod error;
pub mod logging;
pub mod output;

pub use error::{AppError, Result};
