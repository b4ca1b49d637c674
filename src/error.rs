//! Error types for the store layer.
//!
//! Operations on the registry store return a [`Result<T>`], an alias for
//! `Result<T, CleanError>`.
//!
//! # Error Categories
//!
//! - **Store errors**: [`RootNotFound`]
//! - **Reference errors**: [`InvalidReference`], [`NoSuchRepository`],
//!   [`NoSuchTag`]
//! - **Link resolution**: [`MalformedLink`]
//! - **System errors**: [`Io`], [`Errno`]
//!
//! [`RootNotFound`]: CleanError::RootNotFound
//! [`InvalidReference`]: CleanError::InvalidReference
//! [`NoSuchRepository`]: CleanError::NoSuchRepository
//! [`NoSuchTag`]: CleanError::NoSuchTag
//! [`MalformedLink`]: CleanError::MalformedLink
//! [`Io`]: CleanError::Io
//! [`Errno`]: CleanError::Errno

use std::path::PathBuf;

/// Result type alias for operations that may return a CleanError.
pub type Result<T> = std::result::Result<T, CleanError>;

/// Error types for registry store operations.
#[derive(Debug, thiserror::Error)]
pub enum CleanError {
    /// The repositories root was not found at the specified path.
    #[error("registry storage root not found at {0}")]
    RootNotFound(PathBuf),

    /// A `repository[:tag]` reference failed validation.
    #[error("invalid repository/tag reference: {0}")]
    InvalidReference(String),

    /// The named repository does not exist in the store.
    #[error("no such repository: {0}")]
    NoSuchRepository(String),

    /// The named tag does not exist in the repository.
    #[error("no such tag: {repository}:{tag}")]
    NoSuchTag { repository: String, tag: String },

    /// A tag's current link file does not hold a sha256 digest.
    #[error("malformed current link for {repository}:{tag}")]
    MalformedLink { repository: String, tag: String },

    /// I/O error occurred during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A system call failed.
    #[error("system error: {0}")]
    Errno(#[from] rustix::io::Errno),
}
