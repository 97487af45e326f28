//! Error types for the build controller.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("build {0} has no project reference")]
    MissingProjectReference(String),

    #[error("project not found: {0}")]
    ProjectNotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("substrate error: {0}")]
    Substrate(String),
}

impl Error {
    /// Whether the substrate reported that the object is already present.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Error::AlreadyExists(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
