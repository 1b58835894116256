use thiserror::Error;

pub type FeedResult<T> = anyhow::Result<T>;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Error, Debug)]
pub enum FeedError {
    /// An edit was requested while a submit is still in flight.
    #[error("A post is currently being submitted")]
    EditInProgress,
    /// Submit or draft access without an open editor.
    #[error("No post is being edited")]
    NotEditing,
    /// The requested post is not part of the visible feed.
    #[error("Post {id} is not in the current page")]
    PostNotInView { id: String },
    /// A newer page request replaced the one being waited on.
    #[error("Page request was superseded by a newer one")]
    Superseded,
    /// The session task has stopped.
    #[error("Feed session is closed")]
    SessionClosed,
    /// A backend call failed; `message` is ready for display.
    #[error("{message}")]
    Api {
        message: String,
        #[source]
        source: ApiError,
    },
    #[error("Config error: {msg}")]
    ConfigError { msg: String },
    /// Custom Error type for errors not covered by the above errors.
    #[error("{msg}")]
    CustomError { msg: String },
}

impl FeedError {
    pub fn custom_error(msg: String) -> Self {
        Self::CustomError { msg }
    }

    pub fn config_error(msg: String) -> Self {
        Self::ConfigError { msg }
    }

    pub fn api(op: Operation, source: ApiError) -> Self {
        Self::Api {
            message: source.describe(op),
            source,
        }
    }
}

/// Classified failure of a backend call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("{message}")]
    Unauthorized { message: String },
    #[error("{message}")]
    Forbidden { message: String },
    #[error("{message}")]
    NotFound { message: String },
    #[error("{message}")]
    Validation { message: String },
    /// The backend failed without a code we know how to classify.
    #[error("{message}")]
    Service { message: String },
    /// Network level failure; no error envelope was received.
    #[error("{message}")]
    Transport { message: String },
}

/// The backend operation a failure belongs to. Drives both the status code
/// classification and the message shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    FetchUser,
    FetchPosts,
    FetchPost,
    UploadImage,
    SavePost,
    DeletePost,
    UpdateStatus,
}

impl Operation {
    fn failure_prefix(&self) -> &'static str {
        match self {
            Operation::FetchUser => "Could not get user data.",
            Operation::FetchPosts => "Could not fetch posts.",
            Operation::FetchPost => "Could not fetch post.",
            Operation::UploadImage => "Uploading the image failed.",
            Operation::SavePost => "Creating or editing a post failed.",
            Operation::DeletePost => "Post deletion failed.",
            Operation::UpdateStatus => "Updating the status failed.",
        }
    }

    /// Message used when the envelope carries no code this operation knows.
    fn generic_failure(&self) -> &'static str {
        match self {
            Operation::FetchUser => "Could not get user data.",
            Operation::FetchPosts => "Could not fetch posts.",
            Operation::FetchPost => "Could not fetch post.",
            Operation::UploadImage => "Could not upload image.",
            Operation::SavePost => "Could not create or edit post.",
            Operation::DeletePost => "Could not delete post.",
            Operation::UpdateStatus => "Could not update status.",
        }
    }

    /// Maps a backend status code to a typed failure, if this operation
    /// recognises it.
    pub fn classify(&self, code: Option<u16>, message: String) -> ApiError {
        use Operation::*;
        match (self, code) {
            (SavePost, Some(422)) => ApiError::Validation { message },
            (FetchUser, Some(401 | 404)) => ApiError::Unauthorized { message },
            (FetchPosts | FetchPost | SavePost | DeletePost | UpdateStatus, Some(401)) => {
                ApiError::Unauthorized { message }
            }
            (SavePost | DeletePost, Some(403)) => ApiError::Forbidden { message },
            (FetchPost | SavePost | DeletePost | UpdateStatus, Some(404)) => {
                ApiError::NotFound { message }
            }
            _ => ApiError::Service {
                message: self.generic_failure().to_string(),
            },
        }
    }
}

impl ApiError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    pub fn service(message: impl Into<String>) -> Self {
        Self::Service {
            message: message.into(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ApiError::Unauthorized { message }
            | ApiError::Forbidden { message }
            | ApiError::NotFound { message }
            | ApiError::Validation { message }
            | ApiError::Service { message }
            | ApiError::Transport { message } => message,
        }
    }

    /// Single human readable line for `op`, e.g.
    /// "Could not fetch posts. Not authenticated!".
    pub fn describe(&self, op: Operation) -> String {
        match self {
            ApiError::Service { message } => message.clone(),
            ApiError::Transport { message } => {
                format!("{} {}", op.failure_prefix(), message)
            }
            other => format!("{} {}", op.failure_prefix(), other.message()),
        }
    }
}
