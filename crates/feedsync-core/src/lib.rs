//! Welcome to the documentation of feedsync. The crate keeps a paginated feed
//! of posts in sync with the changes other users push while you are reading,
//! paging or editing.
//!
//! Start a session with [`session::FeedSession::spawn`], feed it live events
//! through [`live::LiveChannel`] and read the current state from the
//! [`session::FeedHandle`] it returns.
mod error;
pub mod api;
pub mod config;
pub mod credential;
pub mod edit;
pub mod graphql;
pub mod live;
pub mod post;
pub mod reconciler;
pub mod session;

pub use error::{ApiError, ApiResult, FeedError, FeedResult, Operation};

pub mod constant {
    pub const DEFAULT_PAGE_SIZE: usize = 2;
    pub const DEFAULT_TOKEN_TTL_SECS: u64 = 60 * 60;
    pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
    pub const DEFAULT_API_URL: &str = "http://localhost:8080/";
    pub const DEFAULT_LIVE_URL: &str = "ws://localhost:8080/socket.io/?EIO=4&transport=websocket";
    /// Name of the socket.io event carrying post changes.
    pub const POSTS_EVENT: &str = "posts";
    pub const SESSION_MAILBOX_SIZE: usize = 16;
    /// Deleted post ids remembered to keep repeated deletes from counting twice.
    pub const TOMBSTONE_LIMIT: usize = 256;
    pub const CONFIG_DIR: &str = ".feedsync";
    pub const CONFIG_FILE: &str = "feedsync.toml";
    pub const CONFIG_ENV: &str = "FEEDSYNC_CONF";
}

pub mod prelude {
    pub use crate::api::FeedApi;
    pub use crate::credential::{CredentialHolder, SessionCredential, Token};
    pub use crate::edit::{DraftTarget, EditDraft};
    pub use crate::live::{LiveChannel, LiveEvent};
    pub use crate::post::{ImageUpload, Post, PostId};
    pub use crate::reconciler::PageDelta;
    pub use crate::session::{FeedHandle, FeedSession, FeedSnapshot};
}
