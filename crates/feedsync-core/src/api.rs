//! Contract between the feed engine and the backend, plus the parsing of the
//! error envelope every backend response may carry.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::credential::Token;
use crate::edit::{DraftTarget, EditDraft};
use crate::error::{ApiError, ApiResult, Operation};
use crate::post::{ImageUpload, Post, PostId, PostInput, PostsPage};

#[async_trait]
pub trait FeedApi: Send + Sync {
    /// Returns the free-text status of the signed in user.
    async fn fetch_user(&self, token: &Token) -> ApiResult<String>;

    async fn fetch_posts_page(&self, token: &Token, page: u32) -> ApiResult<PostsPage>;

    async fn fetch_post(&self, token: &Token, id: &PostId) -> ApiResult<Post>;

    /// Uploads `image`, replacing `old_path` on the server when given, and
    /// returns the stored image reference.
    async fn upload_image(
        &self,
        token: &Token,
        image: &ImageUpload,
        old_path: Option<&str>,
    ) -> ApiResult<String>;

    async fn save_post(
        &self,
        token: &Token,
        target: &DraftTarget,
        input: &PostInput,
    ) -> ApiResult<Post>;

    async fn delete_post(&self, token: &Token, id: &PostId) -> ApiResult<PostId>;

    async fn update_status(&self, token: &Token, status: &str) -> ApiResult<String>;

    /// Upload followed by the create or update mutation. Without a new image
    /// the draft's current reference is reused and nothing is uploaded.
    async fn submit_post(&self, token: &Token, draft: &EditDraft) -> ApiResult<Post> {
        let image_url = match &draft.image {
            Some(image) => {
                let old_path = match draft.target {
                    DraftTarget::Update { .. } if !draft.image_url.is_empty() => {
                        Some(draft.image_url.as_str())
                    }
                    _ => None,
                };
                self.upload_image(token, image, old_path).await?
            }
            None => draft.image_url.clone(),
        };
        let input = PostInput {
            title: draft.title.clone(),
            content: draft.content.clone(),
            image_url,
        };
        self.save_post(token, &draft.target, &input).await
    }
}

#[derive(Debug, Deserialize)]
struct RawEnvelope {
    data: Option<Value>,
    errors: Option<Vec<ErrorEntry>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorEntry {
    #[serde(default)]
    message: String,
    status_code: Option<u16>,
    #[serde(default)]
    error_list: Vec<Value>,
}

/// Parses a response body, checking the error envelope before `data` is
/// trusted. Only the first error entry is classified.
pub fn parse_envelope<T: DeserializeOwned>(op: Operation, body: &[u8]) -> ApiResult<T> {
    let envelope: RawEnvelope = serde_json::from_slice(body)
        .map_err(|err| ApiError::service(format!("{} Malformed response: {err}", generic(op))))?;

    if let Some(entry) = envelope.errors.as_ref().and_then(|errors| errors.first()) {
        return Err(classify_entry(op, entry));
    }

    let data = envelope
        .data
        .ok_or_else(|| ApiError::service(generic(op)))?;
    serde_json::from_value(data)
        .map_err(|err| ApiError::service(format!("{} Unexpected payload: {err}", generic(op))))
}

fn classify_entry(op: Operation, entry: &ErrorEntry) -> ApiError {
    let message = match entry.status_code {
        Some(422) => first_validation_message(&entry.error_list)
            .unwrap_or_else(|| entry.message.clone()),
        _ => entry.message.clone(),
    };
    op.classify(entry.status_code, message)
}

/// First human readable message in a (possibly nested) validation list.
fn first_validation_message(list: &[Value]) -> Option<String> {
    list.iter().find_map(|item| match item {
        Value::String(msg) => Some(msg.clone()),
        Value::Array(nested) => first_validation_message(nested),
        Value::Object(fields) => fields
            .get("message")
            .or_else(|| fields.get("msg"))
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    })
}

fn generic(op: Operation) -> String {
    match op.classify(None, String::new()) {
        ApiError::Service { message } => message,
        other => other.message().to_string(),
    }
}
