//! `FeedApi` over the backend's GraphQL endpoint and its image upload route.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use url::Url;

use crate::api::{parse_envelope, FeedApi};
use crate::credential::Token;
use crate::edit::DraftTarget;
use crate::error::{ApiError, ApiResult, Operation};
use crate::post::{ImageUpload, Post, PostId, PostInput, PostsPage};
use crate::{FeedError, FeedResult};

const POST_FIELDS: &str = "_id title content imageUrl createdAt creator { name }";

#[derive(Clone, Debug)]
pub struct GraphqlClient {
    http: reqwest::Client,
    graphql_url: Url,
    upload_url: Url,
}

#[derive(Deserialize)]
struct UserData {
    user: UserStatus,
}

#[derive(Deserialize)]
struct UserStatus {
    status: String,
}

#[derive(Deserialize)]
struct PostsData {
    posts: PostsPage,
}

#[derive(Deserialize)]
struct PostData {
    post: Post,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SaveData {
    create_post: Option<Post>,
    update_post: Option<Post>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeleteData {
    delete_post: DeletedPost,
}

#[derive(Deserialize)]
struct DeletedPost {
    #[serde(rename = "_id")]
    id: PostId,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusData {
    update_status: UserStatus,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadResponse {
    file_path: String,
}

impl GraphqlClient {
    /// `api_url` is the backend root; `/graphql` and `/post-image` hang off it.
    pub fn new(api_url: &Url, timeout: Duration) -> FeedResult<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        let mut api_url = api_url.clone();
        if !api_url.path().ends_with('/') {
            let path = format!("{}/", api_url.path());
            api_url.set_path(&path);
        }
        let graphql_url = api_url
            .join("graphql")
            .map_err(|err| FeedError::config_error(format!("Invalid api url: {err}")))?;
        let upload_url = api_url
            .join("post-image")
            .map_err(|err| FeedError::config_error(format!("Invalid api url: {err}")))?;
        Ok(Self {
            http,
            graphql_url,
            upload_url,
        })
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        op: Operation,
        token: &Token,
        query: String,
        variables: Value,
    ) -> ApiResult<T> {
        tracing::debug!(?op, "graphql request");
        let response = self
            .http
            .post(self.graphql_url.clone())
            .bearer_auth(token.as_str())
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await
            .map_err(|err| ApiError::transport(err.to_string()))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|err| ApiError::transport(err.to_string()))?;

        // Resolver errors come back with a non-2xx status but a valid envelope,
        // so the body is always inspected first.
        match parse_envelope(op, &body) {
            Err(ApiError::Service { message }) if !status.is_success() => {
                tracing::warn!(?op, %status, "graphql request failed");
                Err(ApiError::service(format!("{message} (HTTP {status})")))
            }
            other => other,
        }
    }
}

#[async_trait]
impl FeedApi for GraphqlClient {
    async fn fetch_user(&self, token: &Token) -> ApiResult<String> {
        let query = "query getUser { user { _id status } }".to_string();
        let data: UserData = self
            .execute(Operation::FetchUser, token, query, json!({}))
            .await?;
        Ok(data.user.status)
    }

    async fn fetch_posts_page(&self, token: &Token, page: u32) -> ApiResult<PostsPage> {
        let query = format!(
            "query getPosts($page: Int) {{ posts(page: $page) {{ posts {{ {POST_FIELDS} }} totalItems }} }}"
        );
        let data: PostsData = self
            .execute(Operation::FetchPosts, token, query, json!({ "page": page }))
            .await?;
        Ok(data.posts)
    }

    async fn fetch_post(&self, token: &Token, id: &PostId) -> ApiResult<Post> {
        let query = format!("query getPost($id: ID!) {{ post(id: $id) {{ {POST_FIELDS} }} }}");
        let data: PostData = self
            .execute(Operation::FetchPost, token, query, json!({ "id": id }))
            .await?;
        Ok(data.post)
    }

    async fn upload_image(
        &self,
        token: &Token,
        image: &ImageUpload,
        old_path: Option<&str>,
    ) -> ApiResult<String> {
        let part = Part::bytes(image.bytes.clone())
            .file_name(image.file_name.clone())
            .mime_str(&image.content_type)
            .map_err(|err| ApiError::transport(err.to_string()))?;
        let mut form = Form::new().part("image", part);
        if let Some(old_path) = old_path {
            form = form.text("oldPath", old_path.to_string());
        }

        let response = self
            .http
            .put(self.upload_url.clone())
            .bearer_auth(token.as_str())
            .multipart(form)
            .send()
            .await
            .map_err(|err| ApiError::transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(%status, "image upload rejected");
            return Err(Operation::UploadImage.classify(Some(status.as_u16()), String::new()));
        }
        let uploaded: UploadResponse = response
            .json()
            .await
            .map_err(|err| ApiError::service(format!("Could not upload image. {err}")))?;
        Ok(uploaded.file_path)
    }

    async fn save_post(
        &self,
        token: &Token,
        target: &DraftTarget,
        input: &PostInput,
    ) -> ApiResult<Post> {
        let (query, variables) = match target {
            DraftTarget::Create => (
                format!(
                    "mutation createPost($input: PostInput!) {{ createPost(input: $input) {{ {POST_FIELDS} }} }}"
                ),
                json!({ "input": input }),
            ),
            DraftTarget::Update { id } => (
                format!(
                    "mutation updatePost($input: PostInput!, $id: ID!) {{ updatePost(input: $input, id: $id) {{ {POST_FIELDS} }} }}"
                ),
                json!({ "input": input, "id": id }),
            ),
        };
        let data: SaveData = self
            .execute(Operation::SavePost, token, query, variables)
            .await?;
        data.create_post
            .or(data.update_post)
            .ok_or_else(|| ApiError::service("Could not create or edit post."))
    }

    async fn delete_post(&self, token: &Token, id: &PostId) -> ApiResult<PostId> {
        let query = "mutation deletePost($id: ID!) { deletePost(id: $id) { _id } }".to_string();
        let data: DeleteData = self
            .execute(Operation::DeletePost, token, query, json!({ "id": id }))
            .await?;
        Ok(data.delete_post.id)
    }

    async fn update_status(&self, token: &Token, status: &str) -> ApiResult<String> {
        let query =
            "mutation updateStatus($status: String!) { updateStatus(status: $status) { _id status } }"
                .to_string();
        let data: StatusData = self
            .execute(Operation::UpdateStatus, token, query, json!({ "status": status }))
            .await?;
        Ok(data.update_status.status)
    }
}
