//! In-memory backend and helpers shared by the integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use feedsync_core::api::FeedApi;
use feedsync_core::credential::{SessionCredential, Token};
use feedsync_core::edit::DraftTarget;
use feedsync_core::post::{Creator, ImageUpload, Post, PostId, PostInput, PostsPage};
use feedsync_core::reconciler::LoadState;
use feedsync_core::session::{FeedHandle, FeedSession, FeedSnapshot};
use feedsync_core::{ApiError, ApiResult, Operation};

pub const PAGE_SIZE: usize = 2;

pub fn post(id: &str) -> Post {
    Post {
        id: PostId::new(id),
        title: format!("Post {id}"),
        content: format!("Content of {id}"),
        image_url: format!("images/{id}.png"),
        created_at: "2024-03-01T10:00:00.000Z".into(),
        creator: Creator { name: "Max".into() },
    }
}

/// Newest first, like the backend sorts them.
pub struct MemoryBackend {
    posts: Mutex<Vec<Post>>,
    fail_next_page: Mutex<Option<ApiError>>,
    pub uploads: Mutex<Vec<(String, Option<String>)>>,
    next_id: AtomicUsize,
}

impl MemoryBackend {
    pub fn with_posts(ids: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            posts: Mutex::new(ids.iter().map(|id| post(id)).collect()),
            fail_next_page: Mutex::new(None),
            uploads: Mutex::new(Vec::new()),
            next_id: AtomicUsize::new(1),
        })
    }

    pub fn fail_next_page(&self, err: ApiError) {
        *self.fail_next_page.lock().unwrap() = Some(err);
    }
}

#[async_trait]
impl FeedApi for MemoryBackend {
    async fn fetch_user(&self, _token: &Token) -> ApiResult<String> {
        Ok("I am new!".into())
    }

    async fn fetch_posts_page(&self, _token: &Token, page: u32) -> ApiResult<PostsPage> {
        if let Some(err) = self.fail_next_page.lock().unwrap().take() {
            return Err(err);
        }
        let posts = self.posts.lock().unwrap();
        let start = (page.max(1) as usize - 1) * PAGE_SIZE;
        Ok(PostsPage {
            posts: posts.iter().skip(start).take(PAGE_SIZE).cloned().collect(),
            total: posts.len() as u64,
        })
    }

    async fn fetch_post(&self, _token: &Token, id: &PostId) -> ApiResult<Post> {
        let posts = self.posts.lock().unwrap();
        posts
            .iter()
            .find(|p| &p.id == id)
            .cloned()
            .ok_or_else(|| Operation::FetchPost.classify(Some(404), "No post found!".into()))
    }

    async fn upload_image(
        &self,
        _token: &Token,
        image: &ImageUpload,
        old_path: Option<&str>,
    ) -> ApiResult<String> {
        let path = format!("images/{}", image.file_name);
        self.uploads
            .lock()
            .unwrap()
            .push((path.clone(), old_path.map(str::to_string)));
        Ok(path)
    }

    async fn save_post(
        &self,
        _token: &Token,
        target: &DraftTarget,
        input: &PostInput,
    ) -> ApiResult<Post> {
        let mut posts = self.posts.lock().unwrap();
        match target {
            DraftTarget::Create => {
                let id = format!("new{}", self.next_id.fetch_add(1, Ordering::SeqCst));
                let mut created = post(&id);
                created.title = input.title.clone();
                created.content = input.content.clone();
                created.image_url = input.image_url.clone();
                posts.insert(0, created.clone());
                Ok(created)
            }
            DraftTarget::Update { id } => {
                let existing = posts
                    .iter_mut()
                    .find(|p| &p.id == id)
                    .ok_or_else(|| Operation::SavePost.classify(Some(404), "No post found!".into()))?;
                existing.title = input.title.clone();
                existing.content = input.content.clone();
                existing.image_url = input.image_url.clone();
                Ok(existing.clone())
            }
        }
    }

    async fn delete_post(&self, _token: &Token, id: &PostId) -> ApiResult<PostId> {
        let mut posts = self.posts.lock().unwrap();
        let before = posts.len();
        posts.retain(|p| &p.id != id);
        if posts.len() == before {
            return Err(Operation::DeletePost.classify(Some(404), "No post found!".into()));
        }
        Ok(id.clone())
    }

    async fn update_status(&self, _token: &Token, status: &str) -> ApiResult<String> {
        Ok(status.to_string())
    }
}

pub async fn start(backend: &Arc<MemoryBackend>) -> FeedHandle {
    let credential = SessionCredential::new(Token::new("secret"), Duration::from_secs(3600));
    let api: Arc<dyn FeedApi> = backend.clone();
    let handle = FeedSession::spawn(api, credential, PAGE_SIZE);
    settle(&handle, |s| s.load == LoadState::Ready).await;
    handle
}

pub async fn settle<F>(handle: &FeedHandle, check: F) -> FeedSnapshot
where
    F: Fn(&FeedSnapshot) -> bool,
{
    let mut rx = handle.subscribe();
    loop {
        let snapshot = rx.borrow_and_update().clone();
        if check(&snapshot) {
            return snapshot;
        }
        rx.changed().await.expect("session stopped");
    }
}

pub fn ids(snapshot: &FeedSnapshot) -> Vec<&str> {
    snapshot.posts.iter().map(|p| p.id.as_str()).collect()
}
