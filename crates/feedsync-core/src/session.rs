//! The feed session: one task owning the reconciler, the edit session and the
//! user status. Callers talk to it through `FeedHandle`; backend calls run in
//! spawned tasks whose results come back through the session's event queue,
//! so live events keep flowing while a request is in flight.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};

use crate::api::FeedApi;
use crate::credential::{CredentialHolder, CredentialState, Token};
use crate::edit::{DraftTarget, EditDraft, EditSession, EditState};
use crate::error::{ApiError, ApiResult, Operation};
use crate::live::LiveEvent;
use crate::post::{Post, PostId, PostsPage};
use crate::reconciler::{LoadState, PageDelta, PageRequest, Reconciler};
use crate::{constant, FeedError, FeedResult};

/// Used to send acknowledgements back to the caller.
pub type Responder<T> = oneshot::Sender<T>;

type Reply = FeedResult<Response>;

pub enum Command {
    Navigate { delta: PageDelta },
    JumpTo { page: u32 },
    StartNewPost,
    StartEdit { id: PostId },
    EditDraft(Box<dyn FnOnce(&mut EditDraft) + Send>),
    CancelEdit,
    Submit,
    DeletePost { id: PostId },
    SetStatus { status: String },
    FetchPost { id: PostId },
    DismissError,
}

pub struct SessionCommand {
    pub cmd: Command,
    pub resp: Option<Responder<Reply>>,
}

#[derive(Debug)]
pub enum Response {
    Done,
    Page(FeedSnapshot),
    Post(Post),
    Deleted(PostId),
    Status(String),
}

enum Event {
    Live(LiveEvent),
    UserLoaded(ApiResult<String>),
    PageLoaded {
        generation: u64,
        result: ApiResult<PostsPage>,
    },
    Submitted {
        result: ApiResult<Post>,
        resp: Option<Responder<Reply>>,
    },
    Deleted {
        id: PostId,
        result: ApiResult<PostId>,
        resp: Option<Responder<Reply>>,
    },
    StatusUpdated {
        result: ApiResult<String>,
        resp: Option<Responder<Reply>>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum EditorStatus {
    Idle {
        error: Option<String>,
    },
    Editing {
        post_id: Option<PostId>,
        title: String,
        content: String,
        image_url: String,
    },
    Submitting {
        post_id: Option<PostId>,
    },
}

/// The signed in user's status line, as far as the session knows it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum UserStatus {
    Loading,
    /// May be empty; an empty status is still a loaded one.
    Loaded(String),
    Failed(String),
}

impl UserStatus {
    pub fn text(&self) -> Option<&str> {
        match self {
            UserStatus::Loaded(status) => Some(status),
            _ => None,
        }
    }
}

/// Everything a presentation layer needs, published after every change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedSnapshot {
    pub page: u32,
    pub page_size: usize,
    pub total: u64,
    pub last_page: u32,
    pub can_previous: bool,
    pub can_next: bool,
    pub load: LoadState,
    pub posts: Vec<Post>,
    pub status: UserStatus,
    pub editor: EditorStatus,
    pub error: Option<String>,
    pub expired: bool,
}

/// Entry point for the live channel into the session.
#[derive(Clone)]
pub struct LiveSink {
    events: mpsc::UnboundedSender<Event>,
}

impl LiveSink {
    /// Returns `false` once the session is gone.
    pub fn deliver(&self, event: LiveEvent) -> bool {
        self.events.send(Event::Live(event)).is_ok()
    }
}

#[derive(Clone)]
pub struct FeedHandle {
    requests: mpsc::Sender<SessionCommand>,
    events: mpsc::UnboundedSender<Event>,
    view: watch::Receiver<FeedSnapshot>,
}

impl FeedHandle {
    async fn request(&self, cmd: Command) -> Reply {
        let (resp, rx) = oneshot::channel();
        self.requests
            .send(SessionCommand {
                cmd,
                resp: Some(resp),
            })
            .await
            .map_err(|_| FeedError::SessionClosed)?;
        rx.await.map_err(|_| FeedError::SessionClosed)?
    }

    async fn request_page(&self, cmd: Command) -> FeedResult<FeedSnapshot> {
        match self.request(cmd).await? {
            Response::Page(snapshot) => Ok(snapshot),
            other => Err(unexpected(other)),
        }
    }

    /// Moves one page back or forth, or reloads; resolves once the page has
    /// landed.
    pub async fn navigate(&self, delta: PageDelta) -> FeedResult<FeedSnapshot> {
        self.request_page(Command::Navigate { delta }).await
    }

    pub async fn reload(&self) -> FeedResult<FeedSnapshot> {
        self.navigate(PageDelta::Reload).await
    }

    pub async fn jump_to(&self, page: u32) -> FeedResult<FeedSnapshot> {
        self.request_page(Command::JumpTo { page }).await
    }

    pub async fn start_new_post(&self) -> FeedResult<()> {
        self.request(Command::StartNewPost).await.map(|_| ())
    }

    /// Opens the editor on a post of the current page.
    pub async fn start_edit(&self, id: PostId) -> FeedResult<()> {
        self.request(Command::StartEdit { id }).await.map(|_| ())
    }

    pub async fn edit_draft<F>(&self, edit: F) -> FeedResult<()>
    where
        F: FnOnce(&mut EditDraft) + Send + 'static,
    {
        self.request(Command::EditDraft(Box::new(edit)))
            .await
            .map(|_| ())
    }

    pub async fn cancel_edit(&self) -> FeedResult<()> {
        self.request(Command::CancelEdit).await.map(|_| ())
    }

    /// Submits the open draft. The returned post is not inserted into the
    /// feed; that happens when the server echoes it on the live channel.
    pub async fn submit(&self) -> FeedResult<Post> {
        match self.request(Command::Submit).await? {
            Response::Post(post) => Ok(post),
            other => Err(unexpected(other)),
        }
    }

    pub async fn delete_post(&self, id: PostId) -> FeedResult<PostId> {
        match self.request(Command::DeletePost { id }).await? {
            Response::Deleted(id) => Ok(id),
            other => Err(unexpected(other)),
        }
    }

    pub async fn set_status(&self, status: String) -> FeedResult<String> {
        match self.request(Command::SetStatus { status }).await? {
            Response::Status(status) => Ok(status),
            other => Err(unexpected(other)),
        }
    }

    /// Fetches a single post, independent of the current page.
    pub async fn fetch_post(&self, id: PostId) -> FeedResult<Post> {
        match self.request(Command::FetchPost { id }).await? {
            Response::Post(post) => Ok(post),
            other => Err(unexpected(other)),
        }
    }

    pub async fn dismiss_error(&self) -> FeedResult<()> {
        self.request(Command::DismissError).await.map(|_| ())
    }

    pub fn snapshot(&self) -> FeedSnapshot {
        self.view.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<FeedSnapshot> {
        self.view.clone()
    }

    pub fn live_sink(&self) -> LiveSink {
        LiveSink {
            events: self.events.clone(),
        }
    }
}

fn unexpected(response: Response) -> anyhow::Error {
    FeedError::custom_error(format!("Unexpected session response: {response:?}")).into()
}

pub struct FeedSession {
    api: Arc<dyn FeedApi>,
    credential: Arc<dyn CredentialHolder>,
    reconciler: Reconciler,
    editor: EditSession,
    status: UserStatus,
    error: Option<String>,
    expired: bool,
    pending_pages: Vec<Responder<Reply>>,
    events: mpsc::UnboundedSender<Event>,
    view: watch::Sender<FeedSnapshot>,
}

impl FeedSession {
    /// Starts the session task. It fetches the user status and the first
    /// page right away, and stops once every `FeedHandle` is dropped.
    pub fn spawn(
        api: Arc<dyn FeedApi>,
        credential: Arc<dyn CredentialHolder>,
        page_size: usize,
    ) -> FeedHandle {
        let (requests_tx, requests_rx) = mpsc::channel(constant::SESSION_MAILBOX_SIZE);
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let reconciler = Reconciler::new(page_size);
        let editor = EditSession::default();
        let initial = FeedSnapshot {
            page: reconciler.page(),
            page_size: reconciler.window().page_size,
            total: 0,
            last_page: 0,
            can_previous: false,
            can_next: false,
            load: LoadState::Loading,
            posts: Vec::new(),
            status: UserStatus::Loading,
            editor: EditorStatus::Idle { error: None },
            error: None,
            expired: false,
        };
        let (view_tx, view_rx) = watch::channel(initial);

        let session = FeedSession {
            api,
            credential,
            reconciler,
            editor,
            status: UserStatus::Loading,
            error: None,
            expired: false,
            pending_pages: Vec::new(),
            events: events_tx.clone(),
            view: view_tx,
        };
        tokio::spawn(session.run(requests_rx, events_rx));

        FeedHandle {
            requests: requests_tx,
            events: events_tx,
            view: view_rx,
        }
    }

    async fn run(
        mut self,
        mut requests: mpsc::Receiver<SessionCommand>,
        mut events: mpsc::UnboundedReceiver<Event>,
    ) {
        let mut expiry = self.credential.expiry();
        let mut watch_expiry = true;
        let state = *expiry.borrow();
        if state == CredentialState::Expired {
            self.on_expired();
        }

        self.load_user();
        if let Some(request) = self.reconciler.begin_load(PageDelta::Reload) {
            self.fetch_page(request);
        }
        self.publish();

        loop {
            tokio::select! {
                biased;
                event = events.recv() => match event {
                    Some(event) => self.handle_event(event),
                    None => break,
                },
                request = requests.recv() => match request {
                    Some(SessionCommand { cmd, resp }) => self.handle_command(cmd, resp),
                    None => break,
                },
                changed = expiry.changed(), if watch_expiry && !self.expired => {
                    if changed.is_err() {
                        watch_expiry = false;
                    } else {
                        let state = *expiry.borrow();
                        if state == CredentialState::Expired {
                            self.on_expired();
                        }
                    }
                }
            }
            self.publish();
        }
        tracing::info!("feed session stopped");
    }

    fn on_expired(&mut self) {
        tracing::info!("credential expired, network calls disabled");
        self.expired = true;
        self.error = Some("Your session has expired. Please log in again.".to_string());
    }

    // ***
    // Command handlers
    // ***

    fn handle_command(&mut self, cmd: Command, resp: Option<Responder<Reply>>) {
        match cmd {
            Command::Navigate { delta } => match self.reconciler.begin_load(delta) {
                Some(request) => self.start_page_load(request, resp),
                None => respond(resp, Ok(Response::Page(self.snapshot()))),
            },

            Command::JumpTo { page } => {
                let request = self.reconciler.begin_jump(page);
                self.start_page_load(request, resp);
            }

            Command::StartNewPost => {
                let result = self.editor.start_new();
                respond(resp, result.map(|_| Response::Done).map_err(Into::into));
            }

            Command::StartEdit { id } => {
                let result = match self.reconciler.find(&id) {
                    Some(post) => self.editor.start_edit(post),
                    None => Err(FeedError::PostNotInView { id: id.to_string() }),
                };
                respond(resp, result.map(|_| Response::Done).map_err(Into::into));
            }

            Command::EditDraft(edit) => {
                let result = self.editor.draft_mut().map(edit);
                respond(resp, result.map(|_| Response::Done).map_err(Into::into));
            }

            Command::CancelEdit => {
                self.editor.cancel();
                respond(resp, Ok(Response::Done));
            }

            Command::Submit => match self.editor.begin_submit() {
                Ok(draft) => self.submit(draft, resp),
                Err(err) => respond(resp, Err(err.into())),
            },

            Command::DeletePost { id } => self.delete(id, resp),

            Command::SetStatus { status } => self.update_status(status, resp),

            Command::FetchPost { id } => self.fetch_post(id, resp),

            Command::DismissError => {
                self.error = None;
                respond(resp, Ok(Response::Done));
            }
        }
    }

    fn handle_event(&mut self, event: Event) {
        match event {
            Event::Live(event) => self.reconciler.apply_live_event(event),

            Event::UserLoaded(result) => match result {
                Ok(status) => self.status = UserStatus::Loaded(status),
                Err(err) => {
                    self.status = UserStatus::Failed(err.describe(Operation::FetchUser));
                    self.fail(Operation::FetchUser, &err);
                }
            },

            Event::PageLoaded { generation, result } => {
                let failure = result.as_ref().err().cloned();
                if !self.reconciler.finish_load(generation, result) {
                    return;
                }
                if let Some(err) = &failure {
                    self.fail(Operation::FetchPosts, err);
                }
                for resp in std::mem::take(&mut self.pending_pages) {
                    let reply = match &failure {
                        None => Ok(Response::Page(self.snapshot())),
                        Some(err) => Err(FeedError::api(Operation::FetchPosts, err.clone()).into()),
                    };
                    let _ = resp.send(reply);
                }
            }

            Event::Submitted { result, resp } => {
                self.editor.finish_submit(&result);
                match result {
                    Ok(post) => {
                        tracing::info!(id = %post.id, "post saved, waiting for live echo");
                        respond(resp, Ok(Response::Post(post)));
                    }
                    Err(err) => {
                        self.fail(Operation::SavePost, &err);
                        respond(resp, Err(FeedError::api(Operation::SavePost, err).into()));
                    }
                }
            }

            Event::Deleted { id, result, resp } => match result {
                Ok(_) => {
                    self.reconciler.confirm_delete(id.clone());
                    respond(resp, Ok(Response::Deleted(id)));
                }
                Err(err) => {
                    self.fail(Operation::DeletePost, &err);
                    respond(resp, Err(FeedError::api(Operation::DeletePost, err).into()));
                }
            },

            Event::StatusUpdated { result, resp } => match result {
                Ok(status) => {
                    self.status = UserStatus::Loaded(status.clone());
                    respond(resp, Ok(Response::Status(status)));
                }
                Err(err) => {
                    self.fail(Operation::UpdateStatus, &err);
                    respond(resp, Err(FeedError::api(Operation::UpdateStatus, err).into()));
                }
            },
        }
    }

    fn fail(&mut self, op: Operation, err: &ApiError) {
        let msg = err.describe(op);
        tracing::warn!(?op, error = %msg, "backend call failed");
        self.error = Some(msg);
    }

    // ***
    // Backend calls
    // ***

    fn bearer(&self) -> ApiResult<Token> {
        if self.expired {
            return Err(ApiError::unauthorized("Your session has expired."));
        }
        self.credential
            .bearer()
            .ok_or_else(|| ApiError::unauthorized("Your session has expired."))
    }

    fn start_page_load(&mut self, request: PageRequest, resp: Option<Responder<Reply>>) {
        for stale in std::mem::take(&mut self.pending_pages) {
            let _ = stale.send(Err(FeedError::Superseded.into()));
        }
        if let Some(resp) = resp {
            self.pending_pages.push(resp);
        }
        self.fetch_page(request);
    }

    fn fetch_page(&self, request: PageRequest) {
        let api = Arc::clone(&self.api);
        let token = self.bearer();
        let events = self.events.clone();
        tokio::spawn(async move {
            let result = match token {
                Ok(token) => api.fetch_posts_page(&token, request.page).await,
                Err(err) => Err(err),
            };
            let _ = events.send(Event::PageLoaded {
                generation: request.generation,
                result,
            });
        });
    }

    fn load_user(&self) {
        let api = Arc::clone(&self.api);
        let token = self.bearer();
        let events = self.events.clone();
        tokio::spawn(async move {
            let result = match token {
                Ok(token) => api.fetch_user(&token).await,
                Err(err) => Err(err),
            };
            let _ = events.send(Event::UserLoaded(result));
        });
    }

    fn submit(&self, draft: EditDraft, resp: Option<Responder<Reply>>) {
        let api = Arc::clone(&self.api);
        let token = self.bearer();
        let events = self.events.clone();
        tokio::spawn(async move {
            let result = match token {
                Ok(token) => api.submit_post(&token, &draft).await,
                Err(err) => Err(err),
            };
            let _ = events.send(Event::Submitted { result, resp });
        });
    }

    fn delete(&self, id: PostId, resp: Option<Responder<Reply>>) {
        let api = Arc::clone(&self.api);
        let token = self.bearer();
        let events = self.events.clone();
        tokio::spawn(async move {
            let result = match token {
                Ok(token) => api.delete_post(&token, &id).await,
                Err(err) => Err(err),
            };
            let _ = events.send(Event::Deleted { id, result, resp });
        });
    }

    fn update_status(&self, status: String, resp: Option<Responder<Reply>>) {
        let api = Arc::clone(&self.api);
        let token = self.bearer();
        let events = self.events.clone();
        tokio::spawn(async move {
            let result = match token {
                Ok(token) => api.update_status(&token, &status).await,
                Err(err) => Err(err),
            };
            let _ = events.send(Event::StatusUpdated { result, resp });
        });
    }

    /// Touches no session state, so the reply goes straight to the caller.
    fn fetch_post(&self, id: PostId, resp: Option<Responder<Reply>>) {
        let api = Arc::clone(&self.api);
        let token = self.bearer();
        tokio::spawn(async move {
            let result = match token {
                Ok(token) => api.fetch_post(&token, &id).await,
                Err(err) => Err(err),
            };
            let reply = result
                .map(Response::Post)
                .map_err(|err| FeedError::api(Operation::FetchPost, err).into());
            respond(resp, reply);
        });
    }

    // ***
    // Helpers
    // ***

    fn snapshot(&self) -> FeedSnapshot {
        let window = self.reconciler.window();
        let editor = match self.editor.state() {
            EditState::Idle => EditorStatus::Idle {
                error: self.editor.last_error().map(str::to_string),
            },
            EditState::Editing(draft) => EditorStatus::Editing {
                post_id: target_id(&draft.target),
                title: draft.title.clone(),
                content: draft.content.clone(),
                image_url: draft.image_url.clone(),
            },
            EditState::Submitting(target) => EditorStatus::Submitting {
                post_id: target_id(target),
            },
        };
        FeedSnapshot {
            page: window.page,
            page_size: window.page_size,
            total: window.total,
            last_page: window.last_page(),
            can_previous: window.can_previous(),
            can_next: window.can_next(),
            load: self.reconciler.state().clone(),
            posts: self.reconciler.posts().to_vec(),
            status: self.status.clone(),
            editor,
            error: self.error.clone(),
            expired: self.expired,
        }
    }

    fn publish(&self) {
        let snapshot = self.snapshot();
        self.view.send_if_modified(|current| {
            if *current == snapshot {
                return false;
            }
            *current = snapshot;
            true
        });
    }
}

fn target_id(target: &DraftTarget) -> Option<PostId> {
    match target {
        DraftTarget::Create => None,
        DraftTarget::Update { id } => Some(id.clone()),
    }
}

/// The caller may have stopped waiting; a failed send is not an error.
fn respond(resp: Option<Responder<Reply>>, reply: Reply) {
    if let Some(resp) = resp {
        let _ = resp.send(reply);
    }
}
