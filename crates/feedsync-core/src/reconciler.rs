use std::collections::{HashSet, VecDeque};

use serde::Serialize;

use crate::constant::{DEFAULT_PAGE_SIZE, TOMBSTONE_LIMIT};
use crate::error::{ApiError, Operation};
use crate::live::LiveEvent;
use crate::post::{Post, PostId, PostsPage};

/// Navigation step requested by the paginator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageDelta {
    Previous,
    /// Reload the current page from scratch.
    Reload,
    Next,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "message", rename_all = "snake_case")]
pub enum LoadState {
    Loading,
    Ready,
    Error(String),
}

/// Pagination cursor. `total` is whatever the server last reported, adjusted
/// by live creates and deletes since.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub page: u32,
    pub page_size: usize,
    pub total: u64,
}

impl PageWindow {
    pub fn last_page(&self) -> u32 {
        if self.page_size == 0 {
            return 0;
        }
        self.total.div_ceil(self.page_size as u64) as u32
    }

    pub fn can_previous(&self) -> bool {
        self.page > 1
    }

    pub fn can_next(&self) -> bool {
        self.page < self.last_page()
    }
}

/// A page fetch the caller has to issue. `generation` ties the response back
/// to the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub generation: u64,
    pub page: u32,
}

/// Posts materialized for one page.
#[derive(Debug, Clone, PartialEq, Eq)]
struct FeedView {
    page: u32,
    posts: Vec<Post>,
}

impl FeedView {
    fn position(&self, id: &PostId) -> Option<usize> {
        self.posts.iter().position(|post| &post.id == id)
    }

    fn apply(&mut self, event: &LiveEvent, page_size: usize) {
        match event {
            LiveEvent::Created(post) => {
                // New posts only ever show up at the head of the first page.
                if self.page != 1 {
                    return;
                }
                match self.position(&post.id) {
                    Some(idx) => self.posts[idx] = post.clone(),
                    None => {
                        self.posts.insert(0, post.clone());
                        self.posts.truncate(page_size);
                    }
                }
            }
            LiveEvent::Updated(post) => {
                if let Some(idx) = self.position(&post.id) {
                    self.posts[idx] = post.clone();
                }
            }
            LiveEvent::Deleted(id) => {
                if let Some(idx) = self.position(id) {
                    self.posts.remove(idx);
                }
            }
        }
    }
}

/// Owner of the visible feed. Merges page loads, live events and local
/// deletes into one view. Performs no I/O; the session drives it.
#[derive(Debug)]
pub struct Reconciler {
    view: FeedView,
    /// Last good view, restored if the pending load fails.
    fallback: Option<FeedView>,
    /// Events seen while loading, replayed onto the page once it lands.
    replay: Vec<LiveEvent>,
    page_size: usize,
    total: u64,
    state: LoadState,
    generation: u64,
    /// Ids already counted as deleted, oldest first in `buried`.
    tombstones: HashSet<PostId>,
    buried: VecDeque<PostId>,
}

impl Default for Reconciler {
    fn default() -> Self {
        Reconciler::new(DEFAULT_PAGE_SIZE)
    }
}

impl Reconciler {
    pub fn new(page_size: usize) -> Self {
        Reconciler {
            view: FeedView {
                page: 1,
                posts: Vec::with_capacity(page_size),
            },
            fallback: None,
            replay: Vec::new(),
            page_size: page_size.max(1),
            total: 0,
            state: LoadState::Ready,
            generation: 0,
            tombstones: HashSet::new(),
            buried: VecDeque::new(),
        }
    }

    // ***
    // Page loads
    // ***

    /// Starts a page load relative to the current page. `Previous` on the
    /// first page does nothing. `Next` is never rejected locally; past the
    /// last page the server simply returns nothing.
    pub fn begin_load(&mut self, delta: PageDelta) -> Option<PageRequest> {
        let page = match delta {
            PageDelta::Previous if self.view.page <= 1 => return None,
            PageDelta::Previous => self.view.page - 1,
            PageDelta::Reload => self.view.page,
            PageDelta::Next => self.view.page.saturating_add(1),
        };
        Some(self.begin_jump(page))
    }

    /// Starts loading `page` (clamped to 1). The view is cleared right away
    /// and the previous one is kept aside until the response lands.
    pub fn begin_jump(&mut self, page: u32) -> PageRequest {
        let page = page.max(1);
        if self.fallback.is_none() {
            self.fallback = Some(self.view.clone());
        }
        self.replay.clear();
        self.generation += 1;
        self.view = FeedView {
            page,
            posts: Vec::with_capacity(self.page_size),
        };
        self.state = LoadState::Loading;
        tracing::debug!(page, generation = self.generation, "page load started");
        PageRequest {
            generation: self.generation,
            page,
        }
    }

    /// Applies the response of a page request. Returns `false` when the
    /// response belongs to a request that has since been superseded.
    pub fn finish_load(&mut self, generation: u64, result: Result<PostsPage, ApiError>) -> bool {
        if generation != self.generation {
            tracing::debug!(generation, current = self.generation, "dropping stale page");
            return false;
        }
        match result {
            Ok(page) => {
                self.view.posts = page.posts;
                self.total = page.total;
                self.fallback = None;
                self.state = LoadState::Ready;
                for event in std::mem::take(&mut self.replay) {
                    self.view.apply(&event, self.page_size);
                }
            }
            Err(err) => {
                if let Some(view) = self.fallback.take() {
                    self.view = view;
                }
                self.replay.clear();
                let msg = err.describe(Operation::FetchPosts);
                tracing::warn!(error = %msg, "page load failed");
                self.state = LoadState::Error(msg);
            }
        }
        true
    }

    // ***
    // Live events and local mutations
    // ***

    /// Merges one live event into the current state, whatever page is
    /// showing or loading.
    pub fn apply_live_event(&mut self, event: LiveEvent) {
        match &event {
            LiveEvent::Created(post) => {
                if self.tombstones.contains(&post.id) {
                    return;
                }
                // A repeated create for a visible post only refreshes it.
                if self.view.position(&post.id).is_none() {
                    self.total += 1;
                }
            }
            LiveEvent::Updated(post) => {
                if self.tombstones.contains(&post.id) {
                    return;
                }
            }
            LiveEvent::Deleted(id) => {
                if !self.bury(id.clone()) {
                    return;
                }
                self.total = self.total.saturating_sub(1);
            }
        }

        self.view.apply(&event, self.page_size);
        if let Some(fallback) = self.fallback.as_mut() {
            fallback.apply(&event, self.page_size);
        }
        if self.state == LoadState::Loading {
            self.replay.push(event);
        }
    }

    /// Removal after the delete mutation succeeded. Shares the delete
    /// bookkeeping with live events, so the echoed event is a no-op.
    pub fn confirm_delete(&mut self, id: PostId) {
        self.apply_live_event(LiveEvent::Deleted(id));
    }

    /// Records `id` as deleted. Returns `false` if it already was. Only the
    /// most recent `TOMBSTONE_LIMIT` ids are remembered.
    fn bury(&mut self, id: PostId) -> bool {
        if !self.tombstones.insert(id.clone()) {
            return false;
        }
        self.buried.push_back(id);
        if self.buried.len() > TOMBSTONE_LIMIT {
            if let Some(oldest) = self.buried.pop_front() {
                self.tombstones.remove(&oldest);
            }
        }
        true
    }

    // ***
    // Accessors
    // ***

    pub fn posts(&self) -> &[Post] {
        &self.view.posts
    }

    pub fn find(&self, id: &PostId) -> Option<&Post> {
        self.view.position(id).map(|idx| &self.view.posts[idx])
    }

    pub fn window(&self) -> PageWindow {
        PageWindow {
            page: self.view.page,
            page_size: self.page_size,
            total: self.total,
        }
    }

    pub fn page(&self) -> u32 {
        self.view.page
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn last_page_number(&self) -> u32 {
        self.window().last_page()
    }

    pub fn state(&self) -> &LoadState {
        &self.state
    }

    pub fn is_loading(&self) -> bool {
        self.state == LoadState::Loading
    }
}
