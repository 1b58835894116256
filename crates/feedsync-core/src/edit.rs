//! Create/edit form lifecycle: `Idle -> Editing -> Submitting -> Idle`.

use crate::error::{ApiError, Operation};
use crate::post::{ImageUpload, Post, PostId};
use crate::FeedError;

/// Whether the draft creates a new post or updates an existing one. Fixed
/// when editing starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DraftTarget {
    Create,
    Update { id: PostId },
}

/// Working copy of a post's fields. Editing an existing post copies its
/// values, so live updates to that post never reach the draft.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditDraft {
    pub target: DraftTarget,
    pub title: String,
    pub content: String,
    /// Current image reference; reused when no new image is picked.
    pub image_url: String,
    /// Newly picked image, uploaded before the mutation.
    pub image: Option<ImageUpload>,
}

impl EditDraft {
    pub fn new_post() -> Self {
        Self {
            target: DraftTarget::Create,
            title: String::new(),
            content: String::new(),
            image_url: String::new(),
            image: None,
        }
    }

    pub fn from_post(post: &Post) -> Self {
        Self {
            target: DraftTarget::Update {
                id: post.id.clone(),
            },
            title: post.title.clone(),
            content: post.content.clone(),
            image_url: post.image_url.clone(),
            image: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditState {
    Idle,
    Editing(EditDraft),
    Submitting(DraftTarget),
}

#[derive(Debug)]
pub struct EditSession {
    state: EditState,
    last_error: Option<String>,
}

impl Default for EditSession {
    fn default() -> Self {
        Self {
            state: EditState::Idle,
            last_error: None,
        }
    }
}

impl EditSession {
    pub fn state(&self) -> &EditState {
        &self.state
    }

    /// Error of the last failed submit, kept for display until the next edit.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn is_submitting(&self) -> bool {
        matches!(self.state, EditState::Submitting(_))
    }

    pub fn start_new(&mut self) -> Result<(), FeedError> {
        self.open(EditDraft::new_post())
    }

    pub fn start_edit(&mut self, post: &Post) -> Result<(), FeedError> {
        self.open(EditDraft::from_post(post))
    }

    fn open(&mut self, draft: EditDraft) -> Result<(), FeedError> {
        if self.is_submitting() {
            return Err(FeedError::EditInProgress);
        }
        self.last_error = None;
        self.state = EditState::Editing(draft);
        Ok(())
    }

    pub fn draft(&self) -> Option<&EditDraft> {
        match &self.state {
            EditState::Editing(draft) => Some(draft),
            _ => None,
        }
    }

    pub fn draft_mut(&mut self) -> Result<&mut EditDraft, FeedError> {
        match &mut self.state {
            EditState::Editing(draft) => Ok(draft),
            _ => Err(FeedError::NotEditing),
        }
    }

    /// Drops the draft. A no-op while submitting; the response decides.
    pub fn cancel(&mut self) {
        if let EditState::Editing(_) = self.state {
            self.state = EditState::Idle;
        }
    }

    /// Moves to `Submitting`, handing out the draft to send.
    pub fn begin_submit(&mut self) -> Result<EditDraft, FeedError> {
        match std::mem::replace(&mut self.state, EditState::Idle) {
            EditState::Editing(draft) => {
                self.state = EditState::Submitting(draft.target.clone());
                Ok(draft)
            }
            EditState::Submitting(target) => {
                self.state = EditState::Submitting(target);
                Err(FeedError::EditInProgress)
            }
            EditState::Idle => Err(FeedError::NotEditing),
        }
    }

    /// Back to `Idle` whatever the outcome. The draft is not kept on failure.
    pub fn finish_submit(&mut self, result: &Result<Post, ApiError>) {
        if !self.is_submitting() {
            return;
        }
        self.state = EditState::Idle;
        self.last_error = match result {
            Ok(_) => None,
            Err(err) => Some(err.describe(Operation::SavePost)),
        };
    }
}
