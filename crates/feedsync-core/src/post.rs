//! This module defines the `Post` struct, the unit everything in the feed
//! is made of, together with the shapes used to create and page through posts.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::path::Path;
use textwrap::core::display_width;
use textwrap::{self, wrap};

/// Server assigned identifier of a post. Opaque; only compared for equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PostId(String);

impl PostId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for PostId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}


#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Creator {
    pub name: String,
}

/// A post as delivered by the backend, either from a page fetch, a
/// mutation response or a live event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    #[serde(rename = "_id")]
    pub id: PostId,
    pub title: String,
    pub content: String,
    pub image_url: String,
    pub created_at: String,
    pub creator: Creator,
}

impl Post {
    /// Date part of `created_at` (the backend sends ISO-8601 timestamps).
    pub fn created_on(&self) -> &str {
        self.created_at
            .split_once('T')
            .map_or(self.created_at.as_str(), |(date, _)| date)
    }
}

/// One page of posts plus the authoritative number of posts on the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostsPage {
    pub posts: Vec<Post>,
    #[serde(rename = "totalItems")]
    pub total: u64,
}

/// Fields sent with a create or update mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostInput {
    pub title: String,
    pub content: String,
    pub image_url: String,
}

/// Raw image picked by the user, uploaded before the post mutation.
#[derive(Clone, PartialEq, Eq)]
pub struct ImageUpload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl ImageUpload {
    pub fn new(file_name: impl Into<String>, content_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            bytes,
        }
    }

    /// Reads an image from disk, guessing the content type from the extension.
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let bytes = std::fs::read(path)?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string());
        let content_type = match path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .as_deref()
        {
            Some("png") => "image/png",
            Some("jpg") | Some("jpeg") => "image/jpeg",
            Some("gif") => "image/gif",
            Some("webp") => "image/webp",
            _ => "application/octet-stream",
        };
        Ok(Self::new(file_name, content_type, bytes))
    }
}

impl std::fmt::Debug for ImageUpload {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageUpload")
            .field("file_name", &self.file_name)
            .field("content_type", &self.content_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl Display for Post {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:-<54}\n", "")?;
        write!(f, "\\ {:^50} /\n", self.title)?;
        let byline = format!("by {} on {}", self.creator.name, self.created_on());
        write!(f, "/ {:^50} \\\n", byline)?;
        let mut count = 0u8;
        let content_width = 50;
        let wrapping_config = textwrap::Options::new(content_width).break_words(true);
        for line in wrap(&format!("{}\n", self.content), wrapping_config) {
            let (left_closure, right_closure) = if count % 2 == 0 {
                ("\\ ", " /")
            } else {
                ("/ ", " \\")
            };
            let text_width = display_width(&line);
            let whitespace = content_width.saturating_sub(text_width);
            write!(
                f,
                "{left_closure}{}{}{right_closure}\n",
                line,
                " ".repeat(whitespace)
            )?;
            count = count.wrapping_add(1);
        }
        write!(f, "[{}] {}\n", self.id, self.image_url)?;
        write!(f, "{:-<54}", "")
    }
}
