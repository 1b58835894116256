mod error;

pub use error::CliError;

use std::fmt::Write;
use std::io::{BufRead, Read};
use std::time::Duration;

use feedsync_core::reconciler::LoadState;
use feedsync_core::session::{EditorStatus, FeedSnapshot, UserStatus};
use feedsync_core::FeedResult;
use tokio::sync::watch;

/// Text rendering of a snapshot, or pretty JSON when `json` is set.
pub fn render_snapshot(snapshot: &FeedSnapshot, json: bool) -> FeedResult<String> {
    if json {
        return Ok(serde_json::to_string_pretty(snapshot)?);
    }

    let mut out = String::new();
    match snapshot.status.text() {
        Some(status) if !status.is_empty() => writeln!(out, "status: {status}")?,
        _ => {}
    }
    match &snapshot.load {
        LoadState::Loading => writeln!(out, "Loading...")?,
        LoadState::Error(msg) => writeln!(out, "! {msg}")?,
        LoadState::Ready if snapshot.posts.is_empty() => writeln!(out, "No posts found.")?,
        LoadState::Ready => {}
    }
    for post in snapshot.posts.iter() {
        writeln!(out, "{post}")?;
    }
    match &snapshot.editor {
        EditorStatus::Idle { error: Some(err) } => writeln!(out, "editor: {err}")?,
        EditorStatus::Idle { error: None } => {}
        EditorStatus::Editing { post_id, title, .. } => match post_id {
            Some(id) => writeln!(out, "editing {id}: {title}")?,
            None => writeln!(out, "writing new post: {title}")?,
        },
        EditorStatus::Submitting { .. } => writeln!(out, "saving post...")?,
    }
    if let Some(err) = &snapshot.error {
        if !matches!(&snapshot.load, LoadState::Error(msg) if msg == err) {
            writeln!(out, "! {err}")?;
        }
    }
    let previous = if snapshot.can_previous { "<" } else { " " };
    let next = if snapshot.can_next { ">" } else { " " };
    write!(
        out,
        "{previous} page {}/{} ({} posts) {next}",
        snapshot.page,
        snapshot.last_page.max(1),
        snapshot.total
    )?;
    Ok(out)
}

/// Waits until `check` holds for the published snapshot.
pub async fn settle<F>(
    rx: &mut watch::Receiver<FeedSnapshot>,
    timeout: Duration,
    check: F,
) -> FeedResult<FeedSnapshot>
where
    F: Fn(&FeedSnapshot) -> bool,
{
    let wait = async {
        loop {
            let snapshot = rx.borrow_and_update().clone();
            if check(&snapshot) {
                return Ok(snapshot);
            }
            if rx.changed().await.is_err() {
                return Err(CliError::custom_error("feed session stopped".into()));
            }
        }
    };
    match tokio::time::timeout(timeout, wait).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(CliError::Timeout.into()),
    }
}

/// Waits for the user fetch issued at session start. A failed page load
/// does not count; only the status request decides the outcome.
pub async fn wait_for_status(
    rx: &mut watch::Receiver<FeedSnapshot>,
    timeout: Duration,
) -> FeedResult<String> {
    let snapshot = settle(rx, timeout, |s| s.status != UserStatus::Loading).await?;
    match snapshot.status {
        UserStatus::Loaded(status) => Ok(status),
        UserStatus::Failed(msg) => Err(CliError::custom_error(msg).into()),
        UserStatus::Loading => Err(CliError::Timeout.into()),
    }
}

/// Reads a single trimmed line, used when a required field was not passed
/// on the command line.
pub fn prompt_line<R: BufRead>(input: &mut R, label: &str) -> FeedResult<String> {
    eprint!("{label}: ");
    let mut buf = String::new();
    input.read_line(&mut buf)?;
    let line = buf.trim().to_string();
    if line.is_empty() {
        return Err(CliError::custom_error(format!("{label} cannot be empty")).into());
    }
    Ok(line)
}

/// Reads until EOF (Ctrl-d) and joins the lines with single spaces.
pub fn prompt_block<R: Read>(input: &mut R, label: &str) -> FeedResult<String> {
    eprintln!("{label} (press Ctrl-d on a new line to end): ");
    let mut buf = String::new();
    input.read_to_string(&mut buf)?;
    let block = buf
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    if block.is_empty() {
        return Err(CliError::custom_error(format!("{label} cannot be empty")).into());
    }
    Ok(block)
}

#[cfg(test)]
mod tests {
    use super::*;
    use feedsync_core::post::{Creator, Post, PostId};

    fn snapshot() -> FeedSnapshot {
        FeedSnapshot {
            page: 1,
            page_size: 2,
            total: 3,
            last_page: 2,
            can_previous: false,
            can_next: true,
            load: LoadState::Ready,
            posts: vec![Post {
                id: PostId::new("p1"),
                title: "Hello".into(),
                content: "World".into(),
                image_url: "images/p1.png".into(),
                created_at: "2024-03-01T10:00:00.000Z".into(),
                creator: Creator { name: "Max".into() },
            }],
            status: UserStatus::Loaded("I am new!".into()),
            editor: EditorStatus::Idle { error: None },
            error: None,
            expired: false,
        }
    }

    #[test]
    fn text_rendering_shows_posts_and_pager() {
        let text = render_snapshot(&snapshot(), false).unwrap();
        assert!(text.starts_with("status: I am new!\n"));
        assert!(text.contains("Hello"));
        assert!(text.contains("by Max on 2024-03-01"));
        assert!(text.ends_with("  page 1/2 (3 posts) >"));
    }

    #[test]
    fn load_error_is_printed_once() {
        let mut snapshot = snapshot();
        let msg = "Could not fetch posts. Not authenticated!".to_string();
        snapshot.load = LoadState::Error(msg.clone());
        snapshot.error = Some(msg.clone());
        let text = render_snapshot(&snapshot, false).unwrap();
        assert_eq!(text.matches(&msg).count(), 1);
    }

    #[test]
    fn json_rendering_tags_states() {
        let text = render_snapshot(&snapshot(), true).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["load"]["state"], "ready");
        assert_eq!(value["editor"]["state"], "idle");
        assert_eq!(value["posts"][0]["_id"], "p1");
    }

    #[tokio::test]
    async fn empty_status_is_returned_not_waited_on() {
        let mut pending = snapshot();
        pending.status = UserStatus::Loading;
        let msg = "Could not fetch posts. Not authenticated!".to_string();
        pending.load = LoadState::Error(msg.clone());
        pending.error = Some(msg);
        let (tx, mut rx) = watch::channel(pending);

        tokio::spawn(async move {
            tx.send_modify(|s| s.status = UserStatus::Loaded(String::new()));
            tx.closed().await;
        });
        let status = wait_for_status(&mut rx, Duration::from_secs(5)).await.unwrap();
        assert_eq!(status, "");
    }

    #[tokio::test]
    async fn failed_status_fetch_is_an_error() {
        let mut failed = snapshot();
        failed.status = UserStatus::Failed("Could not get user data. Not authenticated!".into());
        let (_tx, mut rx) = watch::channel(failed);
        let err = wait_for_status(&mut rx, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Could not get user data. Not authenticated!");
    }

    #[test]
    fn empty_status_is_not_rendered() {
        let mut snapshot = snapshot();
        snapshot.status = UserStatus::Loaded(String::new());
        let text = render_snapshot(&snapshot, false).unwrap();
        assert!(!text.contains("status:"));
    }

    #[test]
    fn prompts_trim_and_join() {
        let mut line = "  My title \n".as_bytes();
        assert_eq!(prompt_line(&mut line, "Title").unwrap(), "My title");

        let mut block = "first line\n\n  second line \n".as_bytes();
        assert_eq!(
            prompt_block(&mut block, "Content").unwrap(),
            "first line second line"
        );

        let mut empty = "\n".as_bytes();
        assert!(prompt_line(&mut empty, "Title").is_err());
    }
}
