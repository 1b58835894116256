//! Feed session scenarios against an in-memory backend. Live events are
//! pushed by hand through the session's `LiveSink`, the way the websocket
//! reader would.

mod common;

use common::{ids, post, settle, start, MemoryBackend};
use feedsync_core::live::LiveEvent;
use feedsync_core::post::{ImageUpload, PostId};
use feedsync_core::reconciler::{LoadState, PageDelta};
use feedsync_core::Operation;

#[tokio::test]
async fn last_page_holds_the_remainder() {
    let backend = MemoryBackend::with_posts(&["e", "d", "c", "b", "a"]);
    let handle = start(&backend).await;

    let snapshot = handle.snapshot();
    assert_eq!(snapshot.total, 5);
    assert_eq!(snapshot.last_page, 3);

    let snapshot = handle.jump_to(3).await.unwrap();
    assert_eq!(ids(&snapshot), vec!["a"]);
    assert!(!snapshot.can_next);
    assert!(snapshot.can_previous);

    let snapshot = handle.navigate(PageDelta::Previous).await.unwrap();
    assert_eq!(snapshot.page, 2);
    assert_eq!(ids(&snapshot), vec!["c", "b"]);
}

#[tokio::test]
async fn live_create_lands_at_the_head_of_page_one() {
    let backend = MemoryBackend::with_posts(&["a", "b"]);
    let handle = start(&backend).await;

    handle.live_sink().deliver(LiveEvent::Created(post("c")));
    let snapshot = settle(&handle, |s| s.total == 3).await;
    assert_eq!(ids(&snapshot), vec!["c", "a"]);
    assert_eq!(snapshot.last_page, 2);
}

#[tokio::test]
async fn live_create_only_bumps_total_on_later_pages() {
    let backend = MemoryBackend::with_posts(&["d", "c", "b", "a"]);
    let handle = start(&backend).await;
    handle.navigate(PageDelta::Next).await.unwrap();

    handle.live_sink().deliver(LiveEvent::Created(post("e")));
    let snapshot = settle(&handle, |s| s.total == 5).await;
    assert_eq!(ids(&snapshot), vec!["b", "a"]);
}

#[tokio::test]
async fn submitted_post_waits_for_the_live_echo() {
    let backend = MemoryBackend::with_posts(&["a", "b"]);
    let handle = start(&backend).await;

    handle.start_new_post().await.unwrap();
    handle
        .edit_draft(|draft| {
            draft.title = "Fresh".into();
            draft.content = "Straight from the editor".into();
            draft.image = Some(ImageUpload::new("fresh.png", "image/png", vec![1, 2, 3]));
        })
        .await
        .unwrap();
    let saved = handle.submit().await.unwrap();
    assert_eq!(saved.image_url, "images/fresh.png");
    assert_eq!(
        backend.uploads.lock().unwrap().as_slice(),
        &[("images/fresh.png".to_string(), None)]
    );

    let snapshot = handle.snapshot();
    assert_eq!(ids(&snapshot), vec!["a", "b"]);
    assert_eq!(snapshot.total, 2);

    handle.live_sink().deliver(LiveEvent::Created(saved.clone()));
    let snapshot = settle(&handle, |s| s.total == 3).await;
    assert_eq!(snapshot.posts[0], saved);
    assert_eq!(ids(&snapshot)[1], "a");
}

#[tokio::test]
async fn edit_with_new_image_replaces_old_path() {
    let backend = MemoryBackend::with_posts(&["a", "b"]);
    let handle = start(&backend).await;

    handle.start_edit(PostId::new("b")).await.unwrap();
    handle
        .edit_draft(|draft| draft.image = Some(ImageUpload::new("b2.jpg", "image/jpeg", vec![9])))
        .await
        .unwrap();
    let saved = handle.submit().await.unwrap();
    assert_eq!(saved.id, PostId::new("b"));
    assert_eq!(
        backend.uploads.lock().unwrap().as_slice(),
        &[("images/b2.jpg".to_string(), Some("images/b.png".to_string()))]
    );

    handle.live_sink().deliver(LiveEvent::Updated(saved));
    let snapshot = settle(&handle, |s| s.posts[1].image_url == "images/b2.jpg").await;
    assert_eq!(snapshot.total, 2);
}

#[tokio::test]
async fn delete_removes_locally_without_waiting_for_the_echo() {
    let backend = MemoryBackend::with_posts(&["a", "b", "c"]);
    let handle = start(&backend).await;

    let deleted = handle.delete_post(PostId::new("b")).await.unwrap();
    assert_eq!(deleted, PostId::new("b"));
    let snapshot = settle(&handle, |s| s.total == 2).await;
    assert_eq!(ids(&snapshot), vec!["a"]);

    // The server echo for the same delete changes nothing.
    handle.live_sink().deliver(LiveEvent::Deleted(PostId::new("b")));
    handle.dismiss_error().await.unwrap();
    let snapshot = handle.snapshot();
    assert_eq!(snapshot.total, 2);
    assert_eq!(ids(&snapshot), vec!["a"]);
}

#[tokio::test]
async fn failed_delete_keeps_the_post() {
    let backend = MemoryBackend::with_posts(&["a", "b"]);
    let handle = start(&backend).await;

    let err = handle.delete_post(PostId::new("zzz")).await.unwrap_err();
    assert_eq!(err.to_string(), "Post deletion failed. No post found!");
    let snapshot = settle(&handle, |s| s.error.is_some()).await;
    assert_eq!(ids(&snapshot), vec!["a", "b"]);
}

#[tokio::test]
async fn unauthorized_page_keeps_previous_view() {
    let backend = MemoryBackend::with_posts(&["a", "b", "c"]);
    let handle = start(&backend).await;

    backend.fail_next_page(Operation::FetchPosts.classify(Some(401), "Not authenticated!".into()));
    let err = handle.navigate(PageDelta::Next).await.unwrap_err();
    assert_eq!(err.to_string(), "Could not fetch posts. Not authenticated!");

    let snapshot = handle.snapshot();
    assert_eq!(
        snapshot.load,
        LoadState::Error("Could not fetch posts. Not authenticated!".into())
    );
    assert_eq!(snapshot.page, 1);
    assert_eq!(ids(&snapshot), vec!["a", "b"]);

    handle.dismiss_error().await.unwrap();
    let snapshot = handle.reload().await.unwrap();
    assert_eq!(snapshot.load, LoadState::Ready);
    assert_eq!(snapshot.error, None);
}

#[tokio::test]
async fn missing_single_post_is_not_found() {
    let backend = MemoryBackend::with_posts(&["a"]);
    let handle = start(&backend).await;

    let found = handle.fetch_post(PostId::new("a")).await.unwrap();
    assert_eq!(found, post("a"));
    let err = handle.fetch_post(PostId::new("b")).await.unwrap_err();
    assert_eq!(err.to_string(), "Could not fetch post. No post found!");
}
