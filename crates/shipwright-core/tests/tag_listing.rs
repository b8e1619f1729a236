//! Tag listing over a simulated paginated host.

use futures::TryStreamExt;
use shipwright_core::fakes::{HostCall, MemoryReleaseHost};
use shipwright_core::{check_version_conflict, read_version, ReleaseError, ReleaseHost};

fn numbered_tags(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("v0.{}.{}", i / 10, i % 10)).collect()
}

#[tokio::test]
async fn lists_150_tags_across_two_pages() {
    let host = MemoryReleaseHost::with_tags(numbered_tags(150));

    let tags = host.list_tags().await.expect("listing failed");

    assert_eq!(tags.len(), 150);
    for tag in numbered_tags(150) {
        assert!(tags.contains(&tag), "missing {tag}");
    }
    assert_eq!(
        host.calls(),
        vec![HostCall::TagPage(1), HostCall::TagPage(2)]
    );
}

#[tokio::test]
async fn exact_page_boundary_stops_after_last_page() {
    let host = MemoryReleaseHost::with_tags(numbered_tags(100));

    let tags = host.list_tags().await.unwrap();

    assert_eq!(tags.len(), 100);
    assert_eq!(host.calls(), vec![HostCall::TagPage(1)]);
}

#[tokio::test]
async fn empty_repository_yields_empty_set() {
    let host = MemoryReleaseHost::new();
    assert!(host.list_tags().await.unwrap().is_empty());
    assert_eq!(host.calls(), vec![HostCall::TagPage(1)]);
}

#[tokio::test]
async fn listing_is_idempotent() {
    let host = MemoryReleaseHost::with_tags(numbered_tags(250)).page_size(100);

    let first = host.list_tags().await.unwrap();
    let second = host.list_tags().await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first.len(), 250);
}

#[tokio::test]
async fn pages_are_fetched_in_order() {
    let host = MemoryReleaseHost::with_tags(numbered_tags(35)).page_size(10);

    let pages: Vec<Vec<String>> = shipwright_core::tag_pages(&host)
        .try_collect()
        .await
        .unwrap();

    assert_eq!(pages.len(), 4);
    assert_eq!(pages[3].len(), 5);
    let requested: Vec<HostCall> = (1..=4).map(HostCall::TagPage).collect();
    assert_eq!(host.calls(), requested);
}

#[tokio::test]
async fn failing_page_discards_partial_results() {
    let host = MemoryReleaseHost::with_tags(numbered_tags(150)).failing_on_page(2);

    let err = host.list_tags().await.unwrap_err();

    match err {
        ReleaseError::Host { status, .. } => assert_eq!(status, 502),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn conflict_found_on_second_page() {
    let mut tags = numbered_tags(120);
    tags.push("v2.0.1".to_string());
    let host = MemoryReleaseHost::with_tags(tags);

    let version = read_version("[package]\nversion = \"2.0.1\"\n").unwrap();
    let existing = host.list_tags().await.unwrap();
    let err = check_version_conflict(version, &existing).unwrap_err();

    assert!(matches!(err, ReleaseError::VersionConflict { .. }));
}
