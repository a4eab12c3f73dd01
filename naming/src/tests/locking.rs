//! Ordering guarantees of the hierarchical lock protocol, observed through
//! concurrent tasks.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::sleep;

use super::{fixture, registration};
use crate::{NamingError, NamingService};

/// Spawns a lock request and gives it time to enter the queue.
async fn spawn_lock(
    service: &Arc<NamingService>,
    path: &'static str,
    exclusive: bool,
) -> JoinHandle<Result<(), NamingError>> {
    let service = service.clone();
    let handle = tokio::spawn(async move { service.lock(path, exclusive).await });
    sleep(Duration::from_millis(20)).await;
    handle
}

#[tokio::test]
async fn exclusive_waits_for_the_shared_holder() {
    let (service, _commands) = fixture();
    service
        .register(registration(7001, 7002, &["/a.txt"]))
        .unwrap();

    service.lock("/a.txt", false).await.unwrap();
    let writer = spawn_lock(&service, "/a.txt", true).await;
    assert!(!writer.is_finished());

    service.unlock("/a.txt").unwrap();
    writer.await.unwrap().unwrap();
    service.unlock("/a.txt").unwrap();
}

#[tokio::test]
async fn two_exclusive_requests_never_overlap() {
    let (service, _commands) = fixture();
    service
        .register(registration(7001, 7002, &["/a.txt"]))
        .unwrap();

    service.lock("/a.txt", true).await.unwrap();
    let second = spawn_lock(&service, "/a.txt", true).await;
    assert!(!second.is_finished());

    service.unlock("/a.txt").unwrap();
    second.await.unwrap().unwrap();
    service.unlock("/a.txt").unwrap();
}

#[tokio::test]
async fn queued_writer_blocks_later_shared_arrivals() {
    let (service, _commands) = fixture();
    service
        .register(registration(7001, 7002, &["/a.txt"]))
        .unwrap();

    service.lock("/a.txt", false).await.unwrap();
    let writer = spawn_lock(&service, "/a.txt", true).await;
    let late_reader = spawn_lock(&service, "/a.txt", false).await;
    assert!(!writer.is_finished());
    assert!(!late_reader.is_finished());

    service.unlock("/a.txt").unwrap();
    writer.await.unwrap().unwrap();
    assert!(!late_reader.is_finished());

    service.unlock("/a.txt").unwrap();
    late_reader.await.unwrap().unwrap();
    service.unlock("/a.txt").unwrap();
}

#[tokio::test]
async fn root_queue_discipline() {
    let (service, _commands) = fixture();
    service
        .register(registration(7001, 7002, &["/a.txt"]))
        .unwrap();

    // X and Y hold the root shared
    service.lock("/", false).await.unwrap();
    service.lock("/", false).await.unwrap();

    // Z wants it exclusive, W's later shared request must queue behind Z
    let z = spawn_lock(&service, "/", true).await;
    let w = spawn_lock(&service, "/", false).await;
    assert!(!z.is_finished());
    assert!(!w.is_finished());

    service.unlock("/").unwrap();
    sleep(Duration::from_millis(20)).await;
    assert!(!z.is_finished());

    service.unlock("/").unwrap();
    z.await.unwrap().unwrap();
    assert!(!w.is_finished());

    service.unlock("/").unwrap();
    w.await.unwrap().unwrap();
    service.unlock("/").unwrap();
}

#[tokio::test]
async fn exclusive_ancestor_locks_the_subtree() {
    let (service, _commands) = fixture();
    service
        .register(registration(7001, 7002, &["/dir/b.txt"]))
        .unwrap();

    service.lock("/dir", true).await.unwrap();

    // the file below is effectively locked: its ancestor chain blocks
    let reader = spawn_lock(&service, "/dir/b.txt", false).await;
    assert!(!reader.is_finished());

    service.unlock("/dir").unwrap();
    reader.await.unwrap().unwrap();
    service.unlock("/dir/b.txt").unwrap();
}

#[tokio::test]
async fn sibling_files_lock_independently() {
    let (service, _commands) = fixture();
    service
        .register(registration(7001, 7002, &["/dir/a.txt", "/dir/b.txt"]))
        .unwrap();

    service.lock("/dir/a.txt", true).await.unwrap();
    // an exclusive hold on one file leaves its sibling reachable
    service.lock("/dir/b.txt", true).await.unwrap();

    service.unlock("/dir/a.txt").unwrap();
    service.unlock("/dir/b.txt").unwrap();
}

#[tokio::test]
async fn lock_errors() {
    let (service, _commands) = fixture();
    service
        .register(registration(7001, 7002, &["/a.txt"]))
        .unwrap();

    assert_eq!(
        Err(NamingError::NotFound("/missing".to_owned())),
        service.lock("/missing", false).await
    );
    assert!(matches!(
        service.lock("no-slash", false).await,
        Err(NamingError::InvalidArgument(_))
    ));

    // unlocking something never locked is a client bug
    assert!(matches!(
        service.unlock("/a.txt"),
        Err(NamingError::InvalidArgument(_))
    ));
    assert!(matches!(
        service.unlock("/missing"),
        Err(NamingError::InvalidArgument(_))
    ));

    // a failed acquisition leaves no residue: the path locks cleanly after
    service.lock("/a.txt", true).await.unwrap();
    service.unlock("/a.txt").unwrap();
}

#[tokio::test]
async fn delete_waits_for_the_parent_lock() {
    let (service, _commands) = fixture();
    service
        .register(registration(7001, 7002, &["/dir/b.txt"]))
        .unwrap();

    // a client reading under /dir keeps the delete out
    service.lock("/dir/b.txt", false).await.unwrap();

    let deleter = {
        let service = service.clone();
        let handle = tokio::spawn(async move { service.delete("/dir").await });
        sleep(Duration::from_millis(20)).await;
        handle
    };
    assert!(!deleter.is_finished());

    service.unlock("/dir/b.txt").unwrap();
    assert_eq!(Ok(true), deleter.await.unwrap());
    assert_eq!(
        Err(NamingError::NotFound("/dir".to_owned())),
        service.is_directory("/dir")
    );
}
