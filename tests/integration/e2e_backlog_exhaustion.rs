//! A session's outbound backlog is a bounded queue, not an elastic buffer:
//! once its consumer (the write loop a real `Agent` would run) stops
//! draining it, further pushes fail fast with `BufferExceed` instead of
//! growing memory unboundedly or blocking the caller.
//!
//! This exercises `Session`/`Entity` directly rather than over a live TCP
//! connection: reproducing the same invariant through a socket would need
//! pushing past the OS's own send-buffer sizing, which varies by host and
//! would make the test flaky for a reason unrelated to the behavior under
//! test. Routing a push through a real gate (`e2e_cluster_routing`,
//! `e2e_singleton_ping_pong`) already covers the part this test doesn't:
//! that a drained backlog reaches the wire correctly.
//!
//! # Coverage
//! 1. Exactly `SEND_BACKLOG` pushes succeed before the backlog is full.
//! 2. The next push fails with `BufferExceed`, without blocking.
//! 3. Draining frees capacity; the session keeps working afterward.
//! 4. A push after `close()` fails with `BrokenPipe`, not `BufferExceed`.

use relaymesh::runtime::entity::SEND_BACKLOG;
use relaymesh::runtime::{Entity, EntityKind, Session, SessionError};

#[tokio::test]
async fn full_backlog_rejects_further_pushes_without_blocking() {
    let (entity, mut rx) = Entity::new(EntityKind::Gate, "127.0.0.1:1".to_string());
    let session = Session::new(1, entity, 0);

    for i in 0..SEND_BACKLOG {
        session.push("Room.Update", format!("update-{i}").into_bytes()).expect("backlog has room");
    }

    let err = session.push("Room.Update", b"one-too-many".to_vec()).unwrap_err();
    assert!(matches!(err, SessionError::BufferExceed));

    // Draining even one slot frees capacity for exactly one more push.
    rx.try_recv().expect("a buffered command is waiting");
    session.push("Room.Update", b"after-partial-drain".to_vec()).expect("one slot was freed");

    let err = session.push("Room.Update", b"still-too-many".to_vec()).unwrap_err();
    assert!(matches!(err, SessionError::BufferExceed));

    while rx.try_recv().is_ok() {}
    session.push("Room.Update", b"after-full-drain".to_vec()).expect("capacity freed after drain");
}

#[tokio::test]
async fn push_after_close_fails_with_broken_pipe_not_buffer_exceed() {
    let (entity, _rx) = Entity::new(EntityKind::Gate, "127.0.0.1:1".to_string());
    let session = Session::new(1, entity, 0);

    session.close().expect("first close succeeds");
    let err = session.push("Room.Update", b"too-late".to_vec()).unwrap_err();
    assert!(matches!(err, SessionError::BrokenPipe));
}
