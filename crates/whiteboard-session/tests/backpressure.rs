//! Overflow policies, timeouts and session termination.

use std::time::Duration;

use whiteboard_session::{
    CloseReason, CommandSession, CommandStream, DrawCommand, OverflowPolicy, SessionConfig,
    SessionHandle, ToolCall, ToolError, ToolOutput,
};
use whiteboard_types::EntityKind;

fn tight(policy: OverflowPolicy) -> SessionConfig {
    SessionConfig {
        outbound_capacity: 1,
        overflow_policy: policy,
        apply_timeout: Duration::from_millis(50),
        ..SessionConfig::default()
    }
}

/// Calls that change nothing, answered while the outbound queue is full.
async fn assert_answered_without_slot(handle: &SessionHandle, a: &str, b: &str) {
    assert_eq!(
        handle.submit(ToolCall::connect("nonexistent", a)).await,
        Err(ToolError::UnknownEntity {
            id: "nonexistent".into()
        })
    );
    assert_eq!(
        handle.submit(ToolCall::connect(a, a)).await,
        Err(ToolError::SelfConnection { id: a.into() })
    );
    assert_eq!(
        handle.submit(ToolCall::connect(b, a)).await,
        Ok(ToolOutput::Connected)
    );
    assert_eq!(
        handle.submit(ToolCall::delete("nonexistent")).await,
        Ok(ToolOutput::Deleted)
    );
    assert!(!handle.is_closed());
}

/// Draws two entities and connects them, leaving only the connect batch
/// in the one-slot queue.
async fn fill_with_connection(
    handle: &SessionHandle,
    stream: &mut CommandStream,
) -> (String, String) {
    let a = handle.submit(ToolCall::draw(EntityKind::Server)).await.unwrap();
    stream.recv().await.unwrap();
    let b = handle.submit(ToolCall::draw(EntityKind::Database)).await.unwrap();
    stream.recv().await.unwrap();
    let a = a.entity_id().unwrap().to_string();
    let b = b.entity_id().unwrap().to_string();
    handle.submit(ToolCall::connect(&a, &b)).await.unwrap();
    (a, b)
}

#[tokio::test]
async fn fail_policy_answers_no_op_calls_while_queue_is_full() {
    let (handle, mut stream, task) = CommandSession::start(tight(OverflowPolicy::Fail));

    let (a, b) = fill_with_connection(&handle, &mut stream).await;
    assert_answered_without_slot(&handle, &a, &b).await;

    let next = stream.recv().await.unwrap();
    assert_eq!(next.seq, 2);
    assert!(stream.try_recv().is_none());

    handle.close();
    let report = task.await.unwrap();
    assert_eq!(report.reason, CloseReason::Closed);
    assert_eq!(report.emitted_batches, 3);
    assert_eq!(report.rejected, 2);
}

#[tokio::test(start_paused = true)]
async fn block_policy_answers_no_op_calls_without_waiting() {
    let (handle, mut stream, _task) = CommandSession::start(tight(OverflowPolicy::Block));

    let (a, b) = fill_with_connection(&handle, &mut stream).await;
    assert_answered_without_slot(&handle, &a, &b).await;

    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.entities.len(), 2);
    assert_eq!(snapshot.connections.len(), 1);
    assert_eq!(stream.recv().await.unwrap().seq, 2);
}

#[tokio::test]
async fn empty_resync_needs_no_slot() {
    let (handle, mut stream, _task) = CommandSession::start(tight(OverflowPolicy::Fail));
    assert_eq!(handle.resync().await, Ok(0));
    assert!(stream.try_recv().is_none());
    assert!(!handle.is_closed());
}

#[tokio::test]
async fn fail_policy_closes_session_on_overflow() {
    let (handle, _stream, task) = CommandSession::start(tight(OverflowPolicy::Fail));

    handle.submit(ToolCall::draw(EntityKind::Server)).await.unwrap();
    let err = handle
        .submit(ToolCall::draw(EntityKind::Server))
        .await
        .unwrap_err();
    assert_eq!(err, ToolError::SessionClosed);

    let report = task.await.unwrap();
    assert_eq!(report.reason, CloseReason::QueueOverflow { capacity: 1 });
    assert!(report.reason.is_fatal());
    assert_eq!(report.applied, 1);
    assert_eq!(report.snapshot.entities.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn block_policy_times_out_without_applying() {
    let (handle, mut stream, _task) = CommandSession::start(tight(OverflowPolicy::Block));

    handle.submit(ToolCall::draw(EntityKind::Server)).await.unwrap();
    let err = handle
        .submit(ToolCall::draw(EntityKind::Person))
        .await
        .unwrap_err();
    assert_eq!(err, ToolError::ApplyTimeout { timeout_ms: 50 });
    assert!(!handle.is_closed());
    assert_eq!(handle.snapshot().await.unwrap().entities.len(), 1);

    // Draining the stream frees the slot and later calls succeed.
    assert_eq!(stream.recv().await.unwrap().seq, 0);
    handle.submit(ToolCall::draw(EntityKind::Llm)).await.unwrap();
    assert_eq!(stream.recv().await.unwrap().seq, 1);
}

#[tokio::test(start_paused = true)]
async fn block_policy_waits_for_slow_consumer() {
    let (handle, mut stream, _task) = CommandSession::start(SessionConfig {
        apply_timeout: Duration::from_secs(1),
        ..tight(OverflowPolicy::Block)
    });

    handle.submit(ToolCall::draw(EntityKind::Server)).await.unwrap();
    let pending = handle.enqueue(ToolCall::draw(EntityKind::Person)).await.unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;
    stream.recv().await.unwrap();

    assert!(pending.wait().await.is_ok());
    assert_eq!(stream.recv().await.unwrap().seq, 1);
}

#[tokio::test]
async fn close_answers_queued_calls() {
    let (handle, _stream, task) = CommandSession::start(SessionConfig {
        apply_timeout: Duration::from_secs(30),
        ..tight(OverflowPolicy::Block)
    });

    handle.submit(ToolCall::draw(EntityKind::Database)).await.unwrap();
    let blocked = handle.enqueue(ToolCall::draw(EntityKind::Person)).await.unwrap();
    let queued = handle.enqueue(ToolCall::draw(EntityKind::Server)).await.unwrap();
    handle.close();

    assert_eq!(blocked.wait().await, Err(ToolError::SessionClosed));
    assert_eq!(queued.wait().await, Err(ToolError::SessionClosed));

    let report = task.await.unwrap();
    assert_eq!(report.reason, CloseReason::Closed);
    assert_eq!(report.applied, 1);
    assert!(report.abandoned >= 1);
}

#[tokio::test]
async fn dropping_every_handle_drains_then_finishes() {
    let (handle, mut stream, task) = CommandSession::start(SessionConfig::default());

    let mut pending = Vec::new();
    for _ in 0..3 {
        pending.push(handle.enqueue(ToolCall::draw(EntityKind::Person)).await.unwrap());
    }
    drop(handle);

    for reply in pending {
        assert!(reply.wait().await.is_ok());
    }
    let mut batches = 0;
    while stream.recv().await.is_some() {
        batches += 1;
    }
    assert_eq!(batches, 3);

    let report = task.await.unwrap();
    assert_eq!(report.reason, CloseReason::ProducerFinished);
    assert_eq!(report.abandoned, 0);
}

#[tokio::test]
async fn dropped_stream_closes_session() {
    let (handle, stream, task) = CommandSession::start(SessionConfig::default());
    drop(stream);

    let err = handle
        .submit(ToolCall::draw(EntityKind::Server))
        .await
        .unwrap_err();
    assert_eq!(err, ToolError::SessionClosed);

    let report = task.await.unwrap();
    assert_eq!(report.reason, CloseReason::ConsumerClosed);
    assert!(report.snapshot.entities.is_empty());
}

#[tokio::test]
async fn upstream_failure_keeps_last_state_for_diagnostics() {
    let (handle, _stream, task) = CommandSession::start(SessionConfig::default());
    let a = handle.submit(ToolCall::draw(EntityKind::Database)).await.unwrap();
    let b = handle.submit(ToolCall::draw(EntityKind::Server)).await.unwrap();
    handle
        .submit(ToolCall::connect(a.entity_id().unwrap(), b.entity_id().unwrap()))
        .await
        .unwrap();

    handle.fail("transcription stream reset");
    let report = task.await.unwrap();
    assert_eq!(
        report.reason,
        CloseReason::Upstream {
            message: "transcription stream reset".into()
        }
    );
    assert_eq!(report.snapshot.entities.len(), 2);
    assert_eq!(report.snapshot.connections.len(), 1);
    assert!(report.snapshot.is_consistent());

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["reason"]["kind"], "upstream");
}

#[tokio::test]
async fn resync_redraws_whole_diagram() {
    let (handle, mut stream, _task) = CommandSession::start(SessionConfig::default());
    let a = handle.submit(ToolCall::draw(EntityKind::Database)).await.unwrap();
    let b = handle.submit(ToolCall::draw(EntityKind::Frontend)).await.unwrap();
    handle
        .submit(ToolCall::connect(a.entity_id().unwrap(), b.entity_id().unwrap()))
        .await
        .unwrap();
    for _ in 0..3 {
        stream.recv().await.unwrap();
    }

    assert_eq!(handle.resync().await.unwrap(), 3);
    let batch = stream.recv().await.unwrap();
    assert_eq!(batch.seq, 3);
    let kinds: Vec<_> = batch.commands.iter().map(DrawCommand::kind).collect();
    assert_eq!(kinds, vec!["draw_item", "draw_item", "draw_connection"]);
}
