//! End-to-end tool-call scenarios against a live session.

use serde_json::json;
use whiteboard_session::gateway::{CONNECT, DELETE_ITEM, DRAW_ITEM};
use whiteboard_session::{
    CommandSession, CommandStream, DrawCommand, SessionConfig, SessionHandle, ToolCall,
    ToolCallGateway, ToolError,
};
use whiteboard_types::{EntityId, EntityKind};

fn start() -> (SessionHandle, CommandStream) {
    let (handle, stream, _task) = CommandSession::start(SessionConfig::default());
    (handle, stream)
}

async fn draw(handle: &SessionHandle, kind: EntityKind) -> EntityId {
    handle
        .submit(ToolCall::draw(kind))
        .await
        .expect("draw_item failed")
        .entity_id()
        .expect("draw_item returns an id")
}

#[tokio::test]
async fn draw_database_emits_ellipse_at_default_position() {
    let (handle, mut stream) = start();
    let e1 = draw(&handle, EntityKind::Database).await;

    let batch = stream.recv().await.unwrap();
    assert_eq!(batch.commands.len(), 1);
    let json = serde_json::to_value(&batch.commands[0]).unwrap();
    assert_eq!(json["type"], "draw_item");
    assert_eq!(json["payload"]["id"], e1.to_string());
    assert_eq!(json["payload"]["type"], "geo");
    assert_eq!(json["payload"]["x"], 100.0);
    assert_eq!(json["payload"]["y"], 100.0);
    assert_eq!(json["payload"]["props"]["geo"], "ellipse");
    assert_eq!(json["payload"]["props"]["color"], "blue");
}

#[tokio::test]
async fn connect_emits_arrow_bound_to_both_shapes() {
    let (handle, mut stream) = start();
    let e1 = draw(&handle, EntityKind::Database).await;
    let e2 = draw(&handle, EntityKind::Person).await;
    handle.submit(ToolCall::connect(e1, e2)).await.unwrap();

    stream.recv().await.unwrap();
    stream.recv().await.unwrap();
    let batch = stream.recv().await.unwrap();
    let json = serde_json::to_value(&batch.commands[0]).unwrap();
    assert_eq!(json["type"], "draw_connection");
    assert_eq!(json["payload"]["id"], format!("connection_{e1}_{e2}"));
    assert_eq!(json["payload"]["type"], "arrow");
    assert_eq!(json["payload"]["props"]["start"]["boundShapeId"], e1.to_string());
    assert_eq!(json["payload"]["props"]["end"]["boundShapeId"], e2.to_string());
}

#[tokio::test]
async fn delete_cascades_to_connections() {
    let (handle, mut stream) = start();
    let e1 = draw(&handle, EntityKind::Database).await;
    let e2 = draw(&handle, EntityKind::Person).await;
    handle.submit(ToolCall::connect(e1, e2)).await.unwrap();
    handle.submit(ToolCall::delete(e1)).await.unwrap();

    for _ in 0..3 {
        stream.recv().await.unwrap();
    }
    let batch = stream.recv().await.unwrap();
    let removed: Vec<_> = batch
        .commands
        .iter()
        .map(|command| match command {
            DrawCommand::RemoveItem(removal) => removal.id.clone(),
            other => panic!("expected remove_item, got {other:?}"),
        })
        .collect();
    assert_eq!(removed, vec![format!("connection_{e1}_{e2}"), e1.to_string()]);

    let snapshot = handle.snapshot().await.unwrap();
    assert!(snapshot.connections.is_empty());
    assert_eq!(snapshot.entities.len(), 1);
    assert_eq!(snapshot.entities[0].id, e2);
}

#[tokio::test]
async fn unsupported_kind_is_rejected_before_the_store() {
    let (handle, mut stream) = start();
    let gateway = ToolCallGateway::new();

    let err = gateway
        .parse(DRAW_ITEM, &json!({ "item_type": "spaceship" }))
        .unwrap_err();
    match &err {
        ToolError::UnsupportedItemType { value, allowed } => {
            assert_eq!(value, "spaceship");
            assert_eq!(allowed, &vec!["database", "person", "server", "llm", "frontend"]);
        }
        other => panic!("unexpected error {other:?}"),
    }

    let snapshot = handle.snapshot().await.unwrap();
    assert!(snapshot.entities.is_empty());
    assert!(stream.try_recv().is_none());
}

#[tokio::test]
async fn connect_to_unknown_id_leaves_store_unchanged() {
    let (handle, mut stream) = start();
    let e2 = draw(&handle, EntityKind::Person).await;
    stream.recv().await.unwrap();
    let before = handle.snapshot().await.unwrap();

    let call = ToolCallGateway::new()
        .parse(
            CONNECT,
            &json!({ "item1_id": "nonexistent", "item2_id": e2.to_string() }),
        )
        .unwrap();
    let err = handle.submit(call).await.unwrap_err();
    assert_eq!(
        err,
        ToolError::UnknownEntity {
            id: "nonexistent".into()
        }
    );

    assert_eq!(handle.snapshot().await.unwrap(), before);
    assert!(stream.try_recv().is_none());
}

#[tokio::test]
async fn deleting_twice_is_a_silent_no_op() {
    let (handle, mut stream) = start();
    let e1 = draw(&handle, EntityKind::Server).await;
    let delete = ToolCallGateway::new()
        .parse(DELETE_ITEM, &json!({ "item_id": e1.to_string() }))
        .unwrap();
    handle.submit(delete.clone()).await.unwrap();
    handle.submit(delete).await.unwrap();

    assert_eq!(stream.recv().await.unwrap().seq, 0);
    assert_eq!(stream.recv().await.unwrap().seq, 1);
    assert!(stream.try_recv().is_none());
}

#[tokio::test]
async fn duplicate_connect_is_idempotent() {
    let (handle, mut stream) = start();
    let e1 = draw(&handle, EntityKind::Frontend).await;
    let e2 = draw(&handle, EntityKind::Server).await;
    handle.submit(ToolCall::connect(e1, e2)).await.unwrap();
    handle.submit(ToolCall::connect(e2, e1)).await.unwrap();

    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.connections.len(), 1);
    for _ in 0..3 {
        stream.recv().await.unwrap();
    }
    assert!(stream.try_recv().is_none());
}

#[tokio::test]
async fn self_connection_is_rejected() {
    let (handle, _stream) = start();
    let e1 = draw(&handle, EntityKind::Llm).await;
    let err = handle.submit(ToolCall::connect(e1, e1)).await.unwrap_err();
    assert_eq!(err.code(), "self_connection");
}
