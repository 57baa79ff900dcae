use std::sync::{Arc, Mutex};
use std::time::Duration;

use omnidocs_protocol::{Frame, FrameKind, FramePayload, Source};
use omnidocs_test_backend::{PresetTurn, TestBackend};
use serde_json::json;
use tokio::time::timeout;

use crate::conversation::Role;
use crate::{
    ChatSessionBuilder, ErrorKind, Notification, TurnOutcome, TurnStage,
};

fn source(document_id: &str) -> Source {
    Source {
        document_id: document_id.to_owned(),
        document_title: "Employee Handbook".to_owned(),
        chunk_id: format!("{document_id}:c1"),
        content: "Leave accrues at 1.5 days per month.".to_owned(),
        page_number: Some(12),
        section_header: Some("Leave".to_owned()),
        relevance_score: 0.91,
    }
}

fn collect_notifications(
    builder: ChatSessionBuilder,
) -> (ChatSessionBuilder, Arc<Mutex<Vec<Notification>>>) {
    let notifications = Arc::new(Mutex::new(vec![]));
    let builder = builder.on_notification({
        let notifications = Arc::clone(&notifications);
        move |notification| notifications.lock().unwrap().push(notification)
    });
    (builder, notifications)
}

#[tokio::test]
async fn test_simple_turn() {
    let backend = TestBackend::default();
    backend.add_turn(PresetTurn::answer(["Hel", "lo", " world"], Some("session-9")));

    let deltas = Arc::new(Mutex::new(String::new()));
    let session = ChatSessionBuilder::with_backend(backend.clone())
        .on_text_delta({
            let deltas = Arc::clone(&deltas);
            move |delta| deltas.lock().unwrap().push_str(delta)
        })
        .build();

    let outcome = session.send_message("Say hello").await;
    assert_eq!(outcome, TurnOutcome::Settled);
    assert_eq!(session.stage(), TurnStage::Settled);

    let conversation = session.conversation();
    assert_eq!(conversation.messages().len(), 2);
    assert_eq!(conversation.messages()[0].role(), Role::User);
    assert_eq!(conversation.messages()[0].content(), "Say hello");
    let answer = conversation.last_message().unwrap();
    assert_eq!(answer.role(), Role::Assistant);
    assert_eq!(answer.content(), "Hello world");
    assert!(!answer.is_streaming());
    assert!(!conversation.is_streaming());
    assert_eq!(*deltas.lock().unwrap(), "Hello world");

    // The session was created first, then rotated by the server.
    assert_eq!(backend.sessions_created(), 1);
    let requests = backend.query_requests();
    assert_eq!(requests[0].session_id.as_deref(), Some("session-1"));
    assert_eq!(conversation.session_id(), Some("session-9"));
}

#[tokio::test]
async fn test_session_reused_across_turns() {
    let backend = TestBackend::default();
    backend.add_turn(PresetTurn::answer(["One"], None));
    backend.add_turn(PresetTurn::answer(["Two"], None));
    let session = ChatSessionBuilder::with_backend(backend.clone()).build();

    assert_eq!(session.send_message("1").await, TurnOutcome::Settled);
    assert_eq!(session.send_message("2").await, TurnOutcome::Settled);

    assert_eq!(backend.sessions_created(), 1);
    let requests = backend.query_requests();
    assert_eq!(requests[1].session_id.as_deref(), Some("session-1"));
    assert_eq!(session.conversation().messages().len(), 4);
}

#[tokio::test]
async fn test_busy_while_streaming() {
    let mut backend = TestBackend::default();
    backend.set_delay(Duration::from_millis(20));
    backend.add_turn(PresetTurn::answer(["Slow ", "answer"], None));
    backend.add_turn(PresetTurn::answer(["Unexpected"], None));
    let session = ChatSessionBuilder::with_backend(backend.clone()).build();

    let first = tokio::spawn({
        let session = session.clone();
        async move { session.send_message("First").await }
    });

    let mut rx = session.subscribe();
    timeout(
        Duration::from_millis(500),
        rx.wait_for(|conversation| conversation.is_streaming()),
    )
    .await
    .unwrap()
    .unwrap();

    let before = session.conversation().messages().len();
    assert_eq!(session.send_message("Second").await, TurnOutcome::Busy);
    assert_eq!(session.conversation().messages().len(), before);
    assert!(!session.new_conversation());
    assert!(!session.clear());

    assert_eq!(first.await.unwrap(), TurnOutcome::Settled);
    assert_eq!(backend.query_requests().len(), 1);
    let conversation = session.conversation();
    assert_eq!(conversation.messages().len(), 2);
    assert_eq!(conversation.last_message().unwrap().content(), "Slow answer");
}

#[tokio::test(start_paused = true)]
async fn test_abandoned_turn_rolls_back() {
    let mut backend = TestBackend::default();
    backend.set_delay(Duration::from_millis(50));
    backend.add_turn(PresetTurn::answer(["Partial ", "answer", " never seen"], None));
    backend.add_turn(PresetTurn::answer(["Second try"], None));
    let (builder, notifications) =
        collect_notifications(ChatSessionBuilder::with_backend(backend.clone()));
    let session = builder.build();

    // Gives up after the first fragment arrived.
    let abandoned = timeout(Duration::from_millis(60), session.send_message("First")).await;
    assert!(abandoned.is_err());

    let conversation = session.conversation();
    assert!(!conversation.is_streaming());
    assert_eq!(conversation.messages().len(), 1);
    assert_eq!(conversation.messages()[0].content(), "First");
    assert!(!conversation.last_message().unwrap().is_streaming());
    assert_eq!(session.stage(), TurnStage::Failed);
    assert!(notifications.lock().unwrap().is_empty());

    assert_eq!(session.send_message("Retry").await, TurnOutcome::Settled);
    let conversation = session.conversation();
    assert_eq!(conversation.messages().len(), 3);
    assert_eq!(conversation.last_message().unwrap().content(), "Second try");
    assert!(session.new_conversation());
}

#[tokio::test]
async fn test_error_frame_rolls_back_placeholder() {
    let backend = TestBackend::default();
    backend.add_turn(PresetTurn::with_frames([
        Frame::text("Partial answer"),
        Frame::error("Index unavailable"),
    ]));
    let (builder, notifications) =
        collect_notifications(ChatSessionBuilder::with_backend(backend));
    let session = builder.build();

    let outcome = session.send_message("What is the leave policy?").await;
    let TurnOutcome::Failed(err) = outcome else {
        panic!("unexpected outcome: {outcome:?}");
    };
    assert_eq!(err.kind(), ErrorKind::StreamError);
    assert_eq!(err.message(), "Index unavailable");
    assert_eq!(session.stage(), TurnStage::Failed);

    // Exactly the question is left from the failed turn.
    let conversation = session.conversation();
    assert_eq!(conversation.messages().len(), 1);
    assert_eq!(conversation.messages()[0].content(), "What is the leave policy?");
    assert!(!conversation.is_streaming());

    let notifications = notifications.lock().unwrap();
    assert_eq!(*notifications, [Notification::error("Index unavailable")]);
}

#[tokio::test]
async fn test_error_frame_without_message() {
    let backend = TestBackend::default();
    backend.add_turn(PresetTurn::with_frames([Frame {
        kind: FrameKind::Error,
        payload: None,
        session_id: None,
    }]));
    let session = ChatSessionBuilder::with_backend(backend).build();

    let TurnOutcome::Failed(err) = session.send_message("Q").await else {
        panic!("the turn should fail");
    };
    assert_eq!(err.message(), "Query failed");
}

#[tokio::test]
async fn test_session_acquisition_failure() {
    let backend = TestBackend::default();
    backend.fail_sessions(1);
    backend.add_turn(PresetTurn::answer(["Recovered"], None));
    let (builder, notifications) =
        collect_notifications(ChatSessionBuilder::with_backend(backend.clone()));
    let session = builder.build();

    let TurnOutcome::Failed(err) = session.send_message("First try").await else {
        panic!("the turn should fail");
    };
    assert_eq!(err.kind(), ErrorKind::SessionAcquisitionFailed);
    assert!(backend.query_requests().is_empty());
    // No placeholder was created, so the question is all that's left.
    let conversation = session.conversation();
    assert_eq!(conversation.messages().len(), 1);
    assert_eq!(conversation.session_id(), None);
    assert_eq!(
        *notifications.lock().unwrap(),
        [Notification::error("Failed to create session")]
    );

    // The user can resend.
    assert_eq!(session.send_message("First try").await, TurnOutcome::Settled);
    let conversation = session.conversation();
    assert_eq!(conversation.messages().len(), 3);
    assert_eq!(conversation.session_id(), Some("session-1"));
}

#[tokio::test]
async fn test_rejected_request() {
    let backend = TestBackend::default();
    backend.add_turn(PresetTurn::rejected("Monthly query limit reached"));
    let session = ChatSessionBuilder::with_backend(backend).build();

    let TurnOutcome::Failed(err) = session.send_message("Q").await else {
        panic!("the turn should fail");
    };
    assert_eq!(err.kind(), ErrorKind::RequestFailed);
    assert_eq!(err.message(), "Monthly query limit reached");
    assert_eq!(session.conversation().messages().len(), 1);
}

#[tokio::test]
async fn test_interrupted_stream() {
    let backend = TestBackend::default();
    backend.add_turn(PresetTurn::answer(["Half"], None).interrupted());
    let session = ChatSessionBuilder::with_backend(backend).build();

    let TurnOutcome::Failed(err) = session.send_message("Q").await else {
        panic!("the turn should fail");
    };
    assert_eq!(err.kind(), ErrorKind::Transport);
    assert_eq!(session.conversation().messages().len(), 1);
}

#[tokio::test]
async fn test_document_scoping() {
    let backend = TestBackend::default();
    for _ in 0..2 {
        backend.add_turn(PresetTurn::answer(["ok"], None));
    }
    let session = ChatSessionBuilder::with_backend(backend.clone())
        .with_top_k(8)
        .build();

    session.select_documents(["docA"]);
    session.send_message("Scoped").await;
    session.select_documents(Vec::<String>::new());
    session.send_message("Unscoped").await;

    let requests = backend.query_requests();
    assert_eq!(requests[0].document_ids, Some(vec!["docA".to_owned()]));
    assert_eq!(requests[0].top_k, 8);
    assert_eq!(requests[1].document_ids, None);

    let body = serde_json::to_value(&requests[1]).unwrap();
    assert!(body.get("document_ids").is_none());
}

#[tokio::test]
async fn test_sources_and_unknown_frames() {
    let backend = TestBackend::default();
    backend.add_turn(PresetTurn::with_frames([
        Frame {
            kind: FrameKind::Unknown,
            payload: Some(FramePayload::Other(json!({ "progress": 0.5 }))),
            session_id: None,
        },
        Frame::sources(vec![]),
        Frame::text("Leave accrues monthly."),
        Frame::sources(vec![source("doc-1"), source("doc-2")]),
        Frame::done(None),
    ]));

    let announced = Arc::new(Mutex::new(vec![]));
    let session = ChatSessionBuilder::with_backend(backend)
        .on_sources({
            let announced = Arc::clone(&announced);
            move |sources| announced.lock().unwrap().push(sources.len())
        })
        .build();

    assert_eq!(session.send_message("Leave?").await, TurnOutcome::Settled);
    // Only the non-empty list is announced.
    assert_eq!(*announced.lock().unwrap(), [2]);

    let conversation = session.conversation();
    assert_eq!(conversation.sources().len(), 2);
    let answer = conversation.last_message().unwrap();
    assert_eq!(answer.content(), "Leave accrues monthly.");
    assert_eq!(answer.sources().map(<[Source]>::len), Some(2));
}

#[tokio::test]
async fn test_new_conversation_and_resume() {
    let backend = TestBackend::default();
    for _ in 0..3 {
        backend.add_turn(PresetTurn::answer(["ok"], None));
    }
    let session = ChatSessionBuilder::with_backend(backend.clone()).build();

    session.send_message("1").await;
    assert!(session.clear());
    assert!(session.conversation().messages().is_empty());
    assert_eq!(session.conversation().session_id(), Some("session-1"));

    assert!(session.new_conversation());
    assert_eq!(session.stage(), TurnStage::Idle);
    session.send_message("2").await;
    assert_eq!(session.conversation().session_id(), Some("session-2"));

    assert!(session.resume("archived-7"));
    session.send_message("3").await;
    let requests = backend.query_requests();
    assert_eq!(requests[2].session_id.as_deref(), Some("archived-7"));
    assert_eq!(backend.sessions_created(), 2);
}
