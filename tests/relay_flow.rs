mod common;

use common::{
    BackendCall, MockBackend, MockTransport, Outbound, direct_message, group_message, harness,
    harness_with, text_reply,
};
use larkbridge::errors::RelayError;
use larkbridge::relay::{CLARIFYING_PROMPT, DropReason, Outcome, TYPING_REACTION};
use larkbridge::session::SessionStore;

#[tokio::test]
async fn test_direct_message_gets_threaded_reply() {
    let h = harness(MockBackend::with_responses(vec![Ok(text_reply("Hello, Alice!"))]));

    let outcome = h
        .relay
        .handle_event(direct_message("ev1", "hi there"))
        .await
        .expect("handle event");
    assert_eq!(outcome, Outcome::Delivered);

    assert_eq!(h.backend.prompts(), vec!["hi there".to_string()]);
    let messages = h.transport.messages();
    assert_eq!(messages.len(), 1);
    match &messages[0] {
        Outbound::Reply {
            message_id,
            content,
        } => {
            assert_eq!(message_id, "om_ev1");
            assert!(content.contains("Hello, Alice!"));
            assert!(content.contains("mock-model"));
        }
        other => panic!("expected a threaded reply, got {:?}", other),
    }
    assert!(h.transport.calls().contains(&Outbound::Reaction {
        message_id: "om_ev1".to_string(),
        emoji: TYPING_REACTION.to_string(),
    }));
}

#[tokio::test]
async fn test_redelivered_event_is_processed_once() {
    let h = harness(MockBackend::default());
    let msg = direct_message("ev_dup", "question");

    h.relay.handle_event(msg.clone()).await.unwrap();
    let second = h.relay.handle_event(msg).await.unwrap();

    assert_eq!(second, Outcome::Dropped(DropReason::Duplicate));
    assert_eq!(h.backend.prompts().len(), 1);
    assert_eq!(h.transport.messages().len(), 1);
}

#[tokio::test]
async fn test_group_message_without_mention_is_ignored() {
    let h = harness(MockBackend::default());

    let outcome = h
        .relay
        .handle_event(group_message("ev_g1", "anyone around?", false))
        .await
        .unwrap();

    assert_eq!(outcome, Outcome::Dropped(DropReason::NotAddressed));
    assert!(h.backend.calls().is_empty());
    assert!(h.transport.calls().is_empty());
}

#[tokio::test]
async fn test_group_mention_is_stripped_and_forwarded() {
    let h = harness(MockBackend::default());

    let outcome = h
        .relay
        .handle_event(group_message("ev_g2", "@_user_1 summarize the thread", true))
        .await
        .unwrap();

    assert_eq!(outcome, Outcome::Delivered);
    assert_eq!(h.backend.prompts(), vec!["summarize the thread".to_string()]);
    assert!(matches!(
        h.backend.calls().first(),
        Some(BackendCall::CreateSession { title }) if title == "Lark: Platform Team"
    ));
}

#[tokio::test]
async fn test_bare_mention_gets_clarifying_prompt() {
    let h = harness(MockBackend::default());

    let outcome = h
        .relay
        .handle_event(group_message("ev_g3", "@_user_1 ", true))
        .await
        .unwrap();

    assert_eq!(outcome, Outcome::Clarified);
    assert!(h.backend.calls().is_empty());
    let messages = h.transport.messages();
    assert_eq!(messages.len(), 1);
    assert!(matches!(&messages[0], Outbound::Send { chat_id, .. } if chat_id == "oc_group"));
    assert!(messages[0].content().contains(CLARIFYING_PROMPT));
}

#[tokio::test]
async fn test_non_text_message_is_ignored() {
    let h = harness(MockBackend::default());
    let mut msg = direct_message("ev_img", "");
    msg.message_type = "image".to_string();

    let outcome = h.relay.handle_event(msg).await.unwrap();
    assert_eq!(outcome, Outcome::Dropped(DropReason::NotText));
    assert!(h.transport.calls().is_empty());
}

#[tokio::test]
async fn test_session_is_reused_across_messages() {
    let h = harness(MockBackend::default());

    h.relay
        .handle_event(direct_message("ev_a", "first"))
        .await
        .unwrap();
    h.relay
        .handle_event(direct_message("ev_b", "second"))
        .await
        .unwrap();

    assert_eq!(h.backend.sessions_created(), 1);
    let prompts: Vec<_> = h
        .backend
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            BackendCall::Prompt { session_id, .. } => Some(session_id),
            _ => None,
        })
        .collect();
    assert_eq!(prompts, vec!["ses_1".to_string(), "ses_1".to_string()]);

    let bindings = h.store.all().await.unwrap();
    assert_eq!(bindings["oc_direct"].session_id, "ses_1");
}

#[tokio::test]
async fn test_new_command_short_circuits_backend_prompt() {
    let h = harness(MockBackend::default());

    let outcome = h
        .relay
        .handle_event(direct_message("ev_new", "/new"))
        .await
        .unwrap();

    assert_eq!(outcome, Outcome::Command);
    assert!(h.backend.prompts().is_empty());
    assert_eq!(h.backend.sessions_created(), 1);
    let messages = h.transport.messages();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].content().contains("ses_1"));

    // the next query goes to the fresh session
    h.relay
        .handle_event(direct_message("ev_after", "hello"))
        .await
        .unwrap();
    assert_eq!(h.backend.sessions_created(), 1);
}

#[tokio::test]
async fn test_reset_command_forgets_binding() {
    let h = harness(MockBackend::default());

    h.relay
        .handle_event(direct_message("ev_1", "hello"))
        .await
        .unwrap();
    h.relay
        .handle_event(direct_message("ev_2", "/reset"))
        .await
        .unwrap();

    assert!(h.store.all().await.unwrap().is_empty());
    assert!(h.backend.calls().contains(&BackendCall::Delete {
        session_id: "ses_1".to_string()
    }));

    h.relay
        .handle_event(direct_message("ev_3", "hello again"))
        .await
        .unwrap();
    assert_eq!(h.backend.sessions_created(), 2);
}

#[tokio::test]
async fn test_unknown_command_is_forwarded_as_query() {
    let h = harness(MockBackend::default());

    let outcome = h
        .relay
        .handle_event(direct_message("ev_cmd", "/deploy staging"))
        .await
        .unwrap();

    assert_eq!(outcome, Outcome::Delivered);
    assert_eq!(h.backend.prompts(), vec!["/deploy staging".to_string()]);
}

#[tokio::test]
async fn test_backend_failure_sends_error_card() {
    let h = harness(MockBackend::with_responses(vec![Err(RelayError::backend(
        "HTTP 500: upstream exploded",
    ))]));

    let result = h
        .relay
        .handle_event(direct_message("ev_err", "will this work?"))
        .await;
    assert!(result.is_err());

    let messages = h.transport.messages();
    assert_eq!(messages.len(), 1);
    match &messages[0] {
        Outbound::Reply {
            message_id,
            content,
        } => {
            assert_eq!(message_id, "om_ev_err");
            assert!(content.contains("Error processing request"));
        }
        other => panic!("expected error reply, got {:?}", other),
    }
}

#[tokio::test]
async fn test_reaction_failure_does_not_block_reply() {
    let transport = MockTransport {
        fail_reactions: true,
        ..MockTransport::default()
    };
    let h = harness_with(transport, MockBackend::default());

    let outcome = h
        .relay
        .handle_event(direct_message("ev_r", "ping"))
        .await
        .unwrap();

    assert_eq!(outcome, Outcome::Delivered);
    assert_eq!(h.transport.messages().len(), 1);
}

#[tokio::test]
async fn test_run_drains_channel() {
    let h = harness(MockBackend::default());
    let (tx, rx) = tokio::sync::mpsc::channel(8);
    let runner = tokio::spawn(h.relay.clone().run(rx));

    tx.send(direct_message("ev_q1", "one")).await.unwrap();
    tx.send(direct_message("ev_q1", "one")).await.unwrap();
    drop(tx);
    runner.await.unwrap();

    // dispatched tasks finish shortly after the loop exits
    for _ in 0..50 {
        if !h.transport.messages().is_empty() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert_eq!(h.backend.prompts(), vec!["one".to_string()]);
    assert_eq!(h.relay.dedup().len(), 1);
}
