use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use httpmock::{
    Method::{GET, POST},
    MockServer,
};
use serde_json::json;
use tempfile::tempdir;
use tokio::sync::mpsc;
use topicbot_commands::{
    CommandGatewayConfig, CommandHandler, CommandReply, ReplyChannel, TASK_RUNNING_NOTICE,
};
use topicbot_gateway::{
    GatewayClientConfig, RetryPolicy, RetryingGatewayClient, BACKEND_UNREACHABLE_MESSAGE,
};
use topicbot_session::{InMemorySessionStore, SessionStore, SqliteSessionStore};

struct ChannelReplies {
    sender: mpsc::UnboundedSender<(String, String)>,
}

#[async_trait]
impl ReplyChannel for ChannelReplies {
    async fn send(&self, topic_id: &str, text: &str) -> anyhow::Result<()> {
        self.sender
            .send((topic_id.to_string(), text.to_string()))
            .map_err(|_| anyhow::anyhow!("reply receiver dropped"))
    }
}

struct Gateway {
    handler: CommandHandler,
    notices: mpsc::UnboundedReceiver<(String, String)>,
}

impl Gateway {
    fn new(
        base_url: &str,
        retry: RetryPolicy,
        config: CommandGatewayConfig,
        store: Arc<dyn SessionStore>,
    ) -> Self {
        let client = RetryingGatewayClient::new(GatewayClientConfig {
            base_url: base_url.to_string(),
            request_timeout: Duration::from_secs(5),
            retry,
            ..GatewayClientConfig::default()
        })
        .expect("gateway client");
        let (sender, notices) = mpsc::unbounded_channel();
        let handler = CommandHandler::new(
            config,
            store,
            Arc::new(client),
            Arc::new(ChannelReplies { sender }),
        );
        Self { handler, notices }
    }

    async fn text(&self, topic_id: &str, line: &str) -> String {
        match self.handler.handle_text(topic_id, line).await {
            Some(CommandReply::Text(text)) => text,
            other => panic!("expected text reply for {line:?}, got {other:?}"),
        }
    }
}

fn quick_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 2,
        base_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(20),
    }
}

fn memory_store() -> Arc<dyn SessionStore> {
    Arc::new(InMemorySessionStore::default())
}

#[tokio::test]
async fn integration_chat_outside_topic_never_contacts_backend() {
    let server = MockServer::start();
    let create = server.mock(|when, then| {
        when.method(POST).path("/session");
        then.status(200).json_body(json!({ "id": "ses_never" }));
    });
    let gateway = Gateway::new(
        &server.base_url(),
        quick_retry(),
        CommandGatewayConfig::default(),
        memory_store(),
    );

    let reply = gateway.text("", "/oc chat hello").await;
    assert!(reply.contains("connect"));
    create.assert_hits(0);
}

#[tokio::test]
async fn integration_projects_in_uninitialized_topic_hits_project_endpoint() {
    let server = MockServer::start();
    let projects = server.mock(|when, then| {
        when.method(GET).path("/project");
        then.status(200).json_body(json!([
            { "id": "prj_alpha", "worktree": "/work/alpha" },
            { "id": "prj_beta", "worktree": "/work/beta" }
        ]));
    });
    let gateway = Gateway::new(
        &server.base_url(),
        quick_retry(),
        CommandGatewayConfig::default(),
        memory_store(),
    );

    let reply = gateway.text("T1", "/oc projects").await;
    assert!(reply.contains("alpha"));
    assert!(reply.contains("beta"));
    projects.assert_hits(1);
}

#[tokio::test]
async fn integration_stale_persisted_binding_requires_explicit_initialization() {
    let temp = tempdir().expect("tempdir");
    let store =
        Arc::new(SqliteSessionStore::open(&temp.path().join("sessions.sqlite")).expect("sqlite"));
    store.save("T1", "ses_stale").expect("seed binding");

    let server = MockServer::start();
    let message = server.mock(|when, then| {
        when.method(POST).path("/session/ses_stale/message");
        then.status(200).json_body(json!({ "parts": [] }));
    });
    let gateway = Gateway::new(
        &server.base_url(),
        quick_retry(),
        CommandGatewayConfig::default(),
        store,
    );

    let reply = gateway.text("T1", "/oc chat hello").await;
    assert!(reply.contains("Initialization required"));
    message.assert_hits(0);
}

#[tokio::test]
async fn integration_new_session_against_unreachable_backend_stops_after_three_attempts() {
    let store = memory_store();
    store.save("T1", "ses_abc").expect("bind");
    store.set_explicitly_initialized("T1").expect("flag");
    let gateway = Gateway::new(
        "http://127.0.0.1:9",
        RetryPolicy::default(),
        CommandGatewayConfig::default(),
        store.clone(),
    );

    let started = Instant::now();
    let reply = gateway.text("T1", "/oc new hello").await;
    let elapsed = started.elapsed();
    assert_eq!(reply, BACKEND_UNREACHABLE_MESSAGE);
    // Two backoff sleeps (1s then 2s) separate the three attempts; a fourth
    // attempt would add another 4s.
    assert!(elapsed >= Duration::from_millis(3_000), "{elapsed:?}");
    assert!(elapsed < Duration::from_millis(5_000), "{elapsed:?}");
    // The old binding was dropped before the failed creation.
    assert!(store.get("T1").expect("get").is_none());
}

#[tokio::test]
async fn integration_sessions_limit_is_validated_before_any_request() {
    let server = MockServer::start();
    let projects = server.mock(|when, then| {
        when.method(GET).path("/project");
        then.status(200).json_body(json!([]));
    });
    let sessions = server.mock(|when, then| {
        when.method(GET).path("/session");
        then.status(200).json_body(json!([]));
    });
    let gateway = Gateway::new(
        &server.base_url(),
        quick_retry(),
        CommandGatewayConfig::default(),
        memory_store(),
    );

    let reply = gateway.text("T1", "/oc sessions myproj 999").await;
    assert!(reply.contains("between 1 and 20"));
    projects.assert_hits(0);
    sessions.assert_hits(0);
}

#[tokio::test]
async fn integration_bind_then_chat_and_new_persist_across_store_reopen() {
    let temp = tempdir().expect("tempdir");
    let db_path = temp.path().join("sessions.sqlite");
    let server = MockServer::start();
    let bound_message = server.mock(|when, then| {
        when.method(POST)
            .path("/session/ses_bound/message")
            .json_body(json!({ "parts": [{ "type": "text", "text": "summarize" }] }));
        then.status(200).json_body(json!({
            "info": { "sessionID": "ses_bound" },
            "parts": [
                { "type": "text", "text": "Summary line one" },
                { "type": "tool", "text": "ignored" },
                { "type": "text", "text": "Summary line two" }
            ]
        }));
    });
    let create = server.mock(|when, then| {
        when.method(POST).path("/session");
        then.status(200).json_body(json!({ "id": "ses_fresh" }));
    });
    let fresh_message = server.mock(|when, then| {
        when.method(POST).path("/session/ses_fresh/message");
        then.status(200)
            .json_body(json!({ "parts": [{ "type": "text", "text": "started" }] }));
    });

    {
        let store: Arc<dyn SessionStore> =
            Arc::new(SqliteSessionStore::open(&db_path).expect("sqlite"));
        let gateway = Gateway::new(
            &server.base_url(),
            quick_retry(),
            CommandGatewayConfig::default(),
            store,
        );
        let reply = gateway.text("T1", "/oc session continue ses_bound").await;
        assert!(reply.contains("Session bound: ses_bound"));

        let reply = gateway.text("T1", "/oc chat summarize").await;
        assert_eq!(
            reply,
            "Summary line one\nSummary line two\n\n📎 Session: ses_bound"
        );
        bound_message.assert_hits(1);
    }

    let store = Arc::new(SqliteSessionStore::open(&db_path).expect("reopen"));
    let binding = store.get("T1").expect("get").expect("binding");
    assert_eq!(binding.session_id.as_deref(), Some("ses_bound"));
    assert!(binding.explicitly_initialized);

    let gateway = Gateway::new(
        &server.base_url(),
        quick_retry(),
        CommandGatewayConfig::default(),
        store.clone(),
    );
    let reply = gateway.text("T1", "/oc new start over").await;
    assert!(reply.starts_with("started"));
    assert!(reply.ends_with("ses_fresh"));
    create.assert_hits(1);
    fresh_message.assert_hits(1);
    assert_eq!(
        store.get("T1").expect("get").and_then(|binding| binding.session_id),
        Some("ses_fresh".to_string())
    );
}

#[tokio::test]
async fn integration_long_running_task_result_arrives_through_reply_channel() {
    let server = MockServer::start();
    let message = server.mock(|when, then| {
        when.method(POST).path("/session/ses_slow/message");
        then.status(200)
            .json_body(json!({ "parts": [{ "type": "text", "text": "done at last" }] }))
            .delay(Duration::from_millis(800));
    });
    let store = memory_store();
    store.save("T1", "ses_slow").expect("bind");
    store.set_explicitly_initialized("T1").expect("flag");
    let config = CommandGatewayConfig {
        sync_timeout: Duration::from_millis(200),
        slow_notice_after: Duration::from_millis(100),
        ..CommandGatewayConfig::default()
    };
    let mut gateway = Gateway::new(&server.base_url(), quick_retry(), config, store.clone());

    assert_eq!(
        gateway.handler.handle_text("T1", "/oc chat take your time").await,
        Some(CommandReply::Deferred)
    );
    assert_eq!(
        gateway.notices.recv().await.expect("running notice"),
        ("T1".to_string(), TASK_RUNNING_NOTICE.to_string())
    );
    let (topic_id, result) = tokio::time::timeout(Duration::from_secs(5), gateway.notices.recv())
        .await
        .expect("result before deadline")
        .expect("result");
    assert_eq!(topic_id, "T1");
    assert_eq!(result, "done at last\n\n📎 Session: ses_slow");
    gateway.handler.executor().wait_for_background_tasks().await;

    // The abandoned synchronous attempt and the background continuation both ran.
    message.assert_hits(2);
    assert_eq!(
        store.get("T1").expect("get").and_then(|binding| binding.session_id),
        Some("ses_slow".to_string())
    );
}

#[tokio::test]
async fn integration_error_status_surfaces_after_retry_budget() {
    let server = MockServer::start();
    let commands = server.mock(|when, then| {
        when.method(GET).path("/command");
        then.status(502).body("bad gateway");
    });
    let store = memory_store();
    store.save("T1", "ses_abc").expect("bind");
    let gateway = Gateway::new(
        &server.base_url(),
        quick_retry(),
        CommandGatewayConfig::default(),
        store,
    );

    let reply = gateway.text("T1", "/oc commands").await;
    assert!(reply.contains("502"), "{reply}");
    commands.assert_hits(2);
}

#[tokio::test]
async fn integration_reply_mentioning_other_session_keeps_binding() {
    let server = MockServer::start();
    let message = server.mock(|when, then| {
        when.method(POST).path("/session/ses_bound/message");
        then.status(200).json_body(json!({
            "parts": [{ "type": "text", "text": "I compared with ses_other" }]
        }));
    });
    let store = memory_store();
    store.save("T1", "ses_bound").expect("bind");
    store.set_explicitly_initialized("T1").expect("flag");
    let gateway = Gateway::new(
        &server.base_url(),
        quick_retry(),
        CommandGatewayConfig::default(),
        store.clone(),
    );

    for prompt in ["/oc chat hi", "/oc chat again"] {
        let reply = gateway.text("T1", prompt).await;
        assert!(reply.ends_with("📎 Session: ses_bound"), "{reply}");
    }
    message.assert_hits(2);
    assert_eq!(
        store.get("T1").expect("get").and_then(|binding| binding.session_id),
        Some("ses_bound".to_string())
    );
}
