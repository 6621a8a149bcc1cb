//! Runtime-side dispatch: per-session gateway and agent lifecycle.

mod common;

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;

use tether::auth::StaticTokenProvider;
use tether::context::ambient;
use tether::error::TetherError;
use tether::runtime::{RuntimeRequest, SessionRuntime};
use tether::types::{IdentityToken, SessionId};

use common::{CountingConnector, FakeAgentFactory};

const GATEWAY_URL: &str = "https://gateway.example.com/mcp";

fn runtime(connector: CountingConnector) -> SessionRuntime<CountingConnector, FakeAgentFactory> {
    SessionRuntime::new(
        connector,
        FakeAgentFactory::default(),
        Arc::new(StaticTokenProvider::new("m2m-token")),
        GATEWAY_URL,
    )
}

#[tokio::test]
async fn repeated_requests_reuse_gateway_and_agent() {
    let runtime = runtime(CountingConnector::new());
    let request = RuntimeRequest::new().with_session_id("sess-1");

    let first = runtime
        .dispatch(request.clone(), |agent| async move { Ok(agent) })
        .await
        .unwrap();
    let second = runtime
        .dispatch(request, |agent| async move { Ok(agent) })
        .await
        .unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.session_id, SessionId::new("sess-1"));
    assert_eq!(first.gateway.url, GATEWAY_URL);
    assert_eq!(first.gateway.token, IdentityToken::new("m2m-token"));
    assert_eq!(runtime.connector().connects(), 1);
    assert_eq!(runtime.agent_factory().builds(), 1);
}

#[tokio::test]
async fn gateway_url_is_recorded_for_the_session() {
    let runtime = runtime(CountingConnector::new());
    let id = SessionId::new("sess-1");

    runtime
        .dispatch(RuntimeRequest::new().with_session_id(id.clone()), |_| async { Ok(()) })
        .await
        .unwrap();

    assert_eq!(runtime.store().gateway_url(&id).await.as_deref(), Some(GATEWAY_URL));
    let snapshot = runtime.store().snapshot(&id).await.expect("snapshot");
    assert!(snapshot.has_agent);
    assert!(snapshot.has_gateway_client);
}

#[tokio::test]
async fn handler_sees_session_and_workload_token() {
    let runtime = runtime(CountingConnector::new());
    let request = RuntimeRequest::new()
        .with_session_id("sess-7")
        .with_workload_token("workload-abc");

    let (session, token) = runtime
        .dispatch(request, |_| async {
            Ok((ambient::current_session(), ambient::current_identity_token()))
        })
        .await
        .unwrap();

    assert_eq!(session, Some(SessionId::new("sess-7")));
    assert_eq!(token, Some(IdentityToken::new("workload-abc")));
    assert_eq!(ambient::current_session(), None);
}

#[tokio::test]
async fn missing_session_is_rejected_when_hosted() {
    let runtime = runtime(CountingConnector::new());

    let err = runtime
        .dispatch(RuntimeRequest::new(), |_| async { Ok(()) })
        .await
        .unwrap_err();

    assert!(matches!(err, TetherError::NotInitialized(_)));
    assert_eq!(runtime.connector().connects(), 0);
    assert!(runtime.store().is_empty());
}

#[tokio::test]
async fn missing_session_is_generated_when_local() {
    let runtime = runtime(CountingConnector::new()).with_local(true);

    let session = runtime
        .dispatch(RuntimeRequest::new(), |agent| async move {
            Ok(agent.session_id.clone())
        })
        .await
        .unwrap();

    assert!(uuid::Uuid::parse_str(session.as_str()).is_ok());
    assert!(runtime.store().contains(&session));
}

#[tokio::test]
async fn sessions_get_separate_gateway_clients() {
    let runtime = runtime(CountingConnector::new());

    for id in ["a", "b", "a", "c", "b"] {
        runtime
            .dispatch(RuntimeRequest::new().with_session_id(id), |_| async { Ok(()) })
            .await
            .unwrap();
    }

    assert_eq!(runtime.connector().connects(), 3);
    assert_eq!(runtime.agent_factory().builds(), 3);
    assert_eq!(runtime.store().len(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_first_requests_connect_once() {
    let runtime = Arc::new(runtime(
        CountingConnector::new().with_delay(Duration::from_millis(50)),
    ));

    let tasks = (0..20).map(|_| {
        let runtime = runtime.clone();
        tokio::spawn(async move {
            runtime
                .dispatch(RuntimeRequest::new().with_session_id("hot"), |agent| async move {
                    Ok(agent.gateway.serial)
                })
                .await
                .unwrap()
        })
    });
    let serials: Vec<usize> = futures::future::join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    assert!(serials.iter().all(|serial| *serial == serials[0]));
    assert_eq!(runtime.connector().connects(), 1);
    assert_eq!(runtime.agent_factory().builds(), 1);
}

#[tokio::test]
async fn failed_connect_is_not_cached() {
    let runtime = runtime(CountingConnector::new().fail_times(1));
    let request = RuntimeRequest::new().with_session_id("sess-1");

    let err = runtime
        .dispatch(request.clone(), |_| async { Ok(()) })
        .await
        .unwrap_err();
    assert!(matches!(err, TetherError::Gateway(_)));
    assert!(runtime
        .store()
        .gateway_client(&SessionId::new("sess-1"))
        .await
        .is_none());
    assert_eq!(runtime.agent_factory().builds(), 0);

    runtime
        .dispatch(request, |_| async { Ok(()) })
        .await
        .expect("second attempt connects");
    assert_eq!(runtime.connector().connects(), 2);
    assert_eq!(runtime.agent_factory().builds(), 1);
}

#[tokio::test]
async fn handler_error_is_returned_and_session_kept() {
    let runtime = runtime(CountingConnector::new());

    let err = runtime
        .dispatch(RuntimeRequest::new().with_session_id("s"), |_| async {
            Err::<(), _>(TetherError::Backend("tool failed".into()))
        })
        .await
        .unwrap_err();

    assert!(matches!(err, TetherError::Backend(_)));
    assert!(runtime.store().agent(&SessionId::new("s")).await.is_some());
}

#[tokio::test]
async fn end_session_disconnects_and_forgets() {
    let runtime = runtime(CountingConnector::new());
    let id = SessionId::new("sess-1");
    runtime
        .dispatch(RuntimeRequest::new().with_session_id(id.clone()), |_| async { Ok(()) })
        .await
        .unwrap();

    assert!(runtime.end_session(&id).await.unwrap());
    assert_eq!(runtime.connector().disconnects(), 1);
    assert!(!runtime.store().contains(&id));
    assert!(!runtime.end_session(&id).await.unwrap());
    assert_eq!(runtime.connector().disconnects(), 1);

    // A later request for the same id starts from scratch.
    runtime
        .dispatch(RuntimeRequest::new().with_session_id(id), |_| async { Ok(()) })
        .await
        .unwrap();
    assert_eq!(runtime.connector().connects(), 2);
}

#[tokio::test]
async fn shutdown_ends_every_session() {
    let runtime = runtime(CountingConnector::new());
    for id in ["a", "b", "c"] {
        runtime
            .dispatch(RuntimeRequest::new().with_session_id(id), |_| async { Ok(()) })
            .await
            .unwrap();
    }

    runtime.shutdown().await.unwrap();

    assert_eq!(runtime.connector().disconnects(), 3);
    assert!(runtime.store().is_empty());
}

#[tokio::test]
async fn request_parsed_from_headers_dispatches() {
    let runtime = runtime(CountingConnector::new());
    let request = RuntimeRequest::from_headers([
        ("X-Amzn-Bedrock-AgentCore-Runtime-Session-Id", "from-header"),
        ("X-Amzn-Bedrock-AgentCore-Runtime-Workload-AccessToken", "wl"),
    ]);

    let agent = runtime
        .dispatch(request, |agent| async move { Ok(agent) })
        .await
        .unwrap();
    assert_eq!(agent.session_id, SessionId::new("from-header"));
}
