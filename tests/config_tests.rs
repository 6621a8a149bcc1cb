//! Tests for configuration system.

use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};
use std::time::Duration;

use pretty_assertions::assert_eq;

use tether::config::{TetherConfig, DEFAULT_REGION};
use tether::error::TetherError;
use tether::types::SessionId;

static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

const CONFIG_ENV_VARS: [&str; 11] = [
    "TETHER_CLIENT_ID",
    "TETHER_CLIENT_SECRET",
    "TETHER_ISSUER_URL",
    "TETHER_TOKEN_SCOPES",
    "TETHER_GATEWAY_URL",
    "TETHER_RUNTIME_URL",
    "TETHER_AGENT_ARN",
    "TETHER_REGION",
    "TETHER_SESSION_CAPACITY",
    "TETHER_CHAT_PREAMBLE",
    "TETHER_REQUEST_TIMEOUT_SECS",
];

struct EnvGuard {
    saved: Vec<(String, Option<String>)>,
}

impl EnvGuard {
    fn capture(keys: &[&str]) -> Self {
        let saved = keys
            .iter()
            .map(|key| ((*key).to_string(), std::env::var(key).ok()))
            .collect();
        Self { saved }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, value) in &self.saved {
            match value {
                Some(value) => std::env::set_var(key, value),
                None => std::env::remove_var(key),
            }
        }
    }
}

fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| vars.get(key).cloned()
}

#[test]
fn full_environment_is_loaded() {
    let config = TetherConfig::from_lookup(lookup(&[
        ("TETHER_CLIENT_ID", "client-1"),
        ("TETHER_CLIENT_SECRET", "secret-1"),
        ("TETHER_ISSUER_URL", "https://auth.example.com"),
        ("TETHER_TOKEN_SCOPES", "gateway/invoke  gateway/read"),
        ("TETHER_GATEWAY_URL", "https://gateway.example.com/mcp"),
        ("TETHER_RUNTIME_URL", "https://runtime.example.com/"),
        ("TETHER_REGION", "eu-central-1"),
        ("TETHER_SESSION_CAPACITY", "256"),
        ("TETHER_CHAT_PREAMBLE", "Customer ID: 42"),
        ("TETHER_REQUEST_TIMEOUT_SECS", "45"),
    ]))
    .unwrap();

    assert!(config.has_identity_credentials());
    let credentials = config.identity_credentials().unwrap();
    assert_eq!(credentials.client_id, "client-1");
    assert_eq!(credentials.client_secret, "secret-1");
    assert_eq!(credentials.token_url(), "https://auth.example.com/oauth2/token");
    assert_eq!(credentials.scopes, vec!["gateway/invoke", "gateway/read"]);
    assert_eq!(config.token_scopes(), ["gateway/invoke", "gateway/read"]);

    assert_eq!(config.gateway_url().unwrap(), "https://gateway.example.com/mcp");
    assert_eq!(config.resolved_runtime_url(), "https://runtime.example.com/");
    assert!(!config.is_local());
    assert_eq!(config.region(), "eu-central-1");
    assert_eq!(config.session_capacity(), Some(256));
    assert_eq!(config.chat_preamble(), Some("Customer ID: 42"));
    assert_eq!(config.request_timeout(), Duration::from_secs(45));
}

#[test]
fn agent_arn_takes_precedence_over_runtime_url() {
    let config = TetherConfig::from_lookup(lookup(&[
        ("TETHER_RUNTIME_URL", "https://runtime.example.com/"),
        (
            "TETHER_AGENT_ARN",
            "arn:aws:bedrock-agentcore:us-east-1:123456789012:runtime/agent-1",
        ),
        ("TETHER_REGION", "us-east-1"),
    ]))
    .unwrap();

    assert_eq!(
        config.resolved_runtime_url(),
        "https://bedrock-agentcore.us-east-1.amazonaws.com/runtimes/\
         arn%3Aaws%3Abedrock-agentcore%3Aus-east-1%3A123456789012%3Aruntime%2Fagent-1\
         /invocations/"
    );
}

#[test]
fn arn_without_region_uses_default_region() {
    let config =
        TetherConfig::from_lookup(lookup(&[("TETHER_AGENT_ARN", "arn:x")])).unwrap();
    assert_eq!(config.region(), DEFAULT_REGION);
    assert!(config
        .resolved_runtime_url()
        .starts_with("https://bedrock-agentcore.us-west-2.amazonaws.com/"));
}

#[test]
fn invalid_numbers_are_configuration_errors() {
    for (key, value) in [
        ("TETHER_REQUEST_TIMEOUT_SECS", "soon"),
        ("TETHER_SESSION_CAPACITY", "-3"),
        ("TETHER_SESSION_CAPACITY", "lots"),
    ] {
        let err = TetherConfig::from_lookup(lookup(&[(key, value)])).unwrap_err();
        match err {
            TetherError::Configuration(message) => assert!(message.contains(key)),
            other => panic!("expected configuration error for {key}, got {other:?}"),
        }
    }
}

#[test]
fn missing_gateway_url_names_the_variable() {
    let config = TetherConfig::default();
    match config.gateway_url() {
        Err(TetherError::Configuration(message)) => {
            assert!(message.contains("TETHER_GATEWAY_URL"))
        }
        other => panic!("expected configuration error, got {other:?}"),
    }
}

#[tokio::test]
async fn session_store_honours_capacity() {
    let config = TetherConfig::builder().session_capacity(2).build();
    let store = config.session_store::<(), ()>();
    assert_eq!(store.capacity(), Some(2));

    for id in ["a", "b", "c"] {
        store.set_gateway_url(&SessionId::new(id), "https://gw").await;
    }
    assert_eq!(store.len(), 2);
    assert!(!store.contains(&SessionId::new("a")));

    let unbounded = TetherConfig::default().session_store::<(), ()>();
    assert_eq!(unbounded.capacity(), None);
}

#[test]
fn from_env_reads_process_environment() {
    let _lock = ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    let _guard = EnvGuard::capture(&CONFIG_ENV_VARS);
    for key in CONFIG_ENV_VARS {
        std::env::remove_var(key);
    }

    std::env::set_var("TETHER_GATEWAY_URL", "https://gateway.example.com/mcp");
    std::env::set_var("TETHER_RUNTIME_URL", "http://localhost:9100/");

    let config = TetherConfig::from_env().unwrap();
    assert_eq!(config.gateway_url().unwrap(), "https://gateway.example.com/mcp");
    assert_eq!(config.resolved_runtime_url(), "http://localhost:9100/");
    assert!(!config.has_identity_credentials());
}
