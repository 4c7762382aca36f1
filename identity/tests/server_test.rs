//! Integration tests for the Identity HTTP server, grounded in the
//! bind-ephemeral-port-and-drive-with-reqwest pattern used for the ledger
//! demo's server tests.

use agent_economy_common::db as common_db;
use agent_economy_common::envelope;
use ed25519_dalek::SigningKey;
use identity::state::AppState;
use rand::rngs::OsRng;
use serde_json::{json, Value};
use tokio::net::TcpListener;

struct TestServer {
    base_url: String,
}

impl TestServer {
    async fn new() -> Self {
        let db_path = std::env::temp_dir().join(format!("identity-test-{}.sqlite", uuid::Uuid::new_v4()));
        let pools = common_db::open(db_path.to_str().unwrap()).await.unwrap();
        identity::db::migrate(&pools.writer).await.unwrap();

        let state = AppState::new(pools);
        let app = identity::build_router(state, 1024 * 1024);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        TestServer {
            base_url: format!("http://{addr}"),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[tokio::test]
#[ignore = "requires a bound TCP listener"]
async fn registers_and_verifies_a_signed_envelope() {
    let server = TestServer::new().await;
    let client = reqwest::Client::new();

    let signing_key = SigningKey::generate(&mut OsRng);
    let public_key = envelope::format_public_key(&signing_key.verifying_key());

    let register_resp = client
        .post(server.url("/agents"))
        .json(&json!({"display_name": "alice", "public_key": public_key}))
        .send()
        .await
        .unwrap();
    assert_eq!(register_resp.status(), 201);
    let agent: Value = register_resp.json().await.unwrap();
    let agent_id = agent["agent_id"].as_str().unwrap().to_string();
    assert!(agent_id.starts_with("a-"));

    let token = envelope::encode(
        &agent_id,
        &json!({"action": "create_task", "task_id": "t-1"}),
        &signing_key,
    );

    let verify_resp = client
        .post(server.url("/verify"))
        .json(&json!({"token": token}))
        .send()
        .await
        .unwrap();
    assert_eq!(verify_resp.status(), 200);
    let body: Value = verify_resp.json().await.unwrap();
    assert_eq!(body["valid"], true);
    assert_eq!(body["agent_id"], agent_id);
    assert_eq!(body["payload"]["action"], "create_task");
}

#[tokio::test]
#[ignore = "requires a bound TCP listener"]
async fn rejects_duplicate_registration() {
    let server = TestServer::new().await;
    let client = reqwest::Client::new();

    let signing_key = SigningKey::generate(&mut OsRng);
    let public_key = envelope::format_public_key(&signing_key.verifying_key());
    let body = json!({"display_name": "bob", "public_key": public_key});

    let first = client.post(server.url("/agents")).json(&body).send().await.unwrap();
    assert_eq!(first.status(), 201);

    let second = client.post(server.url("/agents")).json(&body).send().await.unwrap();
    assert_eq!(second.status(), 409);
    let err: Value = second.json().await.unwrap();
    assert_eq!(err["error"], "AGENT_EXISTS");
}

#[tokio::test]
#[ignore = "requires a bound TCP listener"]
async fn verify_never_discloses_why_a_token_is_invalid() {
    let server = TestServer::new().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(server.url("/verify"))
        .json(&json!({"token": "not-a-real-envelope"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["valid"], false);
    assert!(body.get("agent_id").is_none());
    assert!(body.get("payload").is_none());
}
