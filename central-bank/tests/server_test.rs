//! Integration tests for Central Bank. Each test boots a real Identity
//! server on an ephemeral port alongside Central Bank, the same
//! bind-and-drive-with-reqwest pattern used by the identity crate's tests.

use agent_economy_common::db as common_db;
use agent_economy_common::envelope;
use agent_economy_common::identity_client::IdentityClient;
use central_bank::state::AppState;
use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::net::TcpListener;

struct IdentityServer {
    base_url: String,
}

impl IdentityServer {
    async fn new() -> Self {
        let db_path = std::env::temp_dir().join(format!("cb-test-identity-{}.sqlite", uuid::Uuid::new_v4()));
        let pools = common_db::open(db_path.to_str().unwrap()).await.unwrap();
        identity::db::migrate(&pools.writer).await.unwrap();
        let state = identity::state::AppState::new(pools);
        let app = identity::build_router(state, 1024 * 1024);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        IdentityServer {
            base_url: format!("http://{addr}"),
        }
    }
}

struct TestServer {
    base_url: String,
    #[allow(dead_code)]
    identity: IdentityServer,
    platform_id: String,
    platform_key: SigningKey,
}

impl TestServer {
    async fn new() -> Self {
        let identity = IdentityServer::new().await;
        let client = reqwest::Client::new();

        let platform_key = SigningKey::generate(&mut OsRng);
        let platform_public_key = envelope::format_public_key(&platform_key.verifying_key());
        let resp = client
            .post(format!("{}/agents", identity.base_url))
            .json(&json!({"display_name": "platform", "public_key": platform_public_key}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 201);
        let agent: Value = resp.json().await.unwrap();
        let platform_id = agent["agent_id"].as_str().unwrap().to_string();

        let db_path = std::env::temp_dir().join(format!("cb-test-{}.sqlite", uuid::Uuid::new_v4()));
        let pools = common_db::open(db_path.to_str().unwrap()).await.unwrap();
        central_bank::db::migrate(&pools.writer).await.unwrap();

        let identity_client = IdentityClient::new(identity.base_url.clone(), Duration::from_secs(5));
        let state = AppState::new(pools.writer, pools.reader, identity_client, platform_id.clone());
        let app = central_bank::build_router(state, 1024 * 1024);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        TestServer {
            base_url: format!("http://{addr}"),
            identity,
            platform_id,
            platform_key,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn register_agent(&self, client: &reqwest::Client, name: &str) -> (String, SigningKey) {
        let signing_key = SigningKey::generate(&mut OsRng);
        let public_key = envelope::format_public_key(&signing_key.verifying_key());
        let resp = client
            .post(format!("{}/agents", self.identity.base_url))
            .json(&json!({"display_name": name, "public_key": public_key}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 201);
        let agent: Value = resp.json().await.unwrap();
        (agent["agent_id"].as_str().unwrap().to_string(), signing_key)
    }
}

fn token(signing_key: &SigningKey, agent_id: &str, payload: Value) -> String {
    envelope::encode(agent_id, &payload, signing_key)
}

#[tokio::test]
#[ignore = "requires a bound TCP listener"]
async fn agent_self_serves_a_zero_balance_account() {
    let server = TestServer::new().await;
    let client = reqwest::Client::new();
    let (worker_id, worker_key) = server.register_agent(&client, "worker").await;

    let create_resp = client
        .post(server.url("/accounts"))
        .json(&json!({"token": token(&worker_key, &worker_id, json!({
            "action": "create_account",
            "account_id": worker_id,
            "initial_balance": 0,
        }))}))
        .send()
        .await
        .unwrap();
    assert_eq!(create_resp.status(), 201);

    let account: Value = create_resp.json().await.unwrap();
    assert_eq!(account["balance"], 0);
}

#[tokio::test]
#[ignore = "requires a bound TCP listener"]
async fn self_serve_with_nonzero_balance_is_forbidden() {
    let server = TestServer::new().await;
    let client = reqwest::Client::new();
    let (worker_id, worker_key) = server.register_agent(&client, "worker-2").await;

    let resp = client
        .post(server.url("/accounts"))
        .json(&json!({"token": token(&worker_key, &worker_id, json!({
            "action": "create_account",
            "account_id": worker_id,
            "initial_balance": 500,
        }))}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);
}

#[tokio::test]
#[ignore = "requires a bound TCP listener"]
async fn escrow_lock_is_idempotent_on_payer_and_task() {
    let server = TestServer::new().await;
    let client = reqwest::Client::new();
    let (payer_id, payer_key) = server.register_agent(&client, "payer").await;

    client
        .post(server.url("/accounts"))
        .json(&json!({"token": token(&payer_key, &payer_id, json!({
            "action": "create_account",
            "account_id": payer_id,
            "initial_balance": 500,
        }))}))
        .send()
        .await
        .unwrap();

    let lock_payload = json!({
        "action": "escrow_lock",
        "payer_account_id": payer_id,
        "task_id": "t-fixed",
        "amount": 100,
    });

    let first = client
        .post(server.url("/escrow"))
        .json(&json!({"token": token(&payer_key, &payer_id, lock_payload.clone())}))
        .send()
        .await
        .unwrap();
    assert_eq!(first.status(), 201);
    let first_body: Value = first.json().await.unwrap();

    let second = client
        .post(server.url("/escrow"))
        .json(&json!({"token": token(&payer_key, &payer_id, lock_payload)}))
        .send()
        .await
        .unwrap();
    assert_eq!(second.status(), 201);
    let second_body: Value = second.json().await.unwrap();

    assert_eq!(first_body["escrow_id"], second_body["escrow_id"]);
}

#[tokio::test]
#[ignore = "requires a bound TCP listener"]
async fn credit_is_idempotent_on_reference_and_rejects_a_mismatched_replay() {
    let server = TestServer::new().await;
    let client = reqwest::Client::new();
    let (bob_id, bob_key) = server.register_agent(&client, "bob").await;
    let platform_id = server.platform_id.clone();
    let platform_key = &server.platform_key;

    client
        .post(server.url("/accounts"))
        .json(&json!({"token": token(&bob_key, &bob_id, json!({
            "action": "create_account",
            "account_id": bob_id,
            "initial_balance": 0,
        }))}))
        .send()
        .await
        .unwrap();

    let credit_payload = json!({
        "action": "credit",
        "account_id": bob_id,
        "amount": 50,
        "reference": "salary_round_1",
    });

    let first = client
        .post(server.url("/credit"))
        .json(&json!({"token": token(platform_key, &platform_id, credit_payload.clone())}))
        .send()
        .await
        .unwrap();
    assert_eq!(first.status(), 200);
    let first_body: Value = first.json().await.unwrap();
    assert_eq!(first_body["amount"], 50);
    let first_tx_id = first_body["tx_id"].clone();

    let replay = client
        .post(server.url("/credit"))
        .json(&json!({"token": token(platform_key, &platform_id, credit_payload)}))
        .send()
        .await
        .unwrap();
    assert_eq!(replay.status(), 200);
    let replay_body: Value = replay.json().await.unwrap();
    assert_eq!(replay_body["tx_id"], first_tx_id, "a replayed credit with the same reference and amount returns the original transaction");

    let mismatched = client
        .post(server.url("/credit"))
        .json(&json!({"token": token(platform_key, &platform_id, json!({
            "action": "credit",
            "account_id": bob_id,
            "amount": 60,
            "reference": "salary_round_1",
        }))}))
        .send()
        .await
        .unwrap();
    assert_eq!(mismatched.status(), 400);
    let mismatched_body: Value = mismatched.json().await.unwrap();
    assert_eq!(mismatched_body["error"], "PAYLOAD_MISMATCH");
}

#[tokio::test]
#[ignore = "requires a bound TCP listener"]
async fn escrow_lock_fails_with_insufficient_funds() {
    let server = TestServer::new().await;
    let client = reqwest::Client::new();
    let (payer_id, payer_key) = server.register_agent(&client, "poor-payer").await;

    client
        .post(server.url("/accounts"))
        .json(&json!({"token": token(&payer_key, &payer_id, json!({
            "action": "create_account",
            "account_id": payer_id,
            "initial_balance": 10,
        }))}))
        .send()
        .await
        .unwrap();

    let resp = client
        .post(server.url("/escrow"))
        .json(&json!({"token": token(&payer_key, &payer_id, json!({
            "action": "escrow_lock",
            "payer_account_id": payer_id,
            "task_id": "t-1",
            "amount": 1000,
        }))}))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 402);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "INSUFFICIENT_FUNDS");
}
