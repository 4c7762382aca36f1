//! Integration tests for Task Board, boot a real Identity and Central Bank
//! server on ephemeral ports alongside Task Board, following the same
//! bind-and-drive-with-reqwest pattern as the central-bank crate's tests.
//! Covers spec scenarios S1 (happy path) and S2 (cancel refund).

use agent_economy_common::db as common_db;
use agent_economy_common::envelope;
use agent_economy_common::identity_client::IdentityClient;
use agent_economy_common::platform_signer::PlatformSigner;
use base64::Engine;
use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;
use serde_json::{json, Value};
use std::time::Duration;
use task_board::state::AppState;
use tokio::net::TcpListener;

async fn spawn_identity() -> String {
    let db_path = std::env::temp_dir().join(format!("tb-test-identity-{}.sqlite", uuid::Uuid::new_v4()));
    let pools = common_db::open(db_path.to_str().unwrap()).await.unwrap();
    identity::db::migrate(&pools.writer).await.unwrap();
    let state = identity::state::AppState::new(pools);
    let app = identity::build_router(state, 1024 * 1024);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

async fn spawn_central_bank(identity_url: &str, platform_agent_id: &str) -> String {
    let db_path = std::env::temp_dir().join(format!("tb-test-cb-{}.sqlite", uuid::Uuid::new_v4()));
    let pools = common_db::open(db_path.to_str().unwrap()).await.unwrap();
    central_bank::db::migrate(&pools.writer).await.unwrap();

    let identity_client = IdentityClient::new(identity_url.to_string(), Duration::from_secs(5));
    let state =
        central_bank::state::AppState::new(pools.writer, pools.reader, identity_client, platform_agent_id.to_string());
    let app = central_bank::build_router(state, 1024 * 1024);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn write_platform_key(signing_key: &SigningKey) -> std::path::PathBuf {
    let path = std::env::temp_dir().join(format!("tb-test-platform-{}.key", uuid::Uuid::new_v4()));
    let seed = base64::engine::general_purpose::STANDARD.encode(signing_key.to_bytes());
    std::fs::write(&path, seed).unwrap();
    path
}

/// Registers the platform's keypair as a real agent and returns its
/// server-assigned id - Identity never lets a caller pick its own
/// `agent_id`, so every service's `platform_agent_id` config is, in
/// practice, filled in after this one-time registration.
async fn register_platform(client: &reqwest::Client, identity_url: &str) -> (String, SigningKey) {
    let signing_key = SigningKey::generate(&mut OsRng);
    let public_key = envelope::format_public_key(&signing_key.verifying_key());
    let resp = client
        .post(format!("{identity_url}/agents"))
        .json(&json!({"display_name": "platform", "public_key": public_key}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let agent: Value = resp.json().await.unwrap();
    (agent["agent_id"].as_str().unwrap().to_string(), signing_key)
}

struct TestServer {
    base_url: String,
    identity_url: String,
    central_bank_url: String,
    platform_id: String,
    platform_key_path: std::path::PathBuf,
}

impl TestServer {
    async fn new() -> Self {
        let identity_url = spawn_identity().await;
        let client = reqwest::Client::new();
        let (platform_id, platform_signing_key) = register_platform(&client, &identity_url).await;
        let central_bank_url = spawn_central_bank(&identity_url, &platform_id).await;

        let db_path = std::env::temp_dir().join(format!("tb-test-{}.sqlite", uuid::Uuid::new_v4()));
        let pools = common_db::open(db_path.to_str().unwrap()).await.unwrap();
        task_board::db::migrate(&pools.writer).await.unwrap();
        let storage_root = std::env::temp_dir().join(format!("tb-test-assets-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&storage_root).unwrap();

        let platform_key_path = write_platform_key(&platform_signing_key);
        let platform_signer = PlatformSigner::load(platform_key_path.to_str().unwrap(), platform_id.clone()).unwrap();

        let identity_client = IdentityClient::new(identity_url.clone(), Duration::from_secs(5));
        let central_bank_client =
            agent_economy_common::central_bank_client::CentralBankClient::new(central_bank_url.clone(), Duration::from_secs(5));

        let state = AppState::new(
            pools.writer,
            pools.reader,
            identity_client,
            central_bank_client,
            platform_signer,
            platform_id.clone(),
            storage_root.to_str().unwrap().to_string(),
            10 * 1024 * 1024,
            20,
        );
        let app = task_board::build_router(state, 1024 * 1024);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        TestServer {
            base_url: format!("http://{addr}"),
            identity_url,
            central_bank_url,
            platform_id,
            platform_key_path,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn register_agent(&self, client: &reqwest::Client, name: &str) -> (String, SigningKey) {
        let signing_key = SigningKey::generate(&mut OsRng);
        let public_key = envelope::format_public_key(&signing_key.verifying_key());
        let resp = client
            .post(format!("{}/agents", self.identity_url))
            .json(&json!({"display_name": name, "public_key": public_key}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 201);
        let agent: Value = resp.json().await.unwrap();
        (agent["agent_id"].as_str().unwrap().to_string(), signing_key)
    }

    async fn fund_account(&self, client: &reqwest::Client, agent_id: &str, signing_key: &SigningKey, balance: i64) {
        let platform_signer =
            PlatformSigner::load(self.platform_key_path.to_str().unwrap(), self.platform_id.clone()).unwrap();
        let token = if balance > 0 {
            platform_signer.sign(&json!({
                "action": "create_account",
                "account_id": agent_id,
                "initial_balance": balance,
            }))
        } else {
            envelope::encode(
                agent_id,
                &json!({"action": "create_account", "account_id": agent_id, "initial_balance": 0}),
                signing_key,
            )
        };
        let resp = client
            .post(format!("{}/accounts", self.central_bank_url))
            .json(&json!({"token": token}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 201);
    }

    async fn account_balance(&self, client: &reqwest::Client, agent_id: &str, signing_key: &SigningKey) -> i64 {
        let token = envelope::encode(agent_id, &json!({"action": "read_account"}), signing_key);
        let resp = client
            .get(format!("{}/accounts/{agent_id}", self.central_bank_url))
            .bearer_auth(token)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let body: Value = resp.json().await.unwrap();
        body["balance"].as_i64().unwrap()
    }
}

fn token(signing_key: &SigningKey, agent_id: &str, payload: Value) -> String {
    envelope::encode(agent_id, &payload, signing_key)
}

#[tokio::test]
#[ignore = "requires a bound TCP listener"]
async fn s1_happy_path_from_creation_through_approval() {
    let server = TestServer::new().await;
    let client = reqwest::Client::new();

    let (poster_id, poster_key) = server.register_agent(&client, "alice").await;
    let (worker_id, worker_key) = server.register_agent(&client, "bob").await;
    server.fund_account(&client, &poster_id, &poster_key, 1000).await;
    server.fund_account(&client, &worker_id, &worker_key, 0).await;

    let task_id = format!("t-{}", uuid::Uuid::new_v4());
    let task_token = token(&poster_key, &poster_id, json!({
        "action": "create_task",
        "task_id": task_id,
        "poster_id": poster_id,
        "title": "write a summary",
        "spec": "summarize the attached document",
        "reward": 100,
        "bidding_deadline_seconds": 3600,
        "deadline_seconds": 7200,
        "review_deadline_seconds": 3600,
    }));
    let escrow_token = token(&poster_key, &poster_id, json!({
        "action": "escrow_lock",
        "payer_account_id": poster_id,
        "task_id": task_id,
        "amount": 100,
    }));

    let create_resp = client
        .post(server.url("/tasks"))
        .json(&json!({"task_token": task_token, "escrow_token": escrow_token}))
        .send()
        .await
        .unwrap();
    assert_eq!(create_resp.status(), 201);
    let task: Value = create_resp.json().await.unwrap();
    assert_eq!(task["status"], "open");

    let bid_token = token(&worker_key, &worker_id, json!({
        "action": "submit_bid",
        "task_id": task_id,
        "bidder_id": worker_id,
        "amount": 100,
    }));
    let bid_resp = client
        .post(server.url(&format!("/tasks/{task_id}/bids")))
        .json(&json!({"token": bid_token}))
        .send()
        .await
        .unwrap();
    assert_eq!(bid_resp.status(), 200);
    let bid: Value = bid_resp.json().await.unwrap();
    let bid_id = bid["bid_id"].as_str().unwrap().to_string();

    let accept_token = token(&poster_key, &poster_id, json!({
        "action": "accept_bid",
        "task_id": task_id,
        "bid_id": bid_id,
        "poster_id": poster_id,
    }));
    let accept_resp = client
        .post(server.url(&format!("/tasks/{task_id}/bids/{bid_id}/accept")))
        .json(&json!({"token": accept_token}))
        .send()
        .await
        .unwrap();
    assert_eq!(accept_resp.status(), 200);
    let accepted: Value = accept_resp.json().await.unwrap();
    assert_eq!(accepted["status"], "accepted");
    assert_eq!(accepted["worker_id"], worker_id);

    let upload_token = token(&worker_key, &worker_id, json!({"action": "upload_asset", "task_id": task_id}));
    let part = reqwest::multipart::Part::bytes(b"deliverable contents".to_vec())
        .file_name("summary.txt")
        .mime_str("text/plain")
        .unwrap();
    let form = reqwest::multipart::Form::new().part("file", part);
    let upload_resp = client
        .post(server.url(&format!("/tasks/{task_id}/assets")))
        .bearer_auth(&upload_token)
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(upload_resp.status(), 201);

    let submit_token = token(&worker_key, &worker_id, json!({
        "action": "submit_deliverable",
        "task_id": task_id,
        "worker_id": worker_id,
    }));
    let submit_resp = client
        .post(server.url(&format!("/tasks/{task_id}/submit")))
        .json(&json!({"token": submit_token}))
        .send()
        .await
        .unwrap();
    assert_eq!(submit_resp.status(), 200);
    let submitted: Value = submit_resp.json().await.unwrap();
    assert_eq!(submitted["status"], "submitted");

    let approve_token = token(&poster_key, &poster_id, json!({
        "action": "approve_task",
        "task_id": task_id,
        "poster_id": poster_id,
    }));
    let approve_resp = client
        .post(server.url(&format!("/tasks/{task_id}/approve")))
        .json(&json!({"token": approve_token}))
        .send()
        .await
        .unwrap();
    assert_eq!(approve_resp.status(), 200);
    let approved: Value = approve_resp.json().await.unwrap();
    assert_eq!(approved["status"], "approved");

    assert_eq!(server.account_balance(&client, &poster_id, &poster_key).await, 900);
    assert_eq!(server.account_balance(&client, &worker_id, &worker_key).await, 100);
}

#[tokio::test]
#[ignore = "requires a bound TCP listener"]
async fn s2_cancel_refunds_the_poster_in_full() {
    let server = TestServer::new().await;
    let client = reqwest::Client::new();

    let (poster_id, poster_key) = server.register_agent(&client, "carol").await;
    server.fund_account(&client, &poster_id, &poster_key, 1000).await;

    let task_id = format!("t-{}", uuid::Uuid::new_v4());
    let task_token = token(&poster_key, &poster_id, json!({
        "action": "create_task",
        "task_id": task_id,
        "poster_id": poster_id,
        "title": "cancel me",
        "spec": "spec text",
        "reward": 250,
        "bidding_deadline_seconds": 3600,
        "deadline_seconds": 7200,
        "review_deadline_seconds": 3600,
    }));
    let escrow_token = token(&poster_key, &poster_id, json!({
        "action": "escrow_lock",
        "payer_account_id": poster_id,
        "task_id": task_id,
        "amount": 250,
    }));
    let create_resp = client
        .post(server.url("/tasks"))
        .json(&json!({"task_token": task_token, "escrow_token": escrow_token}))
        .send()
        .await
        .unwrap();
    assert_eq!(create_resp.status(), 201);
    assert_eq!(server.account_balance(&client, &poster_id, &poster_key).await, 750);

    let cancel_token = token(&poster_key, &poster_id, json!({"action": "cancel_task", "task_id": task_id, "poster_id": poster_id}));
    let cancel_resp = client
        .post(server.url(&format!("/tasks/{task_id}/cancel")))
        .json(&json!({"token": cancel_token}))
        .send()
        .await
        .unwrap();
    assert_eq!(cancel_resp.status(), 200);
    let cancelled: Value = cancel_resp.json().await.unwrap();
    assert_eq!(cancelled["status"], "cancelled");

    assert_eq!(server.account_balance(&client, &poster_id, &poster_key).await, 1000);
}

#[tokio::test]
#[ignore = "requires a bound TCP listener"]
async fn create_task_rejects_a_title_over_200_characters() {
    let server = TestServer::new().await;
    let client = reqwest::Client::new();
    let (poster_id, poster_key) = server.register_agent(&client, "dana").await;
    server.fund_account(&client, &poster_id, &poster_key, 1000).await;

    let task_id = format!("t-{}", uuid::Uuid::new_v4());
    let title = "x".repeat(201);
    let task_token = token(&poster_key, &poster_id, json!({
        "action": "create_task",
        "task_id": task_id,
        "poster_id": poster_id,
        "title": title,
        "spec": "spec text",
        "reward": 10,
        "bidding_deadline_seconds": 3600,
        "deadline_seconds": 7200,
        "review_deadline_seconds": 3600,
    }));
    let escrow_token = token(&poster_key, &poster_id, json!({
        "action": "escrow_lock",
        "payer_account_id": poster_id,
        "task_id": task_id,
        "amount": 10,
    }));
    let resp = client
        .post(server.url("/tasks"))
        .json(&json!({"task_token": task_token, "escrow_token": escrow_token}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "TITLE_TOO_LONG");
}

#[tokio::test]
#[ignore = "requires a bound TCP listener"]
async fn self_bid_is_rejected() {
    let server = TestServer::new().await;
    let client = reqwest::Client::new();
    let (poster_id, poster_key) = server.register_agent(&client, "erin").await;
    server.fund_account(&client, &poster_id, &poster_key, 1000).await;

    let task_id = format!("t-{}", uuid::Uuid::new_v4());
    let task_token = token(&poster_key, &poster_id, json!({
        "action": "create_task",
        "task_id": task_id,
        "poster_id": poster_id,
        "title": "self bid test",
        "spec": "spec text",
        "reward": 50,
        "bidding_deadline_seconds": 3600,
        "deadline_seconds": 7200,
        "review_deadline_seconds": 3600,
    }));
    let escrow_token = token(&poster_key, &poster_id, json!({
        "action": "escrow_lock",
        "payer_account_id": poster_id,
        "task_id": task_id,
        "amount": 50,
    }));
    client
        .post(server.url("/tasks"))
        .json(&json!({"task_token": task_token, "escrow_token": escrow_token}))
        .send()
        .await
        .unwrap();

    let bid_token = token(&poster_key, &poster_id, json!({
        "action": "submit_bid",
        "task_id": task_id,
        "bidder_id": poster_id,
        "amount": 50,
    }));
    let resp = client
        .post(server.url(&format!("/tasks/{task_id}/bids")))
        .json(&json!({"token": bid_token}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "SELF_BID");
}

#[tokio::test]
#[ignore = "requires a bound TCP listener"]
async fn s3_review_deadline_expiry_auto_approves_and_pays_the_worker() {
    let server = TestServer::new().await;
    let client = reqwest::Client::new();

    let (poster_id, poster_key) = server.register_agent(&client, "frank").await;
    let (worker_id, worker_key) = server.register_agent(&client, "grace").await;
    server.fund_account(&client, &poster_id, &poster_key, 1000).await;
    server.fund_account(&client, &worker_id, &worker_key, 0).await;

    let task_id = format!("t-{}", uuid::Uuid::new_v4());
    let task_token = token(&poster_key, &poster_id, json!({
        "action": "create_task",
        "task_id": task_id,
        "poster_id": poster_id,
        "title": "auto approve me",
        "spec": "spec text",
        "reward": 100,
        "bidding_deadline_seconds": 3600,
        "deadline_seconds": 7200,
        "review_deadline_seconds": 1,
    }));
    let escrow_token = token(&poster_key, &poster_id, json!({
        "action": "escrow_lock",
        "payer_account_id": poster_id,
        "task_id": task_id,
        "amount": 100,
    }));
    client
        .post(server.url("/tasks"))
        .json(&json!({"task_token": task_token, "escrow_token": escrow_token}))
        .send()
        .await
        .unwrap();

    let bid_token = token(&worker_key, &worker_id, json!({
        "action": "submit_bid", "task_id": task_id, "bidder_id": worker_id, "amount": 100,
    }));
    let bid: Value = client
        .post(server.url(&format!("/tasks/{task_id}/bids")))
        .json(&json!({"token": bid_token}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let bid_id = bid["bid_id"].as_str().unwrap().to_string();

    let accept_token = token(&poster_key, &poster_id, json!({
        "action": "accept_bid", "task_id": task_id, "bid_id": bid_id, "poster_id": poster_id,
    }));
    client
        .post(server.url(&format!("/tasks/{task_id}/bids/{bid_id}/accept")))
        .json(&json!({"token": accept_token}))
        .send()
        .await
        .unwrap();

    let upload_token = token(&worker_key, &worker_id, json!({"action": "upload_asset", "task_id": task_id}));
    let part = reqwest::multipart::Part::bytes(b"deliverable".to_vec())
        .file_name("out.txt")
        .mime_str("text/plain")
        .unwrap();
    client
        .post(server.url(&format!("/tasks/{task_id}/assets")))
        .bearer_auth(&upload_token)
        .multipart(reqwest::multipart::Form::new().part("file", part))
        .send()
        .await
        .unwrap();

    let submit_token = token(&worker_key, &worker_id, json!({
        "action": "submit_deliverable", "task_id": task_id, "worker_id": worker_id,
    }));
    let submitted: Value = client
        .post(server.url(&format!("/tasks/{task_id}/submit")))
        .json(&json!({"token": submit_token}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(submitted["status"], "submitted");

    // No approval is ever sent; wait past the one-second review deadline and
    // let the next GET observe and apply the lazy transition.
    tokio::time::sleep(Duration::from_millis(1500)).await;

    let read: Value = client
        .get(server.url(&format!("/tasks/{task_id}")))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(read["status"], "approved");
    assert_eq!(server.account_balance(&client, &worker_id, &worker_key).await, 100);
    assert_eq!(server.account_balance(&client, &poster_id, &poster_key).await, 900);
}

#[tokio::test]
#[ignore = "requires a bound TCP listener"]
async fn s6_concurrent_duplicate_bids_resolve_to_exactly_one_success() {
    let server = TestServer::new().await;
    let client = reqwest::Client::new();

    let (poster_id, poster_key) = server.register_agent(&client, "henry").await;
    let (bidder_id, bidder_key) = server.register_agent(&client, "iris").await;
    server.fund_account(&client, &poster_id, &poster_key, 1000).await;
    server.fund_account(&client, &bidder_id, &bidder_key, 0).await;

    let task_id = format!("t-{}", uuid::Uuid::new_v4());
    let task_token = token(&poster_key, &poster_id, json!({
        "action": "create_task",
        "task_id": task_id,
        "poster_id": poster_id,
        "title": "duplicate bid race",
        "spec": "spec text",
        "reward": 75,
        "bidding_deadline_seconds": 3600,
        "deadline_seconds": 7200,
        "review_deadline_seconds": 3600,
    }));
    let escrow_token = token(&poster_key, &poster_id, json!({
        "action": "escrow_lock",
        "payer_account_id": poster_id,
        "task_id": task_id,
        "amount": 75,
    }));
    client
        .post(server.url("/tasks"))
        .json(&json!({"task_token": task_token, "escrow_token": escrow_token}))
        .send()
        .await
        .unwrap();

    let bid_token = token(&bidder_key, &bidder_id, json!({
        "action": "submit_bid", "task_id": task_id, "bidder_id": bidder_id, "amount": 75,
    }));

    let url = server.url(&format!("/tasks/{task_id}/bids"));
    let (first, second) = tokio::join!(
        client.post(&url).json(&json!({"token": bid_token.clone()})).send(),
        client.post(&url).json(&json!({"token": bid_token})).send(),
    );
    let statuses = [first.unwrap().status(), second.unwrap().status()];
    let successes = statuses.iter().filter(|s| s.as_u16() == 200).count();
    let conflicts = statuses.iter().filter(|s| s.as_u16() == 409).count();
    assert_eq!(successes, 1, "exactly one concurrent duplicate bid succeeds");
    assert_eq!(conflicts, 1, "the other is rejected as BID_ALREADY_EXISTS");
}
