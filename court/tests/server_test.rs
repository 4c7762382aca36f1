//! Integration tests for Court, booting real Identity, Central Bank, Task
//! Board, a stub Reputation server, and Court on ephemeral ports - the same
//! bind-and-drive-with-reqwest pattern as the central-bank and task-board
//! crates' tests. Covers spec scenario S4 (a three-judge ruling settles the
//! escrow split, records feedback, and marks both the task and the dispute
//! ruled) and the all-or-nothing revert property: a ruling that fails
//! partway (no judges configured) leaves the dispute back in
//! `rebuttal_pending` with no votes persisted.

use agent_economy_common::central_bank_client::CentralBankClient;
use agent_economy_common::db as common_db;
use agent_economy_common::envelope;
use agent_economy_common::identity_client::IdentityClient;
use agent_economy_common::platform_signer::PlatformSigner;
use axum::routing::post;
use axum::{Json, Router};
use base64::Engine;
use court::config::JudgeConfig;
use court::state::AppState as CourtState;
use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;
use serde_json::{json, Value};
use std::time::Duration;
use task_board::state::AppState as TaskBoardState;
use tokio::net::TcpListener;

async fn spawn_identity() -> String {
    let db_path = std::env::temp_dir().join(format!("court-test-identity-{}.sqlite", uuid::Uuid::new_v4()));
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

fn write_platform_key(signing_key: &SigningKey) -> std::path::PathBuf {
    let path = std::env::temp_dir().join(format!("court-test-platform-{}.key", uuid::Uuid::new_v4()));
    let seed = base64::engine::general_purpose::STANDARD.encode(signing_key.to_bytes());
    std::fs::write(&path, seed).unwrap();
    path
}

async fn spawn_central_bank(identity_url: &str, platform_id: &str) -> String {
    let db_path = std::env::temp_dir().join(format!("court-test-cb-{}.sqlite", uuid::Uuid::new_v4()));
    let pools = common_db::open(db_path.to_str().unwrap()).await.unwrap();
    central_bank::db::migrate(&pools.writer).await.unwrap();

    let identity_client = IdentityClient::new(identity_url.to_string(), Duration::from_secs(5));
    let state =
        central_bank::state::AppState::new(pools.writer, pools.reader, identity_client, platform_id.to_string());
    let app = central_bank::build_router(state, 1024 * 1024);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

async fn spawn_task_board(
    identity_url: &str,
    central_bank_url: &str,
    platform_id: &str,
    platform_key_path: &std::path::Path,
) -> String {
    let db_path = std::env::temp_dir().join(format!("court-test-tb-{}.sqlite", uuid::Uuid::new_v4()));
    let pools = common_db::open(db_path.to_str().unwrap()).await.unwrap();
    task_board::db::migrate(&pools.writer).await.unwrap();
    let storage_root = std::env::temp_dir().join(format!("court-test-assets-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&storage_root).unwrap();

    let identity_client = IdentityClient::new(identity_url.to_string(), Duration::from_secs(5));
    let central_bank_client = CentralBankClient::new(central_bank_url.to_string(), Duration::from_secs(5));
    let platform_signer =
        PlatformSigner::load(platform_key_path.to_str().unwrap(), platform_id.to_string()).unwrap();

    let state = TaskBoardState::new(
        pools.writer,
        pools.reader,
        identity_client,
        central_bank_client,
        platform_signer,
        platform_id.to_string(),
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
    format!("http://{addr}")
}

/// Stands in for the out-of-scope reputation service: accepts any
/// platform-signed `submit_feedback` envelope and reports success without
/// verifying it, since Court's feedback calls aren't under test here.
async fn spawn_reputation_stub() -> String {
    async fn feedback(body: axum::Json<Value>) -> Json<Value> {
        Json(json!({"received": true, "token_present": body.0.get("token").is_some()}))
    }
    let app = Router::new().route("/feedback", post(feedback));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

async fn spawn_court(
    identity_url: &str,
    central_bank_url: &str,
    task_board_url: &str,
    reputation_url: &str,
    platform_id: &str,
    platform_key_path: &std::path::Path,
    judges: Vec<JudgeConfig>,
) -> String {
    let db_path = std::env::temp_dir().join(format!("court-test-{}.sqlite", uuid::Uuid::new_v4()));
    let pools = common_db::open(db_path.to_str().unwrap()).await.unwrap();
    court::db::migrate(&pools.writer).await.unwrap();

    let timeout = Duration::from_secs(5);
    let identity_client = IdentityClient::new(identity_url.to_string(), timeout);
    let central_bank_client = CentralBankClient::new(central_bank_url.to_string(), timeout);
    let task_board_client = court::task_board_client::TaskBoardClient::new(task_board_url.to_string(), timeout);
    let reputation_client = agent_economy_common::reputation_client::ReputationClient::new(reputation_url.to_string(), timeout);
    let platform_signer =
        PlatformSigner::load(platform_key_path.to_str().unwrap(), platform_id.to_string()).unwrap();
    let judge_http = court::judges::build_judge_http_client(timeout);

    let state = CourtState::new(
        pools.writer,
        pools.reader,
        identity_client,
        central_bank_client,
        task_board_client,
        reputation_client,
        platform_signer,
        platform_id.to_string(),
        3600,
        judges,
        judge_http,
    );
    let app = court::build_router(state, 1024 * 1024);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

struct TestServer {
    identity_url: String,
    central_bank_url: String,
    task_board_url: String,
    court_url: String,
    platform_id: String,
    platform_key_path: std::path::PathBuf,
}

impl TestServer {
    async fn new(judges: Vec<JudgeConfig>) -> Self {
        let client = reqwest::Client::new();
        let identity_url = spawn_identity().await;
        let (platform_id, platform_signing_key) = register_platform(&client, &identity_url).await;
        let platform_key_path = write_platform_key(&platform_signing_key);
        let central_bank_url = spawn_central_bank(&identity_url, &platform_id).await;
        let task_board_url =
            spawn_task_board(&identity_url, &central_bank_url, &platform_id, &platform_key_path).await;
        let reputation_url = spawn_reputation_stub().await;
        let court_url = spawn_court(
            &identity_url,
            &central_bank_url,
            &task_board_url,
            &reputation_url,
            &platform_id,
            &platform_key_path,
            judges,
        )
        .await;

        TestServer {
            identity_url,
            central_bank_url,
            task_board_url,
            court_url,
            platform_id,
            platform_key_path,
        }
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

    fn platform_signer(&self) -> PlatformSigner {
        PlatformSigner::load(self.platform_key_path.to_str().unwrap(), self.platform_id.clone()).unwrap()
    }

    async fn fund_account(&self, client: &reqwest::Client, agent_id: &str, signing_key: &SigningKey, balance: i64) {
        let token = if balance > 0 {
            self.platform_signer().sign(&json!({
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

    /// Drives a task through to `submitted` and disputed by its poster,
    /// returning (task_id, escrow_id, poster_id, poster_key, worker_id, worker_key).
    #[allow(clippy::too_many_arguments)]
    async fn build_disputed_task(
        &self,
        client: &reqwest::Client,
        poster_name: &str,
        worker_name: &str,
        reward: i64,
    ) -> (String, String, String, SigningKey, String, SigningKey) {
        let (poster_id, poster_key) = self.register_agent(client, poster_name).await;
        let (worker_id, worker_key) = self.register_agent(client, worker_name).await;
        self.fund_account(client, &poster_id, &poster_key, 1000).await;
        self.fund_account(client, &worker_id, &worker_key, 0).await;

        let task_id = format!("t-{}", uuid::Uuid::new_v4());
        let task_token = envelope::encode(
            &poster_id,
            &json!({
                "action": "create_task",
                "task_id": task_id,
                "poster_id": poster_id,
                "title": "research brief",
                "spec": "write a competitive analysis",
                "reward": reward,
                "bidding_deadline_seconds": 3600,
                "deadline_seconds": 7200,
                "review_deadline_seconds": 3600,
            }),
            &poster_key,
        );
        let escrow_token = envelope::encode(
            &poster_id,
            &json!({
                "action": "escrow_lock",
                "payer_account_id": poster_id,
                "task_id": task_id,
                "amount": reward,
            }),
            &poster_key,
        );
        let create_resp = client
            .post(format!("{}/tasks", self.task_board_url))
            .json(&json!({"task_token": task_token, "escrow_token": escrow_token}))
            .send()
            .await
            .unwrap();
        assert_eq!(create_resp.status(), 201);
        let created: Value = create_resp.json().await.unwrap();
        let escrow_id = created["escrow_id"].as_str().unwrap().to_string();

        let bid_token = envelope::encode(
            &worker_id,
            &json!({"action": "submit_bid", "task_id": task_id, "bidder_id": worker_id, "amount": reward}),
            &worker_key,
        );
        let bid_resp = client
            .post(format!("{}/tasks/{task_id}/bids", self.task_board_url))
            .json(&json!({"token": bid_token}))
            .send()
            .await
            .unwrap();
        assert_eq!(bid_resp.status(), 200);
        let bid: Value = bid_resp.json().await.unwrap();
        let bid_id = bid["bid_id"].as_str().unwrap().to_string();

        let accept_token = envelope::encode(
            &poster_id,
            &json!({"action": "accept_bid", "task_id": task_id, "bid_id": bid_id, "poster_id": poster_id}),
            &poster_key,
        );
        let accept_resp = client
            .post(format!("{}/tasks/{task_id}/bids/{bid_id}/accept", self.task_board_url))
            .json(&json!({"token": accept_token}))
            .send()
            .await
            .unwrap();
        assert_eq!(accept_resp.status(), 200);

        let submit_token = envelope::encode(
            &worker_id,
            &json!({"action": "submit_deliverable", "task_id": task_id, "worker_id": worker_id}),
            &worker_key,
        );
        let submit_resp = client
            .post(format!("{}/tasks/{task_id}/submit", self.task_board_url))
            .json(&json!({"token": submit_token}))
            .send()
            .await
            .unwrap();
        assert_eq!(submit_resp.status(), 200);

        let dispute_token = envelope::encode(
            &poster_id,
            &json!({
                "action": "dispute_task",
                "task_id": task_id,
                "poster_id": poster_id,
                "reason": "delivered work does not match the brief",
            }),
            &poster_key,
        );
        let dispute_resp = client
            .post(format!("{}/tasks/{task_id}/dispute", self.task_board_url))
            .json(&json!({"token": dispute_token}))
            .send()
            .await
            .unwrap();
        assert_eq!(dispute_resp.status(), 200);
        let disputed: Value = dispute_resp.json().await.unwrap();
        assert_eq!(disputed["status"], "disputed");

        (task_id, escrow_id, poster_id, poster_key, worker_id, worker_key)
    }

    async fn file_dispute(
        &self,
        client: &reqwest::Client,
        task_id: &str,
        escrow_id: &str,
        claimant_id: &str,
        respondent_id: &str,
    ) -> String {
        let token = self.platform_signer().sign(&json!({
            "action": "file_dispute",
            "task_id": task_id,
            "claimant_id": claimant_id,
            "respondent_id": respondent_id,
            "claim": "the submitted deliverable omits two required sections",
            "escrow_id": escrow_id,
        }));
        let resp = client
            .post(format!("{}/disputes/file", self.court_url))
            .json(&json!({"token": token}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 201);
        let dispute: Value = resp.json().await.unwrap();
        dispute["dispute_id"].as_str().unwrap().to_string()
    }

    async fn execute_ruling(&self, client: &reqwest::Client, dispute_id: &str) -> reqwest::Response {
        let token = self.platform_signer().sign(&json!({
            "action": "execute_ruling",
            "dispute_id": dispute_id,
        }));
        client
            .post(format!("{}/disputes/{dispute_id}/rule", self.court_url))
            .json(&json!({"token": token}))
            .send()
            .await
            .unwrap()
    }

    async fn get_dispute(&self, client: &reqwest::Client, dispute_id: &str) -> Value {
        let resp = client
            .get(format!("{}/disputes/{dispute_id}", self.court_url))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        resp.json().await.unwrap()
    }

    async fn get_task(&self, client: &reqwest::Client, task_id: &str) -> Value {
        let resp = client
            .get(format!("{}/tasks/{task_id}", self.task_board_url))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        resp.json().await.unwrap()
    }
}

#[tokio::test]
#[ignore = "requires a bound TCP listener"]
async fn s4_three_judge_ruling_splits_escrow_by_median_worker_pct() {
    let judges = vec![
        JudgeConfig::Fixed { worker_pct: 40, reasoning: "poster's brief was ambiguous on two points".to_string() },
        JudgeConfig::Fixed { worker_pct: 70, reasoning: "deliverable substantially meets the spec".to_string() },
        JudgeConfig::Fixed { worker_pct: 60, reasoning: "partial compliance, missing one section".to_string() },
    ];
    let server = TestServer::new(judges).await;
    let client = reqwest::Client::new();

    let (task_id, escrow_id, poster_id, poster_key, worker_id, worker_key) =
        server.build_disputed_task(&client, "alice", "bob", 100).await;

    let dispute_id = server.file_dispute(&client, &task_id, &escrow_id, &poster_id, &worker_id).await;

    let rule_resp = server.execute_ruling(&client, &dispute_id).await;
    assert_eq!(rule_resp.status(), 200);
    let ruled: Value = rule_resp.json().await.unwrap();
    assert_eq!(ruled["status"], "ruled");
    assert_eq!(ruled["worker_pct"], 60);
    assert_eq!(ruled["votes"].as_array().unwrap().len(), 3);

    let task = server.get_task(&client, &task_id).await;
    assert_eq!(task["status"], "ruled");
    assert_eq!(task["worker_pct"], 60);

    assert_eq!(server.account_balance(&client, &worker_id, &worker_key).await, 60);
    assert_eq!(server.account_balance(&client, &poster_id, &poster_key).await, 900 + 40);
}

#[tokio::test]
#[ignore = "requires a bound TCP listener"]
async fn ruling_with_no_judges_reverts_the_dispute_to_rebuttal_pending() {
    let server = TestServer::new(vec![]).await;
    let client = reqwest::Client::new();

    let (task_id, escrow_id, poster_id, _poster_key, worker_id, _worker_key) =
        server.build_disputed_task(&client, "carol", "dave", 200).await;

    let dispute_id = server.file_dispute(&client, &task_id, &escrow_id, &poster_id, &worker_id).await;

    let rule_resp = server.execute_ruling(&client, &dispute_id).await;
    assert_eq!(rule_resp.status(), 502);
    let body: Value = rule_resp.json().await.unwrap();
    assert_eq!(body["error"], "JUDGE_UNAVAILABLE");

    let dispute = server.get_dispute(&client, &dispute_id).await;
    assert_eq!(dispute["status"], "rebuttal_pending");
    assert_eq!(dispute["votes"].as_array().unwrap().len(), 0);

    let task = server.get_task(&client, &task_id).await;
    assert_eq!(task["status"], "disputed");
}

#[tokio::test]
#[ignore = "requires a bound TCP listener"]
async fn executing_an_already_ruled_dispute_is_rejected() {
    let judges = vec![JudgeConfig::Fixed { worker_pct: 0, reasoning: "claim fully upheld".to_string() }];
    let server = TestServer::new(judges).await;
    let client = reqwest::Client::new();

    let (task_id, escrow_id, poster_id, poster_key, worker_id, worker_key) =
        server.build_disputed_task(&client, "erin", "frank", 150).await;
    let dispute_id = server.file_dispute(&client, &task_id, &escrow_id, &poster_id, &worker_id).await;

    let first = server.execute_ruling(&client, &dispute_id).await;
    assert_eq!(first.status(), 200);
    assert_eq!(server.account_balance(&client, &poster_id, &poster_key).await, 1000);
    assert_eq!(server.account_balance(&client, &worker_id, &worker_key).await, 0);

    let second = server.execute_ruling(&client, &dispute_id).await;
    assert_eq!(second.status(), 409);
    let body: Value = second.json().await.unwrap();
    assert_eq!(body["error"], "DISPUTE_ALREADY_RULED");
}
