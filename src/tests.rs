//! Integration tests for the Fez backend.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use reqwest::{Client, RequestBuilder};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;

use crate::config::{Config, LogFormat};
use crate::{create_router, init_state, AppState};

const TEST_PSK: &str = "test-api-key";

fn test_config(temp_dir: &TempDir, psk: Option<String>) -> Config {
    Config {
        api_psk: psk,
        db_path: temp_dir.path().join("test.sqlite"),
        index_path: temp_dir.path().join("index"),
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        log_level: "warn".to_string(),
        log_format: LogFormat::Text,
    }
}

/// Test fixture for integration tests.
struct TestFixture {
    client: Client,
    base_url: String,
    state: AppState,
    _temp_dir: TempDir,
}

impl TestFixture {
    async fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config = test_config(&temp_dir, Some(TEST_PSK.to_string()));
        let state = init_state(config).await.expect("Failed to init state");
        let app = create_router(state.clone());

        // Bind to random port
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind");
        let addr = listener.local_addr().expect("Failed to get addr");
        let base_url = format!("http://{}", addr);

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Wait for server to start
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("x-api-key", TEST_PSK.parse().unwrap());
        let client = Client::builder().default_headers(headers).build().unwrap();

        TestFixture {
            client,
            base_url,
            state,
            _temp_dir: temp_dir,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn get(&self, user: Uuid, path: &str) -> RequestBuilder {
        self.client
            .get(self.url(path))
            .header("x-user-id", user.to_string())
    }

    fn post(&self, user: Uuid, path: &str) -> RequestBuilder {
        self.client
            .post(self.url(path))
            .header("x-user-id", user.to_string())
    }

    async fn register(&self, username: &str) -> Uuid {
        let resp = self
            .client
            .post(self.url("/api/users"))
            .json(&json!({ "username": username }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 201);
        let body: Value = resp.json().await.unwrap();
        body["data"]["id"].as_str().unwrap().parse().unwrap()
    }

    async fn create_fez(&self, owner: Uuid, body: Value) -> Value {
        let resp = self
            .post(owner, "/api/fez/create")
            .json(&body)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 201);
        let body: Value = resp.json().await.unwrap();
        body["data"].clone()
    }

    /// POST and return (status, envelope).
    async fn post_json(&self, user: Uuid, path: &str) -> (u16, Value) {
        let resp = self.post(user, path).send().await.unwrap();
        let status = resp.status().as_u16();
        (status, resp.json().await.unwrap())
    }

    async fn get_data(&self, user: Uuid, path: &str) -> Value {
        let resp = self.get(user, path).send().await.unwrap();
        assert_eq!(resp.status(), 200, "GET {}", path);
        let body: Value = resp.json().await.unwrap();
        body["data"].clone()
    }
}

fn activity(max_capacity: i64) -> Value {
    json!({
        "fezType": "activity",
        "title": "A Title!",
        "info": "Some info.",
        "startTime": "",
        "endTime": "",
        "location": "Lido Pool",
        "minCapacity": 0,
        "maxCapacity": max_capacity,
        "initialUsers": []
    })
}

fn fez_path(fez: &Value, action: &str) -> String {
    format!("/api/fez/{}/{}", fez["fezId"].as_str().unwrap(), action)
}

fn member_path(fez: &Value, user: Uuid, action: &str) -> String {
    format!(
        "/api/fez/{}/user/{}/{}",
        fez["fezId"].as_str().unwrap(),
        user,
        action
    )
}

fn usernames(list: &Value) -> Vec<String> {
    list.as_array()
        .unwrap()
        .iter()
        .map(|seat| seat["username"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn test_health_check() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .get(fixture.url("/health"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "OK");
}

#[tokio::test]
async fn test_router_rejects_missing_psk() {
    let temp_dir = TempDir::new().unwrap();
    let state = init_state(test_config(&temp_dir, Some("secret-key".to_string())))
        .await
        .unwrap();
    let app = create_router(state);

    let resp = app
        .clone()
        .oneshot(Request::builder().uri("/api/fez/open").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_wrong_psk_is_unauthorized() {
    let fixture = TestFixture::new().await;

    let resp = Client::new()
        .get(fixture.url("/api/revision"))
        .header("x-api-key", "wrong-key")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");

    let resp = Client::new()
        .get(fixture.url("/api/revision"))
        .header("Authorization", format!("Bearer {}", TEST_PSK))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn test_acting_user_required() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .get(fixture.url("/api/fez/open"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    let resp = fixture.get(Uuid::new_v4(), "/api/fez/open").send().await.unwrap();
    assert_eq!(resp.status(), 401);

    let resp = fixture
        .client
        .get(fixture.url("/api/users/whoami"))
        .header("x-user-id", "not-a-uuid")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_users() {
    let fixture = TestFixture::new().await;
    let verified = fixture.register("verified").await;

    let whoami = fixture.get_data(verified, "/api/users/whoami").await;
    assert_eq!(whoami["username"], "verified");

    let found = fixture.get_data(verified, "/api/users/find/@Verified").await;
    assert_eq!(found["id"], verified.to_string());

    let resp = fixture
        .get(verified, "/api/users/find/nobody")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    let resp = fixture
        .client
        .post(fixture.url("/api/users"))
        .json(&json!({ "username": "VERIFIED" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "CONFLICT");

    let resp = fixture
        .client
        .post(fixture.url("/api/users"))
        .json(&json!({ "username": "a b" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let (status, body) = fixture
        .post_json(verified, &format!("/api/users/{}/block", verified))
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_create() {
    let fixture = TestFixture::new().await;
    let verified = fixture.register("verified").await;

    let types = fixture.get_data(verified, "/api/fez/types").await;
    let types = types.as_array().unwrap();
    assert!(!types.is_empty());
    assert_eq!(types[0], "closed");

    let fez = fixture.create_fez(verified, activity(2)).await;
    assert_eq!(usernames(&fez["seamonkeys"]), vec!["@verified"]);
    assert_eq!(fez["ownerId"], verified.to_string());
    assert_eq!(fez["fezType"], "activity");
    assert_eq!(fez["startTime"], "TBD");
    assert_eq!(fez["endTime"], "TBD");

    let mut timed = activity(2);
    timed["startTime"] = json!("1700000000");
    let fez = fixture.create_fez(verified, timed).await;
    assert_eq!(fez["startTime"], "2023-11-14T22:13:20+00:00");

    let mut bad = activity(2);
    bad["startTime"] = json!("abc");
    bad["endTime"] = json!("def");
    let resp = fixture
        .post(verified, "/api/fez/create")
        .json(&bad)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_join() {
    let fixture = TestFixture::new().await;
    let verified = fixture.register("verified").await;
    let sailor = fixture.register("sailor").await;
    let moderator = fixture.register("moderator").await;

    let fez = fixture.create_fez(sailor, activity(2)).await;
    assert_eq!(usernames(&fez["seamonkeys"]), vec!["@sailor"]);

    let (status, body) = fixture.post_json(verified, &fez_path(&fez, "join")).await;
    assert_eq!(status, 200);
    assert_eq!(usernames(&body["data"]["seamonkeys"]), vec!["@sailor", "@verified"]);

    let (status, body) = fixture.post_json(moderator, &fez_path(&fez, "join")).await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["seamonkeys"].as_array().unwrap().len(), 2);
    assert_eq!(usernames(&body["data"]["waitingList"]), vec!["@moderator"]);

    let joined = fixture.get_data(sailor, "/api/fez/joined").await;
    assert_eq!(joined.as_array().unwrap().len(), 1);
    let joined = fixture.get_data(moderator, "/api/fez/joined").await;
    assert!(joined.as_array().unwrap().is_empty());

    fixture.create_fez(sailor, activity(2)).await;
    let joined = fixture.get_data(sailor, "/api/fez/joined").await;
    assert_eq!(joined.as_array().unwrap().len(), 2);

    let owned = fixture.get_data(verified, "/api/fez/owner").await;
    assert!(owned.as_array().unwrap().is_empty());
    let owned = fixture.get_data(sailor, "/api/fez/owner").await;
    assert_eq!(owned.as_array().unwrap().len(), 2);
    assert_eq!(owned[0]["ownerId"], sailor.to_string());

    let (status, body) = fixture.post_json(verified, &fez_path(&fez, "unjoin")).await;
    assert_eq!(status, 200);
    assert_eq!(usernames(&body["data"]["seamonkeys"]), vec!["@sailor", "@moderator"]);
    assert!(body["data"]["waitingList"].as_array().unwrap().is_empty());

    let (status, _) = fixture.post_json(verified, &fez_path(&fez, "unjoin")).await;
    assert_eq!(status, 404);

    let (status, _) = fixture.post_json(moderator, &fez_path(&fez, "join")).await;
    assert_eq!(status, 400);

    let blocked = fixture.register("blocked").await;
    let (status, _) = fixture
        .post_json(sailor, &format!("/api/users/{}/block", blocked))
        .await;
    assert_eq!(status, 201);
    let (status, body) = fixture.post_json(blocked, &fez_path(&fez, "join")).await;
    assert_eq!(status, 404);
    assert_eq!(body["error"]["code"], "NOT_FOUND");

    let (status, _) = fixture
        .post_json(sailor, &format!("/api/users/{}/unblock", blocked))
        .await;
    assert_eq!(status, 200);
    let (status, _) = fixture.post_json(blocked, &fez_path(&fez, "join")).await;
    assert_eq!(status, 200);
}

#[tokio::test]
async fn test_blocked_join_looks_like_missing_fez() {
    let fixture = TestFixture::new().await;
    let owner = fixture.register("owner").await;
    let outcast = fixture.register("outcast").await;
    let fez = fixture.create_fez(owner, activity(0)).await;
    fixture
        .post_json(outcast, &format!("/api/users/{}/block", owner))
        .await;

    let (blocked_status, blocked) = fixture.post_json(outcast, &fez_path(&fez, "join")).await;
    let (missing_status, missing) = fixture
        .post_json(outcast, &format!("/api/fez/{}/join", Uuid::new_v4()))
        .await;

    assert_eq!(blocked_status, missing_status);
    assert_eq!(blocked["error"]["code"], missing["error"]["code"]);

    let resp = fixture
        .get(outcast, &format!("/api/fez/{}", fez["fezId"].as_str().unwrap()))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn test_open() {
    let fixture = TestFixture::new().await;
    let verified = fixture.register("verified").await;
    let sailor = fixture.register("sailor").await;

    let first = fixture.create_fez(verified, activity(2)).await;
    let second = fixture.create_fez(verified, activity(2)).await;

    let open = fixture.get_data(sailor, "/api/fez/open").await;
    assert_eq!(open.as_array().unwrap().len(), 2);

    fixture.post_json(sailor, &fez_path(&first, "join")).await;
    let open = fixture.get_data(sailor, "/api/fez/open").await;
    assert_eq!(open.as_array().unwrap().len(), 1);

    fixture.post_json(sailor, &fez_path(&second, "join")).await;
    let open = fixture.get_data(sailor, "/api/fez/open").await;
    assert!(open.as_array().unwrap().is_empty());

    fixture.post_json(sailor, &fez_path(&first, "unjoin")).await;
    let open = fixture.get_data(sailor, "/api/fez/open").await;
    assert_eq!(open.as_array().unwrap().len(), 1);
    assert_eq!(open[0]["fezId"], first["fezId"]);
}

#[tokio::test]
async fn test_owner_modify() {
    let fixture = TestFixture::new().await;
    let verified = fixture.register("verified").await;
    let sailor = fixture.register("sailor").await;
    let moderator = fixture.register("moderator").await;

    let fez = fixture.create_fez(verified, activity(2)).await;
    assert_eq!(usernames(&fez["seamonkeys"]), vec!["@verified"]);

    let (status, body) = fixture
        .post_json(verified, &member_path(&fez, sailor, "add"))
        .await;
    assert_eq!(status, 200);
    assert_eq!(usernames(&body["data"]["seamonkeys"]), vec!["@verified", "@sailor"]);

    let (status, body) = fixture
        .post_json(verified, &member_path(&fez, sailor, "add"))
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "ALREADY_MEMBER");

    let (status, body) = fixture
        .post_json(verified, &member_path(&fez, moderator, "add"))
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "FEZ_FULL");

    let (status, _) = fixture
        .post_json(sailor, &member_path(&fez, moderator, "add"))
        .await;
    assert_eq!(status, 403);

    let (status, body) = fixture
        .post_json(verified, &member_path(&fez, sailor, "remove"))
        .await;
    assert_eq!(status, 200);
    assert_eq!(
        usernames(&body["data"]["seamonkeys"]),
        vec!["@verified", "AvailableSlot"]
    );

    let (status, body) = fixture
        .post_json(verified, &member_path(&fez, sailor, "remove"))
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "NOT_A_MEMBER");

    let (status, body) = fixture
        .post_json(sailor, &member_path(&fez, verified, "remove"))
        .await;
    assert_eq!(status, 403);
    assert_eq!(body["error"]["code"], "FORBIDDEN");
}

#[tokio::test]
async fn test_private_fez() {
    let fixture = TestFixture::new().await;
    let owner = fixture.register("owner").await;
    let friend = fixture.register("friend").await;
    let stranger = fixture.register("stranger").await;

    let fez = fixture
        .create_fez(
            owner,
            json!({
                "fezType": "private",
                "startTime": "not a time",
                "location": "ignored",
                "maxCapacity": 9,
                "initialUsers": [friend]
            }),
        )
        .await;
    assert_eq!(fez["fezType"], "closed");
    assert_eq!(fez["fezTypeLabel"], "Private");
    assert_eq!(fez["location"], "");
    assert_eq!(usernames(&fez["seamonkeys"]), vec!["@owner", "@friend"]);

    let detail = fixture
        .get_data(friend, &format!("/api/fez/{}", fez["fezId"].as_str().unwrap()))
        .await;
    assert_eq!(detail["fezId"], fez["fezId"]);

    let (status, _) = fixture.post_json(stranger, &fez_path(&fez, "join")).await;
    assert_eq!(status, 404);
    let (status, _) = fixture.post_json(friend, &fez_path(&fez, "unjoin")).await;
    assert_eq!(status, 400);
    let (status, _) = fixture
        .post_json(owner, &member_path(&fez, stranger, "add"))
        .await;
    assert_eq!(status, 400);

    let open = fixture.get_data(stranger, "/api/fez/open").await;
    assert!(open.as_array().unwrap().is_empty());
    let joined = fixture.get_data(friend, "/api/fez/joined").await;
    assert_eq!(joined.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_posts_and_filtering() {
    let fixture = TestFixture::new().await;
    let owner = fixture.register("owner").await;
    let member = fixture.register("member").await;
    let outsider = fixture.register("outsider").await;

    let fez = fixture.create_fez(owner, activity(0)).await;
    fixture.post_json(member, &fez_path(&fez, "join")).await;

    let resp = fixture
        .post(owner, &fez_path(&fez, "post"))
        .json(&json!({ "text": "Meet at the pool bar" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["author"], "@owner");

    let resp = fixture
        .post(member, &fez_path(&fez, "post"))
        .json(&json!({ "text": "Bringing KARAOKE songs" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let body: Value = resp.json().await.unwrap();
    let member_post = body["data"]["postId"].as_str().unwrap().to_string();

    let resp = fixture
        .post(outsider, &fez_path(&fez, "post"))
        .json(&json!({ "text": "let me in" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);

    let resp = fixture
        .post(owner, &fez_path(&fez, "post"))
        .json(&json!({ "text": "   " }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let detail_path = format!("/api/fez/{}", fez["fezId"].as_str().unwrap());
    let detail = fixture.get_data(outsider, &detail_path).await;
    assert_eq!(detail["posts"].as_array().unwrap().len(), 2);

    let resp = fixture
        .client
        .put(fixture.url("/api/users/mutewords"))
        .header("x-user-id", outsider.to_string())
        .json(&json!({ "mutewords": ["karaoke"] }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let detail = fixture.get_data(outsider, &detail_path).await;
    let posts = detail["posts"].as_array().unwrap();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0]["author"], "@owner");

    fixture
        .post_json(owner, &format!("/api/users/{}/block", member))
        .await;
    let detail = fixture.get_data(owner, &detail_path).await;
    let posts = detail["posts"].as_array().unwrap();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0]["author"], "@owner");

    let delete_path = format!("/api/fez/post/{}/delete", member_post);
    let (status, _) = fixture.post_json(owner, &delete_path).await;
    assert_eq!(status, 403);
    let (status, _) = fixture.post_json(member, &delete_path).await;
    assert_eq!(status, 200);
    let (status, _) = fixture.post_json(member, &delete_path).await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn test_search() {
    let fixture = TestFixture::new().await;
    let owner = fixture.register("owner").await;
    let seeker = fixture.register("seeker").await;

    let mut trivia = activity(0);
    trivia["title"] = json!("Pub Trivia");
    let trivia = fixture.create_fez(owner, trivia).await;
    fixture.create_fez(owner, activity(0)).await;
    fixture
        .create_fez(
            owner,
            json!({ "fezType": "closed", "title": "Trivia plotting", "initialUsers": [] }),
        )
        .await;

    let results = fixture.get_data(seeker, "/api/fez/search?q=trivia").await;
    assert_eq!(results["total"], 1);
    assert_eq!(results["limit"], 20);
    assert_eq!(results["results"][0]["fez"]["fezId"], trivia["fezId"]);

    let results = fixture
        .get_data(seeker, "/api/fez/search?q=trivia&limit=500")
        .await;
    assert_eq!(results["limit"], 100);

    fixture
        .post_json(seeker, &format!("/api/users/{}/block", owner))
        .await;
    let results = fixture.get_data(seeker, "/api/fez/search?q=trivia").await;
    assert_eq!(results["total"], 0);
}

#[tokio::test]
async fn test_revision_tracks_membership_changes() {
    let fixture = TestFixture::new().await;
    let owner = fixture.register("owner").await;
    let sailor = fixture.register("sailor").await;
    let fez = fixture.create_fez(owner, activity(0)).await;

    let before = fixture.get_data(owner, "/api/revision").await["revisionId"]
        .as_i64()
        .unwrap();
    let (_, body) = fixture.post_json(sailor, &fez_path(&fez, "join")).await;
    let after = body["revisionId"].as_i64().unwrap();
    assert!(after > before);

    let revision = fixture.get_data(owner, "/api/revision").await;
    assert_eq!(revision["revisionId"].as_i64().unwrap(), after);
}

#[tokio::test]
async fn test_state_reloads_from_store() {
    let temp_dir = TempDir::new().unwrap();
    let fixture = TestFixture::new().await;
    let owner = fixture.register("owner").await;
    let sailor = fixture.register("sailor").await;
    let fez = fixture.create_fez(owner, activity(1)).await;
    fixture.post_json(sailor, &fez_path(&fez, "join")).await;

    let fez_id: Uuid = fez["fezId"].as_str().unwrap().parse().unwrap();
    let live = fixture.state.engine.get(fez_id).await.unwrap();
    assert_eq!(live.waitlist.len(), 1);

    let mut config = test_config(&temp_dir, None);
    config.db_path = fixture._temp_dir.path().join("test.sqlite");
    let reloaded = init_state(config).await.unwrap();
    let stored = reloaded.engine.get(fez_id).await.unwrap();
    assert_eq!(stored.roster, live.roster);
    assert_eq!(stored.waitlist, live.waitlist);
}
