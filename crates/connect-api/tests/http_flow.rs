use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use serde_json::{Value, json};
use tower::ServiceExt;

use connect_api::clock::SystemClock;
use connect_api::mailer::{Mailer, OutgoingMail};
use connect_api::{ApiSettings, AppStateInner, router};
use connect_db::Database;
use connect_gateway::Dispatcher;

#[derive(Default)]
struct Outbox {
    mails: Mutex<Vec<OutgoingMail>>,
}

impl Outbox {
    fn code_for(&self, to: &str) -> String {
        let mails = self.mails.lock().unwrap();
        let mail = mails.iter().rev().find(|m| m.to == to).expect("no mail sent");
        mail.text
            .split(|c: char| !c.is_ascii_digit())
            .find(|t| t.len() == 6)
            .expect("no code in mail")
            .to_string()
    }
}

#[async_trait]
impl Mailer for Outbox {
    async fn send(&self, mail: &OutgoingMail) -> anyhow::Result<()> {
        self.mails.lock().unwrap().push(mail.clone());
        Ok(())
    }
}

struct TestApp {
    app: Router,
    outbox: Arc<Outbox>,
}

impl TestApp {
    fn new() -> Self {
        let outbox = Arc::new(Outbox::default());
        let state = Arc::new(AppStateInner::new(
            Arc::new(Database::open_in_memory().unwrap()),
            Dispatcher::new(),
            outbox.clone(),
            Arc::new(SystemClock),
            ApiSettings {
                jwt_secret: "integration-secret".into(),
                otp_ttl: chrono::Duration::seconds(300),
                store_timeout: Duration::from_secs(5),
                mail_timeout: Duration::from_secs(5),
            },
        ));
        Self {
            app: router(state),
            outbox,
        }
    }

    async fn call(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let response = self.app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    /// Registers and activates an account, returning (user id, token).
    async fn signup(&self, first: &str, email: &str, role: &str) -> (String, String) {
        let (status, body) = self
            .call(
                Method::POST,
                "/auth/register",
                None,
                Some(json!({
                    "firstName": first,
                    "lastName": "Tester",
                    "email": email,
                    "password": "long enough password",
                    "role": role,
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        assert!(body.get("otp").is_none());

        let code = self.outbox.code_for(email);
        let (status, session) = self
            .call(
                Method::POST,
                "/auth/activate",
                None,
                Some(json!({ "email": email, "otp": code })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{session}");

        (
            session["userId"].as_str().unwrap().to_string(),
            session["token"].as_str().unwrap().to_string(),
        )
    }
}

#[tokio::test]
async fn protected_routes_need_a_token() {
    let t = TestApp::new();
    let (status, _) = t.call(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = t.call(Method::GET, "/notifications", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "authentication required");

    let (status, _) = t.call(Method::GET, "/chats", Some("garbage"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn login_requires_activation() {
    let t = TestApp::new();
    let (status, _) = t
        .call(
            Method::POST,
            "/auth/register",
            None,
            Some(json!({
                "firstName": "Ada",
                "lastName": "Lovelace",
                "email": "ada@example.com",
                "password": "long enough password",
                "role": "entrepreneur",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let login = json!({ "email": "ada@example.com", "password": "long enough password" });
    let (status, _) = t.call(Method::POST, "/auth/login", None, Some(login.clone())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = t
        .call(
            Method::POST,
            "/auth/activate",
            None,
            Some(json!({ "email": "ada@example.com", "otp": "000000" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "code does not match");

    let code = t.outbox.code_for("ada@example.com");
    let (status, _) = t
        .call(
            Method::POST,
            "/auth/activate",
            None,
            Some(json!({ "email": "ada@example.com", "otp": code })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = t.call(Method::POST, "/auth/login", None, Some(login)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["role"], "entrepreneur");
}

#[tokio::test]
async fn investment_request_lifecycle_over_http() {
    let t = TestApp::new();
    let (owner_id, owner) = t.signup("Ada", "ada@example.com", "entrepreneur").await;
    let (investor_id, investor) = t.signup("Grace", "grace@example.com", "investor").await;

    let (status, startup) = t
        .call(
            Method::POST,
            "/startups",
            Some(&owner),
            Some(json!({ "name": "Engines", "description": "Mechanical computing" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{startup}");
    let startup_id = startup["id"].as_str().unwrap().to_string();

    let body = json!({ "startupId": startup_id, "investorId": investor_id, "ownerId": owner_id });
    let (status, created) = t
        .call(Method::POST, "/investment_requests", Some(&investor), Some(body.clone()))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{created}");
    let request_id = created["requestId"].as_str().unwrap().to_string();

    let (status, _) = t.call(Method::POST, "/investment_requests", Some(&investor), Some(body)).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, listed) = t.call(Method::GET, "/investment_requests", Some(&owner), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed["received"].as_array().unwrap().len(), 1);

    let accept = json!({ "requestId": request_id, "status": "accepted" });
    let (status, _) = t
        .call(Method::PATCH, "/investment_requests", Some(&investor), Some(accept.clone()))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = t.call(Method::PATCH, "/investment_requests", Some(&owner), Some(accept)).await;
    assert_eq!(status, StatusCode::OK);

    let reject = json!({ "requestId": request_id, "status": "rejected" });
    let (status, body) = t.call(Method::PATCH, "/investment_requests", Some(&owner), Some(reject)).await;
    assert_eq!(status, StatusCode::CONFLICT, "{body}");

    let (status, inbox) = t.call(Method::GET, "/notifications?unread=true", Some(&investor), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(inbox[0]["type"], "investment_request_accepted");
    assert_eq!(inbox[0]["senderName"], "Ada Tester");

    let (status, marked) = t.call(Method::POST, "/notifications/read", Some(&investor), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(marked["updated"], 1);
}

#[tokio::test]
async fn connection_requests_validate_input() {
    let t = TestApp::new();
    let (ada_id, ada) = t.signup("Ada", "ada@example.com", "entrepreneur").await;
    let (grace_id, _grace) = t.signup("Grace", "grace@example.com", "investor").await;

    let (status, body) = t
        .call(Method::POST, "/requests", Some(&ada), Some(json!({ "senderId": ada_id })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("receiverId"));

    let (status, _) = t
        .call(
            Method::POST,
            "/requests",
            Some(&ada),
            Some(json!({ "senderId": grace_id, "receiverId": ada_id })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = t
        .call(
            Method::POST,
            "/requests",
            Some(&ada),
            Some(json!({ "senderId": ada_id, "receiverId": grace_id })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, listed) = t.call(Method::GET, "/requests", Some(&ada), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed["sent"].as_array().unwrap().len(), 1);

    let (status, _) = t
        .call(Method::GET, &format!("/requests?userId={grace_id}"), Some(&ada), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = t
        .call(
            Method::PATCH,
            "/requests",
            Some(&ada),
            Some(json!({ "requestId": ada_id, "status": "maybe" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn chat_over_http() {
    let t = TestApp::new();
    let (ada_id, ada) = t.signup("Ada", "ada@example.com", "entrepreneur").await;
    let (_grace_id, grace) = t.signup("Grace", "grace@example.com", "investor").await;

    let open = json!({ "participantId": ada_id, "message": "hello there" });
    let (status, opened) = t.call(Method::POST, "/chats", Some(&grace), Some(open.clone())).await;
    assert_eq!(status, StatusCode::CREATED, "{opened}");
    let chat_id = opened["chatId"].as_str().unwrap().to_string();

    let (status, again) = t
        .call(Method::POST, "/chats", Some(&grace), Some(json!({ "participantId": ada_id })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(again["chatId"], chat_id.as_str());

    let uri = format!("/chats/{chat_id}/messages");
    let (status, _) = t.call(Method::POST, &uri, Some(&ada), Some(json!({ "text": "  " }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = t.call(Method::POST, &uri, Some(&ada), Some(json!({ "text": " hi " }))).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, messages) = t.call(Method::GET, &uri, Some(&grace), None).await;
    assert_eq!(status, StatusCode::OK);
    let texts: Vec<&str> = messages
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["text"].as_str().unwrap())
        .collect();
    assert_eq!(texts, ["hello there", "hi"]);

    let (status, chats) = t.call(Method::GET, "/chats", Some(&ada), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(chats[0]["lastMessage"], "hi");
    assert_eq!(chats[0]["otherParticipantName"], "Grace Tester");

    let (status, _) = t.call(Method::GET, "/chats/not-a-uuid/messages", Some(&ada), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn favorites_over_http() {
    let t = TestApp::new();
    let (_owner_id, owner) = t.signup("Ada", "ada@example.com", "entrepreneur").await;
    let (_fan_id, fan) = t.signup("Grace", "grace@example.com", "investor").await;

    let (_, startup) = t
        .call(
            Method::POST,
            "/startups",
            Some(&owner),
            Some(json!({ "name": "Engines", "description": "Mechanical computing" })),
        )
        .await;
    let startup_id = startup["id"].as_str().unwrap().to_string();

    let (status, created) = t
        .call(Method::POST, "/favorites", Some(&fan), Some(json!({ "startupId": startup_id })))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let favorite_id = created["favoriteId"].as_str().unwrap().to_string();

    let (status, _) = t
        .call(Method::POST, "/favorites", Some(&fan), Some(json!({ "startupId": startup_id })))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, listed) = t.call(Method::GET, "/favorites", Some(&fan), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().unwrap().len(), 1);

    let (status, _) = t
        .call(Method::DELETE, "/favorites", Some(&owner), Some(json!({ "favoriteId": favorite_id })))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = t
        .call(Method::DELETE, "/favorites", Some(&fan), Some(json!({ "favoriteId": favorite_id })))
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn newsfeed_over_http() {
    let t = TestApp::new();
    let (ada_id, ada) = t.signup("Ada", "ada@example.com", "entrepreneur").await;
    let (grace_id, grace) = t.signup("Grace", "grace@example.com", "investor").await;

    let (status, startup) = t
        .call(
            Method::POST,
            "/startups",
            Some(&ada),
            Some(json!({ "name": "Engines", "description": "Mechanical computing" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{startup}");

    let offer = json!({ "title": "Climate fund", "description": "Seed tickets" });
    let (status, _) = t.call(Method::POST, "/posts", Some(&ada), Some(offer.clone())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, post) = t.call(Method::POST, "/posts", Some(&grace), Some(offer)).await;
    assert_eq!(status, StatusCode::CREATED, "{post}");
    assert_eq!(post["type"], "investment");

    let (status, feed) = t.call(Method::GET, "/posts", Some(&ada), None).await;
    assert_eq!(status, StatusCode::OK);
    let feed = feed.as_array().unwrap();
    assert_eq!(feed.len(), 2);
    let startup_post = feed.iter().find(|p| p["type"] == "startup").unwrap();
    assert_eq!(startup_post["title"], "Engines");
    assert_eq!(startup_post["startupId"], startup["id"]);
    assert_eq!(startup_post["userName"], "Ada Tester");

    let (status, limited) = t.call(Method::GET, "/posts?limit=1", Some(&ada), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(limited.as_array().unwrap().len(), 1);

    let (status, mine) = t
        .call(Method::GET, &format!("/startups?ownerId={ada_id}"), Some(&ada), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(mine.as_array().unwrap().len(), 1);
    let (_, theirs) = t
        .call(Method::GET, &format!("/startups?ownerId={grace_id}"), Some(&ada), None)
        .await;
    assert!(theirs.as_array().unwrap().is_empty());

    // Chats opened from the feed are anchored on a real post.
    let open = json!({
        "participantId": ada_id,
        "itemId": startup_post["id"],
        "itemType": "startup",
        "message": "Tell me more",
    });
    let (status, opened) = t.call(Method::POST, "/chats", Some(&grace), Some(open)).await;
    assert_eq!(status, StatusCode::CREATED, "{opened}");

    let bogus = json!({ "participantId": ada_id, "itemId": "deck-42", "itemType": "startup" });
    let (status, _) = t.call(Method::POST, "/chats", Some(&grace), Some(bogus)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, chats) = t.call(Method::GET, "/chats", Some(&ada), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(chats[0]["itemId"], startup_post["id"]);
    assert_eq!(chats[0]["itemType"], "startup");
}
