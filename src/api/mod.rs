pub mod auth;
mod conversations;
pub mod error;
pub mod session;
pub mod validation;

use axum::{
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Account routes. /user and /user/password resolve the session themselves.
    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
        .route("/user", get(auth::current_user))
        .route("/user/password", put(auth::change_password));

    // Every conversation handler takes a `CurrentUser`
    let conversation_routes = Router::new()
        .route(
            "/conversations",
            get(conversations::list_conversations).post(conversations::create_conversation),
        )
        .route(
            "/conversations/:id/messages",
            get(conversations::get_messages).post(conversations::send_message),
        );

    Router::new()
        .route("/", get(welcome))
        .route("/health", get(health_check))
        .merge(auth_routes)
        .merge(conversation_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn welcome() -> &'static str {
    "Welcome to LLM Connect!"
}

async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistant::{AssistantBridge, AssistantError, ThreadMessage};
    use crate::config::Config;
    use crate::db::test_pool;
    use async_trait::async_trait;
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
    };
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tower::ServiceExt;

    /// In-process assistant that echoes messages back
    #[derive(Default)]
    struct FakeAssistant {
        threads: AtomicUsize,
        sent: Mutex<Vec<(String, String)>>,
        fail: bool,
    }

    #[async_trait]
    impl AssistantBridge for FakeAssistant {
        fn assistant_id(&self) -> &str {
            "asst_fake"
        }

        async fn create_thread(&self) -> Result<String, AssistantError> {
            if self.fail {
                return Err(AssistantError::Api {
                    status: 503,
                    body: "unavailable".to_string(),
                });
            }
            let n = self.threads.fetch_add(1, Ordering::SeqCst);
            Ok(format!("thread_{}", n))
        }

        async fn send_message(
            &self,
            thread_id: &str,
            _assistant_id: &str,
            text: &str,
        ) -> Result<String, AssistantError> {
            if self.fail {
                return Err(AssistantError::RunFailed("failed".to_string()));
            }
            self.sent
                .lock()
                .unwrap()
                .push((thread_id.to_string(), text.to_string()));
            Ok(format!("echo: {}", text))
        }

        async fn list_messages(
            &self,
            thread_id: &str,
        ) -> Result<Vec<ThreadMessage>, AssistantError> {
            let sent = self.sent.lock().unwrap();
            Ok(sent
                .iter()
                .filter(|(thread, _)| thread == thread_id)
                .enumerate()
                .map(|(i, (_, text))| ThreadMessage {
                    id: format!("msg_{}", i),
                    role: "user".to_string(),
                    created_at: i as i64,
                    content: vec![text.clone()],
                })
                .collect())
        }
    }

    async fn test_app_with(assistant: FakeAssistant) -> (Router, Arc<AppState>) {
        let mut config = Config::default();
        config.auth.secret_key = Some("router-test-secret".to_string());
        let db = test_pool().await;
        let state = Arc::new(AppState::new(config, db, Arc::new(assistant)).unwrap());
        (create_router(state.clone()), state)
    }

    async fn test_app() -> Router {
        test_app_with(FakeAssistant::default()).await.0
    }

    fn json_request(method: &str, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::COOKIE, format!("token={}", token));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn get_request(uri: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method("GET").uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::COOKIE, format!("token={}", token));
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    async fn register_and_login(app: &Router, email: &str) -> String {
        let creds = json!({"email": email, "password": "secret123"});
        let (status, _) = send(app, json_request("POST", "/register", None, creds.clone())).await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = send(app, json_request("POST", "/login", None, creds)).await;
        assert_eq!(status, StatusCode::OK);
        body["token"].as_str().unwrap().to_string()
    }

    async fn create_conversation(app: &Router, token: &str) -> i64 {
        let (status, body) = send(
            app,
            json_request("POST", "/conversations", Some(token), json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        body["conversation_id"].as_i64().unwrap()
    }

    #[tokio::test]
    async fn test_welcome_and_health() {
        let app = test_app().await;
        let response = app.clone().oneshot(get_request("/", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"Welcome to LLM Connect!");

        let response = app.oneshot(get_request("/health", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_register_then_duplicate() {
        let app = test_app().await;
        let creds = json!({"email": "a@example.com", "password": "secret123"});

        let (status, body) =
            send(&app, json_request("POST", "/register", None, creds.clone())).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["message"], "User registered successfully.");

        let (status, body) = send(&app, json_request("POST", "/register", None, creds)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "duplicate_email");

        let upper = json!({"email": "A@Example.com", "password": "secret123"});
        let (status, _) = send(&app, json_request("POST", "/register", None, upper)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_register_validation() {
        let app = test_app().await;

        let (status, body) = send(
            &app,
            json_request("POST", "/register", None, json!({"email": "a@example.com"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"]["details"]["password"].is_array());

        let (status, body) = send(
            &app,
            json_request(
                "POST",
                "/register",
                None,
                json!({"email": "not-an-email", "password": "short"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"]["details"]["email"].is_array());
        assert!(body["error"]["details"]["password"].is_array());
    }

    #[tokio::test]
    async fn test_malformed_json_is_bad_request() {
        let app = test_app().await;
        let request = Request::builder()
            .method("POST")
            .uri("/register")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();

        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "bad_request");
    }

    #[tokio::test]
    async fn test_login_sets_cookie_and_returns_token() {
        let app = test_app().await;
        let creds = json!({"email": "a@example.com", "password": "secret123"});
        send(&app, json_request("POST", "/register", None, creds.clone())).await;

        let response = app
            .clone()
            .oneshot(json_request("POST", "/login", None, creds))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert!(cookie.starts_with("token="));
        assert!(cookie.contains("HttpOnly"));

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert!(!body["token"].as_str().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_login_wrong_password_and_unknown_email() {
        let app = test_app().await;
        register_and_login(&app, "a@example.com").await;

        let (status, body) = send(
            &app,
            json_request(
                "POST",
                "/login",
                None,
                json!({"email": "a@example.com", "password": "wrong-password"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["message"], "Invalid credentials");

        let (status, _) = send(
            &app,
            json_request(
                "POST",
                "/login",
                None,
                json!({"email": "ghost@example.com", "password": "secret123"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = send(
            &app,
            json_request("POST", "/login", None, json!({"email": "a@example.com"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_current_user() {
        let app = test_app().await;
        let token = register_and_login(&app, "a@example.com").await;

        let (status, body) = send(&app, get_request("/user", Some(&token))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["email"], "a@example.com");
        assert!(body.get("password_hash").is_none());

        let request = Request::builder()
            .uri("/user")
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_missing_expired_and_tampered_tokens() {
        let (app, state) = test_app_with(FakeAssistant::default()).await;
        let token = register_and_login(&app, "a@example.com").await;

        let (status, body) = send(&app, get_request("/conversations", None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["message"], "Token is missing");

        let issued = chrono::Utc::now() - chrono::Duration::hours(2);
        let expired = state.tokens.issue_at(1, issued).unwrap();
        let (status, body) = send(&app, get_request("/conversations", Some(&expired))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["message"], "Token has expired");

        let mut chars: Vec<char> = token.chars().collect();
        let pos = chars.len() - 10;
        chars[pos] = if chars[pos] == 'A' { 'B' } else { 'A' };
        let tampered: String = chars.into_iter().collect();
        let (status, _) = send(&app, get_request("/conversations", Some(&tampered))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = send(&app, get_request("/conversations", Some(&token))).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_token_for_deleted_user_is_not_found() {
        let (app, state) = test_app_with(FakeAssistant::default()).await;
        let orphan = state.tokens.issue(4242).unwrap();

        let (status, body) = send(&app, get_request("/user", Some(&orphan))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["message"], "User not found");
    }

    #[tokio::test]
    async fn test_create_and_list_conversations() {
        let app = test_app().await;
        let token = register_and_login(&app, "a@example.com").await;

        let (_, body) = send(&app, get_request("/conversations", Some(&token))).await;
        assert_eq!(body, json!([]));

        let id = create_conversation(&app, &token).await;

        let (status, body) = send(&app, get_request("/conversations", Some(&token))).await;
        assert_eq!(status, StatusCode::OK);
        let list = body.as_array().unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0]["id"], id);
        assert_eq!(list[0]["thread_id"], "thread_0");
        assert_eq!(list[0]["assistant_id"], "asst_fake");
        assert_eq!(list[0]["status"], "active");
        assert!(list[0].get("user_id").is_none());
    }

    #[tokio::test]
    async fn test_send_message_and_history() {
        let app = test_app().await;
        let token = register_and_login(&app, "a@example.com").await;
        let id = create_conversation(&app, &token).await;
        let uri = format!("/conversations/{}/messages", id);

        let (status, body) = send(
            &app,
            json_request("POST", &uri, Some(&token), json!({"message": "Hello"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["conversation_id"], id);
        assert_eq!(body["response"], "echo: Hello");

        let (status, body) = send(&app, get_request(&uri, Some(&token))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["conversation_id"], id);
        assert_eq!(body["messages"][0]["content"][0], "Hello");
    }

    #[tokio::test]
    async fn test_send_message_requires_text() {
        let app = test_app().await;
        let token = register_and_login(&app, "a@example.com").await;
        let id = create_conversation(&app, &token).await;
        let uri = format!("/conversations/{}/messages", id);

        let (status, body) = send(&app, json_request("POST", &uri, Some(&token), json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"]["details"]["message"].is_array());

        let (status, _) = send(
            &app,
            json_request("POST", &uri, Some(&token), json!({"message": "   "})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_and_foreign_conversations_are_not_found() {
        let app = test_app().await;
        let alice = register_and_login(&app, "alice@example.com").await;
        let bob = register_and_login(&app, "bob@example.com").await;
        let id = create_conversation(&app, &alice).await;

        let (status, _) = send(&app, get_request("/conversations/999/messages", Some(&alice))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(&app, get_request("/conversations/abc/messages", Some(&alice))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let uri = format!("/conversations/{}/messages", id);
        let (status, body) = send(&app, get_request(&uri, Some(&bob))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["message"], "Conversation not found");

        let (status, _) = send(
            &app,
            json_request("POST", &uri, Some(&bob), json!({"message": "hi"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, body) = send(&app, get_request("/conversations", Some(&bob))).await;
        assert_eq!(body, json!([]));
    }

    #[tokio::test]
    async fn test_upstream_failure_is_reported() {
        let app = test_app_with(FakeAssistant {
            fail: true,
            ..Default::default()
        })
        .await
        .0;
        let token = register_and_login(&app, "a@example.com").await;

        let (status, body) = send(
            &app,
            json_request("POST", "/conversations", Some(&token), json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"]["code"], "upstream_unavailable");

        let (_, body) = send(&app, get_request("/conversations", Some(&token))).await;
        assert_eq!(body, json!([]));
    }

    #[tokio::test]
    async fn test_conversation_store_failure_after_thread_creation() {
        let (app, state) = test_app_with(FakeAssistant::default()).await;
        let token = register_and_login(&app, "a@example.com").await;

        sqlx::query("DROP TABLE conversation_threads")
            .execute(&state.db)
            .await
            .unwrap();

        let (status, body) = send(
            &app,
            json_request("POST", "/conversations", Some(&token), json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"]["code"], "database_error");
    }

    #[tokio::test]
    async fn test_change_password() {
        let app = test_app().await;
        let token = register_and_login(&app, "a@example.com").await;

        let (status, _) = send(
            &app,
            json_request(
                "PUT",
                "/user/password",
                Some(&token),
                json!({"current_password": "wrong-password", "new_password": "newsecret123"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = send(
            &app,
            json_request(
                "PUT",
                "/user/password",
                Some(&token),
                json!({"current_password": "secret123", "new_password": "newsecret123"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send(
            &app,
            json_request(
                "POST",
                "/login",
                None,
                json!({"email": "a@example.com", "password": "newsecret123"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_logout_clears_cookie() {
        let app = test_app().await;
        let response = app
            .oneshot(json_request("POST", "/logout", None, json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap();
        assert!(cookie.starts_with("token="));
    }
}
