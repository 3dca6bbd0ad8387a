//! The REST surface, driven over a real connection.

mod common;

use reqwest::{Client, Response};
use serde_json::{json, Value};

struct Api {
    client: Client,
    base: String,
}

impl Api {
    async fn start() -> (Self, quickserve_server::ShutdownSignal) {
        let (addr, shutdown) = common::start("api").await;
        let api = Self {
            client: Client::new(),
            base: format!("http://{addr}"),
        };
        (api, shutdown)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    async fn get(&self, path: &str) -> Response {
        self.client.get(self.url(path)).send().await.unwrap()
    }

    async fn post(&self, path: &str, body: Value, token: Option<&str>) -> Response {
        let mut req = self.client.post(self.url(path)).json(&body);
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }
        req.send().await.unwrap()
    }

    async fn login(&self) -> String {
        let response = self
            .post(
                "/system/auth",
                json!({"email": "ada@example.com", "password": "hunter2"}),
                None,
            )
            .await;
        assert_eq!(response.status().as_u16(), 200);
        let body: Value = response.json().await.unwrap();
        body["auth"]["accessToken"].as_str().unwrap().to_string()
    }
}

async fn signup(api: &Api) -> Value {
    let response = api
        .post(
            "/users",
            json!({"email": "ada@example.com", "password": "hunter2"}),
            None,
        )
        .await;
    assert_eq!(response.status().as_u16(), 201);
    response.json().await.unwrap()
}

#[tokio::test]
async fn crud_round_trip_with_permissions() {
    let (api, shutdown) = Api::start().await;

    let user = signup(&api).await;
    assert_eq!(user["email"], "ada@example.com");
    assert!(user.get("password").is_none());
    let user_id = user["id"].as_str().unwrap().to_string();

    let denied = api
        .post("/posts", json!({"title": "Hello world", "author": user_id}), None)
        .await;
    assert_eq!(denied.status().as_u16(), 403);
    let body: Value = denied.json().await.unwrap();
    assert_eq!(body["code"], "FORBIDDEN");

    let token = api.login().await;
    let created = api
        .post(
            "/posts",
            json!({"title": "Hello world", "author": user_id}),
            Some(&token),
        )
        .await;
    assert_eq!(created.status().as_u16(), 201);
    let post: Value = created.json().await.unwrap();
    let post_id = post["id"].as_str().unwrap().to_string();

    let fetched: Value = api.get(&format!("/posts/{post_id}")).await.json().await.unwrap();
    assert_eq!(fetched["title"], "Hello world");
    assert_eq!(fetched["author"]["email"], "ada@example.com");
    assert!(fetched["author"].get("password").is_none());

    let listed: Value = api.get("/posts?title=Hello%20world").await.json().await.unwrap();
    assert_eq!(listed.as_array().unwrap().len(), 1);

    let delete = api
        .client
        .delete(api.url(&format!("/posts/{post_id}")))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(delete.status().as_u16(), 403);

    shutdown.trigger();
}

#[tokio::test]
async fn validation_and_lookup_errors() {
    let (api, shutdown) = Api::start().await;

    let invalid = api.post("/users", json!({"email": 42}), None).await;
    assert_eq!(invalid.status().as_u16(), 400);
    let body: Value = invalid.json().await.unwrap();
    assert_eq!(body["code"], "VALIDATION_FAILED");
    assert!(body["errors"].as_array().unwrap().len() >= 2);

    let missing = api.get("/users/does-not-exist").await;
    assert_eq!(missing.status().as_u16(), 404);

    let unknown = api.get("/nothing/here").await;
    assert_eq!(unknown.status().as_u16(), 404);

    shutdown.trigger();
}

#[tokio::test]
async fn search_and_bad_login() {
    let (api, shutdown) = Api::start().await;
    signup(&api).await;

    let results: Value = api
        .get("/system/search?query=ada")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(results["results"]["users"][0]["email"], "ada@example.com");
    assert!(results["results"].get("auth").is_none());

    let login = api
        .post(
            "/system/auth",
            json!({"email": "ada@example.com", "password": "wrong"}),
            None,
        )
        .await;
    assert_eq!(login.status().as_u16(), 401);

    shutdown.trigger();
}
