use axum::{
    Router,
    body::Body,
    http::{HeaderMap, Request, StatusCode},
};
use chrono::Utc;
use http_body_util::BodyExt;
use rp_api::{
    ApiConfig,
    config::Environment,
    flow::{CALLBACK_PATH, jwt},
    state::ApiState,
};
use serde_json::{Value, json};
use tower::ServiceExt;
use url::Url;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{header, method, path},
};

pub const EXT_HOST: &str = "rp.example.com";
pub const DEFAULT_CLIENT_ID: &str = "default-client";
pub const DEFAULT_SECRET: &str = "default_client_secret_for_tests";
pub const AUTHORIZE_PATH: &str = "/openId/authenticate";
pub const TOKEN_PATH: &str = "/openId/token";
pub const USERINFO_PATH: &str = "/openId/userinfo";
pub const ACCESS_TOKEN: &str = "access-token-123";

/// Config pointing every OP endpoint at a stub server
pub fn test_config(op_base_url: &str) -> ApiConfig {
    ApiConfig {
        ext_host: EXT_HOST.to_string(),
        op_host: None,
        op_authorize_url: Some(format!("{op_base_url}{AUTHORIZE_PATH}")),
        op_token_url: Some(format!("{op_base_url}{TOKEN_PATH}")),
        op_userinfo_url: Some(format!("{op_base_url}{USERINFO_PATH}")),
        op_issuer: None,
        client_id: DEFAULT_CLIENT_ID.to_string(),
        client_secret: DEFAULT_SECRET.to_string(),
        scope: "profile email".to_string(),
        env: Environment::Production,
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        flow_cookie_max_age_secs: 300,
        http_timeout_secs: 30,
        envelope_key: None,
    }
}

/// A relying party wired to a fresh stub OP
pub struct TestContext {
    pub op: MockServer,
    pub state: ApiState,
    pub client: TestClient,
}

impl TestContext {
    pub async fn new() -> Self {
        let op = MockServer::start().await;
        let state = ApiState::new(&test_config(&op.uri())).expect("Failed to create test state");
        let client = TestClient::new(rp_api::router::router().with_state(state.clone()));

        Self { op, state, client }
    }

    pub fn token_url(&self) -> String {
        format!("{}{TOKEN_PATH}", self.op.uri())
    }

    /// Run `/login` and return what the browser would carry to the callback
    pub async fn login(&self, query: &str) -> LoginOutcome {
        let uri = if query.is_empty() {
            "/login".to_string()
        } else {
            format!("/login?{query}")
        };
        let response = self.client.get(&uri).await;
        response.assert_status(StatusCode::SEE_OTHER);

        let location = Url::parse(response.header("location").expect("Missing Location"))
            .expect("Location should be a URL");
        let cookie = cookie_pair(response.header("set-cookie").expect("Missing Set-Cookie"));

        LoginOutcome {
            state: query_value(&location, "state").expect("Missing state"),
            nonce: query_value(&location, "nonce").expect("Missing nonce"),
            location,
            cookie,
        }
    }

    /// Call the callback with the flow cookie from `login`
    pub async fn callback(&self, login: &LoginOutcome, query: &str) -> TestResponse {
        self.client
            .get_with_cookie(&format!("{CALLBACK_PATH}?{query}"), &login.cookie)
            .await
    }
}

pub struct LoginOutcome {
    pub location: Url,
    pub cookie: String,
    pub state: String,
    pub nonce: String,
}

/// Helper to make requests to the test app
pub struct TestClient {
    router: Router,
}

impl TestClient {
    pub fn new(router: Router) -> Self {
        Self { router }
    }

    pub async fn request(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to execute request");

        let status = response.status();
        let headers = response.headers().clone();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to read response body")
            .to_bytes();

        TestResponse {
            status,
            body: body_bytes.to_vec(),
            headers,
        }
    }

    pub async fn get(&self, uri: &str) -> TestResponse {
        self.send("GET", uri, None).await
    }

    pub async fn post(&self, uri: &str) -> TestResponse {
        self.send("POST", uri, None).await
    }

    pub async fn head(&self, uri: &str) -> TestResponse {
        self.send("HEAD", uri, None).await
    }

    pub async fn head_with_cookie(&self, uri: &str, cookie: &str) -> TestResponse {
        self.send("HEAD", uri, Some(cookie)).await
    }

    pub async fn get_with_cookie(&self, uri: &str, cookie: &str) -> TestResponse {
        self.send("GET", uri, Some(cookie)).await
    }

    async fn send(&self, method: &str, uri: &str, cookie: Option<&str>) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header("cookie", cookie);
        }
        let request = builder.body(Body::empty()).expect("Failed to build request");

        self.request(request).await
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub body: Vec<u8>,
    pub headers: HeaderMap,
}

impl TestResponse {
    pub fn assert_status(&self, expected: StatusCode) {
        assert_eq!(
            self.status,
            expected,
            "Unexpected status, body: {}",
            self.text()
        );
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).to_string()
    }

    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).expect("Response body should be JSON")
    }
}

/// `name=value` part of a Set-Cookie header, as a browser would send it back
pub fn cookie_pair(set_cookie: &str) -> String {
    set_cookie
        .split(';')
        .next()
        .expect("Set-Cookie should have a name=value pair")
        .trim()
        .to_string()
}

pub fn query_value(url: &Url, name: &str) -> Option<String> {
    url.query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

/// ID token claims an honest OP would issue for this flow
pub fn id_token_claims(client_id: &str, nonce: &str) -> Value {
    let now = Utc::now().timestamp();
    json!({
        "iss": "https://op.example.com",
        "sub": "subscriber-42",
        "aud": client_id,
        "jti": "id-token-jti",
        "iat": now,
        "exp": now + 600,
        "nonce": nonce,
        "email": "subscriber@example.com",
    })
}

pub fn sign_id_token(claims: &Value, secret: &str) -> String {
    jwt::sign(claims, secret.as_bytes()).expect("Failed to sign ID token")
}

pub fn userinfo_body() -> Value {
    json!({
        "sub": "subscriber-42",
        "email": "subscriber@example.com",
        "phone_number": "+1 555 0100",
    })
}

pub async fn mount_token_success(op: &MockServer, id_token: &str) {
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": ACCESS_TOKEN,
            "token_type": "Bearer",
            "refresh_token": "refresh-token-456",
            "expires_in": 3600,
            "id_token": id_token,
        })))
        .expect(1)
        .mount(op)
        .await;
}

pub async fn mount_userinfo_success(op: &MockServer) {
    Mock::given(method("GET"))
        .and(path(USERINFO_PATH))
        .and(header("authorization", format!("Bearer {ACCESS_TOKEN}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(userinfo_body()))
        .expect(1)
        .mount(op)
        .await;
}

/// Token and userinfo endpoints that must never be called
pub async fn mount_no_op_calls(op: &MockServer) {
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(op)
        .await;
    Mock::given(method("GET"))
        .and(path(USERINFO_PATH))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(op)
        .await;
}

pub async fn mount_userinfo_never_called(op: &MockServer) {
    Mock::given(method("GET"))
        .and(path(USERINFO_PATH))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(op)
        .await;
}

/// Form fields of the token request the RP sent to the stub OP
pub async fn token_request_form(op: &MockServer) -> Vec<(String, String)> {
    let requests = op
        .received_requests()
        .await
        .expect("Request recording should be enabled");
    let token_request = requests
        .iter()
        .find(|r| r.url.path() == TOKEN_PATH)
        .expect("Token endpoint should have been called");

    url::form_urlencoded::parse(&token_request.body)
        .into_owned()
        .collect()
}

pub fn form_value<'a>(form: &'a [(String, String)], name: &str) -> &'a str {
    form.iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.as_str())
        .unwrap_or_else(|| panic!("Token request is missing {name}"))
}
