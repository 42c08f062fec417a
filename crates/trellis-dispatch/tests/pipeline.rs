//! End-to-end dispatch through the ghost driver.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use http::{HeaderValue, StatusCode};
use serde_json::{json, Value};
use trellis_core::{
    middleware, Action, ActionError, ActionMetadata, ActionRegistry, Container, HttpError, Json, ParamMetadata,
    ParamType, Reply, TransformOptions,
};
use trellis_dispatch::{
    DispatchError, DriverOptions, DriverOptionsBuilder, GhostBody, GhostDriver, GhostRequest, ResultDefaults,
};

#[derive(Default)]
struct Users {
    calls: AtomicUsize,
}

impl Users {
    async fn list(self: Arc<Self>, limit: Option<u32>) -> Result<Json<Value>, ActionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Json(json!({ "limit": limit, "users": ["ada", "grace"] })))
    }

    async fn show(self: Arc<Self>, id: u32) -> Result<Json<Value>, ActionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if id == 404 {
            return Err(HttpError::not_found("User doesn't exist").into());
        }
        Ok(Json(json!({ "id": id, "password": "hunter2", "_rev": 3 })))
    }

    async fn create(self: Arc<Self>, body: Value) -> Result<Json<Value>, ActionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Json(body))
    }

    async fn remove(self: Arc<Self>, _id: u32) -> Result<(), ActionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn find(self: Arc<Self>) -> Result<Option<Json<Value>>, ActionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(None)
    }

    async fn admin(self: Arc<Self>) -> Result<&'static str, ActionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok("secret")
    }

    async fn open(self: Arc<Self>) -> Result<&'static str, ActionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok("open")
    }

    async fn active(self: Arc<Self>, active: Option<bool>) -> Result<Json<Value>, ActionError> {
        Ok(Json(json!({ "active": active })))
    }

    async fn search(self: Arc<Self>, filters: Value) -> Result<Json<Value>, ActionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Json(filters))
    }

    async fn me(self: Arc<Self>, user: Value) -> Result<Json<Value>, ActionError> {
        Ok(Json(user))
    }

    async fn raw(self: Arc<Self>) -> Result<Reply, ActionError> {
        Err(ActionError::thrown("plain failure"))
    }

    async fn page(self: Arc<Self>) -> Result<String, ActionError> {
        Ok("<h1>users</h1>".to_string())
    }
}

fn registry() -> ActionRegistry {
    ActionRegistry::builder()
        .controller::<Users>("/users", |c| {
            c.get("/", Users::list)
                .arg(ParamMetadata::query("limit").typed(ParamType::Integer));
            c.get("/admin", Users::admin).authorized_roles(["ADMIN"]);
            c.get("/open", Users::open).authorized();
            c.get("/active", Users::active)
                .arg(ParamMetadata::query("active").typed(ParamType::Boolean));
            c.get("/search", Users::search)
                .arg(ParamMetadata::queries().required(true));
            c.get("/me", Users::me)
                .arg(ParamMetadata::current_user().required(true));
            c.get("/raw", Users::raw);
            c.get("/page", Users::page).text();
            c.get("/find", Users::find);
            c.get("/:id", Users::show)
                .arg(ParamMetadata::param("id").typed(ParamType::Integer))
                .header("x-resource", "user");
            c.post("/", Users::create)
                .arg(ParamMetadata::body().required(true))
                .success_code(StatusCode::CREATED);
            c.delete("/:id", Users::remove)
                .arg(ParamMetadata::param("id"))
                .on_undefined(StatusCode::ACCEPTED);
        })
        .build()
        .unwrap()
}

fn setup(configure: impl FnOnce(DriverOptionsBuilder) -> DriverOptionsBuilder) -> (GhostDriver, Arc<Users>) {
    let users = Arc::new(Users::default());
    let mut container = Container::new();
    container.register(Arc::clone(&users));
    let options = configure(DriverOptions::builder(container.freeze())).build();
    (GhostDriver::ready(options, registry()).unwrap(), users)
}

fn role_checker(action: &Action, roles: &[String]) -> impl std::future::Future<Output = bool> + Send + 'static {
    let role = action.request.header("x-role").map(str::to_owned);
    let allowed = role.is_some_and(|role| roles.is_empty() || roles.contains(&role));
    async move { allowed }
}

#[tokio::test]
async fn test_missing_authorization_checker_fails_before_handler() {
    let (driver, users) = setup(|o| o);

    let response = driver.dispatch(GhostRequest::get("/users/admin")).await.unwrap();

    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.json().unwrap()["name"], "AuthorizationCheckerNotDefinedError");
    assert_eq!(users.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_access_denied_for_missing_role() {
    let (driver, users) = setup(|o| o.authorization_checker(role_checker));

    let response = driver
        .dispatch(GhostRequest::get("/users/admin").header("x-role", "USER"))
        .await
        .unwrap();

    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert_eq!(
        response.json().unwrap()["message"],
        "Access is denied for request on GET /users/admin"
    );
    assert_eq!(users.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_authorization_required_without_roles() {
    let (driver, users) = setup(|o| o.authorization_checker(role_checker));

    let response = driver.dispatch(GhostRequest::get("/users/open")).await.unwrap();

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    let body = response.json().unwrap();
    assert_eq!(body["name"], "AuthorizationRequiredError");
    assert_eq!(body["message"], "Authorization is required for request on GET /users/open");
    assert_eq!(users.calls.load(Ordering::SeqCst), 0);

    let allowed = driver
        .dispatch(GhostRequest::get("/users/open").header("x-role", "USER"))
        .await
        .unwrap();
    assert_eq!(allowed.status, StatusCode::OK);
    assert_eq!(users.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_access_granted_with_role() {
    let (driver, _) = setup(|o| o.authorization_checker(role_checker));

    let response = driver
        .dispatch(GhostRequest::get("/users/admin").header("x-role", "ADMIN"))
        .await
        .unwrap();

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json(), Some(&json!("secret")));
}

#[tokio::test]
async fn test_structured_error_without_stack() {
    let (driver, _) = setup(|o| o);

    let response = driver.dispatch(GhostRequest::get("/users/404")).await.unwrap();

    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(
        response.json(),
        Some(&json!({ "name": "NotFoundError", "message": "User doesn't exist" }))
    );
    assert_eq!(response.header("x-resource"), Some("user"));
}

#[tokio::test]
async fn test_development_mode_adds_stack() {
    let (driver, _) = setup(|o| o.development(true));

    let response = driver.dispatch(GhostRequest::get("/users/404")).await.unwrap();

    assert!(response.json().unwrap()["stack"]
        .as_str()
        .unwrap()
        .contains("User doesn't exist"));
}

#[tokio::test]
async fn test_required_body_missing() {
    let (driver, users) = setup(|o| o);

    let response = driver.dispatch(GhostRequest::post("/users")).await.unwrap();

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    let message = response.json().unwrap()["message"].as_str().unwrap().to_string();
    assert!(message.contains("Request body is required"), "{message}");
    assert_eq!(users.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_post_uses_success_code() {
    let (driver, _) = setup(|o| o);

    let response = driver
        .dispatch(GhostRequest::post("/users").json(json!({ "name": "Ada" })))
        .await
        .unwrap();

    assert_eq!(response.status, StatusCode::CREATED);
    assert_eq!(response.json(), Some(&json!({ "name": "Ada" })));
}

#[tokio::test]
async fn test_null_result_is_204() {
    let (driver, _) = setup(|o| o);

    let response = driver.dispatch(GhostRequest::get("/users/find")).await.unwrap();

    assert_eq!(response.status, StatusCode::NO_CONTENT);
    assert_eq!(response.body, GhostBody::Null);
}

#[tokio::test]
async fn test_global_null_result_code() {
    let (driver, _) = setup(|o| {
        o.defaults(ResultDefaults {
            null_result_code: Some(StatusCode::NOT_FOUND),
            ..ResultDefaults::default()
        })
    });

    let response = driver.dispatch(GhostRequest::get("/users/find")).await.unwrap();
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.body, GhostBody::Json(Value::Null));
}

#[tokio::test]
async fn test_undefined_result_with_code() {
    let (driver, users) = setup(|o| o);

    let response = driver.dispatch(GhostRequest::delete("/users/7")).await.unwrap();

    assert_eq!(response.status, StatusCode::ACCEPTED);
    assert_eq!(response.json(), Some(&json!({})));
    assert_eq!(users.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_query_normalization() {
    let (driver, _) = setup(|o| o);

    let ok = driver.dispatch(GhostRequest::get("/users?limit=5")).await.unwrap();
    assert_eq!(ok.json().unwrap()["limit"], json!(5));

    let bad = driver.dispatch(GhostRequest::get("/users?limit=five")).await.unwrap();
    assert_eq!(bad.status, StatusCode::BAD_REQUEST);
    assert_eq!(bad.json().unwrap()["name"], "InvalidParamError");

    let empty = driver.dispatch(GhostRequest::get("/users?limit=")).await.unwrap();
    assert_eq!(empty.status, StatusCode::OK);
    assert_eq!(empty.json().unwrap()["limit"], Value::Null);
}

#[tokio::test]
async fn test_bare_boolean_query_is_true() {
    let (driver, _) = setup(|o| o);

    let bare = driver.dispatch(GhostRequest::get("/users/active?active=")).await.unwrap();
    assert_eq!(bare.status, StatusCode::OK);
    assert_eq!(bare.json(), Some(&json!({ "active": true })));

    let off = driver.dispatch(GhostRequest::get("/users/active?active=0")).await.unwrap();
    assert_eq!(off.json(), Some(&json!({ "active": false })));

    let absent = driver.dispatch(GhostRequest::get("/users/active")).await.unwrap();
    assert_eq!(absent.json(), Some(&json!({ "active": null })));
}

#[tokio::test]
async fn test_required_queries_without_query_string() {
    let (driver, users) = setup(|o| o);

    let response = driver.dispatch(GhostRequest::get("/users/search")).await.unwrap();

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json(), Some(&json!({})));
    assert_eq!(users.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_transform_excludes_fields() {
    let (driver, _) = setup(|o| {
        o.transform_options(TransformOptions {
            exclude_prefixes: vec!["_".to_string()],
            exclude_keys: vec!["password".to_string()],
            expose_unset_fields: true,
        })
    });

    let response = driver.dispatch(GhostRequest::get("/users/1")).await.unwrap();
    assert_eq!(response.json(), Some(&json!({ "id": 1 })));
}

#[tokio::test]
async fn test_transform_disabled_globally() {
    let (driver, _) = setup(|o| {
        o.class_transformer(false).transform_options(TransformOptions {
            exclude_keys: vec!["password".to_string()],
            ..TransformOptions::default()
        })
    });

    let response = driver.dispatch(GhostRequest::get("/users/1")).await.unwrap();
    assert_eq!(response.json().unwrap()["password"], "hunter2");
}

#[tokio::test]
async fn test_current_user_required() {
    let (driver, _) = setup(|o| {
        o.current_user_checker(|action: &Action| {
            let user = action.request.header("x-user").map(|name| json!({ "name": name }));
            async move { user }
        })
    });

    let anonymous = driver.dispatch(GhostRequest::get("/users/me")).await.unwrap();
    assert_eq!(anonymous.status, StatusCode::UNAUTHORIZED);

    let known = driver
        .dispatch(GhostRequest::get("/users/me").header("x-user", "ada"))
        .await
        .unwrap();
    assert_eq!(known.json(), Some(&json!({ "name": "ada" })));
}

#[tokio::test]
async fn test_current_user_checker_missing() {
    let (driver, _) = setup(|o| o);

    let response = driver.dispatch(GhostRequest::get("/users/me")).await.unwrap();
    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.json().unwrap()["name"], "CurrentUserCheckerNotDefinedError");
}

#[tokio::test]
async fn test_thrown_value_passes_through() {
    let (driver, _) = setup(|o| o);

    let response = driver.dispatch(GhostRequest::get("/users/raw")).await.unwrap();
    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.json(), Some(&json!("plain failure")));
}

#[tokio::test]
async fn test_text_action_renders_html() {
    let (driver, _) = setup(|o| o);

    let response = driver.dispatch(GhostRequest::get("/users/page")).await.unwrap();
    assert_eq!(response.text(), Some("<h1>users</h1>"));
    assert_eq!(response.header("content-type"), Some("text/html; charset=utf-8"));
}

#[tokio::test]
async fn test_custom_error_handler() {
    let (driver, _) = setup(|o| {
        o.error_handler(|error: &ActionError, _: &Action, metadata: Option<&ActionMetadata>| {
            Some(json!({
                "error": error.name(),
                "action": metadata.map(|m| m.id.clone()),
            }))
        })
    });

    let response = driver.dispatch(GhostRequest::get("/users/404")).await.unwrap();
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(
        response.json(),
        Some(&json!({ "error": "NotFoundError", "action": "Users.show" }))
    );
}

#[tokio::test]
async fn test_error_overrides() {
    let mut fields = serde_json::Map::new();
    fields.insert("docs".to_string(), json!("https://example.test/errors/not-found"));
    let (driver, _) = setup(|o| o.error_override("NotFoundError", fields));

    let response = driver.dispatch(GhostRequest::get("/users/404")).await.unwrap();
    assert_eq!(
        response.json().unwrap()["docs"],
        "https://example.test/errors/not-found"
    );
}

#[tokio::test]
async fn test_interceptor_wraps_result() {
    let (driver, _) = setup(|o| {
        o.interceptor(|_: &Action, reply: Reply| match reply {
            Reply::Json(value) => Reply::Json(json!({ "data": value })),
            other => other,
        })
    });

    let response = driver.dispatch(GhostRequest::get("/users/1")).await.unwrap();
    assert_eq!(response.json().unwrap()["data"]["id"], json!(1));
}

#[tokio::test]
async fn test_global_middleware_runs_for_every_request() {
    let mut driver = {
        let users = Arc::new(Users::default());
        let mut container = Container::new();
        container.register(users);
        let mut driver = GhostDriver::new(DriverOptions::builder(container.freeze()).build());
        trellis_dispatch::Driver::initialize(&mut driver).unwrap();
        driver
    };
    trellis_dispatch::Driver::register_middleware(
        &mut driver,
        Arc::new(middleware::after("stamp", |action: &mut Action| {
            action
                .response
                .headers
                .insert("x-stamp", HeaderValue::from_static("1"));
            Ok(())
        })),
    );
    trellis_dispatch::Driver::register_routes(&mut driver, Arc::new(registry())).unwrap();

    let found = driver.dispatch(GhostRequest::get("/users/1")).await.unwrap();
    assert_eq!(found.header("x-stamp"), Some("1"));

    let missing = driver.dispatch(GhostRequest::get("/nowhere")).await.unwrap();
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_middleware_error_is_shaped() {
    let users = Arc::new(Users::default());
    let mut container = Container::new();
    container.register(Arc::clone(&users));
    let mut driver = GhostDriver::new(DriverOptions::builder(container.freeze()).build());
    trellis_dispatch::Driver::initialize(&mut driver).unwrap();
    trellis_dispatch::Driver::register_middleware(
        &mut driver,
        Arc::new(middleware::before("deny", |_: &mut Action| {
            Err(HttpError::forbidden("blocked").into())
        })),
    );
    trellis_dispatch::Driver::register_routes(&mut driver, Arc::new(registry())).unwrap();

    let response = driver.dispatch(GhostRequest::get("/users")).await.unwrap();
    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert_eq!(users.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_routes_registered_once() {
    let (mut driver, _) = setup(|o| o);
    let err = trellis_dispatch::Driver::register_routes(&mut driver, Arc::new(registry())).unwrap_err();
    assert!(matches!(err, DispatchError::RoutesRegistered));
}

#[tokio::test]
async fn test_concurrent_requests_are_independent() {
    let (driver, users) = setup(|o| o);
    let driver = Arc::new(driver);

    let mut handles = Vec::new();
    for id in 0..16u32 {
        let driver = Arc::clone(&driver);
        handles.push(tokio::spawn(async move {
            driver
                .dispatch(GhostRequest::get(format!("/users/{id}")))
                .await
                .unwrap()
        }));
    }

    for (id, handle) in handles.into_iter().enumerate() {
        let response = handle.await.unwrap();
        assert_eq!(response.json().unwrap()["id"], json!(id));
    }
    assert_eq!(users.calls.load(Ordering::SeqCst), 16);
}
