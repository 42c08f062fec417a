//! API Gateway round trips through the Lambda driver.

use std::sync::Arc;

use bytes::Bytes;
use http::{HeaderValue, StatusCode};
use serde_json::{json, Value};
use trellis_core::{middleware, Action, ActionError, ActionRegistry, Container, Json, ParamMetadata, Reply};
use trellis_dispatch::{Driver, DriverOptions};
use trellis_lambda::{ApiGatewayEvent, LambdaContext, LambdaDriver, LambdaError};

struct Files;

impl Files {
    async fn create(self: Arc<Self>, file: Value) -> Result<Json<Value>, ActionError> {
        Ok(Json(json!({ "created": file["name"] })))
    }

    async fn download(self: Arc<Self>) -> Result<Reply, ActionError> {
        Ok(Reply::Bytes(Bytes::from_static(&[0xde, 0xad, 0xbe, 0xef])))
    }

    async fn latest(self: Arc<Self>) -> Result<Option<Json<Value>>, ActionError> {
        Ok(None)
    }

    async fn search(self: Arc<Self>, tags: Value) -> Result<Json<Value>, ActionError> {
        Ok(Json(tags))
    }
}

fn driver() -> LambdaDriver {
    let registry = ActionRegistry::builder()
        .controller::<Files>("/files", |c| {
            c.post("/", Files::create).arg(ParamMetadata::body()).success_code(StatusCode::CREATED);
            c.get("/raw", Files::download);
            c.get("/latest", Files::latest).on_null(StatusCode::NOT_FOUND);
            c.get("/search", Files::search).arg(ParamMetadata::query("tag"));
        })
        .build()
        .unwrap();

    let mut container = Container::new();
    container.register(Arc::new(Files));

    let mut driver = LambdaDriver::new(DriverOptions::builder(container.freeze()).build());
    driver.initialize().unwrap();
    driver.register_middleware(Arc::new(middleware::after("invocation-id", |action: &mut Action| {
        let id = action
            .request
            .extensions
            .get::<LambdaContext>()
            .map(|context| context.aws_request_id.clone())
            .unwrap_or_default();
        if let Ok(value) = HeaderValue::from_str(&id) {
            action.response.headers.insert("x-invocation-id", value);
        }
        Ok(())
    })));
    driver.register_routes(Arc::new(registry)).unwrap();
    driver
}

#[tokio::test]
async fn test_http_api_json_round_trip() {
    let event = json!({
        "version": "2.0",
        "rawPath": "/files",
        "rawQueryString": "",
        "headers": { "content-type": "application/json" },
        "requestContext": { "http": { "method": "POST" } },
        "body": "{\"name\":\"report.pdf\"}",
        "isBase64Encoded": false
    });

    let response = driver().handle_value(event, LambdaContext::new("inv-42")).await.unwrap();

    assert_eq!(response["statusCode"], 201);
    assert_eq!(response["isBase64Encoded"], false);
    assert_eq!(response["headers"]["content-type"], "application/json");
    assert_eq!(response["headers"]["x-invocation-id"], "inv-42");
    let body: Value = serde_json::from_str(response["body"].as_str().unwrap()).unwrap();
    assert_eq!(body, json!({ "created": "report.pdf" }));
}

#[tokio::test]
async fn test_binary_body_is_base64() {
    let event: ApiGatewayEvent = serde_json::from_value(json!({
        "httpMethod": "GET",
        "path": "/files/raw",
        "headers": null,
        "multiValueHeaders": null,
        "queryStringParameters": null,
        "body": null,
        "isBase64Encoded": false
    }))
    .unwrap();

    let response = driver().handle(event, LambdaContext::default()).await.unwrap();

    assert_eq!(response.status_code, 200);
    assert!(response.is_base64_encoded);
    assert_eq!(response.body, "3q2+7w==");
    assert_eq!(response.headers["content-type"], "application/octet-stream");
}

#[tokio::test]
async fn test_rest_multi_value_query() {
    let event = json!({
        "httpMethod": "GET",
        "path": "/files/search",
        "multiValueQueryStringParameters": { "tag": ["a", "b"] },
        "isBase64Encoded": false
    });

    let response = driver().handle_value(event, LambdaContext::default()).await.unwrap();

    assert_eq!(response["statusCode"], 200);
    assert_eq!(response["body"], r#"["a","b"]"#);
    assert_eq!(response["multiValueHeaders"]["content-type"], json!(["application/json"]));
}

#[tokio::test]
async fn test_unknown_route() {
    let event = json!({
        "version": "2.0",
        "rawPath": "/nothing",
        "requestContext": { "http": { "method": "GET" } }
    });

    let response = driver().handle_value(event, LambdaContext::default()).await.unwrap();

    assert_eq!(response["statusCode"], 404);
    let body: Value = serde_json::from_str(response["body"].as_str().unwrap()).unwrap();
    assert_eq!(body["name"], "NotFoundError");
}

#[tokio::test]
async fn test_malformed_body_is_bad_request() {
    let event = json!({
        "version": "2.0",
        "rawPath": "/files",
        "headers": { "content-type": "application/json" },
        "requestContext": { "http": { "method": "POST" } },
        "body": "{broken"
    });

    let response = driver().handle_value(event, LambdaContext::default()).await.unwrap();
    assert_eq!(response["statusCode"], 400);
}

#[tokio::test]
async fn test_non_gateway_event_is_rejected() {
    let err = driver()
        .handle_value(json!({ "source": "aws.events" }), LambdaContext::default())
        .await
        .unwrap_err();
    assert!(matches!(err, LambdaError::Event(_)));
}

#[tokio::test]
async fn test_null_result_with_code_sends_json_null() {
    let event = json!({
        "version": "2.0",
        "rawPath": "/files/latest",
        "requestContext": { "http": { "method": "GET" } }
    });

    let response = driver().handle_value(event, LambdaContext::default()).await.unwrap();

    assert_eq!(response["statusCode"], 404);
    assert_eq!(response["headers"]["content-type"], "application/json");
    assert_eq!(response["body"], "null");
}
