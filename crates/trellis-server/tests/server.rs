//! End-to-end tests over a real TCP socket.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use trellis_core::{ActionError, ActionRegistry, Container, Json, ParamMetadata};
use trellis_dispatch::DriverOptions;
use trellis_server::{HyperDriver, ServerConfig, ShutdownSignal};

struct Greeter;

impl Greeter {
    async fn greet(self: Arc<Self>, name: String) -> Result<Json<Value>, ActionError> {
        Ok(Json(json!({ "greeting": format!("hello {name}") })))
    }
}

async fn start() -> (std::net::SocketAddr, ShutdownSignal, tokio::task::JoinHandle<()>) {
    let registry = ActionRegistry::builder()
        .controller::<Greeter>("/greet", |c| {
            c.get("/:name", Greeter::greet).arg(ParamMetadata::param("name"));
        })
        .build()
        .unwrap();

    let mut container = Container::new();
    container.register(Arc::new(Greeter));
    let options = DriverOptions::builder(container.freeze()).route_prefix("/api").build();

    let config = ServerConfig::builder()
        .shutdown_timeout(Duration::from_secs(1))
        .build();
    let driver = HyperDriver::ready(options, config, registry).unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = ShutdownSignal::new();
    let server = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { driver.serve(listener, shutdown).await.unwrap() })
    };
    (addr, shutdown, server)
}

async fn get(addr: std::net::SocketAddr, path: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    response
}

#[tokio::test]
async fn test_request_over_tcp() {
    let (addr, shutdown, server) = start().await;

    let response = get(addr, "/api/greet/ada").await;
    assert!(response.starts_with("HTTP/1.1 200 OK"), "{response}");
    assert!(response.contains("content-type: application/json"), "{response}");
    assert!(response.ends_with(r#"{"greeting":"hello ada"}"#), "{response}");

    let missing = get(addr, "/greet/ada").await;
    assert!(missing.starts_with("HTTP/1.1 404 Not Found"), "{missing}");

    shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_method_not_allowed_over_tcp() {
    let (addr, shutdown, server) = start().await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"DELETE /api/greet/ada HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();

    assert!(response.starts_with("HTTP/1.1 405 Method Not Allowed"), "{response}");
    assert!(response.contains("allow: GET"), "{response}");

    shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .unwrap()
        .unwrap();
}
