//! A small donut shop used to exercise tracking end to end.
//!
//! - [`Database`]: two async operations with artificial latency
//! - [`ServerApp`]: `GET /items` and `POST /items` over HTTP
//! - [`HttpFetcher`]: the network capability, `fetch(url, options)`
//! - [`BrowserApp`]: renders items and adds one when "clicked"

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracked_async::{Instrumented, Resolution, TrackedOperation};

const DB_LATENCY: Duration = Duration::from_millis(2);

/// Installs a test subscriber once; honours `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// In-memory item storage.
#[derive(Debug, Default)]
pub struct Database {
    items: Mutex<Vec<String>>,
}

#[tracked_async::instrument]
impl Database {
    pub async fn create_item(&self, item: String) {
        tokio::time::sleep(DB_LATENCY).await;
        self.items.lock().push(item);
    }

    pub async fn fetch_all_items(&self) -> Vec<String> {
        tokio::time::sleep(DB_LATENCY).await;
        self.items.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ItemsBody {
    pub items: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Ack {
    pub result: String,
}

/// HTTP front for the database.
pub struct ServerApp {
    database: Instrumented<Database>,
}

impl ServerApp {
    pub fn new(database: Instrumented<Database>) -> Self {
        Self { database }
    }

    /// Binds an ephemeral port and serves in the background.
    pub async fn listen(self) -> std::io::Result<SocketAddr> {
        let app = Router::new()
            .route("/items", get(list_items).post(add_item))
            .with_state(self.database);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            if let Err(err) = axum::serve(listener, app).await {
                tracing::error!(%err, "server stopped");
            }
        });
        Ok(addr)
    }
}

async fn list_items(State(database): State<Instrumented<Database>>) -> Json<ItemsBody> {
    let items = database.fetch_all_items().await;
    Json(ItemsBody { items })
}

async fn add_item(State(database): State<Instrumented<Database>>) -> Json<Ack> {
    database.create_item("Glazed".to_string()).await;
    Json(Ack {
        result: "yum!".to_string(),
    })
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Method {
    #[default]
    Get,
    Post,
}

#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    pub method: Method,
}

impl FetchOptions {
    pub fn post() -> Self {
        Self {
            method: Method::Post,
        }
    }
}

/// A response whose body is parsed asynchronously.
#[derive(Debug)]
pub struct FetchResponse(reqwest::Response);

impl FetchResponse {
    pub fn status(&self) -> u16 {
        self.0.status().as_u16()
    }

    pub async fn json<T: DeserializeOwned>(self) -> reqwest::Result<T> {
        self.0.json().await
    }
}

/// The network capability.
#[derive(Debug, Default)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

#[tracked_async::instrument]
impl HttpFetcher {
    pub async fn fetch(&self, url: String, options: FetchOptions) -> reqwest::Result<FetchResponse> {
        let request = match options.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
        };
        request.send().await.map(FetchResponse)
    }
}

const ADD_BUTTON: &str = r#"<button id="add-item-button">Add an item</button>"#;

/// A headless front-end rendering into an HTML string.
#[derive(Clone)]
pub struct BrowserApp {
    server_url: String,
    fetcher: Instrumented<HttpFetcher>,
    document: Arc<Mutex<String>>,
}

impl BrowserApp {
    pub fn new(server_url: impl Into<String>, fetcher: Instrumented<HttpFetcher>) -> Self {
        Self {
            server_url: server_url.into(),
            fetcher,
            document: Arc::new(Mutex::new(String::new())),
        }
    }

    fn render(document: &Mutex<String>, items: &[String]) {
        *document.lock() = format!(r#"<div id="items">{}</div>{ADD_BUTTON}"#, items.join(", "));
    }

    /// Fetches, parses, then renders: three chained operations.
    fn fetch_all_items_from_server(&self) -> TrackedOperation<reqwest::Result<()>> {
        let document = Arc::clone(&self.document);
        self.fetcher
            .fetch(format!("{}/items", self.server_url), FetchOptions::default())
            .continue_with(
                |response| Resolution::forward(response.json::<ItemsBody>()),
                |err| Resolution::immediate(Err(err)),
            )
            .map(move |body| -> reqwest::Result<()> {
                let body = body?;
                Self::render(&document, &body.items);
                Ok(())
            })
    }

    /// Posts a new item, then re-renders from the server.
    fn add_item_to_server(&self) -> TrackedOperation<reqwest::Result<()>> {
        let app = self.clone();
        self.fetcher
            .fetch(format!("{}/items", self.server_url), FetchOptions::post())
            .then(move |posted| -> Resolution<reqwest::Result<()>> {
                match posted {
                    Ok(_) => Resolution::from(app.fetch_all_items_from_server()),
                    Err(err) => Resolution::immediate(Err(err)),
                }
            })
    }
}

#[tracked_async::instrument]
impl BrowserApp {
    pub async fn mount(&self) -> reqwest::Result<()> {
        Self::render(&self.document, &[]);
        self.fetch_all_items_from_server().await
    }

    /// Fire-and-forget, like a click handler.
    pub fn click_add_item(&self) {
        tokio::spawn(self.add_item_to_server());
    }

    pub fn html(&self) -> String {
        self.document.lock().clone()
    }
}
