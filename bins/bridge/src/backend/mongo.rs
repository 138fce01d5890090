//! MongoDB document store. Подключение ленивое: клиент создаётся при
//! первом `collection()`, там же проверяется `ping`.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use mongodb::bson::{Bson, Document, doc};
use mongodb::{Client, Collection};
use tokio::sync::OnceCell;

use bridge_api::{DocumentCollection, DocumentId, DocumentStore, PluginError};

fn mongo_err(context: &str, e: mongodb::error::Error) -> PluginError {
    match *e.kind {
        mongodb::error::ErrorKind::InvalidArgument { .. } => PluginError::config(format!("{context}: {e}")),
        _ => PluginError::io(format!("{context}: {e}")),
    }
}

pub struct MongoStore {
    url: String,
    client: OnceCell<Client>,
    closed: Arc<AtomicBool>,
}

impl MongoStore {
    pub fn new(url: &str) -> Result<Self, PluginError> {
        if !(url.starts_with("mongodb://") || url.starts_with("mongodb+srv://")) {
            return Err(PluginError::config(format!(
                "store url '{url}' must start with mongodb:// or mongodb+srv://"
            )));
        }
        Ok(Self { url: url.to_string(), client: OnceCell::new(), closed: Arc::new(AtomicBool::new(false)) })
    }

    async fn client(&self) -> Result<&Client, PluginError> {
        self.client
            .get_or_try_init(|| async {
                Client::with_uri_str(&self.url).await.map_err(|e| mongo_err("connect", e))
            })
            .await
    }
}

impl DocumentStore for MongoStore {
    fn collection(
        &self,
        db: &str,
        name: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Arc<dyn DocumentCollection>, PluginError>> + Send + '_>> {
        let db = db.to_string();
        let name = name.to_string();
        Box::pin(async move {
            if self.closed.load(Ordering::Acquire) {
                return Err(PluginError::closed("document store"));
            }
            let database = self.client().await?.database(&db);
            database
                .run_command(doc! { "ping": 1 })
                .await
                .map_err(|e| mongo_err("ping", e))?;
            tracing::debug!(database = %db, collection = %name, "mongodb collection ready");
            Ok(Arc::new(MongoCollection {
                name: format!("{db}.{name}"),
                inner: database.collection::<Document>(&name),
                closed: Arc::clone(&self.closed),
            }) as Arc<dyn DocumentCollection>)
        })
    }

    fn close(&self) -> Pin<Box<dyn Future<Output = Result<(), PluginError>> + Send + '_>> {
        Box::pin(async move {
            if self.closed.swap(true, Ordering::AcqRel) {
                return Ok(());
            }
            if let Some(client) = self.client.get() {
                client.clone().shutdown().await;
                tracing::info!("mongodb client closed");
            }
            Ok(())
        })
    }
}

struct MongoCollection {
    name: String,
    inner: Collection<Document>,
    closed: Arc<AtomicBool>,
}

impl DocumentCollection for MongoCollection {
    fn name(&self) -> &str {
        &self.name
    }

    fn insert_one(
        &self,
        document: serde_json::Value,
    ) -> Pin<Box<dyn Future<Output = Result<DocumentId, PluginError>> + Send + '_>> {
        Box::pin(async move {
            if self.closed.load(Ordering::Acquire) {
                return Err(PluginError::closed("document store"));
            }
            let document = to_document(&document)?;
            let result = self
                .inner
                .insert_one(document)
                .await
                .map_err(|e| mongo_err(&format!("insert into {}", self.name), e))?;
            Ok(DocumentId(match result.inserted_id {
                Bson::ObjectId(id) => id.to_hex(),
                Bson::String(s) => s,
                other => other.to_string(),
            }))
        })
    }
}

fn to_document(value: &serde_json::Value) -> Result<Document, PluginError> {
    if !value.is_object() {
        return Err(PluginError::format_err(format!(
            "document must be a JSON object, got {}",
            json_kind(value)
        )));
    }
    mongodb::bson::to_document(value).map_err(|e| PluginError::format_err(format!("bson: {e}")))
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
