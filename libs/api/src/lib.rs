mod error;
mod queue;
mod store;
mod types;
mod util;

pub use error::{ErrorKind, PluginError};
pub use queue::{Consumer, Producer, QueueClient};
pub use store::{DocumentCollection, DocumentStore};
pub use types::{ClusterInfo, DocumentId, Field, Record, RecordValue, StructuredMap, map_to_json};
pub use util::{now_ms, preview_text};
