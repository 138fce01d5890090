pub mod config;
pub mod error;
mod coordinator;
mod handles;
mod normalize;
mod outcome;
mod preview;
mod probe;
mod relay;
mod sink;
#[cfg(test)]
mod testing;

pub use config::{EndpointConfig, ExecutionMode, PipelineConfig, ProbeMode, StoreConfig};
pub use coordinator::{Clients, Coordinator};
pub use error::PipelineError;
pub use handles::{ConsumerHandle, ProducerHandle};
pub use normalize::{Normalized, normalize_for_send, normalize_for_store};
pub use outcome::{LoopReport, Outcome, PipelineReport, SkipReason, StopReason};
pub use preview::preview;
pub use probe::{ProbeSettings, probe};
pub use relay::{RelayLoop, RelaySettings};
pub use sink::{SinkLoop, SinkSettings};
