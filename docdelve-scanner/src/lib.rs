pub mod chrome;
pub mod error;
pub mod explorer;
pub mod frontier;
pub mod navigator;
pub mod ollama;
pub mod ranker;
pub mod result;
pub mod snapshot;
pub mod state;

pub use chrome::{ChromeNavigator, ChromeOptions};
pub use error::ScanError;
pub use explorer::{EventCallback, ExploreConfig, ExploreEvent, Explorer};
pub use navigator::{Navigator, ReplayLog};
pub use ollama::OllamaRanker;
pub use ranker::{DocumentOrderRanker, Ranker};
pub use result::{FailureKind, FailureRecord, RunResult, Termination};
pub use snapshot::{ElementId, Fingerprint, InteractiveElement, PageSnapshot, SnapshotExtractor};
pub use state::DiscoveredDocument;
