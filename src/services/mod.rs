pub mod artifact_writer;
pub mod auth;
pub mod retry;
pub mod snapshot_loader;
pub mod synchronizer;
pub mod token_extractor;

pub use artifact_writer::ArtifactWriter;
pub use auth::{AuthMachine, AuthStep, AuthTokens, Credentials};
pub use retry::RetryPolicy;
pub use snapshot_loader::{ComponentLocator, SnapshotLoader};
pub use synchronizer::{selection_confirmed, SnapshotSynchronizer, SyncOutcome};
