pub mod entity;
pub mod entity_kind;
pub mod snapshot;

pub use entity::{Entity, IdentityNumber, SelectionRecord, SelectionState};
pub use entity_kind::{Completeness, Dependency, EntityKind, DISPATCH_METHOD};
pub use snapshot::{ComponentSnapshot, Effects, Emit, Fingerprint, Memo, UpdateOp, UpdateRequest, UpdateResponse};
