pub mod clock;
pub mod draft;
pub mod error;
pub mod ids;
pub mod lock;
pub mod project;
pub mod session;
pub mod signal;
pub mod version;

pub use clock::{Clock, SystemClock};
pub use draft::DraftOverlay;
pub use error::CoreError;
pub use ids::*;
pub use lock::{LockOwner, LockStatus};
pub use project::{Item, Project};
pub use session::{AuthGuard, SessionContext, SessionScope};
pub use signal::{MutationKind, MutationRecord, SyncSignal};
pub use version::VersionStamp;
