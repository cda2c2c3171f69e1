//! Browser-facing seams for Parley: the action surface contract, the chat
//! composer helper, and the snapshot observer that turns page polling into
//! change events for the session runtime.

pub mod compose;
pub mod observer;
pub mod snapshot;
pub mod surface;

pub use compose::{ChatSender, ComposerChatSender};
pub use observer::{ObserverEvent, SnapshotObserver};
pub use snapshot::{fingerprint, suggests_remote_composing};
pub use surface::{ActionSurface, HttpBridgeSurface, NoopActionSurface, SurfaceError};
