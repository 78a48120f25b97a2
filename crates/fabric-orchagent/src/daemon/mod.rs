//! Controller daemon: event intake, priority-ordered orch dispatch and
//! outbound notifications.

mod orchdaemon;

pub use orchdaemon::{ControllerEvent, FabricDaemon, FabricNotification};
