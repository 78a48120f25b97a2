//! Host attachment tracking.

mod orch;
mod table;
mod types;

pub use orch::{HostEvent, HostOrch, HostOrchCallbacks, HostOrchStats};
pub use table::{AttachOutcome, AttachmentTable, HostEventSink};
pub use types::{AttachmentPoint, AttachmentRecord, HostAddress, MacAddress};
