pub mod admission;
pub mod broadcast;
pub mod handlers;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod session;

pub use admission::{Admission, Slot};
pub use broadcast::{BroadcastSummary, JobBroadcaster};
pub use handlers::{decide_share, Flow, ShareOutcome};
pub use protocol::{StratumError, StratumPush, StratumRequest, StratumResponse};
pub use registry::SessionRegistry;
pub use server::{StratumServer, StratumSettings};
pub use session::{Session, SessionState};
