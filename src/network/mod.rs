//! Upstream networking: the command server, its per-connection sessions and the ISS relay.
pub mod protocol;
pub mod relay;
pub mod server_actor;
pub mod session;

pub use protocol::{Command, CommandKind, Completion, InboundCommand, Reply};
pub use relay::IssRelay;
pub use server_actor::CommandServer;
pub use session::{Acknowledger, ConnectionClosed, ConnectionSession};
