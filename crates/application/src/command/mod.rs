mod broker;
mod pending;

pub use broker::{CommandBroker, CompletedCommand};
pub use pending::PendingInfo;
