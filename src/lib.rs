use link::AddressAssignment;

pub mod config;
pub mod indicator;
pub mod link;
pub mod net;
pub mod probe;
pub mod supervisor;

pub mod prelude {
    pub use crate::{config::*, indicator::*, link::*, net::*, probe::*, supervisor::*};
    pub use crate::LinkEvent;
}

/// Events delivered by the network stack. Each one is consumed exactly once
/// by the dispatcher and handed to the connection state machine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LinkEvent {
    /// A connect attempt completed, successfully or not
    ConnectResult { success: bool },
    /// The station dropped off the access point
    DisconnectResult,
    /// An address was bound to an interface (typically via DHCP)
    AddressAssigned(AddressAssignment),
}
