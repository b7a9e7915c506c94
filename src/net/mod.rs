use log::{debug, info};
use tokio::sync::mpsc;

use crate::link::{ConnectivityManager, NetworkStack};
use crate::LinkEvent;

pub mod sim;

pub use sim::SimNetworkStack;

/// Sole consumer of network-stack events. The stack's callback context
/// pushes into the channel sender (which never blocks); this side drains the
/// channel and hands each event to the state machine synchronously, in
/// arrival order. No reordering, no coalescing, no queue of its own.
pub struct EventDispatcher {
    tx: mpsc::UnboundedSender<LinkEvent>,
    rx: mpsc::UnboundedReceiver<LinkEvent>,
    registered: bool,
}

impl EventDispatcher {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        EventDispatcher {
            tx,
            rx,
            registered: false,
        }
    }

    /// Subscribe to both event categories. Guarded so that running
    /// initialization twice does not double-register with the stack.
    pub fn register(&mut self, net: &mut dyn NetworkStack) {
        if self.registered {
            debug!("net: event sinks already registered, skipping");
            return;
        }
        net.subscribe_link(self.tx.clone());
        net.subscribe_address(self.tx.clone());
        self.registered = true;
        info!("net: registered link and address event sinks");
    }

    /// Drain events into the state machine until every sender is gone.
    /// Returns the manager so tests can inspect the final state.
    pub async fn run(self, mut manager: ConnectivityManager) -> ConnectivityManager {
        let EventDispatcher { tx, mut rx, .. } = self;
        // Our own sender must go away or the channel never closes
        drop(tx);

        while let Some(event) = rx.recv().await {
            manager.handle_event(event);
        }
        debug!("net: event channel closed, dispatcher done");
        manager
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicator::{Indicator, NullIndicator};
    use crate::link::{
        AddressAssignment, AddressSource, ConnectRequest, ConnectionState, Credentials, Security,
    };
    use anyhow::Error;
    use std::net::Ipv4Addr;

    /// Stack double that exposes its registered senders and counts
    /// subscriptions.
    struct CountingNet {
        link_tx: Vec<mpsc::UnboundedSender<LinkEvent>>,
        address_tx: Vec<mpsc::UnboundedSender<LinkEvent>>,
    }

    impl CountingNet {
        fn new() -> Self {
            CountingNet {
                link_tx: Vec::new(),
                address_tx: Vec::new(),
            }
        }
    }

    impl NetworkStack for CountingNet {
        fn interface_ready(&self) -> bool {
            true
        }

        fn request_connect(&mut self, _request: &ConnectRequest) -> Result<(), Error> {
            Ok(())
        }

        fn signal_strength(&self) -> Result<i8, Error> {
            Ok(-60)
        }

        fn set_power_save(&mut self, _enabled: bool) -> Result<(), Error> {
            Ok(())
        }

        fn subscribe_link(&mut self, tx: mpsc::UnboundedSender<LinkEvent>) {
            self.link_tx.push(tx);
        }

        fn subscribe_address(&mut self, tx: mpsc::UnboundedSender<LinkEvent>) {
            self.address_tx.push(tx);
        }
    }

    fn manager(net: Box<dyn NetworkStack>) -> ConnectivityManager {
        let credentials = Credentials {
            ssid: "backyard".to_string(),
            psk: "hunter2hunter2".to_string(),
            security: Security::Wpa2Personal,
        };
        ConnectivityManager::new(credentials, net, Indicator::new(Box::new(NullIndicator), 8))
    }

    #[test]
    fn test_register_is_idempotent() {
        let mut net = CountingNet::new();
        let mut dispatcher = EventDispatcher::new();
        dispatcher.register(&mut net);
        dispatcher.register(&mut net);
        assert_eq!(net.link_tx.len(), 1);
        assert_eq!(net.address_tx.len(), 1);
    }

    #[tokio::test]
    async fn test_events_forwarded_in_order() {
        let mut net = CountingNet::new();
        let mut dispatcher = EventDispatcher::new();
        dispatcher.register(&mut net);

        // Take the senders out so the channel can close once the test drops
        // them; the real stack keeps its copies for the life of the process
        let link = net.link_tx.remove(0);
        let address = net.address_tx.remove(0);

        let mut manager = manager(Box::new(net));
        manager.start().unwrap();

        // Interleaved categories, pushed the way the stack would deliver them
        link.send(LinkEvent::ConnectResult { success: true }).unwrap();
        address
            .send(LinkEvent::AddressAssigned(AddressAssignment {
                if_index: 2,
                address: Ipv4Addr::new(192, 0, 2, 10),
                netmask: Ipv4Addr::new(255, 255, 255, 0),
                gateway: Ipv4Addr::new(192, 0, 2, 1),
                lease_secs: 3600,
                source: AddressSource::Dhcp,
            }))
            .unwrap();
        link.send(LinkEvent::DisconnectResult).unwrap();
        drop(link);
        drop(address);

        let manager = dispatcher.run(manager).await;
        // The disconnect arrived last, so it must win
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(manager.last_assignment().is_some());
    }

    #[tokio::test]
    async fn test_unmatched_events_still_forwarded() {
        let mut net = CountingNet::new();
        let mut dispatcher = EventDispatcher::new();
        dispatcher.register(&mut net);
        let link = net.link_tx.remove(0);
        // Drop the address sender too, or the channel never closes
        drop(net.address_tx.remove(0));

        let manager_in = manager(Box::new(net));
        // Disconnect with nothing in flight; the machine treats it as a no-op
        link.send(LinkEvent::DisconnectResult).unwrap();
        link.send(LinkEvent::DisconnectResult).unwrap();
        drop(link);

        let manager = dispatcher.run(manager_in).await;
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }
}
