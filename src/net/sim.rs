use std::net::Ipv4Addr;

use anyhow::Error;
use log::{debug, info};
use tokio::sync::mpsc;

use crate::link::{AddressAssignment, AddressSource, ConnectRequest, NetworkStack};
use crate::LinkEvent;

/// Host-side stand-in for the wireless stack. Accepts every connect request
/// and answers with a successful link result followed by a DHCP-style
/// address binding, so the whole supervisor path runs off-device.
pub struct SimNetworkStack {
    link_tx: Option<mpsc::UnboundedSender<LinkEvent>>,
    address_tx: Option<mpsc::UnboundedSender<LinkEvent>>,
}

impl SimNetworkStack {
    pub fn new() -> Self {
        SimNetworkStack {
            link_tx: None,
            address_tx: None,
        }
    }
}

impl Default for SimNetworkStack {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkStack for SimNetworkStack {
    fn interface_ready(&self) -> bool {
        true
    }

    fn request_connect(&mut self, request: &ConnectRequest) -> Result<(), Error> {
        info!("sim: joining {} on {:?}", request.ssid, request.band);

        if let Some(tx) = &self.link_tx {
            // Sends are non-blocking; a closed channel just means the
            // dispatcher is gone
            let _ = tx.send(LinkEvent::ConnectResult { success: true });
        }
        if let Some(tx) = &self.address_tx {
            let _ = tx.send(LinkEvent::AddressAssigned(AddressAssignment {
                if_index: 1,
                address: Ipv4Addr::new(192, 0, 2, 10),
                netmask: Ipv4Addr::new(255, 255, 255, 0),
                gateway: Ipv4Addr::new(192, 0, 2, 1),
                lease_secs: 3600,
                source: AddressSource::Dhcp,
            }));
        }
        Ok(())
    }

    fn signal_strength(&self) -> Result<i8, Error> {
        Ok(-52)
    }

    fn set_power_save(&mut self, enabled: bool) -> Result<(), Error> {
        debug!("sim: power save {}", if enabled { "on" } else { "off" });
        Ok(())
    }

    fn subscribe_link(&mut self, tx: mpsc::UnboundedSender<LinkEvent>) {
        self.link_tx = Some(tx);
    }

    fn subscribe_address(&mut self, tx: mpsc::UnboundedSender<LinkEvent>) {
        self.address_tx = Some(tx);
    }
}
