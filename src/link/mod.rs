use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use anyhow::Error;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::indicator::{Indicator, IndicatorColor};
use crate::LinkEvent;

/// Lifecycle of the station link. One instance per process, alive for the
/// whole run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
}

/// Atomic holder for [`ConnectionState`]. Written by the event transitions
/// only; read by the bring-up poll loop and the probe gate, which run on a
/// different context than the network stack's callbacks.
pub struct StateCell {
    inner: AtomicU8,
}

impl StateCell {
    pub fn new(state: ConnectionState) -> Self {
        Self {
            inner: AtomicU8::new(state as u8),
        }
    }

    pub fn get(&self) -> ConnectionState {
        match self.inner.load(Ordering::SeqCst) {
            0 => ConnectionState::Disconnected,
            1 => ConnectionState::Connecting,
            _ => ConnectionState::Connected,
        }
    }

    pub(crate) fn set(&self, state: ConnectionState) {
        self.inner.store(state as u8, Ordering::SeqCst);
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub enum Security {
    Open,
    Wpa2Personal,
    Wpa3Personal,
}

/// Immutable station credentials, supplied by configuration at startup
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Credentials {
    pub ssid: String,
    pub psk: String,
    pub security: Security,
}

impl From<&crate::config::WifiConfig> for Credentials {
    fn from(wifi: &crate::config::WifiConfig) -> Self {
        Credentials {
            ssid: wifi.ssid.clone(),
            psk: wifi.psk.clone(),
            security: wifi.security,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Band {
    Band2Ghz,
    Band5Ghz,
}

/// One connection attempt, built fresh from the credentials each time.
/// Defaults: any channel, 2.4GHz.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectRequest {
    pub ssid: String,
    pub psk: String,
    pub security: Security,
    pub channel: Option<u8>,
    pub band: Band,
}

impl ConnectRequest {
    pub fn new(credentials: &Credentials) -> Self {
        ConnectRequest {
            ssid: credentials.ssid.clone(),
            psk: credentials.psk.clone(),
            security: credentials.security,
            channel: None,
            band: Band::Band2Ghz,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddressSource {
    Dhcp,
    Static,
    LinkLocal,
}

/// An address binding reported by the network stack
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AddressAssignment {
    pub if_index: u32,
    pub address: Ipv4Addr,
    pub netmask: Ipv4Addr,
    pub gateway: Ipv4Addr,
    pub lease_secs: u32,
    pub source: AddressSource,
}

impl AddressAssignment {
    pub fn is_dhcp(&self) -> bool {
        self.source == AddressSource::Dhcp
    }
}

/// Boundary to the wireless stack. Implemented by the platform layer; the
/// core only ever talks through this trait.
pub trait NetworkStack: Send {
    /// Whether the station interface handle exists yet
    fn interface_ready(&self) -> bool;

    fn request_connect(&mut self, request: &ConnectRequest) -> Result<(), Error>;

    /// Current RSSI of the station link, in dBm
    fn signal_strength(&self) -> Result<i8, Error>;

    fn set_power_save(&mut self, enabled: bool) -> Result<(), Error>;

    /// Register the single link-state event sink. The stack must push events
    /// in delivery order and never block on the sender.
    fn subscribe_link(&mut self, tx: mpsc::UnboundedSender<LinkEvent>);

    /// Register the single address-assignment event sink
    fn subscribe_address(&mut self, tx: mpsc::UnboundedSender<LinkEvent>);
}

/// Owns the connection lifecycle: the state cell, the credentials, the
/// network-stack port and the indicator. Constructed once at startup and
/// handed to the dispatcher; nothing here lives in a static.
pub struct ConnectivityManager {
    state: Arc<StateCell>,
    credentials: Credentials,
    net: Box<dyn NetworkStack>,
    indicator: Indicator,
    last_assignment: Option<AddressAssignment>,
}

impl ConnectivityManager {
    pub fn new(credentials: Credentials, net: Box<dyn NetworkStack>, indicator: Indicator) -> Self {
        ConnectivityManager {
            state: Arc::new(StateCell::new(ConnectionState::Disconnected)),
            credentials,
            net,
            indicator,
            last_assignment: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    /// Shared handle for readers polling the state from another context
    pub fn state_cell(&self) -> Arc<StateCell> {
        self.state.clone()
    }

    pub fn last_assignment(&self) -> Option<&AddressAssignment> {
        self.last_assignment.as_ref()
    }

    pub fn network(&mut self) -> &mut dyn NetworkStack {
        self.net.as_mut()
    }

    /// Kick off a connection attempt. The only precondition is a live
    /// interface handle; everything past that is reported through events.
    /// While a request is already in flight (or the link is up) this is a
    /// no-op, keeping at most one request outstanding.
    pub fn start(&mut self) -> Result<(), Error> {
        if !self.net.interface_ready() {
            anyhow::bail!("station interface is not ready");
        }

        match self.state.get() {
            ConnectionState::Disconnected => {
                // Radio power save adds seconds to DHCP on some APs; failure
                // to turn it off is harmless
                if let Err(e) = self.net.set_power_save(false) {
                    warn!("link: could not disable power save: {}", e);
                }

                let request = ConnectRequest::new(&self.credentials);
                info!("link: connecting to {}", request.ssid);
                self.net.request_connect(&request)?;
                self.state.set(ConnectionState::Connecting);
                Ok(())
            }
            ConnectionState::Connecting | ConnectionState::Connected => Ok(()),
        }
    }

    /// The transition function. Runs on the dispatcher's context; must not
    /// block and must return quickly. Events with no matching transition
    /// fall through as no-ops.
    pub fn handle_event(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::ConnectResult { success } => self.handle_connect_result(success),
            LinkEvent::DisconnectResult => self.handle_disconnect(),
            LinkEvent::AddressAssigned(assignment) => self.handle_assignment(assignment),
        }
    }

    fn handle_connect_result(&mut self, success: bool) {
        match (self.state.get(), success) {
            (ConnectionState::Connecting, true) => {
                self.state.set(ConnectionState::Connected);
                self.indicator.set(IndicatorColor::Connected);
                match self.net.signal_strength() {
                    Ok(rssi) => info!(
                        "link: connected to {} ({} dBm)",
                        self.credentials.ssid, rssi
                    ),
                    Err(_) => info!("link: connected to {}", self.credentials.ssid),
                }
            }
            (ConnectionState::Connecting, false) => {
                self.state.set(ConnectionState::Disconnected);
                self.indicator.set(IndicatorColor::Disconnected);
                error!("link: failed to connect to {}", self.credentials.ssid);
            }
            // Stale or duplicate result, nothing to do
            _ => {}
        }
    }

    fn handle_disconnect(&mut self) {
        match self.state.get() {
            // Unconditional reset from either active state
            ConnectionState::Connecting | ConnectionState::Connected => {
                self.state.set(ConnectionState::Disconnected);
                self.indicator.set(IndicatorColor::Disconnected);
                warn!("link: disconnected from {}", self.credentials.ssid);
            }
            ConnectionState::Disconnected => {}
        }
    }

    /// Address events never change the connection state; DHCP bindings are
    /// logged and retained, everything else is dropped.
    fn handle_assignment(&mut self, assignment: AddressAssignment) {
        if !assignment.is_dhcp() {
            debug!(
                "link: ignoring {:?} address {} on if {}",
                assignment.source, assignment.address, assignment.if_index
            );
            return;
        }

        info!(
            "link: if {} bound {} netmask {} gateway {} lease {}s",
            assignment.if_index,
            assignment.address,
            assignment.netmask,
            assignment.gateway,
            assignment.lease_secs
        );
        self.last_assignment = Some(assignment);
    }
}
