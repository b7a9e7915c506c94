use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Error;
use log::{debug, error, info};

use crate::link::{ConnectionState, StateCell};

const AF_INET: u16 = 2;
const AF_INET6: u16 = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordType {
    A,
    Aaaa,
}

/// A resolver answer before family decoding. Only AF_INET and AF_INET6 are
/// recognized downstream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawAddress {
    pub family: u16,
    pub bytes: [u8; 16],
}

impl RawAddress {
    pub fn from_ip(ip: IpAddr) -> Self {
        let mut bytes = [0u8; 16];
        let family = match ip {
            IpAddr::V4(v4) => {
                bytes[..4].copy_from_slice(&v4.octets());
                AF_INET
            }
            IpAddr::V6(v6) => {
                bytes.copy_from_slice(&v6.octets());
                AF_INET6
            }
        };
        RawAddress { family, bytes }
    }

    /// None for any family we do not recognize
    pub fn decode(&self) -> Option<IpAddr> {
        match self.family {
            AF_INET => {
                let mut octets = [0u8; 4];
                octets.copy_from_slice(&self.bytes[..4]);
                Some(IpAddr::V4(Ipv4Addr::from(octets)))
            }
            AF_INET6 => Some(IpAddr::V6(Ipv6Addr::from(self.bytes))),
            _ => None,
        }
    }
}

/// Status delivered to the resolve callback. Not retained past the call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResolutionResult {
    /// A partial answer; carries one resolved address when present
    InProgress { addr: Option<RawAddress> },
    Failed { reason: String },
    Canceled,
    NoData,
    AllDone,
}

pub type QueryId = u32;

pub type ResolveCallback = Box<dyn FnMut(ResolutionResult) + Send>;

/// Boundary to the asynchronous DNS resolver. The callback may be invoked
/// several times per query (one InProgress per address, then a terminal tag).
pub trait Resolver: Send {
    fn resolve(
        &mut self,
        query: &str,
        record: RecordType,
        timeout: Duration,
        callback: ResolveCallback,
    ) -> Result<QueryId, Error>;
}

/// One-shot diagnostic lookup fired after the link first comes up. Confirms
/// outbound connectivity; never retries, never escalates.
pub struct ResolutionProbe {
    resolver: Box<dyn Resolver>,
    query: String,
    timeout: Duration,
    fired: bool,
}

impl ResolutionProbe {
    pub fn new(resolver: Box<dyn Resolver>, query: String, timeout: Duration) -> Self {
        ResolutionProbe {
            resolver,
            query,
            timeout,
            fired: false,
        }
    }

    /// Issue the lookup if the link is up and the probe has not fired yet.
    /// Returns whether a query was actually issued.
    pub fn fire(&mut self, state: &Arc<StateCell>) -> bool {
        if self.fired {
            debug!("probe: already fired, skipping");
            return false;
        }
        if state.get() != ConnectionState::Connected {
            debug!("probe: link is not up, skipping");
            return false;
        }

        let query = self.query.clone();
        info!("probe: resolving {}", query);
        let callback: ResolveCallback =
            Box::new(move |result| handle_result(&query, result));

        match self
            .resolver
            .resolve(&self.query, RecordType::A, self.timeout, callback)
        {
            Ok(id) => {
                debug!("probe: query {} in flight", id);
                self.fired = true;
                true
            }
            Err(e) => {
                // Observational only; the failure is noted and that is all
                info!("probe: could not issue query for {}: {}", self.query, e);
                self.fired = true;
                false
            }
        }
    }
}

fn handle_result(query: &str, result: ResolutionResult) {
    match result {
        ResolutionResult::InProgress { addr: Some(addr) } => match addr.decode() {
            Some(ip) => info!("probe: {} resolved to {}", query, ip),
            None => error!(
                "probe: {} answer has unrecognized address family {}",
                query, addr.family
            ),
        },
        ResolutionResult::InProgress { addr: None } => {
            debug!("probe: {} still resolving", query)
        }
        ResolutionResult::Failed { reason } => info!("probe: {} failed: {}", query, reason),
        ResolutionResult::Canceled => info!("probe: {} canceled", query),
        ResolutionResult::NoData => info!("probe: {} returned no data", query),
        ResolutionResult::AllDone => debug!("probe: {} done", query),
    }
}

/// Resolver backed by the host's libc resolver, run on a worker thread so
/// `resolve` returns immediately. Timeout is enforced on our side because
/// the blocking lookup itself cannot be canceled.
pub struct SystemResolver {
    next_id: QueryId,
}

impl SystemResolver {
    pub fn new() -> Self {
        SystemResolver { next_id: 1 }
    }
}

impl Default for SystemResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl Resolver for SystemResolver {
    fn resolve(
        &mut self,
        query: &str,
        record: RecordType,
        timeout: Duration,
        mut callback: ResolveCallback,
    ) -> Result<QueryId, Error> {
        let id = self.next_id;
        self.next_id += 1;

        let host = format!("{}:0", query);
        std::thread::spawn(move || {
            let (tx, rx) = std::sync::mpsc::channel();
            std::thread::spawn(move || {
                let result = host
                    .to_socket_addrs()
                    .map(|addrs| addrs.map(|a| a.ip()).collect::<Vec<_>>());
                let _ = tx.send(result);
            });

            match rx.recv_timeout(timeout) {
                Ok(Ok(ips)) => {
                    let mut any = false;
                    for ip in ips {
                        let wanted = match record {
                            RecordType::A => ip.is_ipv4(),
                            RecordType::Aaaa => ip.is_ipv6(),
                        };
                        if wanted {
                            any = true;
                            callback(ResolutionResult::InProgress {
                                addr: Some(RawAddress::from_ip(ip)),
                            });
                        }
                    }
                    if !any {
                        callback(ResolutionResult::NoData);
                    }
                    callback(ResolutionResult::AllDone);
                }
                Ok(Err(e)) => callback(ResolutionResult::Failed {
                    reason: e.to_string(),
                }),
                Err(_) => callback(ResolutionResult::Failed {
                    reason: "timed out".to_string(),
                }),
            }
        });

        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct MockResolver {
        calls: Arc<AtomicU32>,
        answer: ResolutionResult,
    }

    impl Resolver for MockResolver {
        fn resolve(
            &mut self,
            _query: &str,
            _record: RecordType,
            _timeout: Duration,
            mut callback: ResolveCallback,
        ) -> Result<QueryId, Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            callback(self.answer.clone());
            Ok(7)
        }
    }

    fn probe_with(answer: ResolutionResult) -> (ResolutionProbe, Arc<AtomicU32>) {
        let calls = Arc::new(AtomicU32::new(0));
        let resolver = MockResolver {
            calls: calls.clone(),
            answer,
        };
        (
            ResolutionProbe::new(
                Box::new(resolver),
                "example.net".to_string(),
                Duration::from_secs(4),
            ),
            calls,
        )
    }

    fn connected() -> Arc<StateCell> {
        let cell = Arc::new(StateCell::new(ConnectionState::Disconnected));
        cell.set(ConnectionState::Connected);
        cell
    }

    #[test]
    fn test_fires_exactly_once() {
        let (mut probe, calls) = probe_with(ResolutionResult::AllDone);
        let state = connected();

        assert!(probe.fire(&state));
        assert!(!probe.fire(&state));
        assert!(!probe.fire(&state));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_gated_on_connected() {
        let (mut probe, calls) = probe_with(ResolutionResult::AllDone);
        let state = Arc::new(StateCell::new(ConnectionState::Disconnected));

        assert!(!probe.fire(&state));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        // The shot is not consumed by a gated call
        state.set(ConnectionState::Connected);
        assert!(probe.fire(&state));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failure_is_not_retried() {
        let (mut probe, calls) = probe_with(ResolutionResult::Failed {
            reason: "timed out".to_string(),
        });
        let state = connected();

        assert!(probe.fire(&state));
        assert!(!probe.fire(&state));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_family_decoding() {
        let v4 = RawAddress::from_ip(IpAddr::V4(Ipv4Addr::new(93, 184, 216, 34)));
        assert_eq!(v4.family, AF_INET);
        assert_eq!(
            v4.decode(),
            Some(IpAddr::V4(Ipv4Addr::new(93, 184, 216, 34)))
        );

        let v6 = RawAddress::from_ip(IpAddr::V6(Ipv6Addr::LOCALHOST));
        assert_eq!(v6.family, AF_INET6);
        assert_eq!(v6.decode(), Some(IpAddr::V6(Ipv6Addr::LOCALHOST)));

        let unknown = RawAddress {
            family: 16,
            bytes: [0; 16],
        };
        assert_eq!(unknown.decode(), None);
    }
}
