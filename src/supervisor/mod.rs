use std::sync::Arc;
use std::time::Duration;

use anyhow::Error;
use log::info;
use tokio::time::{sleep, Instant};

use crate::config::{BringupConfig, Config};
use crate::indicator::{Indicator, IndicatorColor, IndicatorDriver};
use crate::link::{ConnectionState, ConnectivityManager, Credentials, NetworkStack, StateCell};
use crate::net::EventDispatcher;
use crate::probe::{ResolutionProbe, Resolver};

/// Bring-up deadline and poll cadence, from configuration
#[derive(Clone, Copy, Debug)]
pub struct BringupOptions {
    pub timeout: Duration,
    pub interval: Duration,
}

impl From<&BringupConfig> for BringupOptions {
    fn from(config: &BringupConfig) -> Self {
        BringupOptions {
            timeout: Duration::from_millis(config.timeout_ms),
            interval: Duration::from_millis(config.poll_interval_ms),
        }
    }
}

/// Bounded poll of the link state. The device has nothing better to do
/// during bring-up, so a plain poll at the configured interval is enough;
/// the tokio clock keeps it testable.
pub async fn wait_for_connected(
    state: &Arc<StateCell>,
    options: &BringupOptions,
) -> Result<(), Error> {
    let deadline = Instant::now() + options.timeout;
    loop {
        if state.get() == ConnectionState::Connected {
            return Ok(());
        }
        if Instant::now() >= deadline {
            anyhow::bail!("link did not come up within {:?}", options.timeout);
        }
        sleep(options.interval).await;
    }
}

/// Wire everything together and run the supervisor: indicator to Idle,
/// event sinks registered, connect issued, bounded wait for the link, one
/// resolution probe after the lease has settled, then keep dispatching
/// events for the life of the process.
pub async fn run(
    config: Config,
    net: Box<dyn NetworkStack>,
    driver: Box<dyn IndicatorDriver>,
    resolver: Box<dyn Resolver>,
) -> Result<(), Error> {
    let mut indicator = Indicator::new(driver, config.indicator.pixels);
    indicator.set(IndicatorColor::Idle);

    let credentials = Credentials::from(&config.wifi);
    let mut manager = ConnectivityManager::new(credentials, net, indicator);

    let mut dispatcher = EventDispatcher::new();
    dispatcher.register(manager.network());

    manager.start()?;
    let state = manager.state_cell();
    let dispatcher_task = tokio::spawn(dispatcher.run(manager));

    let options = BringupOptions::from(&config.bringup);
    wait_for_connected(&state, &options).await?;
    info!("supervisor: link is up");

    // Give DHCP a moment to settle before the diagnostic lookup
    sleep(Duration::from_millis(config.bringup.probe_grace_ms)).await;

    let mut probe = ResolutionProbe::new(
        resolver,
        config.bringup.probe_target.clone(),
        Duration::from_millis(config.bringup.probe_timeout_ms),
    );
    probe.fire(&state);

    // Events keep flowing until the stack drops its senders
    let _ = dispatcher_task.await?;
    Ok(())
}
