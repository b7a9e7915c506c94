use anyhow::Error;
use netglow::prelude::*;

#[tokio::main]
async fn main() -> Result<(), Error> {
    env_logger::init();

    // Load the config file
    println!("Starting config...");
    let config = Config::load()?;

    // Pick the indicator driver for this platform
    println!("Starting indicator...");
    #[cfg(feature = "pi")]
    let driver: Box<dyn IndicatorDriver> = Box::new(GpioIndicator::new(&config.indicator)?);
    #[cfg(not(feature = "pi"))]
    let driver: Box<dyn IndicatorDriver> = Box::new(NullIndicator);

    // Off-device runs use the simulated stack and the host resolver
    println!("Starting supervisor...");
    let net = Box::new(SimNetworkStack::new());
    let resolver = Box::new(SystemResolver::new());

    netglow::supervisor::run(config, net, driver, resolver).await
}
