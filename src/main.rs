use std::sync::Arc;

use printhost::{init_logging, CancelToken, SystemClock};
use printhost_control::{InputMonitor, PowerMonitor, TemperatureMonitor, TrackerService};
use printhost_settings::{Settings, Transport};
use printhost_transport::proxy::{self, SerialPortOpener};
use printhost_transport::{
    Alias, DeviceFactory, DeviceInfo, ProxyFactory, SerialFactory, SshConfig, SshFactory,
};
use tracing::{info, warn};

/// Build the transport factory for one configured device entry
fn factory_for(entry: &printhost_settings::DeviceEntry) -> Box<dyn DeviceFactory> {
    let alias = Alias::parse(&entry.alias, &entry.pattern);
    match &entry.transport {
        Transport::Serial => Box::new(SerialFactory::new(vec![alias])),
        Transport::Ssh {
            host,
            user,
            port,
            compiler,
        } => {
            let config = SshConfig {
                host: host.clone(),
                user: user.clone(),
                port: *port,
                compiler: compiler.clone(),
            };
            Box::new(SshFactory::new(config, vec![alias]))
        }
        Transport::Proxy { addr } => Box::new(ProxyFactory::new(addr.clone(), vec![alias])),
    }
}

fn enumerate_devices(settings: &Settings, cancel: &CancelToken) -> Vec<DeviceInfo> {
    let mut devices = Vec::new();
    for entry in settings.enabled_devices() {
        let factory = factory_for(entry);
        match factory.device_names(cancel) {
            Ok(found) if found.is_empty() => {
                warn!("No endpoint matched '{}' ({})", entry.alias, entry.pattern);
            }
            Ok(found) => {
                for info in &found {
                    info!("Found {} at {} baud", info.name, info.baud);
                }
                devices.extend(found);
            }
            Err(e) => {
                warn!("Enumeration failed for '{}': {:#}", entry.alias, e);
            }
        }
    }
    devices
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging()?;

    let settings = Settings::load_or_default()?;
    info!(
        "Loaded configuration with {} device entries",
        settings.devices.len()
    );

    let cancel = CancelToken::new();
    let clock = Arc::new(SystemClock::new());

    // Optional embedded proxy server so other hosts can reach local
    // serial ports.
    let proxy_handle = if let Some(listen) = settings.proxy_listen.clone() {
        let listener = std::net::TcpListener::bind(&listen)?;
        info!("Proxy server listening on {}", listen);
        let server_cancel = cancel.clone();
        Some(std::thread::spawn(move || {
            if let Err(e) = proxy::serve(listener, Arc::new(SerialPortOpener), server_cancel) {
                warn!("Proxy server stopped: {:#}", e);
            }
        }))
    } else {
        None
    };

    let devices = enumerate_devices(&settings, &cancel);
    if devices.is_empty() && proxy_handle.is_none() {
        warn!("No devices found and no proxy configured; exiting");
        return Ok(());
    }

    let power = PowerMonitor::new(clock.clone());
    let temperature = TemperatureMonitor::new(clock.clone());
    let input = InputMonitor::new(clock.clone());

    let services = vec![
        TrackerService::spawn(power.tracker(), None, cancel.clone()),
        TrackerService::spawn(temperature.tracker(), None, cancel.clone()),
        TrackerService::spawn(input.tracker(), None, cancel.clone()),
    ];

    info!("Running; press ctrl-c to stop");
    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    cancel.cancel();

    for service in services {
        service.shutdown().await;
    }
    if let Some(handle) = proxy_handle {
        let _ = handle.join();
    }

    Ok(())
}
