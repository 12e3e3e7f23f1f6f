//! # printhost
//!
//! Host-side controller for multi-microcontroller printer rigs. The
//! host talks to each MCU over a byte transport, frames the stream
//! into validated blocks, schedules outgoing actuator commands on a
//! shared device clock, and aggregates high-rate status reports into
//! debounced notifications and periodic snapshots.
//!
//! ## Architecture
//!
//! The workspace is organized as:
//!
//! 1. **printhost-core** - Clock, cancellation, state dispatch, errors
//! 2. **printhost-transport** - Serial, SSH and proxy transports plus
//!    block framing
//! 3. **printhost-control** - Command scheduling and state tracking
//! 4. **printhost-settings** - TOML host configuration
//! 5. **printhost** - Main binary that wires the crates together

pub use printhost_control::{
    CommandScheduler, InputMonitor, PowerMonitor, SchedulerConfig, StateSnapshot, StateTracker,
    TemperatureMonitor, TrackerConfig, TrackerService,
};
pub use printhost_core::{
    CancelToken, Clock, Error, ManualClock, Result, StateDispatcher, SystemClock, Timestamp,
};
pub use printhost_settings::{DeviceEntry, Settings, Transport};
pub use printhost_transport::{
    Alias, BlockCodec, Device, DeviceFactory, DeviceInfo, FrameReader, ProxyFactory,
    SerialFactory, SshConfig, SshFactory,
};

/// Initialize tracing with the standard filter and format
///
/// Honors `RUST_LOG`; defaults to `info` when unset.
pub fn init_logging() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());

    let fmt_layer = fmt::layer().with_target(true).with_level(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}
