//! # printhost Transport
//!
//! MCU transports and block framing for printhost. Three transports
//! satisfy the same `Device` contract: local serial, SSH-tunneled
//! serial, and TCP-proxied serial. The `FrameReader` turns the raw
//! byte stream of any of them into validated protocol blocks.

pub mod alias;
pub mod codec;
pub mod device;
pub mod frame;
pub mod proxy;
pub mod serial;
pub mod ssh;

pub use alias::{Alias, DEFAULT_BAUD};
pub use codec::{crc16_ccitt, BlockCodec, BLOCK_OVERHEAD, SYNC_BYTE};
pub use device::{Device, DeviceFactory, DeviceInfo};
pub use frame::{Codec, FrameReader, MAX_BLOCK_SIZE};
pub use proxy::{LocalOpener, ProxyFactory, SerialPortOpener, DEFAULT_PROXY_PORT};
pub use serial::SerialFactory;
pub use ssh::{SshConfig, SshFactory};
