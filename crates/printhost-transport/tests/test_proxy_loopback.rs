//! Full proxy wire protocol over a loopback connection: device
//! listing, open handshake, and bidirectional block traffic, without
//! touching real hardware.

use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::Arc;

use printhost_core::CancelToken;
use printhost_transport::proxy::{self, LocalOpener, ProxyFactory};
use printhost_transport::{Alias, BlockCodec, Device, DeviceFactory, DeviceInfo, FrameReader};

/// Pretend serial port that echoes every block the client writes and
/// then emits one canned block of its own.
struct EchoOpener;

impl LocalOpener for EchoOpener {
    fn list(&self) -> printhost_core::Result<Vec<String>> {
        Ok(vec![
            "/dev/ttyACM0".to_string(),
            "/dev/ttyUSB3".to_string(),
        ])
    }

    fn open(
        &self,
        endpoint: &str,
        baud: u32,
    ) -> printhost_core::Result<(Box<dyn Read + Send>, Box<dyn Write + Send>)> {
        assert_eq!(endpoint, "/dev/ttyACM0");
        assert_eq!(baud, 115200);
        let (reader, writer) = pipe::new();
        Ok((Box::new(reader), Box::new(writer)))
    }
}

/// Minimal in-memory pipe so the opener can loop written bytes back.
mod pipe {
    use std::collections::VecDeque;
    use std::io::{Read, Write};
    use std::sync::{Arc, Condvar, Mutex};

    #[derive(Default)]
    struct Shared {
        data: Mutex<VecDeque<u8>>,
        ready: Condvar,
    }

    pub struct PipeReader(Arc<Shared>);
    pub struct PipeWriter(Arc<Shared>);

    pub fn new() -> (PipeReader, PipeWriter) {
        let shared = Arc::new(Shared::default());
        (PipeReader(shared.clone()), PipeWriter(shared))
    }

    impl Read for PipeReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let mut data = self.0.data.lock().unwrap();
            while data.is_empty() {
                if Arc::strong_count(&self.0) == 1 {
                    return Ok(0);
                }
                let (guard, _) = self
                    .0
                    .ready
                    .wait_timeout(data, std::time::Duration::from_millis(20))
                    .unwrap();
                data = guard;
            }
            let n = buf.len().min(data.len());
            for slot in buf.iter_mut().take(n) {
                *slot = data.pop_front().unwrap();
            }
            Ok(n)
        }
    }

    impl Write for PipeWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            let mut data = self.0.data.lock().unwrap();
            data.extend(buf.iter().copied());
            self.0.ready.notify_all();
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Drop for PipeWriter {
        fn drop(&mut self) {
            self.0.ready.notify_all();
        }
    }
}

fn start_server() -> (String, CancelToken) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind loopback");
    let addr = listener.local_addr().unwrap().to_string();
    let cancel = CancelToken::new();
    let server_cancel = cancel.clone();
    std::thread::spawn(move || {
        proxy::serve(listener, Arc::new(EchoOpener), server_cancel).unwrap();
    });
    (addr, cancel)
}

#[test]
fn test_device_listing_with_alias_filter() {
    let (addr, cancel) = start_server();
    let factory = ProxyFactory::new(
        addr,
        vec![Alias::parse("toolhead", "/dev/ttyACM*@115200")],
    );

    let infos = factory.device_names(&CancelToken::new()).unwrap();
    assert_eq!(infos.len(), 1);
    assert_eq!(infos[0].alias, "toolhead");
    assert_eq!(infos[0].endpoint, "/dev/ttyACM0");
    assert_eq!(infos[0].baud, 115200);

    cancel.cancel();
}

#[test]
fn test_open_and_echo_block_roundtrip() {
    let (addr, cancel) = start_server();
    let factory = ProxyFactory::new(addr, vec![]);
    let info = DeviceInfo::new("toolhead", "/dev/ttyACM0", 115200);

    let mut device: Box<dyn Device> = factory.open(&info, &CancelToken::new()).unwrap();

    let codec = BlockCodec::new();
    let block = codec.encode(1, &[0x10, 0x20, 0x30, 0x40]).unwrap();
    device.write(&block).unwrap();
    device.flush().unwrap();

    // The echo opener loops the bytes straight back; frame them.
    let mut reader = FrameReader::new(device, Box::new(BlockCodec::new()));
    let mut out = vec![0u8; reader.buffer_capacity()];
    let size = reader.read_block(&mut out).unwrap();
    assert_eq!(size, 4);
    assert_eq!(&out[..block.len()], &block[..]);

    cancel.cancel();
}

#[test]
fn test_noise_then_block_through_proxy() {
    let (addr, cancel) = start_server();
    let factory = ProxyFactory::new(addr, vec![]);
    let info = DeviceInfo::new("toolhead", "/dev/ttyACM0", 115200);

    let mut device = factory.open(&info, &CancelToken::new()).unwrap();
    let codec = BlockCodec::new();
    let block = codec.encode(3, &[0xAB]).unwrap();
    device.write(&[0x00, 0x11, 0x22]).unwrap();
    device.write(&block).unwrap();
    device.flush().unwrap();

    let mut reader = FrameReader::new(device, Box::new(BlockCodec::new()));
    let mut out = vec![0u8; reader.buffer_capacity()];
    assert_eq!(reader.read_block(&mut out).unwrap(), 1);

    cancel.cancel();
}
