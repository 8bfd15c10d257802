use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use bytes::Bytes;
use serialport::SerialPort;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::core::{Error, Result};

/// Read timeout of the receive thread, bounds how long shutdown takes
const READ_POLL: Duration = Duration::from_millis(100);

/// Receiving half of the byte channel, owned by the transceiver
pub type RxConsumer = mpsc::UnboundedReceiver<Bytes>;

/// Outbound half of a modem connection
pub trait SerialLink: Send {
    /// Writes every byte of `data` to the modem
    fn transmit(&mut self, data: &[u8]) -> Result<()>;
}

/// Producer side of the receive channel.
///
/// Owned by whatever receives bytes from the modem (the serial reader thread,
/// an interrupt shim or a test script). Pushing never blocks.
#[derive(Debug, Clone)]
pub struct RxProducer {
    tx: mpsc::UnboundedSender<Bytes>,
}

impl RxProducer {
    /// Hands one received byte to the consumer
    pub fn push_byte(&self, byte: u8) -> bool {
        self.push(&[byte])
    }

    /// Hands a received chunk to the consumer, false once the consumer is gone
    pub fn push(&self, data: &[u8]) -> bool {
        if data.is_empty() {
            return true;
        }
        self.tx.send(Bytes::copy_from_slice(data)).is_ok()
    }

    /// Whether the consumer has been dropped
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Creates a connected producer/consumer pair
pub fn rx_channel() -> (RxProducer, RxConsumer) {
    let (tx, rx) = mpsc::unbounded_channel();
    (RxProducer { tx }, rx)
}

/// Modem attached to a local serial port
pub struct SerialPortLink {
    port: Box<dyn SerialPort>,
    device: String,
}

impl SerialPortLink {
    /// Opens `device` and starts a reader thread feeding the returned consumer.
    ///
    /// The thread stops when `keep_running` is cleared, when the consumer is
    /// dropped, or on a read error other than a timeout.
    pub fn open(
        device: &str,
        baud_rate: u32,
        keep_running: Arc<AtomicBool>,
    ) -> Result<(Self, RxConsumer)> {
        let port = serialport::new(device, baud_rate)
            .timeout(READ_POLL)
            .open()?;
        let reader = port.try_clone()?;

        let (producer, consumer) = rx_channel();
        let name = device.to_string();
        thread::Builder::new()
            .name("modem-rx".to_string())
            .spawn(move || read_loop(reader, producer, keep_running, name))?;

        debug!(device, baud_rate, "serial link opened");
        Ok((
            SerialPortLink {
                port,
                device: device.to_string(),
            },
            consumer,
        ))
    }

    /// Device path the link was opened on
    pub fn device(&self) -> &str {
        &self.device
    }
}

impl SerialLink for SerialPortLink {
    fn transmit(&mut self, data: &[u8]) -> Result<()> {
        trace!(len = data.len(), "serial transmit");
        self.port.write_all(data)?;
        self.port.flush()?;
        Ok(())
    }
}

fn read_loop(
    mut port: Box<dyn SerialPort>,
    producer: RxProducer,
    keep_running: Arc<AtomicBool>,
    device: String,
) {
    let mut buf = [0u8; 64];
    while keep_running.load(Ordering::Relaxed) {
        match port.read(&mut buf) {
            Ok(0) => continue,
            Ok(n) => {
                if !producer.push(&buf[..n]) {
                    break;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::TimedOut => continue,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!(%device, error = %e, "serial read failed, stopping receiver");
                break;
            }
        }
    }
    debug!(%device, "serial receiver stopped");
}

impl SerialLink for Box<dyn SerialLink> {
    fn transmit(&mut self, data: &[u8]) -> Result<()> {
        (**self).transmit(data)
    }
}

/// Maps a closed receive channel into the error the transceiver reports
pub(crate) fn channel_closed() -> Error {
    Error::Io(io::Error::new(
        io::ErrorKind::BrokenPipe,
        "modem receive channel closed",
    ))
}
