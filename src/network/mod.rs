//! Modem link and the exchanges built on it
//!
//! This module owns everything between the serial port and the protocol
//! logic: the receive channel fed by the serial reader, the command
//! transceiver, embedded frame extraction, Wi-Fi bring-up and the stream
//! transport shim used by external protocol clients.

pub mod serial;
pub mod transceiver;
mod extractor;
pub mod modem;
pub mod shim;

pub use self::serial::{rx_channel, RxConsumer, RxProducer, SerialLink, SerialPortLink};
pub use self::transceiver::Transceiver;
pub use self::modem::Modem;
pub use self::shim::{StreamTransport, TransportShim, MAX_SEND_LEN};
