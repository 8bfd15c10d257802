use bytes::Buf;

use crate::core::{Error, Result, NTP_PACKET_SIZE};

/// First header byte of a client request: LI 0, version 3, mode 3 (client)
pub const CLIENT_REQUEST_HEADER: u8 = 0x1B;

/// Offset of the transmit timestamp within the packet
const TRANSMIT_TIMESTAMP_OFFSET: usize = 40;

/// Fields of a time protocol reply that the engine relies on.
///
/// Root delay, dispersion, reference id and the reference, origin and
/// receive timestamps travel on the wire but are not decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NtpPacket {
    /// Leap indicator, version and mode
    pub li_vn_mode: u8,
    /// Stratum of the server clock
    pub stratum: u8,
    /// Poll interval exponent
    pub poll: i8,
    /// Precision exponent
    pub precision: i8,
    /// Server transmit timestamp, 32.32 fixed point seconds since 1900
    pub transmit_timestamp: u64,
}

impl NtpPacket {
    /// Builds the 48 byte client request.
    ///
    /// Only the header byte is set; the origin timestamp stays zero, so the
    /// reply can only be used through its transmit timestamp.
    pub fn client_request() -> [u8; NTP_PACKET_SIZE] {
        let mut packet = [0u8; NTP_PACKET_SIZE];
        packet[0] = CLIENT_REQUEST_HEADER;
        packet
    }

    /// Decodes a server reply
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() != NTP_PACKET_SIZE {
            return Err(Error::frame_malformed(format!(
                "time packet is {} bytes, expected {}",
                data.len(),
                NTP_PACKET_SIZE
            )));
        }

        let mut buf = data;
        let li_vn_mode = buf.get_u8();
        let stratum = buf.get_u8();
        let poll = buf.get_i8();
        let precision = buf.get_i8();
        buf.advance(TRANSMIT_TIMESTAMP_OFFSET - 4);
        let transmit_timestamp = buf.get_u64();

        Ok(NtpPacket {
            li_vn_mode,
            stratum,
            poll,
            precision,
            transmit_timestamp,
        })
    }

    /// Leap indicator (0-3)
    pub fn leap(&self) -> u8 {
        self.li_vn_mode >> 6
    }

    /// Protocol version
    pub fn version(&self) -> u8 {
        (self.li_vn_mode >> 3) & 0x07
    }

    /// Association mode, 4 for a server reply
    pub fn mode(&self) -> u8 {
        self.li_vn_mode & 0x07
    }

    /// Integer seconds half of the transmit timestamp
    pub fn transmit_seconds(&self) -> u32 {
        (self.transmit_timestamp >> 32) as u32
    }
}
