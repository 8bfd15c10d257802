//! Slicing binary frames out of the modem's text stream.
//!
//! Frames are decoded in place from the transceiver's framer with
//! [`IpdCodec`], which splits consumed bytes off the front of the buffer.
//! Whatever follows a frame stays buffered for the next call.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::codec::Decoder;
use tracing::{debug, trace};

use crate::core::{Error, Result};
use crate::protocol::{IpdCodec, IpdFrame, TOKEN_CLOSED};
use super::serial::SerialLink;
use super::transceiver::Transceiver;

impl<L: SerialLink> Transceiver<L> {
    /// Takes the first complete frame from the buffer, if one has arrived.
    ///
    /// Bytes already in the receive channel are pulled in first; nothing is
    /// awaited.
    pub fn try_extract_frame(&mut self, marker_prefix: &str) -> Result<Option<IpdFrame>> {
        self.drain_pending();

        let framer = self.framer_mut();
        let mut codec = IpdCodec::with_prefix(marker_prefix).capacity(framer.capacity());
        let frame = codec.decode(framer.buffer_mut());
        framer.refresh_event();

        if let Ok(Some(frame)) = &frame {
            trace!(len = frame.payload.len(), link_id = ?frame.link_id, "frame extracted");
        }
        frame
    }

    /// Waits up to `max_wait` for a complete frame.
    ///
    /// Fails with `FrameTimeout` when the frame never completes, with
    /// `FrameMalformed` when its header is unreadable and with `PeerClosed`
    /// when the modem reports the link closed before any frame.
    pub async fn extract_frame(&mut self, marker_prefix: &str, max_wait: Duration) -> Result<IpdFrame> {
        let deadline = Instant::now() + max_wait;

        loop {
            if let Some(frame) = self.try_extract_frame(marker_prefix)? {
                return Ok(frame);
            }
            if self.framer().contains_outside_frames(TOKEN_CLOSED, marker_prefix) {
                debug!("link closed by peer while waiting for a frame");
                return Err(Error::PeerClosed);
            }
            if !self.fill_until(deadline).await? {
                debug!(?max_wait, buffered = self.framer().len(), "frame wait timed out");
                return Err(Error::FrameTimeout);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::IPD_PREFIX;
    use crate::testing::{ipd_frame, ScriptedModem};
    use rand::Rng;

    fn idle_transceiver() -> (Transceiver<ScriptedModem>, crate::network::serial::RxProducer) {
        let (modem, rx) = ScriptedModem::new();
        let producer = modem.producer();
        (Transceiver::new(modem, rx), producer)
    }

    #[tokio::test(start_paused = true)]
    async fn test_back_to_back_frames() {
        let (mut transceiver, producer) = idle_transceiver();
        let mut stream = ipd_frame(Some(0), b"first");
        stream.extend(ipd_frame(Some(0), b"+IPD,0,3:abc"));
        producer.push(&stream);

        let wait = Duration::from_secs(1);
        let first = transceiver.extract_frame(IPD_PREFIX, wait).await.unwrap();
        assert_eq!(&first.payload[..], b"first");

        let second = transceiver.extract_frame(IPD_PREFIX, wait).await.unwrap();
        assert_eq!(&second.payload[..], b"+IPD,0,3:abc");

        assert!(matches!(
            transceiver.extract_frame(IPD_PREFIX, wait).await,
            Err(Error::FrameTimeout)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_frame_split_across_chunks() {
        let (mut transceiver, producer) = idle_transceiver();
        let payload: Vec<u8> = (0u8..48).collect();
        let stream = ipd_frame(Some(0), &payload);

        let mut rng = rand::thread_rng();
        let mut rest = &stream[..];
        while !rest.is_empty() {
            let n = rng.gen_range(1..=rest.len().min(7));
            producer.push(&rest[..n]);
            rest = &rest[n..];
        }

        let frame = transceiver
            .extract_frame(IPD_PREFIX, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(&frame.payload[..], &payload[..]);
        assert!(transceiver.framer().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_incomplete_frame_times_out() {
        let (mut transceiver, producer) = idle_transceiver();
        producer.push(b"+IPD,0,48:only a few bytes");

        let started = Instant::now();
        let result = transceiver.extract_frame(IPD_PREFIX, Duration::from_secs(10)).await;
        assert!(matches!(result, Err(Error::FrameTimeout)));
        assert!(started.elapsed() >= Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_length() {
        let (mut transceiver, producer) = idle_transceiver();
        producer.push(b"+IPD,0,-5:xxxxx");
        let result = transceiver.extract_frame(IPD_PREFIX, Duration::from_secs(1)).await;
        assert!(matches!(result, Err(Error::FrameMalformed(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_oversized_frame_does_not_wedge_receiver() {
        let (mut transceiver, producer) = idle_transceiver();
        producer.push(&ipd_frame(Some(0), &[7; 505]));

        let wait = Duration::from_secs(1);
        assert!(matches!(
            transceiver.extract_frame(IPD_PREFIX, wait).await,
            Err(Error::FrameMalformed(_))
        ));

        producer.push(&ipd_frame(Some(0), b"next"));
        let frame = transceiver.extract_frame(IPD_PREFIX, wait).await.unwrap();
        assert_eq!(&frame.payload[..], b"next");
    }

    #[test]
    fn test_leading_text_yields_room_for_frame() {
        let (mut transceiver, producer) = idle_transceiver();
        producer.push(&[b'.'; 500]);
        assert!(transceiver.try_extract_frame(IPD_PREFIX).unwrap().is_none());

        let payload = [0x24u8; 48];
        let stream = ipd_frame(Some(0), &payload);
        let (header, body) = stream.split_at(stream.len() - payload.len());
        producer.push(header);
        assert!(transceiver.try_extract_frame(IPD_PREFIX).unwrap().is_none());
        producer.push(body);

        let frame = transceiver.try_extract_frame(IPD_PREFIX).unwrap().unwrap();
        assert_eq!(&frame.payload[..], &payload[..]);
        assert!(!transceiver.framer().truncated());
    }

    #[tokio::test(start_paused = true)]
    async fn test_peer_closed() {
        let (mut transceiver, producer) = idle_transceiver();
        producer.push(b"0,CLOSED\r\n");
        let result = transceiver.extract_frame(IPD_PREFIX, Duration::from_secs(1)).await;
        assert!(matches!(result, Err(Error::PeerClosed)));
    }

    #[test]
    fn test_try_extract_keeps_trailing_text() {
        let (mut transceiver, producer) = idle_transceiver();
        let mut stream = ipd_frame(None, b"xy");
        stream.extend_from_slice(b"\r\nOK\r\n");
        producer.push(&stream);

        let frame = transceiver.try_extract_frame(IPD_PREFIX).unwrap().unwrap();
        assert_eq!(frame.link_id, None);
        assert_eq!(transceiver.framer().buffer(), b"\r\nOK\r\n");
        assert!(transceiver.framer().event().ready);
    }
}
