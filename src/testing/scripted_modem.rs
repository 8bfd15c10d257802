//! Modem stand-in that answers transmitted bytes from a script

use std::sync::{Arc, Mutex, MutexGuard};

use crate::core::{Result, NTP_PACKET_SIZE};
use crate::network::serial::{rx_channel, RxConsumer, RxProducer, SerialLink};
use crate::protocol::message::CLIENT_REQUEST_HEADER;
use crate::protocol::IPD_PREFIX;

const OK: &[u8] = b"\r\nOK\r\n";

struct Rule {
    prefix: Vec<u8>,
    reply: Vec<u8>,
    once: bool,
    used: bool,
}

/// Everything the engine transmitted, one entry per `transmit` call
#[derive(Clone, Default)]
pub struct Transcript {
    entries: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl Transcript {
    fn lock(&self) -> MutexGuard<'_, Vec<Vec<u8>>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record(&self, data: &[u8]) {
        self.lock().push(data.to_vec());
    }

    /// Number of transmissions
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether nothing was transmitted
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Copy of every transmission
    pub fn entries(&self) -> Vec<Vec<u8>> {
        self.lock().clone()
    }

    /// Transmissions rendered as text, control characters kept
    pub fn lines(&self) -> Vec<String> {
        self.lock()
            .iter()
            .map(|e| String::from_utf8_lossy(e).into_owned())
            .collect()
    }

    /// Number of transmissions starting with `prefix`
    pub fn count(&self, prefix: impl AsRef<[u8]>) -> usize {
        let prefix = prefix.as_ref();
        self.lock().iter().filter(|e| e.starts_with(prefix)).count()
    }
}

/// Serial link whose replies come from prefix-matched rules.
///
/// Each transmission is matched against the rules in insertion order; the
/// first live rule whose prefix starts the transmission has its reply pushed
/// into the receive channel, optionally in fixed-size chunks. Unmatched
/// transmissions get no reply, which looks like a silent modem.
pub struct ScriptedModem {
    producer: Option<RxProducer>,
    rules: Vec<Rule>,
    transcript: Transcript,
    chunk_size: Option<usize>,
}

impl ScriptedModem {
    /// Creates a modem and the consumer side of its receive channel
    pub fn new() -> (Self, RxConsumer) {
        let (producer, consumer) = rx_channel();
        let modem = ScriptedModem {
            producer: Some(producer),
            rules: Vec::new(),
            transcript: Transcript::default(),
            chunk_size: None,
        };
        (modem, consumer)
    }

    /// Answers every transmission starting with `prefix`
    pub fn on(&mut self, prefix: impl AsRef<[u8]>, reply: impl AsRef<[u8]>) -> &mut Self {
        self.add_rule(prefix, reply, false)
    }

    /// Answers the next transmission starting with `prefix`, then retires
    pub fn on_once(&mut self, prefix: impl AsRef<[u8]>, reply: impl AsRef<[u8]>) -> &mut Self {
        self.add_rule(prefix, reply, true)
    }

    /// Delivers replies in chunks of at most `size` bytes
    pub fn chunked(&mut self, size: usize) -> &mut Self {
        self.chunk_size = Some(size.max(1));
        self
    }

    fn add_rule(&mut self, prefix: impl AsRef<[u8]>, reply: impl AsRef<[u8]>, once: bool) -> &mut Self {
        self.rules.push(Rule {
            prefix: prefix.as_ref().to_vec(),
            reply: reply.as_ref().to_vec(),
            once,
            used: false,
        });
        self
    }

    /// Acknowledges modem bring-up and access point association
    pub fn script_wifi(&mut self) -> &mut Self {
        self.on("AT\r\n", OK)
            .on("AT+CWMODE", OK)
            .on("AT+CIPMUX", OK)
            .on("AT+CWQAP", OK)
            .on("AT+CWJAP", b"WIFI CONNECTED\r\nWIFI GOT IP\r\n\r\nOK\r\n")
    }

    /// Answers every time request with a reply carrying `seconds` since 1900
    pub fn script_time_server(&mut self, seconds: u32) -> &mut Self {
        let mut reply = b"\r\nRecv 48 bytes\r\n\r\nSEND OK\r\n".to_vec();
        reply.extend(ipd_frame(Some(0), &ntp_reply(seconds)));

        self.on("AT+CIPSTART", b"0,CONNECT\r\n\r\nOK\r\n")
            .on("AT+CIPSEND", b"\r\nOK\r\n> ")
            .on([CLIENT_REQUEST_HEADER], reply)
            .on("AT+CIPCLOSE", b"0,CLOSED\r\n\r\nOK\r\n")
    }

    /// Handle for pushing unsolicited bytes
    ///
    /// # Panics
    ///
    /// Panics after `close_receiver`.
    pub fn producer(&self) -> RxProducer {
        match &self.producer {
            Some(producer) => producer.clone(),
            None => panic!("receiver already closed"),
        }
    }

    /// Shared view of the transmissions
    pub fn transcript(&self) -> Transcript {
        self.transcript.clone()
    }

    /// Drops the modem's own producer so the channel closes once every
    /// handed-out producer is gone too
    pub fn close_receiver(&mut self) {
        self.producer = None;
    }

    fn deliver(&self, reply: &[u8]) {
        let Some(producer) = &self.producer else {
            return;
        };
        match self.chunk_size {
            Some(size) => {
                for chunk in reply.chunks(size) {
                    producer.push(chunk);
                }
            }
            None => {
                producer.push(reply);
            }
        }
    }
}

impl SerialLink for ScriptedModem {
    fn transmit(&mut self, data: &[u8]) -> Result<()> {
        self.transcript.record(data);

        let rule = self
            .rules
            .iter_mut()
            .find(|r| !(r.once && r.used) && data.starts_with(&r.prefix));
        if let Some(rule) = rule {
            rule.used = true;
            let reply = rule.reply.clone();
            self.deliver(&reply);
        }
        Ok(())
    }
}

/// Bytes of an embedded frame as the modem reports it
pub fn ipd_frame(link_id: Option<u8>, payload: &[u8]) -> Vec<u8> {
    let header = match link_id {
        Some(id) => format!("\r\n{}{},{}:", IPD_PREFIX, id, payload.len()),
        None => format!("\r\n{}{}:", IPD_PREFIX, payload.len()),
    };
    let mut frame = header.into_bytes();
    frame.extend_from_slice(payload);
    frame
}

/// Server reply carrying `seconds` (since 1900) in its transmit timestamp
pub fn ntp_reply(seconds: u32) -> [u8; NTP_PACKET_SIZE] {
    let mut reply = [0u8; NTP_PACKET_SIZE];
    reply[0] = 0x24;
    reply[1] = 2;
    reply[2] = 6;
    reply[3] = 0xEC;
    reply[40..44].copy_from_slice(&seconds.to_be_bytes());
    reply
}
