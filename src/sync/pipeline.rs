use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::core::{CalendarTime, Error, NetworkEndpoint, Result, SyncConfig, WifiStatus, NTP_PACKET_SIZE};
use crate::network::{Modem, SerialLink};
use crate::protocol::{AtCommand, Expect, NtpPacket, SyncState, IPD_PREFIX};
use crate::time::{packet_to_calendar, RtcClock};

/// Fetches network time through the modem and stores it in the clock chip.
///
/// Candidate servers are tried in order. A candidate whose channel opened is
/// always closed again before the next one is tried, whatever step failed.
pub struct TimeSync<L, C> {
    modem: Modem<L>,
    clock: C,
    config: SyncConfig,
    state: SyncState,
    keep_running: Arc<AtomicBool>,
}

impl<L: SerialLink, C: RtcClock> TimeSync<L, C> {
    /// Creates a pipeline, validating `config`
    pub fn new(modem: Modem<L>, clock: C, config: &SyncConfig) -> Result<Self> {
        config.validate()?;
        Ok(TimeSync {
            modem,
            clock,
            config: config.clone(),
            state: SyncState::Idle,
            keep_running: Arc::new(AtomicBool::new(true)),
        })
    }

    /// Shares a process-wide keep-running flag, checked between steps
    pub fn with_keep_running(mut self, keep_running: Arc<AtomicBool>) -> Self {
        self.keep_running = keep_running;
        self
    }

    /// The keep-running flag
    pub fn keep_running(&self) -> Arc<AtomicBool> {
        self.keep_running.clone()
    }

    /// Brings the modem up and joins the configured access point
    pub async fn connect(&mut self) -> Result<()> {
        self.config.validate_wifi()?;
        self.modem.init().await?;
        self.modem
            .join_wifi(&self.config.ssid, &self.config.password)
            .await
    }

    /// Wi-Fi association state
    pub fn get_wifi_status(&self) -> WifiStatus {
        self.modem.wifi_status()
    }

    /// Queries the candidate servers and returns local calendar time
    pub async fn get_time(&mut self) -> Result<CalendarTime> {
        if self.modem.wifi_status() != WifiStatus::Connected {
            warn!("Wi-Fi not connected, cannot query time");
            return Err(Error::WifiNotConnected);
        }

        info!(candidates = self.config.servers.len(), "requesting network time");
        self.state = SyncState::Idle;

        let servers = self.config.servers.clone();
        for (candidate, server) in servers.iter().enumerate() {
            if candidate > 0 && self.keep_running.load(Ordering::Relaxed) {
                tokio::time::sleep(self.config.timeouts.retry_pause).await;
            }
            if let Err(e) = self.check_running() {
                self.state = SyncState::Failed;
                return Err(e);
            }

            match self.query(candidate, server).await {
                Ok(packet) => {
                    debug!(
                        %server,
                        stratum = packet.stratum,
                        version = packet.version(),
                        mode = packet.mode(),
                        "time reply decoded"
                    );
                    let time = packet_to_calendar(&packet, self.config.utc_offset_secs());
                    info!(%server, %time, weekday = time.weekday_name(), "network time obtained");
                    self.state = SyncState::Decoded(time);
                    return Ok(time);
                }
                Err(Error::Cancelled) => {
                    self.state = SyncState::Failed;
                    return Err(Error::Cancelled);
                }
                Err(e) => {
                    warn!(%server, state = %self.state, error = %e, "time server failed");
                }
            }
        }

        warn!("all time servers failed");
        self.state = SyncState::Failed;
        Err(Error::AllServersExhausted)
    }

    /// Fetches network time and writes it to the clock
    pub async fn sync_rtc(&mut self) -> Result<CalendarTime> {
        let time = self.get_time().await?;
        self.clock.write_time(&time).map_err(|e| {
            warn!(error = %e, "clock write failed");
            e
        })?;
        info!(%time, "clock synchronized");
        Ok(time)
    }

    /// Reads the time currently stored in the clock
    pub fn read_rtc(&mut self) -> Result<CalendarTime> {
        self.clock.read_time()
    }

    /// State of the last attempt
    pub fn state(&self) -> &SyncState {
        &self.state
    }

    /// Configuration in use
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Modem, for bring-up outside `connect` or for the transport shim
    pub fn modem_mut(&mut self) -> &mut Modem<L> {
        &mut self.modem
    }

    /// Clock driver
    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Clock driver, mutably
    pub fn clock_mut(&mut self) -> &mut C {
        &mut self.clock
    }

    fn check_running(&self) -> Result<()> {
        if self.keep_running.load(Ordering::Relaxed) {
            Ok(())
        } else {
            Err(Error::Cancelled)
        }
    }

    async fn query(&mut self, candidate: usize, server: &NetworkEndpoint) -> Result<NtpPacket> {
        self.state = SyncState::Connecting { candidate };
        debug!(%server, "opening channel");

        let link_id = self.config.link_id;
        let open = AtCommand::OpenUdp {
            link_id,
            endpoint: server.clone(),
        };
        let timeout = self.config.timeouts.open;
        self.modem
            .transceiver_mut()
            .send_command(&open, Expect::Ok, timeout)
            .await?;

        let result = self.exchange(candidate).await;
        self.close_channel().await;
        result
    }

    async fn exchange(&mut self, candidate: usize) -> Result<NtpPacket> {
        let timeouts = self.config.timeouts.clone();
        let link_id = self.config.link_id;

        self.check_running()?;
        self.state = SyncState::Sending { candidate };
        let transceiver = self.modem.transceiver_mut();
        let announce = AtCommand::SendSize {
            link_id: Some(link_id),
            len: NTP_PACKET_SIZE,
        };
        transceiver
            .send_command(&announce, Expect::Prompt, timeouts.prompt)
            .await?;
        transceiver
            .send_bytes_and_wait(&NtpPacket::client_request(), Expect::SendOk, timeouts.confirm)
            .await?;

        self.check_running()?;
        self.state = SyncState::AwaitingResponse { candidate };
        let frame = self
            .modem
            .transceiver_mut()
            .extract_frame(IPD_PREFIX, timeouts.response)
            .await?;
        NtpPacket::decode(&frame.payload)
    }

    async fn close_channel(&mut self) {
        let close = AtCommand::Close {
            link_id: self.config.link_id,
        };
        let timeout = self.config.timeouts.close;
        if let Err(e) = self
            .modem
            .transceiver_mut()
            .send_command(&close, Expect::Ok, timeout)
            .await
        {
            debug!(error = %e, "closing channel failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Timeouts;
    use crate::testing::{ScriptedModem, SimulatedIsl1208};
    use crate::network::RxConsumer;
    use crate::time::Isl1208;
    use tokio::time::Instant;

    type TestSync = TimeSync<ScriptedModem, Isl1208<SimulatedIsl1208>>;

    const JULY_15_2022: u32 = 0xE67B_2C80;

    async fn connected(link: ScriptedModem, rx: RxConsumer) -> TestSync {
        let config = SyncConfig {
            ssid: "lab".to_string(),
            password: "secret".to_string(),
            ..SyncConfig::default()
        };
        let modem = Modem::new(link, rx, &config.timeouts);
        let mut sync = TimeSync::new(modem, Isl1208::new(SimulatedIsl1208::new()), &config).unwrap();
        sync.connect().await.unwrap();
        sync
    }

    #[tokio::test(start_paused = true)]
    async fn test_sync_writes_local_time() {
        let (mut link, rx) = ScriptedModem::new();
        link.script_wifi().script_time_server(JULY_15_2022);
        let transcript = link.transcript();
        let mut sync = connected(link, rx).await;

        let time = sync.sync_rtc().await.unwrap();
        assert_eq!(time.to_string(), "2022-07-15 08:00:00");
        assert_eq!(time.weekday, 5);
        assert_eq!(sync.read_rtc().unwrap(), time);
        assert_eq!(sync.state(), &SyncState::Decoded(time));

        assert_eq!(transcript.count("AT+CIPSTART=0,\"UDP\",\"pool.ntp.org\",123"), 1);
        assert_eq!(transcript.count([0x1B]), 1);
        assert_eq!(transcript.count("AT+CIPCLOSE=0"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_requires_wifi() {
        let (link, rx) = ScriptedModem::new();
        let config = SyncConfig::default();
        let modem = Modem::new(link, rx, &config.timeouts);
        let mut sync = TimeSync::new(modem, Isl1208::new(SimulatedIsl1208::new()), &config).unwrap();

        assert_eq!(sync.get_wifi_status(), WifiStatus::Disconnected);
        assert!(matches!(sync.get_time().await, Err(Error::WifiNotConnected)));
        assert!(matches!(sync.connect().await, Err(Error::Config(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_lost_reply_closes_and_fails_over() {
        let (mut link, rx) = ScriptedModem::new();
        link.script_wifi()
            .on("AT+CIPSTART", b"0,CONNECT\r\n\r\nOK\r\n")
            .on("AT+CIPSEND", b"\r\nOK\r\n> ")
            .on([0x1B], b"\r\nRecv 48 bytes\r\n\r\nSEND OK\r\n")
            .on("AT+CIPCLOSE", b"0,CLOSED\r\n\r\nOK\r\n");
        let transcript = link.transcript();
        let mut sync = connected(link, rx).await;

        let started = Instant::now();
        assert!(matches!(sync.get_time().await, Err(Error::AllServersExhausted)));
        assert_eq!(sync.state(), &SyncState::Failed);
        assert_eq!(transcript.count("AT+CIPCLOSE=0"), 3);
        assert_eq!(transcript.count([0x1B]), 3);

        // Three response waits and two pauses between candidates
        let timeouts = Timeouts::default();
        assert!(started.elapsed() >= timeouts.response * 3 + timeouts.retry_pause * 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_before_first_candidate() {
        let (mut link, rx) = ScriptedModem::new();
        link.script_wifi().script_time_server(JULY_15_2022);
        let transcript = link.transcript();
        let mut sync = connected(link, rx).await;

        sync.keep_running().store(false, Ordering::Relaxed);
        assert!(matches!(sync.sync_rtc().await, Err(Error::Cancelled)));
        assert_eq!(transcript.count("AT+CIPSTART"), 0);
        assert_eq!(sync.clock().bus().time_block_writes(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clock_failure_surfaces() {
        let (mut link, rx) = ScriptedModem::new();
        link.script_wifi().script_time_server(JULY_15_2022);
        let mut sync = connected(link, rx).await;
        sync.clock_mut()
            .bus_mut()
            .fail_transaction(1, embedded_hal::i2c::ErrorKind::Bus);

        let result = sync.sync_rtc().await;
        assert!(matches!(
            result,
            Err(Error::ClockBus { step: crate::core::BusStep::EnableSet, .. })
        ));
    }
}
