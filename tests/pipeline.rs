use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_test::{assert_err, assert_ok};

use rtc_sync::core::{NetworkEndpoint, SyncConfig, Timeouts};
use rtc_sync::network::{Modem, RxConsumer};
use rtc_sync::protocol::SyncState;
use rtc_sync::testing::{ipd_frame, ntp_reply, ScriptedModem, SimulatedIsl1208};
use rtc_sync::time::Isl1208;
use rtc_sync::{Error, RtcClock, TimeSync, WifiStatus};

type TestSync = TimeSync<ScriptedModem, Isl1208<SimulatedIsl1208>>;

const JULY_15_2022: u32 = 0xE67B_2C80;

fn config() -> SyncConfig {
    SyncConfig {
        ssid: "workshop".to_string(),
        password: "hunter2".to_string(),
        servers: vec![
            NetworkEndpoint::new("ntp-a.example", 123),
            NetworkEndpoint::new("ntp-b.example", 123),
            NetworkEndpoint::new("ntp-c.example", 123),
        ],
        ..SyncConfig::default()
    }
}

async fn connected(link: ScriptedModem, rx: RxConsumer, config: &SyncConfig) -> TestSync {
    let modem = Modem::new(link, rx, &config.timeouts);
    let mut sync = TimeSync::new(modem, Isl1208::new(SimulatedIsl1208::new()), config).unwrap();
    assert_ok!(sync.connect().await);
    assert_eq!(sync.get_wifi_status(), WifiStatus::Connected);
    sync
}

#[tokio::test(start_paused = true)]
async fn failover_to_third_candidate() {
    let (mut link, rx) = ScriptedModem::new();
    link.script_wifi()
        .on("AT+CIPSTART=0,\"UDP\",\"ntp-a.example\"", b"\r\nERROR\r\n")
        .on("AT+CIPSTART=0,\"UDP\",\"ntp-b.example\"", b"DNS Fail\r\n\r\nERROR\r\n")
        .script_time_server(JULY_15_2022);
    let transcript = link.transcript();
    let mut sync = connected(link, rx, &config()).await;

    let time = assert_ok!(sync.sync_rtc().await);
    assert_eq!(time.to_string(), "2022-07-15 08:00:00");
    assert_eq!(sync.state(), &SyncState::Decoded(time));

    // One write reached the chip, bracketed by the write-enable bit
    let chip = sync.clock().bus();
    assert_eq!(chip.time_block_writes(), 1);
    assert_eq!(chip.registers()[7] & 0x10, 0);

    // Channels that never opened are not closed; the one that did is
    assert_eq!(transcript.count("AT+CIPSTART"), 3);
    assert_eq!(transcript.count([0x1B]), 1);
    assert_eq!(transcript.count("AT+CIPCLOSE=0"), 1);
}

#[tokio::test(start_paused = true)]
async fn send_failure_still_closes_channel() {
    let (mut link, rx) = ScriptedModem::new();
    link.script_wifi()
        .on_once("AT+CIPSEND", b"\r\nERROR\r\n")
        .script_time_server(JULY_15_2022);
    let transcript = link.transcript();
    let mut sync = connected(link, rx, &config()).await;

    assert_ok!(sync.get_time().await);
    assert_eq!(transcript.count("AT+CIPSTART"), 2);
    assert_eq!(transcript.count("AT+CIPCLOSE=0"), 2);

    // Every open is followed by its close before the next open
    let sequence: Vec<&str> = transcript
        .lines()
        .iter()
        .filter_map(|l| {
            if l.starts_with("AT+CIPSTART") {
                Some("open")
            } else if l.starts_with("AT+CIPCLOSE") {
                Some("close")
            } else {
                None
            }
        })
        .collect();
    assert_eq!(sequence, ["open", "close", "open", "close"]);
}

#[tokio::test(start_paused = true)]
async fn every_candidate_failing_leaves_clock_untouched() {
    let (mut link, rx) = ScriptedModem::new();
    link.script_wifi().on("AT+CIPSTART", b"\r\nERROR\r\n");
    let mut sync = connected(link, rx, &config()).await;

    let err = assert_err!(sync.sync_rtc().await);
    assert!(matches!(err, Error::AllServersExhausted));
    assert_eq!(sync.state(), &SyncState::Failed);
    assert_eq!(sync.clock().bus().transactions(), 0);
}

#[tokio::test(start_paused = true)]
async fn reply_of_wrong_size_moves_on() {
    let (mut link, rx) = ScriptedModem::new();
    let mut short = b"\r\nSEND OK\r\n".to_vec();
    short.extend(ipd_frame(Some(0), &ntp_reply(JULY_15_2022)[..40]));
    link.script_wifi()
        .on_once([0x1B], short)
        .script_time_server(JULY_15_2022);
    let transcript = link.transcript();
    let mut sync = connected(link, rx, &config()).await;

    let time = assert_ok!(sync.get_time().await);
    assert_eq!(time.day, 15);
    assert_eq!(transcript.count([0x1B]), 2);
}

#[tokio::test(start_paused = true)]
async fn cancellation_between_candidates() {
    let keep_running = Arc::new(AtomicBool::new(true));
    let (mut link, rx) = ScriptedModem::new();
    link.script_wifi().on("AT+CIPSTART", b"\r\nERROR\r\n");
    let transcript = link.transcript();
    let mut sync = connected(link, rx, &config())
        .await
        .with_keep_running(keep_running.clone());

    let stopper = tokio::spawn(async move {
        // Lands inside the pause after the first candidate
        tokio::time::sleep(Duration::from_millis(500)).await;
        keep_running.store(false, Ordering::Relaxed);
    });

    let err = assert_err!(sync.get_time().await);
    stopper.await.unwrap();
    assert!(matches!(err, Error::Cancelled));
    assert_eq!(transcript.count("AT+CIPSTART"), 1);
}

#[tokio::test(start_paused = true)]
async fn utc_offset_applies_to_stored_time() {
    let west = SyncConfig {
        utc_offset_hours: -5,
        timeouts: Timeouts {
            response: Duration::from_secs(3),
            ..Timeouts::default()
        },
        ..config()
    };
    let (mut link, rx) = ScriptedModem::new();
    link.script_wifi().script_time_server(JULY_15_2022);
    let mut sync = connected(link, rx, &west).await;

    let time = assert_ok!(sync.sync_rtc().await);
    assert_eq!(time.to_string(), "2022-07-14 19:00:00");
    assert_eq!(time.weekday_name(), "Thursday");
    assert_eq!(assert_ok!(sync.clock_mut().read_time()), time);
}
