use rtc_sync::network::Modem;
use rtc_sync::testing::{ScriptedModem, SimulatedIsl1208};
use rtc_sync::time::NTP_UNIX_OFFSET;
use rtc_sync::{Isl1208, SyncConfig, TimeSync};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_target(true)
        .init();

    let config = SyncConfig {
        ssid: "demo-ap".to_string(),
        password: "demo-pass".to_string(),
        ..SyncConfig::default()
    };

    // The scripted modem answers like a module whose first server is unreachable
    let now = chrono::Utc::now().timestamp() as u32;
    let (mut link, rx) = ScriptedModem::new();
    link.script_wifi()
        .on("AT+CIPSTART=0,\"UDP\",\"pool.ntp.org\"", b"\r\nERROR\r\n")
        .script_time_server(now.wrapping_add(NTP_UNIX_OFFSET));

    println!("Synchronizing clock:");
    println!("- Servers: {}", config.servers.iter().map(|s| s.to_string()).collect::<Vec<_>>().join(", "));
    println!("- UTC offset: {:+}h", config.utc_offset_hours);

    let modem = Modem::new(link, rx, &config.timeouts);
    let clock = Isl1208::new(SimulatedIsl1208::new());
    let mut sync = match TimeSync::new(modem, clock, &config) {
        Ok(sync) => sync,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            return;
        }
    };

    if let Err(e) = sync.connect().await {
        eprintln!("Modem bring-up failed: {}", e);
        return;
    }
    println!("- Wi-Fi: {:?}", sync.get_wifi_status());

    match sync.sync_rtc().await {
        Ok(time) => println!("\nNetwork time: {} ({})", time, time.weekday_name()),
        Err(e) => {
            eprintln!("Sync failed: {}", e);
            return;
        }
    }

    match sync.read_rtc() {
        Ok(time) => println!("Clock reads:  {} ({})", time, time.weekday_name()),
        Err(e) => eprintln!("Clock read failed: {}", e),
    }
}
