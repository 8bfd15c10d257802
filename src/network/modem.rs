use tracing::{debug, info, warn};

use crate::core::{Error, Result, Timeouts, WifiStatus};
use crate::protocol::{AtCommand, Expect};
use super::serial::{RxConsumer, SerialLink};
use super::transceiver::Transceiver;

/// Wi-Fi modem: bring-up, access point association and the transceiver
/// that later exchanges run on
pub struct Modem<L> {
    transceiver: Transceiver<L>,
    wifi: WifiStatus,
    timeouts: Timeouts,
}

impl<L: SerialLink> Modem<L> {
    /// Creates a modem over a link and its receive channel
    pub fn new(link: L, rx: RxConsumer, timeouts: &Timeouts) -> Self {
        Self::from_transceiver(Transceiver::new(link, rx), timeouts)
    }

    /// Wraps an existing transceiver
    pub fn from_transceiver(transceiver: Transceiver<L>, timeouts: &Timeouts) -> Self {
        Modem {
            transceiver,
            wifi: WifiStatus::Disconnected,
            timeouts: timeouts.clone(),
        }
    }

    /// Checks the modem answers, selects station mode and enables multiple links
    pub async fn init(&mut self) -> Result<()> {
        info!("initializing modem");

        self.transceiver
            .send_command(&AtCommand::Probe, Expect::Ok, self.timeouts.probe)
            .await
            .map_err(|e| {
                warn!(error = %e, "modem not responding");
                e
            })?;

        self.transceiver
            .send_command(&AtCommand::StationMode, Expect::Ok, self.timeouts.setup)
            .await?;
        self.transceiver
            .send_command(&AtCommand::Multiplex(true), Expect::Ok, self.timeouts.setup)
            .await?;

        debug!("modem initialized");
        Ok(())
    }

    /// Leaves any current access point and joins `ssid`
    pub async fn join_wifi(&mut self, ssid: &str, password: &str) -> Result<()> {
        if ssid.is_empty() {
            return Err(Error::invalid_param("SSID is empty"));
        }

        info!(ssid, "joining access point");
        self.wifi = WifiStatus::Connecting;

        if let Err(e) = self
            .transceiver
            .send_command(&AtCommand::QuitAp, Expect::Ok, self.timeouts.setup)
            .await
        {
            debug!(error = %e, "leaving previous access point failed");
        }

        let join = AtCommand::JoinAp {
            ssid: ssid.to_string(),
            password: password.to_string(),
        };
        match self
            .transceiver
            .send_command(&join, Expect::Ok, self.timeouts.join)
            .await
        {
            Ok(()) => {
                self.wifi = WifiStatus::Connected;
                info!(ssid, "Wi-Fi connected");
                Ok(())
            }
            Err(e) => {
                self.wifi = WifiStatus::Error;
                warn!(ssid, error = %e, "Wi-Fi connection failed");
                Err(e)
            }
        }
    }

    /// Current association state
    pub fn wifi_status(&self) -> WifiStatus {
        self.wifi
    }

    /// Response budgets
    pub fn timeouts(&self) -> &Timeouts {
        &self.timeouts
    }

    /// Transceiver for further exchanges
    pub fn transceiver(&self) -> &Transceiver<L> {
        &self.transceiver
    }

    /// Transceiver for further exchanges, mutably
    pub fn transceiver_mut(&mut self) -> &mut Transceiver<L> {
        &mut self.transceiver
    }
}
