//! Radio configuration: operating band, link rate presets and power figures.

use serde::{Deserialize, Serialize};

/// Kilobits per second to bytes per second.
pub const BYTES_PER_KILOBIT: f64 = 125.0;

/// A frequency band given by its centre and width.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Band {
    pub center_mhz: f64,
    pub width_mhz: f64,
}

impl Default for Band {
    /// The 2.4 GHz ISM band.
    fn default() -> Self {
        Band { center_mhz: 2442.5, width_mhz: 85.0 }
    }
}

impl Band {
    pub fn low_mhz(&self) -> f64 {
        self.center_mhz - self.width_mhz / 2.0
    }

    pub fn high_mhz(&self) -> f64 {
        self.center_mhz + self.width_mhz / 2.0
    }

    /// Bands that share any part of the spectrum can hear each other.
    pub fn overlaps(&self, other: &Band) -> bool {
        self.low_mhz() < other.high_mhz() && other.low_mhz() < self.high_mhz()
    }
}

/// Link rate presets for the supported PHYs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RadioProfile {
    #[serde(rename = "generic")]
    Generic,
    #[serde(rename = "ieee802-11bg")]
    Ieee80211bg,
    #[serde(rename = "ieee802-15-4")]
    Ieee802154,
}

impl RadioProfile {
    pub fn bandwidth_kbps(self) -> f64 {
        match self {
            RadioProfile::Generic => 250.0,
            RadioProfile::Ieee80211bg => 54_000.0,
            RadioProfile::Ieee802154 => 250.0,
        }
    }
}

/// Per-radio parameters. Every field has a default so scenario files only list overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RadioConfig {
    pub profile: Option<RadioProfile>,
    /// Overrides the profile rate.
    pub bandwidth_kbps: Option<f64>,
    pub band: Band,
    /// Minimum SNR in dB for a frame to be captured.
    pub snr_margin_db: f64,
    /// Transmit power; the radio always transmits at maximum power.
    pub max_power_dbm: f64,
    pub tx_current_ma: f64,
    pub rx_current_ma: f64,
    pub idle_current_ma: f64,
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            profile: None,
            bandwidth_kbps: None,
            band: Band::default(),
            snr_margin_db: 7.0,
            max_power_dbm: 0.0,
            tx_current_ma: 12.0,
            rx_current_ma: 15.0,
            idle_current_ma: 0.5,
        }
    }
}

impl RadioConfig {
    pub fn with_profile(profile: RadioProfile) -> Self {
        Self { profile: Some(profile), ..Self::default() }
    }

    pub fn bandwidth_kbps(&self) -> f64 {
        self.bandwidth_kbps.unwrap_or_else(|| self.profile.unwrap_or(RadioProfile::Generic).bandwidth_kbps())
    }

    /// Link rate in bytes per second, never zero.
    pub fn bytes_per_sec(&self) -> u64 {
        ((self.bandwidth_kbps() * BYTES_PER_KILOBIT).round() as u64).max(1)
    }

    /// Check the figures are physically meaningful.
    ///
    /// # Returns
    ///
    /// `Ok(())` if validation passes, `Err(String)` with error description otherwise.
    pub fn validate(&self) -> Result<(), String> {
        const MIN_POWER_DBM: f64 = -50.0;
        const MAX_POWER_DBM: f64 = 50.0;

        if !(self.bandwidth_kbps() > 0.0) {
            return Err(format!("Invalid bandwidth_kbps {}, must be positive", self.bandwidth_kbps()));
        }
        if !(MIN_POWER_DBM..=MAX_POWER_DBM).contains(&self.max_power_dbm) {
            return Err(format!(
                "max_power_dbm {} outside realistic range ({} to {} dBm)",
                self.max_power_dbm, MIN_POWER_DBM, MAX_POWER_DBM
            ));
        }
        if !(self.band.width_mhz > 0.0) {
            return Err(format!("Invalid band width {} MHz, must be positive", self.band.width_mhz));
        }
        if self.snr_margin_db < 0.0 {
            return Err("Invalid snr_margin_db, must be non-negative".to_string());
        }
        if self.tx_current_ma < 0.0 || self.rx_current_ma < 0.0 || self.idle_current_ma < 0.0 {
            return Err("Radio currents must be non-negative".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_generic_radio() {
        let config = RadioConfig::default();
        assert_eq!(config.bytes_per_sec(), 31_250);
        assert_eq!(config.band, Band { center_mhz: 2442.5, width_mhz: 85.0 });
        assert_eq!(config.snr_margin_db, 7.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn profile_sets_rate_and_override_wins() {
        assert_eq!(RadioConfig::with_profile(RadioProfile::Ieee80211bg).bytes_per_sec(), 6_750_000);
        let config = RadioConfig { bandwidth_kbps: Some(100.0), ..RadioConfig::with_profile(RadioProfile::Ieee80211bg) };
        assert_eq!(config.bytes_per_sec(), 12_500);
    }

    #[test]
    fn bands_overlap_by_spectrum() {
        let wide = Band::default();
        let narrow = Band { center_mhz: 2405.0, width_mhz: 2.0 };
        let elsewhere = Band { center_mhz: 868.0, width_mhz: 0.6 };
        assert!(wide.overlaps(&narrow));
        assert!(narrow.overlaps(&wide));
        assert!(!wide.overlaps(&elsewhere));
    }

    #[test]
    fn validation_rejects_nonsense() {
        let config = RadioConfig { bandwidth_kbps: Some(0.0), ..RadioConfig::default() };
        assert!(config.validate().unwrap_err().contains("bandwidth"));
        let config = RadioConfig { max_power_dbm: 80.0, ..RadioConfig::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: RadioConfig = toml::from_str("profile = \"ieee802-15-4\"\nmax_power_dbm = 3.0\n").unwrap();
        assert_eq!(config.profile, Some(RadioProfile::Ieee802154));
        assert_eq!(config.max_power_dbm, 3.0);
        assert_eq!(config.rx_current_ma, 15.0);
    }
}
