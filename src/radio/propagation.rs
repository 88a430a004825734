//! Radio propagation service.
//!
//! Radios hand every transmission to a shared [`PropagationModel`], which decides who hears it, at
//! what power and when. The model never calls back into radios directly; it schedules a
//! `Reception` event on each receiving station.

use log::{trace, warn};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use crate::error::Result;
use crate::kernel::{Event, ModelId, Scheduler, Transmission};
use crate::physics::Vec3;
use crate::protocol::Pdu;
use crate::radio::Band;

/// Propagation delay of light in vacuum.
pub const NANOS_PER_METER: f64 = 3.33564095;

/// Parameters of the log-distance path loss model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathLossParameters {
    /// Path loss exponent (n). 2.0 for free space, 2.7-3.5 for urban.
    pub path_loss_exponent: f64,
    /// Standard deviation for log-normal shadowing (σ) in dB.
    pub shadowing_sigma: f64,
    /// Path loss at the reference distance d₀ (1 meter) in dB.
    pub path_loss_at_reference_distance: f64,
    /// The thermal noise floor of the receiver in dBm.
    pub noise_floor: f64,
    /// Delay receptions by the distance travelled at the speed of light.
    pub propagation_delay: bool,
}

impl Default for PathLossParameters {
    fn default() -> Self {
        Self {
            path_loss_exponent: 2.0,
            shadowing_sigma: 0.0,
            path_loss_at_reference_distance: 40.0,
            noise_floor: -100.0,
            propagation_delay: true,
        }
    }
}

impl PathLossParameters {
    /// # Returns
    ///
    /// `Ok(())` if validation passes, `Err(String)` with error description otherwise.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if !(self.path_loss_exponent > 0.0) {
            return Err("Invalid path_loss_exponent, must be positive".to_string());
        }
        if !(self.shadowing_sigma >= 0.0) {
            return Err("Invalid shadowing_sigma, must be non-negative".to_string());
        }
        Ok(())
    }
}

/// Path loss in dB at `distance` meters, with a Normal(0, σ) shadowing sample drawn from `rng`.
pub fn calculate_path_loss(distance: f64, params: &PathLossParameters, rng: &mut ChaCha8Rng) -> f64 {
    if distance < 1.0 {
        return params.path_loss_at_reference_distance;
    }
    let path_loss = params.path_loss_at_reference_distance + 10.0 * params.path_loss_exponent * distance.log10();
    if params.shadowing_sigma == 0.0 {
        return path_loss;
    }
    match Normal::new(0.0, params.shadowing_sigma) {
        Ok(normal) => path_loss + normal.sample(rng),
        Err(_) => path_loss,
    }
}

/// Received power in dBm: `P_tx - PL(d)`.
pub fn calculate_rssi(distance: f64, tx_power_dbm: f64, params: &PathLossParameters, rng: &mut ChaCha8Rng) -> f64 {
    tx_power_dbm - calculate_path_loss(distance, params, rng)
}

/// The propagation service radios transmit through.
pub trait PropagationModel {
    /// Make `radio` reachable at `position` on `band`.
    fn attach(&mut self, radio: ModelId, position: Vec3, band: Band);

    fn set_position(&mut self, radio: ModelId, position: Vec3);

    /// Deliver `pdu` from `sender` to every other attached radio whose band overlaps.
    ///
    /// # Returns
    ///
    /// The number of receptions scheduled.
    fn transmit(&mut self, sched: &mut Scheduler, sender: ModelId, pdu: &Pdu, tx_power_dbm: f64, band: Band) -> Result<usize>;

    fn noise_floor(&self, band: Band) -> f64;
}

pub type SharedPropagation = Rc<RefCell<dyn PropagationModel>>;

#[derive(Debug, Clone, Copy)]
struct Attached {
    position: Vec3,
    band: Band,
}

/// Log-distance path loss with optional log-normal shadowing and speed-of-light delay.
#[derive(Debug)]
pub struct LogDistancePropagation {
    params: PathLossParameters,
    radios: BTreeMap<ModelId, Attached>,
    rng: ChaCha8Rng,
}

impl LogDistancePropagation {
    pub fn new(params: PathLossParameters, seed: u64) -> Self {
        Self { params, radios: BTreeMap::new(), rng: ChaCha8Rng::seed_from_u64(seed) }
    }

    pub fn shared(self) -> SharedPropagation {
        Rc::new(RefCell::new(self))
    }

    pub fn params(&self) -> &PathLossParameters {
        &self.params
    }

    fn delay_ns(&self, distance: f64) -> u64 {
        if self.params.propagation_delay { (distance * NANOS_PER_METER) as u64 } else { 0 }
    }
}

impl PropagationModel for LogDistancePropagation {
    fn attach(&mut self, radio: ModelId, position: Vec3, band: Band) {
        self.radios.insert(radio, Attached { position, band });
    }

    fn set_position(&mut self, radio: ModelId, position: Vec3) {
        if let Some(attached) = self.radios.get_mut(&radio) {
            attached.position = position;
        }
    }

    fn transmit(&mut self, sched: &mut Scheduler, sender: ModelId, pdu: &Pdu, tx_power_dbm: f64, band: Band) -> Result<usize> {
        let Some(origin) = self.radios.get(&sender).map(|attached| attached.position) else {
            warn!("[{}] transmitting radio is not attached to the propagation model", sender);
            return Ok(0);
        };

        let receivers: Vec<(ModelId, f64)> = self
            .radios
            .iter()
            .filter(|(id, attached)| **id != sender && attached.band.overlaps(&band))
            .map(|(id, attached)| (*id, origin.distance(attached.position)))
            .collect();

        let mut delivered = 0;
        for (receiver, distance) in receivers {
            let rx_power_dbm = calculate_rssi(distance, tx_power_dbm, &self.params, &mut self.rng);
            let delay = self.delay_ns(distance);
            trace!("[{}] {} reaches {} at {:.1} dBm after {}ns", sender, pdu.kind(), receiver, rx_power_dbm, delay);
            let reception = Transmission { pdu: pdu.clone(), rx_power_dbm, frequency_mhz: band.center_mhz };
            let id = sched.schedule_after_nanos(receiver, delay, Event::Reception(reception))?;
            if !id.is_rejected() {
                delivered += 1;
            }
        }
        Ok(delivered)
    }

    fn noise_floor(&self, _band: Band) -> f64 {
        self.params.noise_floor
    }
}
