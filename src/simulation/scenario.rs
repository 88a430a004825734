//! Scenario loading, parsing, validation and wiring.
//!
//! A scenario file (TOML or JSON, chosen by extension) lists the models of one run by type tag.
//! Loading parses and validates it; [`build_scenario`] assigns ids in declaration order, places
//! bodies in the physics world, attaches radios to the propagation model and registers every
//! model with a fresh engine through the [`ModelType::build`] factory.

use anyhow::Context;
use log::{debug, info};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::error::{Result, SimError};
use crate::kernel::{Model, ModelId, ModelType, SimEngine};
use crate::physics::{BodyId, ContactBridge, KinematicBody, KinematicWorld, Vec3};
use crate::protocol::dot11::{Dcf, DcfParameters};
use crate::protocol::dot154::{CsmaCa, CsmaParameters};
use crate::protocol::{EthernetAddress, Ieee802154Address, LinkAddress, MacProtocol};
use crate::radio::{
    HalfDuplexRadio, LogDistancePropagation, PathLossParameters, RadioConfig, RadioProfile, RadioTrace, SharedPropagation,
};
use crate::simulation::probe::CollisionProbe;
use crate::simulation::station::RadioNode;
use crate::simulation::traffic::{TrafficAgent, TrafficConfig, TrafficPlan};

/// Error type for scenario loading failures.
#[derive(Debug, Error)]
pub enum ScenarioLoadError {
    #[error("Failed to read file: {0}")]
    FileRead(String),
    #[error("Failed to parse scenario: {0}")]
    Parse(String),
    #[error("Validation error: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioFormat {
    Toml,
    Json,
}

impl ScenarioFormat {
    /// `.json` files are JSON, everything else is TOML.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => ScenarioFormat::Json,
            _ => ScenarioFormat::Toml,
        }
    }
}

/// Fixed-step driving of the physics world.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
    /// Longest single physics advance; contacts are re-checked after each one.
    pub step_secs: f64,
    /// Fixed integration sub-step inside a step.
    pub substep_secs: f64,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self { step_secs: 0.1, substep_secs: 1.0 / 60.0 }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BodyConfig {
    pub position: Vec3,
    pub velocity: Vec3,
    pub radius: f64,
}

impl Default for BodyConfig {
    fn default() -> Self {
        Self { position: Vec3::ZERO, velocity: Vec3::ZERO, radius: 0.1 }
    }
}

/// One `[[models]]` entry.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ModelConfig {
    #[serde(rename = "type")]
    pub model_type: ModelType,
    #[serde(default)]
    pub name: Option<String>,
    /// Name of the physical entity this model is attached to.
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub body: Option<BodyConfig>,
    #[serde(default)]
    pub radio: RadioConfig,
    #[serde(default)]
    pub traffic: Option<TrafficConfig>,
    /// CSMA-CA overrides for 802.15.4 stations.
    #[serde(default)]
    pub csma: Option<CsmaParameters>,
}

fn default_seed() -> u64 {
    1
}

/// Root structure representing one simulation run.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Scenario {
    #[serde(default = "default_seed")]
    pub seed: u64,
    pub end_time_ms: u64,
    /// Host seconds per simulated second; 0 runs as fast as possible.
    #[serde(default)]
    pub real_time_scale: f64,
    #[serde(default)]
    pub start_paused: bool,
    #[serde(default)]
    pub physics: PhysicsConfig,
    #[serde(default)]
    pub propagation: PathLossParameters,
    pub models: Vec<ModelConfig>,
}

/// Load, parse and validate a scenario file.
///
/// # Parameters
///
/// * `path` - Path to the scenario file (`.toml` or `.json`)
///
/// # Returns
///
/// Parsed and validated Scenario or an error.
pub fn load_scenario(path: impl AsRef<Path>) -> std::result::Result<Scenario, ScenarioLoadError> {
    let path = path.as_ref();
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read file: {}", path.display()))
        .map_err(|e| ScenarioLoadError::FileRead(format!("{:#}", e)))?;
    parse_scenario(&data, ScenarioFormat::from_path(path))
}

/// Parse and validate scenario text.
pub fn parse_scenario(data: &str, format: ScenarioFormat) -> std::result::Result<Scenario, ScenarioLoadError> {
    let scenario: Scenario = match format {
        ScenarioFormat::Toml => toml::from_str(data).context("Invalid TOML format"),
        ScenarioFormat::Json => serde_json::from_str(data).context("Invalid JSON format"),
    }
    .map_err(|e| ScenarioLoadError::Parse(format!("{:#}", e)))?;

    validate_scenario(&scenario).map_err(ScenarioLoadError::Validation)?;
    Ok(scenario)
}

fn same_mac_family(a: ModelType, b: ModelType) -> bool {
    a.is_station() && a == b
}

/// Validate a parsed scenario.
///
/// # Returns
///
/// `Ok(())` if validation passes, `Err(String)` with error description otherwise.
pub fn validate_scenario(scenario: &Scenario) -> std::result::Result<(), String> {
    const MAX_MODELS: usize = 10000;

    if scenario.models.is_empty() {
        return Err("Scenario must contain at least one model".to_string());
    }
    if scenario.models.len() > MAX_MODELS {
        return Err(format!("Model count {} exceeds maximum of {}", scenario.models.len(), MAX_MODELS));
    }
    if scenario.end_time_ms == 0 {
        return Err("Invalid end_time_ms, must be positive".to_string());
    }
    if !(scenario.real_time_scale >= 0.0) {
        return Err("Invalid real_time_scale, must be non-negative".to_string());
    }
    let physics = &scenario.physics;
    if !(physics.step_secs > 0.0) || !(physics.substep_secs > 0.0) {
        return Err("Invalid physics parameters, step_secs and substep_secs must be positive".to_string());
    }
    scenario.propagation.validate()?;

    // Names must be unique and parents declared before their children
    let mut declared: HashMap<&str, (usize, ModelType)> = HashMap::new();
    for (index, model) in scenario.models.iter().enumerate() {
        let label = model.name.clone().unwrap_or_else(|| format!("#{}", index + 1));
        if let Some(parent) = &model.parent {
            if !declared.contains_key(parent.as_str()) {
                return Err(format!("Model {} names parent '{}' which is not declared before it", label, parent));
            }
        }
        if let Some(name) = &model.name {
            if declared.insert(name.as_str(), (index, model.model_type)).is_some() {
                return Err(format!("Duplicate model name found: {}", name));
            }
        }
    }

    for (index, model) in scenario.models.iter().enumerate() {
        let label = model.name.clone().unwrap_or_else(|| format!("#{}", index + 1));

        if let Some(body) = &model.body {
            if !(body.radius > 0.0) {
                return Err(format!("Model {} has invalid body radius {}, must be positive", label, body.radius));
            }
        }

        match model.model_type {
            ModelType::CollisionProbe => {
                if model.parent.is_none() && model.body.is_none() {
                    return Err(format!("Collision probe {} needs a parent or a body", label));
                }
                if model.traffic.is_some() || model.csma.is_some() {
                    return Err(format!("Collision probe {} cannot carry traffic or MAC settings", label));
                }
            }
            ModelType::Station80211 | ModelType::Station802154 => {
                model.radio.validate().map_err(|e| format!("Model {}: {}", label, e))?;
                if let Some(csma) = &model.csma {
                    if model.model_type != ModelType::Station802154 {
                        return Err(format!("Model {} has csma settings but is not an 802.15.4 station", label));
                    }
                    csma.validate().map_err(|e| format!("Model {}: {}", label, e))?;
                }
            }
        }

        if let Some(traffic) = &model.traffic {
            traffic.validate().map_err(|e| format!("Model {}: {}", label, e))?;
            if let Some(destination) = traffic.destination.as_deref().filter(|name| *name != "broadcast") {
                match declared.get(destination) {
                    None => return Err(format!("Model {} sends to unknown station '{}'", label, destination)),
                    Some((peer, _)) if *peer == index => return Err(format!("Model {} sends to itself", label)),
                    Some((_, peer_type)) if !same_mac_family(model.model_type, *peer_type) => {
                        return Err(format!("Model {} sends to '{}' which is not a {} station", label, destination, model.model_type));
                    }
                    Some(_) => {}
                }
            }
        }
    }

    Ok(())
}

/// Everything a driving loop needs for one run.
pub struct BuiltScenario<W = KinematicWorld> {
    pub seed: u64,
    pub engine: SimEngine,
    pub world: W,
    pub bridge: ContactBridge,
    pub propagation: SharedPropagation,
    /// Radios that ride on a physical body and must follow it.
    pub placements: Vec<(ModelId, BodyId)>,
}

/// Per-model inputs to a factory.
pub struct BuildContext<'a> {
    pub id: ModelId,
    pub config: &'a ModelConfig,
    pub parent: Option<ModelId>,
    pub position: Vec3,
    /// Resolved traffic destination; broadcast when absent.
    pub destination: Option<ModelId>,
    pub seed: u64,
    pub propagation: &'a SharedPropagation,
}

impl ModelType {
    /// Factory for the model behind this type tag.
    pub fn build(self, ctx: &BuildContext<'_>) -> Box<dyn Model> {
        match self {
            ModelType::Station80211 => {
                let mac = Dcf::new(ctx.id, EthernetAddress::for_node(ctx.id.0), DcfParameters::default(), ctx.seed);
                Box::new(station(ctx, self, RadioProfile::Ieee80211bg, mac))
            }
            ModelType::Station802154 => {
                let params = ctx.config.csma.clone().unwrap_or_default();
                let address = <Ieee802154Address as LinkAddress>::for_node(ctx.id.0);
                let mac = CsmaCa::new(ctx.id, address, params, ctx.seed);
                Box::new(station(ctx, self, RadioProfile::Ieee802154, mac))
            }
            ModelType::CollisionProbe => Box::new(CollisionProbe::new(ctx.id, ctx.config.name.clone(), ctx.parent)),
        }
    }
}

fn station<M: MacProtocol + 'static>(ctx: &BuildContext<'_>, model_type: ModelType, profile: RadioProfile, mac: M) -> RadioNode<M> {
    let mut config = ctx.config.radio.clone();
    if config.profile.is_none() && config.bandwidth_kbps.is_none() {
        config.profile = Some(profile);
    }
    ctx.propagation.borrow_mut().attach(ctx.id, ctx.position, config.band);

    let plan = ctx.config.traffic.as_ref().map(|traffic| {
        let destination = ctx.destination.map_or_else(M::Address::broadcast, |peer| M::Address::for_node(peer.0));
        TrafficPlan::new(destination, traffic)
    });
    let radio = HalfDuplexRadio::new(ctx.id, config, ctx.propagation.clone());
    let mut node = RadioNode::new(ctx.id, ctx.config.name.clone(), model_type, radio, mac, TrafficAgent::new(ctx.id, plan))
        .with_parent(ctx.parent);
    node.add_listener(Box::new(RadioTrace::new()));
    node
}

/// Wire a validated scenario into a fresh engine.
pub fn build_scenario(scenario: &Scenario) -> Result<BuiltScenario> {
    let mut engine = SimEngine::new();
    let mut world = KinematicWorld::new();
    let mut bridge = ContactBridge::new();
    let propagation = LogDistancePropagation::new(scenario.propagation.clone(), scenario.seed).shared();
    let mut placements = Vec::new();

    let ids: HashMap<&str, ModelId> = scenario
        .models
        .iter()
        .enumerate()
        .filter_map(|(index, model)| model.name.as_deref().map(|name| (name, ModelId(index as u32 + 1))))
        .collect();
    let resolve = |name: &str| ids.get(name).copied().ok_or_else(|| SimError::Config(format!("unknown model '{}'", name)));

    let mut bodies: HashMap<ModelId, BodyId> = HashMap::new();
    for (index, config) in scenario.models.iter().enumerate() {
        let id = ModelId(index as u32 + 1);
        let parent = config.parent.as_deref().map(resolve).transpose()?;

        let body = match (&config.body, parent) {
            (Some(body), _) => {
                let body_id: BodyId = id.0;
                world.add_body(body_id, KinematicBody { position: body.position, velocity: body.velocity, radius: body.radius });
                bridge.register_body(body_id);
                Some(body_id)
            }
            (None, Some(parent)) => bodies.get(&parent).copied(),
            (None, None) => None,
        };
        if let Some(body) = body {
            bodies.insert(id, body);
            bridge.add_collision_listener(body, id);
        }

        let position = body.and_then(|body| world.body(body)).map_or(Vec3::ZERO, |body| body.position);
        if config.model_type.is_station() {
            if let Some(body) = body {
                placements.push((id, body));
            }
        }

        let destination = match config.traffic.as_ref().and_then(|traffic| traffic.destination.as_deref()) {
            Some("broadcast") | None => None,
            Some(name) => Some(resolve(name)?),
        };
        let ctx = BuildContext {
            id,
            config,
            parent,
            position,
            destination,
            seed: scenario.seed ^ u64::from(id.0),
            propagation: &propagation,
        };
        engine.add_model(config.model_type.build(&ctx))?;
    }

    info!("built scenario with {} models ({} placed on bodies)", scenario.models.len(), placements.len());
    debug!("scenario seed {}, end at {} ms", scenario.seed, scenario.end_time_ms);
    Ok(BuiltScenario { seed: scenario.seed, engine, world, bridge, propagation, placements })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::station::{Station80211, Station802154};

    const TWO_STATIONS: &str = r#"
        seed = 7
        end_time_ms = 100

        [propagation]
        path_loss_exponent = 2.5

        [[models]]
        type = "station-802.15.4"
        name = "alpha"
        body = { position = [0.0, 0.0, 0.0] }
        traffic = { destination = "beta", interval_ms = 10, count = 3 }
        csma = { max_frame_retries = 1 }

        [[models]]
        type = "station-802.15.4"
        name = "beta"
        body = { position = [5.0, 0.0, 0.0], radius = 0.2 }

        [[models]]
        type = "collision-probe"
        name = "bumper"
        parent = "beta"
    "#;

    fn parse(data: &str) -> std::result::Result<Scenario, ScenarioLoadError> {
        parse_scenario(data, ScenarioFormat::Toml)
    }

    #[test]
    fn toml_scenario_with_defaults() {
        let scenario = parse(TWO_STATIONS).unwrap();
        assert_eq!(scenario.seed, 7);
        assert_eq!(scenario.real_time_scale, 0.0);
        assert_eq!(scenario.physics, PhysicsConfig::default());
        assert_eq!(scenario.propagation.path_loss_exponent, 2.5);
        assert_eq!(scenario.propagation.noise_floor, -100.0);
        assert_eq!(scenario.models[1].body.as_ref().unwrap().radius, 0.2);
        assert_eq!(scenario.models[0].csma.as_ref().unwrap().max_frame_retries, 1);
        assert_eq!(scenario.models[0].csma.as_ref().unwrap().min_be, 3);
        assert_eq!(scenario.models[2].model_type, ModelType::CollisionProbe);
    }

    #[test]
    fn json_is_chosen_by_extension() {
        assert_eq!(ScenarioFormat::from_path(Path::new("run.JSON")), ScenarioFormat::Json);
        assert_eq!(ScenarioFormat::from_path(Path::new("run.toml")), ScenarioFormat::Toml);
        let data = r#"{"end_time_ms": 5, "models": [{"type": "station-802.11"}]}"#;
        let scenario = parse_scenario(data, ScenarioFormat::Json).unwrap();
        assert_eq!(scenario.seed, 1);
        assert_eq!(scenario.models[0].model_type, ModelType::Station80211);
    }

    #[test]
    fn unknown_type_tag_is_a_parse_error() {
        let err = parse("end_time_ms = 5\n[[models]]\ntype = \"station-lora\"\n").unwrap_err();
        assert!(matches!(err, ScenarioLoadError::Parse(_)));
    }

    #[test]
    fn validation_rejects_misconfiguration() {
        let base = parse(TWO_STATIONS).unwrap();
        let check = |edit: &dyn Fn(&mut Scenario)| {
            let mut scenario = base.clone();
            edit(&mut scenario);
            validate_scenario(&scenario).unwrap_err()
        };

        assert!(check(&|s| s.models.clear()).contains("at least one model"));
        assert!(check(&|s| s.models[1].name = Some("alpha".to_string())).contains("Duplicate"));
        assert!(check(&|s| s.models.swap(1, 2)).contains("not declared before"));
        assert!(check(&|s| s.models[1].model_type = ModelType::Station80211).contains("not a station-802.15.4 station"));
        assert!(check(&|s| s.models[0].radio.max_power_dbm = 80.0).contains("realistic range"));
        assert!(check(&|s| s.propagation.path_loss_exponent = 0.0).contains("path_loss_exponent"));
        assert!(check(&|s| s.end_time_ms = 0).contains("end_time_ms"));
        assert!(check(&|s| s.models[2].parent = None).contains("needs a parent"));
        assert!(check(&|s| s.physics.substep_secs = 0.0).contains("physics"));
    }

    #[test]
    fn build_wires_models_in_declaration_order() {
        let scenario = parse(TWO_STATIONS).unwrap();
        let built = build_scenario(&scenario).unwrap();
        let engine = &built.engine;

        assert_eq!(engine.find_model_by_name("beta").unwrap(), Some(ModelId(2)));
        assert_eq!(built.placements, vec![(ModelId(1), 1), (ModelId(2), 2)]);
        assert_eq!(engine.model(ModelId(3)).unwrap().parent(), Some(ModelId(2)));

        let alpha = engine.model_as::<Station802154>(ModelId(1)).unwrap();
        let plan = alpha.traffic().plan().unwrap();
        assert_eq!(plan.destination, <Ieee802154Address as LinkAddress>::for_node(2));
        assert_eq!(plan.count, Some(3));
        assert_eq!(alpha.mac().params().max_frame_retries, 1);
        assert_eq!(alpha.radio().config().bytes_per_sec(), 31_250);
        assert!(engine.model_as::<Station80211>(ModelId(1)).is_none());
    }
}
