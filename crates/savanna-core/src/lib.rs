//! Herd-and-pack behavioural simulation core.
//!
//! A herd of prey flocks across a flat plain toward a rally target using the
//! classic separation/cohesion/alignment rules, blended with a threat response
//! whenever predators close in. A small pack hunts the herd with split roles:
//! the centre predator stalks the herd head-on while the wing predator circles
//! the flank and closes in once its bearing has swept half a turn.
//!
//! The crate owns kinematic state (position, heading, speed) and behavioural
//! state only. Scene objects, colours, and frame timing belong to the host:
//! it drives [`WorldState::tick`] once per frame and receives restyle hints
//! through the [`ScenePresenter`] hook.

use ordered_float::OrderedFloat;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Div, Mul, Sub};
use thiserror::Error;
use tracing::debug;

/// Herd-centroid distance inside which the centre predator starts stalking.
const STALK_DISTANCE: f32 = 20.0;
/// Closest-prey distance at which the centre escalates into a chase.
const CHASE_DISTANCE: f32 = 7.0;
/// Distance scale converting nearest-predator range into a threat weight.
const THREAT_DISTANCE: f32 = 10.0;
/// Bearing sweep, in degrees, after which the flanking wing closes in.
const FLANK_SWEEP: f32 = 180.0;
/// Offset applied to the wing's heading while it orbits the herd.
const WING_ORBIT_OFFSET: f32 = 90.0;
/// Even three-way split used when no rule dominates.
const EVEN_SHARE: f32 = 1.0 / 3.0;

/// Planar vector on the XZ ground plane.
///
/// All motion is confined to the horizontal plane; there is no vertical
/// component anywhere in the simulation. Heading angles are in degrees with
/// 0° pointing along +Z and positive angles sweeping toward +X.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub z: f32,
}

impl Vec2 {
    /// The zero vector.
    pub const ZERO: Self = Self { x: 0.0, z: 0.0 };

    /// Construct a new vector.
    #[must_use]
    pub const fn new(x: f32, z: f32) -> Self {
        Self { x, z }
    }

    /// Euclidean length.
    #[must_use]
    pub fn length(self) -> f32 {
        (self.x * self.x + self.z * self.z).sqrt()
    }

    /// Unit vector in the same direction; the zero vector stays zero, which
    /// guards every downstream caller against division by zero.
    #[must_use]
    pub fn normalized(self) -> Self {
        let length = self.length();
        if length > 0.0 { self / length } else { self }
    }

    /// Vector pointing from `self` toward `other`.
    #[must_use]
    pub fn toward(self, other: Self) -> Self {
        other - self
    }

    /// Distance between two points.
    #[must_use]
    pub fn distance_to(self, other: Self) -> f32 {
        self.toward(other).length()
    }

    /// Direction vector for a heading angle in degrees.
    #[must_use]
    pub fn from_heading(degrees: f32) -> Self {
        let radians = degrees.to_radians();
        Self::new(radians.sin(), radians.cos())
    }

    /// Heading angle in degrees for this vector, via `atan2(x, z)`.
    ///
    /// Exact inverse of [`Vec2::from_heading`] on the unit circle modulo
    /// one full turn.
    #[must_use]
    pub fn heading(self) -> f32 {
        self.x.atan2(self.z).to_degrees()
    }
}

impl Add for Vec2 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.z + rhs.z)
    }
}

impl AddAssign for Vec2 {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sub for Vec2 {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.z - rhs.z)
    }
}

impl Mul<f32> for Vec2 {
    type Output = Self;

    fn mul(self, rhs: f32) -> Self {
        Self::new(self.x * rhs, self.z * rhs)
    }
}

impl Div<f32> for Vec2 {
    type Output = Self;

    fn div(self, rhs: f32) -> Self {
        Self::new(self.x / rhs, self.z / rhs)
    }
}

/// Position, heading and speed of one moving agent.
///
/// Behavioural code decides heading and speed; [`KinematicState::advance`]
/// only integrates motion and never reads behavioural fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct KinematicState {
    pub position: Vec2,
    /// Heading in degrees, unbounded (not wrapped into a canonical range).
    pub heading: f32,
    /// Speed in world units per second.
    pub speed: f32,
}

impl KinematicState {
    /// Construct a new kinematic record.
    #[must_use]
    pub const fn new(position: Vec2, heading: f32, speed: f32) -> Self {
        Self {
            position,
            heading,
            speed,
        }
    }

    /// Integrate motion over `dt` seconds along the current heading.
    pub fn advance(&mut self, dt: f32) {
        let step = self.speed * dt;
        self.position += Vec2::from_heading(self.heading) * step;
    }
}

/// Stable handle for a prey agent (its position in the herd roster).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PreyId(pub usize);

/// Stable handle for a predator agent (its position in the pack roster).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PredatorId(pub usize);

/// Handle addressing any agent across both rosters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgentId {
    Prey(PreyId),
    Predator(PredatorId),
}

/// RGB presentation hint forwarded to the host on behavioural state changes.
pub type ColorHint = [f32; 3];

/// Presentation sink notified when an agent changes behavioural state.
///
/// The simulation fires this hook and is indifferent to its effect; hosts
/// typically restyle the scene object bound to the agent.
pub trait ScenePresenter: Send {
    fn set_visual_state(&mut self, agent: AgentId, color: ColorHint);
}

/// No-op presenter.
#[derive(Debug, Default)]
pub struct NullPresenter;

impl ScenePresenter for NullPresenter {
    fn set_visual_state(&mut self, _agent: AgentId, _color: ColorHint) {}
}

/// Awareness states driving prey behaviour. `Dead` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum AwarenessState {
    Dead,
    #[default]
    Grazing,
    Separated,
    Running,
}

/// Hunting states driving predator behaviour. `Eating` is sticky; only a
/// reset clears it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum HuntingState {
    #[default]
    Prowling,
    Stalking,
    Chasing,
    Eating,
}

/// Blend weights applied to the three flocking rules.
///
/// The three weights sum to one after every recompute.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlockingWeights {
    pub separation: f32,
    pub cohesion: f32,
    pub alignment: f32,
}

impl Default for FlockingWeights {
    fn default() -> Self {
        Self {
            separation: EVEN_SHARE,
            cohesion: EVEN_SHARE,
            alignment: EVEN_SHARE,
        }
    }
}

impl FlockingWeights {
    /// Recompute the blend for a threat level.
    ///
    /// A separated prey puts everything on alignment so it steers straight
    /// back to the rally target. A leaderless herd falls back to an even
    /// split. Otherwise cohesion scales with the threat weight, separation
    /// takes half of the remainder, and alignment absorbs the rest.
    #[must_use]
    pub fn for_threat(threat: f32, separated: bool, leaderless: bool) -> Self {
        let (separation, cohesion) = if separated {
            (0.0, 0.0)
        } else if leaderless {
            (EVEN_SHARE, EVEN_SHARE)
        } else {
            let cohesion = threat / 3.0;
            ((1.0 - cohesion) / 2.0, cohesion)
        };
        Self {
            separation,
            cohesion,
            alignment: (1.0 - separation) - cohesion,
        }
    }

    /// Sum of the three weights.
    #[must_use]
    pub fn sum(&self) -> f32 {
        self.separation + self.cohesion + self.alignment
    }
}

/// Spawn-time description of one prey agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreySpawn {
    pub name: String,
    pub position: Vec2,
    pub heading: f32,
    pub speed: f32,
    #[serde(default)]
    pub leader: bool,
}

/// Spawn-time description of one predator agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredatorSpawn {
    pub name: String,
    pub position: Vec2,
    pub heading: f32,
    pub speed: f32,
    #[serde(default)]
    pub center: bool,
}

/// Per-state speed table, in world units per second.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpeedTable {
    pub grazing: f32,
    pub separated: f32,
    pub running: f32,
    pub dead: f32,
    pub prowling: f32,
    pub stalking_center: f32,
    pub stalking_wing: f32,
    pub chasing: f32,
    pub eating: f32,
}

impl Default for SpeedTable {
    fn default() -> Self {
        Self {
            grazing: 0.2,
            separated: 1.0,
            running: 1.5,
            dead: 0.0,
            prowling: 1.5,
            stalking_center: 0.5,
            stalking_wing: 4.0,
            chasing: 4.0,
            eating: 0.0,
        }
    }
}

impl SpeedTable {
    fn entries(&self) -> [f32; 9] {
        [
            self.grazing,
            self.separated,
            self.running,
            self.dead,
            self.prowling,
            self.stalking_center,
            self.stalking_wing,
            self.chasing,
            self.eating,
        ]
    }
}

/// Errors raised while validating simulation configuration.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    /// Indicates an invalid configuration value.
    #[error("invalid configuration: {0}")]
    Invalid(&'static str),
    /// The herd must carry exactly one flagged leader.
    #[error("herd must contain exactly one leader, found {0}")]
    LeaderCount(usize),
    /// An agent was declared with non-finite spawn kinematics.
    #[error("agent `{0}` has non-finite spawn kinematics")]
    NonFiniteSpawn(String),
}

/// Static configuration for a savanna simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavannaConfig {
    /// Prey roster in spawn order; exactly one entry is flagged as leader.
    pub herd: Vec<PreySpawn>,
    /// Predator roster in spawn order; the centre is listed first in the
    /// demo scenario so the wing picks up its target.
    pub pack: Vec<PredatorSpawn>,
    /// Rally point the herd drifts toward; static, untouched by resets.
    pub herd_target: Vec2,
    /// Radius inside which another prey counts as a neighbour.
    pub herd_near_distance: f32,
    /// Radius inside which a predator registers as a local threat.
    pub pack_near_distance: f32,
    /// Radius inside which a predator can see and target prey.
    pub pack_target_distance: f32,
    /// Proximity below which a predator has caught a prey.
    pub kill_distance: f32,
    /// Per-state speeds applied on behavioural transitions.
    pub speeds: SpeedTable,
}

impl Default for SavannaConfig {
    /// Thresholds and speeds only; populate the rosters before building a
    /// world, or validation rejects the empty herd.
    fn default() -> Self {
        Self {
            herd: Vec::new(),
            pack: Vec::new(),
            herd_target: Vec2::ZERO,
            herd_near_distance: 5.0,
            pack_near_distance: 10.0,
            pack_target_distance: 15.0,
            kill_distance: 1.0,
            speeds: SpeedTable::default(),
        }
    }
}

impl SavannaConfig {
    /// The classic ten-prey, two-predator hunt.
    #[must_use]
    pub fn demo() -> Self {
        let prey = |name: &str, x: f32, z: f32, leader: bool| PreySpawn {
            name: name.to_string(),
            position: Vec2::new(x, z),
            heading: 0.0,
            speed: 0.5,
            leader,
        };
        let predator = |name: &str, x: f32, z: f32, center: bool| PredatorSpawn {
            name: name.to_string(),
            position: Vec2::new(x, z),
            heading: -135.0,
            speed: 1.0,
            center,
        };
        Self {
            herd: vec![
                prey("Prey_1", 2.2, 3.28, true),
                prey("Prey_2", 0.0, 0.0, false),
                prey("Prey_3", 3.643, -2.52, false),
                prey("Prey_4", -5.054, -4.208, false),
                prey("Prey_5", 0.0, -9.868, false),
                prey("Prey_6", 5.252, -5.856, false),
                prey("Prey_7", -6.252, 0.0, false),
                prey("Prey_8", -2.132, 2.649, false),
                prey("Prey_9", 0.0, -5.383, false),
                prey("Prey_10", 12.128, 0.0, false),
            ],
            pack: vec![
                predator("Predator_Center", 20.0, 20.0, true),
                predator("Predator_Wing", 24.0, 22.0, false),
            ],
            herd_target: Vec2::new(-30.0, -30.0),
            ..Self::default()
        }
    }

    /// Validates the configuration before a world may be built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.herd.is_empty() {
            return Err(ConfigError::Invalid("herd roster must not be empty"));
        }
        let leaders = self.herd.iter().filter(|spawn| spawn.leader).count();
        if leaders != 1 {
            return Err(ConfigError::LeaderCount(leaders));
        }
        if !(self.herd_near_distance.is_finite() && self.herd_near_distance > 0.0)
            || !(self.pack_near_distance.is_finite() && self.pack_near_distance > 0.0)
            || !(self.pack_target_distance.is_finite() && self.pack_target_distance > 0.0)
        {
            return Err(ConfigError::Invalid("distance thresholds must be positive"));
        }
        if !(self.kill_distance.is_finite() && self.kill_distance > 0.0) {
            return Err(ConfigError::Invalid("kill_distance must be positive"));
        }
        if !(self.herd_target.x.is_finite() && self.herd_target.z.is_finite()) {
            return Err(ConfigError::Invalid("herd_target must be finite"));
        }
        if self
            .speeds
            .entries()
            .iter()
            .any(|speed| !speed.is_finite() || *speed < 0.0)
        {
            return Err(ConfigError::Invalid(
                "state speeds must be finite and non-negative",
            ));
        }
        for spawn in &self.herd {
            if !spawn_is_finite(spawn.position, spawn.heading, spawn.speed) {
                return Err(ConfigError::NonFiniteSpawn(spawn.name.clone()));
            }
        }
        for spawn in &self.pack {
            if !spawn_is_finite(spawn.position, spawn.heading, spawn.speed) {
                return Err(ConfigError::NonFiniteSpawn(spawn.name.clone()));
            }
        }
        Ok(())
    }
}

fn spawn_is_finite(position: Vec2, heading: f32, speed: f32) -> bool {
    position.x.is_finite()
        && position.z.is_finite()
        && heading.is_finite()
        && speed.is_finite()
        && speed >= 0.0
}

/// A prey agent: kinematics plus awareness bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prey {
    name: String,
    initial: KinematicState,
    kinematics: KinematicState,
    is_leader: bool,
    is_alerted: bool,
    state: AwarenessState,
    weights: FlockingWeights,
    threat_weight: f32,
}

impl Prey {
    fn from_spawn(spawn: &PreySpawn) -> Self {
        let initial = KinematicState::new(spawn.position, spawn.heading, spawn.speed);
        Self {
            name: spawn.name.clone(),
            initial,
            kinematics: initial,
            is_leader: spawn.leader,
            is_alerted: false,
            state: AwarenessState::Grazing,
            weights: FlockingWeights::default(),
            threat_weight: 0.0,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn kinematics(&self) -> KinematicState {
        self.kinematics
    }

    #[must_use]
    pub const fn state(&self) -> AwarenessState {
        self.state
    }

    #[must_use]
    pub const fn is_leader(&self) -> bool {
        self.is_leader
    }

    #[must_use]
    pub const fn is_alerted(&self) -> bool {
        self.is_alerted
    }

    #[must_use]
    pub const fn weights(&self) -> FlockingWeights {
        self.weights
    }

    #[must_use]
    pub const fn threat_weight(&self) -> f32 {
        self.threat_weight
    }
}

/// A predator agent: kinematics plus hunting bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Predator {
    name: String,
    initial: KinematicState,
    kinematics: KinematicState,
    is_center: bool,
    state: HuntingState,
    /// Non-owning reference to the prey being hunted; the predator only
    /// observes prey, it never creates or destroys them.
    target: Option<PreyId>,
    /// Snapshot bearing toward the herd centroid taken when the target was
    /// acquired; the flank sweep is measured against it.
    wing_angle: f32,
}

impl Predator {
    fn from_spawn(spawn: &PredatorSpawn) -> Self {
        let initial = KinematicState::new(spawn.position, spawn.heading, spawn.speed);
        Self {
            name: spawn.name.clone(),
            initial,
            kinematics: initial,
            is_center: spawn.center,
            state: HuntingState::Prowling,
            target: None,
            wing_angle: 0.0,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn kinematics(&self) -> KinematicState {
        self.kinematics
    }

    #[must_use]
    pub const fn state(&self) -> HuntingState {
        self.state
    }

    #[must_use]
    pub const fn is_center(&self) -> bool {
        self.is_center
    }

    #[must_use]
    pub const fn target(&self) -> Option<PreyId> {
        self.target
    }

    #[must_use]
    pub const fn wing_angle(&self) -> f32 {
        self.wing_angle
    }
}

/// Speed and colour applied when a prey settles into `state`.
fn prey_presentation(state: AwarenessState, leader: bool, speeds: &SpeedTable) -> (f32, ColorHint) {
    let tone = if leader { 0.5 } else { 1.0 };
    match state {
        AwarenessState::Dead => (speeds.dead, [tone, 0.0, 0.0]),
        AwarenessState::Grazing => (speeds.grazing, [0.0, tone, 0.0]),
        AwarenessState::Separated => (speeds.separated, [tone, tone, 0.0]),
        AwarenessState::Running => (speeds.running, [tone, tone / 2.0, 0.0]),
    }
}

/// Speed and colour applied when a predator settles into `state`.
fn predator_presentation(
    state: HuntingState,
    center: bool,
    speeds: &SpeedTable,
) -> (f32, ColorHint) {
    let tone = if center { 0.5 } else { 1.0 };
    match state {
        HuntingState::Eating => (speeds.eating, [0.0, 0.0, 0.0]),
        HuntingState::Prowling => (speeds.prowling, [tone, tone, 0.0]),
        HuntingState::Stalking => {
            let speed = if center {
                speeds.stalking_center
            } else {
                speeds.stalking_wing
            };
            (speed, [tone, tone / 2.0, 0.0])
        }
        HuntingState::Chasing => (speeds.chasing, [tone, 0.0, 0.0]),
    }
}

/// Average unit vector pushing `origin` away from each of `others`.
fn separation_heading(origin: Vec2, others: &[Vec2]) -> Vec2 {
    if others.is_empty() {
        return Vec2::ZERO;
    }
    let mut sum = Vec2::ZERO;
    for &other in others {
        sum += other.toward(origin).normalized();
    }
    (sum / others.len() as f32).normalized()
}

/// Unit vector from `origin` toward the centroid of `others`.
fn cohesion_heading(origin: Vec2, others: &[Vec2]) -> Vec2 {
    if others.is_empty() {
        return Vec2::ZERO;
    }
    let mut sum = Vec2::ZERO;
    for &other in others {
        sum += other;
    }
    let centroid = sum / others.len() as f32;
    origin.toward(centroid).normalized()
}

/// Normalised average of neighbour heading vectors.
fn alignment_heading(headings: &[f32]) -> Vec2 {
    if headings.is_empty() {
        return Vec2::ZERO;
    }
    let mut sum = Vec2::ZERO;
    for &heading in headings {
        sum += Vec2::from_heading(heading);
    }
    (sum / headings.len() as f32).normalized()
}

/// Averaged flee direction away from every visible hunter.
///
/// Each hunter contributes a unit vector away from itself, weighted by
/// `1 - distance / sum_of_distances`, so nearer hunters dominate. The weight
/// is relative to the hunters currently in view, not an absolute decay.
fn threat_heading(origin: Vec2, hunters: &[Vec2]) -> Vec2 {
    if hunters.is_empty() {
        return Vec2::ZERO;
    }
    let total: f32 = hunters
        .iter()
        .map(|&hunter| origin.distance_to(hunter))
        .sum();
    if total <= 0.0 {
        return Vec2::ZERO;
    }
    let mut sum = Vec2::ZERO;
    for &hunter in hunters {
        let weight = 1.0 - origin.distance_to(hunter) / total;
        sum += hunter.toward(origin).normalized() * weight;
    }
    (sum / hunters.len() as f32).normalized()
}

/// Weighted composite of the flocking rules and the threat response.
#[allow(clippy::too_many_arguments)]
fn flocking_heading(
    origin: Vec2,
    state: AwarenessState,
    is_leader: bool,
    weights: FlockingWeights,
    threat_weight: f32,
    neighbour_positions: &[Vec2],
    neighbour_headings: &[f32],
    hunter_positions: &[Vec2],
    rally: Vec2,
) -> Vec2 {
    let mut separation = separation_heading(origin, neighbour_positions);
    let cohesion = cohesion_heading(origin, neighbour_positions);
    let mut alignment = if is_leader || state == AwarenessState::Separated {
        origin.toward(rally).normalized()
    } else {
        alignment_heading(neighbour_headings)
    };
    // The retained share reduces to the threat weight itself; kept exactly
    // as tuned.
    let retained = 1.0 - (1.0 - threat_weight);
    let flee = 1.0 - threat_weight;
    alignment = alignment * retained + threat_heading(origin, hunter_positions) * flee;
    separation = separation * retained + separation_heading(origin, hunter_positions) * flee;
    separation * weights.separation + cohesion * weights.cohesion + alignment * weights.alignment
}

/// Frame debounce for the host callback: a tick only runs when the host has
/// advanced by exactly one frame since the last processed tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameClock {
    last_frame: u64,
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameClock {
    /// A fresh clock, positioned as if the host just played frame one.
    #[must_use]
    pub const fn new() -> Self {
        Self { last_frame: 1 }
    }

    /// Last frame index that produced a tick.
    #[must_use]
    pub const fn last_frame(&self) -> u64 {
        self.last_frame
    }

    const fn accepts(&self, frame: u64) -> bool {
        frame == self.last_frame + 1
    }
}

/// Outcome summary for one host frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickReport {
    /// Host frame index this report answers.
    pub frame: u64,
    /// Whether the tick actually ran (false when debounced).
    pub advanced: bool,
    /// Whether any prey spotted a predator and the whole herd was alerted.
    pub herd_alerted: bool,
    /// Prey brought down during this tick.
    pub prey_killed: usize,
    /// Prey still alive after this tick.
    pub live_prey: usize,
}

/// Immutable view of every agent captured at the start of a tick.
///
/// All neighbour discovery and heading math reads this snapshot, so no
/// agent observes another agent's same-tick writes.
struct TickSnapshot {
    prey: Vec<PreyView>,
    predators: Vec<PredatorView>,
    centroid: Vec2,
}

#[derive(Clone, Copy)]
struct PreyView {
    position: Vec2,
    heading: f32,
    state: AwarenessState,
}

#[derive(Clone, Copy)]
struct PredatorView {
    position: Vec2,
}

impl TickSnapshot {
    /// Other live prey within `range` of the prey at `idx`.
    fn live_neighbours(&self, idx: usize, range: f32) -> Vec<usize> {
        let origin = self.prey[idx].position;
        self.prey
            .iter()
            .enumerate()
            .filter(|&(other, view)| {
                other != idx
                    && view.state != AwarenessState::Dead
                    && origin.distance_to(view.position) < range
            })
            .map(|(other, _)| other)
            .collect()
    }

    /// Predators within `range` of `origin`, with their distances.
    fn predators_within(&self, origin: Vec2, range: f32) -> Vec<(usize, f32)> {
        self.predators
            .iter()
            .enumerate()
            .filter_map(|(idx, view)| {
                let distance = origin.distance_to(view.position);
                (distance < range).then_some((idx, distance))
            })
            .collect()
    }

    /// All prey (dead included) within `range` of `origin`, with distances.
    fn prey_within(&self, origin: Vec2, range: f32) -> Vec<(usize, f32)> {
        self.prey
            .iter()
            .enumerate()
            .filter_map(|(idx, view)| {
                let distance = origin.distance_to(view.position);
                (distance < range).then_some((idx, distance))
            })
            .collect()
    }
}

/// Everything a prey resolved for itself during the read phase.
struct PreyDecision {
    state: AwarenessState,
    weights: FlockingWeights,
    threat_weight: f32,
    heading: f32,
}

fn decide_prey(
    prey: &Prey,
    idx: usize,
    snapshot: &TickSnapshot,
    config: &SavannaConfig,
) -> PreyDecision {
    let origin = snapshot.prey[idx].position;
    let neighbours = snapshot.live_neighbours(idx, config.herd_near_distance);
    let hunters = snapshot.predators_within(origin, config.pack_near_distance);

    let mut state;
    let mut threat = 1.0_f32;
    let mut separated = false;
    if !hunters.is_empty() || prey.is_alerted {
        state = AwarenessState::Running;
        for &(_, distance) in &hunters {
            threat = threat.min(distance / THREAT_DISTANCE);
            if distance < config.kill_distance {
                state = AwarenessState::Dead;
            }
        }
    } else if !neighbours.is_empty() {
        state = AwarenessState::Grazing;
    } else {
        state = AwarenessState::Separated;
        separated = true;
    }
    let weights = FlockingWeights::for_threat(threat, separated, false);

    let neighbour_positions: Vec<Vec2> = neighbours
        .iter()
        .map(|&other| snapshot.prey[other].position)
        .collect();
    let neighbour_headings: Vec<f32> = neighbours
        .iter()
        .map(|&other| snapshot.prey[other].heading)
        .collect();
    let hunter_positions: Vec<Vec2> = hunters
        .iter()
        .map(|&(hunter, _)| snapshot.predators[hunter].position)
        .collect();

    let heading = flocking_heading(
        origin,
        state,
        prey.is_leader,
        weights,
        threat,
        &neighbour_positions,
        &neighbour_headings,
        &hunter_positions,
        config.herd_target,
    )
    .heading();

    PreyDecision {
        state,
        weights,
        threat_weight: threat,
        heading,
    }
}

/// Centre behaviour: stalk once near the herd, lock onto the closest visible
/// prey, escalate inside chase range, eat on contact.
fn update_center(
    predator: &mut Predator,
    origin: Vec2,
    centroid: Vec2,
    visible: &[(usize, f32)],
    kill_distance: f32,
) {
    if origin.distance_to(centroid) >= STALK_DISTANCE {
        return;
    }
    predator.state = HuntingState::Stalking;
    if visible.is_empty() {
        return;
    }
    if let Some((closest, distance)) = visible
        .iter()
        .copied()
        .min_by_key(|&(_, distance)| OrderedFloat(distance))
    {
        predator.target = Some(PreyId(closest));
        if distance < CHASE_DISTANCE {
            predator.state = HuntingState::Chasing;
        }
    }
    if visible
        .iter()
        .any(|&(_, distance)| distance < kill_distance)
    {
        predator.state = HuntingState::Eating;
    }
}

/// Wing behaviour: once a target is handed over, snapshot the bearing to the
/// herd and orbit until that bearing has swept past half a turn, then close
/// in. Eats on contact like the centre.
fn update_wing(
    predator: &mut Predator,
    origin: Vec2,
    centroid: Vec2,
    visible: &[(usize, f32)],
    carried: Option<PreyId>,
    kill_distance: f32,
) {
    let Some(quarry) = carried else {
        return;
    };
    if predator.target != Some(quarry) {
        predator.target = Some(quarry);
        predator.state = HuntingState::Stalking;
        predator.wing_angle = origin.toward(centroid).heading();
    }
    let bearing = origin.toward(centroid).heading();
    let sweep = bearing - predator.wing_angle;
    if sweep > FLANK_SWEEP || sweep < -FLANK_SWEEP {
        predator.state = HuntingState::Chasing;
    }
    if visible
        .iter()
        .any(|&(_, distance)| distance < kill_distance)
    {
        predator.state = HuntingState::Eating;
    }
}

/// Aggregate simulation state: the herd, the pack, and the rally target.
///
/// Agents are created once at construction and persist for the lifetime of
/// the world; a kill is a state change, never a removal. [`WorldState::reset`]
/// restores every agent in place.
pub struct WorldState {
    config: SavannaConfig,
    herd: Vec<Prey>,
    pack: Vec<Predator>,
    clock: FrameClock,
    presenter: Box<dyn ScenePresenter>,
}

impl fmt::Debug for WorldState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorldState")
            .field("config", &self.config)
            .field("herd", &self.herd.len())
            .field("pack", &self.pack.len())
            .field("clock", &self.clock)
            .finish()
    }
}

impl WorldState {
    /// Build a world from configuration with no presentation sink.
    pub fn new(config: SavannaConfig) -> Result<Self, ConfigError> {
        Self::with_presenter(config, Box::new(NullPresenter))
    }

    /// Build a world from configuration and a presentation sink.
    pub fn with_presenter(
        config: SavannaConfig,
        presenter: Box<dyn ScenePresenter>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let herd = config.herd.iter().map(Prey::from_spawn).collect();
        let pack = config.pack.iter().map(Predator::from_spawn).collect();
        let mut world = Self {
            config,
            herd,
            pack,
            clock: FrameClock::new(),
            presenter,
        };
        world.announce_initial_styles();
        Ok(world)
    }

    /// Each agent keeps its spawn speed until the first transition, but the
    /// host is told the initial state colour right away.
    fn announce_initial_styles(&mut self) {
        for idx in 0..self.herd.len() {
            let prey = &self.herd[idx];
            let (_, color) = prey_presentation(prey.state, prey.is_leader, &self.config.speeds);
            self.presenter
                .set_visual_state(AgentId::Prey(PreyId(idx)), color);
        }
        for idx in 0..self.pack.len() {
            let predator = &self.pack[idx];
            let (_, color) =
                predator_presentation(predator.state, predator.is_center, &self.config.speeds);
            self.presenter
                .set_visual_state(AgentId::Predator(PredatorId(idx)), color);
        }
    }

    /// Host entry point, invoked once per frame.
    ///
    /// The tick runs only when `frame` is exactly one past the last frame
    /// processed; re-entrant or skipped callbacks are reported and ignored.
    pub fn tick(&mut self, frame: u64, dt: f32) -> TickReport {
        if !self.clock.accepts(frame) {
            debug!(
                frame,
                last = self.clock.last_frame(),
                "ignoring out-of-sequence frame"
            );
            return TickReport {
                frame,
                ..TickReport::default()
            };
        }
        let mut report = self.step(dt);
        self.clock.last_frame = frame;
        report.frame = frame;
        report
    }

    /// Advance one tick unconditionally; [`WorldState::tick`] is the
    /// debounced host entry point.
    pub fn step(&mut self, dt: f32) -> TickReport {
        let snapshot = self.capture();
        let herd_alerted = self.stage_alert(&snapshot);
        let prey_killed = self.stage_flocking(&snapshot);
        self.stage_hunting(&snapshot);
        self.stage_advance(dt);
        TickReport {
            frame: self.clock.last_frame,
            advanced: true,
            herd_alerted,
            prey_killed,
            live_prey: self
                .herd
                .iter()
                .filter(|prey| prey.state != AwarenessState::Dead)
                .count(),
        }
    }

    fn capture(&self) -> TickSnapshot {
        let prey: Vec<PreyView> = self
            .herd
            .iter()
            .map(|prey| PreyView {
                position: prey.kinematics.position,
                heading: prey.kinematics.heading,
                state: prey.state,
            })
            .collect();
        let predators = self
            .pack
            .iter()
            .map(|predator| PredatorView {
                position: predator.kinematics.position,
            })
            .collect();
        let mut centroid = Vec2::ZERO;
        if !prey.is_empty() {
            let mut sum = Vec2::ZERO;
            for view in &prey {
                sum += view.position;
            }
            centroid = sum / prey.len() as f32;
        }
        TickSnapshot {
            prey,
            predators,
            centroid,
        }
    }

    /// Whole-herd awareness propagation: if any live prey has a predator in
    /// range this tick, every prey is alerted before its own evaluation.
    fn stage_alert(&mut self, snapshot: &TickSnapshot) -> bool {
        let range = self.config.pack_near_distance;
        let alerted = snapshot.prey.iter().any(|view| {
            view.state != AwarenessState::Dead
                && !snapshot.predators_within(view.position, range).is_empty()
        });
        if alerted {
            for prey in &mut self.herd {
                prey.is_alerted = true;
            }
        }
        alerted
    }

    /// Prey read phase (parallel, snapshot-only) followed by the serial
    /// apply phase. Returns the number of prey brought down.
    fn stage_flocking(&mut self, snapshot: &TickSnapshot) -> usize {
        let config = &self.config;
        let decisions: Vec<Option<PreyDecision>> = self
            .herd
            .par_iter()
            .enumerate()
            .map(|(idx, prey)| {
                if prey.state == AwarenessState::Dead {
                    return None;
                }
                Some(decide_prey(prey, idx, snapshot, config))
            })
            .collect();

        let mut killed = 0;
        for (idx, decision) in decisions.into_iter().enumerate() {
            let Some(decision) = decision else {
                continue;
            };
            let changed = decision.state != self.herd[idx].state;
            let prey = &mut self.herd[idx];
            prey.state = decision.state;
            prey.weights = decision.weights;
            prey.threat_weight = decision.threat_weight;
            prey.kinematics.heading = decision.heading;
            prey.is_alerted = false;
            if changed {
                let (speed, color) =
                    prey_presentation(decision.state, self.herd[idx].is_leader, &self.config.speeds);
                self.herd[idx].kinematics.speed = speed;
                self.presenter
                    .set_visual_state(AgentId::Prey(PreyId(idx)), color);
                if decision.state == AwarenessState::Dead {
                    killed += 1;
                    debug!(prey = %self.herd[idx].name, "prey brought down");
                }
            }
        }
        killed
    }

    /// Predator phase. Serial on purpose: the wing learns of the centre's
    /// target through a loop-carried hand-off, read before each predator's
    /// own update, so the acquisition arrives one tick late.
    fn stage_hunting(&mut self, snapshot: &TickSnapshot) {
        let kill_distance = self.config.kill_distance;
        let sight = self.config.pack_target_distance;
        let mut carried: Option<PreyId> = None;
        for idx in 0..self.pack.len() {
            if self.pack[idx].state == HuntingState::Eating {
                continue;
            }
            if self.pack[idx].target.is_some() {
                carried = self.pack[idx].target;
            }
            let origin = snapshot.predators[idx].position;
            let visible = snapshot.prey_within(origin, sight);
            let previous = self.pack[idx].state;

            let predator = &mut self.pack[idx];
            if predator.is_center {
                update_center(predator, origin, snapshot.centroid, &visible, kill_distance);
            } else {
                update_wing(
                    predator,
                    origin,
                    snapshot.centroid,
                    &visible,
                    carried,
                    kill_distance,
                );
            }

            // Pursuit always steers by the herd-centroid bearing; the wing
            // orbits at a right angle to it while stalking.
            let bearing = origin.toward(snapshot.centroid).normalized().heading();
            let state = self.pack[idx].state;
            let heading = if !self.pack[idx].is_center && state == HuntingState::Stalking {
                bearing - WING_ORBIT_OFFSET
            } else {
                bearing
            };
            self.pack[idx].kinematics.heading = heading;

            if state != previous {
                let (speed, color) =
                    predator_presentation(state, self.pack[idx].is_center, &self.config.speeds);
                self.pack[idx].kinematics.speed = speed;
                self.presenter
                    .set_visual_state(AgentId::Predator(PredatorId(idx)), color);
                if state == HuntingState::Eating {
                    debug!(predator = %self.pack[idx].name, "predator made a kill");
                }
            }
        }
    }

    /// Motion integration for every agent, dead or eating included (their
    /// speed is zero).
    fn stage_advance(&mut self, dt: f32) {
        for prey in &mut self.herd {
            prey.kinematics.advance(dt);
        }
        for predator in &mut self.pack {
            predator.kinematics.advance(dt);
        }
    }

    /// Restore every agent to its initial kinematics and behavioural state
    /// without reconstruction, then re-apply the state speed and colour.
    /// Idempotent; the rally target is untouched.
    pub fn reset(&mut self) {
        for idx in 0..self.herd.len() {
            let prey = &mut self.herd[idx];
            prey.kinematics = prey.initial;
            prey.state = AwarenessState::Grazing;
            prey.is_alerted = false;
            prey.threat_weight = 0.0;
            prey.weights = FlockingWeights::default();
            let (speed, color) =
                prey_presentation(AwarenessState::Grazing, prey.is_leader, &self.config.speeds);
            prey.kinematics.speed = speed;
            self.presenter
                .set_visual_state(AgentId::Prey(PreyId(idx)), color);
        }
        for idx in 0..self.pack.len() {
            let predator = &mut self.pack[idx];
            predator.kinematics = predator.initial;
            predator.state = HuntingState::Prowling;
            predator.target = None;
            predator.wing_angle = 0.0;
            let (speed, color) = predator_presentation(
                HuntingState::Prowling,
                predator.is_center,
                &self.config.speeds,
            );
            predator.kinematics.speed = speed;
            self.presenter
                .set_visual_state(AgentId::Predator(PredatorId(idx)), color);
        }
        self.clock = FrameClock::new();
    }

    /// Read an agent's kinematic state.
    #[must_use]
    pub fn kinematics(&self, agent: AgentId) -> Option<KinematicState> {
        match agent {
            AgentId::Prey(PreyId(idx)) => self.herd.get(idx).map(|prey| prey.kinematics),
            AgentId::Predator(PredatorId(idx)) => {
                self.pack.get(idx).map(|predator| predator.kinematics)
            }
        }
    }

    /// Overwrite an agent's kinematic state. Returns false for an unknown
    /// agent.
    pub fn set_kinematics(&mut self, agent: AgentId, state: KinematicState) -> bool {
        match agent {
            AgentId::Prey(PreyId(idx)) => {
                if let Some(prey) = self.herd.get_mut(idx) {
                    prey.kinematics = state;
                    return true;
                }
            }
            AgentId::Predator(PredatorId(idx)) => {
                if let Some(predator) = self.pack.get_mut(idx) {
                    predator.kinematics = state;
                    return true;
                }
            }
        }
        false
    }

    /// Replace the presentation sink.
    pub fn set_presenter(&mut self, presenter: Box<dyn ScenePresenter>) {
        self.presenter = presenter;
    }

    /// Mean position of the whole herd, dead prey included.
    #[must_use]
    pub fn herd_centroid(&self) -> Vec2 {
        if self.herd.is_empty() {
            return Vec2::ZERO;
        }
        let mut sum = Vec2::ZERO;
        for prey in &self.herd {
            sum += prey.kinematics.position;
        }
        sum / self.herd.len() as f32
    }

    /// The herd roster in spawn order.
    #[must_use]
    pub fn herd(&self) -> &[Prey] {
        &self.herd
    }

    /// The pack roster in spawn order.
    #[must_use]
    pub fn pack(&self) -> &[Predator] {
        &self.pack
    }

    /// Borrow a prey by handle.
    #[must_use]
    pub fn prey(&self, id: PreyId) -> Option<&Prey> {
        self.herd.get(id.0)
    }

    /// Borrow a predator by handle.
    #[must_use]
    pub fn predator(&self, id: PredatorId) -> Option<&Predator> {
        self.pack.get(id.0)
    }

    /// Returns an immutable reference to configuration.
    #[must_use]
    pub fn config(&self) -> &SavannaConfig {
        &self.config
    }

    /// The herd's rally point.
    #[must_use]
    pub fn herd_target(&self) -> Vec2 {
        self.config.herd_target
    }

    /// The frame debounce clock.
    #[must_use]
    pub const fn clock(&self) -> FrameClock {
        self.clock
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    const DT: f32 = 1.0 / 24.0;

    fn prey_spawn(name: &str, x: f32, z: f32, leader: bool) -> PreySpawn {
        PreySpawn {
            name: name.to_string(),
            position: Vec2::new(x, z),
            heading: 0.0,
            speed: 0.5,
            leader,
        }
    }

    fn predator_spawn(name: &str, x: f32, z: f32, center: bool) -> PredatorSpawn {
        PredatorSpawn {
            name: name.to_string(),
            position: Vec2::new(x, z),
            heading: 0.0,
            speed: 1.0,
            center,
        }
    }

    fn lone_prey_config() -> SavannaConfig {
        SavannaConfig {
            herd: vec![prey_spawn("Doe", 0.0, 0.0, true)],
            herd_target: Vec2::new(-30.0, -30.0),
            ..SavannaConfig::default()
        }
    }

    #[derive(Default, Clone)]
    struct RecordingPresenter {
        events: Arc<Mutex<Vec<(AgentId, ColorHint)>>>,
    }

    impl ScenePresenter for RecordingPresenter {
        fn set_visual_state(&mut self, agent: AgentId, color: ColorHint) {
            self.events.lock().expect("events lock").push((agent, color));
        }
    }

    #[test]
    fn normalized_has_unit_length_or_stays_zero() {
        let vector = Vec2::new(3.0, 4.0).normalized();
        assert!((vector.length() - 1.0).abs() < 1e-6);
        assert_eq!(Vec2::ZERO.normalized(), Vec2::ZERO);
    }

    #[test]
    fn heading_round_trips_modulo_full_turn() {
        for angle in [0.0_f32, 45.0, 90.0, 135.0, 180.0, -45.0, -135.0, 270.0, 370.0, -190.0] {
            let recovered = Vec2::from_heading(angle).heading();
            let difference = (recovered - angle).rem_euclid(360.0);
            assert!(
                difference < 1e-3 || difference > 360.0 - 1e-3,
                "angle {angle} came back as {recovered}"
            );
        }
    }

    #[test]
    fn heading_zero_points_along_positive_z() {
        let forward = Vec2::from_heading(0.0);
        assert!(forward.x.abs() < 1e-6);
        assert!((forward.z - 1.0).abs() < 1e-6);
        let right = Vec2::from_heading(90.0);
        assert!((right.x - 1.0).abs() < 1e-6);
        assert!(right.z.abs() < 1e-6);
    }

    #[test]
    fn advance_moves_along_heading() {
        let mut state = KinematicState::new(Vec2::ZERO, 90.0, 2.0);
        state.advance(0.5);
        assert!((state.position.x - 1.0).abs() < 1e-6);
        assert!(state.position.z.abs() < 1e-6);

        let mut still = KinematicState::new(Vec2::new(5.0, 5.0), 45.0, 0.0);
        still.advance(10.0);
        assert_eq!(still.position, Vec2::new(5.0, 5.0));
    }

    #[test]
    fn weights_always_sum_to_one() {
        for threat in [0.0_f32, 0.3, 0.5, 0.77, 1.0] {
            for (separated, leaderless) in [(false, false), (true, false), (false, true)] {
                let weights = FlockingWeights::for_threat(threat, separated, leaderless);
                assert!(
                    (weights.sum() - 1.0).abs() < 1e-6,
                    "threat {threat} separated {separated} leaderless {leaderless}"
                );
            }
        }
    }

    #[test]
    fn separated_weights_are_pure_alignment() {
        let weights = FlockingWeights::for_threat(1.0, true, false);
        assert_eq!(weights.separation, 0.0);
        assert_eq!(weights.cohesion, 0.0);
        assert!((weights.alignment - 1.0).abs() < 1e-6);
    }

    #[test]
    fn threat_scales_cohesion_down() {
        let weights = FlockingWeights::for_threat(0.6, false, false);
        assert!((weights.cohesion - 0.2).abs() < 1e-6);
        assert!((weights.separation - 0.4).abs() < 1e-6);
        assert!((weights.alignment - 0.4).abs() < 1e-6);
    }

    #[test]
    fn separation_points_away_from_neighbours() {
        let heading = separation_heading(Vec2::ZERO, &[Vec2::new(1.0, 0.0)]);
        assert!((heading.x + 1.0).abs() < 1e-6);
        assert!(heading.z.abs() < 1e-6);
        assert_eq!(separation_heading(Vec2::ZERO, &[]), Vec2::ZERO);
    }

    #[test]
    fn cohesion_points_at_neighbour_centroid() {
        let heading = cohesion_heading(Vec2::ZERO, &[Vec2::new(2.0, 0.0), Vec2::new(2.0, 2.0)]);
        let expected = Vec2::new(2.0, 1.0).normalized();
        assert!((heading.x - expected.x).abs() < 1e-6);
        assert!((heading.z - expected.z).abs() < 1e-6);
        assert_eq!(cohesion_heading(Vec2::ZERO, &[]), Vec2::ZERO);
    }

    #[test]
    fn alignment_averages_neighbour_headings() {
        let heading = alignment_heading(&[0.0, 90.0]);
        assert!((heading.heading() - 45.0).abs() < 1e-3);
        assert_eq!(alignment_heading(&[]), Vec2::ZERO);
    }

    #[test]
    fn threat_heading_favours_the_closer_hunter() {
        // Both hunters sit on +X, the closer at 2 units and the farther at 6;
        // the flee direction is straight down -X.
        let heading = threat_heading(Vec2::ZERO, &[Vec2::new(2.0, 0.0), Vec2::new(6.0, 0.0)]);
        assert!((heading.heading() + 90.0).abs() < 1e-3);
        assert_eq!(threat_heading(Vec2::ZERO, &[]), Vec2::ZERO);
    }

    #[test]
    fn config_validation_rejects_bad_rosters() {
        let empty = SavannaConfig::default();
        assert!(matches!(empty.validate(), Err(ConfigError::Invalid(_))));

        let mut two_leaders = lone_prey_config();
        two_leaders.herd.push(prey_spawn("Second", 1.0, 1.0, true));
        assert_eq!(two_leaders.validate(), Err(ConfigError::LeaderCount(2)));

        let mut bad_distance = lone_prey_config();
        bad_distance.herd_near_distance = 0.0;
        assert!(matches!(
            bad_distance.validate(),
            Err(ConfigError::Invalid(_))
        ));

        let mut bad_spawn = lone_prey_config();
        bad_spawn.herd[0].position.x = f32::NAN;
        assert_eq!(
            bad_spawn.validate(),
            Err(ConfigError::NonFiniteSpawn("Doe".to_string()))
        );
    }

    #[test]
    fn lone_prey_separates_and_heads_for_the_rally_point() {
        let mut world = WorldState::new(lone_prey_config()).expect("world");
        assert_eq!(world.herd()[0].kinematics().speed, 0.5);

        world.step(DT);
        let doe = &world.herd()[0];
        assert_eq!(doe.state(), AwarenessState::Separated);
        assert_eq!(doe.weights().separation, 0.0);
        assert_eq!(doe.weights().cohesion, 0.0);
        assert!((doe.weights().alignment - 1.0).abs() < 1e-6);
        assert!((doe.kinematics().heading + 135.0).abs() < 1e-3);
        assert_eq!(doe.kinematics().speed, 1.0);
    }

    #[test]
    fn grazing_prey_keeps_spawn_speed_and_even_weights() {
        let config = SavannaConfig {
            herd: vec![
                prey_spawn("Doe", 0.0, 0.0, true),
                prey_spawn("Buck", 1.0, 0.0, false),
            ],
            ..SavannaConfig::default()
        };
        let mut world = WorldState::new(config).expect("world");
        world.step(DT);
        for prey in world.herd() {
            assert_eq!(prey.state(), AwarenessState::Grazing);
            // Grazing is the initial state, so no transition ever fired and
            // the spawn speed is still in effect.
            assert_eq!(prey.kinematics().speed, 0.5);
            let weights = prey.weights();
            assert!((weights.separation - EVEN_SHARE).abs() < 1e-5);
            assert!((weights.cohesion - EVEN_SHARE).abs() < 1e-5);
            assert!((weights.alignment - EVEN_SHARE).abs() < 1e-5);
        }
    }

    #[test]
    fn prey_in_kill_range_dies_and_never_moves_again() {
        let config = SavannaConfig {
            herd: vec![prey_spawn("Doe", 0.0, 0.0, true)],
            pack: vec![predator_spawn("Alpha", 0.5, 0.0, true)],
            ..SavannaConfig::default()
        };
        let mut world = WorldState::new(config).expect("world");
        let report = world.step(DT);
        assert_eq!(report.prey_killed, 1);
        assert_eq!(report.live_prey, 0);

        let doe = &world.herd()[0];
        assert_eq!(doe.state(), AwarenessState::Dead);
        assert_eq!(doe.kinematics().speed, 0.0);
        assert_eq!(world.pack()[0].state(), HuntingState::Eating);
        assert_eq!(world.pack()[0].kinematics().speed, 0.0);

        let resting = doe.kinematics().position;
        let feeding = world.pack()[0].kinematics().position;
        for _ in 0..3 {
            world.step(DT);
        }
        assert_eq!(world.herd()[0].kinematics().position, resting);
        assert_eq!(world.pack()[0].kinematics().position, feeding);
    }

    #[test]
    fn center_stalks_targets_and_escalates_in_one_tick() {
        let config = SavannaConfig {
            herd: vec![
                prey_spawn("Near", 0.0, 0.0, true),
                prey_spawn("Far", 0.0, 20.0, false),
            ],
            pack: vec![predator_spawn("Alpha", 0.0, -5.0, true)],
            ..SavannaConfig::default()
        };
        let mut world = WorldState::new(config).expect("world");
        // Centroid sits at (0, 10): 15 from the predator, inside stalk range;
        // the nearest prey is 5 away, inside chase range.
        let report = world.step(DT);
        let alpha = &world.pack()[0];
        assert_eq!(alpha.state(), HuntingState::Chasing);
        assert_eq!(alpha.target(), Some(PreyId(0)));
        assert_eq!(alpha.kinematics().speed, 4.0);
        assert!(report.herd_alerted);
    }

    #[test]
    fn alert_spreads_to_prey_with_no_local_predator() {
        let config = SavannaConfig {
            herd: vec![
                prey_spawn("Near", 0.0, 0.0, true),
                prey_spawn("Far", 0.0, 20.0, false),
            ],
            pack: vec![predator_spawn("Alpha", 0.0, -5.0, true)],
            ..SavannaConfig::default()
        };
        let mut world = WorldState::new(config).expect("world");
        world.step(DT);
        // "Far" is 25 units from the predator, well past detection range, yet
        // runs because the herd was alerted.
        assert_eq!(world.herd()[1].state(), AwarenessState::Running);
        assert!((world.herd()[1].threat_weight() - 1.0).abs() < 1e-6);
        assert!(!world.herd()[1].is_alerted());
    }

    #[test]
    fn wing_orbits_then_charges_after_the_flank_sweep() {
        let recorder = RecordingPresenter::default();
        let events = Arc::clone(&recorder.events);
        let config = SavannaConfig {
            herd: vec![prey_spawn("Doe", 0.0, 0.0, true)],
            pack: vec![
                predator_spawn("Alpha", 0.0, 5.0, true),
                predator_spawn("Beta", 30.0, 30.0, false),
            ],
            ..SavannaConfig::default()
        };
        let mut world = WorldState::with_presenter(config, Box::new(recorder)).expect("world");
        let beta = AgentId::Predator(PredatorId(1));

        // Tick one: the centre acquires its target; the wing has not been
        // told yet.
        world.step(0.0);
        assert_eq!(world.pack()[1].state(), HuntingState::Prowling);

        // Tick two: the hand-off arrives, the wing snapshots its bearing and
        // starts orbiting at a right angle.
        world.step(0.0);
        let wing = &world.pack()[1];
        assert_eq!(wing.state(), HuntingState::Stalking);
        assert_eq!(wing.target(), Some(PreyId(0)));
        assert!((wing.wing_angle() + 135.0).abs() < 1e-3);
        assert!((wing.kinematics().heading + 225.0).abs() < 1e-3);
        assert_eq!(wing.kinematics().speed, 4.0);

        // Swing the wing to the far side of the herd: the bearing delta
        // crosses half a turn and the wing commits to the chase.
        let mut teleported = world.pack()[1].kinematics();
        teleported.position = Vec2::new(-30.0, -28.0);
        assert!(world.set_kinematics(beta, teleported));
        world.step(0.0);
        assert_eq!(world.pack()[1].state(), HuntingState::Chasing);

        // A further tick holds the chase without re-announcing it.
        world.step(0.0);
        assert_eq!(world.pack()[1].state(), HuntingState::Chasing);
        let wing_events = events
            .lock()
            .expect("events lock")
            .iter()
            .filter(|(agent, _)| *agent == beta)
            .count();
        // Initial style, stalking, chasing.
        assert_eq!(wing_events, 3);
    }

    #[test]
    fn herd_centroid_counts_dead_prey() {
        let config = SavannaConfig {
            herd: vec![
                prey_spawn("Doe", 0.0, 0.0, true),
                prey_spawn("Buck", 4.0, 0.0, false),
                prey_spawn("Fawn", -2.0, 0.0, false),
            ],
            pack: vec![predator_spawn("Alpha", 0.5, 0.0, true)],
            ..SavannaConfig::default()
        };
        let mut world = WorldState::new(config).expect("world");
        world.step(0.0);
        assert_eq!(world.herd()[0].state(), AwarenessState::Dead);
        let centroid = world.herd_centroid();
        assert!((centroid.x - 2.0 / 3.0).abs() < 1e-6);
        assert!(centroid.z.abs() < 1e-6);
    }

    #[test]
    fn tick_debounces_out_of_sequence_frames() {
        let mut world = WorldState::new(SavannaConfig::demo()).expect("world");
        let parked = world.herd()[0].kinematics().position;

        let report = world.tick(5, DT);
        assert!(!report.advanced);
        assert_eq!(world.herd()[0].kinematics().position, parked);

        assert!(world.tick(2, DT).advanced);
        assert!(!world.tick(2, DT).advanced);
        assert!(world.tick(3, DT).advanced);
        assert_eq!(world.clock().last_frame(), 3);
    }

    #[test]
    fn reset_is_idempotent_and_restores_initial_state() {
        let config = SavannaConfig {
            herd: vec![prey_spawn("Doe", 0.0, 0.0, true)],
            pack: vec![predator_spawn("Alpha", 0.5, 0.0, true)],
            ..SavannaConfig::default()
        };
        let mut world = WorldState::new(config).expect("world");
        for frame in 2..6 {
            world.tick(frame, DT);
        }
        assert_eq!(world.herd()[0].state(), AwarenessState::Dead);

        world.reset();
        let first: Vec<_> = world
            .herd()
            .iter()
            .map(|prey| (prey.kinematics(), prey.state(), prey.weights()))
            .collect();
        let first_pack: Vec<_> = world
            .pack()
            .iter()
            .map(|p| (p.kinematics(), p.state(), p.target(), p.wing_angle()))
            .collect();

        world.reset();
        let second: Vec<_> = world
            .herd()
            .iter()
            .map(|prey| (prey.kinematics(), prey.state(), prey.weights()))
            .collect();
        let second_pack: Vec<_> = world
            .pack()
            .iter()
            .map(|p| (p.kinematics(), p.state(), p.target(), p.wing_angle()))
            .collect();

        assert_eq!(first, second);
        assert_eq!(first_pack, second_pack);

        let doe = &world.herd()[0];
        assert_eq!(doe.state(), AwarenessState::Grazing);
        assert_eq!(doe.kinematics().position, Vec2::ZERO);
        assert_eq!(doe.kinematics().speed, world.config().speeds.grazing);
        let alpha = &world.pack()[0];
        assert_eq!(alpha.state(), HuntingState::Prowling);
        assert_eq!(alpha.target(), None);
        assert_eq!(alpha.kinematics().speed, world.config().speeds.prowling);
        assert!(world.tick(2, DT).advanced);
    }

    #[test]
    fn presenter_hears_initial_styles_and_transitions() {
        let recorder = RecordingPresenter::default();
        let events = Arc::clone(&recorder.events);
        let mut world =
            WorldState::with_presenter(lone_prey_config(), Box::new(recorder)).expect("world");
        {
            let seen = events.lock().expect("events lock");
            assert_eq!(seen.len(), 1);
            // The lone doe is the leader, so she wears the darker green.
            assert_eq!(seen[0], (AgentId::Prey(PreyId(0)), [0.0, 0.5, 0.0]));
        }
        world.step(DT);
        let seen = events.lock().expect("events lock");
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1], (AgentId::Prey(PreyId(0)), [0.5, 0.5, 0.0]));
    }

    #[test]
    fn kinematics_surface_round_trips() {
        let mut world = WorldState::new(lone_prey_config()).expect("world");
        let id = AgentId::Prey(PreyId(0));
        let replacement = KinematicState::new(Vec2::new(7.0, -3.0), 42.0, 1.25);
        assert!(world.set_kinematics(id, replacement));
        assert_eq!(world.kinematics(id), Some(replacement));
        assert_eq!(world.kinematics(AgentId::Prey(PreyId(9))), None);
        assert!(!world.set_kinematics(AgentId::Predator(PredatorId(0)), replacement));
    }
}
