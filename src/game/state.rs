//! World and Actor State
//!
//! All state types for movement simulation.
//! Uses BTreeMap for deterministic iteration order.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use serde::{Serialize, Deserialize};

use crate::core::hash::{StateHash, StateHasher, compute_state_hash};
use crate::core::quantize::{yaw_to_byte, Route};
use crate::core::vec3::Vec3;
use crate::game::collision::{Aabb, CharacterController, Environment, Ladder};
use crate::game::config::{MovementConfig, SyncConfig, Tuning};
use crate::game::events::{MovementEvent, MovementEventData};
use crate::game::moves::Move;
use crate::game::resource::{BoundedResource, EnduranceRule, HealthRule};
use crate::game::tick::Dispatch;

// =============================================================================
// MOVE STATE
// =============================================================================

/// Movement state of an actor.
///
/// The discriminants are the wire encoding.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum MoveState {
    /// Standing still
    #[default]
    Idle = 0,
    /// Walking
    Walking = 1,
    /// Running (run held, endurance left)
    Running = 2,
    /// Crouched
    Crouching = 3,
    /// Prone
    Crawling = 4,
    /// Jumping or falling
    Airborne = 5,
    /// On a ladder
    Climbing = 6,
    /// Submerged
    Swimming = 7,
    /// Health is zero
    Dead = 8,
}

impl MoveState {
    /// Number of states.
    pub const COUNT: u8 = 9;

    /// All states in wire order.
    pub const ALL: [MoveState; 9] = [
        MoveState::Idle,
        MoveState::Walking,
        MoveState::Running,
        MoveState::Crouching,
        MoveState::Crawling,
        MoveState::Airborne,
        MoveState::Climbing,
        MoveState::Swimming,
        MoveState::Dead,
    ];

    /// Capsule size class for this state.
    pub fn capsule_scale(self) -> CapsuleScale {
        match self {
            MoveState::Crouching => CapsuleScale::Crouched,
            MoveState::Crawling | MoveState::Swimming => CapsuleScale::Prone,
            MoveState::Dead => CapsuleScale::Dead,
            _ => CapsuleScale::Standing,
        }
    }

    /// Lowercase name for logs.
    pub fn name(self) -> &'static str {
        match self {
            MoveState::Idle => "idle",
            MoveState::Walking => "walking",
            MoveState::Running => "running",
            MoveState::Crouching => "crouching",
            MoveState::Crawling => "crawling",
            MoveState::Airborne => "airborne",
            MoveState::Climbing => "climbing",
            MoveState::Swimming => "swimming",
            MoveState::Dead => "dead",
        }
    }
}

impl TryFrom<u8> for MoveState {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        MoveState::ALL.get(value as usize).copied().ok_or(value)
    }
}

impl From<MoveState> for u8 {
    fn from(state: MoveState) -> u8 {
        state as u8
    }
}

impl fmt::Display for MoveState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Capsule height class. Radius follows as the default radius clamped to
/// half the height.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CapsuleScale {
    /// Full height
    Standing,
    /// Half height
    Crouched,
    /// Quarter height
    Prone,
    /// Quarter height
    Dead,
}

impl CapsuleScale {
    /// Fraction of the default height.
    #[inline]
    pub fn ratio(self) -> f32 {
        match self {
            CapsuleScale::Standing => 1.0,
            CapsuleScale::Crouched => 0.5,
            CapsuleScale::Prone | CapsuleScale::Dead => 0.25,
        }
    }
}

// =============================================================================
// IDS AND ROLES
// =============================================================================

/// Actor identifier, assigned by the authority.
///
/// Implements Ord for deterministic BTreeMap ordering.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(pub u32);

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What this process is in the session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeerRole {
    /// Authority without a local player
    DedicatedServer,
    /// Authority that also controls a local player
    Host,
    /// Remote player
    Client,
}

impl PeerRole {
    /// Whether this peer may rubberband, force resets and apply damage.
    #[inline]
    pub fn is_authority(self) -> bool {
        !matches!(self, PeerRole::Client)
    }
}

// =============================================================================
// ACTOR
// =============================================================================

/// Sync counters, for telemetry only.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStats {
    /// Drains that applied two moves at once
    pub combined_moves: u32,
    /// Resets caused by divergence
    pub rubberbanded: u32,
    /// Moves dropped for carrying an old route
    pub stale_discarded: u32,
    /// Moves dropped because the buffer was full
    pub overflow_dropped: u32,
    /// Resets of any cause (including ones received from the authority)
    pub forced_resets: u32,
}

/// Owner-side locomotion memory carried between ticks.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Locomotion {
    /// Velocity requested for this tick (units per second)
    pub move_dir: Vec3,
    /// Accelerated horizontal speed
    pub horizontal_speed: f32,
    /// Was running when leaving the ground
    pub sprinting_before_airborne: bool,
    /// Footstep accumulator
    pub step_cycle: f32,
    /// Step cycle value of the next footstep
    pub next_step: f32,
    /// Ladder being climbed or about to be entered
    pub ladder: Option<Ladder>,
    /// Water volume currently touched
    pub water: Option<Aabb>,
}

/// A networked character.
#[derive(Clone, Debug)]
pub struct MovementActor {
    /// Actor id
    pub id: ActorId,
    /// Current state
    pub state: MoveState,
    /// State at the end of the previous tick
    pub last_state: MoveState,
    /// Current epoch
    pub route: Route,
    /// Collision capsule
    pub controller: CharacterController,
    /// Facing (degrees)
    pub yaw: f32,
    /// Velocity of the last applied move
    pub velocity: Vec3,
    /// Velocity captured at the last ungrounded tick
    pub last_fall: Vec3,
    /// Moves waiting to be replayed
    pub pending: VecDeque<Move>,
    /// Health
    pub health: BoundedResource<HealthRule>,
    /// Endurance
    pub endurance: BoundedResource<EnduranceRule>,
    /// Prediction memory (owner only)
    pub locomotion: Locomotion,
    /// Sync counters
    pub stats: SyncStats,
    /// Where the authority respawns this actor
    pub spawn_point: Vec3,
    /// Tick the actor died at, while dead
    pub died_at: Option<u32>,
}

impl MovementActor {
    /// Create a standing, idle actor.
    pub fn new(id: ActorId, position: Vec3, yaw: f32, config: &MovementConfig) -> Self {
        Self {
            id,
            state: MoveState::Idle,
            last_state: MoveState::Idle,
            route: Route::default(),
            controller: CharacterController::new(position, config.capsule_height, config.capsule_radius),
            yaw,
            velocity: Vec3::ZERO,
            last_fall: Vec3::ZERO,
            pending: VecDeque::new(),
            health: BoundedResource::full(HealthRule::default()),
            endurance: BoundedResource::full(EnduranceRule::default()),
            locomotion: Locomotion::default(),
            stats: SyncStats::default(),
            spawn_point: position,
            died_at: None,
        }
    }

    /// Feet position.
    #[inline]
    pub fn position(&self) -> Vec3 {
        self.controller.position()
    }

    /// Packed yaw.
    #[inline]
    pub fn yaw_byte(&self) -> u8 {
        yaw_to_byte(self.yaw)
    }

    /// Health above zero.
    #[inline]
    pub fn is_alive(&self) -> bool {
        !self.health.is_empty()
    }

    /// Moves waiting in the buffer.
    #[inline]
    pub fn queued(&self) -> usize {
        self.pending.len()
    }

    /// Put the actor at `position`, at rest. Used by forced resets.
    pub fn place(&mut self, env: &dyn Environment, position: Vec3) {
        self.controller.teleport(env, position);
        self.velocity = Vec3::ZERO;
        self.locomotion.move_dir = Vec3::ZERO;
        self.locomotion.horizontal_speed = 0.0;
    }

    /// Resize the capsule to match the current state.
    pub fn sync_capsule(&mut self) {
        self.controller.set_height_ratio(self.state.capsule_scale().ratio());
    }

    /// The move describing the actor right now.
    pub fn current_move(&self) -> Move {
        Move::new(self.route, self.state, self.position(), self.yaw_byte())
    }

    /// Add to state hash.
    pub fn hash_into(&self, hasher: &mut StateHasher) {
        hasher.update_u32(self.id.0);
        hasher.update_u8(self.state.into());
        hasher.update_u8(self.route.value());
        hasher.update_vec3(self.position());
        hasher.update_u8(self.yaw_byte());
        hasher.update_u32(self.health.current() as u32);
    }
}

// =============================================================================
// DAMAGE HOOK
// =============================================================================

/// Receives damage dealt by the authority (combat effects, UI popups).
pub trait DamageHook: Send + Sync {
    /// Called once per damage application.
    fn on_damage(&mut self, actor: ActorId, amount: i32, position: Vec3, normal: Vec3);
}

// =============================================================================
// WORLD STATE
// =============================================================================

/// Registry of every actor known to this peer.
pub struct WorldState {
    /// Ticks simulated so far
    pub tick: u32,

    /// Role of this peer
    pub role: PeerRole,

    /// Actor predicted by this peer, if any
    pub local_actor: Option<ActorId>,

    /// All actors (BTreeMap for deterministic iteration)
    pub actors: BTreeMap<ActorId, MovementActor>,

    /// Locomotion tuning
    pub movement: MovementConfig,

    /// Buffer tuning
    pub sync: SyncConfig,

    /// Endurance recovery interval
    pub recovery_interval_ticks: u32,

    /// Respawn delay
    pub respawn_ticks: u32,

    /// Fixed time step (seconds)
    pub dt: f32,

    env: Arc<dyn Environment>,
    damage_hook: Option<Box<dyn DamageHook>>,
    pending_events: Vec<MovementEvent>,
    outbox: Vec<Dispatch>,
}

impl WorldState {
    /// Create an empty world.
    pub fn new(role: PeerRole, tuning: Tuning, env: Arc<dyn Environment>) -> Self {
        let tuning = tuning.validated();
        Self {
            tick: 0,
            role,
            local_actor: None,
            actors: BTreeMap::new(),
            movement: tuning.movement,
            sync: tuning.sync,
            recovery_interval_ticks: tuning.recovery_interval_ticks,
            respawn_ticks: tuning.respawn_ticks,
            dt: crate::FIXED_DELTA,
            env,
            damage_hook: None,
            pending_events: Vec::new(),
            outbox: Vec::new(),
        }
    }

    /// Shared handle to the environment.
    pub fn env(&self) -> Arc<dyn Environment> {
        Arc::clone(&self.env)
    }

    /// Whether this peer is authoritative.
    #[inline]
    pub fn is_authority(&self) -> bool {
        self.role.is_authority()
    }

    /// Whether this peer predicts `id`.
    #[inline]
    pub fn owns(&self, id: ActorId) -> bool {
        self.local_actor == Some(id)
    }

    /// Set the locally predicted actor.
    pub fn set_local_actor(&mut self, id: Option<ActorId>) {
        self.local_actor = id;
    }

    /// Add an actor. Replaces any actor with the same id.
    pub fn spawn(&mut self, id: ActorId, position: Vec3, yaw: f32) -> &mut MovementActor {
        let mut actor = MovementActor::new(id, position, yaw, &self.movement);
        actor.controller.teleport(self.env.as_ref(), position);
        self.push_event(MovementEvent::new(self.tick, id, MovementEventData::Spawned { position }));
        match self.actors.entry(id) {
            Entry::Occupied(mut slot) => {
                slot.insert(actor);
                slot.into_mut()
            }
            Entry::Vacant(slot) => slot.insert(actor),
        }
    }

    /// Remove an actor.
    pub fn despawn(&mut self, id: ActorId) -> Option<MovementActor> {
        let removed = self.actors.remove(&id);
        if removed.is_some() {
            self.push_event(MovementEvent::new(self.tick, id, MovementEventData::Despawned));
            if self.local_actor == Some(id) {
                self.local_actor = None;
            }
        }
        removed
    }

    /// Get actor by id.
    pub fn get(&self, id: ActorId) -> Option<&MovementActor> {
        self.actors.get(&id)
    }

    /// Get mutable actor by id.
    pub fn get_mut(&mut self, id: ActorId) -> Option<&mut MovementActor> {
        self.actors.get_mut(&id)
    }

    /// Install the damage hook.
    pub fn set_damage_hook(&mut self, hook: Box<dyn DamageHook>) {
        self.damage_hook = Some(hook);
    }

    /// Push event to pending queue.
    pub fn push_event(&mut self, event: MovementEvent) {
        self.pending_events.push(event);
    }

    /// Take all pending events.
    pub fn take_events(&mut self) -> Vec<MovementEvent> {
        std::mem::take(&mut self.pending_events)
    }

    /// Queue a message for the transport.
    pub fn push_dispatch(&mut self, dispatch: Dispatch) {
        self.outbox.push(dispatch);
    }

    /// Take all queued messages.
    pub fn take_dispatches(&mut self) -> Vec<Dispatch> {
        std::mem::take(&mut self.outbox)
    }

    /// Reduce an actor's health (authority only).
    ///
    /// Emits `Damaged` (and `Died` when health reaches zero), calls the
    /// damage hook and queues `Damage` plus `Vitals` dispatches. Returns
    /// `false` if nothing was applied.
    pub fn apply_damage(&mut self, id: ActorId, amount: i32, normal: Vec3) -> bool {
        if !self.is_authority() || amount <= 0 {
            return false;
        }
        let tick = self.tick;
        let Some(actor) = self.actors.get_mut(&id) else {
            return false;
        };
        let died = actor.health.add(-amount);
        if died {
            actor.died_at = Some(tick);
        }
        let position = actor.position();
        let health = actor.health.current();
        let endurance = actor.endurance.current();

        self.push_event(MovementEvent::damaged(tick, id, amount, health));
        if died {
            self.push_event(MovementEvent::new(tick, id, MovementEventData::Died));
        }
        if let Some(hook) = self.damage_hook.as_mut() {
            hook.on_damage(id, amount, position, normal);
        }
        self.push_dispatch(Dispatch::Damage { actor: id, amount, position, normal });
        self.push_dispatch(Dispatch::Vitals { actor: id, health, endurance });
        true
    }

    /// Overwrite an actor's vitals from an authority message.
    pub fn apply_vitals(&mut self, id: ActorId, health: i32, endurance: i32) {
        if let Some(actor) = self.actors.get_mut(&id) {
            actor.health.set(health);
            actor.endurance.set(endurance);
            actor.died_at = if actor.health.is_empty() { actor.died_at } else { None };
        }
    }

    /// Compute state hash for convergence checks.
    pub fn compute_hash(&self) -> StateHash {
        compute_state_hash(self.actors.len() as u32, |hasher| {
            for actor in self.actors.values() {
                actor.hash_into(hasher);
            }
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================
