//! Movement State Machine
//!
//! One transition per fixed tick. [`decide`] is the transition table: a
//! pure function of the current state and the sensed [`Signals`], written
//! as one ordered else-if chain per state. [`step`] wraps it with the
//! per-state locomotion (acceleration, gravity, climbing, swimming) and
//! the side effects of each edge.

use serde::{Serialize, Deserialize};

use crate::core::vec3::{move_towards, Vec3};
use crate::game::collision::Environment;
use crate::game::config::MovementConfig;
use crate::game::events::Cue;
use crate::game::input::InputFrame;
use crate::game::state::{CapsuleScale, MoveState, MovementActor};

// =============================================================================
// SIGNALS
// =============================================================================

/// Everything the transition table looks at, sampled once per tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signals {
    /// Health is zero
    pub died: bool,
    /// Not grounded, and dropping faster than the fall tolerance
    pub falling: bool,
    /// Jump pressed while grounded-with-tolerance and not sliding
    pub jump_requested: bool,
    /// Crouch toggle pressed
    pub crouch_toggle: bool,
    /// Crawl toggle pressed
    pub crawl_toggle: bool,
    /// A ladder is remembered
    pub ladder_enter: bool,
    /// The remembered ladder no longer touches the capsule at all
    pub ladder_exit: bool,
    /// Enough of the capsule is below the water surface
    pub underwater: bool,
    /// Grounded after the last move
    pub landed: bool,
    /// A standing capsule would fit here
    pub can_stand: bool,
    /// A crouched capsule would fit here
    pub can_crouch: bool,
    /// Movement input present
    pub has_input: bool,
    /// This tick's horizontal move is exactly zero
    pub horizontal_stopped: bool,
    /// Run held and endurance left
    pub running: bool,
}

/// Why a state was chosen.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cause {
    /// Nothing interesting happened
    Unchanged,
    /// Health reached zero
    Died,
    /// Health came back
    Revived,
    /// Started falling
    Fell,
    /// Jump was pressed
    Jumped,
    /// Crouch toggle was pressed
    CrouchToggled,
    /// Crawl toggle was pressed
    CrawlToggled,
    /// Touched a ladder
    LadderEntered,
    /// Fully left the ladder
    LadderExited,
    /// Went under water
    Submerged,
    /// Left the water
    Surfaced,
    /// Touched the ground
    Landed,
    /// Movement input started
    StartedMoving,
    /// Horizontal movement stopped
    Stopped,
}

/// Next state plus the reason.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Decision {
    /// State for the rest of this tick
    pub next: MoveState,
    /// Edge taken
    pub cause: Cause,
}

impl Decision {
    #[inline]
    fn to(next: MoveState, cause: Cause) -> Self {
        Self { next, cause }
    }

    #[inline]
    fn stay(state: MoveState) -> Self {
        Self { next: state, cause: Cause::Unchanged }
    }
}

// =============================================================================
// TRANSITION TABLE
// =============================================================================

/// The transition table.
///
/// Blocked edges (standing up under a low ceiling) stay in the current
/// state for this tick without falling through to later checks.
pub fn decide(state: MoveState, s: &Signals) -> Decision {
    use MoveState::*;

    match state {
        Idle | Walking | Running => {
            if s.died {
                Decision::to(Dead, Cause::Died)
            } else if s.falling {
                Decision::to(Airborne, Cause::Fell)
            } else if s.jump_requested {
                Decision::to(Airborne, Cause::Jumped)
            } else if s.crouch_toggle {
                Decision::to(Crouching, Cause::CrouchToggled)
            } else if s.crawl_toggle {
                Decision::to(Crawling, Cause::CrawlToggled)
            } else if s.ladder_enter {
                Decision::to(Climbing, Cause::LadderEntered)
            } else if s.underwater {
                Decision::to(Swimming, Cause::Submerged)
            } else if state == Idle {
                if s.has_input {
                    Decision::to(Walking, Cause::StartedMoving)
                } else {
                    Decision::stay(Idle)
                }
            } else if s.horizontal_stopped {
                Decision::to(Idle, Cause::Stopped)
            } else if s.running {
                Decision::to(Running, Cause::Unchanged)
            } else {
                Decision::to(Walking, Cause::Unchanged)
            }
        }

        Crouching | Crawling => {
            let blocked = Decision::stay(state);
            if s.died {
                Decision::to(Dead, Cause::Died)
            } else if s.falling {
                if s.can_stand { Decision::to(Airborne, Cause::Fell) } else { blocked }
            } else if s.jump_requested {
                if s.can_stand { Decision::to(Idle, Cause::Jumped) } else { blocked }
            } else if s.crouch_toggle {
                match state {
                    Crouching if s.can_stand => Decision::to(Idle, Cause::CrouchToggled),
                    Crawling if s.can_crouch => Decision::to(Crouching, Cause::CrouchToggled),
                    _ => blocked,
                }
            } else if s.crawl_toggle {
                match state {
                    Crouching => Decision::to(Crawling, Cause::CrawlToggled),
                    _ if s.can_stand => Decision::to(Idle, Cause::CrawlToggled),
                    _ => blocked,
                }
            } else if s.ladder_enter {
                if s.can_stand { Decision::to(Climbing, Cause::LadderEntered) } else { blocked }
            } else if s.underwater {
                Decision::to(Swimming, Cause::Submerged)
            } else {
                blocked
            }
        }

        Airborne => {
            if s.died {
                Decision::to(Dead, Cause::Died)
            } else if s.landed {
                Decision::to(Idle, Cause::Landed)
            } else if s.ladder_enter {
                Decision::to(Climbing, Cause::LadderEntered)
            } else if s.underwater {
                Decision::to(Swimming, Cause::Submerged)
            } else {
                Decision::stay(Airborne)
            }
        }

        Climbing => {
            if s.died {
                Decision::to(Dead, Cause::Died)
            } else if s.ladder_exit {
                Decision::to(Idle, Cause::LadderExited)
            } else {
                Decision::stay(Climbing)
            }
        }

        Swimming => {
            if s.died {
                Decision::to(Dead, Cause::Died)
            } else if s.ladder_enter {
                if s.can_stand {
                    Decision::to(Climbing, Cause::LadderEntered)
                } else {
                    Decision::stay(Swimming)
                }
            } else if !s.underwater {
                if s.can_stand {
                    Decision::to(Idle, Cause::Surfaced)
                } else {
                    Decision::stay(Swimming)
                }
            } else {
                Decision::stay(Swimming)
            }
        }

        Dead => {
            if s.died {
                Decision::stay(Dead)
            } else {
                Decision::to(Idle, Cause::Revived)
            }
        }
    }
}

/// Next state only.
#[inline]
pub fn next_state(state: MoveState, signals: &Signals) -> MoveState {
    decide(state, signals).next
}

/// States reachable from `state` in one tick (besides staying).
pub fn edges(state: MoveState) -> &'static [MoveState] {
    use MoveState::*;

    match state {
        Idle => &[Dead, Airborne, Crouching, Crawling, Climbing, Swimming, Walking],
        Walking | Running => &[Dead, Airborne, Crouching, Crawling, Climbing, Swimming, Idle, Walking, Running],
        Crouching => &[Dead, Airborne, Idle, Crawling, Climbing, Swimming],
        Crawling => &[Dead, Airborne, Idle, Crouching, Climbing, Swimming],
        Airborne => &[Dead, Idle, Climbing, Swimming],
        Climbing => &[Dead, Idle],
        Swimming => &[Dead, Climbing, Idle],
        Dead => &[Idle],
    }
}

// =============================================================================
// SENSING
// =============================================================================

/// Whether the capsule counts as grounded, allowing for the fall tolerance
/// so walking down steps does not read as falling.
#[inline]
pub fn grounded_within_tolerance(actor: &MovementActor, config: &MovementConfig) -> bool {
    actor.controller.grounded || actor.controller.velocity.y > -config.fall_minimum_magnitude
}

/// Sample the signals for `actor`. `horizontal_stopped` is left `false`;
/// it depends on this tick's locomotion.
pub fn sense(
    actor: &MovementActor,
    env: &dyn Environment,
    config: &MovementConfig,
    input: &InputFrame,
) -> Signals {
    let controller = &actor.controller;
    let grounded_tol = grounded_within_tolerance(actor, config);
    let ladder = actor.locomotion.ladder;

    let underwater = match actor.locomotion.water {
        Some(water) => {
            let feet = controller.position();
            let origin = Vec3::new(feet.x, water.max.y, feet.z);
            let depth = controller.capsule.height * config.underwater_threshold;
            !env.ray_down_hits(origin, depth)
        }
        None => false,
    };

    Signals {
        died: actor.health.is_empty(),
        falling: !grounded_tol,
        jump_requested: grounded_tol && !controller.sliding && input.jump(),
        crouch_toggle: input.crouch(),
        crawl_toggle: input.crawl(),
        ladder_enter: ladder.is_some(),
        ladder_exit: ladder.is_some_and(|l| !l.bounds.intersects(&controller.capsule.bounds())),
        underwater,
        landed: controller.grounded,
        can_stand: controller.can_set_height(env, controller.default_height),
        can_crouch: controller
            .can_set_height(env, controller.default_height * CapsuleScale::Crouched.ratio()),
        has_input: input.has_movement(),
        horizontal_stopped: false,
        running: input.run() && actor.endurance.current() > 0,
    }
}

// =============================================================================
// LOCOMOTION
// =============================================================================

/// Accelerate toward `|dir| * target`, never jumping there at once.
#[inline]
fn accelerate(dir: Vec3, current: f32, target: f32, rate: f32, dt: f32) -> f32 {
    move_towards(current, dir.length() * target, rate * dt)
}

/// Add gravity while airborne; no stick force while grounded.
#[inline]
fn apply_gravity(y: f32, grounded: bool, config: &MovementConfig, dt: f32) -> f32 {
    if grounded {
        0.0
    } else {
        y + config.gravity * config.gravity_multiplier * dt
    }
}

#[inline]
fn rotate_with_keys(actor: &mut MovementActor, input: &InputFrame, config: &MovementConfig, dt: f32) {
    actor.yaw += input.rotate * config.rotation_speed * dt;
}

fn set_horizontal_move(actor: &mut MovementActor, desired: Vec3, config: &MovementConfig, dt: f32) {
    let speed = actor.locomotion.horizontal_speed;
    let grounded = actor.controller.grounded;
    let loco = &mut actor.locomotion;
    loco.move_dir.x = desired.x * speed;
    loco.move_dir.y = apply_gravity(loco.move_dir.y, grounded, config, dt);
    loco.move_dir.z = desired.z * speed;
}

/// Locomotion for states that move before their transition checks.
/// Returns the target speed used, for the step cycle.
fn pre_move(
    actor: &mut MovementActor,
    input: &InputFrame,
    dir: Vec3,
    desired: Vec3,
    running: bool,
    config: &MovementConfig,
    dt: f32,
) -> f32 {
    let has_input = input.has_movement();
    let pick = |acc: f32, dec: f32| if has_input { acc } else { dec };

    let target = match actor.state {
        MoveState::Idle => {
            rotate_with_keys(actor, input, config, dt);
            // brake from the last move (e.g. a landing jump)
            let h = &mut actor.locomotion.horizontal_speed;
            *h = accelerate(dir, *h, 0.0, config.walk_deceleration, dt);
            0.0
        }
        MoveState::Walking | MoveState::Running => {
            rotate_with_keys(actor, input, config, dt);
            let speed = if running { config.run_speed } else { config.walk_speed };
            let rate = pick(config.walk_acceleration, config.walk_deceleration);
            let h = &mut actor.locomotion.horizontal_speed;
            *h = accelerate(dir, *h, speed, rate, dt);
            speed
        }
        MoveState::Crouching => {
            rotate_with_keys(actor, input, config, dt);
            let rate = pick(config.crouch_acceleration, config.crouch_deceleration);
            let h = &mut actor.locomotion.horizontal_speed;
            *h = accelerate(dir, *h, config.crouch_speed, rate, dt);
            config.crouch_speed
        }
        MoveState::Crawling => {
            rotate_with_keys(actor, input, config, dt);
            let rate = pick(config.crawl_acceleration, config.crawl_deceleration);
            let h = &mut actor.locomotion.horizontal_speed;
            *h = accelerate(dir, *h, config.crawl_speed, rate, dt);
            config.crawl_speed
        }
        MoveState::Airborne => {
            rotate_with_keys(actor, input, config, dt);
            let speed = if actor.locomotion.sprinting_before_airborne {
                config.run_speed
            } else {
                config.walk_speed
            };
            let rate = pick(config.airborne_acceleration, config.airborne_deceleration);
            let h = &mut actor.locomotion.horizontal_speed;
            *h = accelerate(dir, *h, speed, rate, dt);
            speed
        }
        MoveState::Dead => {
            let grounded = actor.controller.grounded;
            let loco = &mut actor.locomotion;
            loco.move_dir = Vec3::new(0.0, apply_gravity(loco.move_dir.y, grounded, config, dt), 0.0);
            return 0.0;
        }
        MoveState::Climbing | MoveState::Swimming => return 0.0,
    };

    set_horizontal_move(actor, desired, config, dt);
    target
}

/// Locomotion for states that move only when they stay put.
fn post_move(
    actor: &mut MovementActor,
    input: &InputFrame,
    dir: Vec3,
    desired: Vec3,
    config: &MovementConfig,
    dt: f32,
) {
    match actor.state {
        MoveState::Climbing => {
            // no acceleration, no gravity
            let local = Vec3::new(dir.x * config.climb_speed, dir.y * config.climb_speed, 0.0);
            actor.locomotion.move_dir = match actor.locomotion.ladder {
                Some(ladder) => local.rotate_yaw(ladder.yaw),
                None => local,
            };
        }
        MoveState::Swimming => {
            rotate_with_keys(actor, input, config, dt);
            let rate = if input.has_movement() {
                config.swim_acceleration
            } else {
                config.swim_deceleration
            };
            let h = accelerate(dir, actor.locomotion.horizontal_speed, config.swim_speed, rate, dt);
            let feet_y = actor.position().y;
            let loco = &mut actor.locomotion;
            loco.horizontal_speed = h;
            loco.move_dir.x = desired.x * h;
            loco.move_dir.z = desired.z * h;
            // drift toward the surface
            loco.move_dir.y = match loco.water {
                Some(water) => (water.max.y - feet_y - config.swim_surface_offset) * config.swim_speed,
                None => 0.0,
            };
        }
        _ => {}
    }
}

/// Advance the footstep accumulator; returns `true` when a step lands.
fn progress_step_cycle(
    actor: &mut MovementActor,
    from: MoveState,
    has_input: bool,
    speed: f32,
    config: &MovementConfig,
    dt: f32,
) -> bool {
    let velocity = actor.controller.velocity;
    let loco = &mut actor.locomotion;
    if velocity.length_squared() > 0.0 && has_input {
        let stride = if from == MoveState::Walking { 1.0 } else { config.run_step_length };
        loco.step_cycle += (velocity.length() + speed * stride) * dt;
    }
    if loco.step_cycle > loco.next_step {
        loco.next_step = loco.step_cycle + config.run_step_interval;
        return actor.controller.grounded;
    }
    false
}

// =============================================================================
// STEP
// =============================================================================

/// Result of one machine step.
#[derive(Clone, Debug, PartialEq)]
pub struct Step {
    /// State before the step
    pub from: MoveState,
    /// State after the step
    pub to: MoveState,
    /// Edge taken
    pub cause: Cause,
    /// Local cues fired
    pub cues: Vec<Cue>,
}

/// Run one tick of the state machine for the owning peer.
///
/// `desired` is the camera- and ground-relative move direction. On return
/// `actor.locomotion.move_dir` holds the velocity to move by and the capsule
/// matches the new state.
pub fn step(
    actor: &mut MovementActor,
    env: &dyn Environment,
    config: &MovementConfig,
    input: &InputFrame,
    desired: Vec3,
    dt: f32,
) -> Step {
    let from = actor.state;
    let dir = input.direction();
    let mut signals = sense(actor, env, config, input);

    let speed = pre_move(actor, input, dir, desired, signals.running, config, dt);
    let loco = &actor.locomotion;
    signals.horizontal_stopped = loco.move_dir.x == 0.0 && loco.move_dir.z == 0.0;

    let decision = decide(from, &signals);
    let mut cues = Vec::new();
    apply_edge(actor, from, decision, &signals, config, &mut cues);

    if decision.next == from {
        post_move(actor, input, dir, desired, config, dt);
    }

    let steps = match (from, decision.next) {
        (MoveState::Walking | MoveState::Running, MoveState::Walking | MoveState::Running) => true,
        (MoveState::Crouching, MoveState::Crouching) | (MoveState::Crawling, MoveState::Crawling) => true,
        _ => false,
    };
    if steps && progress_step_cycle(actor, from, signals.has_input, speed, config, dt) {
        cues.push(Cue::Footstep);
    }

    actor.state = decision.next;
    if decision.next != from {
        actor.sync_capsule();
    }

    Step { from, to: decision.next, cause: decision.cause, cues }
}

/// Side effects of the edge taken.
fn apply_edge(
    actor: &mut MovementActor,
    from: MoveState,
    decision: Decision,
    signals: &Signals,
    config: &MovementConfig,
    cues: &mut Vec<Cue>,
) {
    let was_moving = matches!(from, MoveState::Walking | MoveState::Running);
    let loco = &mut actor.locomotion;

    match (decision.cause, decision.next) {
        (Cause::Fell, MoveState::Airborne) => {
            loco.sprinting_before_airborne = was_moving && signals.running;
        }
        (Cause::Jumped, MoveState::Airborne) => {
            loco.move_dir.y = config.jump_speed;
            loco.sprinting_before_airborne = was_moving && signals.running;
            cues.push(Cue::Jump);
        }
        (Cause::CrouchToggled, MoveState::Crouching) if from != MoveState::Idle => {
            loco.horizontal_speed = loco.horizontal_speed.min(config.crouch_speed);
        }
        (Cause::CrawlToggled, MoveState::Crawling) if from != MoveState::Idle => {
            loco.horizontal_speed = loco.horizontal_speed.min(config.crawl_speed);
        }
        (Cause::LadderEntered, MoveState::Climbing) => {
            if let Some(ladder) = loco.ladder {
                actor.yaw = ladder.yaw;
            }
        }
        (Cause::LadderExited, _) => {
            loco.ladder = None;
        }
        (Cause::Died, _) if from == MoveState::Climbing => {
            loco.ladder = None;
        }
        (Cause::Landed, _) => {
            loco.next_step = loco.step_cycle + 0.5;
            cues.push(Cue::Landing);
        }
        _ => {}
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use crate::game::collision::{Aabb, Ladder, Terrain};
    use crate::game::state::ActorId;

    const DT: f32 = 0.02;

    fn actor_at(position: Vec3) -> MovementActor {
        let config = MovementConfig::default();
        let mut actor = MovementActor::new(ActorId(1), position, 0.0, &config);
        actor.controller.grounded = position.y == 0.0;
        actor
    }

    fn signals() -> Signals {
        Signals { can_stand: true, can_crouch: true, landed: true, ..Default::default() }
    }

    #[test]
    fn test_death_overrides_everything() {
        let s = Signals { died: true, falling: true, jump_requested: true, ..signals() };
        for state in MoveState::ALL {
            assert_eq!(next_state(state, &s), MoveState::Dead);
        }
    }

    #[test]
    fn test_idle_priority_order() {
        let s = Signals { falling: true, jump_requested: true, ..signals() };
        assert_eq!(decide(MoveState::Idle, &s).cause, Cause::Fell);

        let s = Signals { crouch_toggle: true, crawl_toggle: true, ..signals() };
        assert_eq!(next_state(MoveState::Idle, &s), MoveState::Crouching);

        let s = Signals { ladder_enter: true, underwater: true, has_input: true, ..signals() };
        assert_eq!(next_state(MoveState::Idle, &s), MoveState::Climbing);

        let s = Signals { has_input: true, ..signals() };
        assert_eq!(next_state(MoveState::Idle, &s), MoveState::Walking);
    }

    #[test]
    fn test_walking_stops_and_runs() {
        let s = Signals { horizontal_stopped: true, running: true, ..signals() };
        assert_eq!(next_state(MoveState::Running, &s), MoveState::Idle);

        let s = Signals { running: true, has_input: true, ..signals() };
        assert_eq!(next_state(MoveState::Walking, &s), MoveState::Running);

        let s = Signals { has_input: true, ..signals() };
        assert_eq!(next_state(MoveState::Running, &s), MoveState::Walking);
    }

    #[test]
    fn test_crouch_blocked_under_ceiling() {
        let blocked = Signals { can_stand: false, ..signals() };
        for s in [
            Signals { crouch_toggle: true, ..blocked },
            Signals { jump_requested: true, ..blocked },
            Signals { falling: true, ..blocked },
            // blocked falling branch does not fall through to ladder
            Signals { falling: true, ladder_enter: true, ..blocked },
        ] {
            assert_eq!(next_state(MoveState::Crouching, &s), MoveState::Crouching);
        }

        let s = Signals { crouch_toggle: true, ..signals() };
        assert_eq!(next_state(MoveState::Crouching, &s), MoveState::Idle);
    }

    #[test]
    fn test_crawl_toggles() {
        let s = Signals { crouch_toggle: true, can_stand: false, ..signals() };
        assert_eq!(next_state(MoveState::Crawling, &s), MoveState::Crouching);

        let s = Signals { crouch_toggle: true, can_stand: false, can_crouch: false, ..signals() };
        assert_eq!(next_state(MoveState::Crawling, &s), MoveState::Crawling);

        let s = Signals { crawl_toggle: true, ..signals() };
        assert_eq!(next_state(MoveState::Crawling, &s), MoveState::Idle);
        assert_eq!(next_state(MoveState::Crouching, &s), MoveState::Crawling);
    }

    #[test]
    fn test_airborne_lands_and_climbing_exits() {
        assert_eq!(decide(MoveState::Airborne, &signals()).cause, Cause::Landed);
        let s = Signals { landed: false, ..signals() };
        assert_eq!(next_state(MoveState::Airborne, &s), MoveState::Airborne);

        let s = Signals { ladder_enter: true, ..signals() };
        assert_eq!(next_state(MoveState::Climbing, &s), MoveState::Climbing);
        let s = Signals { ladder_enter: true, ladder_exit: true, ..signals() };
        assert_eq!(next_state(MoveState::Climbing, &s), MoveState::Idle);
    }

    #[test]
    fn test_swimming_surfaces_only_if_standing_fits() {
        let s = Signals { underwater: false, can_stand: false, ..signals() };
        assert_eq!(next_state(MoveState::Swimming, &s), MoveState::Swimming);
        let s = Signals { underwater: false, ..signals() };
        assert_eq!(next_state(MoveState::Swimming, &s), MoveState::Idle);
    }

    #[test]
    fn test_dead_revives_without_fit_check() {
        let s = Signals { can_stand: false, ..signals() };
        assert_eq!(decide(MoveState::Dead, &s).cause, Cause::Revived);
    }

    #[test]
    fn test_jump_sets_vertical_speed_and_cue() {
        let terrain = Terrain::flat(0.0);
        let config = MovementConfig::default();
        let mut actor = actor_at(Vec3::ZERO);
        let input = InputFrame::new().with_flags(InputFrame::FLAG_JUMP);

        let step = step(&mut actor, &terrain, &config, &input, Vec3::ZERO, DT);
        assert_eq!(step.to, MoveState::Airborne);
        assert_eq!(step.cues, vec![Cue::Jump]);
        assert_eq!(actor.locomotion.move_dir.y, config.jump_speed);
    }

    #[test]
    fn test_crouch_halves_capsule() {
        let terrain = Terrain::flat(0.0);
        let config = MovementConfig::default();
        let mut actor = actor_at(Vec3::ZERO);
        let input = InputFrame::new().with_flags(InputFrame::FLAG_CROUCH);

        step(&mut actor, &terrain, &config, &input, Vec3::ZERO, DT);
        assert_eq!(actor.state, MoveState::Crouching);
        assert_eq!(actor.controller.capsule.height, 1.0);
    }

    #[test]
    fn test_idle_brakes_at_walk_deceleration() {
        let terrain = Terrain::flat(0.0);
        let config = MovementConfig::default();
        let mut actor = actor_at(Vec3::ZERO);
        actor.locomotion.horizontal_speed = 5.0;

        step(&mut actor, &terrain, &config, &InputFrame::new(), Vec3::ZERO, DT);
        assert_eq!(actor.state, MoveState::Idle);
        let expected = 5.0 - config.walk_deceleration * DT;
        assert!((actor.locomotion.horizontal_speed - expected).abs() < 1e-5);
        assert!((actor.locomotion.horizontal_speed - 4.6).abs() < 1e-5);
    }

    #[test]
    fn test_run_into_crouch_clamps_speed() {
        let terrain = Terrain::flat(0.0);
        let config = MovementConfig::default();
        let mut actor = actor_at(Vec3::ZERO);
        actor.state = MoveState::Running;
        actor.locomotion.horizontal_speed = 8.0;
        let input = InputFrame::with_movement(0.0, 1.0)
            .with_flags(InputFrame::FLAG_RUN | InputFrame::FLAG_CROUCH);

        step(&mut actor, &terrain, &config, &input, Vec3::FORWARD, DT);
        assert_eq!(actor.state, MoveState::Crouching);
        assert_eq!(actor.locomotion.horizontal_speed, config.crouch_speed);
    }

    #[test]
    fn test_ladder_entry_snaps_yaw_and_climbs_up() {
        let ladder = Ladder {
            bounds: Aabb::new(Vec3::new(-1.0, 0.0, -1.0), Vec3::new(1.0, 5.0, 1.0)),
            yaw: 90.0,
        };
        let terrain = Terrain::flat(0.0).with_ladder(ladder);
        let config = MovementConfig::default();
        let mut actor = actor_at(Vec3::ZERO);
        actor.locomotion.ladder = Some(ladder);

        let input = InputFrame::with_movement(0.0, 1.0);
        step(&mut actor, &terrain, &config, &input, Vec3::FORWARD, DT);
        assert_eq!(actor.state, MoveState::Climbing);
        assert_eq!(actor.yaw, 90.0);

        step(&mut actor, &terrain, &config, &input, Vec3::FORWARD, DT);
        assert_eq!(actor.locomotion.move_dir, Vec3::new(0.0, config.climb_speed, 0.0));
    }

    #[test]
    fn test_dead_keeps_falling() {
        let terrain = Terrain::flat(0.0);
        let config = MovementConfig::default();
        let mut actor = actor_at(Vec3::new(0.0, 10.0, 0.0));
        actor.state = MoveState::Dead;
        actor.health.set(0);

        step(&mut actor, &terrain, &config, &InputFrame::with_movement(1.0, 0.0), Vec3::RIGHT, DT);
        let expected = config.gravity * config.gravity_multiplier * DT;
        assert_eq!(actor.locomotion.move_dir, Vec3::new(0.0, expected, 0.0));
        assert_eq!(actor.state, MoveState::Dead);
    }

    #[test]
    fn test_landing_cue() {
        let terrain = Terrain::flat(0.0);
        let config = MovementConfig::default();
        let mut actor = actor_at(Vec3::ZERO);
        actor.state = MoveState::Airborne;

        let step = step(&mut actor, &terrain, &config, &InputFrame::new(), Vec3::ZERO, DT);
        assert_eq!(step.cause, Cause::Landed);
        assert_eq!(step.cues, vec![Cue::Landing]);
        assert_eq!(actor.locomotion.next_step, 0.5);
    }

    fn any_state() -> impl Strategy<Value = MoveState> {
        (0u8..MoveState::COUNT).prop_map(|b| MoveState::try_from(b).unwrap_or_default())
    }

    fn any_signals() -> impl Strategy<Value = Signals> {
        proptest::collection::vec(any::<bool>(), 14).prop_map(|b| Signals {
            died: b[0],
            falling: b[1],
            jump_requested: b[2],
            crouch_toggle: b[3],
            crawl_toggle: b[4],
            ladder_enter: b[5],
            ladder_exit: b[6],
            underwater: b[7],
            landed: b[8],
            can_stand: b[9],
            can_crouch: b[10],
            has_input: b[11],
            horizontal_stopped: b[12],
            running: b[13],
        })
    }

    proptest! {
        #[test]
        fn prop_transition_is_pure(state in any_state(), s in any_signals()) {
            prop_assert_eq!(decide(state, &s), decide(state, &s));
        }

        #[test]
        fn prop_only_declared_edges(state in any_state(), s in any_signals()) {
            let next = next_state(state, &s);
            prop_assert!(next == state || edges(state).contains(&next));
        }

        #[test]
        fn prop_death_always_wins(state in any_state(), s in any_signals()) {
            let s = Signals { died: true, ..s };
            prop_assert_eq!(next_state(state, &s), MoveState::Dead);
        }
    }
}
