//! Local Predictor
//!
//! Runs only on the peer that owns an actor, once per fixed tick: input to
//! desired direction, state machine, collider move, packed [`Move`].

use crate::core::vec3::Vec3;
use crate::game::collision::Environment;
use crate::game::config::MovementConfig;
use crate::game::events::Cue;
use crate::game::input::InputFrame;
use crate::game::machine::{self, Cause};
use crate::game::moves::Move;
use crate::game::state::{MoveState, MovementActor};

/// Outcome of one predicted tick.
#[derive(Clone, Debug, PartialEq)]
pub struct Prediction {
    /// Move to hand to the transport
    pub mv: Move,
    /// State before the tick
    pub from: MoveState,
    /// State after the tick
    pub to: MoveState,
    /// Edge taken
    pub cause: Cause,
    /// Local-only cues
    pub cues: Vec<Cue>,
}

/// Camera-relative move direction, projected onto the ground under the
/// actor when there is any.
pub fn desired_direction(actor: &MovementActor, env: &dyn Environment, input: &InputFrame) -> Vec3 {
    let dir = input.direction();
    let desired = Vec3::forward_from_yaw(actor.yaw) * dir.y + Vec3::right_from_yaw(actor.yaw) * dir.x;
    match env.ground_normal(&actor.controller.capsule) {
        Some(normal) => desired.project_on_plane(normal).normalize(),
        None => desired,
    }
}

/// Refresh the remembered water and ladder volumes.
///
/// Water is forgotten as soon as it is not touched. A ladder being climbed
/// is kept until the machine sees the exit; otherwise it is forgotten when
/// not touched.
pub fn sense_volumes(actor: &mut MovementActor, env: &dyn Environment) {
    let bounds = actor.controller.capsule.bounds();
    let climbing = actor.state == MoveState::Climbing;
    let loco = &mut actor.locomotion;

    loco.water = env.water_touching(&bounds);
    match env.ladder_touching(&bounds) {
        Some(ladder) if !climbing || loco.ladder.is_none() => loco.ladder = Some(ladder),
        Some(_) => {}
        None if !climbing => loco.ladder = None,
        None => {}
    }
}

/// Predict one tick for an owned actor.
pub fn predict(
    actor: &mut MovementActor,
    env: &dyn Environment,
    config: &MovementConfig,
    input: &InputFrame,
    dt: f32,
) -> Prediction {
    let input = input.sanitized();

    if let Some(look) = input.look_yaw {
        if !matches!(actor.state, MoveState::Climbing | MoveState::Dead) {
            actor.yaw = look;
        }
    }

    let desired = desired_direction(actor, env, &input);
    sense_volumes(actor, env);

    let step = machine::step(actor, env, config, &input, desired, dt);

    if !actor.controller.grounded {
        actor.last_fall = actor.controller.velocity;
    }

    let delta = actor.locomotion.move_dir * dt;
    actor.controller.move_by(env, delta, dt);
    actor.velocity = actor.controller.velocity;
    actor.yaw = actor.yaw.rem_euclid(360.0);

    Prediction {
        mv: actor.current_move(),
        from: step.from,
        to: step.to,
        cause: step.cause,
        cues: step.cues,
    }
}

// =============================================================================
// TESTS
// =============================================================================
