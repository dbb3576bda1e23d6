//! Collision and Character Controller
//!
//! Capsule-vs-world queries used by the predictor and by buffer drains.
//! The world is abstracted behind [`Environment`]; [`Terrain`] is the
//! box-based implementation the server and demo use.
//!
//! Capsules are positioned at their feet. Queries approximate the capsule
//! by its bounding box, which is exact for the axis-aligned geometry
//! `Terrain` supports.

use serde::{Serialize, Deserialize};

use crate::core::vec3::Vec3;

/// Gap kept between a capsule and a solid it was stopped by.
pub const SKIN: f32 = 0.001;

/// How far below the feet the ground probe reaches.
pub const GROUND_EPS: f32 = 0.01;

// =============================================================================
// SHAPES
// =============================================================================

/// Axis-aligned bounding box.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    /// Minimum corner
    pub min: Vec3,
    /// Maximum corner
    pub max: Vec3,
}

impl Aabb {
    /// Create from two corners (any order).
    pub fn new(a: Vec3, b: Vec3) -> Self {
        Self {
            min: Vec3::new(a.x.min(b.x), a.y.min(b.y), a.z.min(b.z)),
            max: Vec3::new(a.x.max(b.x), a.y.max(b.y), a.z.max(b.z)),
        }
    }

    /// Closed intersection test (touching counts).
    #[inline]
    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x && self.max.x >= other.min.x
            && self.min.y <= other.max.y && self.max.y >= other.min.y
            && self.min.z <= other.max.z && self.max.z >= other.min.z
    }

    /// Open overlap test (touching does not count).
    #[inline]
    pub fn overlaps(&self, other: &Aabb) -> bool {
        self.min.x < other.max.x && self.max.x > other.min.x
            && self.min.y < other.max.y && self.max.y > other.min.y
            && self.min.z < other.max.z && self.max.z > other.min.z
    }

    /// XZ footprint contains the point.
    #[inline]
    pub fn contains_xz(&self, p: Vec3) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.z >= self.min.z && p.z <= self.max.z
    }

    /// Translated copy.
    #[inline]
    pub fn translated(&self, d: Vec3) -> Self {
        Self { min: self.min + d, max: self.max + d }
    }
}

/// Vertical capsule, positioned at its feet.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Capsule {
    /// Bottom center
    pub feet: Vec3,
    /// Total height
    pub height: f32,
    /// Radius
    pub radius: f32,
}

impl Capsule {
    /// Bounding box.
    pub fn bounds(&self) -> Aabb {
        let r = self.radius;
        Aabb {
            min: Vec3::new(self.feet.x - r, self.feet.y, self.feet.z - r),
            max: Vec3::new(self.feet.x + r, self.feet.y + self.height, self.feet.z + r),
        }
    }

    /// Copy with a new height. Feet stay put; radius never exceeds half the height.
    pub fn with_height(&self, height: f32, default_radius: f32) -> Self {
        Self {
            feet: self.feet,
            height,
            radius: default_radius.min(height / 2.0),
        }
    }
}

/// A climbable volume.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Ladder {
    /// Trigger volume
    pub bounds: Aabb,
    /// Facing yaw (degrees); climbers are snapped to it
    pub yaw: f32,
}

/// Outcome of a swept move.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SweepResult {
    /// Final feet position
    pub position: Vec3,
    /// Standing on something after the move
    pub grounded: bool,
    /// Standing on a surface too steep to walk
    pub sliding: bool,
}

// =============================================================================
// ENVIRONMENT
// =============================================================================

/// World geometry as seen by character movement.
///
/// Every peer must use an equivalent environment: the authority replays
/// client moves against its own copy and rubberbands on disagreement.
pub trait Environment: Send + Sync {
    /// Move a capsule by `delta`, stopping at solids.
    fn sweep(&self, capsule: &Capsule, delta: Vec3) -> SweepResult;

    /// The capsule does not overlap any solid.
    fn fits(&self, capsule: &Capsule) -> bool;

    /// Something is directly under the feet.
    fn is_grounded(&self, capsule: &Capsule) -> bool;

    /// Normal of the ground under the capsule, if any.
    fn ground_normal(&self, capsule: &Capsule) -> Option<Vec3>;

    /// First ladder volume touching the bounds.
    fn ladder_touching(&self, bounds: &Aabb) -> Option<Ladder>;

    /// First water volume touching the bounds.
    fn water_touching(&self, bounds: &Aabb) -> Option<Aabb>;

    /// A downward ray from `origin` hits solid ground within `distance`.
    /// Water volumes are ignored.
    fn ray_down_hits(&self, origin: Vec3, distance: f32) -> bool;
}

/// Box world: an infinite floor plane, solid boxes, ladders and water.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Terrain {
    /// Height of the floor plane
    pub floor_y: f32,
    /// Solid boxes
    pub solids: Vec<Aabb>,
    /// Ladder volumes
    pub ladders: Vec<Ladder>,
    /// Water volumes
    pub water: Vec<Aabb>,
}

impl Terrain {
    /// Flat floor at `floor_y`, nothing else.
    pub fn flat(floor_y: f32) -> Self {
        Self { floor_y, ..Default::default() }
    }

    /// Add a solid box.
    pub fn with_solid(mut self, solid: Aabb) -> Self {
        self.solids.push(solid);
        self
    }

    /// Add a ladder.
    pub fn with_ladder(mut self, ladder: Ladder) -> Self {
        self.ladders.push(ladder);
        self
    }

    /// Add a water volume.
    pub fn with_water(mut self, water: Aabb) -> Self {
        self.water.push(water);
        self
    }

    /// Sweep one axis (0 = x, 1 = y, 2 = z). Returns the allowed displacement.
    fn sweep_axis(&self, bounds: &Aabb, axis: usize, d: f32) -> f32 {
        if d == 0.0 {
            return 0.0;
        }
        let offset = axis_vec(axis, d);
        let candidate = bounds.translated(offset);
        let mut allowed = d;

        for solid in &self.solids {
            if !candidate.overlaps(solid) || bounds.overlaps(solid) {
                continue;
            }
            if d > 0.0 {
                allowed = allowed.min(component(solid.min, axis) - component(bounds.max, axis) - SKIN);
            } else {
                allowed = allowed.max(component(solid.max, axis) - component(bounds.min, axis) + SKIN);
            }
        }

        // never reverse direction
        if d > 0.0 { allowed.max(0.0) } else { allowed.min(0.0) }
    }
}

fn component(v: Vec3, axis: usize) -> f32 {
    match axis {
        0 => v.x,
        1 => v.y,
        _ => v.z,
    }
}

fn axis_vec(axis: usize, d: f32) -> Vec3 {
    match axis {
        0 => Vec3::new(d, 0.0, 0.0),
        1 => Vec3::new(0.0, d, 0.0),
        _ => Vec3::new(0.0, 0.0, d),
    }
}

impl Environment for Terrain {
    fn sweep(&self, capsule: &Capsule, delta: Vec3) -> SweepResult {
        let mut moved = *capsule;

        // X, Z, then Y so steps down land after horizontal motion
        for axis in [0usize, 2, 1] {
            let d = component(delta, axis);
            let allowed = self.sweep_axis(&moved.bounds(), axis, d);
            moved.feet += axis_vec(axis, allowed);
        }

        if moved.feet.y < self.floor_y {
            moved.feet.y = self.floor_y;
        }

        SweepResult {
            position: moved.feet,
            grounded: delta.y <= 0.0 && self.is_grounded(&moved),
            sliding: false,
        }
    }

    fn fits(&self, capsule: &Capsule) -> bool {
        let bounds = capsule.bounds();
        capsule.feet.y >= self.floor_y && !self.solids.iter().any(|s| bounds.overlaps(s))
    }

    fn is_grounded(&self, capsule: &Capsule) -> bool {
        if capsule.feet.y <= self.floor_y + GROUND_EPS {
            return true;
        }
        let bounds = capsule.bounds();
        let probe = Aabb {
            min: Vec3::new(bounds.min.x, bounds.min.y - GROUND_EPS, bounds.min.z),
            max: Vec3::new(bounds.max.x, bounds.min.y, bounds.max.z),
        };
        self.solids.iter().any(|s| probe.overlaps(s))
    }

    fn ground_normal(&self, capsule: &Capsule) -> Option<Vec3> {
        if self.is_grounded(capsule) {
            Some(Vec3::UP)
        } else {
            None
        }
    }

    fn ladder_touching(&self, bounds: &Aabb) -> Option<Ladder> {
        self.ladders.iter().find(|l| l.bounds.intersects(bounds)).copied()
    }

    fn water_touching(&self, bounds: &Aabb) -> Option<Aabb> {
        self.water.iter().find(|w| w.intersects(bounds)).copied()
    }

    fn ray_down_hits(&self, origin: Vec3, distance: f32) -> bool {
        let bottom = origin.y - distance;
        if self.floor_y <= origin.y && self.floor_y >= bottom {
            return true;
        }
        self.solids.iter().any(|s| {
            s.contains_xz(origin) && s.min.y <= origin.y && s.max.y >= bottom
        })
    }
}

// =============================================================================
// CHARACTER CONTROLLER
// =============================================================================

/// Kinematic capsule mover.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CharacterController {
    /// Current capsule
    pub capsule: Capsule,
    /// Standing height
    pub default_height: f32,
    /// Standing radius
    pub default_radius: f32,
    /// Touching ground after the last move
    pub grounded: bool,
    /// On a too-steep slope after the last move
    pub sliding: bool,
    /// Displacement of the last move divided by its time step
    pub velocity: Vec3,
}

impl CharacterController {
    /// Create a standing controller with its feet at `position`.
    pub fn new(position: Vec3, height: f32, radius: f32) -> Self {
        Self {
            capsule: Capsule { feet: position, height, radius: radius.min(height / 2.0) },
            default_height: height,
            default_radius: radius,
            grounded: false,
            sliding: false,
            velocity: Vec3::ZERO,
        }
    }

    /// Feet position.
    #[inline]
    pub fn position(&self) -> Vec3 {
        self.capsule.feet
    }

    /// Move by `delta` over `dt` seconds.
    pub fn move_by(&mut self, env: &dyn Environment, delta: Vec3, dt: f32) {
        let before = self.capsule.feet;
        let result = env.sweep(&self.capsule, delta);
        self.capsule.feet = result.position;
        self.grounded = result.grounded;
        self.sliding = result.sliding;
        self.velocity = if dt > 0.0 {
            (result.position - before).scale(1.0 / dt)
        } else {
            Vec3::ZERO
        };
    }

    /// Place the feet at `position` without sweeping.
    pub fn teleport(&mut self, env: &dyn Environment, position: Vec3) {
        self.capsule.feet = position;
        self.grounded = env.is_grounded(&self.capsule);
        self.sliding = false;
        self.velocity = Vec3::ZERO;
    }

    /// Whether the capsule could be resized to `height` without overlapping.
    pub fn can_set_height(&self, env: &dyn Environment, height: f32) -> bool {
        env.fits(&self.capsule.with_height(height, self.default_radius))
    }

    /// Resize the capsule, keeping the feet in place.
    pub fn set_height(&mut self, height: f32) {
        self.capsule = self.capsule.with_height(height, self.default_radius);
    }

    /// Resize to `default_height * ratio` if not already that size.
    pub fn set_height_ratio(&mut self, ratio: f32) {
        let height = self.default_height * ratio;
        if self.capsule.height != height {
            self.set_height(height);
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
