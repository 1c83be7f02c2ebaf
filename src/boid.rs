//! Boid flocking inside soft containment boxes.
//!
//! Every boid is always "flying": a tick only accumulates forces and integrates
//! them. Each tick reads every boid before any boid moves, so the result does
//! not depend on iteration order.

use std::{f32::consts::TAU, sync::Arc};

use nalgebra::{Matrix4, Rotation3};
use rand::Rng;
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use tracing::{debug, info_span, trace};

use crate::{
    error::{ReefError, Result},
    mesh::Mesh,
    random::random_between,
    types::{EPSILON, Point, Value, Vector},
};

/// Fraction of the accumulated acceleration kept when integrating.
pub const ACCELERATION_DAMPING: Value = 0.005;
/// Velocity gain applied every tick before the speed clamp.
pub const SPEED_GAIN: Value = 3.;
/// Coefficient of the cubic containment spring.
pub const CONTAINMENT_STIFFNESS: Value = 0.001;
/// Gain of the optional pull back towards the box centre.
pub const CENTRE_PULL_GAIN: Value = 0.04;

/// Axis-aligned box `{x: [lo, hi], y: [lo, hi], z: [lo, hi]}`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub x: [Value; 2],
    pub y: [Value; 2],
    pub z: [Value; 2],
}

impl BoundingBox {
    pub fn new(x: [Value; 2], y: [Value; 2], z: [Value; 2]) -> Result<Self> {
        if [x, y, z].iter().any(|[lo, hi]| lo > hi) {
            return Err(ReefError::InvalidBox);
        }
        Ok(Self { x, y, z })
    }

    fn axes(&self) -> [[Value; 2]; 3] {
        [self.x, self.y, self.z]
    }

    pub fn centre(&self) -> Point {
        let [x, y, z] = self.axes().map(|[lo, hi]| (lo + hi) / 2.);
        Point::new(x, y, z)
    }

    pub fn contains(&self, p: &Point) -> bool {
        self.axes()
            .iter()
            .zip(p.iter())
            .all(|(&[lo, hi], &c)| (lo..=hi).contains(&c))
    }

    /// Shrinks every axis by `margin` on both sides. Axes narrower than
    /// `2 * margin` collapse onto their midpoint.
    pub fn shrunk(&self, margin: Value) -> Self {
        let [x, y, z] = self.axes().map(|[lo, hi]| {
            if hi - lo < 2. * margin {
                let mid = (lo + hi) / 2.;
                [mid, mid]
            } else {
                [lo + margin, hi - margin]
            }
        });
        Self { x, y, z }
    }

    /// Cubic spring pushing `p` back inside: zero inside the box, `(bound - p)^3`
    /// scaled by [`CONTAINMENT_STIFFNESS`] outside it.
    pub fn restoring_acceleration(&self, p: &Point) -> Vector {
        let axis = |[lo, hi]: [Value; 2], c: Value| {
            let mut a = 0.;
            if c > hi {
                a += (hi - c).powi(3) * CONTAINMENT_STIFFNESS;
            }
            if c < lo {
                a += (lo - c).powi(3) * CONTAINMENT_STIFFNESS;
            }
            a
        };
        Vector::new(axis(self.x, p.x), axis(self.y, p.y), axis(self.z, p.z))
    }
}

/// One agent of a [`Flock`].
#[derive(Clone, Debug)]
pub struct Boid {
    pub position: Point,
    pub velocity: Vector,
    /// Forces accumulated for the next integration step.
    pub acceleration: Vector,
    /// Nominal cruising speed rolled at spawn.
    pub speed: Value,
    pub max_speed: Value,
    pub max_force: Value,
    pub colour: [f32; 3],
    /// Soft containment box.
    pub bounds: BoundingBox,
    /// Untransformed mesh, shared between boids.
    pub template: Arc<Mesh>,
    /// `template` moved into place for the current frame.
    pub shape: Mesh,
    /// Heading around Z, radians.
    pub yaw: Value,
    /// Elevation above the XY plane, radians.
    pub pitch: Value,
    /// Sum of the flocking forces applied during the last tick.
    pub steering: Vector,
}

impl Boid {
    pub fn new(position: Point, velocity: Vector, bounds: BoundingBox, template: Arc<Mesh>) -> Self {
        let mut boid = Self {
            position,
            velocity,
            acceleration: Vector::zeros(),
            speed: 0.008,
            max_speed: 1.,
            max_force: 3.,
            colour: [1., 1., 1.],
            bounds,
            shape: Mesh::new_empty(),
            template,
            yaw: 0.,
            pitch: 0.,
            steering: Vector::zeros(),
        };
        boid.orient();
        boid
    }

    pub fn with_max_speed(mut self, max_speed: Value) -> Self {
        self.max_speed = max_speed;
        self
    }

    pub fn with_max_force(mut self, max_force: Value) -> Self {
        self.max_force = max_force;
        self
    }

    pub fn with_colour(mut self, colour: [f32; 3]) -> Self {
        self.colour = colour;
        self
    }

    /// Rescales `force` so its length never exceeds `max_force`.
    pub fn limit_force(&self, force: Vector) -> Vector {
        let len = force.norm();
        if len > self.max_force {
            force * (self.max_force / len)
        } else {
            force
        }
    }

    /// Adds `force` to the acceleration after clamping it to `max_force`.
    pub fn apply_force(&mut self, force: Vector) {
        self.acceleration += self.limit_force(force);
    }

    /// Pushes the boid along `away` with strength `factor`. A zero vector has
    /// no direction and is ignored.
    pub fn repel(&mut self, away: Vector, factor: Value) {
        if let Some(dir) = away.try_normalize(EPSILON) {
            self.apply_force(dir * factor);
        }
    }

    /// Integrates one step and refreshes the shape.
    ///
    /// ```text
    /// acc *= 0.005; vel += acc; vel *= 3; |vel| <= max_speed
    /// acc = 0; pos += vel; acc += containment(pos)   (felt next tick)
    /// ```
    pub fn update(&mut self) {
        self.acceleration *= ACCELERATION_DAMPING;
        self.velocity += self.acceleration;
        self.velocity *= SPEED_GAIN;

        let speed = self.velocity.norm();
        if speed > self.max_speed {
            self.velocity *= self.max_speed / speed;
        }

        self.acceleration = Vector::zeros();
        self.position += self.velocity;
        self.acceleration += self.bounds.restoring_acceleration(&self.position);

        self.orient();
    }

    /// Derives yaw and pitch from the velocity and moves the template into place.
    ///
    /// A zero velocity keeps the previous orientation, and a purely vertical one
    /// keeps the previous yaw.
    pub fn orient(&mut self) {
        if self.velocity.norm() > EPSILON {
            let horizontal = Vector::new(self.velocity.x, self.velocity.y, 0.);
            if let Some(h) = horizontal.try_normalize(EPSILON) {
                // Unsigned angle from +X, unwrapped to [0, 2π) by the sign of y.
                let mut yaw = h.y.abs().atan2(h.x);
                if self.velocity.y < 0. {
                    yaw = TAU - yaw;
                }
                self.yaw = yaw;
            }

            let r = Rotation3::from_axis_angle(&Vector::z_axis(), -self.yaw) * self.velocity;
            let mut pitch = r.y.hypot(r.z).atan2(r.x);
            if r.x < 0. {
                pitch = -pitch;
            }
            if r.z < 0. {
                pitch = -pitch;
            }
            self.pitch = pitch;
        }

        self.shape = self.template.transformed(&self.transform());
    }

    /// `translate(position) * rotate_z(yaw) * rotate_y(-pitch)`.
    pub fn transform(&self) -> Matrix4<Value> {
        Matrix4::new_translation(&self.position.coords)
            * Rotation3::from_axis_angle(&Vector::z_axis(), self.yaw).to_homogeneous()
            * Rotation3::from_axis_angle(&Vector::y_axis(), -self.pitch).to_homogeneous()
    }
}

/// Behaviour shared by every boid of a flock.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FlockParams {
    /// Distance from the box centre past which boids are pulled back. `None` disables it.
    pub centre_pull_threshold: Option<Value>,
    /// Boids closer than this push each other apart.
    pub repel_distance: Value,
    pub repel_factor: Value,
    /// Boids closer than this (and ahead) attract each other.
    pub influence_distance: Value,
    /// Strength of the pull towards the neighbours' centroid.
    pub swarming_tendency: Value,
    /// Strength of the turn towards the neighbours' mean heading.
    pub flocking_tendency: Value,
    pub max_speed: Value,
    /// Compute steering on the rayon pool.
    pub parallel: bool,
}

impl Default for FlockParams {
    fn default() -> Self {
        Self {
            centre_pull_threshold: None,
            repel_distance: 0.5,
            repel_factor: 1.,
            influence_distance: 2.,
            swarming_tendency: 0.5,
            flocking_tendency: 0.,
            max_speed: 0.05,
            parallel: false,
        }
    }
}

impl FlockParams {
    pub fn with_repel(mut self, distance: Value, factor: Value) -> Self {
        self.repel_distance = distance;
        self.repel_factor = factor;
        self
    }

    pub fn with_influence(mut self, distance: Value, swarming_tendency: Value) -> Self {
        self.influence_distance = distance;
        self.swarming_tendency = swarming_tendency;
        self
    }

    pub fn with_flocking_tendency(mut self, flocking_tendency: Value) -> Self {
        self.flocking_tendency = flocking_tendency;
        self
    }

    pub fn with_centre_pull(mut self, threshold: Option<Value>) -> Self {
        self.centre_pull_threshold = threshold;
        self
    }

    pub fn with_max_speed(mut self, max_speed: Value) -> Self {
        self.max_speed = max_speed;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }
}

/// How to populate a new flock.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpawnParams {
    /// Region boids spawn in.
    pub bounds: BoundingBox,
    pub count: usize,
    /// Uniform scale applied to the mesh templates.
    pub scale: Value,
    /// Containment box inset, so boids have room to turn before leaving `bounds`.
    pub margin: Value,
}

impl SpawnParams {
    pub fn new(bounds: BoundingBox, count: usize) -> Self {
        Self {
            bounds,
            count,
            scale: 1.,
            margin: 10.,
        }
    }

    pub fn with_scale(mut self, scale: Value) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_margin(mut self, margin: Value) -> Self {
        self.margin = margin;
        self
    }
}

/// A set of boids sharing one set of [`FlockParams`].
#[derive(Clone, Debug, Default)]
pub struct Flock {
    pub boids: Vec<Boid>,
    pub params: FlockParams,
}

impl Flock {
    pub fn new(params: FlockParams) -> Self {
        Self {
            boids: Vec::new(),
            params,
        }
    }

    /// Spawns `spawn.count` boids with random positions, velocities and colours.
    ///
    /// Each boid picks one of `templates` uniformly.
    pub fn spawn<R: Rng + ?Sized>(
        params: FlockParams,
        spawn: &SpawnParams,
        templates: &[Mesh],
        rng: &mut R,
    ) -> Result<Self> {
        if templates.is_empty() {
            return Err(ReefError::EmptyTemplates);
        }
        for t in templates {
            t.validate()?;
        }

        let templates: Vec<Arc<Mesh>> = templates
            .iter()
            .map(|m| Arc::new(m.scaled(spawn.scale)))
            .collect();
        let bounds = spawn.bounds;
        let containment = bounds.shrunk(spawn.margin);

        let mut flock = Self::new(params);
        flock.boids.reserve(spawn.count);
        for _ in 0..spawn.count {
            let speed = rng.r#gen::<Value>() / 500. + 0.008;
            let position = Point::new(
                random_between(rng, bounds.x[0], bounds.x[1]),
                random_between(rng, bounds.y[0], bounds.y[1]),
                random_between(rng, bounds.z[0], bounds.z[1]),
            );
            let velocity = Vector::new(
                rng.r#gen::<Value>() + 0.01,
                rng.r#gen::<Value>() + 0.01,
                rng.r#gen::<Value>() + 0.01,
            );
            let max_speed = random_between(rng, params.max_speed * 0.8, params.max_speed * 1.1);

            let colour = if rng.r#gen::<Value>() < 0.3 {
                [
                    random_between(rng, 0.4, 0.5),
                    random_between(rng, 0.4, 0.5),
                    random_between(rng, 0.5, 0.7),
                ]
            } else {
                [
                    random_between(rng, 0.7, 1.),
                    random_between(rng, 0.1, 0.4),
                    random_between(rng, 0.1, 0.2),
                ]
            };
            let template = Arc::clone(&templates[rng.gen_range(0..templates.len())]);

            let mut boid = Boid::new(position, velocity, containment, template)
                .with_max_speed(max_speed)
                .with_colour(colour);
            boid.speed = speed;
            flock.boids.push(boid);
        }

        debug!(count = flock.boids.len(), "flock spawned");
        Ok(flock)
    }

    pub fn push(&mut self, boid: Boid) {
        self.boids.push(boid);
    }

    pub fn len(&self) -> usize {
        self.boids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Boid> {
        self.boids.iter()
    }

    /// Sum of the clamped flocking forces acting on boid `i`, read from the
    /// current state of the flock.
    ///
    /// ```text
    /// d < repel_distance                       → away from o, * repel_factor
    /// d < influence_distance, o ahead or level → centroid += o.position
    /// count > 0                                → towards centroid, * swarming_tendency
    ///                                          → along mean heading, * flocking_tendency
    /// |centre - p| > centre_pull_threshold     → towards centre, * (excess * 0.04)
    /// ```
    pub fn steering_for(&self, i: usize) -> Vector {
        let p = &self.params;
        let boid = &self.boids[i];
        let mut steering = Vector::zeros();

        let mut centroid = Vector::zeros();
        let mut heading = Vector::zeros();
        let mut count = 0usize;

        for (j, other) in self.boids.iter().enumerate() {
            if j == i {
                continue;
            }
            let offset = other.position - boid.position;
            let d = offset.norm();

            if d < p.repel_distance {
                if let Some(away) = (-offset).try_normalize(EPSILON) {
                    steering += boid.limit_force(away * p.repel_factor);
                }
            }

            if d < p.influence_distance && boid.velocity.dot(&offset) >= 0. {
                centroid += other.position.coords;
                heading += other.velocity;
                count += 1;
            }
        }

        if count > 0 {
            let centre = Point::from(centroid / count as Value);
            if let Some(towards) = (centre - boid.position).try_normalize(EPSILON) {
                steering += boid.limit_force(towards * p.swarming_tendency);
            }
            if p.flocking_tendency != 0. {
                if let Some(h) = heading.try_normalize(EPSILON) {
                    steering += boid.limit_force(h * p.flocking_tendency);
                }
            }
        }

        if let Some(threshold) = p.centre_pull_threshold {
            let towards = boid.bounds.centre() - boid.position;
            let d = towards.norm();
            if d > threshold {
                if let Some(dir) = towards.try_normalize(EPSILON) {
                    steering += boid.limit_force(dir * (d - threshold) * CENTRE_PULL_GAIN);
                }
            }
        }

        steering
    }

    /// Steering for every boid, in order.
    pub fn steering_forces(&self) -> Vec<Vector> {
        if self.params.parallel {
            (0..self.boids.len())
                .into_par_iter()
                .map(|i| self.steering_for(i))
                .collect()
        } else {
            (0..self.boids.len()).map(|i| self.steering_for(i)).collect()
        }
    }

    /// Advances the simulation by one frame.
    ///
    /// Steering is computed for all boids first; only then does each boid
    /// apply it and integrate.
    pub fn tick(&mut self) {
        let _span = info_span!("flock_tick", boids = self.boids.len()).entered();

        let forces = self.steering_forces();
        for (boid, force) in self.boids.iter_mut().zip(forces) {
            boid.steering = force;
            boid.acceleration += force;
            boid.update();
        }

        trace!("flock advanced");
    }
}

#[cfg(test)]
mod tests {
    use std::f32::consts::FRAC_PI_2;

    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    fn unit_box() -> BoundingBox {
        BoundingBox::new([-10., 10.], [-10., 10.], [-10., 10.]).unwrap()
    }

    fn arrow() -> Arc<Mesh> {
        Arc::new(Mesh::from_triangle_soup(&[
            Point::new(1., 0., 0.),
            Point::new(-1., 0.5, 0.),
            Point::new(-1., -0.5, 0.),
        ]))
    }

    #[test]
    fn rejects_inverted_boxes() {
        assert_eq!(
            BoundingBox::new([1., 0.], [0., 1.], [0., 1.]),
            Err(ReefError::InvalidBox)
        );
    }

    #[test]
    fn forces_are_clamped() {
        let mut boid = Boid::new(Point::origin(), Vector::x(), unit_box(), arrow()).with_max_force(2.);
        boid.apply_force(Vector::new(30., 40., 0.));
        assert!((boid.acceleration.norm() - 2.).abs() < 1e-5);
        assert!((boid.acceleration.normalize() - Vector::new(0.6, 0.8, 0.)).norm() < 1e-5);
    }

    #[test]
    fn repel_ignores_zero_vectors() {
        let mut boid = Boid::new(Point::origin(), Vector::x(), unit_box(), arrow());
        boid.repel(Vector::zeros(), 5.);
        assert_eq!(boid.acceleration, Vector::zeros());
        boid.repel(Vector::new(0., -3., 0.), 0.5);
        assert_eq!(boid.acceleration, Vector::new(0., -0.5, 0.));
    }

    #[test]
    fn speed_is_clamped_after_gain() {
        let mut boid = Boid::new(Point::origin(), Vector::new(0.1, 0., 0.), unit_box(), arrow())
            .with_max_speed(0.2);
        boid.update();
        assert!((boid.velocity.norm() - 0.2).abs() < 1e-6);
        assert!((boid.position.x - 0.2).abs() < 1e-6);
    }

    #[test]
    fn heading_follows_velocity() {
        let mut boid = Boid::new(Point::origin(), Vector::new(0., 1., 0.), unit_box(), arrow());
        boid.orient();
        assert!((boid.yaw - FRAC_PI_2).abs() < 1e-5);
        assert!(boid.pitch.abs() < 1e-5);
        // The arrow's nose (+X in the template) now points along +Y.
        let nose = boid.shape.vertices[0];
        assert!(nose[0].abs() < 1e-5 && (nose[1] - 1.).abs() < 1e-5);

        boid.velocity = Vector::new(0., -1., 0.);
        boid.orient();
        assert!((boid.yaw - 3. * FRAC_PI_2).abs() < 1e-5);
    }

    #[test]
    fn climbing_pitches_the_nose_up() {
        let mut boid = Boid::new(Point::origin(), Vector::new(1., 0., 1.), unit_box(), arrow());
        boid.orient();
        assert!((boid.pitch - std::f32::consts::FRAC_PI_4).abs() < 1e-5);
        assert!(boid.shape.vertices[0][2] > 0.5);

        boid.velocity = Vector::new(1., 0., -1.);
        boid.orient();
        assert!(boid.pitch < 0.);
    }

    #[test]
    fn zero_velocity_keeps_orientation() {
        let mut boid = Boid::new(Point::origin(), Vector::new(0., 1., 1.), unit_box(), arrow());
        let (yaw, pitch) = (boid.yaw, boid.pitch);
        boid.velocity = Vector::zeros();
        boid.orient();
        assert_eq!((boid.yaw, boid.pitch), (yaw, pitch));
        assert!(boid.shape.vertices.iter().flatten().all(|c| c.is_finite()));
    }

    #[test]
    fn lone_boid_has_no_steering() {
        let mut flock = Flock::new(FlockParams::default());
        flock.push(Boid::new(Point::origin(), Vector::x(), unit_box(), arrow()));
        assert_eq!(flock.steering_forces(), vec![Vector::zeros()]);
        flock.tick();
        assert!(flock.boids[0].position.iter().all(|c| c.is_finite()));
    }

    #[test]
    fn centre_pull_only_beyond_threshold() {
        let params = FlockParams::default().with_centre_pull(Some(5.));
        let mut flock = Flock::new(params);
        flock.push(Boid::new(Point::new(8., 0., 0.), Vector::x(), unit_box(), arrow()));
        flock.push(Boid::new(Point::new(0., 3., 0.), Vector::y(), unit_box(), arrow()));
        let forces = flock.steering_forces();
        assert!(forces[0].x < 0.);
        assert!((forces[0].x + 3. * CENTRE_PULL_GAIN).abs() < 1e-6);
        assert_eq!(forces[1], Vector::zeros());
    }

    #[test]
    fn centred_boid_feels_no_pull_for_negative_threshold() {
        let mut flock = Flock::new(FlockParams::default().with_centre_pull(Some(-1.)));
        flock.push(Boid::new(Point::origin(), Vector::x(), unit_box(), arrow()));
        let forces = flock.steering_forces();
        assert_eq!(forces[0], Vector::zeros());
        flock.tick();
        assert!(flock.boids[0].position.iter().all(|c| c.is_finite()));
    }

    #[test]
    fn alignment_needs_a_tendency() {
        let params = FlockParams::default()
            .with_repel(0., 0.)
            .with_influence(5., 0.)
            .with_flocking_tendency(0.5);
        let mut flock = Flock::new(params);
        flock.push(Boid::new(Point::origin(), Vector::x(), unit_box(), arrow()));
        flock.push(Boid::new(Point::new(1., 0., 0.), Vector::y(), unit_box(), arrow()));
        let forces = flock.steering_forces();
        assert!((forces[0] - Vector::new(0., 0.5, 0.)).norm() < 1e-6);
    }

    #[test]
    fn spawned_boids_respect_parameters() {
        let mut rng = StdRng::seed_from_u64(17);
        let bounds = BoundingBox::new([0., 40.], [0., 40.], [0., 30.]).unwrap();
        let spawn = SpawnParams::new(bounds, 64).with_scale(2.);
        let flock = Flock::spawn(FlockParams::default(), &spawn, &[(*arrow()).clone()], &mut rng).unwrap();

        assert_eq!(flock.len(), 64);
        for boid in flock.iter() {
            assert!(bounds.contains(&boid.position));
            assert!(boid.max_speed >= 0.04 - 1e-6 && boid.max_speed <= 0.055 + 1e-6);
            assert_eq!(boid.bounds, bounds.shrunk(10.));
            assert_eq!(boid.template.vertices[0], [2., 0., 0.]);
            assert_eq!(boid.shape.vertices.len(), 3);
        }
    }

    #[test]
    fn spawn_needs_templates() {
        let mut rng = StdRng::seed_from_u64(0);
        let spawn = SpawnParams::new(unit_box(), 3);
        assert_eq!(
            Flock::spawn(FlockParams::default(), &spawn, &[], &mut rng).err(),
            Some(ReefError::EmptyTemplates)
        );
    }

    #[test]
    fn shrinking_collapses_narrow_axes() {
        let b = BoundingBox::new([0., 4.], [0., 100.], [0., 30.]).unwrap().shrunk(10.);
        assert_eq!(b.x, [2., 2.]);
        assert_eq!(b.y, [10., 90.]);
    }
}
