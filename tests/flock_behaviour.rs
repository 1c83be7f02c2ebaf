use std::sync::Arc;

use bevy_reef::{
    boid::{Boid, BoundingBox, Flock, FlockParams, SpawnParams},
    mesh::Mesh,
    types::{Point, Vector},
};
use rand::{SeedableRng, rngs::StdRng};

fn tank() -> BoundingBox {
    BoundingBox::new([-10., 10.], [-10., 10.], [-10., 10.]).unwrap()
}

fn dart() -> Arc<Mesh> {
    Arc::new(Mesh::from_triangle_soup(&[
        Point::new(1., 0., 0.),
        Point::new(-1., 0.3, 0.),
        Point::new(-1., -0.3, 0.),
    ]))
}

fn boid(position: Point, velocity: Vector) -> Boid {
    Boid::new(position, velocity, tank(), dart()).with_max_speed(0.05)
}

#[test]
fn cohesion_steers_towards_neighbour() {
    let mut flock = Flock::new(FlockParams::default());
    let leader = Point::new(1.5, 0.5, 0.);
    flock.push(boid(Point::origin(), Vector::x()));
    flock.push(boid(leader, Vector::x()));

    flock.tick();
    let steering = flock.boids[0].steering;
    assert!(steering.norm() > 0.);
    assert!(steering.dot(&(leader - Point::origin())) > 0.);

    // The follower keeps drifting sideways towards the leader's line.
    for _ in 0..10 {
        flock.tick();
    }
    assert!(flock.boids[0].position.y > 0.);
}

#[test]
fn approaching_boids_pull_on_each_other() {
    let mut flock = Flock::new(FlockParams::default());
    let (a, b) = (Point::origin(), Point::new(1.5, 0.3, 0.));
    flock.push(boid(a, Vector::x()));
    flock.push(boid(b, -Vector::x()));

    flock.tick();
    assert!(flock.boids[0].steering.dot(&(b - a)) > 0.);
    assert!(flock.boids[1].steering.dot(&(a - b)) > 0.);
}

#[test]
fn neighbours_behind_are_ignored() {
    let mut flock = Flock::new(FlockParams::default().with_repel(0., 0.));
    flock.push(boid(Point::origin(), Vector::x()));
    flock.push(boid(Point::new(-1., 0.5, 0.), Vector::x()));

    let forces = flock.steering_forces();
    assert_eq!(forces[0], Vector::zeros());
    assert!(forces[1].x > 0.);
}

#[test]
fn repulsion_pushes_apart_within_max_force() {
    let params = FlockParams::default()
        .with_repel(0.5, 100.)
        .with_influence(2., 0.);
    let mut flock = Flock::new(params);
    flock.push(boid(Point::origin(), Vector::x()).with_max_force(0.5));
    flock.push(boid(Point::new(0.1, 0.05, 0.), Vector::x()).with_max_force(0.5));

    let forces = flock.steering_forces();
    let offset = Vector::new(0.1, 0.05, 0.);
    assert!(forces[0].dot(&offset) < 0.);
    assert!(forces[1].dot(&offset) > 0.);
    for f in &forces {
        assert!(f.norm() <= 0.5 + 1e-6);
    }
}

#[test]
fn containment_pushes_back_inside() {
    let mut flock = Flock::new(FlockParams::default());
    flock.push(boid(Point::new(12., 0., 0.), Vector::new(0.01, 0., 0.)));
    flock.push(boid(Point::new(0., -13., 0.), Vector::new(0., 0.01, 0.)));
    flock.push(boid(Point::new(0., 0., 14.), Vector::new(0., 0., -0.01)));
    flock.push(boid(Point::new(0., 0., 0.), Vector::new(0.01, 0., 0.)));

    flock.tick();
    assert!(flock.boids[0].acceleration.x < 0.);
    assert!(flock.boids[1].acceleration.y > 0.);
    assert!(flock.boids[2].acceleration.z < 0.);
    assert_eq!(flock.boids[3].acceleration, Vector::zeros());
}

#[test]
fn result_does_not_depend_on_boid_order() {
    let positions = [
        Point::new(0., 0., 0.),
        Point::new(0.3, 0.1, 0.),
        Point::new(1., -0.4, 0.2),
        Point::new(1.6, 0.2, -0.3),
    ];
    let mut forward = Flock::new(FlockParams::default());
    let mut backward = Flock::new(FlockParams::default());
    for p in positions {
        forward.push(boid(p, Vector::new(1., 0.2, 0.)));
    }
    for p in positions.iter().rev() {
        backward.push(boid(*p, Vector::new(1., 0.2, 0.)));
    }

    for _ in 0..5 {
        forward.tick();
        backward.tick();
    }

    // Neighbour sums run in a different order, so allow for rounding.
    for (a, b) in forward.iter().zip(backward.boids.iter().rev()) {
        assert!((a.position - b.position).norm() < 1e-5);
        assert!((a.velocity - b.velocity).norm() < 1e-5);
    }
}

#[test]
fn parallel_steering_matches_sequential() {
    let bounds = BoundingBox::new([0., 20.], [0., 20.], [0., 20.]).unwrap();
    let spawn = SpawnParams::new(bounds, 80).with_margin(2.);
    let params = FlockParams::default().with_influence(4., 0.5).with_centre_pull(Some(6.));

    let mut seq = Flock::spawn(params, &spawn, &[(*dart()).clone()], &mut StdRng::seed_from_u64(5)).unwrap();
    let mut par = Flock::spawn(
        params.with_parallel(true),
        &spawn,
        &[(*dart()).clone()],
        &mut StdRng::seed_from_u64(5),
    )
    .unwrap();

    for _ in 0..20 {
        seq.tick();
        par.tick();
    }

    for (a, b) in seq.iter().zip(par.iter()) {
        assert_eq!(a.position, b.position);
        assert_eq!(a.shape, b.shape);
    }
}

#[test]
fn shapes_track_their_boids() {
    let mut flock = Flock::new(FlockParams::default());
    flock.push(boid(Point::new(3., 2., 1.), Vector::new(0.05, 0., 0.)));
    for _ in 0..3 {
        flock.tick();
    }

    let b = &flock.boids[0];
    let nose = Point::from(b.shape.vertices[0]);
    // The template's nose sits one unit ahead of the boid along its heading.
    assert!((nose - b.position - b.velocity.normalize()).norm() < 1e-4);
    assert_eq!(b.shape.faces, b.template.faces);
}
