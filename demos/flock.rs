use std::f32::consts::FRAC_PI_2;

use bevy::prelude::*;
use bevy_panorbit_camera::{PanOrbitCamera, PanOrbitCameraPlugin};
use bevy_reef::{
    ReefPlugin,
    boid::{BoundingBox, Flock, FlockParams, SpawnParams},
    mesh::Mesh as ReefMesh,
    plugin::{FlockResource, ReefConfig, spawn_boid_entities},
    types::Point,
};
use rand::{SeedableRng, rngs::StdRng};

/// Rotates the Z-up flock into Bevy's Y-up world.
#[derive(Component)]
struct FlockRoot;

fn main() {
    App::new()
        .add_plugins((DefaultPlugins, ReefPlugin::default(), PanOrbitCameraPlugin))
        .add_systems(Startup, setup)
        .add_systems(Update, (toggle_simulation, draw_bounds))
        .run();
}

fn fish() -> ReefMesh {
    let nose = Point::new(1., 0., 0.);
    let tail = Point::new(-0.6, 0., 0.);
    let ring = [
        Point::new(0., 0., 0.3),
        Point::new(0., 0.15, 0.),
        Point::new(0., 0., -0.3),
        Point::new(0., -0.15, 0.),
    ];
    let mut soup = Vec::new();
    for i in 0..ring.len() {
        let (a, b) = (ring[i], ring[(i + 1) % ring.len()]);
        soup.extend([nose, b, a]);
        soup.extend([tail, a, b]);
    }
    soup.extend([tail, Point::new(-1., 0., 0.3), Point::new(-1., 0., -0.3)]);
    ReefMesh::from_triangle_soup(&soup)
}

/// Stubby variant, so the flock shows both templates.
fn puffer() -> ReefMesh {
    fish().scaled(0.7)
}

fn setup(
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
) {
    commands.spawn((
        Camera3d::default(),
        PanOrbitCamera {
            button_orbit: MouseButton::Right,
            button_pan: MouseButton::Middle,
            ..default()
        },
        Transform::from_xyz(0., 25., 40.).looking_at(Vec3::ZERO, Vec3::Y),
    ));

    commands.spawn((
        DirectionalLight {
            illuminance: light_consts::lux::FULL_DAYLIGHT,
            ..Default::default()
        },
        Transform::default().with_rotation(Quat::from_rotation_x(-45.0_f32.to_radians())),
    ));

    let root = commands
        .spawn((
            FlockRoot,
            Transform::from_rotation(Quat::from_rotation_x(-FRAC_PI_2)),
            Visibility::default(),
        ))
        .id();

    let Ok(bounds) = BoundingBox::new([-15., 15.], [-15., 15.], [-8., 8.]) else {
        return;
    };
    let spawn = SpawnParams::new(bounds, 200).with_scale(0.4).with_margin(3.);
    let params = FlockParams::default()
        .with_influence(3., 0.5)
        .with_flocking_tendency(0.2)
        .with_centre_pull(Some(8.))
        .with_max_speed(0.12)
        .with_parallel(true);
    let mut rng = StdRng::seed_from_u64(7);
    match Flock::spawn(params, &spawn, &[fish(), puffer()], &mut rng) {
        Ok(flock) => {
            let boids = spawn_boid_entities(&mut commands, &mut meshes, &mut materials, &flock);
            commands.entity(root).add_children(&boids);
            commands.insert_resource(FlockResource(flock));
        }
        Err(e) => error!("could not spawn flock: {e}"),
    }
}

/// Space pauses and resumes the flock.
fn toggle_simulation(keyboard: Res<ButtonInput<KeyCode>>, mut config: ResMut<ReefConfig>) {
    if keyboard.just_pressed(KeyCode::Space) {
        config.simulate = !config.simulate;
    }
}

/// Outlines the first boid's containment box.
fn draw_bounds(
    mut gizmos: Gizmos,
    flock: Option<Res<FlockResource>>,
    root: Query<&GlobalTransform, With<FlockRoot>>,
) {
    let (Some(flock), Ok(root)) = (flock, root.single()) else {
        return;
    };
    let Some(boid) = flock.0.boids.first() else {
        return;
    };
    let b = boid.bounds;
    let corner = |i: usize| {
        let local = Vec3::new(
            b.x[i & 1],
            b.y[(i >> 1) & 1],
            b.z[(i >> 2) & 1],
        );
        root.transform_point(local)
    };
    for i in 0..8 {
        for bit in [1, 2, 4] {
            if i & bit == 0 {
                gizmos.line(corner(i), corner(i | bit), Color::WHITE);
            }
        }
    }
}
