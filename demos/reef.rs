use std::f32::consts::FRAC_PI_2;

use bevy::prelude::*;
use bevy_infinite_grid::{InfiniteGridBundle, InfiniteGridPlugin, InfiniteGridSettings};
use bevy_panorbit_camera::{PanOrbitCamera, PanOrbitCameraPlugin};
use bevy_reef::{
    ReefPlugin,
    boid::{BoundingBox, Flock, FlockParams, SpawnParams},
    field::ScalarField,
    mesh::Mesh as ReefMesh,
    mesher::MesherSettings,
    plugin::{AlgaeMesh, FlockResource, Terrain, spawn_boid_entities},
    types::Point,
};
use noiz::prelude::*;
use rand::{SeedableRng, rngs::StdRng};

const WIDTH: usize = 64;
const HEIGHT: usize = 64;
const DEPTH: usize = 24;
const SCALE: f32 = 0.25;

/// Parent of everything simulated. Rotates the Z-up reef into Bevy's Y-up world.
#[derive(Component)]
struct ReefRoot;

#[derive(Resource, Default)]
struct Reseed(u64);

fn main() {
    App::new()
        .add_plugins((
            DefaultPlugins,
            ReefPlugin::default(),
            PanOrbitCameraPlugin,
            InfiniteGridPlugin,
        ))
        .init_resource::<Reseed>()
        .add_systems(Startup, setup)
        .add_systems(Update, (reseed_terrain, colour_algae))
        .run();
}

fn terrain_field(seed: u64) -> ScalarField {
    let mut noise = Noise::<
        LayeredNoise<
            Normed<f32>,
            Persistence,
            Octave<MixCellGradients<OrthoGrid, Smoothstep, QuickGradients>>,
        >,
    >::default();
    noise.set_frequency(0.08);

    // Shift the sample window instead of reseeding the noise itself.
    let offset = Vec3::new(seed as f32 * 97.3, seed as f32 * 41.9, 0.);
    let mut field = ScalarField::new(WIDTH, HEIGHT, DEPTH, 1.).unwrap();
    field.for_each_sample(|x, y, z, value| {
        let n: f32 = noise.sample_for(offset + Vec3::new(x as f32, y as f32, z as f32));
        let ground = (z as f32 - DEPTH as f32 * 0.35) / DEPTH as f32 * 2.;
        *value = (ground + n * 0.6).clamp(-1., 1.);
    });
    field
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

fn setup(
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
) {
    commands.spawn(InfiniteGridBundle {
        settings: InfiniteGridSettings {
            fadeout_distance: 200.0,
            ..Default::default()
        },
        ..Default::default()
    });

    commands.spawn((
        Camera3d::default(),
        PanOrbitCamera {
            button_orbit: MouseButton::Right,
            button_pan: MouseButton::Middle,
            ..default()
        },
        Transform::from_xyz(-6., 12., 20.).looking_at(Vec3::new(8., 0., -8.), Vec3::Y),
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
            ReefRoot,
            Transform::from_rotation(Quat::from_rotation_x(-FRAC_PI_2)),
            Visibility::default(),
        ))
        .id();

    let terrain = commands
        .spawn((
            Terrain::new(terrain_field(0))
                .with_mesher(
                    MesherSettings::default()
                        .with_scale(SCALE)
                        .with_open_sky(Some(1.)),
                )
                .with_seed(0),
            MeshMaterial3d(materials.add(StandardMaterial {
                base_color: Color::srgb(0.76, 0.7, 0.5),
                // Terrain normals face into the solid.
                double_sided: true,
                cull_mode: None,
                ..Default::default()
            })),
        ))
        .id();
    commands.entity(root).add_child(terrain);

    let (w, h, d) = (
        WIDTH as f32 * SCALE,
        HEIGHT as f32 * SCALE,
        DEPTH as f32 * SCALE,
    );
    let Ok(bounds) = BoundingBox::new([0., w], [0., h], [d * 0.5, d]) else {
        return;
    };
    let spawn = SpawnParams::new(bounds, 60).with_scale(0.2).with_margin(1.);
    let params = FlockParams::default().with_parallel(true);
    let mut rng = StdRng::seed_from_u64(1);
    match Flock::spawn(params, &spawn, &[fish()], &mut rng) {
        Ok(flock) => {
            let boids = spawn_boid_entities(&mut commands, &mut meshes, &mut materials, &flock);
            commands.entity(root).add_children(&boids);
            commands.insert_resource(FlockResource(flock));
        }
        Err(e) => error!("could not spawn flock: {e}"),
    }
}

/// Space regrows the terrain from a new seed. The flock keeps swimming.
fn reseed_terrain(
    keyboard: Res<ButtonInput<KeyCode>>,
    mut reseed: ResMut<Reseed>,
    mut query: Query<&mut Terrain>,
) {
    if keyboard.just_pressed(KeyCode::Space) {
        reseed.0 += 1;
        for mut terrain in query.iter_mut() {
            *terrain = terrain
                .clone()
                .with_seed(reseed.0)
                .with_field(terrain_field(reseed.0));
        }
    }
}

fn colour_algae(
    mut commands: Commands,
    mut materials: ResMut<Assets<StandardMaterial>>,
    query: Query<Entity, Added<AlgaeMesh>>,
) {
    for entity in query.iter() {
        commands.entity(entity).insert(MeshMaterial3d(materials.add(StandardMaterial {
            base_color: Color::srgb(0.2, 0.6, 0.25),
            double_sided: true,
            cull_mode: None,
            ..Default::default()
        })));
    }
}
