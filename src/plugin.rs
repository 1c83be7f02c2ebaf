use std::sync::Arc;

use bevy::{
    asset::RenderAssetUsages,
    mesh::{Indices, PrimitiveTopology},
    prelude::*,
    tasks::{AsyncComputeTaskPool, Task, block_on, futures_lite::future},
};
use rand::{SeedableRng, rngs::StdRng};

use crate::{
    algae::{self, AlgaeSettings},
    boid::{Boid, Flock},
    field::ScalarField,
    mesh::Mesh as ReefMesh,
    mesher::{MesherSettings, TerrainMesher},
    types::Point,
    vegetation::{self, VegetationSettings},
};

/// System sets for the reef pipeline.
///
/// Use these to order your own systems relative to terrain generation and the flock:
///
/// ```rust,ignore
/// // Run after geometry is ready but before it's uploaded, e.g. for collider generation:
/// app.add_systems(Update, build_collider.after(ReefSet::Generate)
///                                       .before(ReefSet::Upload));
/// ```
///
/// ```text
/// ReefSet::Spawn  →  [async compute]  →  ReefSet::Generate  →  [your systems]  →  ReefSet::Upload
/// ReefSet::Simulate  (flock tick + transform sync, every frame)
/// ```
#[derive(SystemSet, Debug, Clone, PartialEq, Eq, Hash)]
pub enum ReefSet {
    /// Spawns an async compute task for each queued terrain.
    Spawn,
    /// Polls async tasks and inserts [`TerrainMeshed`] on completion.
    Generate,
    /// Uploads [`TerrainMeshed`] data into Bevy meshes.
    Upload,
    /// Advances the [`FlockResource`] and moves boid entities.
    Simulate,
}

/// A voxel terrain to be meshed.
///
/// Mutating this component (e.g. swapping in a reseeded field) queues a rebuild;
/// the previous mesh is replaced when the new one is ready. The flock is left alone.
#[derive(Component, Clone)]
#[require(Transform)]
pub struct Terrain {
    /// Density samples, shared with the meshing task without copying.
    pub field: Arc<ScalarField>,
    pub mesher: MesherSettings,
    /// Algae placement rules, or `None` for bare terrain.
    pub vegetation: Option<VegetationSettings>,
    pub algae: AlgaeSettings,
    /// Seed for vegetation placement and growth.
    pub seed: u64,
}

impl Terrain {
    pub fn new(field: ScalarField) -> Self {
        Self {
            field: Arc::new(field),
            mesher: MesherSettings::default(),
            vegetation: Some(VegetationSettings::default()),
            algae: AlgaeSettings::default(),
            seed: 0,
        }
    }

    pub fn with_field(mut self, field: ScalarField) -> Self {
        self.field = Arc::new(field);
        self
    }

    pub fn with_mesher(mut self, mesher: MesherSettings) -> Self {
        self.mesher = mesher;
        self
    }

    pub fn with_vegetation(mut self, vegetation: Option<VegetationSettings>) -> Self {
        self.vegetation = vegetation;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Meshes the field and grows algae, synchronously.
    pub fn generate(&self) -> TerrainMeshed {
        let mesh = TerrainMesher::new(self.mesher).build(self.field.as_ref());

        let mut rng = StdRng::seed_from_u64(self.seed);
        let algae_roots = match &self.vegetation {
            Some(settings) => vegetation::scatter(&mesh, settings, &mut rng),
            None => Vec::new(),
        };
        let mut algae_mesh = ReefMesh::new_empty();
        for root in &algae_roots {
            algae_mesh.append(&algae::grow(*root, &self.algae, &mut rng));
        }

        TerrainMeshed {
            mesh,
            algae_roots,
            algae: algae_mesh,
        }
    }
}

/// Marker component added to [`Terrain`] entities that are waiting to be processed.
///
/// Removed automatically once the terrain's mesh has been generated and uploaded.
#[derive(Component)]
pub struct QueuedTerrain;

/// Holds the in-flight async compute task for a [`Terrain`].
#[derive(Component)]
pub struct TerrainTask(Task<TerrainMeshed>);

/// Core output for a [`Terrain`], kept on the entity after upload.
#[derive(Component, Clone, Debug, Default)]
pub struct TerrainMeshed {
    pub mesh: ReefMesh,
    /// Where algae were rooted.
    pub algae_roots: Vec<Point>,
    /// All algae plants merged into one mesh.
    pub algae: ReefMesh,
}

/// Child entity carrying a terrain's algae mesh. Attach a material to it in your app.
#[derive(Component)]
pub struct AlgaeMesh;

/// Points from a terrain entity to its current algae child.
#[derive(Component)]
pub struct AlgaeEntity(pub Entity);

/// The simulated flock. Insert it to have the plugin tick it every frame.
#[derive(Resource, Default)]
pub struct FlockResource(pub Flock);

/// Ties an entity's [`Transform`] to the boid at index `.0` of the [`FlockResource`].
#[derive(Component, Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoidIndex(pub usize);

/// Runtime configuration for the reef pipeline.
///
/// Inserted as a resource by [`ReefPlugin`]. Modify it at any time to change behaviour:
///
/// ```rust,ignore
/// fn pause(mut config: ResMut<ReefConfig>) {
///     config.simulate = false;
/// }
/// ```
#[derive(Resource)]
pub struct ReefConfig {
    /// Maximum number of async terrain tasks spawned per frame. Default: `4`.
    pub max_tasks_per_frame: usize,
    /// Advance the flock every frame. Default: `true`.
    pub simulate: bool,
}

impl Default for ReefConfig {
    fn default() -> Self {
        Self {
            max_tasks_per_frame: 4,
            simulate: true,
        }
    }
}

/// Bevy plugin that meshes [`Terrain`]s off the main thread and drives the flock.
///
/// ```text
/// Terrain added / changed
///   → QueuedTerrain inserted        (queue_changed_terrain)
///   → TerrainTask spawned           (ReefSet::Spawn)
///   → [async compute runs]
///   → TerrainMeshed inserted        (ReefSet::Generate, once task completes)
///   → Mesh3d + AlgaeMesh child      (ReefSet::Upload)
///   → QueuedTerrain removed
/// ```
pub struct ReefPlugin {
    /// Initial value for [`ReefConfig::max_tasks_per_frame`].
    pub max_tasks_per_frame: usize,
    /// Initial value for [`ReefConfig::simulate`].
    pub simulate: bool,
}

impl Default for ReefPlugin {
    fn default() -> Self {
        let config = ReefConfig::default();
        Self {
            max_tasks_per_frame: config.max_tasks_per_frame,
            simulate: config.simulate,
        }
    }
}

impl Plugin for ReefPlugin {
    fn build(&self, app: &mut App) {
        app.insert_resource(ReefConfig {
            max_tasks_per_frame: self.max_tasks_per_frame,
            simulate: self.simulate,
        });

        app.configure_sets(
            Update,
            (ReefSet::Spawn, ReefSet::Generate, ReefSet::Upload).chain(),
        )
        .add_systems(
            Update,
            (
                spawn_terrain_tasks.in_set(ReefSet::Spawn),
                poll_terrain_tasks.in_set(ReefSet::Generate),
                upload_terrain.in_set(ReefSet::Upload),
                (tick_flock, sync_boid_transforms)
                    .chain()
                    .in_set(ReefSet::Simulate),
            ),
        );

        #[cfg(feature = "auto_queue")]
        app.add_systems(Update, queue_changed_terrain.before(ReefSet::Spawn));
    }
}

/// Converts a core mesh into a Bevy triangle list.
pub fn to_bevy_mesh(mesh: &ReefMesh) -> Mesh {
    let mut bevy_mesh = Mesh::new(
        PrimitiveTopology::TriangleList,
        RenderAssetUsages::RENDER_WORLD,
    );

    bevy_mesh.insert_attribute(Mesh::ATTRIBUTE_POSITION, mesh.vertices.clone());
    bevy_mesh.insert_attribute(Mesh::ATTRIBUTE_NORMAL, mesh.normals.clone());
    bevy_mesh.insert_indices(Indices::U32(mesh.faces.iter().flatten().copied().collect()));
    bevy_mesh
}

/// Converts a boid's model matrix into a Bevy [`Transform`].
pub fn boid_transform(boid: &Boid) -> Transform {
    Transform::from_matrix(Mat4::from_cols_slice(boid.transform().as_slice()))
}

/// Spawns one entity per boid of `flock`, each rendering its template.
///
/// Boids sharing a template share the uploaded mesh handle.
pub fn spawn_boid_entities(
    commands: &mut Commands,
    meshes: &mut Assets<Mesh>,
    materials: &mut Assets<StandardMaterial>,
    flock: &Flock,
) -> Vec<Entity> {
    let mut entities = Vec::with_capacity(flock.len());
    let mut uploaded: Vec<(*const ReefMesh, Handle<Mesh>)> = Vec::new();
    for (i, boid) in flock.iter().enumerate() {
        let key = Arc::as_ptr(&boid.template);
        let handle = match uploaded.iter().find(|(k, _)| *k == key) {
            Some((_, h)) => h.clone(),
            None => {
                let h = meshes.add(to_bevy_mesh(&boid.template));
                uploaded.push((key, h.clone()));
                h
            }
        };
        let [r, g, b] = boid.colour;
        let entity = commands.spawn((
            Mesh3d(handle),
            MeshMaterial3d(materials.add(StandardMaterial {
                base_color: Color::srgb(r, g, b),
                ..Default::default()
            })),
            boid_transform(boid),
            BoidIndex(i),
        ));
        entities.push(entity.id());
    }
    entities
}

/// Inserts [`QueuedTerrain`] on every added or modified [`Terrain`].
fn queue_changed_terrain(mut commands: Commands, query: Query<Entity, Changed<Terrain>>) {
    for entity in query.iter() {
        commands
            .entity(entity)
            .insert(QueuedTerrain)
            .remove::<TerrainTask>();
    }
}

/// Spawns async compute tasks for [`QueuedTerrain`]s, up to [`ReefConfig::max_tasks_per_frame`] per frame.
fn spawn_terrain_tasks(
    mut commands: Commands,
    config: Res<ReefConfig>,
    query: Query<(Entity, &Terrain), (With<QueuedTerrain>, Without<TerrainTask>)>,
) {
    let task_pool = AsyncComputeTaskPool::get();

    for (entity, terrain) in query.iter().take(config.max_tasks_per_frame) {
        // Cloning the component only bumps the field's Arc.
        let terrain = terrain.clone();
        let task = task_pool.spawn(async move { terrain.generate() });
        commands.entity(entity).insert(TerrainTask(task));
    }
}

/// Polls in-flight [`TerrainTask`]s each frame and inserts [`TerrainMeshed`] on completion.
///
/// Non-blocking: tasks that haven't finished are skipped and retried next frame.
fn poll_terrain_tasks(mut commands: Commands, mut query: Query<(Entity, &mut TerrainTask)>) {
    for (entity, mut task) in query.iter_mut() {
        if let Some(meshed) = block_on(future::poll_once(&mut task.0)) {
            commands
                .entity(entity)
                .insert(meshed)
                .remove::<TerrainTask>();
        }
    }
}

/// Uploads [`TerrainMeshed`] into a [`Mesh3d`] and replaces the algae child.
fn upload_terrain(
    mut commands: Commands,
    query: Query<
        (Entity, &TerrainMeshed, Option<&AlgaeEntity>),
        (With<QueuedTerrain>, Without<TerrainTask>, Changed<TerrainMeshed>),
    >,
    mut meshes: ResMut<Assets<Mesh>>,
) {
    for (entity, meshed, algae) in query.iter() {
        if meshed.mesh.is_empty() {
            log::warn!("terrain {entity} produced no triangles");
        }

        if let Some(AlgaeEntity(old)) = algae {
            commands.entity(*old).despawn();
        }

        let algae_child = commands
            .spawn((Mesh3d(meshes.add(to_bevy_mesh(&meshed.algae))), AlgaeMesh))
            .id();

        commands
            .entity(entity)
            .insert((
                Mesh3d(meshes.add(to_bevy_mesh(&meshed.mesh))),
                AlgaeEntity(algae_child),
            ))
            .add_child(algae_child)
            .remove::<QueuedTerrain>();

        log::debug!(
            "terrain {entity} uploaded: {} triangles, {} algae",
            meshed.mesh.triangle_count(),
            meshed.algae_roots.len()
        );
    }
}

fn tick_flock(config: Res<ReefConfig>, flock: Option<ResMut<FlockResource>>) {
    if !config.simulate {
        return;
    }
    if let Some(mut flock) = flock {
        flock.0.tick();
    }
}

fn sync_boid_transforms(
    flock: Option<Res<FlockResource>>,
    mut query: Query<(&BoidIndex, &mut Transform)>,
) {
    let Some(flock) = flock else {
        return;
    };
    for (BoidIndex(i), mut transform) in query.iter_mut() {
        if let Some(boid) = flock.0.boids.get(*i) {
            *transform = boid_transform(boid);
        }
    }
}
