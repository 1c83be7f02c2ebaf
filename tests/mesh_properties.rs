use bevy_reef::{
    cube::{Cube, CubeEvaluator, corner_positions},
    field::{FieldSource, ScalarField},
    interp::vertex_interpolate,
    mesh::Mesh,
    mesher::{MesherSettings, TerrainMesher},
    types::{Point, Value},
    vegetation::{VegetationSettings, scatter},
};
use rand::{SeedableRng, rngs::StdRng};

fn rolling_field(w: usize, h: usize, d: usize) -> ScalarField {
    ScalarField::from_fn(w, h, d, &move |x, y, z| {
        let hills = (x as Value * 0.45).sin() * 1.5 + (y as Value * 0.3).cos() * 1.2;
        let caves = (x as Value * 0.8 + z as Value * 0.6).sin() * 0.4;
        ((z as Value - d as Value * 0.4 - hills) * 0.3 + caves).clamp(-1., 1.)
    })
    .unwrap()
}

fn assert_close(a: Point, b: Point) {
    assert!((a - b).norm() < 1e-4, "{a} != {b}");
}

#[test]
fn every_face_index_is_in_range() {
    let field = rolling_field(20, 18, 12);
    for open_sky in [None, Some(1.)] {
        let mesh = TerrainMesher::new(MesherSettings::default().with_open_sky(open_sky)).build(&field);
        assert!(!mesh.is_empty());
        assert_eq!(mesh.vertices.len(), mesh.normals.len());
        assert_eq!(mesh.vertices.len(), mesh.triangle_count() * 3);
        assert!(mesh.faces.iter().flatten().all(|&i| (i as usize) < mesh.vertices.len()));
        assert!(mesh.validate().is_ok());
    }
}

#[test]
fn constant_fields_have_no_surface() {
    let air = ScalarField::new(6, 6, 6, 1.).unwrap();
    assert!(TerrainMesher::default().build(&air).is_empty());

    let rock = ScalarField::new(6, 6, 6, -1.).unwrap();
    assert!(TerrainMesher::default().build(&rock).is_empty());

    let level = ScalarField::new(6, 6, 6, 0.3).unwrap();
    assert!(TerrainMesher::default().build(&level).is_empty());
}

#[test]
fn shared_edges_meet_exactly() {
    let field = rolling_field(9, 8, 7);
    let evaluator = CubeEvaluator::default();

    // (neighbour offset, [(edge in cell, matching edge in neighbour)])
    let seams: [([i64; 3], [(usize, usize); 4]); 3] = [
        ([1, 0, 0], [(1, 3), (5, 7), (9, 8), (10, 11)]),
        ([0, 1, 0], [(2, 0), (6, 4), (10, 9), (11, 8)]),
        ([0, 0, 1], [(4, 0), (5, 1), (6, 2), (7, 3)]),
    ];

    let mut shared = 0;
    for z in 0..field.depth() as i64 - 2 {
        for y in 0..field.height() as i64 - 2 {
            for x in 0..field.width() as i64 - 2 {
                let cell = evaluator.evaluate(&Cube::sample(&field, x, y, z, None));
                for ([dx, dy, dz], pairs) in seams {
                    let neighbour =
                        evaluator.evaluate(&Cube::sample(&field, x + dx, y + dy, z + dz, None));
                    for (a, b) in pairs {
                        match (cell.vertices[a], neighbour.vertices[b]) {
                            (Some(p), Some(q)) => {
                                assert_close(p, q);
                                shared += 1;
                            }
                            (None, None) => {}
                            other => panic!("edge activity differs across seam: {other:?}"),
                        }
                    }
                }
            }
        }
    }
    assert!(shared > 0);
}

#[test]
fn half_submerged_cell_gives_a_flat_quad() {
    let cube = Cube {
        corners: corner_positions(0, 0, 0),
        values: [-1., -1., -1., -1., 1., 1., 1., 1.],
    };
    let eval = CubeEvaluator::default().evaluate(&cube);

    assert_eq!(eval.index, 15);
    assert!(eval.success);
    for e in 0..12 {
        assert_eq!(eval.vertices[e].is_some(), (8..12).contains(&e), "edge {e}");
    }
    assert_eq!(eval.triangles.len(), 2);
    for tri in 0..2 {
        for p in eval.triangle_points(tri) {
            assert!((p.z - 0.5).abs() < 1e-6);
        }
    }
}

#[test]
fn interpolation_snaps_to_matching_corner() {
    let (p1, p2) = (Point::new(0., 0., 0.), Point::new(0., 0., 1.));
    assert_eq!(vertex_interpolate(0., p1, p2, 0., 1.), p1);
    assert_eq!(vertex_interpolate(1., p1, p2, 0., 1.), p2);
    assert_eq!(vertex_interpolate(0.5, p1, p2, 0.3, 0.3), p1);
    assert_close(vertex_interpolate(0.25, p1, p2, 0., 1.), Point::new(0., 0., 0.25));
}

#[test]
fn scale_stretches_the_surface() {
    let field = rolling_field(10, 10, 8);
    let unit = TerrainMesher::default().build(&field);
    let double = TerrainMesher::new(MesherSettings::default().with_scale(2.)).build(&field);

    assert_eq!(unit.triangle_count(), double.triangle_count());
    for (a, b) in unit.vertices.iter().zip(&double.vertices) {
        assert_close(Point::from(*a) * 2., Point::from(*b));
    }
}

#[test]
fn vegetation_only_roots_on_qualifying_vertices() {
    let mesh = TerrainMesher::default().build(&rolling_field(24, 24, 10));
    let settings = VegetationSettings::default().with_probability(1.);

    let roots = scatter(&mesh, &settings, &mut StdRng::seed_from_u64(11));
    assert!(!roots.is_empty());

    // Unwelded vertices repeat, so any copy with a steep enough normal will do.
    for root in &roots {
        let qualifies = mesh
            .vertices
            .iter()
            .zip(&mesh.normals)
            .any(|(v, n)| Point::from(*v) == *root && n[2] < settings.steepness);
        assert!(qualifies, "{root} is not on a qualifying face");
    }
}

#[test]
fn vegetation_is_reproducible() {
    let mesh: Mesh = TerrainMesher::default().build(&rolling_field(24, 24, 10));
    let settings = VegetationSettings::default().with_probability(0.2);

    let a = scatter(&mesh, &settings, &mut StdRng::seed_from_u64(3));
    let b = scatter(&mesh, &settings, &mut StdRng::seed_from_u64(3));
    assert_eq!(a, b);
}
