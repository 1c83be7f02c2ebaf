//! Stochastic L-system algae.
//!
//! A grammar string is grown from a random axiom, then a turtle walks it and
//! emits tube segments and leaf caps. Turtle alphabet:
//!
//! | symbol | action |
//! | --- | --- |
//! | `T` | grow a branch segment and move forward |
//! | `F` | close the branch with a leaf, skip to the next `]` |
//! | `^` / `&` | pitch up / down |
//! | `/` / `\` | roll right / left |
//! | `\|` | turn around |
//! | `+` / `-` | shrink / grow the segment size |
//! | `[` / `]` | push / pop the turtle state |

use std::f32::consts::{PI, TAU};

use nalgebra::{Rotation3, Unit};
use rand::Rng;
use tracing::trace;

use crate::{
    mesh::Mesh,
    random::random_between,
    types::{Point, Value, Vector},
};

/// Shape parameters for grown algae.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AlgaeSettings {
    /// Radius of the first branch segment.
    pub width: Value,
    /// Length of the first branch segment.
    pub height: Value,
    /// Vertices per tube ring.
    pub resolution: usize,
    /// Fewest grammar rewrites.
    pub min_iterations: usize,
    /// Most grammar rewrites.
    pub max_iterations: usize,
}

impl Default for AlgaeSettings {
    fn default() -> Self {
        Self {
            width: 0.01,
            height: 0.05,
            resolution: 30,
            min_iterations: 4,
            max_iterations: 10,
        }
    }
}

fn rule_a<R: Rng + ?Sized>(depth: usize, rng: &mut R) -> &'static str {
    let r: Value = rng.r#gen();
    if depth < 2 {
        if r < 0.4 {
            "T/[+A]^T[-A]&B"
        } else if r < 0.7 {
            "TT[\\A]/T[+B]"
        } else {
            "T[|A]T[^B]"
        }
    } else if depth < 4 {
        if r < 0.3 {
            "T[+A]T[-A]&B"
        } else if r < 0.6 {
            "TT[\\A]/T[+B]"
        } else if r < 0.8 {
            "T[|A]T[^B]"
        } else {
            "T[//A]\\T[//B]"
        }
    } else if depth >= 7 || r < 0.1 {
        "T"
    } else if r < 0.2 {
        "T[+A]T[-A]&B"
    } else if r < 0.5 {
        "TT[\\A]/T[+B]"
    } else if r < 0.7 {
        "T[|A]T[^B]"
    } else {
        "T[//A]\\T[//B]"
    }
}

fn rule_b<R: Rng + ?Sized>(depth: usize, rng: &mut R) -> &'static str {
    let r: Value = rng.r#gen();
    if depth < 2 {
        if r < 0.4 {
            "T[/B]\\[&A]|T"
        } else if r < 0.7 {
            "T[+B]-T[^A]"
        } else {
            "[\\B]/T[|A]"
        }
    } else if depth < 4 {
        if r < 0.3 {
            "T[/B]\\[&A]|T"
        } else if r < 0.6 {
            "T[+B]-T[^A]"
        } else if r < 0.8 {
            "T[\\B]/T[|A]"
        } else {
            "[//B]\\T[//A]"
        }
    } else if depth >= 7 || r < 0.1 {
        "T"
    } else if r < 0.2 {
        "T[/B]\\[&A]|T"
    } else if r < 0.5 {
        "T[+B]-T[^A]"
    } else if r < 0.7 {
        "T[\\B]/T[|A]"
    } else {
        "[//B]\\T[//A]"
    }
}

fn rule_c<R: Rng + ?Sized>(rng: &mut R) -> &'static str {
    if rng.r#gen::<Value>() < 0.01 {
        "^\\|+B|/"
    } else {
        "^&^/\\++TF"
    }
}

/// Rewrites `axiom` `iterations` times. Symbols without a rule are copied.
pub fn generate_from<R: Rng + ?Sized>(axiom: &str, iterations: usize, rng: &mut R) -> String {
    let mut current = axiom.to_owned();
    for depth in 0..iterations {
        let mut next = String::with_capacity(current.len() * 4);
        for symbol in current.chars() {
            match symbol {
                'A' => next.push_str(rule_a(depth, rng)),
                'B' => next.push_str(rule_b(depth, rng)),
                'C' => next.push_str(rule_c(rng)),
                other => next.push(other),
            }
        }
        current = next;
    }
    current
}

/// Grows an algae grammar string from one of the two axioms.
pub fn generate_string<R: Rng + ?Sized>(iterations: usize, rng: &mut R) -> String {
    let axiom = if rng.r#gen::<Value>() < 0.5 {
        "|/^&\\|T/A"
    } else {
        "^&A"
    };
    generate_from(axiom, iterations, rng)
}

#[derive(Clone, Copy, Debug)]
struct Turtle {
    position: Point,
    direction: Vector,
    width: Value,
    height: Value,
    /// First vertex of the ring the next segment grows from.
    ring: Option<u32>,
}

fn rotate(direction: Vector, axis: Unit<Vector>, angle: Value) -> Vector {
    Rotation3::from_axis_angle(&axis, angle) * direction
}

/// Any unit vector perpendicular to `direction`.
fn perpendicular(direction: &Vector) -> Vector {
    let helper = if direction.x.abs() < 0.9 {
        Vector::x()
    } else {
        Vector::y()
    };
    direction.cross(&helper).normalize()
}

/// Pushes a ring of `resolution` vertices around `center`, returning the first index.
fn push_ring(mesh: &mut Mesh, center: Point, direction: &Vector, width: Value, resolution: usize) -> u32 {
    let axis = Unit::new_normalize(*direction);
    let radial = perpendicular(direction);
    let first = mesh.vertices.len() as u32;
    for i in 0..resolution {
        let spoke = Rotation3::from_axis_angle(&axis, TAU * i as Value / resolution as Value) * radial;
        mesh.push_vertex(center + spoke * width, spoke);
    }
    first
}

fn push_branch(mesh: &mut Mesh, turtle: &mut Turtle, width: Value, height: Value, resolution: usize) {
    let base = match turtle.ring {
        Some(base) => base,
        None => push_ring(mesh, turtle.position, &turtle.direction, width, resolution),
    };
    let top_center = turtle.position + turtle.direction * height;
    let top = push_ring(mesh, top_center, &turtle.direction, width, resolution);

    let n = resolution as u32;
    for i in 0..n {
        let j = (i + 1) % n;
        mesh.faces.push([base + i, base + j, top + i]);
        mesh.faces.push([base + j, top + j, top + i]);
    }

    turtle.position = top_center;
    turtle.ring = Some(top);
}

fn push_leaf(mesh: &mut Mesh, turtle: &mut Turtle, resolution: usize) {
    let ring = match turtle.ring {
        Some(ring) => ring,
        None => push_ring(mesh, turtle.position, &turtle.direction, turtle.width, resolution),
    };
    let tip = turtle.position + turtle.direction * (turtle.height * 0.3);
    let cap = mesh.push_vertex(tip, turtle.direction);

    let n = resolution as u32;
    for i in 0..n {
        mesh.faces.push([ring + i, ring + (i + 1) % n, cap]);
    }
    turtle.ring = None;
}

/// Walks `program` with a turtle rooted at `root` and returns the grown mesh.
pub fn interpret<R: Rng + ?Sized>(program: &str, root: Point, settings: &AlgaeSettings, rng: &mut R) -> Mesh {
    let resolution = settings.resolution.max(3);
    let mut mesh = Mesh::new_empty();

    let mut direction = Vector::z();
    direction = rotate(direction, Vector::x_axis(), random_between(rng, -PI / 24., PI / 24.));
    direction = rotate(direction, Vector::y_axis(), random_between(rng, -PI / 24., PI / 24.));
    direction = rotate(direction, Vector::z_axis(), random_between(rng, 0., TAU));

    let mut turtle = Turtle {
        position: root,
        direction,
        width: settings.width,
        height: settings.height,
        ring: None,
    };
    let mut stack = vec![turtle];
    let mut skip_until_next_branch = false;

    for symbol in program.chars() {
        if skip_until_next_branch {
            if symbol != ']' {
                continue;
            }
            skip_until_next_branch = false;
        }

        match symbol {
            'T' => {
                let width = random_between(rng, turtle.width * 0.99, turtle.width * 1.01);
                let height = random_between(rng, turtle.height * 0.99, turtle.height * 1.01);
                push_branch(&mut mesh, &mut turtle, width, height, resolution);
            }
            'F' => {
                push_leaf(&mut mesh, &mut turtle, resolution);
                skip_until_next_branch = true;
            }
            '^' => {
                let a = random_between(rng, 0., PI / 6.);
                turtle.direction = rotate(turtle.direction, Vector::y_axis(), a);
            }
            '&' => {
                let a = random_between(rng, -PI / 6., 0.);
                turtle.direction = rotate(turtle.direction, Vector::y_axis(), a);
            }
            '/' => {
                let a = random_between(rng, 0., PI / 6.);
                turtle.direction = rotate(turtle.direction, Vector::x_axis(), a);
            }
            '\\' => {
                let a = random_between(rng, -PI / 6., 0.);
                turtle.direction = rotate(turtle.direction, Vector::x_axis(), a);
            }
            '|' => {
                let a = random_between(rng, PI / 6., TAU - PI / 6.);
                turtle.direction = rotate(turtle.direction, Vector::z_axis(), a);
            }
            '+' => {
                turtle.width *= 0.9;
                turtle.height *= 0.9;
            }
            '-' => {
                turtle.width *= 1.1;
                turtle.height *= 1.1;
            }
            '[' => stack.push(turtle),
            ']' => {
                // The root state is never popped.
                let state = if stack.len() > 1 {
                    stack.pop()
                } else {
                    stack.last().copied()
                };
                if let Some(state) = state {
                    turtle = state;
                }
                turtle.ring = None;
            }
            _ => {}
        }
    }

    trace!(
        symbols = program.len(),
        vertices = mesh.vertices.len(),
        "algae grown"
    );
    mesh
}

/// Grows one algae plant rooted at `root`.
pub fn grow<R: Rng + ?Sized>(root: Point, settings: &AlgaeSettings, rng: &mut R) -> Mesh {
    let lo = settings.min_iterations.min(settings.max_iterations);
    let iterations = rng.gen_range(lo..=settings.max_iterations.max(lo));
    let program = generate_string(iterations, rng);
    interpret(&program, root, settings, rng)
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    #[test]
    fn deep_rewrites_terminate_in_segments() {
        let mut rng = StdRng::seed_from_u64(5);
        let s = generate_from("A", 9, &mut rng);
        assert!(!s.contains('A') && !s.contains('B'));
        assert!(s.contains('T'));
    }

    #[test]
    fn rule_c_appends_a_leaf() {
        let mut rng = StdRng::seed_from_u64(0);
        let s = generate_from("C", 1, &mut rng);
        assert!(s == "^&^/\\++TF" || s == "^\\|+B|/");
    }

    #[test]
    fn single_segment_is_a_tube() {
        let mut rng = StdRng::seed_from_u64(2);
        let settings = AlgaeSettings::default();
        let mesh = interpret("T", Point::origin(), &settings, &mut rng);
        assert_eq!(mesh.vertices.len(), 2 * settings.resolution);
        assert_eq!(mesh.faces.len(), 2 * settings.resolution);
        assert!(mesh.validate().is_ok());
    }

    #[test]
    fn segments_chain_from_the_previous_ring() {
        let mut rng = StdRng::seed_from_u64(2);
        let settings = AlgaeSettings::default();
        let mesh = interpret("TTF", Point::origin(), &settings, &mut rng);
        // base ring + two top rings + leaf tip
        assert_eq!(mesh.vertices.len(), 3 * settings.resolution + 1);
        assert!(mesh.validate().is_ok());
    }

    #[test]
    fn unbalanced_pops_keep_the_root() {
        let mut rng = StdRng::seed_from_u64(9);
        let mesh = interpret("]]T", Point::new(1., 2., 3.), &AlgaeSettings::default(), &mut rng);
        let lowest = mesh
            .vertices
            .iter()
            .map(|v| v[2])
            .fold(Value::INFINITY, Value::min);
        assert!((lowest - 3.).abs() < 0.02);
    }

    #[test]
    fn grown_plants_are_valid_meshes() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..5 {
            let mesh = grow(Point::new(0., 0., -1.), &AlgaeSettings::default(), &mut rng);
            assert!(!mesh.is_empty());
            assert!(mesh.validate().is_ok());
        }
    }
}
