use crate::types::{EPSILON, Point, Value};

// linearly map a number from one range to another
pub fn remap(s: Value, range_in: [Value; 2], range_out: [Value; 2]) -> Value {
    range_out[0] + (s - range_in[0]) * (range_out[1] - range_out[0]) / (range_in[1] - range_in[0])
}

// Return the interpolation factor t corresponding to iso_val
pub fn find_t(v0: Value, v1: Value, iso_val: Value) -> Value {
    (iso_val - v0) / (v1 - v0)
}

// Linear interpolation
pub fn lerp(a: Value, b: Value, t: Value) -> Value {
    a + (b - a) * t
}

/// Finds where the iso-surface crosses the edge `p1 -> p2`.
///
/// Corner matches return the corner itself, bit for bit, so two cells sharing an
/// edge always agree on its vertex. A flat edge (`v1 == v2`) returns `p1`.
pub fn vertex_interpolate(isovalue: Value, p1: Point, p2: Point, v1: Value, v2: Value) -> Point {
    if (isovalue - v1).abs() < EPSILON {
        return p1;
    }
    if (isovalue - v2).abs() < EPSILON {
        return p2;
    }
    if (v1 - v2).abs() < EPSILON {
        return p1;
    }

    let t = find_t(v1, v2, isovalue);
    Point::new(lerp(p1.x, p2.x, t), lerp(p1.y, p2.y, t), lerp(p1.z, p2.z, t))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corner_matches_return_corners() {
        let p1 = Point::new(0., 0., 0.);
        let p2 = Point::new(1., 0., 0.);
        assert_eq!(vertex_interpolate(0.0, p1, p2, 0.0, 0.7), p1);
        assert_eq!(vertex_interpolate(0.0, p1, p2, -0.3, 0.0), p2);
    }

    #[test]
    fn flat_edge_returns_first_corner() {
        let p1 = Point::new(2., 3., 4.);
        let p2 = Point::new(2., 3., 5.);
        assert_eq!(vertex_interpolate(0.5, p1, p2, 0.1, 0.1), p1);
    }

    #[test]
    fn crossing_is_linear() {
        let p1 = Point::new(0., 0., 0.);
        let p2 = Point::new(0., 4., 0.);
        let p = vertex_interpolate(0.0, p1, p2, -1.0, 3.0);
        assert!((p.y - 1.0).abs() < 1e-6);
        assert_eq!(p.x, 0.0);
    }

    #[test]
    fn remap_unit_to_signed() {
        assert_eq!(remap(0.0, [0., 1.], [-1., 1.]), -1.0);
        assert_eq!(remap(0.5, [0., 1.], [-1., 1.]), 0.0);
        assert_eq!(remap(1.0, [0., 1.], [-1., 1.]), 1.0);
    }
}
