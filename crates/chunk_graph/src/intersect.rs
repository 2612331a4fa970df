//! Epsilon-tolerant 2D triangle intersection predicates.
//!
//! Used to decide whether two chunks still touch across a division plane.
//! All tests are inclusive at the tolerance, so grazing contact counts as an
//! intersection.

use glam::Vec2;

#[inline]
pub fn orient2d(a: Vec2, b: Vec2, c: Vec2) -> f32 {
    (b - a).perp_dot(c - a)
}

/// Whether `p` lies within the (epsilon-expanded) bounding box of segment AB.
/// Only meaningful when `p` is already known collinear with AB.
fn point_on_segment(a: Vec2, b: Vec2, p: Vec2, eps: f32) -> bool {
    p.x >= a.x.min(b.x) - eps
        && p.x <= a.x.max(b.x) + eps
        && p.y >= a.y.min(b.y) - eps
        && p.y <= a.y.max(b.y) + eps
}

pub fn segments_intersect(a: Vec2, b: Vec2, c: Vec2, d: Vec2, eps: f32) -> bool {
    let o1 = orient2d(a, b, c);
    let o2 = orient2d(a, b, d);
    let o3 = orient2d(c, d, a);
    let o4 = orient2d(c, d, b);

    if o1 * o2 < 0.0 && o3 * o4 < 0.0 {
        return true;
    }
    (o1.abs() <= eps && point_on_segment(a, b, c, eps))
        || (o2.abs() <= eps && point_on_segment(a, b, d, eps))
        || (o3.abs() <= eps && point_on_segment(c, d, a, eps))
        || (o4.abs() <= eps && point_on_segment(c, d, b, eps))
}

/// Sign-consistency test; points within epsilon of an edge count as inside,
/// and winding does not matter.
pub fn point_in_triangle(p: Vec2, a: Vec2, b: Vec2, c: Vec2, eps: f32) -> bool {
    let o1 = orient2d(a, b, p);
    let o2 = orient2d(b, c, p);
    let o3 = orient2d(c, a, p);
    let has_neg = o1 < -eps || o2 < -eps || o3 < -eps;
    let has_pos = o1 > eps || o2 > eps || o3 > eps;
    !(has_neg && has_pos)
}

pub fn triangles_intersect(a: [Vec2; 3], b: [Vec2; 3], eps: f32) -> bool {
    let a_edges = [(a[0], a[1]), (a[1], a[2]), (a[2], a[0])];
    let b_edges = [(b[0], b[1]), (b[1], b[2]), (b[2], b[0])];
    for &(a0, a1) in &a_edges {
        for &(b0, b1) in &b_edges {
            if segments_intersect(a0, a1, b0, b1, eps) {
                return true;
            }
        }
    }
    // No edge crossing: one triangle may contain the other.
    a.iter().any(|&p| point_in_triangle(p, b[0], b[1], b[2], eps))
        || b.iter().any(|&p| point_in_triangle(p, a[0], a[1], a[2], eps))
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::vec2;

    const EPS: f32 = 1e-4;

    #[test]
    fn crossing_segments_intersect() {
        assert!(segments_intersect(
            vec2(0.0, 0.0),
            vec2(2.0, 2.0),
            vec2(0.0, 2.0),
            vec2(2.0, 0.0),
            EPS
        ));
        assert!(!segments_intersect(
            vec2(0.0, 0.0),
            vec2(1.0, 0.0),
            vec2(0.0, 1.0),
            vec2(1.0, 1.0),
            EPS
        ));
    }

    #[test]
    fn touching_endpoints_count() {
        assert!(segments_intersect(
            vec2(0.0, 0.0),
            vec2(1.0, 0.0),
            vec2(1.0, 0.0),
            vec2(2.0, 0.0),
            EPS
        ));
    }

    #[test]
    fn containment_without_edge_crossing() {
        let outer = [vec2(-5.0, -5.0), vec2(5.0, -5.0), vec2(0.0, 5.0)];
        let inner = [vec2(-1.0, -1.0), vec2(1.0, -1.0), vec2(0.0, 1.0)];
        assert!(triangles_intersect(outer, inner, EPS));
        assert!(triangles_intersect(inner, outer, EPS));
    }

    #[test]
    fn disjoint_triangles_do_not_intersect() {
        let a = [vec2(0.0, 0.0), vec2(1.0, 0.0), vec2(0.0, 1.0)];
        let b = [vec2(3.0, 3.0), vec2(4.0, 3.0), vec2(3.0, 4.0)];
        assert!(!triangles_intersect(a, b, EPS));
    }

    #[test]
    fn tolerance_widens_acceptance() {
        let a = [vec2(0.0, 0.0), vec2(1.0, 0.0), vec2(0.0, 1.0)];
        let b = [vec2(1.05, 0.0), vec2(2.0, 0.0), vec2(1.05, 1.0)];
        assert!(!triangles_intersect(a, b, 1e-4));
        assert!(triangles_intersect(a, b, 0.1));
    }

    #[test]
    fn point_in_triangle_is_winding_agnostic() {
        let p = vec2(0.25, 0.25);
        assert!(point_in_triangle(p, vec2(0.0, 0.0), vec2(1.0, 0.0), vec2(0.0, 1.0), EPS));
        assert!(point_in_triangle(p, vec2(0.0, 1.0), vec2(1.0, 0.0), vec2(0.0, 0.0), EPS));
        assert!(!point_in_triangle(
            vec2(2.0, 2.0),
            vec2(0.0, 0.0),
            vec2(1.0, 0.0),
            vec2(0.0, 1.0),
            EPS
        ));
    }
}
