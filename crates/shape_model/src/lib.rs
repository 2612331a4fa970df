//! shape_model: impact volumes for the destruction core.
//!
//! Scope
//! - `DestructShape`: canonical float shapes (sphere/box/cylinder/line) with
//!   point containment and shape-vs-OBB overlap tests.
//! - `QuantizedShape`: fixed-point form (tenths of a unit, hundredths of a
//!   degree) used for queueing, persistence, and transmission.
//!
//! Containment is exact for spheres and boxes; cylinder-vs-OBB is a
//! conservative slab + projected-corner test. Degenerate inputs (zero-length
//! line, near-zero separating axis) never divide by zero: predicates report
//! no containment, axis tests report overlap.

#![forbid(unsafe_code)]

use glam::{EulerRot, Mat3, Quat, Vec3};

mod quantized;
pub use quantized::{QuantizedShape, QuantizedShapeKind, LINEAR_SCALE, ROTATION_SCALE};

const EPS: f32 = 1e-6;

/// Oriented box used as the query volume for cell overlap tests.
#[derive(Clone, Copy, Debug)]
pub struct Obb {
    pub center: Vec3,
    pub half_extents: Vec3,
    pub rot3x3: Mat3,
}

impl Obb {
    /// Axis-aligned box as a trivially-rotated OBB.
    pub fn axis_aligned(center: Vec3, half_extents: Vec3) -> Self {
        Self {
            center,
            half_extents,
            rot3x3: Mat3::IDENTITY,
        }
    }

    /// The 8 world-space corners.
    pub fn corners(&self) -> [Vec3; 8] {
        let mut out = [Vec3::ZERO; 8];
        for (i, c) in out.iter_mut().enumerate() {
            let sx = if i & 1 != 0 { 1.0 } else { -1.0 };
            let sy = if i & 2 != 0 { 1.0 } else { -1.0 };
            let sz = if i & 4 != 0 { 1.0 } else { -1.0 };
            let local = Vec3::new(
                sx * self.half_extents.x,
                sy * self.half_extents.y,
                sz * self.half_extents.z,
            );
            *c = self.center + self.rot3x3 * local;
        }
        out
    }
}

/// Canonical (floating-point) impact volume.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DestructShape {
    Sphere {
        center: Vec3,
        radius: f32,
    },
    /// Oriented box; `rotation_deg` is XYZ Euler degrees, zero means AABB.
    Box {
        center: Vec3,
        half_extent: Vec3,
        rotation_deg: Vec3,
    },
    /// Z-aligned cylinder.
    Cylinder {
        center: Vec3,
        radius: f32,
        half_height: f32,
    },
    /// Swept segment with enclosing thickness (capsule tool, e.g. a drill
    /// stroke from impact point along the negative surface normal).
    Line {
        start: Vec3,
        end: Vec3,
        thickness: f32,
    },
}

impl DestructShape {
    /// Point containment per shape kind.
    pub fn contains_point(&self, p: Vec3) -> bool {
        match *self {
            DestructShape::Sphere { center, radius } => {
                p.distance_squared(center) <= radius * radius
            }
            DestructShape::Box {
                center,
                half_extent,
                rotation_deg,
            } => {
                if rotation_deg.abs().max_element() <= EPS {
                    let d = (p - center).abs();
                    d.x <= half_extent.x && d.y <= half_extent.y && d.z <= half_extent.z
                } else {
                    let local = rotation_quat(rotation_deg).inverse() * (p - center);
                    local.x.abs() <= half_extent.x
                        && local.y.abs() <= half_extent.y
                        && local.z.abs() <= half_extent.z
                }
            }
            DestructShape::Cylinder {
                center,
                radius,
                half_height,
            } => {
                let dx = p.x - center.x;
                let dy = p.y - center.y;
                dx * dx + dy * dy <= radius * radius && (p.z - center.z).abs() <= half_height
            }
            DestructShape::Line {
                start,
                end,
                thickness,
            } => segment_contains_point(start, end, thickness, p),
        }
    }

    /// Conservative shape-vs-OBB overlap (used for cell broad tests). All
    /// variants may report overlap for near-miss configurations but never
    /// miss a true overlap.
    pub fn intersects_obb(&self, obb: &Obb) -> bool {
        match *self {
            DestructShape::Sphere { center, radius } => sphere_vs_obb(center, radius, obb),
            DestructShape::Box {
                center,
                half_extent,
                rotation_deg,
            } => {
                let own = Obb {
                    center,
                    half_extents: half_extent,
                    rot3x3: Mat3::from_quat(rotation_quat(rotation_deg)),
                };
                obb_vs_obb_sat(&own, obb)
            }
            DestructShape::Cylinder {
                center,
                radius,
                half_height,
            } => cylinder_vs_obb(center, radius, half_height, obb),
            DestructShape::Line {
                start,
                end,
                thickness,
            } => capsule_vs_obb(start, end, thickness, obb),
        }
    }
}

fn rotation_quat(rotation_deg: Vec3) -> Quat {
    Quat::from_euler(
        EulerRot::XYZ,
        rotation_deg.x.to_radians(),
        rotation_deg.y.to_radians(),
        rotation_deg.z.to_radians(),
    )
}

pub(crate) fn segment_contains_point(start: Vec3, end: Vec3, thickness: f32, p: Vec3) -> bool {
    let dir = end - start;
    let len = dir.length();
    if len < EPS {
        // Degenerate tool; no containment rather than a divide-by-zero.
        return false;
    }
    let dir_n = dir / len;
    let t = (p - start).dot(dir_n);
    if t < 0.0 || t > len {
        return false;
    }
    let closest = start + dir_n * t;
    p.distance_squared(closest) <= thickness * thickness
}

fn sphere_vs_obb(center: Vec3, radius: f32, obb: &Obb) -> bool {
    // Closest point on the OBB in its local frame.
    let local = obb.rot3x3.transpose() * (center - obb.center);
    let clamped = local.clamp(-obb.half_extents, obb.half_extents);
    let closest = obb.center + obb.rot3x3 * clamped;
    center.distance_squared(closest) <= radius * radius
}

/// Separating Axis Theorem over the 15 candidate axes (3 + 3 face normals,
/// 9 edge cross products). Near-zero cross products are skipped, i.e. treated
/// as non-separating.
fn obb_vs_obb_sat(a: &Obb, b: &Obb) -> bool {
    let t = b.center - a.center;
    let a_axes = [a.rot3x3.col(0), a.rot3x3.col(1), a.rot3x3.col(2)];
    let b_axes = [b.rot3x3.col(0), b.rot3x3.col(1), b.rot3x3.col(2)];

    let mut axes = [Vec3::ZERO; 15];
    axes[..3].copy_from_slice(&a_axes);
    axes[3..6].copy_from_slice(&b_axes);
    let mut n = 6;
    for ax in &a_axes {
        for bx in &b_axes {
            axes[n] = ax.cross(*bx);
            n += 1;
        }
    }

    for axis in axes {
        if axis.length_squared() < EPS {
            // Parallel edge pair; this axis cannot separate.
            continue;
        }
        let ra = a_axes
            .iter()
            .zip([a.half_extents.x, a.half_extents.y, a.half_extents.z])
            .map(|(ax, he)| (ax.dot(axis)).abs() * he)
            .sum::<f32>();
        let rb = b_axes
            .iter()
            .zip([b.half_extents.x, b.half_extents.y, b.half_extents.z])
            .map(|(bx, he)| (bx.dot(axis)).abs() * he)
            .sum::<f32>();
        if t.dot(axis).abs() > ra + rb {
            return false;
        }
    }
    true
}

/// Z-slab overlap plus an XY circle-vs-projected-corner-bounds test. The XY
/// phase uses the AABB of the projected corners, so it is conservative for
/// strongly rotated boxes.
fn cylinder_vs_obb(center: Vec3, radius: f32, half_height: f32, obb: &Obb) -> bool {
    let corners = obb.corners();
    let mut min_z = f32::MAX;
    let mut max_z = f32::MIN;
    let mut min_xy = glam::Vec2::MAX;
    let mut max_xy = glam::Vec2::MIN;
    for c in corners {
        min_z = min_z.min(c.z);
        max_z = max_z.max(c.z);
        min_xy = min_xy.min(glam::Vec2::new(c.x, c.y));
        max_xy = max_xy.max(glam::Vec2::new(c.x, c.y));
    }
    if center.z + half_height < min_z || center.z - half_height > max_z {
        return false;
    }
    let cxy = glam::Vec2::new(center.x, center.y);
    let closest = cxy.clamp(min_xy, max_xy);
    cxy.distance_squared(closest) <= radius * radius
}

/// Segment vs OBB extended by the capsule thickness on every half-extent
/// (slab clipping in the OBB's local frame). Degenerate segments fall back to
/// the sphere test.
fn capsule_vs_obb(start: Vec3, end: Vec3, thickness: f32, obb: &Obb) -> bool {
    if (end - start).length_squared() < EPS * EPS {
        return sphere_vs_obb(start, thickness, obb);
    }
    let inv = obb.rot3x3.transpose();
    let p0 = inv * (start - obb.center);
    let p1 = inv * (end - obb.center);
    let ext = obb.half_extents + Vec3::splat(thickness);

    let d = p1 - p0;
    let mut t0 = 0.0f32;
    let mut t1 = 1.0f32;
    for axis in 0..3 {
        let (p, dd, e) = (p0[axis], d[axis], ext[axis]);
        if dd.abs() < EPS {
            if p.abs() > e {
                return false;
            }
            continue;
        }
        let inv_d = 1.0 / dd;
        let mut ta = (-e - p) * inv_d;
        let mut tb = (e - p) * inv_d;
        if ta > tb {
            core::mem::swap(&mut ta, &mut tb);
        }
        t0 = t0.max(ta);
        t1 = t1.min(tb);
        if t0 > t1 {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::vec3;

    #[test]
    fn sphere_contains_origin_not_far_point() {
        let s = DestructShape::Sphere {
            center: Vec3::ZERO,
            radius: 5.0,
        };
        assert!(s.contains_point(Vec3::ZERO));
        assert!(!s.contains_point(vec3(10.0, 0.0, 0.0)));
    }

    #[test]
    fn box_rotation_changes_containment() {
        // Thin slab along X; a point on the diagonal enters only once rotated 45 deg about Z.
        let p = vec3(1.2, 1.2, 0.0);
        let flat = DestructShape::Box {
            center: Vec3::ZERO,
            half_extent: vec3(2.0, 0.4, 1.0),
            rotation_deg: Vec3::ZERO,
        };
        let tilted = DestructShape::Box {
            center: Vec3::ZERO,
            half_extent: vec3(2.0, 0.4, 1.0),
            rotation_deg: vec3(0.0, 0.0, 45.0),
        };
        assert!(!flat.contains_point(p));
        assert!(tilted.contains_point(p));
    }

    #[test]
    fn cylinder_respects_height_and_radius() {
        let c = DestructShape::Cylinder {
            center: Vec3::ZERO,
            radius: 1.0,
            half_height: 2.0,
        };
        assert!(c.contains_point(vec3(0.5, 0.5, 1.9)));
        assert!(!c.contains_point(vec3(0.5, 0.5, 2.1)));
        assert!(!c.contains_point(vec3(1.1, 0.0, 0.0)));
    }

    #[test]
    fn zero_length_line_contains_nothing() {
        let l = DestructShape::Line {
            start: vec3(1.0, 1.0, 1.0),
            end: vec3(1.0, 1.0, 1.0),
            thickness: 5.0,
        };
        assert!(!l.contains_point(vec3(1.0, 1.0, 1.0)));
    }

    #[test]
    fn line_contains_points_near_segment_only() {
        let l = DestructShape::Line {
            start: Vec3::ZERO,
            end: vec3(10.0, 0.0, 0.0),
            thickness: 1.0,
        };
        assert!(l.contains_point(vec3(5.0, 0.5, 0.0)));
        assert!(!l.contains_point(vec3(5.0, 1.5, 0.0)));
        // Beyond either cap
        assert!(!l.contains_point(vec3(-0.5, 0.0, 0.0)));
        assert!(!l.contains_point(vec3(10.5, 0.0, 0.0)));
    }

    #[test]
    fn sphere_obb_closest_point() {
        let obb = Obb::axis_aligned(vec3(5.0, 0.0, 0.0), Vec3::splat(1.0));
        let near = DestructShape::Sphere {
            center: Vec3::ZERO,
            radius: 4.5,
        };
        let far = DestructShape::Sphere {
            center: Vec3::ZERO,
            radius: 3.5,
        };
        assert!(near.intersects_obb(&obb));
        assert!(!far.intersects_obb(&obb));
    }

    #[test]
    fn sat_separates_distant_boxes() {
        let a = DestructShape::Box {
            center: Vec3::ZERO,
            half_extent: Vec3::splat(1.0),
            rotation_deg: vec3(0.0, 0.0, 30.0),
        };
        let touching = Obb::axis_aligned(vec3(2.0, 0.0, 0.0), Vec3::splat(1.0));
        let separated = Obb::axis_aligned(vec3(5.0, 0.0, 0.0), Vec3::splat(1.0));
        assert!(a.intersects_obb(&touching));
        assert!(!a.intersects_obb(&separated));
    }

    #[test]
    fn cylinder_obb_slab_rejects_above() {
        let cyl = DestructShape::Cylinder {
            center: vec3(0.0, 0.0, 10.0),
            radius: 1.0,
            half_height: 1.0,
        };
        let obb = Obb::axis_aligned(Vec3::ZERO, Vec3::splat(2.0));
        assert!(!cyl.intersects_obb(&obb));
    }

    #[test]
    fn capsule_obb_hits_through_box() {
        let cap = DestructShape::Line {
            start: vec3(-5.0, 0.2, 0.2),
            end: vec3(5.0, 0.2, 0.2),
            thickness: 0.1,
        };
        let obb = Obb::axis_aligned(Vec3::ZERO, Vec3::splat(1.0));
        assert!(cap.intersects_obb(&obb));
        let miss = DestructShape::Line {
            start: vec3(-5.0, 3.0, 0.0),
            end: vec3(5.0, 3.0, 0.0),
            thickness: 0.5,
        };
        assert!(!miss.intersects_obb(&obb));
    }
}
