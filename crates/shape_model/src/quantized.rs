//! Fixed-point impact shapes.
//!
//! Positions, radii, and extents quantize to tenths of a unit; rotations to
//! hundredths of a degree, both round-to-nearest. Quantization happens once
//! per queued impact so that every later read of the same shape is
//! bit-identical regardless of per-machine floating-point drift. The byte
//! layout below is the interchange format for persistence/replication.

use glam::{IVec3, Vec3};
use serde::{Deserialize, Serialize};

use crate::{DestructShape, Obb};

/// Linear fixed-point scale: stored units are tenths of a world unit.
pub const LINEAR_SCALE: f32 = 10.0;
/// Angular fixed-point scale: stored units are hundredths of a degree.
pub const ROTATION_SCALE: f32 = 100.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum QuantizedShapeKind {
    Sphere = 0,
    Box = 1,
    Cylinder = 2,
    Line = 3,
}

/// Quantized impact volume. Flat layout (unused fields stay zero) so the wire
/// encoding is fixed-size per shape.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuantizedShape {
    pub kind: QuantizedShapeKind,
    /// Center (sphere/box/cylinder) or segment start (line), in tenths.
    pub center_q: IVec3,
    /// Sphere/cylinder radius in tenths.
    pub radius_q: i32,
    /// Box half extents in tenths; `z` doubles as cylinder half height.
    pub half_extent_q: IVec3,
    /// Box XYZ Euler rotation in hundredths of a degree.
    pub rotation_q: IVec3,
    /// Line segment end in tenths.
    pub end_q: IVec3,
    /// Line thickness in tenths.
    pub thickness_q: i32,
}

fn quant_vec(v: Vec3) -> IVec3 {
    IVec3::new(
        (v.x * LINEAR_SCALE).round() as i32,
        (v.y * LINEAR_SCALE).round() as i32,
        (v.z * LINEAR_SCALE).round() as i32,
    )
}

fn dequant_vec(v: IVec3) -> Vec3 {
    Vec3::new(v.x as f32, v.y as f32, v.z as f32) / LINEAR_SCALE
}

fn quant_scalar(v: f32) -> i32 {
    (v * LINEAR_SCALE).round() as i32
}

fn quant_rot(v: Vec3) -> IVec3 {
    IVec3::new(
        (v.x * ROTATION_SCALE).round() as i32,
        (v.y * ROTATION_SCALE).round() as i32,
        (v.z * ROTATION_SCALE).round() as i32,
    )
}

impl QuantizedShape {
    pub fn from_shape(shape: &DestructShape) -> Self {
        let mut q = Self {
            kind: QuantizedShapeKind::Sphere,
            center_q: IVec3::ZERO,
            radius_q: 0,
            half_extent_q: IVec3::ZERO,
            rotation_q: IVec3::ZERO,
            end_q: IVec3::ZERO,
            thickness_q: 0,
        };
        match *shape {
            DestructShape::Sphere { center, radius } => {
                q.kind = QuantizedShapeKind::Sphere;
                q.center_q = quant_vec(center);
                q.radius_q = quant_scalar(radius);
            }
            DestructShape::Box {
                center,
                half_extent,
                rotation_deg,
            } => {
                q.kind = QuantizedShapeKind::Box;
                q.center_q = quant_vec(center);
                q.half_extent_q = quant_vec(half_extent);
                q.rotation_q = quant_rot(rotation_deg);
            }
            DestructShape::Cylinder {
                center,
                radius,
                half_height,
            } => {
                q.kind = QuantizedShapeKind::Cylinder;
                q.center_q = quant_vec(center);
                q.radius_q = quant_scalar(radius);
                q.half_extent_q.z = quant_scalar(half_height);
            }
            DestructShape::Line {
                start,
                end,
                thickness,
            } => {
                q.kind = QuantizedShapeKind::Line;
                q.center_q = quant_vec(start);
                q.end_q = quant_vec(end);
                q.thickness_q = quant_scalar(thickness);
            }
        }
        q
    }

    /// Reconstruct the canonical form from the stored fixed-point values.
    pub fn to_shape(&self) -> DestructShape {
        match self.kind {
            QuantizedShapeKind::Sphere => DestructShape::Sphere {
                center: dequant_vec(self.center_q),
                radius: self.radius_q as f32 / LINEAR_SCALE,
            },
            QuantizedShapeKind::Box => DestructShape::Box {
                center: dequant_vec(self.center_q),
                half_extent: dequant_vec(self.half_extent_q),
                rotation_deg: Vec3::new(
                    self.rotation_q.x as f32,
                    self.rotation_q.y as f32,
                    self.rotation_q.z as f32,
                ) / ROTATION_SCALE,
            },
            QuantizedShapeKind::Cylinder => DestructShape::Cylinder {
                center: dequant_vec(self.center_q),
                radius: self.radius_q as f32 / LINEAR_SCALE,
                half_height: self.half_extent_q.z as f32 / LINEAR_SCALE,
            },
            QuantizedShapeKind::Line => DestructShape::Line {
                start: dequant_vec(self.center_q),
                end: dequant_vec(self.end_q),
                thickness: self.thickness_q as f32 / LINEAR_SCALE,
            },
        }
    }

    /// Shape center (segment start for lines), dequantized.
    pub fn center(&self) -> Vec3 {
        dequant_vec(self.center_q)
    }

    /// Containment evaluated on the dequantized values.
    pub fn contains_point(&self, p: Vec3) -> bool {
        self.to_shape().contains_point(p)
    }

    pub fn intersects_obb(&self, obb: &Obb) -> bool {
        self.to_shape().intersects_obb(obb)
    }

    /// Fixed little-endian layout: kind byte, then 14 i32 fields.
    pub fn encode(&self, out: &mut Vec<u8>) {
        out.push(self.kind as u8);
        for v in [
            self.center_q.x,
            self.center_q.y,
            self.center_q.z,
            self.radius_q,
            self.half_extent_q.x,
            self.half_extent_q.y,
            self.half_extent_q.z,
            self.rotation_q.x,
            self.rotation_q.y,
            self.rotation_q.z,
            self.end_q.x,
            self.end_q.y,
            self.end_q.z,
            self.thickness_q,
        ] {
            out.extend_from_slice(&v.to_le_bytes());
        }
    }

    pub fn decode(inp: &mut &[u8]) -> anyhow::Result<Self> {
        let kind = match take::<1>(inp)?[0] {
            0 => QuantizedShapeKind::Sphere,
            1 => QuantizedShapeKind::Box,
            2 => QuantizedShapeKind::Cylinder,
            3 => QuantizedShapeKind::Line,
            other => anyhow::bail!("unknown shape kind {other}"),
        };
        let mut f = [0i32; 14];
        for v in f.iter_mut() {
            *v = i32::from_le_bytes(take::<4>(inp)?);
        }
        Ok(Self {
            kind,
            center_q: IVec3::new(f[0], f[1], f[2]),
            radius_q: f[3],
            half_extent_q: IVec3::new(f[4], f[5], f[6]),
            rotation_q: IVec3::new(f[7], f[8], f[9]),
            end_q: IVec3::new(f[10], f[11], f[12]),
            thickness_q: f[13],
        })
    }
}

pub(crate) fn take<const N: usize>(inp: &mut &[u8]) -> anyhow::Result<[u8; N]> {
    if inp.len() < N {
        anyhow::bail!("short read");
    }
    let (a, b) = inp.split_at(N);
    *inp = b;
    let mut buf = [0u8; N];
    buf.copy_from_slice(a);
    Ok(buf)
}
