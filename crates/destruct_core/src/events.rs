//! Batch results and their wire encoding.

use std::collections::BTreeMap;

use glam::Vec3;
use shape_model::QuantizedShape;

/// One detached fragment from a batch: the member cells, the spawn location
/// (group centroid), and the launch velocity.
#[derive(Clone, Debug, PartialEq)]
pub struct DetachedDebris {
    pub debris_id: u32,
    pub cell_ids: Vec<u32>,
    pub location: Vec3,
    pub velocity: Vec3,
}

/// Everything a replication layer needs to mirror one processed batch:
/// the quantized inputs, every cell id that died (newly hit plus detached),
/// and the debris descriptors.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BatchedDestructionEvent {
    pub inputs: Vec<QuantizedShape>,
    pub destroyed_cell_ids: Vec<u32>,
    pub debris: Vec<DetachedDebris>,
}

/// Outcome of one sub-cell-level impact.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DestructionResult {
    pub affected_cells: Vec<u32>,
    pub newly_dead_sub_cells: BTreeMap<u32, Vec<u8>>,
    pub newly_destroyed_cells: Vec<u32>,
    pub dead_sub_cell_count: u32,
}

fn write_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn write_vec3(out: &mut Vec<u8>, v: Vec3) {
    for c in [v.x, v.y, v.z] {
        out.extend_from_slice(&c.to_le_bytes());
    }
}

fn read_u32(inp: &mut &[u8]) -> anyhow::Result<u32> {
    anyhow::ensure!(inp.len() >= 4, "short read");
    let (a, b) = inp.split_at(4);
    *inp = b;
    Ok(u32::from_le_bytes([a[0], a[1], a[2], a[3]]))
}

fn read_f32(inp: &mut &[u8]) -> anyhow::Result<f32> {
    Ok(f32::from_bits(read_u32(inp)?))
}

fn read_vec3(inp: &mut &[u8]) -> anyhow::Result<Vec3> {
    Ok(Vec3::new(read_f32(inp)?, read_f32(inp)?, read_f32(inp)?))
}

impl BatchedDestructionEvent {
    /// Little-endian layout: input count + shapes, destroyed-id count + ids,
    /// debris count + per-debris (id, member count + ids, location, velocity).
    pub fn encode(&self, out: &mut Vec<u8>) {
        write_u32(out, self.inputs.len() as u32);
        for input in &self.inputs {
            input.encode(out);
        }
        write_u32(out, self.destroyed_cell_ids.len() as u32);
        for &id in &self.destroyed_cell_ids {
            write_u32(out, id);
        }
        write_u32(out, self.debris.len() as u32);
        for d in &self.debris {
            write_u32(out, d.debris_id);
            write_u32(out, d.cell_ids.len() as u32);
            for &id in &d.cell_ids {
                write_u32(out, id);
            }
            write_vec3(out, d.location);
            write_vec3(out, d.velocity);
        }
    }

    pub fn decode(inp: &mut &[u8]) -> anyhow::Result<Self> {
        let input_count = read_u32(inp)?;
        let mut inputs = Vec::with_capacity(input_count.min(4096) as usize);
        for _ in 0..input_count {
            inputs.push(QuantizedShape::decode(inp)?);
        }
        let id_count = read_u32(inp)?;
        let mut destroyed_cell_ids = Vec::with_capacity(id_count.min(65536) as usize);
        for _ in 0..id_count {
            destroyed_cell_ids.push(read_u32(inp)?);
        }
        let debris_count = read_u32(inp)?;
        let mut debris = Vec::with_capacity(debris_count.min(4096) as usize);
        for _ in 0..debris_count {
            let debris_id = read_u32(inp)?;
            let member_count = read_u32(inp)?;
            let mut cell_ids = Vec::with_capacity(member_count.min(65536) as usize);
            for _ in 0..member_count {
                cell_ids.push(read_u32(inp)?);
            }
            let location = read_vec3(inp)?;
            let velocity = read_vec3(inp)?;
            debris.push(DetachedDebris {
                debris_id,
                cell_ids,
                location,
                velocity,
            });
        }
        Ok(Self {
            inputs,
            destroyed_cell_ids,
            debris,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::vec3;
    use shape_model::DestructShape;

    #[test]
    fn event_wire_round_trip() {
        let event = BatchedDestructionEvent {
            inputs: vec![QuantizedShape::from_shape(&DestructShape::Sphere {
                center: vec3(1.0, 2.0, 3.0),
                radius: 4.5,
            })],
            destroyed_cell_ids: vec![3, 7, 12],
            debris: vec![DetachedDebris {
                debris_id: 1,
                cell_ids: vec![7, 12],
                location: vec3(9.5, 0.5, 0.5),
                velocity: vec3(500.0, 0.0, 0.0),
            }],
        };
        let mut buf = Vec::new();
        event.encode(&mut buf);
        let mut slice: &[u8] = &buf;
        let back = BatchedDestructionEvent::decode(&mut slice).expect("decode");
        assert_eq!(event, back);
        assert!(slice.is_empty());
    }

    #[test]
    fn truncated_event_fails_to_decode() {
        let event = BatchedDestructionEvent {
            inputs: Vec::new(),
            destroyed_cell_ids: vec![1, 2, 3],
            debris: Vec::new(),
        };
        let mut buf = Vec::new();
        event.encode(&mut buf);
        buf.truncate(buf.len() - 2);
        let mut slice: &[u8] = &buf;
        assert!(BatchedDestructionEvent::decode(&mut slice).is_err());
    }
}
