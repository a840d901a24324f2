//! Packed GPU vertex format and the 8-bit signed direction codec.

use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3, Vec4};

use crate::backend::{VertexAttribute, VertexBufferLayout, VertexFormat, VertexStepMode};

/// Value of the fourth lane of every packed direction
const PACKED_W: u32 = 127;

/// Packs a direction into four signed 8-bit lanes `(x, y, z, 127)`.
///
/// Each component is scaled by 127 and rounded; components outside
/// `[-1, 1]` saturate.
pub fn encode_direction(v: Vec3) -> u32 {
    let lane = |c: f32| ((c * 127.0).round() as i8) as u8 as u32;
    lane(v.x) | (lane(v.y) << 8) | (lane(v.z) << 16) | (PACKED_W << 24)
}

/// Unpacks all four lanes of a packed direction to `[-1, 1]`.
pub fn decode_direction(packed: u32) -> Vec4 {
    let lane = |shift: u32| ((packed >> shift) as u8 as i8) as f32 / 127.0;
    Vec4::new(lane(0), lane(8), lane(16), lane(24))
}

/// Packed vertex as stored in the unified vertex buffer.
///
/// `[position.xyz, normal]` then `[texcoord.xy, tangent, padding]`, where
/// `normal` and `tangent` hold [`encode_direction`] words. They are kept as
/// `u32` on the CPU side; the bytes are identical to storing the word's bit
/// pattern in an `f32`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: u32,
    pub texcoord: [f32; 2],
    pub tangent: u32,
    pub padding: u32,
}

const _: () = assert!(std::mem::size_of::<Vertex>() == 32);

impl Vertex {
    /// Byte offsets inside the packed layout
    pub const POSITION_OFFSET: u64 = 0;
    pub const NORMAL_OFFSET: u64 = 12;
    pub const TEXCOORD_OFFSET: u64 = 16;
    pub const TANGENT_OFFSET: u64 = 24;
    pub const STRIDE: u64 = std::mem::size_of::<Vertex>() as u64;

    /// Build a vertex. Absent attributes encode as the zero vector.
    pub fn new(position: Vec3, normal: Vec3, texcoord: Vec2, tangent: Vec3) -> Self {
        Self {
            position: position.to_array(),
            normal: encode_direction(normal),
            texcoord: texcoord.to_array(),
            tangent: encode_direction(tangent),
            padding: 0,
        }
    }

    pub fn position(&self) -> Vec3 {
        Vec3::from_array(self.position)
    }

    pub fn normal(&self) -> Vec3 {
        decode_direction(self.normal).truncate()
    }

    pub fn tangent(&self) -> Vec3 {
        decode_direction(self.tangent).truncate()
    }

    pub fn texcoord(&self) -> Vec2 {
        Vec2::from_array(self.texcoord)
    }

    /// Vertex input description matching the packed layout
    pub fn layout() -> VertexBufferLayout {
        VertexBufferLayout {
            array_stride: Self::STRIDE,
            step_mode: VertexStepMode::Vertex,
            attributes: vec![
                VertexAttribute {
                    location: 0,
                    format: VertexFormat::Float32x3,
                    offset: Self::POSITION_OFFSET,
                },
                VertexAttribute {
                    location: 1,
                    format: VertexFormat::Uint32,
                    offset: Self::NORMAL_OFFSET,
                },
                VertexAttribute {
                    location: 2,
                    format: VertexFormat::Float32x2,
                    offset: Self::TEXCOORD_OFFSET,
                },
                VertexAttribute {
                    location: 3,
                    format: VertexFormat::Uint32,
                    offset: Self::TANGENT_OFFSET,
                },
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Vec3::X)]
    #[case(Vec3::NEG_Y)]
    #[case(Vec3::new(0.577, -0.577, 0.577))]
    #[case(Vec3::new(0.6, 0.0, -0.8))]
    #[case(Vec3::new(-0.267, 0.535, 0.802))]
    fn decode_is_within_quantization_bound(#[case] v: Vec3) {
        let decoded = decode_direction(encode_direction(v));
        for (got, want) in decoded.truncate().to_array().iter().zip(v.to_array()) {
            assert!((got - want).abs() <= 1.0 / 127.0, "{got} vs {want}");
        }
        assert_eq!(decoded.w, 1.0);
    }

    #[test]
    fn encoding_is_idempotent_on_quantized_values() {
        let v = Vec3::new(0.31, -0.9, 0.12).normalize();
        let once = encode_direction(v);
        let twice = encode_direction(decode_direction(once).truncate());
        assert_eq!(once, twice);
    }

    #[test]
    fn lanes_are_twos_complement() {
        assert_eq!(encode_direction(Vec3::new(-1.0, 0.0, 1.0)), 0x7F7F_0081);
        assert_eq!(encode_direction(Vec3::ZERO), 0x7F00_0000);
    }

    #[test]
    fn absent_attributes_decode_to_zero() {
        let v = Vertex::new(Vec3::ONE, Vec3::ZERO, Vec2::ZERO, Vec3::ZERO);
        assert_eq!(v.normal(), Vec3::ZERO);
        assert_eq!(v.tangent(), Vec3::ZERO);
        assert_eq!(v.texcoord(), Vec2::ZERO);
        assert_eq!(v.padding, 0);
    }

    #[test]
    fn layout_matches_struct() {
        let layout = Vertex::layout();
        assert_eq!(layout.array_stride, 32);
        let offsets: Vec<u64> = layout.attributes.iter().map(|a| a.offset).collect();
        assert_eq!(offsets, vec![0, 12, 16, 24]);
        assert_eq!(
            std::mem::offset_of!(Vertex, tangent) as u64,
            Vertex::TANGENT_OFFSET
        );
    }
}
