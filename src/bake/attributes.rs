//! Typed access to the glTF attribute streams the baker consumes.
//!
//! Attribute lookup by name happens once per primitive in
//! [`PrimitiveStreams::resolve`]; the per-vertex loop then reads from plain
//! byte slices with a precomputed stride.

use gltf::accessor::{DataType, Dimensions};
use gltf::Semantic;

use super::error::{BakeError, BakeResult};

/// The fixed attribute set the packed vertex is built from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeSemantic {
    Position,
    Normal,
    Tangent,
    TexCoord0,
}

impl AttributeSemantic {
    pub const ALL: [Self; 4] = [Self::Position, Self::Normal, Self::Tangent, Self::TexCoord0];

    /// Attribute key as written in glTF JSON
    pub fn gltf_name(&self) -> &'static str {
        match self {
            Self::Position => "POSITION",
            Self::Normal => "NORMAL",
            Self::Tangent => "TANGENT",
            Self::TexCoord0 => "TEXCOORD_0",
        }
    }

    pub fn to_gltf(self) -> Semantic {
        match self {
            Self::Position => Semantic::Positions,
            Self::Normal => Semantic::Normals,
            Self::Tangent => Semantic::Tangents,
            Self::TexCoord0 => Semantic::TexCoords(0),
        }
    }

    /// Components the baker reads from this attribute
    fn components(&self) -> usize {
        match self {
            Self::Position | Self::Normal | Self::Tangent => 3,
            Self::TexCoord0 => 2,
        }
    }
}

/// Byte view over one accessor: where element 0 starts, how far apart
/// elements are and how to decode their components.
#[derive(Debug, Clone, Copy)]
pub struct AttributeStream<'a> {
    accessor: usize,
    data: &'a [u8],
    stride: usize,
    count: usize,
    data_type: DataType,
    normalized: bool,
}

impl<'a> AttributeStream<'a> {
    /// Resolve an accessor against the document's buffers.
    ///
    /// The stride is the buffer view's explicit stride when it has one,
    /// otherwise the tightly packed element size.
    pub fn from_accessor(
        accessor: &gltf::Accessor<'_>,
        buffers: &'a [Vec<u8>],
    ) -> BakeResult<Self> {
        let view = accessor
            .view()
            .ok_or(BakeError::MissingBufferView(accessor.index()))?;
        let buffer_data = buffers
            .get(view.buffer().index())
            .ok_or(BakeError::AccessorOutOfRange {
                accessor: accessor.index(),
                needed: 0,
                available: 0,
            })?;

        let element_size = accessor.data_type().size() * accessor.dimensions().multiplicity();
        let stride = view.stride().filter(|&s| s != 0).unwrap_or(element_size);
        let count = accessor.count();

        // Saturates on absurd counts so the range check below rejects them
        let start = view.offset().saturating_add(accessor.offset());
        let needed = match count {
            0 => start,
            n => (n - 1)
                .saturating_mul(stride)
                .saturating_add(element_size)
                .saturating_add(start),
        };
        if needed > buffer_data.len() {
            return Err(BakeError::AccessorOutOfRange {
                accessor: accessor.index(),
                needed,
                available: buffer_data.len(),
            });
        }

        Ok(Self {
            accessor: accessor.index(),
            data: &buffer_data[start..],
            stride,
            count,
            data_type: accessor.data_type(),
            normalized: accessor.normalized(),
        })
    }

    /// Check that the stream can be decoded as `semantic`.
    fn check(self, semantic: AttributeSemantic, dimensions: Dimensions) -> BakeResult<Self> {
        let components_ok = dimensions.multiplicity() >= semantic.components()
            && !matches!(dimensions, Dimensions::Mat2 | Dimensions::Mat3 | Dimensions::Mat4);
        let type_ok = match (semantic, self.data_type) {
            (_, DataType::F32) => true,
            (AttributeSemantic::Position, _) => false,
            (_, DataType::I8 | DataType::U8 | DataType::I16 | DataType::U16) => self.normalized,
            _ => false,
        };
        if components_ok && type_ok {
            Ok(self)
        } else {
            Err(BakeError::UnsupportedAttribute {
                accessor: self.accessor,
                semantic: semantic.gltf_name(),
                format: format!(
                    "{:?} {:?}{}",
                    dimensions,
                    self.data_type,
                    if self.normalized { " normalized" } else { "" }
                ),
            })
        }
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    fn component(&self, element: usize, component: usize) -> f32 {
        let size = self.data_type.size();
        let at = element * self.stride + component * size;
        let bytes = &self.data[at..at + size];
        match self.data_type {
            DataType::F32 => bytemuck::pod_read_unaligned::<f32>(bytes),
            DataType::I8 => (bytes[0] as i8 as f32 / 127.0).max(-1.0),
            DataType::U8 => bytes[0] as f32 / 255.0,
            DataType::I16 => (bytemuck::pod_read_unaligned::<i16>(bytes) as f32 / 32767.0).max(-1.0),
            DataType::U16 => bytemuck::pod_read_unaligned::<u16>(bytes) as f32 / 65535.0,
            DataType::U32 => bytemuck::pod_read_unaligned::<u32>(bytes) as f32,
        }
    }

    /// Decode the first `N` components of an element.
    pub fn read<const N: usize>(&self, element: usize) -> [f32; N] {
        std::array::from_fn(|c| self.component(element, c))
    }
}

/// The attribute streams of one triangle primitive.
#[derive(Debug, Clone, Copy)]
pub struct PrimitiveStreams<'a> {
    pub position: AttributeStream<'a>,
    pub normal: Option<AttributeStream<'a>>,
    pub tangent: Option<AttributeStream<'a>>,
    pub texcoord0: Option<AttributeStream<'a>>,
}

impl<'a> PrimitiveStreams<'a> {
    /// Resolve POSITION (required) and the optional attributes.
    pub fn resolve(
        mesh: usize,
        primitive: &gltf::Primitive<'_>,
        buffers: &'a [Vec<u8>],
    ) -> BakeResult<Self> {
        let stream = |semantic: AttributeSemantic| -> BakeResult<Option<AttributeStream<'a>>> {
            primitive
                .get(&semantic.to_gltf())
                .map(|accessor| {
                    AttributeStream::from_accessor(&accessor, buffers)
                        .and_then(|s| s.check(semantic, accessor.dimensions()))
                })
                .transpose()
        };

        let position = stream(AttributeSemantic::Position)?.ok_or(BakeError::MissingPosition {
            mesh,
            primitive: primitive.index(),
        })?;

        let streams = Self {
            position,
            normal: stream(AttributeSemantic::Normal)?,
            tangent: stream(AttributeSemantic::Tangent)?,
            texcoord0: stream(AttributeSemantic::TexCoord0)?,
        };

        // Optional streams shorter than POSITION would be read past their end
        for optional in [streams.normal, streams.tangent, streams.texcoord0]
            .into_iter()
            .flatten()
        {
            if optional.len() < position.len() {
                return Err(BakeError::AccessorOutOfRange {
                    accessor: optional.accessor,
                    needed: position.len(),
                    available: optional.len(),
                });
            }
        }

        Ok(streams)
    }

    pub fn vertex_count(&self) -> usize {
        self.position.len()
    }

    pub fn has(&self, semantic: AttributeSemantic) -> bool {
        match semantic {
            AttributeSemantic::Position => true,
            AttributeSemantic::Normal => self.normal.is_some(),
            AttributeSemantic::Tangent => self.tangent.is_some(),
            AttributeSemantic::TexCoord0 => self.texcoord0.is_some(),
        }
    }
}

/// Read a primitive's indices, widening 16-bit values to 32 bits.
pub fn read_indices(
    mesh: usize,
    primitive: usize,
    accessor: &gltf::Accessor<'_>,
    buffers: &[Vec<u8>],
    out: &mut Vec<u32>,
) -> BakeResult<()> {
    let stream = AttributeStream::from_accessor(accessor, buffers)?;
    match (accessor.data_type(), accessor.dimensions()) {
        (DataType::U16, Dimensions::Scalar) => out.extend(
            (0..stream.count)
                .map(|i| &stream.data[i * stream.stride..i * stream.stride + 2])
                .map(|b| bytemuck::pod_read_unaligned::<u16>(b) as u32),
        ),
        (DataType::U32, Dimensions::Scalar) => out.extend(
            (0..stream.count)
                .map(|i| &stream.data[i * stream.stride..i * stream.stride + 4])
                .map(bytemuck::pod_read_unaligned::<u32>),
        ),
        (data_type, dimensions) => {
            return Err(BakeError::UnsupportedIndexType {
                mesh,
                primitive,
                component: format!("{dimensions:?} {data_type:?}"),
            })
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream(data: &[u8], stride: usize, count: usize, data_type: DataType, normalized: bool) -> AttributeStream<'_> {
        AttributeStream {
            accessor: 0,
            data,
            stride,
            count,
            data_type,
            normalized,
        }
    }

    #[test]
    fn strided_float_reads_skip_interleaved_bytes() {
        let mut bytes = Vec::new();
        for i in 0..3 {
            let v = [i as f32, i as f32 + 0.5, -(i as f32)];
            bytes.extend_from_slice(bytemuck::cast_slice(&v));
            bytes.extend_from_slice(&[0xAB; 8]);
        }
        let s = stream(&bytes, 20, 3, DataType::F32, false);
        assert_eq!(s.read::<3>(2), [2.0, 2.5, -2.0]);
        assert_eq!(s.read::<2>(1), [1.0, 1.5]);
    }

    #[test]
    fn normalized_bytes_decode_to_unit_range() {
        let bytes = [0x7Fu8, 0x81, 0x80, 0x00];
        let s = stream(&bytes, 4, 1, DataType::I8, true);
        assert_eq!(s.read::<4>(0), [1.0, -1.0, -1.0, 0.0]);

        let bytes = [0xFFu8, 0x00];
        let s = stream(&bytes, 2, 1, DataType::U8, true);
        assert_eq!(s.read::<2>(0), [1.0, 0.0]);
    }

    #[test]
    fn non_normalized_integers_are_rejected() {
        let bytes = [0u8; 4];
        let s = stream(&bytes, 4, 1, DataType::I8, false);
        assert!(matches!(
            s.check(AttributeSemantic::Normal, Dimensions::Vec3),
            Err(BakeError::UnsupportedAttribute { semantic: "NORMAL", .. })
        ));
        let s = stream(&bytes, 4, 1, DataType::I8, true);
        assert!(s.check(AttributeSemantic::Position, Dimensions::Vec3).is_err());
        assert!(s.check(AttributeSemantic::Tangent, Dimensions::Vec4).is_ok());
    }

    #[test]
    fn semantic_names() {
        let names: Vec<_> = AttributeSemantic::ALL.iter().map(|s| s.gltf_name()).collect();
        assert_eq!(names, ["POSITION", "NORMAL", "TANGENT", "TEXCOORD_0"]);
    }
}
