//! Scene data model and GPU-resident scene management
//!
//! Geometry lives in unified buffers addressed by offsets: a [`Mesh`] is a
//! run of consecutive [`RenderElement`]s, and each render element is a
//! sub-range of the shared vertex and index buffers.

mod camera;
mod camera_controller;
mod heightmap;
mod manager;

pub use camera::*;
pub use camera_controller::*;
pub use heightmap::*;
pub use manager::*;

pub use crate::backend::DrawIndexedIndirect;

use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use std::ops::Range;

/// One draw call's worth of geometry inside the unified buffers
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct RenderElement {
    /// First vertex, in vertices
    pub vertex_offset: u32,
    /// First index, in indices
    pub index_offset: u32,
    pub index_count: u32,
}

impl RenderElement {
    pub fn index_range(&self) -> Range<usize> {
        let start = self.index_offset as usize;
        start..start + self.index_count as usize
    }

    /// Indirect command drawing this element `instance_count` times
    pub fn draw_command(&self, instance_count: u32, first_instance: u32) -> DrawIndexedIndirect {
        DrawIndexedIndirect {
            index_count: self.index_count,
            instance_count,
            first_index: self.index_offset,
            base_vertex: self.vertex_offset as i32,
            first_instance,
        }
    }
}

/// A run of consecutive render elements
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct Mesh {
    pub first_relem: u32,
    pub relem_count: u32,
}

impl Mesh {
    pub fn relems(&self) -> Range<usize> {
        self.first_relem as usize..(self.first_relem + self.relem_count) as usize
    }
}

/// Local-space axis-aligned bounds of one render element.
///
/// Stored `max` first, each corner padded to 16 bytes to match the WGSL
/// `vec3<f32>` array layout.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct RenderElementBoundingBox {
    pub max_pos: [f32; 3],
    _pad0: f32,
    pub min_pos: [f32; 3],
    _pad1: f32,
}

const _: () = assert!(std::mem::size_of::<RenderElementBoundingBox>() == 32);

impl RenderElementBoundingBox {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self {
            max_pos: max.to_array(),
            _pad0: 0.0,
            min_pos: min.to_array(),
            _pad1: 0.0,
        }
    }

    /// Degenerate box around a single point
    pub fn from_point(p: Vec3) -> Self {
        Self::new(p, p)
    }

    pub fn extend(&mut self, p: Vec3) {
        *self = Self::new(self.min().min(p), self.max().max(p));
    }

    pub fn min(&self) -> Vec3 {
        Vec3::from_array(self.min_pos)
    }

    pub fn max(&self) -> Vec3 {
        Vec3::from_array(self.max_pos)
    }

    pub fn contains(&self, p: Vec3) -> bool {
        p.cmpge(self.min()).all() && p.cmple(self.max()).all()
    }

    pub fn corners(&self) -> [Vec3; 8] {
        let (lo, hi) = (self.min(), self.max());
        std::array::from_fn(|i| {
            Vec3::new(
                if i & 1 == 0 { lo.x } else { hi.x },
                if i & 2 == 0 { lo.y } else { hi.y },
                if i & 4 == 0 { lo.z } else { hi.z },
            )
        })
    }
}
