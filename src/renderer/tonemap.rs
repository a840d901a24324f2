//! Histogram auto-exposure
//!
//! Three compute passes over the HDR image:
//! 0. min/max luminance into `max_luminance` (as float bits, via atomics)
//! 1. 256-bin log-luminance histogram
//! 2. cumulative distribution, written back over the histogram
//!
//! The present pass then maps each pixel's luminance through the
//! distribution.

use crate::backend::*;

use super::targets::RenderTargets;

pub const HISTOGRAM_BINS: u64 = 256;
/// Pixels covered by one workgroup along each axis of passes 0 and 1
pub const TILE_SIZE: u32 = 32;
/// Float bits above every finite luminance; the starting point for the
/// atomic minimum
pub const MIN_LUMINANCE_SEED: u32 = 0x7FFF_FFFF;

#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct ResolutionPushConstants {
    res: [u32; 2],
}

pub fn workgroup_grid(width: u32, height: u32) -> (u32, u32) {
    (width.div_ceil(TILE_SIZE), height.div_ceil(TILE_SIZE))
}

pub struct TonemapPass {
    max_luminance: BufferHandle,
    histogram: BufferHandle,
    layouts: [BindGroupLayoutHandle; 3],
    pipelines: [ComputePipelineHandle; 3],
    bind_groups: Option<[BindGroupHandle; 3]>,
}

fn storage(binding: u32, read_only: bool) -> BindGroupLayoutEntry {
    BindGroupLayoutEntry {
        binding,
        visibility: ShaderStageFlags::COMPUTE,
        ty: BindingType::StorageBuffer { read_only },
    }
}

fn hdr_texture(binding: u32) -> BindGroupLayoutEntry {
    BindGroupLayoutEntry {
        binding,
        visibility: ShaderStageFlags::COMPUTE,
        ty: BindingType::Texture {
            sample_type: TextureSampleType::Float { filterable: false },
        },
    }
}

impl TonemapPass {
    pub fn new<B: GraphicsBackend>(backend: &mut B) -> BackendResult<Self> {
        let usage = BufferUsage::STORAGE | BufferUsage::COPY_DST;
        let max_luminance =
            backend.create_buffer(&BufferDescriptor::new("max_luminance", 2 * 4, usage))?;
        let histogram = backend.create_buffer(&BufferDescriptor::new(
            "luminance_histogram",
            HISTOGRAM_BINS * 4,
            usage,
        ))?;

        let layouts = [
            backend.create_bind_group_layout(&[hdr_texture(0), storage(1, false)])?,
            backend.create_bind_group_layout(&[hdr_texture(0), storage(1, true), storage(2, false)])?,
            backend.create_bind_group_layout(&[storage(0, true), storage(1, false)])?,
        ];

        let sources = [
            ("tonemap_min_max", TONEMAP_MIN_MAX_SHADER, true),
            ("tonemap_histogram", TONEMAP_HISTOGRAM_SHADER, true),
            ("tonemap_distribution", TONEMAP_DISTRIBUTION_SHADER, false),
        ];
        let mut pipelines = Vec::with_capacity(sources.len());
        for ((label, shader, uses_resolution), layout) in sources.into_iter().zip(layouts) {
            let push_constant_ranges = if uses_resolution {
                vec![PushConstantRange {
                    stages: ShaderStageFlags::COMPUTE,
                    range: 0..std::mem::size_of::<ResolutionPushConstants>() as u32,
                }]
            } else {
                Vec::new()
            };
            pipelines.push(backend.create_compute_pipeline(&ComputePipelineDescriptor {
                label: Some(label.into()),
                shader: [LUMINANCE_COMMON, shader].concat(),
                entry_point: "cs_main".into(),
                bind_group_layouts: vec![layout],
                push_constant_ranges,
            })?);
        }

        Ok(Self {
            max_luminance,
            histogram,
            layouts,
            pipelines: [pipelines[0], pipelines[1], pipelines[2]],
            bind_groups: None,
        })
    }

    pub fn max_luminance(&self) -> BufferHandle {
        self.max_luminance
    }

    pub fn histogram(&self) -> BufferHandle {
        self.histogram
    }

    /// Rebind to freshly allocated targets
    pub fn bind<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
        targets: &RenderTargets,
    ) -> BackendResult<()> {
        self.release_bind_groups(backend);
        let Some(hdr) = targets.hdr else {
            return Err(BackendError::InvalidCommand(
                "tonemapping needs an HDR target".into(),
            ));
        };
        let hdr = BindGroupEntry::Texture(hdr.view);
        let max_lum = BindGroupEntry::buffer(self.max_luminance);
        let hist = BindGroupEntry::buffer(self.histogram);

        let groups = [
            backend.create_bind_group(self.layouts[0], &[(0, hdr.clone()), (1, max_lum.clone())])?,
            backend.create_bind_group(
                self.layouts[1],
                &[(0, hdr), (1, max_lum.clone()), (2, hist.clone())],
            )?,
            backend.create_bind_group(self.layouts[2], &[(0, max_lum), (1, hist)])?,
        ];
        self.bind_groups = Some(groups);
        Ok(())
    }

    fn release_bind_groups<B: GraphicsBackend>(&mut self, backend: &mut B) {
        if let Some(groups) = self.bind_groups.take() {
            for group in groups {
                backend.destroy_bind_group(group);
            }
        }
    }

    /// Reset both buffers and run the three passes. Must be recorded
    /// between render passes.
    pub fn record<B: GraphicsBackend>(
        &self,
        backend: &mut B,
        width: u32,
        height: u32,
    ) -> BackendResult<()> {
        let Some(groups) = self.bind_groups else {
            return Err(BackendError::InvalidCommand(
                "tonemapping recorded before targets were bound".into(),
            ));
        };
        let (max_lum, hist) = (self.max_luminance, self.histogram);
        let barrier = BufferBarrier::whole;
        let transfer_write = (PipelineStages::TRANSFER, AccessFlags::TRANSFER_WRITE);
        let compute_read = (PipelineStages::COMPUTE_SHADER, AccessFlags::SHADER_READ);
        let compute_write = (PipelineStages::COMPUTE_SHADER, AccessFlags::SHADER_WRITE);
        let fragment_read = (PipelineStages::FRAGMENT_SHADER, AccessFlags::SHADER_READ);

        backend.buffer_barriers(&[
            barrier(max_lum, fragment_read, transfer_write),
            barrier(hist, fragment_read, transfer_write),
        ])?;
        backend.fill_buffer(max_lum, 0, 2 * 4, 0)?;
        backend.fill_buffer(hist, 0, HISTOGRAM_BINS * 4, 0)?;
        backend.buffer_barriers(&[barrier(max_lum, transfer_write, transfer_write)])?;
        backend.fill_buffer(max_lum, 0, 4, MIN_LUMINANCE_SEED)?;
        backend.buffer_barriers(&[
            barrier(max_lum, transfer_write, compute_read),
            barrier(hist, transfer_write, compute_read),
        ])?;
        backend.buffer_barriers(&[barrier(max_lum, compute_read, compute_write)])?;

        let (groups_x, groups_y) = workgroup_grid(width, height);
        let res = ResolutionPushConstants { res: [width, height] };

        self.dispatch(backend, 0, groups[0], Some(&res), (groups_x, groups_y));
        backend.buffer_barriers(&[
            barrier(max_lum, compute_write, compute_read),
            barrier(hist, compute_read, compute_write),
        ])?;

        self.dispatch(backend, 1, groups[1], Some(&res), (groups_x, groups_y));
        backend.buffer_barriers(&[barrier(hist, compute_write, compute_write)])?;

        self.dispatch(backend, 2, groups[2], None, (1, 1));
        backend.buffer_barriers(&[
            barrier(max_lum, compute_read, fragment_read),
            barrier(hist, compute_write, fragment_read),
        ])?;
        Ok(())
    }

    fn dispatch<B: GraphicsBackend>(
        &self,
        backend: &mut B,
        index: usize,
        group: BindGroupHandle,
        res: Option<&ResolutionPushConstants>,
        (x, y): (u32, u32),
    ) {
        backend.begin_compute_pass(Some("tonemap"));
        backend.set_compute_pipeline(self.pipelines[index]);
        backend.set_bind_group(0, group);
        if let Some(res) = res {
            backend.set_push_constants(ShaderStageFlags::COMPUTE, 0, bytemuck::bytes_of(res));
        }
        backend.dispatch_compute(x, y, 1);
        backend.end_compute_pass();
    }

    pub fn destroy<B: GraphicsBackend>(mut self, backend: &mut B) {
        self.release_bind_groups(backend);
        backend.destroy_buffer(self.max_luminance);
        backend.destroy_buffer(self.histogram);
    }
}

/// Luminance helpers shared by every tonemapping stage
pub const LUMINANCE_COMMON: &str = r#"
const BINS: u32 = 256u;

fn luminance(c: vec3<f32>) -> f32 {
    return max(dot(c, vec3<f32>(0.2126, 0.7152, 0.0722)), 0.0);
}

fn log_lum(l: f32) -> f32 {
    return log2(l + 1e-4);
}

// Histogram bin of a luminance inside [min_lum, max_lum]
fn lum_bin(l: f32, min_lum: f32, max_lum: f32) -> u32 {
    let lo = log_lum(min_lum);
    let range = max(log_lum(max_lum) - lo, 1e-4);
    let t = clamp((log_lum(l) - lo) / range, 0.0, 1.0);
    return min(u32(t * f32(BINS)), BINS - 1u);
}
"#;

pub const TONEMAP_MIN_MAX_SHADER: &str = r#"
struct Params {
    res: vec2<u32>,
}

var<push_constant> params: Params;

@group(0) @binding(0) var hdr_image: texture_2d<f32>;
// [0] = min, [1] = max, as float bits; non-negative floats order like u32
@group(0) @binding(1) var<storage, read_write> max_luminance: array<atomic<u32>, 2>;

// 16x16 threads, 2x2 pixels each, cover a 32x32 tile
@compute @workgroup_size(16, 16)
fn cs_main(@builtin(global_invocation_id) gid: vec3<u32>) {
    var lo = 3.4e38;
    var hi = 0.0;
    for (var i = 0u; i < 4u; i = i + 1u) {
        let pixel = gid.xy * 2u + vec2<u32>(i & 1u, i >> 1u);
        if pixel.x < params.res.x && pixel.y < params.res.y {
            let l = luminance(textureLoad(hdr_image, vec2<i32>(pixel), 0).rgb);
            lo = min(lo, l);
            hi = max(hi, l);
        }
    }
    if hi >= lo {
        atomicMin(&max_luminance[0], bitcast<u32>(lo));
        atomicMax(&max_luminance[1], bitcast<u32>(hi));
    }
}
"#;

pub const TONEMAP_HISTOGRAM_SHADER: &str = r#"
struct Params {
    res: vec2<u32>,
}

var<push_constant> params: Params;

@group(0) @binding(0) var hdr_image: texture_2d<f32>;
@group(0) @binding(1) var<storage, read> max_luminance: array<u32, 2>;
@group(0) @binding(2) var<storage, read_write> histogram: array<atomic<u32>, 256>;

@compute @workgroup_size(16, 16)
fn cs_main(@builtin(global_invocation_id) gid: vec3<u32>) {
    let min_lum = bitcast<f32>(max_luminance[0]);
    let max_lum = bitcast<f32>(max_luminance[1]);
    for (var i = 0u; i < 4u; i = i + 1u) {
        let pixel = gid.xy * 2u + vec2<u32>(i & 1u, i >> 1u);
        if pixel.x < params.res.x && pixel.y < params.res.y {
            let l = luminance(textureLoad(hdr_image, vec2<i32>(pixel), 0).rgb);
            atomicAdd(&histogram[lum_bin(l, min_lum, max_lum)], 1u);
        }
    }
}
"#;

pub const TONEMAP_DISTRIBUTION_SHADER: &str = r#"
@group(0) @binding(0) var<storage, read> max_luminance: array<u32, 2>;
// Pixel counts in, cumulative distribution (as float bits) out
@group(0) @binding(1) var<storage, read_write> histogram: array<u32, 256>;

@compute @workgroup_size(1)
fn cs_main() {
    var total = 0u;
    for (var i = 0u; i < 256u; i = i + 1u) {
        total = total + histogram[i];
    }
    let scale = 1.0 / f32(max(total, 1u));
    var running = 0u;
    for (var i = 0u; i < 256u; i = i + 1u) {
        running = running + histogram[i];
        histogram[i] = bitcast<u32>(f32(running) * scale);
    }
}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_rounds_up_to_tiles() {
        assert_eq!(workgroup_grid(1280, 720), (40, 23));
        assert_eq!(workgroup_grid(32, 32), (1, 1));
        assert_eq!(workgroup_grid(33, 1), (2, 1));
    }

    #[test]
    fn shaders_agree_on_bin_count() {
        assert!(TONEMAP_HISTOGRAM_SHADER.contains(&format!("array<atomic<u32>, {HISTOGRAM_BINS}>")));
        assert!(TONEMAP_DISTRIBUTION_SHADER.contains(&format!("array<u32, {HISTOGRAM_BINS}>")));
    }

    #[test]
    fn min_seed_orders_above_finite_luminance() {
        assert!(MIN_LUMINANCE_SEED > f32::MAX.to_bits());
        assert!(MIN_LUMINANCE_SEED > f32::INFINITY.to_bits());
    }
}
