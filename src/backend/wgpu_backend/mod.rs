//! wgpu backend implementation
//!
//! Commands are buffered per pass and replayed into a single frame encoder
//! when the pass ends, so everything recorded in a frame lands on one queue
//! submission in recording order.

use crate::backend::traits::*;
use crate::backend::types::*;
use std::collections::HashMap;
use std::ops::Range;
use std::sync::Arc;
use wgpu::util::DeviceExt;

/// Features the GPU-driven path cannot run without
const REQUIRED_FEATURES: wgpu::Features = wgpu::Features::PUSH_CONSTANTS
    .union(wgpu::Features::MULTI_DRAW_INDIRECT)
    .union(wgpu::Features::INDIRECT_FIRST_INSTANCE);

/// Buffered render pass command
#[derive(Clone)]
enum RenderCommand {
    SetPipeline(RenderPipelineHandle),
    SetBindGroup { index: u32, bind_group: BindGroupHandle },
    SetPushConstants { stages: ShaderStageFlags, offset: u32, data: Vec<u8> },
    SetVertexBuffer { slot: u32, buffer: BufferHandle, offset: u64 },
    SetIndexBuffer { buffer: BufferHandle, offset: u64, format: IndexFormat },
    SetViewport { x: f32, y: f32, width: f32, height: f32, min_depth: f32, max_depth: f32 },
    Draw { vertices: Range<u32>, instances: Range<u32> },
    DrawIndexed { indices: Range<u32>, base_vertex: i32, instances: Range<u32> },
    DrawIndexedIndirect { buffer: BufferHandle, offset: u64, count: u32 },
}

/// Buffered compute pass command
#[derive(Clone)]
enum ComputeCommand {
    SetPipeline(ComputePipelineHandle),
    SetBindGroup { index: u32, bind_group: BindGroupHandle },
    SetPushConstants { offset: u32, data: Vec<u8> },
    Dispatch { x: u32, y: u32, z: u32 },
}

/// Pending render pass with buffered commands
struct PendingRenderPass {
    descriptor: RenderPassDescriptor,
    commands: Vec<RenderCommand>,
}

/// Pending compute pass with buffered commands
struct PendingComputePass {
    label: Option<String>,
    commands: Vec<ComputeCommand>,
}

/// A buffer together with the usage it was created for
struct BufferEntry {
    buffer: wgpu::Buffer,
    usage: BufferUsage,
}

/// wgpu backend implementation
pub struct WgpuBackend {
    #[allow(dead_code)]
    instance: wgpu::Instance,
    surface: wgpu::Surface<'static>,
    #[allow(dead_code)]
    adapter: wgpu::Adapter,
    device: wgpu::Device,
    queue: wgpu::Queue,
    surface_config: wgpu::SurfaceConfiguration,
    current_texture: Option<wgpu::SurfaceTexture>,
    current_view_id: u64, // ID used to identify the swapchain view handle

    // Resource storage
    buffers: HashMap<u64, BufferEntry>,
    textures: HashMap<u64, wgpu::Texture>,
    texture_views: HashMap<u64, wgpu::TextureView>,
    samplers: HashMap<u64, wgpu::Sampler>,
    bind_group_layouts: HashMap<u64, wgpu::BindGroupLayout>,
    bind_groups: HashMap<u64, wgpu::BindGroup>,
    render_pipelines: HashMap<u64, wgpu::RenderPipeline>,
    compute_pipelines: HashMap<u64, wgpu::ComputePipeline>,

    // Source buffers for non-zero fills, keyed by (pattern, size)
    fill_patterns: HashMap<(u32, u64), wgpu::Buffer>,

    // Handle counters
    next_buffer_id: u64,
    next_texture_id: u64,
    next_view_id: u64,
    next_sampler_id: u64,
    next_layout_id: u64,
    next_bind_group_id: u64,
    next_render_pipeline_id: u64,
    next_compute_pipeline_id: u64,

    // Command encoding
    encoder: Option<wgpu::CommandEncoder>,

    // Pending passes - commands are buffered here and executed on end_*_pass
    pending_render_pass: Option<PendingRenderPass>,
    pending_compute_pass: Option<PendingComputePass>,
}

impl WgpuBackend {
    fn convert_texture_format(format: TextureFormat) -> wgpu::TextureFormat {
        match format {
            TextureFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
            TextureFormat::Rgba8UnormSrgb => wgpu::TextureFormat::Rgba8UnormSrgb,
            TextureFormat::Bgra8Unorm => wgpu::TextureFormat::Bgra8Unorm,
            TextureFormat::Bgra8UnormSrgb => wgpu::TextureFormat::Bgra8UnormSrgb,
            TextureFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
            TextureFormat::Depth32Float => wgpu::TextureFormat::Depth32Float,
            TextureFormat::R32Float => wgpu::TextureFormat::R32Float,
        }
    }

    fn convert_texture_format_back(format: wgpu::TextureFormat) -> TextureFormat {
        match format {
            wgpu::TextureFormat::Rgba8Unorm => TextureFormat::Rgba8Unorm,
            wgpu::TextureFormat::Rgba8UnormSrgb => TextureFormat::Rgba8UnormSrgb,
            wgpu::TextureFormat::Bgra8Unorm => TextureFormat::Bgra8Unorm,
            wgpu::TextureFormat::Bgra8UnormSrgb => TextureFormat::Bgra8UnormSrgb,
            wgpu::TextureFormat::Rgba16Float => TextureFormat::Rgba16Float,
            wgpu::TextureFormat::Depth32Float => TextureFormat::Depth32Float,
            wgpu::TextureFormat::R32Float => TextureFormat::R32Float,
            _ => TextureFormat::Bgra8UnormSrgb,
        }
    }

    fn convert_buffer_usage(usage: BufferUsage) -> wgpu::BufferUsages {
        let mapping = [
            (BufferUsage::MAP_READ, wgpu::BufferUsages::MAP_READ),
            (BufferUsage::MAP_WRITE, wgpu::BufferUsages::MAP_WRITE),
            (BufferUsage::COPY_SRC, wgpu::BufferUsages::COPY_SRC),
            (BufferUsage::COPY_DST, wgpu::BufferUsages::COPY_DST),
            (BufferUsage::INDEX, wgpu::BufferUsages::INDEX),
            (BufferUsage::VERTEX, wgpu::BufferUsages::VERTEX),
            (BufferUsage::UNIFORM, wgpu::BufferUsages::UNIFORM),
            (BufferUsage::STORAGE, wgpu::BufferUsages::STORAGE),
            (BufferUsage::INDIRECT, wgpu::BufferUsages::INDIRECT),
        ];
        mapping
            .into_iter()
            .filter(|(ours, _)| usage.contains(*ours))
            .fold(wgpu::BufferUsages::empty(), |acc, (_, theirs)| acc | theirs)
    }

    fn convert_texture_usage(usage: TextureUsage) -> wgpu::TextureUsages {
        let mut result = wgpu::TextureUsages::empty();
        if usage.contains(TextureUsage::COPY_SRC) {
            result |= wgpu::TextureUsages::COPY_SRC;
        }
        if usage.contains(TextureUsage::COPY_DST) {
            result |= wgpu::TextureUsages::COPY_DST;
        }
        if usage.contains(TextureUsage::TEXTURE_BINDING) {
            result |= wgpu::TextureUsages::TEXTURE_BINDING;
        }
        if usage.contains(TextureUsage::STORAGE_BINDING) {
            result |= wgpu::TextureUsages::STORAGE_BINDING;
        }
        if usage.contains(TextureUsage::RENDER_ATTACHMENT) {
            result |= wgpu::TextureUsages::RENDER_ATTACHMENT;
        }
        result
    }

    fn convert_shader_stages(stages: ShaderStageFlags) -> wgpu::ShaderStages {
        let mut visibility = wgpu::ShaderStages::empty();
        if stages.contains(ShaderStageFlags::VERTEX) {
            visibility |= wgpu::ShaderStages::VERTEX;
        }
        if stages.contains(ShaderStageFlags::FRAGMENT) {
            visibility |= wgpu::ShaderStages::FRAGMENT;
        }
        if stages.contains(ShaderStageFlags::COMPUTE) {
            visibility |= wgpu::ShaderStages::COMPUTE;
        }
        visibility
    }

    fn convert_vertex_format(format: VertexFormat) -> wgpu::VertexFormat {
        match format {
            VertexFormat::Float32x2 => wgpu::VertexFormat::Float32x2,
            VertexFormat::Float32x3 => wgpu::VertexFormat::Float32x3,
            VertexFormat::Uint32 => wgpu::VertexFormat::Uint32,
        }
    }

    fn convert_compare_function(func: CompareFunction) -> wgpu::CompareFunction {
        match func {
            CompareFunction::Less => wgpu::CompareFunction::Less,
            CompareFunction::LessEqual => wgpu::CompareFunction::LessEqual,
            CompareFunction::Always => wgpu::CompareFunction::Always,
        }
    }

    fn convert_filter_mode(mode: FilterMode) -> wgpu::FilterMode {
        match mode {
            FilterMode::Nearest => wgpu::FilterMode::Nearest,
            FilterMode::Linear => wgpu::FilterMode::Linear,
        }
    }

    fn convert_address_mode(mode: AddressMode) -> wgpu::AddressMode {
        match mode {
            AddressMode::ClampToEdge => wgpu::AddressMode::ClampToEdge,
            AddressMode::Repeat => wgpu::AddressMode::Repeat,
        }
    }

    fn convert_push_constant_ranges(ranges: &[PushConstantRange]) -> Vec<wgpu::PushConstantRange> {
        ranges
            .iter()
            .map(|r| wgpu::PushConstantRange {
                stages: Self::convert_shader_stages(r.stages),
                range: r.range.clone(),
            })
            .collect()
    }

    fn convert_load_op<V>(op: &LoadOp, clear: impl FnOnce(&[f32; 4]) -> V) -> wgpu::LoadOp<V> {
        match op {
            LoadOp::Clear(color) => wgpu::LoadOp::Clear(clear(color)),
            LoadOp::Load => wgpu::LoadOp::Load,
        }
    }

    fn convert_store_op(op: StoreOp) -> wgpu::StoreOp {
        match op {
            StoreOp::Store => wgpu::StoreOp::Store,
            StoreOp::Discard => wgpu::StoreOp::Discard,
        }
    }

    /// Clamp to device limits while maintaining aspect ratio
    fn clamp_surface_size(&self, width: u32, height: u32) -> (u32, u32) {
        let max_size = self.device.limits().max_texture_dimension_2d;
        if width > max_size || height > max_size {
            let scale = (max_size as f32 / width as f32).min(max_size as f32 / height as f32);
            (
                ((width as f32 * scale) as u32).max(1),
                ((height as f32 * scale) as u32).max(1),
            )
        } else {
            (width.max(1), height.max(1))
        }
    }

    fn buffer(&self, handle: BufferHandle) -> BackendResult<&BufferEntry> {
        self.buffers.get(&handle.0).ok_or(BackendError::UnknownHandle {
            kind: "buffer",
            id: handle.0,
        })
    }

    fn ensure_outside_pass(&self, what: &str) -> BackendResult<()> {
        if self.pending_render_pass.is_some() || self.pending_compute_pass.is_some() {
            return Err(BackendError::InvalidCommand(format!(
                "{what} must be recorded between passes"
            )));
        }
        Ok(())
    }

    /// Run `create` inside a validation error scope and turn a captured
    /// error into `wrap(message)`.
    fn scoped<T>(
        &self,
        create: impl FnOnce(&wgpu::Device) -> T,
        wrap: fn(String) -> BackendError,
    ) -> BackendResult<T> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = create(&self.device);
        match pollster::block_on(self.device.pop_error_scope()) {
            Some(err) => Err(wrap(err.to_string())),
            None => Ok(value),
        }
    }
}

impl WgpuBackend {
    /// Create the backend for a window, blocking on adapter and device requests
    pub fn new(window: Arc<winit::window::Window>, vsync: bool) -> BackendResult<Self> {
        pollster::block_on(Self::new_async(window, vsync))
    }

    pub async fn new_async(window: Arc<winit::window::Window>, vsync: bool) -> BackendResult<Self> {
        let (instance, surface, adapter, device, queue) = Self::init_native(window.clone()).await?;

        let size = window.inner_size();
        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first().copied())
            .ok_or_else(|| {
                BackendError::SurfaceCreationFailed("Surface reports no formats".into())
            })?;

        let present_mode = if vsync {
            wgpu::PresentMode::AutoVsync
        } else {
            wgpu::PresentMode::AutoNoVsync
        };

        let surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode,
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };

        let mut backend = Self {
            instance,
            surface,
            adapter,
            device,
            queue,
            surface_config,
            current_texture: None,
            current_view_id: 0,
            buffers: HashMap::new(),
            textures: HashMap::new(),
            texture_views: HashMap::new(),
            samplers: HashMap::new(),
            bind_group_layouts: HashMap::new(),
            bind_groups: HashMap::new(),
            render_pipelines: HashMap::new(),
            compute_pipelines: HashMap::new(),
            fill_patterns: HashMap::new(),
            next_buffer_id: 1,
            next_texture_id: 1,
            next_view_id: 1,
            next_sampler_id: 1,
            next_layout_id: 1,
            next_bind_group_id: 1,
            next_render_pipeline_id: 1,
            next_compute_pipeline_id: 1,
            encoder: None,
            pending_render_pass: None,
            pending_compute_pass: None,
        };

        let (width, height) = backend.clamp_surface_size(size.width, size.height);
        backend.surface_config.width = width;
        backend.surface_config.height = height;
        backend.surface.configure(&backend.device, &backend.surface_config);

        Ok(backend)
    }

    async fn init_native(
        window: Arc<winit::window::Window>,
    ) -> BackendResult<(
        wgpu::Instance,
        wgpu::Surface<'static>,
        wgpu::Adapter,
        wgpu::Device,
        wgpu::Queue,
    )> {
        let backends = wgpu::util::backend_bits_from_env().unwrap_or(wgpu::Backends::PRIMARY);

        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends,
            ..Default::default()
        });

        let surface = instance
            .create_surface(window.clone())
            .map_err(|e| BackendError::SurfaceCreationFailed(e.to_string()))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| BackendError::InitializationFailed("No suitable adapter found".into()))?;

        let adapter_info = adapter.get_info();
        log::info!(
            "Selected GPU: {} ({:?} backend)",
            adapter_info.name,
            adapter_info.backend
        );

        let missing = REQUIRED_FEATURES - adapter.features();
        if !missing.is_empty() {
            return Err(BackendError::InitializationFailed(format!(
                "Adapter lacks required features: {missing:?}"
            )));
        }

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Renderer Device"),
                    required_features: REQUIRED_FEATURES,
                    required_limits: wgpu::Limits {
                        max_push_constant_size: MAX_PUSH_CONSTANT_SIZE,
                        ..wgpu::Limits::default()
                    },
                },
                None,
            )
            .await
            .map_err(|e| BackendError::DeviceCreationFailed(e.to_string()))?;

        Ok((instance, surface, adapter, device, queue))
    }

    fn color_attachments<'a>(
        &'a self,
        desc: &RenderPassDescriptor,
        swapchain_view: Option<&'a wgpu::TextureView>,
    ) -> Vec<Option<wgpu::RenderPassColorAttachment<'a>>> {
        desc.color_attachments
            .iter()
            .filter_map(|att| {
                let view = if att.view.0 == self.current_view_id {
                    swapchain_view?
                } else {
                    self.texture_views.get(&att.view.0)?
                };
                Some(Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: Self::convert_load_op(&att.load_op, |c| wgpu::Color {
                            r: c[0] as f64,
                            g: c[1] as f64,
                            b: c[2] as f64,
                            a: c[3] as f64,
                        }),
                        store: Self::convert_store_op(att.store_op),
                    },
                }))
            })
            .collect()
    }

    fn depth_attachment<'a>(
        &'a self,
        desc: &RenderPassDescriptor,
    ) -> Option<wgpu::RenderPassDepthStencilAttachment<'a>> {
        desc.depth_stencil_attachment.as_ref().and_then(|att| {
            let view = self.texture_views.get(&att.view.0)?;
            let clear_value = att.depth_clear_value;
            Some(wgpu::RenderPassDepthStencilAttachment {
                view,
                depth_ops: Some(wgpu::Operations {
                    load: Self::convert_load_op(&att.depth_load_op, |_| clear_value),
                    store: Self::convert_store_op(att.depth_store_op),
                }),
                stencil_ops: None,
            })
        })
    }

    /// Source buffer holding `size` bytes of a repeated 32-bit pattern
    fn fill_pattern_buffer(&mut self, value: u32, size: u64) -> &wgpu::Buffer {
        let device = &self.device;
        self.fill_patterns.entry((value, size)).or_insert_with(|| {
            let words = vec![value; (size / 4) as usize];
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Fill Pattern"),
                contents: bytemuck::cast_slice(&words),
                usage: wgpu::BufferUsages::COPY_SRC,
            })
        })
    }
}

impl GraphicsBackend for WgpuBackend {
    fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            let (clamped_width, clamped_height) = self.clamp_surface_size(width, height);
            self.surface_config.width = clamped_width;
            self.surface_config.height = clamped_height;
            self.surface.configure(&self.device, &self.surface_config);
        }
    }

    fn surface_size(&self) -> (u32, u32) {
        (self.surface_config.width, self.surface_config.height)
    }

    fn begin_frame(&mut self) -> BackendResult<Option<FrameContext>> {
        let output = match self.surface.get_current_texture() {
            Ok(output) => output,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                log::debug!("Surface lost or outdated, reconfiguring and skipping frame");
                self.surface.configure(&self.device, &self.surface_config);
                return Ok(None);
            }
            Err(wgpu::SurfaceError::Timeout) => {
                log::debug!("Surface acquire timed out, skipping frame");
                return Ok(None);
            }
            Err(wgpu::SurfaceError::OutOfMemory) => return Err(BackendError::OutOfMemory),
        };

        // The swapchain view is created on demand when a pass targets it
        let view_id = self.next_view_id;
        self.next_view_id += 1;
        self.current_view_id = view_id;

        self.current_texture = Some(output);
        self.encoder = Some(
            self.device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("Frame Encoder"),
                }),
        );

        Ok(Some(FrameContext {
            swapchain_view: TextureViewHandle(view_id),
            width: self.surface_config.width,
            height: self.surface_config.height,
        }))
    }

    fn end_frame(&mut self) -> BackendResult<()> {
        self.ensure_outside_pass("end_frame")?;

        if let Some(encoder) = self.encoder.take() {
            self.queue.submit(std::iter::once(encoder.finish()));
        }

        if let Some(texture) = self.current_texture.take() {
            texture.present();
        }

        Ok(())
    }

    fn swapchain_format(&self) -> TextureFormat {
        Self::convert_texture_format_back(self.surface_config.format)
    }

    fn wait_idle(&mut self) {
        let _ = self.device.poll(wgpu::Maintain::Wait);
    }

    fn create_buffer(&mut self, desc: &BufferDescriptor) -> BackendResult<BufferHandle> {
        let buffer = self.scoped(
            |device| {
                device.create_buffer(&wgpu::BufferDescriptor {
                    label: desc.label.as_deref(),
                    size: desc.size,
                    usage: Self::convert_buffer_usage(desc.usage),
                    mapped_at_creation: desc.mapped_at_creation,
                })
            },
            BackendError::BufferCreationFailed,
        )?;

        let id = self.next_buffer_id;
        self.next_buffer_id += 1;
        self.buffers.insert(id, BufferEntry { buffer, usage: desc.usage });

        Ok(BufferHandle(id))
    }

    fn create_buffer_init(
        &mut self,
        desc: &BufferDescriptor,
        data: &[u8],
    ) -> BackendResult<BufferHandle> {
        let buffer = self.scoped(
            |device| {
                device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: desc.label.as_deref(),
                    contents: data,
                    usage: Self::convert_buffer_usage(desc.usage),
                })
            },
            BackendError::BufferCreationFailed,
        )?;

        let id = self.next_buffer_id;
        self.next_buffer_id += 1;
        self.buffers.insert(id, BufferEntry { buffer, usage: desc.usage });

        Ok(BufferHandle(id))
    }

    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) {
        if let Some(entry) = self.buffers.get(&buffer.0) {
            self.queue.write_buffer(&entry.buffer, offset, data);
        }
    }

    fn create_texture(&mut self, desc: &TextureDescriptor) -> BackendResult<TextureHandle> {
        let texture = self.scoped(
            |device| {
                device.create_texture(&wgpu::TextureDescriptor {
                    label: desc.label.as_deref(),
                    size: wgpu::Extent3d {
                        width: desc.width,
                        height: desc.height,
                        depth_or_array_layers: desc.depth,
                    },
                    mip_level_count: desc.mip_levels,
                    sample_count: 1,
                    dimension: if desc.depth > 1 {
                        wgpu::TextureDimension::D3
                    } else {
                        wgpu::TextureDimension::D2
                    },
                    format: Self::convert_texture_format(desc.format),
                    usage: Self::convert_texture_usage(desc.usage),
                    view_formats: &[],
                })
            },
            BackendError::TextureCreationFailed,
        )?;

        let id = self.next_texture_id;
        self.next_texture_id += 1;
        self.textures.insert(id, texture);

        Ok(TextureHandle(id))
    }

    fn create_texture_view(&mut self, texture: TextureHandle) -> BackendResult<TextureViewHandle> {
        let tex = self
            .textures
            .get(&texture.0)
            .ok_or_else(|| BackendError::TextureCreationFailed("Texture not found".into()))?;

        let view = tex.create_view(&wgpu::TextureViewDescriptor::default());

        let id = self.next_view_id;
        self.next_view_id += 1;
        self.texture_views.insert(id, view);

        Ok(TextureViewHandle(id))
    }

    fn write_texture(&mut self, texture: TextureHandle, data: &[u8], width: u32, height: u32) {
        if let Some(tex) = self.textures.get(&texture.0) {
            let texel_size = tex.format().block_copy_size(None).unwrap_or(4);
            self.queue.write_texture(
                wgpu::ImageCopyTexture {
                    texture: tex,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                data,
                wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(width * texel_size),
                    rows_per_image: Some(height),
                },
                wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
            );
        }
    }

    fn create_sampler(&mut self, desc: &SamplerDescriptor) -> BackendResult<SamplerHandle> {
        let sampler = self.device.create_sampler(&wgpu::SamplerDescriptor {
            label: desc.label.as_deref(),
            address_mode_u: Self::convert_address_mode(desc.address_mode_u),
            address_mode_v: Self::convert_address_mode(desc.address_mode_v),
            address_mode_w: Self::convert_address_mode(desc.address_mode_w),
            mag_filter: Self::convert_filter_mode(desc.mag_filter),
            min_filter: Self::convert_filter_mode(desc.min_filter),
            mipmap_filter: Self::convert_filter_mode(desc.mipmap_filter),
            lod_min_clamp: 0.0,
            lod_max_clamp: f32::MAX,
            compare: desc.compare.map(Self::convert_compare_function),
            anisotropy_clamp: 1,
            border_color: None,
        });

        let id = self.next_sampler_id;
        self.next_sampler_id += 1;
        self.samplers.insert(id, sampler);

        Ok(SamplerHandle(id))
    }

    fn create_bind_group_layout(
        &mut self,
        entries: &[BindGroupLayoutEntry],
    ) -> BackendResult<BindGroupLayoutHandle> {
        let wgpu_entries: Vec<wgpu::BindGroupLayoutEntry> = entries
            .iter()
            .map(|e| {
                let ty = match &e.ty {
                    BindingType::UniformBuffer => wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    BindingType::StorageBuffer { read_only } => wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage {
                            read_only: *read_only,
                        },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    BindingType::Texture { sample_type } => wgpu::BindingType::Texture {
                        sample_type: match sample_type {
                            TextureSampleType::Float { filterable } => {
                                wgpu::TextureSampleType::Float { filterable: *filterable }
                            }
                            TextureSampleType::Depth => wgpu::TextureSampleType::Depth,
                            TextureSampleType::Sint => wgpu::TextureSampleType::Sint,
                            TextureSampleType::Uint => wgpu::TextureSampleType::Uint,
                        },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    BindingType::Sampler(kind) => wgpu::BindingType::Sampler(match kind {
                        SamplerBindingType::Filtering => wgpu::SamplerBindingType::Filtering,
                        SamplerBindingType::NonFiltering => wgpu::SamplerBindingType::NonFiltering,
                        SamplerBindingType::Comparison => wgpu::SamplerBindingType::Comparison,
                    }),
                };

                wgpu::BindGroupLayoutEntry {
                    binding: e.binding,
                    visibility: Self::convert_shader_stages(e.visibility),
                    ty,
                    count: None,
                }
            })
            .collect();

        let layout = self.scoped(
            |device| {
                device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: None,
                    entries: &wgpu_entries,
                })
            },
            BackendError::PipelineCreationFailed,
        )?;

        let id = self.next_layout_id;
        self.next_layout_id += 1;
        self.bind_group_layouts.insert(id, layout);

        Ok(BindGroupLayoutHandle(id))
    }

    fn create_bind_group(
        &mut self,
        layout: BindGroupLayoutHandle,
        entries: &[(u32, BindGroupEntry)],
    ) -> BackendResult<BindGroupHandle> {
        let layout_ref = self
            .bind_group_layouts
            .get(&layout.0)
            .ok_or_else(|| BackendError::PipelineCreationFailed("Layout not found".into()))?;

        let mut wgpu_entries: Vec<wgpu::BindGroupEntry> = Vec::with_capacity(entries.len());
        for (binding, entry) in entries {
            let resource = match entry {
                BindGroupEntry::Buffer { buffer, offset, size } => {
                    wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                        buffer: &self.buffer(*buffer)?.buffer,
                        offset: *offset,
                        size: size.and_then(std::num::NonZeroU64::new),
                    })
                }
                BindGroupEntry::Texture(view) => wgpu::BindingResource::TextureView(
                    self.texture_views.get(&view.0).ok_or(BackendError::UnknownHandle {
                        kind: "texture view",
                        id: view.0,
                    })?,
                ),
                BindGroupEntry::Sampler(sampler) => wgpu::BindingResource::Sampler(
                    self.samplers.get(&sampler.0).ok_or(BackendError::UnknownHandle {
                        kind: "sampler",
                        id: sampler.0,
                    })?,
                ),
            };
            wgpu_entries.push(wgpu::BindGroupEntry {
                binding: *binding,
                resource,
            });
        }

        let bind_group = self.scoped(
            |device| {
                device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: None,
                    layout: layout_ref,
                    entries: &wgpu_entries,
                })
            },
            BackendError::PipelineCreationFailed,
        )?;

        let id = self.next_bind_group_id;
        self.next_bind_group_id += 1;
        self.bind_groups.insert(id, bind_group);

        Ok(BindGroupHandle(id))
    }

    fn create_render_pipeline(
        &mut self,
        desc: &RenderPipelineDescriptor,
    ) -> BackendResult<RenderPipelineHandle> {
        let shader = self.scoped(
            |device| {
                device.create_shader_module(wgpu::ShaderModuleDescriptor {
                    label: desc.label.as_deref(),
                    source: wgpu::ShaderSource::Wgsl(desc.shader.as_str().into()),
                })
            },
            BackendError::ShaderCreationFailed,
        )?;

        let layouts: Vec<&wgpu::BindGroupLayout> = desc
            .bind_group_layouts
            .iter()
            .filter_map(|h| self.bind_group_layouts.get(&h.0))
            .collect();
        let push_constant_ranges = Self::convert_push_constant_ranges(&desc.push_constant_ranges);

        // Build vertex buffer layouts with proper lifetimes
        let vertex_attrs: Vec<Vec<wgpu::VertexAttribute>> = desc
            .vertex_layouts
            .iter()
            .map(|layout| {
                layout
                    .attributes
                    .iter()
                    .map(|a| wgpu::VertexAttribute {
                        format: Self::convert_vertex_format(a.format),
                        offset: a.offset,
                        shader_location: a.location,
                    })
                    .collect()
            })
            .collect();

        let vertex_buffers: Vec<wgpu::VertexBufferLayout> = desc
            .vertex_layouts
            .iter()
            .zip(vertex_attrs.iter())
            .map(|(layout, attrs)| wgpu::VertexBufferLayout {
                array_stride: layout.array_stride,
                step_mode: match layout.step_mode {
                    VertexStepMode::Vertex => wgpu::VertexStepMode::Vertex,
                    VertexStepMode::Instance => wgpu::VertexStepMode::Instance,
                },
                attributes: attrs,
            })
            .collect();

        let color_targets: Vec<Option<wgpu::ColorTargetState>> = desc
            .color_targets
            .iter()
            .map(|target| {
                Some(wgpu::ColorTargetState {
                    format: Self::convert_texture_format(target.format),
                    blend: None,
                    write_mask: wgpu::ColorWrites::from_bits_truncate(target.write_mask.bits()),
                })
            })
            .collect();

        let primitive = wgpu::PrimitiveState {
            topology: match desc.primitive_topology {
                PrimitiveTopology::TriangleList => wgpu::PrimitiveTopology::TriangleList,
                PrimitiveTopology::TriangleStrip => wgpu::PrimitiveTopology::TriangleStrip,
            },
            strip_index_format: None,
            front_face: match desc.front_face {
                FrontFace::Ccw => wgpu::FrontFace::Ccw,
                FrontFace::Cw => wgpu::FrontFace::Cw,
            },
            cull_mode: match desc.cull_mode {
                CullMode::None => None,
                CullMode::Front => Some(wgpu::Face::Front),
                CullMode::Back => Some(wgpu::Face::Back),
            },
            ..Default::default()
        };

        let depth_stencil = desc.depth_stencil.as_ref().map(|ds| wgpu::DepthStencilState {
            format: Self::convert_texture_format(ds.format),
            depth_write_enabled: ds.depth_write_enabled,
            depth_compare: Self::convert_compare_function(ds.depth_compare),
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        });

        let pipeline = self.scoped(
            |device| {
                let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                    label: None,
                    bind_group_layouts: &layouts,
                    push_constant_ranges: &push_constant_ranges,
                });
                device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                    label: desc.label.as_deref(),
                    layout: Some(&pipeline_layout),
                    vertex: wgpu::VertexState {
                        module: &shader,
                        entry_point: &desc.vertex_entry,
                        buffers: &vertex_buffers,
                        compilation_options: wgpu::PipelineCompilationOptions::default(),
                    },
                    fragment: desc.fragment_entry.as_ref().map(|entry| wgpu::FragmentState {
                        module: &shader,
                        entry_point: entry,
                        targets: &color_targets,
                        compilation_options: wgpu::PipelineCompilationOptions::default(),
                    }),
                    primitive,
                    depth_stencil,
                    multisample: wgpu::MultisampleState::default(),
                    multiview: None,
                })
            },
            BackendError::PipelineCreationFailed,
        )?;

        let id = self.next_render_pipeline_id;
        self.next_render_pipeline_id += 1;
        self.render_pipelines.insert(id, pipeline);

        Ok(RenderPipelineHandle(id))
    }

    fn create_compute_pipeline(
        &mut self,
        desc: &ComputePipelineDescriptor,
    ) -> BackendResult<ComputePipelineHandle> {
        let shader = self.scoped(
            |device| {
                device.create_shader_module(wgpu::ShaderModuleDescriptor {
                    label: desc.label.as_deref(),
                    source: wgpu::ShaderSource::Wgsl(desc.shader.as_str().into()),
                })
            },
            BackendError::ShaderCreationFailed,
        )?;

        let layouts: Vec<&wgpu::BindGroupLayout> = desc
            .bind_group_layouts
            .iter()
            .filter_map(|h| self.bind_group_layouts.get(&h.0))
            .collect();
        let push_constant_ranges = Self::convert_push_constant_ranges(&desc.push_constant_ranges);

        let pipeline = self.scoped(
            |device| {
                let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                    label: None,
                    bind_group_layouts: &layouts,
                    push_constant_ranges: &push_constant_ranges,
                });
                device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                    label: desc.label.as_deref(),
                    layout: Some(&pipeline_layout),
                    module: &shader,
                    entry_point: &desc.entry_point,
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                })
            },
            BackendError::PipelineCreationFailed,
        )?;

        let id = self.next_compute_pipeline_id;
        self.next_compute_pipeline_id += 1;
        self.compute_pipelines.insert(id, pipeline);

        Ok(ComputePipelineHandle(id))
    }

    fn begin_render_pass(&mut self, desc: &RenderPassDescriptor) {
        self.pending_render_pass = Some(PendingRenderPass {
            descriptor: desc.clone(),
            commands: Vec::new(),
        });
    }

    fn end_render_pass(&mut self) {
        let Some(pending) = self.pending_render_pass.take() else {
            return;
        };

        let Some(mut encoder) = self.encoder.take() else {
            return;
        };

        let swapchain_view: Option<wgpu::TextureView> = self
            .current_texture
            .as_ref()
            .map(|tex| tex.texture.create_view(&wgpu::TextureViewDescriptor::default()));

        {
            let color_attachments = self.color_attachments(&pending.descriptor, swapchain_view.as_ref());
            let depth_attachment = self.depth_attachment(&pending.descriptor);

            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: pending.descriptor.label.as_deref(),
                color_attachments: &color_attachments,
                depth_stencil_attachment: depth_attachment,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            for cmd in &pending.commands {
                match cmd {
                    RenderCommand::SetPipeline(handle) => {
                        if let Some(pipeline) = self.render_pipelines.get(&handle.0) {
                            render_pass.set_pipeline(pipeline);
                        }
                    }
                    RenderCommand::SetBindGroup { index, bind_group } => {
                        if let Some(bg) = self.bind_groups.get(&bind_group.0) {
                            render_pass.set_bind_group(*index, bg, &[]);
                        }
                    }
                    RenderCommand::SetPushConstants { stages, offset, data } => {
                        render_pass.set_push_constants(Self::convert_shader_stages(*stages), *offset, data);
                    }
                    RenderCommand::SetVertexBuffer { slot, buffer, offset } => {
                        if let Some(entry) = self.buffers.get(&buffer.0) {
                            render_pass.set_vertex_buffer(*slot, entry.buffer.slice(*offset..));
                        }
                    }
                    RenderCommand::SetIndexBuffer { buffer, offset, format } => {
                        if let Some(entry) = self.buffers.get(&buffer.0) {
                            let wgpu_format = match format {
                                IndexFormat::Uint16 => wgpu::IndexFormat::Uint16,
                                IndexFormat::Uint32 => wgpu::IndexFormat::Uint32,
                            };
                            render_pass.set_index_buffer(entry.buffer.slice(*offset..), wgpu_format);
                        }
                    }
                    RenderCommand::SetViewport { x, y, width, height, min_depth, max_depth } => {
                        render_pass.set_viewport(*x, *y, *width, *height, *min_depth, *max_depth);
                    }
                    RenderCommand::Draw { vertices, instances } => {
                        render_pass.draw(vertices.clone(), instances.clone());
                    }
                    RenderCommand::DrawIndexed { indices, base_vertex, instances } => {
                        render_pass.draw_indexed(indices.clone(), *base_vertex, instances.clone());
                    }
                    RenderCommand::DrawIndexedIndirect { buffer, offset, count } => {
                        if let Some(entry) = self.buffers.get(&buffer.0) {
                            render_pass.multi_draw_indexed_indirect(&entry.buffer, *offset, *count);
                        }
                    }
                }
            }
        }

        self.encoder = Some(encoder);
    }

    fn begin_compute_pass(&mut self, label: Option<&str>) {
        self.pending_compute_pass = Some(PendingComputePass {
            label: label.map(|s| s.to_string()),
            commands: Vec::new(),
        });
    }

    fn end_compute_pass(&mut self) {
        let Some(pending) = self.pending_compute_pass.take() else {
            return;
        };

        let Some(encoder) = self.encoder.as_mut() else {
            return;
        };

        let compute_pipelines = &self.compute_pipelines;
        let bind_groups = &self.bind_groups;

        let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: pending.label.as_deref(),
            timestamp_writes: None,
        });

        for cmd in &pending.commands {
            match cmd {
                ComputeCommand::SetPipeline(handle) => {
                    if let Some(pipeline) = compute_pipelines.get(&handle.0) {
                        compute_pass.set_pipeline(pipeline);
                    }
                }
                ComputeCommand::SetBindGroup { index, bind_group } => {
                    if let Some(bg) = bind_groups.get(&bind_group.0) {
                        compute_pass.set_bind_group(*index, bg, &[]);
                    }
                }
                ComputeCommand::SetPushConstants { offset, data } => {
                    compute_pass.set_push_constants(*offset, data);
                }
                ComputeCommand::Dispatch { x, y, z } => {
                    compute_pass.dispatch_workgroups(*x, *y, *z);
                }
            }
        }
    }

    fn set_render_pipeline(&mut self, pipeline: RenderPipelineHandle) {
        if let Some(ref mut pending) = self.pending_render_pass {
            pending.commands.push(RenderCommand::SetPipeline(pipeline));
        }
    }

    fn set_compute_pipeline(&mut self, pipeline: ComputePipelineHandle) {
        if let Some(ref mut pending) = self.pending_compute_pass {
            pending.commands.push(ComputeCommand::SetPipeline(pipeline));
        }
    }

    fn set_bind_group(&mut self, index: u32, bind_group: BindGroupHandle) {
        if let Some(ref mut pending) = self.pending_render_pass {
            pending.commands.push(RenderCommand::SetBindGroup { index, bind_group });
        } else if let Some(ref mut pending) = self.pending_compute_pass {
            pending.commands.push(ComputeCommand::SetBindGroup { index, bind_group });
        }
    }

    fn set_push_constants(&mut self, stages: ShaderStageFlags, offset: u32, data: &[u8]) {
        if let Some(ref mut pending) = self.pending_render_pass {
            pending.commands.push(RenderCommand::SetPushConstants {
                stages,
                offset,
                data: data.to_vec(),
            });
        } else if let Some(ref mut pending) = self.pending_compute_pass {
            pending.commands.push(ComputeCommand::SetPushConstants {
                offset,
                data: data.to_vec(),
            });
        }
    }

    fn set_vertex_buffer(&mut self, slot: u32, buffer: BufferHandle, offset: u64) {
        if let Some(ref mut pending) = self.pending_render_pass {
            pending.commands.push(RenderCommand::SetVertexBuffer { slot, buffer, offset });
        }
    }

    fn set_index_buffer(&mut self, buffer: BufferHandle, offset: u64, format: IndexFormat) {
        if let Some(ref mut pending) = self.pending_render_pass {
            pending.commands.push(RenderCommand::SetIndexBuffer { buffer, offset, format });
        }
    }

    fn set_viewport(&mut self, x: f32, y: f32, width: f32, height: f32, min_depth: f32, max_depth: f32) {
        if let Some(ref mut pending) = self.pending_render_pass {
            pending.commands.push(RenderCommand::SetViewport { x, y, width, height, min_depth, max_depth });
        }
    }

    fn draw(&mut self, vertices: Range<u32>, instances: Range<u32>) {
        if let Some(ref mut pending) = self.pending_render_pass {
            pending.commands.push(RenderCommand::Draw { vertices, instances });
        }
    }

    fn draw_indexed(&mut self, indices: Range<u32>, base_vertex: i32, instances: Range<u32>) {
        if let Some(ref mut pending) = self.pending_render_pass {
            pending.commands.push(RenderCommand::DrawIndexed { indices, base_vertex, instances });
        }
    }

    fn draw_indexed_indirect(&mut self, buffer: BufferHandle, offset: u64, count: u32) {
        if let Some(ref mut pending) = self.pending_render_pass {
            pending.commands.push(RenderCommand::DrawIndexedIndirect { buffer, offset, count });
        }
    }

    fn dispatch_compute(&mut self, x: u32, y: u32, z: u32) {
        if let Some(ref mut pending) = self.pending_compute_pass {
            pending.commands.push(ComputeCommand::Dispatch { x, y, z });
        }
    }

    fn fill_buffer(
        &mut self,
        buffer: BufferHandle,
        offset: u64,
        size: u64,
        value: u32,
    ) -> BackendResult<()> {
        self.ensure_outside_pass("fill_buffer")?;
        if offset % wgpu::COPY_BUFFER_ALIGNMENT != 0 || size % wgpu::COPY_BUFFER_ALIGNMENT != 0 {
            return Err(BackendError::InvalidCommand(format!(
                "fill of {size} bytes at {offset} is not 4-byte aligned"
            )));
        }
        if !self.buffer(buffer)?.usage.contains(BufferUsage::COPY_DST) {
            return Err(BackendError::InvalidCommand(format!(
                "buffer {buffer:?} is not a transfer destination"
            )));
        }
        if self.encoder.is_none() {
            return Err(BackendError::InvalidCommand("fill_buffer outside of a frame".into()));
        }

        if value != 0 {
            // Materialise the pattern source before borrowing the encoder
            self.fill_pattern_buffer(value, size);
        }
        let (Some(encoder), Some(dst)) = (self.encoder.as_mut(), self.buffers.get(&buffer.0)) else {
            return Ok(());
        };
        if value == 0 {
            encoder.clear_buffer(&dst.buffer, offset, Some(size));
        } else if let Some(src) = self.fill_patterns.get(&(value, size)) {
            encoder.copy_buffer_to_buffer(src, 0, &dst.buffer, offset, size);
        }

        log::trace!("fill_buffer {buffer:?} [{offset}..{}] = {value:#010x}", offset + size);
        Ok(())
    }

    fn buffer_barriers(&mut self, barriers: &[BufferBarrier]) -> BackendResult<()> {
        self.ensure_outside_pass("buffer_barriers")?;
        for barrier in barriers {
            barrier.validate(self.buffer(barrier.buffer)?.usage)?;
            log::trace!(
                "barrier {:?}: {:?}/{:?} -> {:?}/{:?}",
                barrier.buffer,
                barrier.src_stage,
                barrier.src_access,
                barrier.dst_stage,
                barrier.dst_access
            );
        }
        // wgpu derives the actual hazards from resource usage at pass
        // boundaries; passes are already split here, so nothing else to encode.
        Ok(())
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        self.buffers.remove(&buffer.0);
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        self.textures.remove(&texture.0);
    }

    fn destroy_texture_view(&mut self, view: TextureViewHandle) {
        self.texture_views.remove(&view.0);
    }

    fn destroy_bind_group(&mut self, bind_group: BindGroupHandle) {
        self.bind_groups.remove(&bind_group.0);
    }
}
