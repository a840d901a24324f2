//! Dummy GPU backend for testing and development.
//!
//! This backend doesn't talk to a GPU. It keeps a CPU copy of every buffer,
//! applies writes and fills to it, validates barriers against buffer usage
//! and records every command so tests can inspect the exact sequence a
//! frame produced.

use crate::backend::traits::*;
use crate::backend::types::*;
use std::collections::HashMap;
use std::ops::Range;

/// Format reported for the fake swapchain
pub const DUMMY_SWAPCHAIN_FORMAT: TextureFormat = TextureFormat::Bgra8UnormSrgb;

/// A recorded backend command
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    BeginRenderPass {
        label: Option<String>,
        color_targets: Vec<TextureViewHandle>,
        color_loads: Vec<LoadOp>,
        depth_target: Option<TextureViewHandle>,
    },
    EndRenderPass,
    BeginComputePass { label: Option<String> },
    EndComputePass,
    SetRenderPipeline(RenderPipelineHandle),
    SetComputePipeline(ComputePipelineHandle),
    SetBindGroup { index: u32, bind_group: BindGroupHandle },
    SetPushConstants { stages: ShaderStageFlags, offset: u32, data: Vec<u8> },
    SetVertexBuffer { slot: u32, buffer: BufferHandle, offset: u64 },
    SetIndexBuffer { buffer: BufferHandle, offset: u64, format: IndexFormat },
    SetViewport { width: f32, height: f32 },
    Draw { vertices: Range<u32>, instances: Range<u32> },
    DrawIndexed { indices: Range<u32>, base_vertex: i32, instances: Range<u32> },
    DrawIndexedIndirect { buffer: BufferHandle, offset: u64, count: u32 },
    Dispatch { x: u32, y: u32, z: u32 },
    FillBuffer { buffer: BufferHandle, offset: u64, size: u64, value: u32 },
    Barriers(Vec<BufferBarrier>),
    WriteBuffer { buffer: BufferHandle, offset: u64, size: u64 },
    WriteTexture { texture: TextureHandle, width: u32, height: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpenPass {
    Render,
    Compute,
}

struct BufferEntry {
    desc: BufferDescriptor,
    data: Vec<u8>,
}

/// Dummy GPU backend.
pub struct DummyBackend {
    width: u32,
    height: u32,
    surface_available: bool,
    in_frame: bool,
    open_pass: Option<OpenPass>,
    frames_presented: u64,

    buffers: HashMap<u64, BufferEntry>,
    textures: HashMap<u64, TextureDescriptor>,
    texture_views: HashMap<u64, TextureHandle>,
    samplers: HashMap<u64, SamplerDescriptor>,
    bind_group_layouts: HashMap<u64, Vec<BindGroupLayoutEntry>>,
    bind_groups: HashMap<u64, Vec<(u32, BindGroupEntry)>>,
    render_pipelines: HashMap<u64, RenderPipelineDescriptor>,
    compute_pipelines: HashMap<u64, ComputePipelineDescriptor>,

    next_id: u64,
    commands: Vec<Command>,
    misuse: Vec<String>,
}

impl DummyBackend {
    /// Create a new dummy backend with a fake surface of the given size.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            surface_available: true,
            in_frame: false,
            open_pass: None,
            frames_presented: 0,
            buffers: HashMap::new(),
            textures: HashMap::new(),
            texture_views: HashMap::new(),
            samplers: HashMap::new(),
            bind_group_layouts: HashMap::new(),
            bind_groups: HashMap::new(),
            render_pipelines: HashMap::new(),
            compute_pipelines: HashMap::new(),
            next_id: 1,
            commands: Vec::new(),
            misuse: Vec::new(),
        }
    }

    /// Get the backend name.
    pub fn name(&self) -> &'static str {
        "Dummy Backend"
    }

    /// Commands recorded since creation or the last [`Self::clear_commands`]
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn clear_commands(&mut self) {
        self.commands.clear();
    }

    /// CPU copy of a buffer's contents
    pub fn buffer_data(&self, buffer: BufferHandle) -> Option<&[u8]> {
        self.buffers.get(&buffer.0).map(|b| b.data.as_slice())
    }

    /// Overwrite buffer contents as if a shader had written them
    pub fn buffer_data_mut(&mut self, buffer: BufferHandle) -> Option<&mut [u8]> {
        self.buffers.get_mut(&buffer.0).map(|b| b.data.as_mut_slice())
    }

    pub fn buffer_descriptor(&self, buffer: BufferHandle) -> Option<&BufferDescriptor> {
        self.buffers.get(&buffer.0).map(|b| &b.desc)
    }

    pub fn texture_descriptor(&self, texture: TextureHandle) -> Option<&TextureDescriptor> {
        self.textures.get(&texture.0)
    }

    pub fn render_pipeline_descriptor(
        &self,
        pipeline: RenderPipelineHandle,
    ) -> Option<&RenderPipelineDescriptor> {
        self.render_pipelines.get(&pipeline.0)
    }

    pub fn compute_pipeline_descriptor(
        &self,
        pipeline: ComputePipelineHandle,
    ) -> Option<&ComputePipelineDescriptor> {
        self.compute_pipelines.get(&pipeline.0)
    }

    /// Live buffer count, for leak checks
    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    /// Live texture count, for leak checks
    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    /// Make the next `begin_frame` calls report an unpresentable surface
    pub fn set_surface_available(&mut self, available: bool) {
        self.surface_available = available;
    }

    /// Commands issued in the wrong state (draw outside a pass and so on)
    pub fn misuse(&self) -> &[String] {
        &self.misuse
    }

    fn alloc_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn record(&mut self, command: Command) {
        self.commands.push(command);
    }

    fn record_in(&mut self, pass: OpenPass, command: Command) {
        if self.open_pass != Some(pass) {
            self.misuse
                .push(format!("{command:?} recorded outside a {pass:?} pass"));
        }
        self.record(command);
    }

    fn ensure_outside_pass(&self, what: &str) -> BackendResult<()> {
        if self.open_pass.is_some() {
            return Err(BackendError::InvalidCommand(format!(
                "{what} must be recorded between passes"
            )));
        }
        Ok(())
    }

    fn buffer(&self, handle: BufferHandle) -> BackendResult<&BufferEntry> {
        self.buffers.get(&handle.0).ok_or(BackendError::UnknownHandle {
            kind: "buffer",
            id: handle.0,
        })
    }
}

impl GraphicsBackend for DummyBackend {
    fn resize(&mut self, width: u32, height: u32) {
        log::trace!("DummyBackend: resize {}x{}", width, height);
        if width > 0 && height > 0 {
            self.width = width;
            self.height = height;
        }
    }

    fn surface_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn begin_frame(&mut self) -> BackendResult<Option<FrameContext>> {
        if self.in_frame {
            return Err(BackendError::InvalidCommand("frame already begun".into()));
        }
        if !self.surface_available {
            log::trace!("DummyBackend: surface unavailable, skipping frame");
            return Ok(None);
        }
        self.in_frame = true;
        let view = self.alloc_id();
        Ok(Some(FrameContext {
            swapchain_view: TextureViewHandle(view),
            width: self.width,
            height: self.height,
        }))
    }

    fn end_frame(&mut self) -> BackendResult<()> {
        self.ensure_outside_pass("end_frame")?;
        if !self.in_frame {
            return Err(BackendError::InvalidCommand("end_frame without begin_frame".into()));
        }
        self.in_frame = false;
        self.frames_presented += 1;
        Ok(())
    }

    fn swapchain_format(&self) -> TextureFormat {
        DUMMY_SWAPCHAIN_FORMAT
    }

    fn wait_idle(&mut self) {}

    fn create_buffer(&mut self, desc: &BufferDescriptor) -> BackendResult<BufferHandle> {
        log::trace!(
            "DummyBackend: creating buffer {:?} (size: {})",
            desc.label,
            desc.size
        );
        if desc.size == 0 {
            return Err(BackendError::BufferCreationFailed(format!(
                "{:?} has zero size",
                desc.label
            )));
        }
        let id = self.alloc_id();
        self.buffers.insert(
            id,
            BufferEntry {
                desc: desc.clone(),
                data: vec![0; desc.size as usize],
            },
        );
        Ok(BufferHandle(id))
    }

    fn create_buffer_init(
        &mut self,
        desc: &BufferDescriptor,
        data: &[u8],
    ) -> BackendResult<BufferHandle> {
        let desc = BufferDescriptor {
            size: data.len() as u64,
            ..desc.clone()
        };
        let handle = self.create_buffer(&desc)?;
        if let Some(entry) = self.buffers.get_mut(&handle.0) {
            entry.data.copy_from_slice(data);
        }
        Ok(handle)
    }

    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) {
        let Some(entry) = self.buffers.get_mut(&buffer.0) else {
            self.misuse.push(format!("write to unknown buffer {buffer:?}"));
            return;
        };
        let start = offset as usize;
        let end = start + data.len();
        if end > entry.data.len() {
            self.misuse.push(format!(
                "write of {} bytes at {} overruns buffer {:?} of {} bytes",
                data.len(),
                offset,
                buffer,
                entry.data.len()
            ));
            return;
        }
        entry.data[start..end].copy_from_slice(data);
        self.record(Command::WriteBuffer {
            buffer,
            offset,
            size: data.len() as u64,
        });
    }

    fn create_texture(&mut self, desc: &TextureDescriptor) -> BackendResult<TextureHandle> {
        log::trace!(
            "DummyBackend: creating texture {:?} ({}x{}x{})",
            desc.label,
            desc.width,
            desc.height,
            desc.depth
        );
        if desc.width == 0 || desc.height == 0 {
            return Err(BackendError::TextureCreationFailed(format!(
                "{:?} has zero extent",
                desc.label
            )));
        }
        let id = self.alloc_id();
        self.textures.insert(id, desc.clone());
        Ok(TextureHandle(id))
    }

    fn create_texture_view(&mut self, texture: TextureHandle) -> BackendResult<TextureViewHandle> {
        if !self.textures.contains_key(&texture.0) {
            return Err(BackendError::TextureCreationFailed("Texture not found".into()));
        }
        let id = self.alloc_id();
        self.texture_views.insert(id, texture);
        Ok(TextureViewHandle(id))
    }

    fn write_texture(&mut self, texture: TextureHandle, data: &[u8], width: u32, height: u32) {
        match self.textures.get(&texture.0) {
            Some(desc) => {
                let expected = (width * height * desc.format.bytes_per_pixel()) as usize;
                if data.len() != expected {
                    self.misuse.push(format!(
                        "texture write of {} bytes, expected {}",
                        data.len(),
                        expected
                    ));
                }
            }
            None => self.misuse.push(format!("write to unknown texture {texture:?}")),
        }
        self.record(Command::WriteTexture {
            texture,
            width,
            height,
        });
    }

    fn create_sampler(&mut self, desc: &SamplerDescriptor) -> BackendResult<SamplerHandle> {
        log::trace!("DummyBackend: creating sampler {:?}", desc.label);
        let id = self.alloc_id();
        self.samplers.insert(id, desc.clone());
        Ok(SamplerHandle(id))
    }

    fn create_bind_group_layout(
        &mut self,
        entries: &[BindGroupLayoutEntry],
    ) -> BackendResult<BindGroupLayoutHandle> {
        let id = self.alloc_id();
        self.bind_group_layouts.insert(id, entries.to_vec());
        Ok(BindGroupLayoutHandle(id))
    }

    fn create_bind_group(
        &mut self,
        layout: BindGroupLayoutHandle,
        entries: &[(u32, BindGroupEntry)],
    ) -> BackendResult<BindGroupHandle> {
        let layout_entries = self
            .bind_group_layouts
            .get(&layout.0)
            .ok_or_else(|| BackendError::PipelineCreationFailed("Layout not found".into()))?;

        if layout_entries.len() != entries.len() {
            return Err(BackendError::PipelineCreationFailed(format!(
                "layout has {} bindings, bind group provides {}",
                layout_entries.len(),
                entries.len()
            )));
        }
        for (binding, entry) in entries {
            let Some(slot) = layout_entries.iter().find(|e| e.binding == *binding) else {
                return Err(BackendError::PipelineCreationFailed(format!(
                    "binding {binding} not in layout"
                )));
            };
            match (entry, &slot.ty) {
                (BindGroupEntry::Buffer { buffer, .. }, BindingType::StorageBuffer { .. }) => {
                    if !self.buffer(*buffer)?.desc.usage.contains(BufferUsage::STORAGE) {
                        return Err(BackendError::PipelineCreationFailed(format!(
                            "binding {binding}: buffer {buffer:?} lacks STORAGE usage"
                        )));
                    }
                }
                (BindGroupEntry::Buffer { buffer, .. }, BindingType::UniformBuffer) => {
                    if !self.buffer(*buffer)?.desc.usage.contains(BufferUsage::UNIFORM) {
                        return Err(BackendError::PipelineCreationFailed(format!(
                            "binding {binding}: buffer {buffer:?} lacks UNIFORM usage"
                        )));
                    }
                }
                (BindGroupEntry::Texture(view), BindingType::Texture { .. }) => {
                    if !self.texture_views.contains_key(&view.0) {
                        return Err(BackendError::UnknownHandle {
                            kind: "texture view",
                            id: view.0,
                        });
                    }
                }
                (BindGroupEntry::Sampler(sampler), BindingType::Sampler(_)) => {
                    if !self.samplers.contains_key(&sampler.0) {
                        return Err(BackendError::UnknownHandle {
                            kind: "sampler",
                            id: sampler.0,
                        });
                    }
                }
                _ => {
                    return Err(BackendError::PipelineCreationFailed(format!(
                        "binding {binding}: resource does not match layout"
                    )));
                }
            }
        }

        let id = self.alloc_id();
        self.bind_groups.insert(id, entries.to_vec());
        Ok(BindGroupHandle(id))
    }

    fn create_render_pipeline(
        &mut self,
        desc: &RenderPipelineDescriptor,
    ) -> BackendResult<RenderPipelineHandle> {
        log::trace!("DummyBackend: creating render pipeline {:?}", desc.label);
        if !desc.shader.contains(&desc.vertex_entry) {
            return Err(BackendError::ShaderCreationFailed(format!(
                "entry point {} not found",
                desc.vertex_entry
            )));
        }
        if let Some(entry) = &desc.fragment_entry {
            if !desc.shader.contains(entry.as_str()) {
                return Err(BackendError::ShaderCreationFailed(format!(
                    "entry point {entry} not found"
                )));
            }
        }
        let id = self.alloc_id();
        self.render_pipelines.insert(id, desc.clone());
        Ok(RenderPipelineHandle(id))
    }

    fn create_compute_pipeline(
        &mut self,
        desc: &ComputePipelineDescriptor,
    ) -> BackendResult<ComputePipelineHandle> {
        log::trace!("DummyBackend: creating compute pipeline {:?}", desc.label);
        if !desc.shader.contains(&desc.entry_point) {
            return Err(BackendError::ShaderCreationFailed(format!(
                "entry point {} not found",
                desc.entry_point
            )));
        }
        let id = self.alloc_id();
        self.compute_pipelines.insert(id, desc.clone());
        Ok(ComputePipelineHandle(id))
    }

    fn begin_render_pass(&mut self, desc: &RenderPassDescriptor) {
        if self.open_pass.is_some() || !self.in_frame {
            self.misuse.push(format!("render pass {:?} begun in wrong state", desc.label));
        }
        self.open_pass = Some(OpenPass::Render);
        self.record(Command::BeginRenderPass {
            label: desc.label.clone(),
            color_targets: desc.color_attachments.iter().map(|a| a.view).collect(),
            color_loads: desc.color_attachments.iter().map(|a| a.load_op).collect(),
            depth_target: desc.depth_stencil_attachment.as_ref().map(|d| d.view),
        });
    }

    fn end_render_pass(&mut self) {
        self.record_in(OpenPass::Render, Command::EndRenderPass);
        self.open_pass = None;
    }

    fn begin_compute_pass(&mut self, label: Option<&str>) {
        if self.open_pass.is_some() || !self.in_frame {
            self.misuse.push(format!("compute pass {label:?} begun in wrong state"));
        }
        self.open_pass = Some(OpenPass::Compute);
        self.record(Command::BeginComputePass {
            label: label.map(str::to_string),
        });
    }

    fn end_compute_pass(&mut self) {
        self.record_in(OpenPass::Compute, Command::EndComputePass);
        self.open_pass = None;
    }

    fn set_render_pipeline(&mut self, pipeline: RenderPipelineHandle) {
        self.record_in(OpenPass::Render, Command::SetRenderPipeline(pipeline));
    }

    fn set_compute_pipeline(&mut self, pipeline: ComputePipelineHandle) {
        self.record_in(OpenPass::Compute, Command::SetComputePipeline(pipeline));
    }

    fn set_bind_group(&mut self, index: u32, bind_group: BindGroupHandle) {
        if !self.bind_groups.contains_key(&bind_group.0) {
            self.misuse.push(format!("unknown bind group {bind_group:?}"));
        }
        if self.open_pass.is_none() {
            self.misuse.push("bind group set outside a pass".into());
        }
        self.record(Command::SetBindGroup { index, bind_group });
    }

    fn set_push_constants(&mut self, stages: ShaderStageFlags, offset: u32, data: &[u8]) {
        if self.open_pass.is_none() {
            self.misuse.push("push constants set outside a pass".into());
        }
        if offset as usize + data.len() > MAX_PUSH_CONSTANT_SIZE as usize {
            self.misuse.push(format!(
                "push constants [{}..{}] exceed the limit",
                offset,
                offset as usize + data.len()
            ));
        }
        self.record(Command::SetPushConstants {
            stages,
            offset,
            data: data.to_vec(),
        });
    }

    fn set_vertex_buffer(&mut self, slot: u32, buffer: BufferHandle, offset: u64) {
        self.record_in(OpenPass::Render, Command::SetVertexBuffer { slot, buffer, offset });
    }

    fn set_index_buffer(&mut self, buffer: BufferHandle, offset: u64, format: IndexFormat) {
        self.record_in(OpenPass::Render, Command::SetIndexBuffer { buffer, offset, format });
    }

    fn set_viewport(&mut self, _x: f32, _y: f32, width: f32, height: f32, _min_depth: f32, _max_depth: f32) {
        self.record_in(OpenPass::Render, Command::SetViewport { width, height });
    }

    fn draw(&mut self, vertices: Range<u32>, instances: Range<u32>) {
        self.record_in(OpenPass::Render, Command::Draw { vertices, instances });
    }

    fn draw_indexed(&mut self, indices: Range<u32>, base_vertex: i32, instances: Range<u32>) {
        self.record_in(
            OpenPass::Render,
            Command::DrawIndexed {
                indices,
                base_vertex,
                instances,
            },
        );
    }

    fn draw_indexed_indirect(&mut self, buffer: BufferHandle, offset: u64, count: u32) {
        match self.buffers.get(&buffer.0) {
            Some(entry) => {
                let needed = offset
                    + count as u64 * std::mem::size_of::<DrawIndexedIndirect>() as u64;
                if !entry.desc.usage.contains(BufferUsage::INDIRECT) {
                    self.misuse.push(format!("{buffer:?} lacks INDIRECT usage"));
                }
                if needed > entry.desc.size {
                    self.misuse.push(format!(
                        "{count} indirect draws overrun {buffer:?} ({needed} > {})",
                        entry.desc.size
                    ));
                }
            }
            None => self.misuse.push(format!("unknown indirect buffer {buffer:?}")),
        }
        self.record_in(OpenPass::Render, Command::DrawIndexedIndirect { buffer, offset, count });
    }

    fn dispatch_compute(&mut self, x: u32, y: u32, z: u32) {
        self.record_in(OpenPass::Compute, Command::Dispatch { x, y, z });
    }

    fn fill_buffer(
        &mut self,
        buffer: BufferHandle,
        offset: u64,
        size: u64,
        value: u32,
    ) -> BackendResult<()> {
        self.ensure_outside_pass("fill_buffer")?;
        if offset % 4 != 0 || size % 4 != 0 {
            return Err(BackendError::InvalidCommand(format!(
                "fill of {size} bytes at {offset} is not 4-byte aligned"
            )));
        }
        let entry = self
            .buffers
            .get_mut(&buffer.0)
            .ok_or(BackendError::UnknownHandle {
                kind: "buffer",
                id: buffer.0,
            })?;
        if !entry.desc.usage.contains(BufferUsage::COPY_DST) {
            return Err(BackendError::InvalidCommand(format!(
                "buffer {buffer:?} is not a transfer destination"
            )));
        }
        let end = offset + size;
        if end > entry.data.len() as u64 {
            return Err(BackendError::InvalidCommand(format!(
                "fill [{offset}..{end}] overruns buffer {buffer:?}"
            )));
        }
        for word in entry.data[offset as usize..end as usize].chunks_exact_mut(4) {
            word.copy_from_slice(&value.to_le_bytes());
        }
        log::trace!("DummyBackend: fill {:?} [{}..{}] = {:#010x}", buffer, offset, end, value);
        self.record(Command::FillBuffer {
            buffer,
            offset,
            size,
            value,
        });
        Ok(())
    }

    fn buffer_barriers(&mut self, barriers: &[BufferBarrier]) -> BackendResult<()> {
        self.ensure_outside_pass("buffer_barriers")?;
        for barrier in barriers {
            barrier.validate(self.buffer(barrier.buffer)?.desc.usage)?;
        }
        log::trace!("DummyBackend: {} buffer barriers", barriers.len());
        self.record(Command::Barriers(barriers.to_vec()));
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

#[cfg(test)]
mod tests {
    use super::*;

    fn storage_buffer(backend: &mut DummyBackend, size: u64) -> BufferHandle {
        backend
            .create_buffer(&BufferDescriptor::new(
                "test",
                size,
                BufferUsage::STORAGE | BufferUsage::COPY_DST,
            ))
            .unwrap()
    }

    #[test]
    fn fill_buffer_writes_pattern() {
        let mut backend = DummyBackend::new(64, 64);
        let buffer = storage_buffer(&mut backend, 16);
        backend.fill_buffer(buffer, 4, 8, 0x7FFF_FFFF).unwrap();

        let data = backend.buffer_data(buffer).unwrap();
        let words: &[u32] = bytemuck::cast_slice(data);
        assert_eq!(words, &[0, 0x7FFF_FFFF, 0x7FFF_FFFF, 0]);
    }

    #[test]
    fn fill_buffer_rejects_unaligned_ranges() {
        let mut backend = DummyBackend::new(64, 64);
        let buffer = storage_buffer(&mut backend, 16);
        assert!(matches!(
            backend.fill_buffer(buffer, 2, 4, 0),
            Err(BackendError::InvalidCommand(_))
        ));
    }

    #[test]
    fn barrier_inside_pass_is_rejected() {
        let mut backend = DummyBackend::new(64, 64);
        let buffer = storage_buffer(&mut backend, 16);
        backend.begin_frame().unwrap();
        backend.begin_compute_pass(Some("pass"));
        let barrier = BufferBarrier::whole(
            buffer,
            (PipelineStages::TRANSFER, AccessFlags::TRANSFER_WRITE),
            (PipelineStages::COMPUTE_SHADER, AccessFlags::SHADER_READ),
        );
        assert!(backend.buffer_barriers(&[barrier]).is_err());
    }

    #[test]
    fn barrier_needs_matching_usage() {
        let mut backend = DummyBackend::new(64, 64);
        let buffer = storage_buffer(&mut backend, 16);
        let barrier = BufferBarrier::whole(
            buffer,
            (PipelineStages::DRAW_INDIRECT, AccessFlags::INDIRECT_COMMAND_READ),
            (PipelineStages::COMPUTE_SHADER, AccessFlags::SHADER_WRITE),
        );
        assert!(matches!(
            backend.buffer_barriers(&[barrier]),
            Err(BackendError::InvalidBarrier(_))
        ));
    }

    #[test]
    fn unavailable_surface_skips_frame() {
        let mut backend = DummyBackend::new(64, 64);
        backend.set_surface_available(false);
        assert!(backend.begin_frame().unwrap().is_none());
        backend.set_surface_available(true);
        let frame = backend.begin_frame().unwrap().unwrap();
        assert_eq!((frame.width, frame.height), (64, 64));
        backend.end_frame().unwrap();
        assert_eq!(backend.frames_presented(), 1);
    }

    #[test]
    fn draw_outside_pass_is_reported() {
        let mut backend = DummyBackend::new(64, 64);
        backend.draw(0..3, 0..1);
        assert_eq!(backend.misuse().len(), 1);
    }
}
