//! Thin recording wrapper handed to draw strategies.

use ash::vk;
use bytemuck::Pod;

use crate::draw::DrawItem;

/// Records draw commands into a frame's command buffer and counts them.
///
/// Only valid between `begin_rendering` and `end_rendering` of the frame it
/// was created for.
pub struct CommandRecorder<'a> {
    device: &'a ash::Device,
    cmd: vk::CommandBuffer,
    extent: vk::Extent2D,
    bound_pipeline: vk::Pipeline,
    vertices_drawn: u64,
    meshes_drawn: u32,
}

impl<'a> CommandRecorder<'a> {
    /// # Safety
    /// `cmd` must be recording inside a dynamic rendering scope of `extent`.
    pub unsafe fn new(device: &'a ash::Device, cmd: vk::CommandBuffer, extent: vk::Extent2D) -> Self {
        Self {
            device,
            cmd,
            extent,
            bound_pipeline: vk::Pipeline::null(),
            vertices_drawn: 0,
            meshes_drawn: 0,
        }
    }

    pub fn command_buffer(&self) -> vk::CommandBuffer {
        self.cmd
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Set a viewport and scissor covering the whole render area.
    pub fn set_full_viewport(&mut self) {
        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: self.extent.width as f32,
            height: self.extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        let scissor = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: self.extent,
        };
        unsafe {
            self.device.cmd_set_viewport(self.cmd, 0, &[viewport]);
            self.device.cmd_set_scissor(self.cmd, 0, &[scissor]);
        }
    }

    /// Bind a graphics pipeline; rebinding the current one is skipped.
    pub fn bind_pipeline(&mut self, pipeline: vk::Pipeline) {
        if pipeline == self.bound_pipeline {
            return;
        }
        unsafe {
            self.device
                .cmd_bind_pipeline(self.cmd, vk::PipelineBindPoint::GRAPHICS, pipeline);
        }
        self.bound_pipeline = pipeline;
    }

    pub fn bind_descriptor_sets(
        &mut self,
        layout: vk::PipelineLayout,
        first_set: u32,
        sets: &[vk::DescriptorSet],
    ) {
        if sets.is_empty() {
            return;
        }
        unsafe {
            self.device.cmd_bind_descriptor_sets(
                self.cmd,
                vk::PipelineBindPoint::GRAPHICS,
                layout,
                first_set,
                sets,
                &[],
            );
        }
    }

    pub fn bind_vertex_buffer(&mut self, buffer: vk::Buffer) {
        unsafe {
            self.device
                .cmd_bind_vertex_buffers(self.cmd, 0, &[buffer], &[0]);
        }
    }

    pub fn bind_index_buffer(&mut self, buffer: vk::Buffer) {
        unsafe {
            self.device
                .cmd_bind_index_buffer(self.cmd, buffer, 0, vk::IndexType::UINT32);
        }
    }

    /// Push constants visible to the vertex and fragment stages.
    pub fn push_constants<T: Pod>(&mut self, layout: vk::PipelineLayout, constants: &T) {
        unsafe {
            self.device.cmd_push_constants(
                self.cmd,
                layout,
                vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
                0,
                bytemuck::bytes_of(constants),
            );
        }
    }

    pub fn draw_indexed(&mut self, index_count: u32) {
        unsafe {
            self.device
                .cmd_draw_indexed(self.cmd, index_count, 1, 0, 0, 0);
        }
        self.meshes_drawn += 1;
        self.vertices_drawn += u64::from(index_count);
    }

    pub fn draw(&mut self, vertex_count: u32) {
        unsafe {
            self.device.cmd_draw(self.cmd, vertex_count, 1, 0, 0);
        }
        self.meshes_drawn += 1;
        self.vertices_drawn += u64::from(vertex_count);
    }

    /// Record a full [`DrawItem`]: pipeline, global sets from set 0, the
    /// item's own sets after them, buffers, constants and the draw itself.
    pub fn draw_item(&mut self, item: &DrawItem, global_sets: &[vk::DescriptorSet]) {
        self.bind_pipeline(item.pipeline);
        self.bind_descriptor_sets(item.layout, 0, global_sets);
        self.bind_descriptor_sets(item.layout, global_sets.len() as u32, &item.descriptor_sets);
        self.push_constants(item.layout, &item.constants);
        if item.vertex_buffer != vk::Buffer::null() {
            self.bind_vertex_buffer(item.vertex_buffer);
        }
        if item.is_indexed() {
            self.bind_index_buffer(item.index_buffer);
            self.draw_indexed(item.index_count);
        } else {
            self.draw(item.vertex_count);
        }
    }

    pub fn vertices_drawn(&self) -> u64 {
        self.vertices_drawn
    }

    pub fn meshes_drawn(&self) -> u32 {
        self.meshes_drawn
    }
}
