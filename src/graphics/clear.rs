use anyhow::Result;
use ash::vk;
use log::{debug, info};

use super::GraphicsContext;

pub fn clear_value(color: [f32; 4]) -> vk::ClearValue {
    vk::ClearValue {
        color: vk::ClearColorValue { float32: color },
    }
}

/// A render pass whose only work is clearing its color attachment, plus the
/// command buffer and fence used to submit it. Binding a target and
/// beginning the pass is the whole frame.
pub struct ClearPass {
    device: ash::Device,
    render_pass: vk::RenderPass,
    command_pool: vk::CommandPool,
    command_buffer: vk::CommandBuffer,
    fence: vk::Fence,
}

impl ClearPass {
    /// `final_layout` is what the consumer expects after the clear:
    /// `PRESENT_SRC_KHR` for the window, `COLOR_ATTACHMENT_OPTIMAL` for the
    /// headset compositor.
    pub fn new(gpu: &GraphicsContext, format: vk::Format, final_layout: vk::ImageLayout) -> Result<Self> {
        let device = gpu.device().clone();
        // Null handles are no-ops to destroy, so a half-built pass drops cleanly
        let mut pass = Self {
            device,
            render_pass: vk::RenderPass::null(),
            command_pool: vk::CommandPool::null(),
            command_buffer: vk::CommandBuffer::null(),
            fence: vk::Fence::null(),
        };

        debug!("Creating clear render pass ({:?} -> {:?})...", format, final_layout);
        let color_attachment = [vk::AttachmentDescription::builder()
            .format(format)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(final_layout)
            .build()];

        let color_attachment_ref = [vk::AttachmentReference::builder()
            .attachment(0)
            .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .build()];

        let subpass = [vk::SubpassDescription::builder()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_attachment_ref)
            .build()];

        // Wait for the image to be handed over before writing to it
        let dependency = [vk::SubpassDependency::builder()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
            .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
            .src_access_mask(vk::AccessFlags::empty())
            .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
            .build()];

        let render_pass_info = vk::RenderPassCreateInfo::builder()
            .attachments(&color_attachment)
            .subpasses(&subpass)
            .dependencies(&dependency);

        pass.render_pass = unsafe { pass.device.create_render_pass(&render_pass_info, None) }
            .map_err(|err| anyhow::anyhow!("Failed to create render pass: {}", err))?;

        let command_pool_info = vk::CommandPoolCreateInfo::builder()
            .queue_family_index(gpu.queue_family_index())
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
        pass.command_pool = unsafe { pass.device.create_command_pool(&command_pool_info, None) }
            .map_err(|err| anyhow::anyhow!("Failed to create command pool: {}", err))?;

        let command_buffer_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(pass.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        pass.command_buffer = unsafe { pass.device.allocate_command_buffers(&command_buffer_info) }
            .map_err(|err| anyhow::anyhow!("Failed to allocate command buffer: {}", err))?[0];

        // Signaled so the first submit does not wait on nothing
        let fence_info = vk::FenceCreateInfo::builder().flags(vk::FenceCreateFlags::SIGNALED);
        pass.fence = unsafe { pass.device.create_fence(&fence_info, None) }
            .map_err(|err| anyhow::anyhow!("Failed to create fence: {}", err))?;

        Ok(pass)
    }

    pub fn render_pass(&self) -> vk::RenderPass {
        self.render_pass
    }

    /// Blocks until the previous clear has finished executing.
    pub fn wait(&self) -> Result<()> {
        unsafe { self.device.wait_for_fences(&[self.fence], true, u64::MAX) }
            .map_err(|err| anyhow::anyhow!("Failed to wait for clear fence: {}", err))
    }

    /// Records "bind target, clear to `color`" and submits it. `wait` is a
    /// semaphore the clear must wait on (image acquisition), `signal` one it
    /// signals on completion (presentation).
    pub fn submit(
        &self,
        queue: vk::Queue,
        framebuffer: vk::Framebuffer,
        extent: vk::Extent2D,
        color: [f32; 4],
        wait: Option<vk::Semaphore>,
        signal: Option<vk::Semaphore>,
    ) -> Result<()> {
        self.wait()?;
        unsafe {
            self.device.reset_fences(&[self.fence])?;
            self.device
                .reset_command_buffer(self.command_buffer, vk::CommandBufferResetFlags::empty())?;

            let begin_info = vk::CommandBufferBeginInfo::builder()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            self.device.begin_command_buffer(self.command_buffer, &begin_info)?;

            let clear_values = [clear_value(color)];
            let render_pass_begin = vk::RenderPassBeginInfo::builder()
                .render_pass(self.render_pass)
                .framebuffer(framebuffer)
                .render_area(vk::Rect2D {
                    offset: vk::Offset2D { x: 0, y: 0 },
                    extent,
                })
                .clear_values(&clear_values);
            self.device.cmd_begin_render_pass(
                self.command_buffer,
                &render_pass_begin,
                vk::SubpassContents::INLINE,
            );
            self.device.cmd_end_render_pass(self.command_buffer);
            self.device.end_command_buffer(self.command_buffer)?;

            let command_buffers = [self.command_buffer];
            let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
            let mut submit_info = vk::SubmitInfo::builder().command_buffers(&command_buffers);
            if let Some(semaphore) = wait.as_ref() {
                submit_info = submit_info
                    .wait_semaphores(std::slice::from_ref(semaphore))
                    .wait_dst_stage_mask(&wait_stages);
            }
            if let Some(semaphore) = signal.as_ref() {
                submit_info = submit_info.signal_semaphores(std::slice::from_ref(semaphore));
            }

            self.device
                .queue_submit(queue, &[submit_info.build()], self.fence)
                .map_err(|err| anyhow::anyhow!("Failed to submit clear: {}", err))?;
        }
        Ok(())
    }
}

impl Drop for ClearPass {
    fn drop(&mut self) {
        info!("Cleaning up clear pass");
        unsafe {
            if self.fence != vk::Fence::null() {
                let _ = self.device.wait_for_fences(&[self.fence], true, u64::MAX);
            }
            self.device.destroy_fence(self.fence, None);
            self.device.destroy_command_pool(self.command_pool, None);
            self.device.destroy_render_pass(self.render_pass, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clear_value_carries_float_color() {
        let value = clear_value([0.0, 1.0, 0.0, 1.0]);
        let color = unsafe { value.color.float32 };
        assert_eq!(color, [0.0, 1.0, 0.0, 1.0]);
    }
}
