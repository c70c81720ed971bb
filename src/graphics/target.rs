use anyhow::Result;
use ash::vk;
use log::debug;

/// Image views and framebuffers for a set of swap chain images, one
/// renderable target per image.
pub struct RenderTargets {
    device: ash::Device,
    views: Vec<vk::ImageView>,
    framebuffers: Vec<vk::Framebuffer>,
    extent: vk::Extent2D,
}

impl RenderTargets {
    pub fn new(
        device: &ash::Device,
        images: &[vk::Image],
        format: vk::Format,
        extent: vk::Extent2D,
        render_pass: vk::RenderPass,
    ) -> Result<Self> {
        // Filled as we go so a failure part way through releases what exists
        let mut targets = Self {
            device: device.clone(),
            views: Vec::with_capacity(images.len()),
            framebuffers: Vec::with_capacity(images.len()),
            extent,
        };

        for &image in images {
            let view_info = vk::ImageViewCreateInfo::builder()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(format)
                .components(vk::ComponentMapping {
                    r: vk::ComponentSwizzle::IDENTITY,
                    g: vk::ComponentSwizzle::IDENTITY,
                    b: vk::ComponentSwizzle::IDENTITY,
                    a: vk::ComponentSwizzle::IDENTITY,
                })
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                });
            let view = unsafe { device.create_image_view(&view_info, None) }
                .map_err(|err| anyhow::anyhow!("Failed to create image view: {}", err))?;
            targets.views.push(view);

            let attachments = [view];
            let framebuffer_info = vk::FramebufferCreateInfo::builder()
                .render_pass(render_pass)
                .attachments(&attachments)
                .width(extent.width)
                .height(extent.height)
                .layers(1);
            let framebuffer = unsafe { device.create_framebuffer(&framebuffer_info, None) }
                .map_err(|err| anyhow::anyhow!("Failed to create framebuffer: {}", err))?;
            targets.framebuffers.push(framebuffer);
        }

        debug!(
            "Created {} render targets ({}x{}, {:?})",
            targets.framebuffers.len(),
            extent.width,
            extent.height,
            format
        );
        Ok(targets)
    }

    pub fn framebuffer(&self, index: u32) -> Result<vk::Framebuffer> {
        self.framebuffers
            .get(index as usize)
            .copied()
            .ok_or_else(|| anyhow::anyhow!("No render target for image {}", index))
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}

impl Drop for RenderTargets {
    fn drop(&mut self) {
        unsafe {
            for framebuffer in self.framebuffers.drain(..) {
                self.device.destroy_framebuffer(framebuffer, None);
            }
            for view in self.views.drain(..) {
                self.device.destroy_image_view(view, None);
            }
        }
    }
}
