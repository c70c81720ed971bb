use anyhow::Result;
use ash::extensions::khr;
use ash::vk;
use log::{debug, info, warn};

use super::{ClearPass, GraphicsContext, RenderTargets};
use crate::config::Size;

/// Two buffers, as in a plain double-buffered swap chain.
const PREFERRED_IMAGE_COUNT: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presented {
    Frame,
    /// Nothing to present to (minimized window), or no back buffer free yet.
    Skipped,
    /// The surface changed; the swap chain is rebuilt before the next frame.
    OutOfDate,
}

/// The desktop swap chain bound to the window, with one render target per
/// back buffer.
pub struct WindowSwapchain {
    device: ash::Device,
    surface_loader: khr::Surface,
    surface: vk::SurfaceKHR,
    physical_device: vk::PhysicalDevice,
    loader: khr::Swapchain,
    swapchain: vk::SwapchainKHR,
    format: vk::SurfaceFormatKHR,
    present_mode: vk::PresentModeKHR,
    extent: vk::Extent2D,
    targets: Option<RenderTargets>,
    clear: ClearPass,
    image_available: vk::Semaphore,
    render_finished: vk::Semaphore,
    preferred_size: Size,
    needs_rebuild: bool,
}

impl WindowSwapchain {
    pub fn new(gpu: &GraphicsContext, preferred_size: Size) -> Result<Self> {
        let surface_loader = gpu.surface_loader().clone();
        let surface = gpu.surface();
        let physical_device = gpu.physical_device();

        let formats = unsafe {
            surface_loader.get_physical_device_surface_formats(physical_device, surface)
        }
        .map_err(|err| anyhow::anyhow!("Failed to get surface formats: {}", err))?;
        let format = choose_surface_format(&formats)
            .ok_or_else(|| anyhow::anyhow!("Surface reports no formats"))?;
        debug!("Selected surface format: {:?}", format);

        let present_modes = unsafe {
            surface_loader.get_physical_device_surface_present_modes(physical_device, surface)
        }
        .map_err(|err| anyhow::anyhow!("Failed to get present modes: {}", err))?;
        let present_mode = choose_present_mode(&present_modes);
        debug!("Selected present mode: {:?}", present_mode);

        let clear = ClearPass::new(gpu, format.format, vk::ImageLayout::PRESENT_SRC_KHR)?;

        let device = gpu.device().clone();
        let semaphore_info = vk::SemaphoreCreateInfo::default();
        let image_available = unsafe { device.create_semaphore(&semaphore_info, None) }
            .map_err(|err| anyhow::anyhow!("Failed to create semaphore: {}", err))?;
        let render_finished = match unsafe { device.create_semaphore(&semaphore_info, None) } {
            Ok(semaphore) => semaphore,
            Err(err) => {
                unsafe { device.destroy_semaphore(image_available, None) };
                return Err(anyhow::anyhow!("Failed to create semaphore: {}", err));
            }
        };

        let mut swapchain = Self {
            loader: khr::Swapchain::new(gpu.instance(), &device),
            device,
            surface_loader,
            surface,
            physical_device,
            swapchain: vk::SwapchainKHR::null(),
            format,
            present_mode,
            extent: vk::Extent2D::default(),
            targets: None,
            clear,
            image_available,
            render_finished,
            preferred_size,
            needs_rebuild: false,
        };
        swapchain.rebuild()?;
        info!(
            "Window swap chain created ({}x{}, {:?})",
            swapchain.extent.width, swapchain.extent.height, swapchain.format.format
        );
        Ok(swapchain)
    }

    /// Schedules a rebuild before the next present.
    pub fn mark_resized(&mut self) {
        self.needs_rebuild = true;
    }

    fn rebuild(&mut self) -> Result<()> {
        self.needs_rebuild = false;
        unsafe { self.device.device_wait_idle() }
            .map_err(|err| anyhow::anyhow!("Failed to wait for device idle: {}", err))?;
        self.targets = None;

        let capabilities = unsafe {
            self.surface_loader
                .get_physical_device_surface_capabilities(self.physical_device, self.surface)
        }
        .map_err(|err| anyhow::anyhow!("Failed to get surface capabilities: {}", err))?;

        let extent = choose_extent(&capabilities, self.preferred_size);
        self.extent = extent;
        if extent.width == 0 || extent.height == 0 {
            debug!("Surface has zero extent, presentation paused");
            self.needs_rebuild = true;
            return Ok(());
        }

        let composite_alpha = [
            vk::CompositeAlphaFlagsKHR::OPAQUE,
            vk::CompositeAlphaFlagsKHR::INHERIT,
            vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED,
            vk::CompositeAlphaFlagsKHR::POST_MULTIPLIED,
        ]
        .into_iter()
        .find(|&mode| capabilities.supported_composite_alpha.contains(mode))
        .unwrap_or(vk::CompositeAlphaFlagsKHR::OPAQUE);

        let old_swapchain = self.swapchain;
        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(self.surface)
            .min_image_count(choose_image_count(&capabilities))
            .image_format(self.format.format)
            .image_color_space(self.format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(capabilities.current_transform)
            .composite_alpha(composite_alpha)
            .present_mode(self.present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain);

        let swapchain = unsafe { self.loader.create_swapchain(&create_info, None) }
            .map_err(|err| anyhow::anyhow!("Failed to create swap chain: {}", err))?;
        unsafe { self.loader.destroy_swapchain(old_swapchain, None) };
        self.swapchain = swapchain;

        let images = unsafe { self.loader.get_swapchain_images(swapchain) }
            .map_err(|err| anyhow::anyhow!("Failed to get swap chain images: {}", err))?;
        debug!("Swap chain has {} back buffers at {}x{}", images.len(), extent.width, extent.height);

        self.targets = Some(RenderTargets::new(
            &self.device,
            &images,
            self.format.format,
            extent,
            self.clear.render_pass(),
        )?);
        Ok(())
    }

    /// Clears the next back buffer to `color` and presents it.
    pub fn present(&mut self, queue: vk::Queue, color: [f32; 4]) -> Result<Presented> {
        if self.needs_rebuild {
            self.rebuild()?;
        }
        if self.targets.is_none() {
            return Ok(Presented::Skipped);
        }

        // The previous clear must be done with the acquire semaphore
        self.clear.wait()?;
        // Never wait for a back buffer; the headset sets the pace
        let acquired = unsafe {
            self.loader.acquire_next_image(
                self.swapchain,
                0,
                self.image_available,
                vk::Fence::null(),
            )
        };
        let image_index = match acquired {
            Ok((index, suboptimal)) => {
                self.needs_rebuild |= suboptimal;
                index
            }
            Err(vk::Result::NOT_READY | vk::Result::TIMEOUT) => return Ok(Presented::Skipped),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                self.needs_rebuild = true;
                return Ok(Presented::OutOfDate);
            }
            Err(err) => return Err(anyhow::anyhow!("Failed to acquire back buffer: {}", err)),
        };

        let framebuffer = match &self.targets {
            Some(targets) => targets.framebuffer(image_index)?,
            None => return Ok(Presented::Skipped),
        };
        self.clear.submit(
            queue,
            framebuffer,
            self.extent,
            color,
            Some(self.image_available),
            Some(self.render_finished),
        )?;

        let wait_semaphores = [self.render_finished];
        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        match unsafe { self.loader.queue_present(queue, &present_info) } {
            Ok(false) => Ok(Presented::Frame),
            Ok(true) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                self.needs_rebuild = true;
                Ok(Presented::OutOfDate)
            }
            Err(err) => Err(anyhow::anyhow!("Failed to present: {}", err)),
        }
    }
}

impl Drop for WindowSwapchain {
    fn drop(&mut self) {
        info!("Cleaning up window swap chain");
        unsafe {
            if let Err(err) = self.device.device_wait_idle() {
                warn!("Device wait before swap chain cleanup failed: {}", err);
            }
            self.targets = None;
            self.device.destroy_semaphore(self.render_finished, None);
            self.device.destroy_semaphore(self.image_available, None);
            self.loader.destroy_swapchain(self.swapchain, None);
        }
    }
}

/// Prefers the 8-bit UNORM formats (RGBA, then BGRA) in sRGB color space,
/// falling back to whatever the surface lists first.
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    [vk::Format::R8G8B8A8_UNORM, vk::Format::B8G8R8A8_UNORM]
        .iter()
        .find_map(|&wanted| {
            formats.iter().copied().find(|candidate| {
                candidate.format == wanted
                    && candidate.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
            })
        })
        .or_else(|| formats.first().copied())
}

/// A mode that does not block on the desktop's vertical blank, so the window
/// cannot hold back the headset: MAILBOX, then IMMEDIATE, then FIFO, which is
/// always available.
pub fn choose_present_mode(modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::IMMEDIATE]
        .into_iter()
        .find(|mode| modes.contains(mode))
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let count = PREFERRED_IMAGE_COUNT.max(capabilities.min_image_count);
    if capabilities.max_image_count > 0 {
        count.min(capabilities.max_image_count)
    } else {
        count
    }
}

/// The surface's fixed extent when it has one, otherwise the preferred back
/// buffer size clamped to what the surface allows.
pub fn choose_extent(capabilities: &vk::SurfaceCapabilitiesKHR, preferred: Size) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }
    let min = capabilities.min_image_extent;
    let max = capabilities.max_image_extent;
    vk::Extent2D {
        width: preferred.width.clamp(min.width, max.width.max(min.width)),
        height: preferred.height.clamp(min.height, max.height.max(min.height)),
    }
}
