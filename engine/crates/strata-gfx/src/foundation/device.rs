use std::{cell::RefCell, collections::HashMap, mem::ManuallyDrop};

use ash::vk;
use itertools::Itertools;
use vk_mem::Alloc;

use crate::{
    commands::{
        queue::{GfxQueue, GfxQueueFamily, GfxQueueTable},
        submit_info::GfxSubmitInfo,
    },
    device::GfxDevice,
    error::{GfxError, GfxResult},
    foundation::{
        debug_messenger::{GfxDebugMsger, set_object_debug_name},
        instance::GfxInstance,
        physical_device::GfxPhysicalDevice,
    },
    resources::{
        buffer::GfxBuffer,
        image::{GfxImage, GfxImageDesc, ImageSource},
        render_pass::{GfxRenderPassBegin, GfxRenderPassDesc},
    },
    swapchain::{GfxSurfaceStatus, GfxSurfaceSupport, GfxSwapchainDesc, surface::GfxSurface},
};

/// 基于 ash + vk-mem 的设备实现
///
/// 持有 instance、surface、device 以及内存分配器，drop 时按照依赖顺序逆序销毁
pub struct VulkanDevice {
    /// 在 drop 之后，会卸载 dll，因此需要确保该字段最后 drop
    _vk_entry: ash::Entry,
    instance: Option<GfxInstance>,
    debug_msger: Option<GfxDebugMsger>,
    surface: Option<GfxSurface>,
    physical_device: GfxPhysicalDevice,

    device: ash::Device,
    swapchain_pf: ash::khr::swapchain::Device,
    debug_utils: Option<ash::ext::debug_utils::Device>,

    /// 需要在 device 之前销毁
    allocator: ManuallyDrop<vk_mem::Allocator>,
    image_allocations: RefCell<HashMap<vk::Image, vk_mem::Allocation>>,
    buffer_allocations: RefCell<HashMap<vk::Buffer, vk_mem::Allocation>>,
}

// new & init
impl VulkanDevice {
    pub fn new(
        app_name: &str,
        raw_display_handle: raw_window_handle::RawDisplayHandle,
        raw_window_handle: raw_window_handle::RawWindowHandle,
        validation: bool,
    ) -> GfxResult<(Self, GfxQueueTable)> {
        let _span = tracy_client::span!("VulkanDevice::new");

        let vk_entry = unsafe { ash::Entry::load() }.map_err(|e| GfxError::Loading(e.to_string()))?;
        let surface_exts = ash_window::enumerate_required_extensions(raw_display_handle)
            .map_err(GfxError::vk("vkEnumerateRequiredExtensions"))?;
        let instance = GfxInstance::new(&vk_entry, app_name, surface_exts, validation)?;

        let debug_msger = if instance.debug_utils_enabled {
            match GfxDebugMsger::new(&vk_entry, instance.ash_instance()) {
                Ok(msger) => Some(msger),
                Err(e) => {
                    log::warn!("failed to create debug messenger: {:?}", e);
                    None
                }
            }
        } else {
            None
        };

        let surface = GfxSurface::new(&vk_entry, instance.ash_instance(), raw_display_handle, raw_window_handle)?;
        let physical_device = GfxPhysicalDevice::pick(instance.ash_instance(), &surface)?;

        // Nvidia 使用的是 Unified Scheduler，因此 Graphics 和 Compute 并没法做到真正的并行
        // 这里仍然使用专用的 compute queue family，让两条 queue 之间只通过 semaphore 同步
        let queue_families = physical_device.unique_queue_families();
        let queue_priorities = [1.0_f32];
        let queue_create_infos = queue_families
            .iter()
            .map(|family| {
                vk::DeviceQueueCreateInfo::default().queue_family_index(*family).queue_priorities(&queue_priorities)
            })
            .collect_vec();

        let device_exts = [ash::khr::swapchain::NAME.as_ptr()];
        let mut features13 = vk::PhysicalDeviceVulkan13Features::default().synchronization2(true);
        let device_ci = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&device_exts)
            .push_next(&mut features13);
        let device = unsafe { instance.ash_instance().create_device(physical_device.vk_handle, &device_ci, None) }
            .map_err(GfxError::vk("vkCreateDevice"))?;

        let swapchain_pf = ash::khr::swapchain::Device::new(instance.ash_instance(), &device);
        let debug_utils = instance
            .debug_utils_enabled
            .then(|| ash::ext::debug_utils::Device::new(instance.ash_instance(), &device));

        let mut vma_ci = vk_mem::AllocatorCreateInfo::new(instance.ash_instance(), &device, physical_device.vk_handle);
        vma_ci.vulkan_api_version = vk::API_VERSION_1_3;
        let allocator = unsafe { vk_mem::Allocator::new(vma_ci) }.map_err(GfxError::vk("vmaCreateAllocator"))?;

        let get_queue = |family: &GfxQueueFamily, name: &str| {
            let handle = unsafe { device.get_device_queue(family.queue_family_index, 0) };
            set_object_debug_name(debug_utils.as_ref(), handle, &format!("Queue::{}", name));
            GfxQueue::new(handle, family.clone())
        };
        let graphics = get_queue(&physical_device.gfx_queue_family, "graphics");
        let compute = match &physical_device.compute_queue_family {
            Some(family) => get_queue(family, "compute"),
            None => {
                log::info!("no dedicated compute queue family, compute stages share the graphics queue");
                graphics.clone()
            }
        };
        let present = if physical_device.present_queue_family.queue_family_index == graphics.family_index() {
            graphics.clone()
        } else {
            get_queue(&physical_device.present_queue_family, "present")
        };
        let queues = GfxQueueTable {
            graphics,
            compute,
            present,
        };
        log::info!("queue table:\n{:#?}", queues);

        set_object_debug_name(debug_utils.as_ref(), device.handle(), "GfxDevice");
        set_object_debug_name(debug_utils.as_ref(), surface.handle, "GfxSurface::main");

        Ok((
            Self {
                _vk_entry: vk_entry,
                instance: Some(instance),
                debug_msger,
                surface: Some(surface),
                physical_device,
                device,
                swapchain_pf,
                debug_utils,
                allocator: ManuallyDrop::new(allocator),
                image_allocations: RefCell::new(HashMap::new()),
                buffer_allocations: RefCell::new(HashMap::new()),
            },
            queues,
        ))
    }
}

// tools
impl VulkanDevice {
    #[inline]
    fn set_debug_name<T: vk::Handle + Copy>(&self, handle: T, type_name: &str, name: &str) {
        set_object_debug_name(self.debug_utils.as_ref(), handle, &format!("{}::{}", type_name, name));
    }

    fn surface(&self) -> GfxResult<&GfxSurface> {
        self.surface.as_ref().ok_or_else(|| GfxError::Surface("surface is already destroyed".to_string()))
    }
}

impl GfxDevice for VulkanDevice {
    fn create_fence(&self, signaled: bool, debug_name: &str) -> GfxResult<vk::Fence> {
        let fence_flags = if signaled { vk::FenceCreateFlags::SIGNALED } else { vk::FenceCreateFlags::empty() };
        let fence = unsafe { self.device.create_fence(&vk::FenceCreateInfo::default().flags(fence_flags), None) }
            .map_err(GfxError::vk("vkCreateFence"))?;
        self.set_debug_name(fence, "Fence", debug_name);
        Ok(fence)
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        unsafe { self.device.destroy_fence(fence, None) }
    }

    fn wait_for_fences(&self, fences: &[vk::Fence], timeout_ns: u64) -> GfxResult<()> {
        if fences.is_empty() {
            return Ok(());
        }
        unsafe { self.device.wait_for_fences(fences, true, timeout_ns) }.map_err(GfxError::vk("vkWaitForFences"))
    }

    fn reset_fences(&self, fences: &[vk::Fence]) -> GfxResult<()> {
        if fences.is_empty() {
            return Ok(());
        }
        unsafe { self.device.reset_fences(fences) }.map_err(GfxError::vk("vkResetFences"))
    }

    fn create_semaphore(&self, debug_name: &str) -> GfxResult<vk::Semaphore> {
        let semaphore = unsafe { self.device.create_semaphore(&vk::SemaphoreCreateInfo::default(), None) }
            .map_err(GfxError::vk("vkCreateSemaphore"))?;
        self.set_debug_name(semaphore, "Semaphore", debug_name);
        Ok(semaphore)
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        unsafe { self.device.destroy_semaphore(semaphore, None) }
    }

    fn wait_idle(&self) -> GfxResult<()> {
        let _span = tracy_client::span!("VulkanDevice::wait_idle");
        unsafe { self.device.device_wait_idle() }.map_err(GfxError::vk("vkDeviceWaitIdle"))
    }

    fn create_command_pool(&self, queue_family_index: u32, debug_name: &str) -> GfxResult<vk::CommandPool> {
        // 每个 command buffer 单独 reset
        let pool = unsafe {
            self.device.create_command_pool(
                &vk::CommandPoolCreateInfo::default()
                    .queue_family_index(queue_family_index)
                    .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER),
                None,
            )
        }
        .map_err(GfxError::vk("vkCreateCommandPool"))?;
        self.set_debug_name(pool, "CommandPool", debug_name);
        Ok(pool)
    }

    fn destroy_command_pool(&self, pool: vk::CommandPool) {
        unsafe { self.device.destroy_command_pool(pool, None) }
    }

    fn allocate_command_buffers(
        &self,
        pool: vk::CommandPool,
        count: u32,
        debug_name: &str,
    ) -> GfxResult<Vec<vk::CommandBuffer>> {
        let command_buffers = unsafe {
            self.device.allocate_command_buffers(
                &vk::CommandBufferAllocateInfo::default()
                    .command_pool(pool)
                    .level(vk::CommandBufferLevel::PRIMARY)
                    .command_buffer_count(count),
            )
        }
        .map_err(GfxError::vk("vkAllocateCommandBuffers"))?;
        for (idx, cmd) in command_buffers.iter().enumerate() {
            self.set_debug_name(*cmd, "CommandBuffer", &format!("{}-{}", debug_name, idx));
        }
        Ok(command_buffers)
    }

    fn reset_command_buffer(&self, cmd: vk::CommandBuffer) -> GfxResult<()> {
        unsafe { self.device.reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty()) }
            .map_err(GfxError::vk("vkResetCommandBuffer"))
    }

    fn begin_command_buffer(&self, cmd: vk::CommandBuffer) -> GfxResult<()> {
        unsafe {
            self.device.begin_command_buffer(
                cmd,
                &vk::CommandBufferBeginInfo::default().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT),
            )
        }
        .map_err(GfxError::vk("vkBeginCommandBuffer"))
    }

    fn end_command_buffer(&self, cmd: vk::CommandBuffer) -> GfxResult<()> {
        unsafe { self.device.end_command_buffer(cmd) }.map_err(GfxError::vk("vkEndCommandBuffer"))
    }

    fn queue_submit(&self, queue: vk::Queue, submit_info: &GfxSubmitInfo, fence: vk::Fence) -> GfxResult<()> {
        let _span = tracy_client::span!("VulkanDevice::queue_submit");
        submit_info.with_vk_info(|info| unsafe {
            self.device.queue_submit2(queue, std::slice::from_ref(info), fence)
        })
        .map_err(GfxError::vk("vkQueueSubmit2"))
    }

    fn cmd_begin_render_pass(&self, cmd: vk::CommandBuffer, begin: &GfxRenderPassBegin<'_>) {
        let begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(begin.render_pass)
            .framebuffer(begin.framebuffer)
            .render_area(begin.render_area)
            .clear_values(begin.clear_values);
        unsafe { self.device.cmd_begin_render_pass(cmd, &begin_info, vk::SubpassContents::INLINE) }
    }

    fn cmd_next_subpass(&self, cmd: vk::CommandBuffer) {
        unsafe { self.device.cmd_next_subpass(cmd, vk::SubpassContents::INLINE) }
    }

    fn cmd_end_render_pass(&self, cmd: vk::CommandBuffer) {
        unsafe { self.device.cmd_end_render_pass(cmd) }
    }

    fn cmd_set_viewport(&self, cmd: vk::CommandBuffer, viewport: vk::Viewport) {
        unsafe { self.device.cmd_set_viewport(cmd, 0, std::slice::from_ref(&viewport)) }
    }

    fn cmd_set_scissor(&self, cmd: vk::CommandBuffer, scissor: vk::Rect2D) {
        unsafe { self.device.cmd_set_scissor(cmd, 0, std::slice::from_ref(&scissor)) }
    }

    fn create_image(&self, desc: &GfxImageDesc, debug_name: &str) -> GfxResult<GfxImage> {
        let alloc_ci = vk_mem::AllocationCreateInfo {
            usage: vk_mem::MemoryUsage::AutoPreferDevice,
            ..Default::default()
        };
        let (handle, mut allocation) = unsafe { self.allocator.create_image(&desc.vk_create_info(), &alloc_ci) }
            .map_err(GfxError::vk("vmaCreateImage"))?;

        let view = match self.create_image_view(handle, desc.format, desc.aspect, debug_name) {
            Ok(view) => view,
            Err(e) => {
                unsafe { self.allocator.destroy_image(handle, &mut allocation) };
                return Err(e);
            }
        };
        self.set_debug_name(handle, "Image", debug_name);
        self.image_allocations.borrow_mut().insert(handle, allocation);

        Ok(GfxImage {
            handle,
            view,
            desc: *desc,
            source: ImageSource::Allocated,
        })
    }

    fn destroy_image(&self, image: GfxImage) {
        self.destroy_image_view(image.view);
        match image.source {
            ImageSource::External => (),
            ImageSource::Allocated => match self.image_allocations.borrow_mut().remove(&image.handle) {
                Some(mut allocation) => unsafe { self.allocator.destroy_image(image.handle, &mut allocation) },
                None => log::error!("destroy unknown image {:?}", image.handle),
            },
        }
    }

    fn create_image_view(
        &self,
        image: vk::Image,
        format: vk::Format,
        aspect: vk::ImageAspectFlags,
        debug_name: &str,
    ) -> GfxResult<vk::ImageView> {
        let view_ci = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(aspect)
                    .base_mip_level(0)
                    .level_count(1)
                    .base_array_layer(0)
                    .layer_count(1),
            );
        let view =
            unsafe { self.device.create_image_view(&view_ci, None) }.map_err(GfxError::vk("vkCreateImageView"))?;
        self.set_debug_name(view, "ImageView", debug_name);
        Ok(view)
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        unsafe { self.device.destroy_image_view(view, None) }
    }

    fn create_render_pass(&self, desc: &GfxRenderPassDesc, debug_name: &str) -> GfxResult<vk::RenderPass> {
        let subpasses = desc
            .subpasses
            .iter()
            .map(|subpass| {
                let mut subpass_desc = vk::SubpassDescription::default()
                    .pipeline_bind_point(subpass.bind_point)
                    .input_attachments(&subpass.inputs)
                    .color_attachments(&subpass.colors);
                if !subpass.resolves.is_empty() {
                    subpass_desc = subpass_desc.resolve_attachments(&subpass.resolves);
                }
                if let Some(depth_stencil) = subpass.depth_stencil.as_ref() {
                    subpass_desc = subpass_desc.depth_stencil_attachment(depth_stencil);
                }
                subpass_desc
            })
            .collect_vec();

        let render_pass_ci = vk::RenderPassCreateInfo::default()
            .attachments(&desc.attachments)
            .subpasses(&subpasses)
            .dependencies(&desc.dependencies);
        let render_pass = unsafe { self.device.create_render_pass(&render_pass_ci, None) }
            .map_err(GfxError::vk("vkCreateRenderPass"))?;
        self.set_debug_name(render_pass, "RenderPass", debug_name);
        Ok(render_pass)
    }

    fn destroy_render_pass(&self, render_pass: vk::RenderPass) {
        unsafe { self.device.destroy_render_pass(render_pass, None) }
    }

    fn create_framebuffer(
        &self,
        render_pass: vk::RenderPass,
        views: &[vk::ImageView],
        extent: vk::Extent2D,
        debug_name: &str,
    ) -> GfxResult<vk::Framebuffer> {
        let framebuffer_ci = vk::FramebufferCreateInfo::default()
            .render_pass(render_pass)
            .attachments(views)
            .width(extent.width)
            .height(extent.height)
            .layers(1);
        let framebuffer = unsafe { self.device.create_framebuffer(&framebuffer_ci, None) }
            .map_err(GfxError::vk("vkCreateFramebuffer"))?;
        self.set_debug_name(framebuffer, "Framebuffer", debug_name);
        Ok(framebuffer)
    }

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        unsafe { self.device.destroy_framebuffer(framebuffer, None) }
    }

    fn create_host_buffer(
        &self,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        debug_name: &str,
    ) -> GfxResult<GfxBuffer> {
        let buffer_ci = vk::BufferCreateInfo::default().size(size).usage(usage);
        // coherent 内存，写入后无需 flush
        let alloc_ci = vk_mem::AllocationCreateInfo {
            usage: vk_mem::MemoryUsage::AutoPreferHost,
            flags: vk_mem::AllocationCreateFlags::HOST_ACCESS_SEQUENTIAL_WRITE,
            required_flags: vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            ..Default::default()
        };
        let (handle, allocation) = unsafe { self.allocator.create_buffer(&buffer_ci, &alloc_ci) }
            .map_err(GfxError::vk("vmaCreateBuffer"))?;
        self.set_debug_name(handle, "Buffer", debug_name);
        self.buffer_allocations.borrow_mut().insert(handle, allocation);

        Ok(GfxBuffer { handle, size, usage })
    }

    fn write_host_buffer(&self, buffer: &GfxBuffer, offset: vk::DeviceSize, data: &[u8]) -> GfxResult<()> {
        if offset + data.len() as vk::DeviceSize > buffer.size {
            return Err(GfxError::BufferOverflow {
                size: buffer.size,
                offset,
                len: data.len() as u64,
            });
        }

        let mut allocations = self.buffer_allocations.borrow_mut();
        let allocation = allocations
            .get_mut(&buffer.handle)
            .ok_or_else(|| GfxError::UnknownHandle(format!("{:?}", buffer.handle)))?;
        unsafe {
            let mapped = self.allocator.map_memory(allocation).map_err(GfxError::vk("vmaMapMemory"))?;
            std::ptr::copy_nonoverlapping(data.as_ptr(), mapped.add(offset as usize), data.len());
            self.allocator.unmap_memory(allocation);
        }
        Ok(())
    }

    fn destroy_buffer(&self, buffer: GfxBuffer) {
        match self.buffer_allocations.borrow_mut().remove(&buffer.handle) {
            Some(mut allocation) => unsafe { self.allocator.destroy_buffer(buffer.handle, &mut allocation) },
            None => log::error!("destroy unknown buffer {:?}", buffer.handle),
        }
    }

    fn surface_support(&self) -> GfxResult<GfxSurfaceSupport> {
        self.surface()?.support(self.physical_device.vk_handle)
    }

    fn create_swapchain(&self, desc: &GfxSwapchainDesc, debug_name: &str) -> GfxResult<vk::SwapchainKHR> {
        let mut create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(self.surface()?.handle)
            .min_image_count(desc.min_image_count)
            .image_format(desc.surface_format.format)
            .image_color_space(desc.surface_format.color_space)
            .image_extent(desc.extent)
            .image_array_layers(1)
            .image_usage(desc.image_usage)
            .pre_transform(desc.pre_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(desc.present_mode)
            .clipped(true)
            .old_swapchain(desc.old_swapchain);
        // graphics 与 present 不是同一个 family 时，使用 CONCURRENT 避免 ownership transfer
        create_info = if desc.queue_family_indices.len() > 1 {
            create_info
                .image_sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(&desc.queue_family_indices)
        } else {
            create_info.image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        };

        let swapchain = unsafe { self.swapchain_pf.create_swapchain(&create_info, None) }
            .map_err(GfxError::vk("vkCreateSwapchainKHR"))?;
        self.set_debug_name(swapchain, "Swapchain", debug_name);
        Ok(swapchain)
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> GfxResult<Vec<vk::Image>> {
        unsafe { self.swapchain_pf.get_swapchain_images(swapchain) }.map_err(GfxError::vk("vkGetSwapchainImagesKHR"))
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        unsafe { self.swapchain_pf.destroy_swapchain(swapchain, None) }
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        timeout_ns: u64,
        semaphore: vk::Semaphore,
    ) -> GfxResult<GfxSurfaceStatus<u32>> {
        let result =
            unsafe { self.swapchain_pf.acquire_next_image(swapchain, timeout_ns, semaphore, vk::Fence::null()) };
        GfxSurfaceStatus::from_vk(result).map_err(GfxError::vk("vkAcquireNextImageKHR"))
    }

    fn queue_present(
        &self,
        queue: vk::Queue,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait_semaphores: &[vk::Semaphore],
    ) -> GfxResult<GfxSurfaceStatus<()>> {
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(wait_semaphores)
            .image_indices(&image_indices)
            .swapchains(std::slice::from_ref(&swapchain));

        let result = unsafe { self.swapchain_pf.queue_present(queue, &present_info) };
        GfxSurfaceStatus::from_vk(result.map(|is_suboptimal| ((), is_suboptimal)))
            .map_err(GfxError::vk("vkQueuePresentKHR"))
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        log::info!("destroying VulkanDevice");
        unsafe {
            if let Err(e) = self.device.device_wait_idle() {
                log::error!("device wait idle failed before destroy: {:?}", e);
            }

            for (image, mut allocation) in self.image_allocations.get_mut().drain() {
                log::warn!("image {:?} is not destroyed before device", image);
                self.allocator.destroy_image(image, &mut allocation);
            }
            for (buffer, mut allocation) in self.buffer_allocations.get_mut().drain() {
                log::warn!("buffer {:?} is not destroyed before device", buffer);
                self.allocator.destroy_buffer(buffer, &mut allocation);
            }
            ManuallyDrop::drop(&mut self.allocator);

            self.device.destroy_device(None);
        }

        if let Some(surface) = self.surface.take() {
            surface.destroy();
        }
        if let Some(debug_msger) = self.debug_msger.take() {
            debug_msger.destroy();
        }
        if let Some(instance) = self.instance.take() {
            instance.destroy();
        }
    }
}
