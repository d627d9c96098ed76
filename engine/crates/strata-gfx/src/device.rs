//! 设备接口
//!
//! frame graph 只通过这个 trait 访问 GPU。真实实现见 [`crate::foundation::device::VulkanDevice`]，
//! 测试中可以替换为只记录调用的实现。
//!
//! 所有 handle 都是 `vk` 中的原生类型；资源的创建与销毁必须成对调用。

use ash::vk;

use crate::{
    commands::submit_info::GfxSubmitInfo,
    error::GfxResult,
    resources::{
        buffer::GfxBuffer,
        image::{GfxImage, GfxImageDesc},
        render_pass::{GfxRenderPassBegin, GfxRenderPassDesc},
    },
    swapchain::{GfxSurfaceStatus, GfxSurfaceSupport, GfxSwapchainDesc},
};

pub trait GfxDevice {
    // sync
    fn create_fence(&self, signaled: bool, debug_name: &str) -> GfxResult<vk::Fence>;
    fn destroy_fence(&self, fence: vk::Fence);
    /// 等待所有 fence（logical AND）
    fn wait_for_fences(&self, fences: &[vk::Fence], timeout_ns: u64) -> GfxResult<()>;
    fn reset_fences(&self, fences: &[vk::Fence]) -> GfxResult<()>;
    fn create_semaphore(&self, debug_name: &str) -> GfxResult<vk::Semaphore>;
    fn destroy_semaphore(&self, semaphore: vk::Semaphore);
    fn wait_idle(&self) -> GfxResult<()>;

    // commands
    fn create_command_pool(&self, queue_family_index: u32, debug_name: &str) -> GfxResult<vk::CommandPool>;
    fn destroy_command_pool(&self, pool: vk::CommandPool);
    fn allocate_command_buffers(
        &self,
        pool: vk::CommandPool,
        count: u32,
        debug_name: &str,
    ) -> GfxResult<Vec<vk::CommandBuffer>>;
    fn reset_command_buffer(&self, cmd: vk::CommandBuffer) -> GfxResult<()>;
    fn begin_command_buffer(&self, cmd: vk::CommandBuffer) -> GfxResult<()>;
    fn end_command_buffer(&self, cmd: vk::CommandBuffer) -> GfxResult<()>;
    fn queue_submit(&self, queue: vk::Queue, submit_info: &GfxSubmitInfo, fence: vk::Fence) -> GfxResult<()>;

    // recording
    fn cmd_begin_render_pass(&self, cmd: vk::CommandBuffer, begin: &GfxRenderPassBegin<'_>);
    fn cmd_next_subpass(&self, cmd: vk::CommandBuffer);
    fn cmd_end_render_pass(&self, cmd: vk::CommandBuffer);
    fn cmd_set_viewport(&self, cmd: vk::CommandBuffer, viewport: vk::Viewport);
    fn cmd_set_scissor(&self, cmd: vk::CommandBuffer, scissor: vk::Rect2D);

    // resources
    fn create_image(&self, desc: &GfxImageDesc, debug_name: &str) -> GfxResult<GfxImage>;
    /// 只销毁 `ImageSource::Allocated` 的 image 的内存，view 总是会被销毁
    fn destroy_image(&self, image: GfxImage);
    fn create_image_view(
        &self,
        image: vk::Image,
        format: vk::Format,
        aspect: vk::ImageAspectFlags,
        debug_name: &str,
    ) -> GfxResult<vk::ImageView>;
    fn destroy_image_view(&self, view: vk::ImageView);
    fn create_render_pass(&self, desc: &GfxRenderPassDesc, debug_name: &str) -> GfxResult<vk::RenderPass>;
    fn destroy_render_pass(&self, render_pass: vk::RenderPass);
    fn create_framebuffer(
        &self,
        render_pass: vk::RenderPass,
        views: &[vk::ImageView],
        extent: vk::Extent2D,
        debug_name: &str,
    ) -> GfxResult<vk::Framebuffer>;
    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer);
    fn create_host_buffer(
        &self,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        debug_name: &str,
    ) -> GfxResult<GfxBuffer>;
    fn write_host_buffer(&self, buffer: &GfxBuffer, offset: vk::DeviceSize, data: &[u8]) -> GfxResult<()>;
    fn destroy_buffer(&self, buffer: GfxBuffer);

    // presentation
    fn surface_support(&self) -> GfxResult<GfxSurfaceSupport>;
    fn create_swapchain(&self, desc: &GfxSwapchainDesc, debug_name: &str) -> GfxResult<vk::SwapchainKHR>;
    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> GfxResult<Vec<vk::Image>>;
    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR);
    /// 完成时 signal `semaphore`
    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        timeout_ns: u64,
        semaphore: vk::Semaphore,
    ) -> GfxResult<GfxSurfaceStatus<u32>>;
    fn queue_present(
        &self,
        queue: vk::Queue,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait_semaphores: &[vk::Semaphore],
    ) -> GfxResult<GfxSurfaceStatus<()>>;
}
