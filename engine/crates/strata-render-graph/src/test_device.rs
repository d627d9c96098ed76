//! 只记录调用的设备，用于在没有 GPU 的环境中检查提交顺序与资源生命周期

use std::{
    cell::{Cell, RefCell},
    collections::{HashMap, VecDeque},
    rc::Rc,
};

use ash::vk::{self, Handle};
use strata_gfx::{
    commands::{
        queue::{GfxQueue, GfxQueueFamily, GfxQueueTable},
        submit_info::GfxSubmitInfo,
    },
    context::GfxContext,
    device::GfxDevice,
    error::{GfxError, GfxResult},
    resources::{
        buffer::GfxBuffer,
        image::{GfxImage, GfxImageDesc, ImageSource},
        render_pass::{GfxRenderPassBegin, GfxRenderPassDesc},
    },
    swapchain::{GfxSurfaceStatus, GfxSurfaceSupport, GfxSwapchainDesc},
};

pub(crate) const GRAPHICS_QUEUE: u64 = 0x100;
pub(crate) const COMPUTE_QUEUE: u64 = 0x200;

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Call {
    WaitFences(Vec<vk::Fence>),
    ResetFences(Vec<vk::Fence>),
    ResetCommandBuffer(vk::CommandBuffer),
    BeginCommandBuffer(vk::CommandBuffer),
    EndCommandBuffer(vk::CommandBuffer),
    Submit {
        queue: vk::Queue,
        info: GfxSubmitInfo,
        fence: vk::Fence,
    },
    BeginRenderPass {
        cmd: vk::CommandBuffer,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        extent: vk::Extent2D,
        clear_value_count: usize,
    },
    NextSubpass(vk::CommandBuffer),
    EndRenderPass(vk::CommandBuffer),
    SetViewport {
        cmd: vk::CommandBuffer,
        width: f32,
        height: f32,
        max_depth: f32,
    },
    SetScissor {
        cmd: vk::CommandBuffer,
        extent: vk::Extent2D,
    },
    CreateFramebuffer(vk::Framebuffer),
    DestroyFramebuffer(vk::Framebuffer),
    CreateImage(vk::Image),
    DestroyImage(vk::Image),
    CreateSemaphore(vk::Semaphore),
    DestroySemaphore(vk::Semaphore),
    CreateSwapchain {
        handle: vk::SwapchainKHR,
        old: vk::SwapchainKHR,
        extent: vk::Extent2D,
        min_image_count: u32,
    },
    DestroySwapchain(vk::SwapchainKHR),
    Acquire {
        swapchain: vk::SwapchainKHR,
        semaphore: vk::Semaphore,
    },
    Present {
        queue: vk::Queue,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        waits: Vec<vk::Semaphore>,
    },
    WaitIdle,
    WriteBuffer {
        buffer: vk::Buffer,
        len: usize,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum FenceState {
    Unsignaled,
    /// 已经提交，GPU 尚未完成
    Pending,
    Signaled,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Scripted {
    Optimal,
    Suboptimal,
    OutOfDate,
}

struct TestSwapchain {
    images: Vec<vk::Image>,
    next_image: usize,
}

pub(crate) struct TestDevice {
    next_handle: Cell<u64>,
    calls: RefCell<Vec<Call>>,
    fences: RefCell<HashMap<vk::Fence, FenceState>>,
    swapchains: RefCell<HashMap<vk::SwapchainKHR, TestSwapchain>>,
    live: RefCell<HashMap<&'static str, i64>>,
    surface: RefCell<GfxSurfaceSupport>,
    acquire_script: RefCell<VecDeque<Scripted>>,
    present_script: RefCell<VecDeque<Scripted>>,
    fail_fence_wait: Cell<bool>,
    /// 还能成功创建的 framebuffer 数量，None 表示不限制
    framebuffer_budget: Cell<Option<usize>>,
}

// new & init
impl TestDevice {
    pub(crate) fn new(extent: vk::Extent2D) -> Rc<Self> {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 3,
            current_extent: extent,
            min_image_extent: vk::Extent2D { width: 1, height: 1 },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
            ..Default::default()
        };
        Rc::new(Self {
            next_handle: Cell::new(0x1000),
            calls: RefCell::new(vec![]),
            fences: RefCell::new(HashMap::new()),
            swapchains: RefCell::new(HashMap::new()),
            live: RefCell::new(HashMap::new()),
            surface: RefCell::new(GfxSurfaceSupport {
                capabilities,
                formats: vec![
                    vk::SurfaceFormatKHR {
                        format: vk::Format::B8G8R8A8_SRGB,
                        color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                    },
                    vk::SurfaceFormatKHR {
                        format: vk::Format::A2B10G10R10_UNORM_PACK32,
                        color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                    },
                ],
                present_modes: vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
            }),
            acquire_script: RefCell::new(VecDeque::new()),
            present_script: RefCell::new(VecDeque::new()),
            fail_fence_wait: Cell::new(false),
            framebuffer_budget: Cell::new(None),
        })
    }

    /// graphics 与 present 共用一个 queue，compute 使用独立的 family
    pub(crate) fn context(self: &Rc<Self>) -> GfxContext {
        let family = |index: u32, flags: vk::QueueFlags| GfxQueueFamily {
            name: format!("family-{index}"),
            queue_family_index: index,
            queue_flags: flags,
            queue_count: 1,
        };
        let graphics = GfxQueue::new(
            vk::Queue::from_raw(GRAPHICS_QUEUE),
            family(0, vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE),
        );
        let compute = GfxQueue::new(vk::Queue::from_raw(COMPUTE_QUEUE), family(1, vk::QueueFlags::COMPUTE));
        let device: Rc<dyn GfxDevice> = self.clone();
        GfxContext::new(
            device,
            GfxQueueTable {
                present: graphics.clone(),
                graphics,
                compute,
            },
        )
    }
}

// script & inspect
impl TestDevice {
    pub(crate) fn push_acquire(&self, status: Scripted) {
        self.acquire_script.borrow_mut().push_back(status);
    }

    pub(crate) fn push_present(&self, status: Scripted) {
        self.present_script.borrow_mut().push_back(status);
    }

    pub(crate) fn set_surface_extent(&self, extent: vk::Extent2D) {
        self.surface.borrow_mut().capabilities.current_extent = extent;
    }

    pub(crate) fn set_fail_fence_wait(&self, fail: bool) {
        self.fail_fence_wait.set(fail);
    }

    pub(crate) fn set_framebuffer_budget(&self, budget: Option<usize>) {
        self.framebuffer_budget.set(budget);
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub(crate) fn clear_calls(&self) {
        self.calls.borrow_mut().clear();
    }

    pub(crate) fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.borrow().iter().filter(|call| pred(call)).count()
    }

    pub(crate) fn submits(&self) -> Vec<(vk::Queue, GfxSubmitInfo, vk::Fence)> {
        self.calls
            .borrow()
            .iter()
            .filter_map(|call| match call {
                Call::Submit { queue, info, fence } => Some((*queue, info.clone(), *fence)),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn fence_state(&self, fence: vk::Fence) -> FenceState {
        self.fences.borrow()[&fence]
    }

    /// 尚未被 reset 的 fence 数量
    pub(crate) fn unreset_fences(&self, fences: &[vk::Fence]) -> usize {
        fences.iter().filter(|fence| self.fence_state(**fence) != FenceState::Unsignaled).count()
    }

    /// 某种资源当前存活的数量
    pub(crate) fn live(&self, kind: &'static str) -> i64 {
        self.live.borrow().get(kind).copied().unwrap_or(0)
    }
}

// tools
impl TestDevice {
    fn next<H: Handle>(&self) -> H {
        let raw = self.next_handle.get();
        self.next_handle.set(raw + 1);
        H::from_raw(raw)
    }

    fn record(&self, call: Call) {
        self.calls.borrow_mut().push(call);
    }

    fn add_live(&self, kind: &'static str, delta: i64) {
        *self.live.borrow_mut().entry(kind).or_insert(0) += delta;
    }

    fn pop_script(script: &RefCell<VecDeque<Scripted>>) -> Scripted {
        script.borrow_mut().pop_front().unwrap_or(Scripted::Optimal)
    }
}

impl GfxDevice for TestDevice {
    fn create_fence(&self, signaled: bool, _debug_name: &str) -> GfxResult<vk::Fence> {
        let fence = self.next();
        let state = if signaled { FenceState::Signaled } else { FenceState::Unsignaled };
        self.fences.borrow_mut().insert(fence, state);
        self.add_live("fence", 1);
        Ok(fence)
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        self.fences.borrow_mut().remove(&fence);
        self.add_live("fence", -1);
    }

    fn wait_for_fences(&self, fences: &[vk::Fence], _timeout_ns: u64) -> GfxResult<()> {
        self.record(Call::WaitFences(fences.to_vec()));
        if self.fail_fence_wait.get() {
            return Err(GfxError::Vulkan {
                call: "vkWaitForFences",
                result: vk::Result::ERROR_DEVICE_LOST,
            });
        }

        let mut states = self.fences.borrow_mut();
        for fence in fences {
            let state = states.get_mut(fence).expect("unknown fence");
            match state {
                // GPU 立即完成
                FenceState::Pending => *state = FenceState::Signaled,
                FenceState::Signaled => (),
                FenceState::Unsignaled => panic!("waiting on fence {:?} that was never submitted", fence),
            }
        }
        Ok(())
    }

    fn reset_fences(&self, fences: &[vk::Fence]) -> GfxResult<()> {
        self.record(Call::ResetFences(fences.to_vec()));
        let mut states = self.fences.borrow_mut();
        for fence in fences {
            let state = states.get_mut(fence).expect("unknown fence");
            assert_ne!(*state, FenceState::Pending, "reset fence {:?} while it is still pending", fence);
            *state = FenceState::Unsignaled;
        }
        Ok(())
    }

    fn create_semaphore(&self, _debug_name: &str) -> GfxResult<vk::Semaphore> {
        let semaphore = self.next();
        self.record(Call::CreateSemaphore(semaphore));
        self.add_live("semaphore", 1);
        Ok(semaphore)
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        self.record(Call::DestroySemaphore(semaphore));
        self.add_live("semaphore", -1);
    }

    fn wait_idle(&self) -> GfxResult<()> {
        self.record(Call::WaitIdle);
        for state in self.fences.borrow_mut().values_mut() {
            if *state == FenceState::Pending {
                *state = FenceState::Signaled;
            }
        }
        Ok(())
    }

    fn create_command_pool(&self, _queue_family_index: u32, _debug_name: &str) -> GfxResult<vk::CommandPool> {
        self.add_live("command_pool", 1);
        Ok(self.next())
    }

    fn destroy_command_pool(&self, _pool: vk::CommandPool) {
        self.add_live("command_pool", -1);
    }

    fn allocate_command_buffers(
        &self,
        _pool: vk::CommandPool,
        count: u32,
        _debug_name: &str,
    ) -> GfxResult<Vec<vk::CommandBuffer>> {
        Ok((0..count).map(|_| self.next()).collect())
    }

    fn reset_command_buffer(&self, cmd: vk::CommandBuffer) -> GfxResult<()> {
        self.record(Call::ResetCommandBuffer(cmd));
        Ok(())
    }

    fn begin_command_buffer(&self, cmd: vk::CommandBuffer) -> GfxResult<()> {
        self.record(Call::BeginCommandBuffer(cmd));
        Ok(())
    }

    fn end_command_buffer(&self, cmd: vk::CommandBuffer) -> GfxResult<()> {
        self.record(Call::EndCommandBuffer(cmd));
        Ok(())
    }

    fn queue_submit(&self, queue: vk::Queue, submit_info: &GfxSubmitInfo, fence: vk::Fence) -> GfxResult<()> {
        if fence != vk::Fence::null() {
            let mut states = self.fences.borrow_mut();
            let state = states.get_mut(&fence).expect("unknown fence");
            assert_eq!(*state, FenceState::Unsignaled, "fence {:?} submitted without reset", fence);
            *state = FenceState::Pending;
        }
        self.record(Call::Submit {
            queue,
            info: submit_info.clone(),
            fence,
        });
        Ok(())
    }

    fn cmd_begin_render_pass(&self, cmd: vk::CommandBuffer, begin: &GfxRenderPassBegin<'_>) {
        self.record(Call::BeginRenderPass {
            cmd,
            render_pass: begin.render_pass,
            framebuffer: begin.framebuffer,
            extent: begin.render_area.extent,
            clear_value_count: begin.clear_values.len(),
        });
    }

    fn cmd_next_subpass(&self, cmd: vk::CommandBuffer) {
        self.record(Call::NextSubpass(cmd));
    }

    fn cmd_end_render_pass(&self, cmd: vk::CommandBuffer) {
        self.record(Call::EndRenderPass(cmd));
    }

    fn cmd_set_viewport(&self, cmd: vk::CommandBuffer, viewport: vk::Viewport) {
        self.record(Call::SetViewport {
            cmd,
            width: viewport.width,
            height: viewport.height,
            max_depth: viewport.max_depth,
        });
    }

    fn cmd_set_scissor(&self, cmd: vk::CommandBuffer, scissor: vk::Rect2D) {
        self.record(Call::SetScissor {
            cmd,
            extent: scissor.extent,
        });
    }

    fn create_image(&self, desc: &GfxImageDesc, debug_name: &str) -> GfxResult<GfxImage> {
        let handle = self.next();
        let view = self.create_image_view(handle, desc.format, desc.aspect, debug_name)?;
        self.record(Call::CreateImage(handle));
        self.add_live("image", 1);
        Ok(GfxImage {
            handle,
            view,
            desc: *desc,
            source: ImageSource::Allocated,
        })
    }

    fn destroy_image(&self, image: GfxImage) {
        self.destroy_image_view(image.view);
        if image.source == ImageSource::Allocated {
            self.record(Call::DestroyImage(image.handle));
            self.add_live("image", -1);
        }
    }

    fn create_image_view(
        &self,
        _image: vk::Image,
        _format: vk::Format,
        _aspect: vk::ImageAspectFlags,
        _debug_name: &str,
    ) -> GfxResult<vk::ImageView> {
        self.add_live("image_view", 1);
        Ok(self.next())
    }

    fn destroy_image_view(&self, _view: vk::ImageView) {
        self.add_live("image_view", -1);
    }

    fn create_render_pass(&self, desc: &GfxRenderPassDesc, _debug_name: &str) -> GfxResult<vk::RenderPass> {
        for subpass in &desc.subpasses {
            assert!(
                subpass.resolves.is_empty() || subpass.resolves.len() == subpass.colors.len(),
                "resolve attachments must match color attachments"
            );
        }
        self.add_live("render_pass", 1);
        Ok(self.next())
    }

    fn destroy_render_pass(&self, _render_pass: vk::RenderPass) {
        self.add_live("render_pass", -1);
    }

    fn create_framebuffer(
        &self,
        _render_pass: vk::RenderPass,
        _views: &[vk::ImageView],
        _extent: vk::Extent2D,
        _debug_name: &str,
    ) -> GfxResult<vk::Framebuffer> {
        match self.framebuffer_budget.get() {
            Some(0) => {
                return Err(GfxError::Vulkan {
                    call: "vkCreateFramebuffer",
                    result: vk::Result::ERROR_OUT_OF_DEVICE_MEMORY,
                });
            }
            Some(budget) => self.framebuffer_budget.set(Some(budget - 1)),
            None => (),
        }
        let framebuffer = self.next();
        self.record(Call::CreateFramebuffer(framebuffer));
        self.add_live("framebuffer", 1);
        Ok(framebuffer)
    }

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        self.record(Call::DestroyFramebuffer(framebuffer));
        self.add_live("framebuffer", -1);
    }

    fn create_host_buffer(
        &self,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        _debug_name: &str,
    ) -> GfxResult<GfxBuffer> {
        self.add_live("buffer", 1);
        Ok(GfxBuffer {
            handle: self.next(),
            size,
            usage,
        })
    }

    fn write_host_buffer(&self, buffer: &GfxBuffer, offset: vk::DeviceSize, data: &[u8]) -> GfxResult<()> {
        assert!(offset + data.len() as u64 <= buffer.size);
        self.record(Call::WriteBuffer {
            buffer: buffer.handle,
            len: data.len(),
        });
        Ok(())
    }

    fn destroy_buffer(&self, _buffer: GfxBuffer) {
        self.add_live("buffer", -1);
    }

    fn surface_support(&self) -> GfxResult<GfxSurfaceSupport> {
        Ok(self.surface.borrow().clone())
    }

    fn create_swapchain(&self, desc: &GfxSwapchainDesc, _debug_name: &str) -> GfxResult<vk::SwapchainKHR> {
        assert!(desc.extent.width > 0 && desc.extent.height > 0, "swapchain extent must be non-zero");
        let handle = self.next();
        let images = (0..desc.min_image_count).map(|_| self.next()).collect();
        self.swapchains.borrow_mut().insert(handle, TestSwapchain { images, next_image: 0 });
        self.record(Call::CreateSwapchain {
            handle,
            old: desc.old_swapchain,
            extent: desc.extent,
            min_image_count: desc.min_image_count,
        });
        self.add_live("swapchain", 1);
        Ok(handle)
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> GfxResult<Vec<vk::Image>> {
        Ok(self.swapchains.borrow()[&swapchain].images.clone())
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        self.swapchains.borrow_mut().remove(&swapchain);
        self.record(Call::DestroySwapchain(swapchain));
        self.add_live("swapchain", -1);
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        _timeout_ns: u64,
        semaphore: vk::Semaphore,
    ) -> GfxResult<GfxSurfaceStatus<u32>> {
        self.record(Call::Acquire { swapchain, semaphore });
        let scripted = Self::pop_script(&self.acquire_script);
        if scripted == Scripted::OutOfDate {
            return Ok(GfxSurfaceStatus::OutOfDate);
        }

        let mut swapchains = self.swapchains.borrow_mut();
        let entry = swapchains.get_mut(&swapchain).expect("acquire on destroyed swapchain");
        let image_index = (entry.next_image % entry.images.len()) as u32;
        entry.next_image += 1;
        Ok(match scripted {
            Scripted::Suboptimal => GfxSurfaceStatus::Suboptimal(image_index),
            _ => GfxSurfaceStatus::Optimal(image_index),
        })
    }

    fn queue_present(
        &self,
        queue: vk::Queue,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait_semaphores: &[vk::Semaphore],
    ) -> GfxResult<GfxSurfaceStatus<()>> {
        assert!(self.swapchains.borrow().contains_key(&swapchain), "present on destroyed swapchain");
        self.record(Call::Present {
            queue,
            swapchain,
            image_index,
            waits: wait_semaphores.to_vec(),
        });
        Ok(match Self::pop_script(&self.present_script) {
            Scripted::Optimal => GfxSurfaceStatus::Optimal(()),
            Scripted::Suboptimal => GfxSurfaceStatus::Suboptimal(()),
            Scripted::OutOfDate => GfxSurfaceStatus::OutOfDate,
        })
    }
}
