//! 每帧的调度：`begin_frame -> update -> draw -> end_frame`
//!
//! 只在单个 CPU 线程上运行，唯一会阻塞的地方是 `begin_frame` 中对 slot fence 的等待。
//! 可恢复的 surface 状态（suboptimal / out of date / 最小化）不会作为错误返回；
//! 设备错误（device lost 等）无法恢复，直接 panic。

use std::rc::Rc;

use ash::vk;
use strata_gfx::{context::GfxContext, error::GfxResult};

use crate::{
    frame_ring::FrameRing,
    frame_uniforms::{CameraState, FrameUniformRing},
    render_graph::{RenderGraph, submission::compile_submissions},
    settings::RendererSettings,
    swapchain::{AcquireOutcome, PresentOutcome, Swapchain},
    window::WindowSurface,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameEnd {
    Presented,
    /// present 时发现 swapchain 已经过期，已经重建
    Stale,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameState {
    Idle,
    FrameStarted,
    Ended(FrameEnd),
}

/// 构建 render graph 时可以使用的信息
#[derive(Clone, Copy, Debug)]
pub struct GraphBuildInfo {
    /// frame slot 的数量，也是 graph 中每个 pass 的 image 数量
    pub slot_count: usize,
    pub surface_extent: vk::Extent2D,
    pub surface_format: vk::Format,
}

pub struct Scheduler {
    // 字段的声明顺序就是销毁顺序
    graph: RenderGraph,
    swapchain: Swapchain,
    ring: FrameRing,
    uniforms: FrameUniformRing,

    ctx: GfxContext,
    window: Rc<dyn WindowSurface>,
    camera: CameraState,

    state: FrameState,
    slot_index: usize,
    image_index: u32,
    frame_id: u64,

    /// 窗口通知了 resize，在下一次 begin_frame 时处理
    resize_requested: bool,
    /// swapchain 需要重建，但是当时窗口尺寸为 0
    swapchain_dirty: bool,
}
// new & init
impl Scheduler {
    /// frame slot 的数量等于 swapchain 初始的 image 数量，之后不再改变
    pub fn new(
        ctx: &GfxContext,
        window: Rc<dyn WindowSurface>,
        settings: &RendererSettings,
        build_graph: impl FnOnce(&GraphBuildInfo) -> GfxResult<RenderGraph>,
    ) -> GfxResult<Self> {
        let _span = tracy_client::span!("Scheduler::new");
        let swapchain = Swapchain::new(ctx, window.current_extent(), settings)?;
        let build_info = GraphBuildInfo {
            slot_count: swapchain.image_count(),
            surface_extent: swapchain.extent(),
            surface_format: swapchain.format(),
        };

        let graph = build_graph(&build_info)?;
        graph.validate()?;
        let ring = FrameRing::new(ctx, build_info.slot_count, &graph.stages())?;
        let uniforms = FrameUniformRing::new(ctx, build_info.slot_count)?;

        let mut camera = CameraState::default();
        camera.set_viewport_extent(swapchain.extent());

        log::info!(
            "create scheduler: {} frame slots, {} stages",
            build_info.slot_count,
            graph.nodes().len()
        );
        Ok(Self {
            graph,
            swapchain,
            ring,
            uniforms,
            ctx: ctx.clone(),
            window,
            camera,
            state: FrameState::Idle,
            slot_index: 0,
            image_index: 0,
            frame_id: 0,
            resize_requested: false,
            swapchain_dirty: false,
        })
    }

    /// 初始化 graph 与 swapchain 输出 pass 中注册的所有 program
    pub fn init_programs(&self) -> GfxResult<()> {
        self.graph.init_programs()?;
        self.swapchain.output_pass().init_programs()
    }
}
// getters
impl Scheduler {
    #[inline]
    pub fn state(&self) -> FrameState {
        self.state
    }

    #[inline]
    pub fn slot_index(&self) -> usize {
        self.slot_index
    }

    #[inline]
    pub fn image_index(&self) -> u32 {
        self.image_index
    }

    /// 已经成功 present 的帧数
    #[inline]
    pub fn frame_id(&self) -> u64 {
        self.frame_id
    }

    #[inline]
    pub fn swapchain(&self) -> &Swapchain {
        &self.swapchain
    }

    #[inline]
    pub fn swapchain_mut(&mut self) -> &mut Swapchain {
        &mut self.swapchain
    }

    #[inline]
    pub fn graph(&self) -> &RenderGraph {
        &self.graph
    }

    #[inline]
    pub fn graph_mut(&mut self) -> &mut RenderGraph {
        &mut self.graph
    }

    #[inline]
    pub fn ring(&self) -> &FrameRing {
        &self.ring
    }

    #[inline]
    pub fn camera(&self) -> &CameraState {
        &self.camera
    }

    #[inline]
    pub fn camera_mut(&mut self) -> &mut CameraState {
        &mut self.camera
    }

    #[inline]
    pub fn uniforms(&self) -> &FrameUniformRing {
        &self.uniforms
    }
}
// update
impl Scheduler {
    /// 窗口尺寸变化，在下一次 `begin_frame` 时重建 swapchain
    pub fn notify_resized(&mut self) {
        self.resize_requested = true;
    }

    /// 返回 false 表示这一帧不应该继续：重复调用、窗口暂停，或者 swapchain 需要重建
    pub fn begin_frame(&mut self) -> bool {
        let _span = tracy_client::span!("Scheduler::begin_frame");
        if self.state == FrameState::FrameStarted {
            log::warn!("begin_frame is called twice without end_frame, frame slot {}", self.slot_index);
            return false;
        }
        if self.window.is_paused() {
            return false;
        }

        let slot = self.slot_index;
        self.ring.slot_wait(slot);

        if (self.resize_requested || self.swapchain_dirty) && !fatal("rebuild swapchain", self.rebuild_swapchain()) {
            return false;
        }

        fatal("reset command buffers", self.ring.reset_command_buffers(slot));
        let outcome = fatal("acquire next image", self.swapchain.acquire(self.ring.slot(slot)));
        match outcome {
            AcquireOutcome::Stale => {
                fatal("rebuild swapchain", self.rebuild_swapchain());
                self.state = FrameState::Idle;
                false
            }
            AcquireOutcome::Ready(image_index) => {
                self.image_index = image_index;
                fatal("begin command buffers", self.ring.begin_command_buffers(slot));
                self.state = FrameState::FrameStarted;
                true
            }
        }
    }

    pub fn update(&mut self, delta_time: f32) {
        let _span = tracy_client::span!("Scheduler::update");
        if self.state != FrameState::FrameStarted {
            log::warn!("update is called without begin_frame");
            return;
        }

        fatal("write frame uniforms", self.uniforms.write_if_changed(self.slot_index, &self.camera));
        self.graph.update(delta_time);
        self.swapchain.output_pass().update(delta_time);
    }

    pub fn draw(&mut self) {
        let _span = tracy_client::span!("Scheduler::draw");
        if self.state != FrameState::FrameStarted {
            log::warn!("draw is called without begin_frame");
            return;
        }

        self.graph.record(self.ring.slot(self.slot_index), &self.swapchain, self.image_index);
    }

    /// 按 stage 顺序提交，然后 present。只有成功 present 时才前进到下一个 slot
    pub fn end_frame(&mut self) -> bool {
        let _span = tracy_client::span!("Scheduler::end_frame");
        if self.state != FrameState::FrameStarted {
            log::warn!("end_frame is called without begin_frame");
            return false;
        }

        let slot = self.slot_index;
        if self.window.is_paused() {
            // acquire 已经 signal 了 image-available，重建时会重新创建
            self.ring.abandon(slot);
            self.swapchain_dirty = true;
            self.state = FrameState::Idle;
            return false;
        }

        let device = self.ctx.device();
        for submission in compile_submissions(self.ring.slot(slot)) {
            let cmd = submission.info.command_buffers[0];
            fatal("end command buffer", device.end_command_buffer(cmd));
            let queue = self.ctx.queue(submission.queue).handle();
            fatal("queue submit", device.queue_submit(queue, &submission.info, submission.fence));
            self.ring.mark_submitted(slot, submission.stage);
        }

        let outcome = fatal("present", self.swapchain.present(self.ring.slot(slot), self.image_index));
        match outcome {
            PresentOutcome::Presented => {
                self.slot_index = (slot + 1) % self.ring.len();
                self.frame_id += 1;
                self.state = FrameState::Ended(FrameEnd::Presented);
                true
            }
            PresentOutcome::Stale => {
                fatal("rebuild swapchain", self.rebuild_swapchain());
                self.state = FrameState::Ended(FrameEnd::Stale);
                false
            }
        }
    }
}
// tools
impl Scheduler {
    /// 等待 device idle 之后重建 swapchain，并 resize 跟随 surface 的 pass
    ///
    /// 窗口尺寸为 0 时推迟到下一次 begin_frame，返回 false
    fn rebuild_swapchain(&mut self) -> GfxResult<bool> {
        let _span = tracy_client::span!("Scheduler::rebuild_swapchain");
        let extent = self.window.current_extent();
        if extent.width == 0 || extent.height == 0 {
            self.swapchain_dirty = true;
            return Ok(false);
        }

        self.ctx.device().wait_idle()?;
        self.swapchain.rebuild(extent)?;
        self.ring.recycle_semaphores(self.slot_index)?;
        let surface_extent = self.swapchain.extent();
        self.graph.resize_surface_relative(self.ring.len(), surface_extent)?;
        self.camera.set_viewport_extent(surface_extent);

        self.resize_requested = false;
        self.swapchain_dirty = false;
        log::info!(
            "swapchain rebuilt: {}x{}, {} images",
            surface_extent.width,
            surface_extent.height,
            self.swapchain.image_count()
        );
        Ok(true)
    }
}
// destroy
impl Drop for Scheduler {
    fn drop(&mut self) {
        if let Err(e) = self.ctx.device().wait_idle() {
            log::error!("failed to wait idle before destroying scheduler: {}", e);
        }
    }
}

/// 设备错误无法恢复
fn fatal<T>(what: &str, result: GfxResult<T>) -> T {
    match result {
        Ok(value) => value,
        Err(e) => {
            log::error!("{} failed: {}", what, e);
            panic!("{} failed: {}", what, e);
        }
    }
}
