//! N 个 frame slot 组成的环
//!
//! 每个 slot 持有一个 image-available semaphore，以及每个 stage 各自的
//! fence / completion semaphore / command buffer。slot 在 ring 创建时一次性创建，
//! 只在 ring 销毁时释放。

use ash::vk;
use itertools::Itertools;
use strata_gfx::{commands::queue::QueueKind, context::GfxContext, error::GfxResult};

/// `Idle -> Recording -> Submitted -> Retiring -> Idle`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotState {
    Idle,
    /// command buffer 正在录制
    Recording,
    /// 至少一个 stage 已经提交给 GPU
    Submitted,
    /// 正在等待 fence
    Retiring,
}

/// 一个 stage 的声明：名称与提交的 queue
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StageDecl {
    pub name: String,
    pub queue: QueueKind,
}
impl StageDecl {
    pub fn new(name: impl Into<String>, queue: QueueKind) -> Self {
        Self {
            name: name.into(),
            queue,
        }
    }
}

pub struct StageSync {
    name: String,
    queue: QueueKind,
    fence: vk::Fence,
    /// stage 完成时 signal，下一个 stage 或者 present 等待
    completion: vk::Semaphore,
    command_buffer: vk::CommandBuffer,
    /// fence 是否真的被提交过，没有提交过的 fence 不能等待
    submitted: bool,
}
// getters
impl StageSync {
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn queue(&self) -> QueueKind {
        self.queue
    }

    #[inline]
    pub fn fence(&self) -> vk::Fence {
        self.fence
    }

    #[inline]
    pub fn completion(&self) -> vk::Semaphore {
        self.completion
    }

    #[inline]
    pub fn command_buffer(&self) -> vk::CommandBuffer {
        self.command_buffer
    }

    #[inline]
    pub fn is_submitted(&self) -> bool {
        self.submitted
    }
}

pub struct FrameSlot {
    index: usize,
    image_available: vk::Semaphore,
    stages: Vec<StageSync>,
    state: SlotState,
}
// getters
impl FrameSlot {
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    #[inline]
    pub fn image_available(&self) -> vk::Semaphore {
        self.image_available
    }

    #[inline]
    pub fn stages(&self) -> &[StageSync] {
        &self.stages
    }

    #[inline]
    pub fn stage(&self, stage: usize) -> &StageSync {
        &self.stages[stage]
    }

    /// 最后一个 stage，present 需要等待它的 completion semaphore
    #[inline]
    pub fn final_stage(&self) -> Option<&StageSync> {
        self.stages.last()
    }

    #[inline]
    pub fn state(&self) -> SlotState {
        self.state
    }

    /// 是否有需要等待的 fence
    #[inline]
    pub fn in_flight(&self) -> bool {
        self.stages.iter().any(|stage| stage.submitted)
    }

    #[inline]
    pub fn pending_fences(&self) -> usize {
        self.stages.iter().filter(|stage| stage.submitted).count()
    }
}

pub struct FrameRing {
    ctx: GfxContext,
    slots: Vec<FrameSlot>,
    /// (queue family, pool)，每个 family 一个
    command_pools: Vec<(u32, vk::CommandPool)>,
}
// new & init
impl FrameRing {
    pub fn new(ctx: &GfxContext, slot_count: usize, stages: &[StageDecl]) -> GfxResult<Self> {
        let _span = tracy_client::span!("FrameRing::new");
        assert!(slot_count > 0, "frame ring needs at least one slot");

        let mut ring = Self {
            ctx: ctx.clone(),
            slots: Vec::with_capacity(slot_count),
            command_pools: vec![],
        };
        let device = ctx.device();

        let families = stages.iter().map(|stage| ctx.queue(stage.queue).family_index()).unique().collect_vec();
        for family in families {
            let pool = device.create_command_pool(family, &format!("frame-ring-family-{}", family))?;
            ring.command_pools.push((family, pool));
        }

        for index in 0..slot_count {
            let image_available = device.create_semaphore(&format!("image-available-{}", index))?;
            ring.slots.push(FrameSlot {
                index,
                image_available,
                stages: Vec::with_capacity(stages.len()),
                state: SlotState::Idle,
            });

            for decl in stages {
                let debug_name = format!("{}-{}", decl.name, index);
                let pool = ring.pool_of(decl.queue);
                let fence = device.create_fence(false, &debug_name)?;
                let completion = match device.create_semaphore(&debug_name) {
                    Ok(semaphore) => semaphore,
                    Err(e) => {
                        device.destroy_fence(fence);
                        return Err(e);
                    }
                };
                let command_buffer = match device.allocate_command_buffers(pool, 1, &debug_name) {
                    Ok(cmds) => cmds[0],
                    Err(e) => {
                        device.destroy_fence(fence);
                        device.destroy_semaphore(completion);
                        return Err(e);
                    }
                };
                ring.slots[index].stages.push(StageSync {
                    name: decl.name.clone(),
                    queue: decl.queue,
                    fence,
                    completion,
                    command_buffer,
                    submitted: false,
                });
            }
        }

        log::info!("create frame ring: {} slots, {} stages", slot_count, stages.len());
        Ok(ring)
    }

    fn pool_of(&self, queue: QueueKind) -> vk::CommandPool {
        let family = self.ctx.queue(queue).family_index();
        self.command_pools
            .iter()
            .find(|(f, _)| *f == family)
            .map(|(_, pool)| *pool)
            .unwrap_or_default()
    }
}
// getters
impl FrameRing {
    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    #[inline]
    pub fn stage_count(&self) -> usize {
        self.slots.first().map_or(0, |slot| slot.stages.len())
    }

    /// 不会阻塞
    #[inline]
    pub fn acquire(&mut self, slot_index: usize) -> &mut FrameSlot {
        &mut self.slots[slot_index]
    }

    #[inline]
    pub fn slot(&self, slot_index: usize) -> &FrameSlot {
        &self.slots[slot_index]
    }
}
// update
impl FrameRing {
    /// 等待 slot 中所有已经提交的 fence（AND），然后 reset
    ///
    /// 等待失败意味着 device lost 或者 GPU hang，无法恢复，直接 panic
    pub fn slot_wait(&mut self, slot_index: usize) {
        let _span = tracy_client::span!("FrameRing::slot_wait");
        let device = self.ctx.device();
        let slot = &mut self.slots[slot_index];
        let fences = slot.stages.iter().filter(|stage| stage.submitted).map(|stage| stage.fence).collect_vec();
        if fences.is_empty() {
            slot.state = SlotState::Idle;
            return;
        }

        slot.state = SlotState::Retiring;
        if let Err(e) = device.wait_for_fences(&fences, u64::MAX) {
            log::error!("failed to wait fences of frame slot {}: {}", slot_index, e);
            panic!("failed to wait fences of frame slot {}: {}", slot_index, e);
        }
        if let Err(e) = device.reset_fences(&fences) {
            log::error!("failed to reset fences of frame slot {}: {}", slot_index, e);
            panic!("failed to reset fences of frame slot {}: {}", slot_index, e);
        }

        slot.stages.iter_mut().for_each(|stage| stage.submitted = false);
        slot.state = SlotState::Idle;
    }

    pub fn reset_command_buffers(&self, slot_index: usize) -> GfxResult<()> {
        let device = self.ctx.device();
        for stage in &self.slots[slot_index].stages {
            device.reset_command_buffer(stage.command_buffer)?;
        }
        Ok(())
    }

    /// 所有 stage 的 command buffer 开始录制，slot 进入 Recording
    pub fn begin_command_buffers(&mut self, slot_index: usize) -> GfxResult<()> {
        let device = self.ctx.device();
        let slot = &mut self.slots[slot_index];
        assert_eq!(slot.state, SlotState::Idle, "frame slot {} begins recording while {:?}", slot_index, slot.state);
        for stage in &slot.stages {
            device.begin_command_buffer(stage.command_buffer)?;
        }
        slot.state = SlotState::Recording;
        Ok(())
    }

    /// stage 的 fence 已经随 submit 一起提交
    pub fn mark_submitted(&mut self, slot_index: usize, stage: usize) {
        let slot = &mut self.slots[slot_index];
        assert!(
            matches!(slot.state, SlotState::Recording | SlotState::Submitted),
            "frame slot {} submits while {:?}",
            slot_index,
            slot.state
        );
        let stage = &mut slot.stages[stage];
        assert!(!stage.submitted, "stage {} of frame slot {} submitted twice", stage.name, slot_index);
        stage.submitted = true;
        slot.state = SlotState::Submitted;
    }

    /// 放弃正在录制的 frame，不提交任何内容
    pub fn abandon(&mut self, slot_index: usize) {
        let slot = &mut self.slots[slot_index];
        if slot.state == SlotState::Recording {
            log::warn!("frame slot {} abandoned before submission", slot_index);
            slot.state = SlotState::Idle;
        }
    }

    /// 重新创建 slot 中的所有 semaphore
    ///
    /// acquire 之后没有被等待的 semaphore 仍然处于 signaled 状态，不能再次使用。
    /// 调用者需要保证 device 已经 idle
    pub fn recycle_semaphores(&mut self, slot_index: usize) -> GfxResult<()> {
        let device = self.ctx.device();
        let slot = &mut self.slots[slot_index];

        let image_available = device.create_semaphore(&format!("image-available-{}", slot_index))?;
        device.destroy_semaphore(std::mem::replace(&mut slot.image_available, image_available));
        for stage in &mut slot.stages {
            let completion = device.create_semaphore(&format!("{}-{}", stage.name, slot_index))?;
            device.destroy_semaphore(std::mem::replace(&mut stage.completion, completion));
        }
        Ok(())
    }
}
// destroy
impl Drop for FrameRing {
    fn drop(&mut self) {
        let device = self.ctx.device();
        if let Err(e) = device.wait_idle() {
            log::error!("failed to wait idle before destroying frame ring: {}", e);
        }
        for slot in self.slots.drain(..) {
            device.destroy_semaphore(slot.image_available);
            for stage in slot.stages {
                device.destroy_fence(stage.fence);
                device.destroy_semaphore(stage.completion);
            }
        }
        // command buffer 随 pool 一起释放
        for (_, pool) in self.command_pools.drain(..) {
            device.destroy_command_pool(pool);
        }
        log::debug!("destroy frame ring");
    }
}

#[cfg(test)]
mod tests {
    use strata_gfx::commands::submit_info::GfxSubmitInfo;

    use super::*;
    use crate::test_device::{Call, FenceState, TestDevice};

    const EXTENT: vk::Extent2D = vk::Extent2D {
        width: 800,
        height: 600,
    };

    fn stages() -> Vec<StageDecl> {
        vec![
            StageDecl::new("depth", QueueKind::Graphics),
            StageDecl::new("update", QueueKind::Compute),
            StageDecl::new("present", QueueKind::Graphics),
        ]
    }

    fn submit_stage(ring: &mut FrameRing, ctx: &GfxContext, slot: usize, stage: usize) {
        let sync = ring.slot(slot).stage(stage);
        let info = GfxSubmitInfo::new(&[sync.command_buffer()]);
        ctx.device().queue_submit(ctx.queue(sync.queue()).handle(), &info, sync.fence()).unwrap();
        ring.mark_submitted(slot, stage);
    }

    #[test]
    fn test_create_and_destroy() {
        let device = TestDevice::new(EXTENT);
        let ctx = device.context();
        let ring = FrameRing::new(&ctx, 3, &stages()).unwrap();

        assert_eq!(ring.len(), 3);
        assert_eq!(ring.stage_count(), 3);
        assert_eq!(device.live("fence"), 9);
        assert_eq!(device.live("semaphore"), 12);
        // graphics 与 compute 两个 family
        assert_eq!(device.live("command_pool"), 2);
        assert!((0..3).all(|i| ring.slot(i).state() == SlotState::Idle && !ring.slot(i).in_flight()));

        drop(ring);
        assert_eq!(device.live("fence"), 0);
        assert_eq!(device.live("semaphore"), 0);
        assert_eq!(device.live("command_pool"), 0);
    }

    #[test]
    fn test_wait_without_submission_does_not_block() {
        let device = TestDevice::new(EXTENT);
        let ctx = device.context();
        let mut ring = FrameRing::new(&ctx, 2, &stages()).unwrap();

        ring.slot_wait(0);
        assert_eq!(device.count(|call| matches!(call, Call::WaitFences(_))), 0);
        assert_eq!(ring.slot(0).state(), SlotState::Idle);
    }

    #[test]
    fn test_wait_covers_submitted_fences() {
        let device = TestDevice::new(EXTENT);
        let ctx = device.context();
        let mut ring = FrameRing::new(&ctx, 2, &stages()).unwrap();

        ring.begin_command_buffers(1).unwrap();
        assert_eq!(ring.slot(1).state(), SlotState::Recording);
        submit_stage(&mut ring, &ctx, 1, 0);
        submit_stage(&mut ring, &ctx, 1, 1);
        assert_eq!(ring.slot(1).state(), SlotState::Submitted);
        assert!(ring.slot(1).pending_fences() <= ring.stage_count());
        assert_eq!(ring.slot(1).pending_fences(), 2);

        let expected = vec![ring.slot(1).stage(0).fence(), ring.slot(1).stage(1).fence()];
        device.clear_calls();
        ring.slot_wait(1);

        assert_eq!(
            device.calls(),
            vec![Call::WaitFences(expected.clone()), Call::ResetFences(expected.clone())]
        );
        assert!(expected.iter().all(|fence| device.fence_state(*fence) == FenceState::Unsignaled));
        assert_eq!(ring.slot(1).pending_fences(), 0);
        assert_eq!(ring.slot(1).state(), SlotState::Idle);
        // 其他 slot 不受影响
        assert_eq!(ring.slot(0).state(), SlotState::Idle);
    }

    #[test]
    fn test_abandon_returns_to_idle() {
        let device = TestDevice::new(EXTENT);
        let ctx = device.context();
        let mut ring = FrameRing::new(&ctx, 2, &stages()).unwrap();

        ring.begin_command_buffers(0).unwrap();
        ring.abandon(0);
        assert_eq!(ring.slot(0).state(), SlotState::Idle);
        ring.slot_wait(0);
        assert_eq!(device.count(|call| matches!(call, Call::WaitFences(_))), 0);
    }

    #[test]
    fn test_recycle_semaphores() {
        let device = TestDevice::new(EXTENT);
        let ctx = device.context();
        let mut ring = FrameRing::new(&ctx, 2, &stages()).unwrap();

        let old_available = ring.slot(0).image_available();
        let old_completion = ring.slot(0).stage(2).completion();
        ring.recycle_semaphores(0).unwrap();

        assert_ne!(ring.slot(0).image_available(), old_available);
        assert_ne!(ring.slot(0).stage(2).completion(), old_completion);
        assert_eq!(device.live("semaphore"), 8);
        assert_eq!(device.count(|call| matches!(call, Call::DestroySemaphore(_))), 4);
    }

    #[test]
    #[should_panic(expected = "failed to wait fences")]
    fn test_fence_wait_failure_is_fatal() {
        let device = TestDevice::new(EXTENT);
        let ctx = device.context();
        let mut ring = FrameRing::new(&ctx, 2, &stages()).unwrap();

        ring.begin_command_buffers(0).unwrap();
        submit_stage(&mut ring, &ctx, 0, 0);
        device.set_fail_fence_wait(true);
        ring.slot_wait(0);
    }
}
