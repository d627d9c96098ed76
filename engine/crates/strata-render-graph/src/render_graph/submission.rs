use ash::vk;
use strata_gfx::commands::{queue::QueueKind, submit_info::GfxSubmitInfo};

use crate::frame_ring::FrameSlot;

/// 一个 stage 的提交内容
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StageSubmission {
    pub stage: usize,
    pub queue: QueueKind,
    pub info: GfxSubmitInfo,
    pub fence: vk::Fence,
}

/// 按照 stage 顺序串联 semaphore
///
/// - 第一个 stage 等待 image-available
/// - 之后的每个 stage 等待前一个 stage 的 completion
/// - 每个 stage signal 自己的 completion，并提交自己的 fence
pub fn compile_submissions(slot: &FrameSlot) -> Vec<StageSubmission> {
    let mut previous: Option<vk::Semaphore> = None;
    slot.stages()
        .iter()
        .enumerate()
        .map(|(i, stage)| {
            let info = GfxSubmitInfo::new(&[stage.command_buffer()]);
            let info = match previous {
                Some(semaphore) => info.wait(semaphore, vk::PipelineStageFlags2::ALL_COMMANDS),
                None => {
                    let wait_stage = match stage.queue() {
                        QueueKind::Compute => vk::PipelineStageFlags2::ALL_COMMANDS,
                        _ => vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
                    };
                    info.wait(slot.image_available(), wait_stage)
                }
            }
            .signal(stage.completion(), vk::PipelineStageFlags2::ALL_COMMANDS);
            previous = Some(stage.completion());

            StageSubmission {
                stage: i,
                queue: stage.queue(),
                info,
                fence: stage.fence(),
            }
        })
        .collect()
}
