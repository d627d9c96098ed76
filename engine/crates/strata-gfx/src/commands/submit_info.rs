use ash::vk;
use itertools::Itertools;

/// 一次 submit 中等待或者触发的 binary semaphore
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GfxSemaphoreInfo {
    pub semaphore: vk::Semaphore,
    pub stage: vk::PipelineStageFlags2,
}

/// Gfx 关于 submitInfo 的封装
///
/// 只保存数据本身，在真正提交时才转换为 `vk::SubmitInfo2`，便于检查提交的内容
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GfxSubmitInfo {
    pub command_buffers: Vec<vk::CommandBuffer>,
    pub waits: Vec<GfxSemaphoreInfo>,
    pub signals: Vec<GfxSemaphoreInfo>,
}

impl GfxSubmitInfo {
    pub fn new(commands: &[vk::CommandBuffer]) -> Self {
        Self {
            command_buffers: commands.to_vec(),
            waits: vec![],
            signals: vec![],
        }
    }

    #[inline]
    pub fn wait(mut self, semaphore: vk::Semaphore, stage: vk::PipelineStageFlags2) -> Self {
        self.waits.push(GfxSemaphoreInfo { semaphore, stage });
        self
    }

    #[inline]
    pub fn signal(mut self, semaphore: vk::Semaphore, stage: vk::PipelineStageFlags2) -> Self {
        self.signals.push(GfxSemaphoreInfo { semaphore, stage });
        self
    }

    /// 在闭包中使用 `vk::SubmitInfo2`，保证内部引用的数组在闭包内有效
    pub fn with_vk_info<R>(&self, f: impl FnOnce(&vk::SubmitInfo2) -> R) -> R {
        let command_infos = self
            .command_buffers
            .iter()
            .map(|cmd| vk::CommandBufferSubmitInfo::default().command_buffer(*cmd))
            .collect_vec();
        let to_vk = |info: &GfxSemaphoreInfo| {
            vk::SemaphoreSubmitInfo::default().semaphore(info.semaphore).stage_mask(info.stage)
        };
        let wait_infos = self.waits.iter().map(to_vk).collect_vec();
        let signal_infos = self.signals.iter().map(to_vk).collect_vec();

        let submit_info = vk::SubmitInfo2::default()
            .command_buffer_infos(&command_infos)
            .wait_semaphore_infos(&wait_infos)
            .signal_semaphore_infos(&signal_infos);
        f(&submit_info)
    }
}

#[cfg(test)]
mod tests {
    use ash::vk::Handle;

    use super::*;

    #[test]
    fn test_builder_keeps_order() {
        let a = vk::Semaphore::from_raw(10);
        let b = vk::Semaphore::from_raw(11);
        let c = vk::Semaphore::from_raw(12);
        let info = GfxSubmitInfo::new(&[vk::CommandBuffer::from_raw(1)])
            .wait(a, vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT)
            .wait(b, vk::PipelineStageFlags2::ALL_COMMANDS)
            .signal(c, vk::PipelineStageFlags2::ALL_COMMANDS);

        assert_eq!(info.waits.iter().map(|w| w.semaphore).collect_vec(), vec![a, b]);
        assert_eq!(info.signals.len(), 1);

        let counts = info.with_vk_info(|vk_info| {
            (
                vk_info.command_buffer_info_count,
                vk_info.wait_semaphore_info_count,
                vk_info.signal_semaphore_info_count,
            )
        });
        assert_eq!(counts, (1, 2, 1));
    }
}
