use ash::vk;

/// 窗口层需要提供的信息
///
/// 窗口的创建与事件循环不归 frame graph 管理，resize 通过 `Scheduler::notify_resized` 通知
pub trait WindowSurface {
    /// 当前的物理像素尺寸，最小化时为 0
    fn current_extent(&self) -> vk::Extent2D;

    /// 暂停时不提交任何 GPU 工作
    fn is_paused(&self) -> bool;
}
