use ash::vk;

/// host 可见的 buffer，用于每帧更新的 uniform 数据
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GfxBuffer {
    pub handle: vk::Buffer,
    pub size: vk::DeviceSize,
    pub usage: vk::BufferUsageFlags,
}
