pub mod surface;

use ash::vk;

/// 创建 swapchain 所需的全部参数，由上层根据 surface 能力协商得到
#[derive(Clone, Debug)]
pub struct GfxSwapchainDesc {
    pub min_image_count: u32,
    pub surface_format: vk::SurfaceFormatKHR,
    pub extent: vk::Extent2D,
    pub present_mode: vk::PresentModeKHR,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
    pub image_usage: vk::ImageUsageFlags,
    /// 多于一个 family 时使用 CONCURRENT 模式
    pub queue_family_indices: Vec<u32>,
    /// 重建时传入旧的 swapchain，否则为 null
    pub old_swapchain: vk::SwapchainKHR,
}

/// surface 当前的能力
#[derive(Clone, Debug, Default)]
pub struct GfxSurfaceSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

/// acquire / present 的三态结果
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GfxSurfaceStatus<T> {
    Optimal(T),
    /// 操作成功，但 swapchain 与 surface 已经不匹配
    Suboptimal(T),
    /// `ERROR_OUT_OF_DATE_KHR`，操作没有执行
    OutOfDate,
}
impl<T> GfxSurfaceStatus<T> {
    /// 将 `vkAcquireNextImageKHR` / `vkQueuePresentKHR` 的返回值转换为三态结果
    ///
    /// 其他错误原样返回
    pub fn from_vk(result: Result<(T, bool), vk::Result>) -> Result<Self, vk::Result> {
        match result {
            Ok((value, false)) => Ok(Self::Optimal(value)),
            Ok((value, true)) => Ok(Self::Suboptimal(value)),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(Self::OutOfDate),
            Err(e) => Err(e),
        }
    }
}
