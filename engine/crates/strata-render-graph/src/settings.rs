use ash::vk;

/// 渲染器的静态设置，由上层配置转换而来
#[derive(Clone, Copy, Debug)]
pub struct RendererSettings {
    /// 期望的 frame slot 数量，也是 swapchain 的最小 image 数量
    pub frame_slots: u32,
    /// 首选的 surface format，不支持时回退到 A2B10G10R10，再回退到第一个可用的 format
    pub surface_format: vk::SurfaceFormatKHR,
    /// 首选的 present mode，不支持时回退到 MAILBOX，再回退到 FIFO
    pub present_mode: vk::PresentModeKHR,
    pub msaa_samples: vk::SampleCountFlags,
    pub clear_color: [f32; 4],
    pub depth_format: vk::Format,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            frame_slots: 3,
            surface_format: vk::SurfaceFormatKHR {
                format: vk::Format::A2B10G10R10_UNORM_PACK32,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            present_mode: vk::PresentModeKHR::MAILBOX,
            msaa_samples: vk::SampleCountFlags::TYPE_1,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            depth_format: vk::Format::D32_SFLOAT,
        }
    }
}

impl RendererSettings {
    #[inline]
    pub fn clear_value(&self) -> vk::ClearValue {
        vk::ClearValue {
            color: vk::ClearColorValue {
                float32: self.clear_color,
            },
        }
    }

    #[inline]
    pub fn depth_clear_value() -> vk::ClearValue {
        vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue { depth: 1.0, stencil: 0 },
        }
    }
}
