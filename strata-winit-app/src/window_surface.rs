use std::cell::Cell;

use ash::vk;
use strata_render_graph::window::WindowSurface;

/// winit 窗口的尺寸与状态，由事件循环更新
#[derive(Default)]
pub struct WinitWindowSurface {
    extent: Cell<vk::Extent2D>,
    minimized: Cell<bool>,
}

impl WinitWindowSurface {
    /// 尺寸为 0 时视为最小化
    pub fn update_extent(&self, size: winit::dpi::PhysicalSize<u32>) {
        self.extent.set(vk::Extent2D {
            width: size.width,
            height: size.height,
        });
        self.minimized.set(size.width == 0 || size.height == 0);
    }

    pub fn set_minimized(&self, minimized: bool) {
        self.minimized.set(minimized);
    }
}

impl WindowSurface for WinitWindowSurface {
    fn current_extent(&self) -> vk::Extent2D {
        self.extent.get()
    }

    fn is_paused(&self) -> bool {
        self.minimized.get()
    }
}
