use ash::vk;

use crate::{
    error::{GfxError, GfxResult},
    swapchain::GfxSurfaceSupport,
};

pub struct GfxSurface {
    pub(crate) handle: vk::SurfaceKHR,
    pub(crate) pf: ash::khr::surface::Instance,
}

impl GfxSurface {
    pub fn new(
        vk_entry: &ash::Entry,
        instance: &ash::Instance,
        raw_display_handle: raw_window_handle::RawDisplayHandle,
        raw_window_handle: raw_window_handle::RawWindowHandle,
    ) -> GfxResult<Self> {
        let surface_pf = ash::khr::surface::Instance::new(vk_entry, instance);

        let surface =
            unsafe { ash_window::create_surface(vk_entry, instance, raw_display_handle, raw_window_handle, None) }
                .map_err(GfxError::vk("vkCreateSurfaceKHR"))?;

        Ok(GfxSurface {
            handle: surface,
            pf: surface_pf,
        })
    }

    pub fn destroy(self) {
        log::info!("destroying GfxSurface");
        unsafe { self.pf.destroy_surface(self.handle, None) }
    }
}

// getters
impl GfxSurface {
    pub fn support_present(&self, pdevice: vk::PhysicalDevice, queue_family_index: u32) -> GfxResult<bool> {
        unsafe { self.pf.get_physical_device_surface_support(pdevice, queue_family_index, self.handle) }
            .map_err(GfxError::vk("vkGetPhysicalDeviceSurfaceSupportKHR"))
    }

    /// 实时获取 surface 能力，窗口大小变化后 current_extent 会随之变化
    pub fn support(&self, pdevice: vk::PhysicalDevice) -> GfxResult<GfxSurfaceSupport> {
        unsafe {
            Ok(GfxSurfaceSupport {
                capabilities: self
                    .pf
                    .get_physical_device_surface_capabilities(pdevice, self.handle)
                    .map_err(GfxError::vk("vkGetPhysicalDeviceSurfaceCapabilitiesKHR"))?,
                formats: self
                    .pf
                    .get_physical_device_surface_formats(pdevice, self.handle)
                    .map_err(GfxError::vk("vkGetPhysicalDeviceSurfaceFormatsKHR"))?,
                present_modes: self
                    .pf
                    .get_physical_device_surface_present_modes(pdevice, self.handle)
                    .map_err(GfxError::vk("vkGetPhysicalDeviceSurfacePresentModesKHR"))?,
            })
        }
    }
}
