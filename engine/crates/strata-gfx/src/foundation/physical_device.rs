use std::ffi::CStr;

use ash::vk;
use itertools::Itertools;

use crate::{
    commands::queue::GfxQueueFamily,
    error::{GfxError, GfxResult},
    swapchain::surface::GfxSurface,
};

/// 表示一张物理显卡，以及选定的 queue family
pub struct GfxPhysicalDevice {
    pub(crate) vk_handle: vk::PhysicalDevice,

    /// 当前 gpu 的基础属性
    pub(crate) basic_props: vk::PhysicalDeviceProperties,

    /// 全能的 queue family：graphics + compute
    pub(crate) gfx_queue_family: GfxQueueFamily,
    /// 专用的 compute queue family，不存在时 compute 与 graphics 共用
    pub(crate) compute_queue_family: Option<GfxQueueFamily>,
    /// 支持 present 的 queue family，优先与 graphics 相同
    pub(crate) present_queue_family: GfxQueueFamily,
}

impl GfxPhysicalDevice {
    /// 优先选择独立显卡，如果没有则选择第一个可用的显卡
    pub fn pick(instance: &ash::Instance, surface: &GfxSurface) -> GfxResult<Self> {
        let pdevices =
            unsafe { instance.enumerate_physical_devices() }.map_err(GfxError::vk("vkEnumeratePhysicalDevices"))?;

        let candidates = pdevices
            .iter()
            .filter_map(|pdevice| match Self::new(*pdevice, instance, surface) {
                Ok(candidate) => Some(candidate),
                Err(e) => {
                    log::info!("skip physical device {:?}: {}", pdevice, e);
                    None
                }
            })
            .collect_vec();

        let mut candidates = candidates.into_iter();
        let first = candidates.next().ok_or_else(|| GfxError::NoSuitableDevice("no gpu supports graphics + present".to_string()))?;
        if first.is_descrete_gpu() {
            return Ok(first);
        }
        // 优先使用独立显卡
        Ok(candidates.find(GfxPhysicalDevice::is_descrete_gpu).unwrap_or(first))
    }

    fn new(pdevice: vk::PhysicalDevice, instance: &ash::Instance, surface: &GfxSurface) -> GfxResult<Self> {
        let basic_props = unsafe { instance.get_physical_device_properties(pdevice) };
        let physical_device_name = unsafe { CStr::from_ptr(basic_props.device_name.as_ptr()) };
        log::info!("found gpu: {:?}", physical_device_name);

        if vk::api_version_minor(basic_props.api_version) < 3 && vk::api_version_major(basic_props.api_version) == 1 {
            return Err(GfxError::NoSuitableDevice(format!("{:?} does not support vulkan 1.3", physical_device_name)));
        }

        let device_extensions = unsafe { instance.enumerate_device_extension_properties(pdevice) }
            .map_err(GfxError::vk("vkEnumerateDeviceExtensionProperties"))?;
        let support_swapchain = device_extensions
            .iter()
            .any(|ext| ash::khr::swapchain::NAME == unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) });
        if !support_swapchain {
            return Err(GfxError::NoSuitableDevice(format!("{:?} does not support swapchain", physical_device_name)));
        }

        // 找到所有的队列信息并打印出来
        let queue_familiy_props = unsafe { instance.get_physical_device_queue_family_properties(pdevice) };
        log::debug!("physical device: queue family props:\n{:#?}", queue_familiy_props);

        // 找到符合条的 queue family
        let find_queue_family = |name: &str, include_flags: vk::QueueFlags, exclude_flags: vk::QueueFlags| {
            queue_familiy_props
                .iter()
                .enumerate()
                .find(|(_, props)| {
                    props.queue_flags.contains(include_flags) && (props.queue_flags & exclude_flags).is_empty()
                })
                .map(|(family_idx, props)| GfxQueueFamily {
                    name: name.to_string(),
                    queue_family_index: family_idx as u32,
                    queue_flags: props.queue_flags,
                    queue_count: props.queue_count,
                })
        };

        // 全能的 Queue：graphics, compute
        let gfx_queue_family =
            find_queue_family("gfx", vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE, vk::QueueFlags::empty())
                .ok_or(GfxError::MissingQueue("graphics"))?;

        // Compute Only
        let compute_queue_family = find_queue_family("compute-only", vk::QueueFlags::COMPUTE, vk::QueueFlags::GRAPHICS);

        // present 优先使用 gfx queue family
        let present_queue_family = if surface.support_present(pdevice, gfx_queue_family.queue_family_index)? {
            GfxQueueFamily {
                name: "present".to_string(),
                ..gfx_queue_family.clone()
            }
        } else {
            let mut found = None;
            for (family_idx, props) in queue_familiy_props.iter().enumerate() {
                if surface.support_present(pdevice, family_idx as u32)? {
                    found = Some(GfxQueueFamily {
                        name: "present".to_string(),
                        queue_family_index: family_idx as u32,
                        queue_flags: props.queue_flags,
                        queue_count: props.queue_count,
                    });
                    break;
                }
            }
            found.ok_or(GfxError::MissingQueue("present"))?
        };

        Ok(Self {
            vk_handle: pdevice,
            basic_props,
            gfx_queue_family,
            compute_queue_family,
            present_queue_family,
        })
    }

    #[inline]
    /// 当前 gpu 是否是独立显卡
    pub fn is_descrete_gpu(&self) -> bool {
        self.basic_props.device_type == vk::PhysicalDeviceType::DISCRETE_GPU
    }

    /// 需要创建的 queue family，去重
    pub fn unique_queue_families(&self) -> Vec<u32> {
        [
            Some(self.gfx_queue_family.queue_family_index),
            self.compute_queue_family.as_ref().map(|f| f.queue_family_index),
            Some(self.present_queue_family.queue_family_index),
        ]
        .into_iter()
        .flatten()
        .unique()
        .collect_vec()
    }
}
