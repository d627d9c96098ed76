use std::{
    collections::HashSet,
    ffi::{CStr, CString, c_char},
};

use ash::vk;
use itertools::Itertools;

use crate::{
    error::{GfxError, GfxResult},
    foundation::debug_messenger::GfxDebugMsger,
};

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

pub struct GfxInstance {
    pub(crate) ash_instance: ash::Instance,
    /// 是否开启了 debug utils，开启时才能设置 debug name 以及创建 debug messenger
    pub(crate) debug_utils_enabled: bool,
}

impl GfxInstance {
    /// 设置所需的 layers 和 extensions，创建 vk instance
    pub fn new(
        vk_entry: &ash::Entry,
        app_name: &str,
        surface_exts: &[*const c_char],
        validation: bool,
    ) -> GfxResult<Self> {
        let _span = tracy_client::span!("GfxInstance::new");

        let app_name = CString::new(app_name).unwrap_or_default();
        let app_info = vk::ApplicationInfo::default()
            .api_version(vk::API_VERSION_1_3) // 需要 synchronization2
            .application_name(app_name.as_c_str())
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(c"Strata")
            .engine_version(vk::make_api_version(0, 1, 0, 0));

        let all_ext_props =
            unsafe { vk_entry.enumerate_instance_extension_properties(None) }.map_err(GfxError::vk("vkEnumerateInstanceExtensionProperties"))?;
        let is_ext_supported = |ext: &CStr| {
            all_ext_props.iter().any(|props| ext == unsafe { CStr::from_ptr(props.extension_name.as_ptr()) })
        };

        // surface 相关的 extension 是必须的
        let mut enabled_extensions: HashSet<*const c_char> = HashSet::new();
        for ext in surface_exts {
            let ext_name = unsafe { CStr::from_ptr(*ext) };
            if !is_ext_supported(ext_name) {
                return Err(GfxError::Surface(format!("required instance extension {:?} is missing", ext_name)));
            }
            enabled_extensions.insert(*ext);
        }

        // debug utils 只是用于调试，缺失时不影响运行
        let debug_utils_enabled = is_ext_supported(vk::EXT_DEBUG_UTILS_NAME);
        if debug_utils_enabled {
            enabled_extensions.insert(vk::EXT_DEBUG_UTILS_NAME.as_ptr());
        } else {
            log::warn!("instance extension {:?} is not supported", vk::EXT_DEBUG_UTILS_NAME);
        }
        let enabled_extensions = enabled_extensions.into_iter().collect_vec();
        log::info!(
            "instance extensions: {}",
            enabled_extensions.iter().map(|ext| format!("\n\t{:?}", unsafe { CStr::from_ptr(*ext) })).join("")
        );

        let enabled_layers = if validation { Self::validation_layers(vk_entry)? } else { vec![] };
        log::info!(
            "instance layers: {}",
            enabled_layers.iter().map(|layer| format!("\n\t{:?}", unsafe { CStr::from_ptr(*layer) })).join("")
        );

        let mut instance_ci = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&enabled_extensions)
            .enabled_layer_names(&enabled_layers);

        // 为 instance info 添加 debug messenger，可以捕获 instance 创建过程中的消息
        let mut debug_utils_messenger_ci = GfxDebugMsger::debug_utils_messenger_ci();
        if debug_utils_enabled {
            instance_ci = instance_ci.push_next(&mut debug_utils_messenger_ci);
        }

        let ash_instance =
            unsafe { vk_entry.create_instance(&instance_ci, None) }.map_err(GfxError::vk("vkCreateInstance"))?;

        Ok(Self {
            ash_instance,
            debug_utils_enabled,
        })
    }

    /// 不支持 validation layer 时只给出警告
    fn validation_layers(vk_entry: &ash::Entry) -> GfxResult<Vec<*const c_char>> {
        let all_layer_props = unsafe { vk_entry.enumerate_instance_layer_properties() }
            .map_err(GfxError::vk("vkEnumerateInstanceLayerProperties"))?;
        let supported = all_layer_props
            .iter()
            .any(|props| VALIDATION_LAYER == unsafe { CStr::from_ptr(props.layer_name.as_ptr()) });
        if supported {
            Ok(vec![VALIDATION_LAYER.as_ptr()])
        } else {
            log::warn!("validation layer {:?} is not available", VALIDATION_LAYER);
            Ok(vec![])
        }
    }

    pub fn destroy(self) {
        log::info!("destroying GfxInstance");
        unsafe {
            self.ash_instance.destroy_instance(None);
        }
    }
}

// getters
impl GfxInstance {
    #[inline]
    pub fn ash_instance(&self) -> &ash::Instance {
        &self.ash_instance
    }
}
