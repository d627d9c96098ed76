use ash::vk;

pub type GfxResult<T> = Result<T, GfxError>;

#[derive(Debug, thiserror::Error)]
pub enum GfxError {
    #[error("{call} failed: {result:?}")]
    Vulkan { call: &'static str, result: vk::Result },

    #[error("failed to load vulkan library: {0}")]
    Loading(String),

    #[error("no suitable physical device: {0}")]
    NoSuitableDevice(String),

    #[error("missing queue family: {0}")]
    MissingQueue(&'static str),

    #[error("surface error: {0}")]
    Surface(String),

    #[error("unsupported format {0:?}")]
    UnsupportedFormat(vk::Format),

    #[error("attachment {0} is borrowed from an external owner and can not be resized")]
    ExternalResize(String),

    #[error("write of {len} bytes at offset {offset} overflows buffer of {size} bytes")]
    BufferOverflow { size: u64, offset: u64, len: u64 },

    #[error("unknown resource handle: {0}")]
    UnknownHandle(String),

    #[error("invalid frame graph: {0}")]
    InvalidGraph(String),
}

impl GfxError {
    /// 用于 `map_err`，记录失败的 vulkan 调用
    ///
    /// ```ignore
    /// device.create_fence(&info, None).map_err(GfxError::vk("vkCreateFence"))?;
    /// ```
    #[inline]
    pub fn vk(call: &'static str) -> impl FnOnce(vk::Result) -> GfxError {
        move |result| GfxError::Vulkan { call, result }
    }

    /// device lost 之类的错误，说明 GPU 已经不可用
    #[inline]
    pub fn is_device_lost(&self) -> bool {
        matches!(
            self,
            GfxError::Vulkan {
                result: vk::Result::ERROR_DEVICE_LOST,
                ..
            }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vk_error_mapping() {
        let result: Result<(), vk::Result> = Err(vk::Result::ERROR_DEVICE_LOST);
        let err = result.map_err(GfxError::vk("vkWaitForFences")).unwrap_err();

        assert!(err.is_device_lost());
        assert_eq!(err.to_string(), "vkWaitForFences failed: ERROR_DEVICE_LOST");
        assert!(!GfxError::MissingQueue("compute").is_device_lost());
    }
}
