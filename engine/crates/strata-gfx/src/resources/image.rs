use ash::vk;

/// Image 来源
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageSource {
    /// 由设备分配，需要由创建者销毁
    Allocated,
    /// 外部 Image（例如 Swapchain Image），不管理其内存生命周期
    External,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GfxImageDesc {
    pub extent: vk::Extent2D,
    pub format: vk::Format,
    pub samples: vk::SampleCountFlags,
    pub usage: vk::ImageUsageFlags,
    pub aspect: vk::ImageAspectFlags,
}
impl GfxImageDesc {
    #[inline]
    pub fn new_image_2d(
        extent: vk::Extent2D,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
        aspect: vk::ImageAspectFlags,
    ) -> Self {
        Self {
            extent,
            format,
            samples: vk::SampleCountFlags::TYPE_1,
            usage,
            aspect,
        }
    }

    #[inline]
    pub fn with_samples(mut self, samples: vk::SampleCountFlags) -> Self {
        self.samples = samples;
        self
    }

    #[inline]
    pub fn with_extent(mut self, extent: vk::Extent2D) -> Self {
        self.extent = extent;
        self
    }

    pub fn vk_create_info(&self) -> vk::ImageCreateInfo<'static> {
        vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(self.format)
            .extent(vk::Extent3D {
                width: self.extent.width,
                height: self.extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(self.samples)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(self.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
    }
}

/// 一张 2D image 以及它的默认 view
///
/// 只是 handle 的集合，可以随意 Copy；销毁通过 `GfxDevice::destroy_image` 完成
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GfxImage {
    pub handle: vk::Image,
    pub view: vk::ImageView,
    pub desc: GfxImageDesc,
    pub source: ImageSource,
}
// getters
impl GfxImage {
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.desc.extent
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.desc.format
    }

    #[inline]
    pub fn is_external(&self) -> bool {
        self.source == ImageSource::External
    }
}

/// depth 相关的 format 需要 DEPTH aspect
pub fn aspect_of_format(format: vk::Format) -> vk::ImageAspectFlags {
    match format {
        vk::Format::D16_UNORM | vk::Format::D32_SFLOAT | vk::Format::X8_D24_UNORM_PACK32 => {
            vk::ImageAspectFlags::DEPTH
        }
        vk::Format::D16_UNORM_S8_UINT | vk::Format::D24_UNORM_S8_UINT | vk::Format::D32_SFLOAT_S8_UINT => {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        }
        vk::Format::S8_UINT => vk::ImageAspectFlags::STENCIL,
        _ => vk::ImageAspectFlags::COLOR,
    }
}
