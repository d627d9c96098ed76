//! render pass 的 attachment：描述 + 每个 frame slot 一张 image

use ash::vk;
use strata_gfx::{
    device::GfxDevice,
    error::{GfxError, GfxResult},
    resources::image::{GfxImage, GfxImageDesc, aspect_of_format},
};

/// attachment 的静态描述，创建之后不会再改变
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AttachmentDesc {
    pub format: vk::Format,
    pub samples: vk::SampleCountFlags,
    pub load_op: vk::AttachmentLoadOp,
    pub store_op: vk::AttachmentStoreOp,
    pub stencil_load_op: vk::AttachmentLoadOp,
    pub stencil_store_op: vk::AttachmentStoreOp,
    pub initial_layout: vk::ImageLayout,
    pub final_layout: vk::ImageLayout,
    pub usage: vk::ImageUsageFlags,
    pub aspect: vk::ImageAspectFlags,
}
// new & init
impl AttachmentDesc {
    /// clear + store，结束时可以被后续 pass 采样
    pub fn color(format: vk::Format, samples: vk::SampleCountFlags) -> Self {
        Self {
            format,
            samples,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::STORE,
            stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
            stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            final_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            usage: vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::SAMPLED,
            aspect: vk::ImageAspectFlags::COLOR,
        }
    }

    pub fn depth(format: vk::Format, samples: vk::SampleCountFlags) -> Self {
        Self {
            format,
            samples,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::STORE,
            stencil_load_op: vk::AttachmentLoadOp::CLEAR,
            stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            final_layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT | vk::ImageUsageFlags::SAMPLED,
            aspect: aspect_of_format(format),
        }
    }

    /// swapchain image，最终交给 present
    pub fn present(format: vk::Format) -> Self {
        Self {
            final_layout: vk::ImageLayout::PRESENT_SRC_KHR,
            usage: vk::ImageUsageFlags::COLOR_ATTACHMENT,
            ..Self::color(format, vk::SampleCountFlags::TYPE_1)
        }
    }

    /// MSAA 的中间结果，resolve 之后不再需要
    pub fn transient_color(format: vk::Format, samples: vk::SampleCountFlags) -> Self {
        Self {
            store_op: vk::AttachmentStoreOp::DONT_CARE,
            final_layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            usage: vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSIENT_ATTACHMENT,
            ..Self::color(format, samples)
        }
    }

    #[inline]
    pub fn with_load_op(mut self, load_op: vk::AttachmentLoadOp) -> Self {
        self.load_op = load_op;
        self
    }

    #[inline]
    pub fn with_store_op(mut self, store_op: vk::AttachmentStoreOp) -> Self {
        self.store_op = store_op;
        self
    }

    #[inline]
    pub fn with_layouts(mut self, initial: vk::ImageLayout, final_layout: vk::ImageLayout) -> Self {
        self.initial_layout = initial;
        self.final_layout = final_layout;
        self
    }

    #[inline]
    pub fn with_usage(mut self, usage: vk::ImageUsageFlags) -> Self {
        self.usage = usage;
        self
    }
}
// tools
impl AttachmentDesc {
    pub fn vk_description(&self) -> vk::AttachmentDescription {
        vk::AttachmentDescription::default()
            .format(self.format)
            .samples(self.samples)
            .load_op(self.load_op)
            .store_op(self.store_op)
            .stencil_load_op(self.stencil_load_op)
            .stencil_store_op(self.stencil_store_op)
            .initial_layout(self.initial_layout)
            .final_layout(self.final_layout)
    }

    fn image_desc(&self, extent: vk::Extent2D) -> GfxImageDesc {
        GfxImageDesc::new_image_2d(extent, self.format, self.usage, self.aspect).with_samples(self.samples)
    }
}

/// image 的所有权
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttachmentSource {
    /// 由 attachment 创建并销毁
    Owned,
    /// 外部 image，例如 swapchain image，不能被 resize 或销毁
    Borrowed,
}

pub struct Attachment {
    name: String,
    desc: AttachmentDesc,
    clear_value: vk::ClearValue,
    /// 每个 frame slot 一张
    images: Vec<GfxImage>,
    source: AttachmentSource,
}
// new & init
impl Attachment {
    pub fn new_owned(
        device: &dyn GfxDevice,
        name: impl Into<String>,
        desc: AttachmentDesc,
        clear_value: vk::ClearValue,
        image_count: usize,
        extent: vk::Extent2D,
    ) -> GfxResult<Self> {
        let name = name.into();
        let images = Self::create_images(device, &name, &desc, image_count, extent)?;
        Ok(Self {
            name,
            desc,
            clear_value,
            images,
            source: AttachmentSource::Owned,
        })
    }

    /// images 的数量必须与 render pass 的 image count 一致
    pub fn new_borrowed(
        name: impl Into<String>,
        desc: AttachmentDesc,
        clear_value: vk::ClearValue,
        images: Vec<GfxImage>,
    ) -> Self {
        Self {
            name: name.into(),
            desc,
            clear_value,
            images,
            source: AttachmentSource::Borrowed,
        }
    }

    /// 创建失败时，已经创建的 image 会被销毁
    fn create_images(
        device: &dyn GfxDevice,
        name: &str,
        desc: &AttachmentDesc,
        image_count: usize,
        extent: vk::Extent2D,
    ) -> GfxResult<Vec<GfxImage>> {
        let image_desc = desc.image_desc(extent);
        let mut images = Vec::with_capacity(image_count);
        for i in 0..image_count {
            match device.create_image(&image_desc, &format!("{}-{}", name, i)) {
                Ok(image) => images.push(image),
                Err(e) => {
                    images.into_iter().for_each(|image| device.destroy_image(image));
                    return Err(e);
                }
            }
        }
        Ok(images)
    }
}
// getters
impl Attachment {
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn desc(&self) -> &AttachmentDesc {
        &self.desc
    }

    #[inline]
    pub fn clear_value(&self) -> vk::ClearValue {
        self.clear_value
    }

    #[inline]
    pub fn images(&self) -> &[GfxImage] {
        &self.images
    }

    #[inline]
    pub fn image(&self, frame: usize) -> &GfxImage {
        &self.images[frame]
    }

    #[inline]
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    #[inline]
    pub fn is_borrowed(&self) -> bool {
        self.source == AttachmentSource::Borrowed
    }
}
// update
impl Attachment {
    /// 同时替换所有 slot 的 image
    ///
    /// 先创建新的 image，全部成功之后再销毁旧的；调用者需要保证 GPU 已经 idle
    pub fn resize(&mut self, device: &dyn GfxDevice, image_count: usize, extent: vk::Extent2D) -> GfxResult<()> {
        if self.is_borrowed() {
            return Err(GfxError::ExternalResize(self.name.clone()));
        }

        let images = self.create_resized_images(device, image_count, extent)?;
        self.replace_images(device, images);
        Ok(())
    }

    /// 只创建新的 image，当前的 image 保持不变
    pub(crate) fn create_resized_images(
        &self,
        device: &dyn GfxDevice,
        image_count: usize,
        extent: vk::Extent2D,
    ) -> GfxResult<Vec<GfxImage>> {
        if self.is_borrowed() {
            return Err(GfxError::ExternalResize(self.name.clone()));
        }
        Self::create_images(device, &self.name, &self.desc, image_count, extent)
    }

    /// 换上新的 image，并销毁旧的
    pub(crate) fn replace_images(&mut self, device: &dyn GfxDevice, images: Vec<GfxImage>) {
        let old_images = std::mem::replace(&mut self.images, images);
        old_images.into_iter().for_each(|image| device.destroy_image(image));
    }
}
// destroy
impl Attachment {
    /// borrowed 的 image 不会被销毁
    pub fn destroy(&mut self, device: &dyn GfxDevice) {
        let images = std::mem::take(&mut self.images);
        if self.is_borrowed() {
            return;
        }
        log::debug!("destroy attachment {}: {} images", self.name, images.len());
        images.into_iter().for_each(|image| device.destroy_image(image));
    }
}
