//! Swapchain：协商 surface 参数，持有 presentable image 以及输出用的 render pass
//!
//! swapchain 只会被重新创建，不会被修改。重建时旧的 handle 作为 `old_swapchain`
//! 传给新的 swapchain，随后立即销毁。

use ash::vk;
use strata_gfx::{
    commands::queue::{GfxQueue, QueueKind},
    context::GfxContext,
    error::{GfxError, GfxResult},
    resources::image::{GfxImage, GfxImageDesc, ImageSource},
    swapchain::{GfxSurfaceStatus, GfxSwapchainDesc},
};

use crate::{
    attachment::{Attachment, AttachmentDesc},
    frame_ring::FrameSlot,
    program::SharedProgram,
    render_pass::{ExtentPolicy, RenderPass, RenderPassBuilder, Subpass, WeakResizeObserver},
    settings::RendererSettings,
};

/// `Stale` 表示 swapchain 与 surface 不再匹配（suboptimal 或 out of date），需要重建
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquireOutcome {
    Ready(u32),
    Stale,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented,
    Stale,
}

const FALLBACK_SURFACE_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::A2B10G10R10_UNORM_PACK32,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

/// 首选 format -> A2B10G10R10 + SRGB_NONLINEAR -> 第一个可用的 format
pub fn choose_surface_format(
    formats: &[vk::SurfaceFormatKHR],
    preferred: vk::SurfaceFormatKHR,
) -> GfxResult<vk::SurfaceFormatKHR> {
    let same = |a: &vk::SurfaceFormatKHR, b: &vk::SurfaceFormatKHR| a.format == b.format && a.color_space == b.color_space;
    formats
        .iter()
        .find(|f| same(*f, &preferred))
        .or_else(|| formats.iter().find(|f| same(*f, &FALLBACK_SURFACE_FORMAT)))
        .or_else(|| formats.first())
        .copied()
        .ok_or_else(|| GfxError::Surface("surface reports no format".to_string()))
}

/// 首选 mode -> MAILBOX -> FIFO（FIFO 总是可用）
pub fn choose_present_mode(modes: &[vk::PresentModeKHR], preferred: vk::PresentModeKHR) -> vk::PresentModeKHR {
    [preferred, vk::PresentModeKHR::MAILBOX]
        .into_iter()
        .find(|mode| modes.contains(mode))
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// 如果 current_extent 包含特殊值 0xFFFFFFFF，则表示可以自己设置交换链的 extent
pub fn choose_extent(capabilities: &vk::SurfaceCapabilitiesKHR, window_extent: vk::Extent2D) -> vk::Extent2D {
    let current = capabilities.current_extent;
    if current.width != u32::MAX && current.height != u32::MAX {
        return current;
    }
    vk::Extent2D {
        width: window_extent
            .width
            .clamp(capabilities.min_image_extent.width, capabilities.max_image_extent.width),
        height: window_extent
            .height
            .clamp(capabilities.min_image_extent.height, capabilities.max_image_extent.height),
    }
}

/// max_image_count == 0，表示不限制 image 数量
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR, frame_slots: u32) -> u32 {
    let count = u32::max(capabilities.min_image_count + 1, frame_slots);
    if capabilities.max_image_count == 0 {
        count
    } else {
        u32::min(capabilities.max_image_count, count)
    }
}

/// swapchain handle 与 image view，销毁顺序在 output pass 之后
struct SwapchainImages {
    ctx: GfxContext,
    handle: vk::SwapchainKHR,
    images: Vec<GfxImage>,
}
impl Drop for SwapchainImages {
    fn drop(&mut self) {
        let device = self.ctx.device();
        // external image 只销毁 view
        for image in self.images.drain(..) {
            device.destroy_image(image);
        }
        if self.handle != vk::SwapchainKHR::null() {
            device.destroy_swapchain(self.handle);
        }
        log::debug!("destroy swapchain {:?}", self.handle);
    }
}

pub struct Swapchain {
    /// 必须在 images 之前销毁
    output_pass: RenderPass,
    images: SwapchainImages,

    present_queue: GfxQueue,
    surface_format: vk::SurfaceFormatKHR,
    present_mode: vk::PresentModeKHR,
    extent: vk::Extent2D,
    settings: RendererSettings,
}
// new & init
impl Swapchain {
    pub fn new(ctx: &GfxContext, window_extent: vk::Extent2D, settings: &RendererSettings) -> GfxResult<Self> {
        Self::create(ctx, ctx.queue(QueueKind::Present).clone(), window_extent, settings, vk::SwapchainKHR::null())
    }

    fn create(
        ctx: &GfxContext,
        present_queue: GfxQueue,
        window_extent: vk::Extent2D,
        settings: &RendererSettings,
        old_swapchain: vk::SwapchainKHR,
    ) -> GfxResult<Self> {
        let _span = tracy_client::span!("Swapchain::create");
        let device = ctx.device();
        let support = device.surface_support()?;
        let capabilities = support.capabilities;

        let surface_format = choose_surface_format(&support.formats, settings.surface_format)?;
        let present_mode = choose_present_mode(&support.present_modes, settings.present_mode);
        let extent = choose_extent(&capabilities, window_extent);
        if extent.width == 0 || extent.height == 0 {
            return Err(GfxError::Surface(format!("surface extent is {}x{}", extent.width, extent.height)));
        }
        let min_image_count = choose_image_count(&capabilities, settings.frame_slots);

        let desc = GfxSwapchainDesc {
            min_image_count,
            surface_format,
            extent,
            present_mode,
            pre_transform: capabilities.current_transform,
            // TRANSFER_DST 用于 Nsight 分析
            image_usage: vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST,
            queue_family_indices: ctx.queues().family_indices(),
            old_swapchain,
        };
        let mut images = SwapchainImages {
            ctx: ctx.clone(),
            handle: device.create_swapchain(&desc, "main")?,
            images: vec![],
        };

        let image_desc = GfxImageDesc::new_image_2d(
            extent,
            surface_format.format,
            desc.image_usage,
            vk::ImageAspectFlags::COLOR,
        );
        for (i, handle) in device.swapchain_images(images.handle)?.into_iter().enumerate() {
            let view = device.create_image_view(
                handle,
                surface_format.format,
                vk::ImageAspectFlags::COLOR,
                &format!("swapchain-{}", i),
            )?;
            images.images.push(GfxImage {
                handle,
                view,
                desc: image_desc,
                source: ImageSource::External,
            });
        }

        log::info!(
            "create swapchain:
            surface current extent: {}x{}, min extent: {}x{}, max extent: {}x{}
            window physical extent: {}x{}
            final swapchain extent: {}x{}
            format: {:?}, color space: {:?}, present mode: {:?}, image count: {}",
            capabilities.current_extent.width,
            capabilities.current_extent.height,
            capabilities.min_image_extent.width,
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.width,
            capabilities.max_image_extent.height,
            window_extent.width,
            window_extent.height,
            extent.width,
            extent.height,
            surface_format.format,
            surface_format.color_space,
            present_mode,
            images.images.len()
        );

        let output_pass = Self::build_output_pass(ctx, &images.images, surface_format.format, extent, settings)?;
        Ok(Self {
            output_pass,
            images,
            present_queue,
            surface_format,
            present_mode,
            extent,
            settings: *settings,
        })
    }

    /// 一个 color attachment 直接写入 swapchain image；开启 MSAA 时先写入多重采样的
    /// attachment，再 resolve 到 swapchain image（下标 1）
    fn build_output_pass(
        ctx: &GfxContext,
        images: &[GfxImage],
        format: vk::Format,
        extent: vk::Extent2D,
        settings: &RendererSettings,
    ) -> GfxResult<RenderPass> {
        let present_desc = AttachmentDesc::present(format);
        let builder = RenderPassBuilder::new("swapchain", images.len())
            .extent_policy(ExtentPolicy::Fixed(extent))
            .external_dependencies();

        let builder = if settings.msaa_samples == vk::SampleCountFlags::TYPE_1 {
            builder
                .borrowed_attachment(Attachment::new_borrowed(
                    "swapchain-color",
                    present_desc,
                    settings.clear_value(),
                    images.to_vec(),
                ))
                .subpass(Subpass::new().color(0))
                .output_attachment_index(0)
        } else {
            builder
                .attachment(
                    "msaa-color",
                    AttachmentDesc::transient_color(format, settings.msaa_samples),
                    settings.clear_value(),
                )
                .borrowed_attachment(Attachment::new_borrowed(
                    "swapchain-resolve",
                    present_desc.with_load_op(vk::AttachmentLoadOp::DONT_CARE),
                    settings.clear_value(),
                    images.to_vec(),
                ))
                .subpass(Subpass::new().color(0).resolve(1))
                .output_attachment_index(1)
        };
        builder.build(ctx, extent)
    }
}
// getters
impl Swapchain {
    #[inline]
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.images.handle
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.surface_format.format
    }

    #[inline]
    pub fn surface_format(&self) -> vk::SurfaceFormatKHR {
        self.surface_format
    }

    #[inline]
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn image_count(&self) -> usize {
        self.images.images.len()
    }

    #[inline]
    pub fn images(&self) -> &[GfxImage] {
        &self.images.images
    }

    #[inline]
    pub fn present_queue(&self) -> &GfxQueue {
        &self.present_queue
    }

    #[inline]
    pub fn output_pass(&self) -> &RenderPass {
        &self.output_pass
    }

    #[inline]
    pub fn output_pass_mut(&mut self) -> &mut RenderPass {
        &mut self.output_pass
    }
}
// programs & observers
impl Swapchain {
    /// 注册到输出 pass 的唯一 subpass，重建之后仍然有效
    pub fn register_program(&mut self, program: &SharedProgram) -> bool {
        self.output_pass.register_program(0, program)
    }

    pub fn add_observer(&mut self, observer: WeakResizeObserver) {
        self.output_pass.add_observer(observer);
    }
}
// update
impl Swapchain {
    /// 完成时 signal slot 的 image-available semaphore
    pub fn acquire(&self, slot: &FrameSlot) -> GfxResult<AcquireOutcome> {
        let _span = tracy_client::span!("Swapchain::acquire");
        let status = self.ctx().device().acquire_next_image(self.handle(), u64::MAX, slot.image_available())?;
        Ok(match status {
            GfxSurfaceStatus::Optimal(image_index) => AcquireOutcome::Ready(image_index),
            GfxSurfaceStatus::Suboptimal(image_index) => {
                log::warn!("swapchain acquire image index {} is not optimal", image_index);
                AcquireOutcome::Stale
            }
            GfxSurfaceStatus::OutOfDate => {
                log::warn!("swapchain is out of date when acquire next image");
                AcquireOutcome::Stale
            }
        })
    }

    /// 等待 slot 最后一个 stage 的 completion semaphore
    pub fn present(&self, slot: &FrameSlot, image_index: u32) -> GfxResult<PresentOutcome> {
        let _span = tracy_client::span!("Swapchain::present");
        let waits = slot.final_stage().map(|stage| stage.completion()).into_iter().collect::<Vec<_>>();
        let status =
            self.ctx().device().queue_present(self.present_queue.handle(), self.handle(), image_index, &waits)?;
        Ok(match status {
            GfxSurfaceStatus::Optimal(()) => PresentOutcome::Presented,
            GfxSurfaceStatus::Suboptimal(()) => {
                log::warn!("swapchain present image index {} is not optimal", image_index);
                PresentOutcome::Stale
            }
            GfxSurfaceStatus::OutOfDate => {
                log::warn!("swapchain is out of date when present image");
                PresentOutcome::Stale
            }
        })
    }

    /// 用新的 surface 参数重新创建，旧的 swapchain 在新的创建完成之后销毁
    ///
    /// present queue 保持不变，输出 pass 上注册的 program 与 observer 转移到新的 pass。
    /// 创建失败时自身保持不变。调用者需要保证 device 已经 idle
    pub fn rebuild(&mut self, window_extent: vk::Extent2D) -> GfxResult<()> {
        let _span = tracy_client::span!("Swapchain::rebuild");
        let ctx = self.ctx().clone();
        let mut new = Self::create(&ctx, self.present_queue.clone(), window_extent, &self.settings, self.handle())?;
        new.output_pass.adopt_programs(self.output_pass.take_programs());
        new.output_pass.adopt_observers(self.output_pass.take_observers());

        let old = std::mem::replace(self, new);
        drop(old);
        Ok(())
    }
}
// tools
impl Swapchain {
    #[inline]
    fn ctx(&self) -> &GfxContext {
        &self.images.ctx
    }
}
