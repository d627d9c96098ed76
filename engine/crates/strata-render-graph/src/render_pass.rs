//! Render pass：有序的 attachment 与 subpass，每个 frame slot 一个 framebuffer
//!
//! render pass 本身不持有 queue 和 command buffer，command buffer 在 `begin` 时由外部传入。

use std::{
    cell::RefCell,
    rc::{Rc, Weak},
};

use ash::vk;
use itertools::Itertools;
use strata_gfx::{
    context::GfxContext,
    device::GfxDevice,
    error::{GfxError, GfxResult},
    resources::{
        image::GfxImage,
        render_pass::{GfxRenderPassBegin, GfxRenderPassDesc, GfxSubpassDesc},
    },
};

use crate::{
    attachment::{Attachment, AttachmentDesc},
    program::{ProgramKind, ProgramList, SharedProgram},
};

/// render pass 的尺寸来源
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExtentPolicy {
    /// 固定尺寸，surface 变化时只跟随 image count
    Fixed(vk::Extent2D),
    /// surface 尺寸除以 divisor，例如半分辨率的反射
    Surface { divisor: u32 },
}
impl ExtentPolicy {
    /// surface 为 0（最小化）时返回 0，否则每个维度至少为 1
    pub fn resolve(&self, surface_extent: vk::Extent2D) -> vk::Extent2D {
        match *self {
            Self::Fixed(extent) => extent,
            Self::Surface { divisor } => {
                let divisor = divisor.max(1);
                let scale = |v: u32| if v == 0 { 0 } else { (v / divisor).max(1) };
                vk::Extent2D {
                    width: scale(surface_extent.width),
                    height: scale(surface_extent.height),
                }
            }
        }
    }
}

/// 需要知道 render pass 被 resize 的对象，例如引用其输出的 descriptor
pub trait ResizeObserver {
    fn on_resized(&mut self, pass: &RenderPass);
}

pub type WeakResizeObserver = Weak<RefCell<dyn ResizeObserver>>;

/// subpass 引用 attachment 的下标，并按注册顺序持有 draw program
#[derive(Default)]
pub struct Subpass {
    inputs: Vec<usize>,
    colors: Vec<usize>,
    resolves: Vec<usize>,
    depth_stencil: Option<usize>,
    programs: ProgramList,
}
// new & init
impl Subpass {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn input(mut self, attachment: usize) -> Self {
        self.inputs.push(attachment);
        self
    }

    #[inline]
    pub fn color(mut self, attachment: usize) -> Self {
        self.colors.push(attachment);
        self
    }

    /// 与 color 一一对应
    #[inline]
    pub fn resolve(mut self, attachment: usize) -> Self {
        self.resolves.push(attachment);
        self
    }

    #[inline]
    pub fn depth_stencil(mut self, attachment: usize) -> Self {
        self.depth_stencil = Some(attachment);
        self
    }
}
// tools
impl Subpass {
    /// 只接受 `ProgramKind::Draw`
    pub fn register(&mut self, program: &SharedProgram) -> bool {
        self.programs.register(program, ProgramKind::Draw)
    }

    #[inline]
    pub fn programs(&self) -> &ProgramList {
        &self.programs
    }

    fn attachment_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.inputs.iter().chain(&self.colors).chain(&self.resolves).chain(&self.depth_stencil).copied()
    }

    fn vk_desc(&self) -> GfxSubpassDesc {
        let reference = |layout: vk::ImageLayout| {
            move |index: &usize| vk::AttachmentReference {
                attachment: *index as u32,
                layout,
            }
        };
        GfxSubpassDesc {
            bind_point: vk::PipelineBindPoint::GRAPHICS,
            inputs: self.inputs.iter().map(reference(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)).collect(),
            colors: self.colors.iter().map(reference(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)).collect(),
            resolves: self.resolves.iter().map(reference(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)).collect(),
            depth_stencil: self
                .depth_stencil
                .as_ref()
                .map(reference(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)),
        }
    }
}

enum PendingAttachment {
    Owned {
        name: String,
        desc: AttachmentDesc,
        clear_value: vk::ClearValue,
    },
    Borrowed(Attachment),
}

pub struct RenderPassBuilder {
    name: String,
    image_count: usize,
    extent_policy: ExtentPolicy,
    output_attachment_index: usize,
    attachments: Vec<PendingAttachment>,
    subpasses: Vec<Subpass>,
    dependencies: Vec<vk::SubpassDependency>,
    external_dependencies: bool,
}
// new & init
impl RenderPassBuilder {
    pub fn new(name: impl Into<String>, image_count: usize) -> Self {
        Self {
            name: name.into(),
            image_count,
            extent_policy: ExtentPolicy::Surface { divisor: 1 },
            output_attachment_index: 0,
            attachments: vec![],
            subpasses: vec![],
            dependencies: vec![],
            external_dependencies: false,
        }
    }

    #[inline]
    pub fn extent(mut self, extent: vk::Extent2D) -> Self {
        self.extent_policy = ExtentPolicy::Fixed(extent);
        self
    }

    #[inline]
    pub fn extent_policy(mut self, policy: ExtentPolicy) -> Self {
        self.extent_policy = policy;
        self
    }

    #[inline]
    pub fn output_attachment_index(mut self, index: usize) -> Self {
        self.output_attachment_index = index;
        self
    }

    /// 由 render pass 创建的 attachment，每个 slot 一张 image
    pub fn attachment(mut self, name: impl Into<String>, desc: AttachmentDesc, clear_value: vk::ClearValue) -> Self {
        self.attachments.push(PendingAttachment::Owned {
            name: name.into(),
            desc,
            clear_value,
        });
        self
    }

    pub fn borrowed_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(PendingAttachment::Borrowed(attachment));
        self
    }

    pub fn subpass(mut self, subpass: Subpass) -> Self {
        self.subpasses.push(subpass);
        self
    }

    pub fn dependency(mut self, dependency: vk::SubpassDependency) -> Self {
        self.dependencies.push(dependency);
        self
    }

    /// 添加 external -> 第一个 subpass，以及最后一个 subpass -> external 的 color 依赖
    pub fn external_dependencies(mut self) -> Self {
        self.external_dependencies = true;
        self
    }

    pub fn build(self, ctx: &GfxContext, surface_extent: vk::Extent2D) -> GfxResult<RenderPass> {
        let _span = tracy_client::span!("RenderPassBuilder::build");
        let extent = self.extent_policy.resolve(surface_extent);
        if extent.width == 0 || extent.height == 0 {
            return Err(GfxError::InvalidGraph(format!("render pass {} has zero extent", self.name)));
        }
        if self.subpasses.is_empty() {
            return Err(GfxError::InvalidGraph(format!("render pass {} has no subpass", self.name)));
        }
        if self.output_attachment_index >= self.attachments.len() {
            return Err(GfxError::InvalidGraph(format!(
                "render pass {}: output attachment {} out of range",
                self.name, self.output_attachment_index
            )));
        }
        if let Some(index) = self
            .subpasses
            .iter()
            .flat_map(|subpass| subpass.attachment_indices())
            .find(|index| *index >= self.attachments.len())
        {
            return Err(GfxError::InvalidGraph(format!(
                "render pass {}: attachment {} out of range",
                self.name, index
            )));
        }

        for index in self.subpasses.iter().filter_map(|subpass| subpass.depth_stencil) {
            let desc = match &self.attachments[index] {
                PendingAttachment::Owned { desc, .. } => *desc,
                PendingAttachment::Borrowed(attachment) => *attachment.desc(),
            };
            if !desc.aspect.contains(vk::ImageAspectFlags::DEPTH) {
                return Err(GfxError::UnsupportedFormat(desc.format));
            }
        }

        let mut dependencies = self.dependencies;
        if self.external_dependencies {
            dependencies.extend(Self::color_external_dependencies(self.subpasses.len() as u32));
        }

        // 先构造出空的 render pass，后续失败时由 Drop 回收已经创建的资源
        let mut pass = RenderPass {
            ctx: ctx.clone(),
            name: self.name,
            handle: vk::RenderPass::null(),
            attachments: Vec::with_capacity(self.attachments.len()),
            subpasses: self.subpasses,
            dependencies,
            framebuffers: vec![],
            output_attachment_index: self.output_attachment_index,
            extent,
            extent_policy: self.extent_policy,
            image_count: self.image_count,
            observers: vec![],
        };

        for (i, pending) in self.attachments.into_iter().enumerate() {
            let attachment = match pending {
                PendingAttachment::Owned {
                    name,
                    desc,
                    clear_value,
                } => Attachment::new_owned(
                    ctx.device(),
                    format!("{}-{}", pass.name, name),
                    desc,
                    clear_value,
                    pass.image_count,
                    extent,
                )?,
                PendingAttachment::Borrowed(attachment) => {
                    if attachment.image_count() != pass.image_count {
                        return Err(GfxError::InvalidGraph(format!(
                            "render pass {}: borrowed attachment {} has {} images, expected {}",
                            pass.name,
                            i,
                            attachment.image_count(),
                            pass.image_count
                        )));
                    }
                    attachment
                }
            };
            pass.attachments.push(attachment);
        }

        let desc = GfxRenderPassDesc {
            attachments: pass.attachments.iter().map(|a| a.desc().vk_description()).collect(),
            subpasses: pass.subpasses.iter().map(Subpass::vk_desc).collect(),
            dependencies: pass.dependencies.clone(),
        };
        pass.handle = ctx.device().create_render_pass(&desc, &pass.name)?;
        pass.create_framebuffers()?;

        log::info!(
            "create render pass {}: {}x{}, {} attachments, {} subpasses, {} framebuffers",
            pass.name,
            extent.width,
            extent.height,
            pass.attachments.len(),
            pass.subpasses.len(),
            pass.framebuffers.len()
        );
        Ok(pass)
    }

    fn color_external_dependencies(subpass_count: u32) -> [vk::SubpassDependency; 2] {
        let color_output = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT;
        [
            vk::SubpassDependency::default()
                .src_subpass(vk::SUBPASS_EXTERNAL)
                .dst_subpass(0)
                .src_stage_mask(color_output)
                .dst_stage_mask(color_output)
                .src_access_mask(vk::AccessFlags::empty())
                .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE),
            vk::SubpassDependency::default()
                .src_subpass(subpass_count - 1)
                .dst_subpass(vk::SUBPASS_EXTERNAL)
                .src_stage_mask(color_output)
                .dst_stage_mask(vk::PipelineStageFlags::BOTTOM_OF_PIPE)
                .src_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
                .dst_access_mask(vk::AccessFlags::empty()),
        ]
    }
}

pub struct RenderPass {
    ctx: GfxContext,
    name: String,
    handle: vk::RenderPass,

    attachments: Vec<Attachment>,
    subpasses: Vec<Subpass>,
    dependencies: Vec<vk::SubpassDependency>,

    /// 每个 slot 一个
    framebuffers: Vec<vk::Framebuffer>,
    output_attachment_index: usize,

    extent: vk::Extent2D,
    extent_policy: ExtentPolicy,
    image_count: usize,

    observers: Vec<WeakResizeObserver>,
}
// getters
impl RenderPass {
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn handle(&self) -> vk::RenderPass {
        self.handle
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn extent_policy(&self) -> ExtentPolicy {
        self.extent_policy
    }

    #[inline]
    pub fn image_count(&self) -> usize {
        self.image_count
    }

    #[inline]
    pub fn framebuffers(&self) -> &[vk::Framebuffer] {
        &self.framebuffers
    }

    #[inline]
    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }

    #[inline]
    pub fn subpass_count(&self) -> usize {
        self.subpasses.len()
    }

    #[inline]
    pub fn output_attachment_index(&self) -> usize {
        self.output_attachment_index
    }

    /// 第 frame 个 slot 的输出 image，供后续 pass 或 swapchain 使用
    #[inline]
    pub fn output_image(&self, frame: usize) -> &GfxImage {
        self.attachments[self.output_attachment_index].image(frame)
    }
}
// programs & observers
impl RenderPass {
    /// program 注册到指定的 subpass，只接受 `ProgramKind::Draw`
    pub fn register_program(&mut self, subpass: usize, program: &SharedProgram) -> bool {
        match self.subpasses.get_mut(subpass) {
            Some(subpass) => subpass.register(program),
            None => {
                log::warn!("render pass {} has no subpass {}", self.name, subpass);
                false
            }
        }
    }

    pub fn add_observer(&mut self, observer: WeakResizeObserver) {
        self.observers.push(observer);
    }

    pub fn init_programs(&self) -> GfxResult<()> {
        for subpass in &self.subpasses {
            subpass.programs.init_all(&self.ctx)?;
        }
        Ok(())
    }

    /// 按 subpass 取出所有 program 的注册
    pub fn take_programs(&mut self) -> Vec<ProgramList> {
        self.subpasses.iter_mut().map(|subpass| subpass.programs.take()).collect()
    }

    /// 按 subpass 下标接收注册；多出来的 subpass 的注册会被丢弃
    pub fn adopt_programs(&mut self, programs: Vec<ProgramList>) {
        for (i, list) in programs.into_iter().enumerate() {
            match self.subpasses.get_mut(i) {
                Some(subpass) => subpass.programs.append(list),
                None if !list.is_empty() => {
                    log::warn!("render pass {} has no subpass {}, {} programs dropped", self.name, i, list.len())
                }
                None => (),
            }
        }
    }

    pub fn take_observers(&mut self) -> Vec<WeakResizeObserver> {
        std::mem::take(&mut self.observers)
    }

    pub fn adopt_observers(&mut self, observers: Vec<WeakResizeObserver>) {
        self.observers.extend(observers);
    }
}
// update
impl RenderPass {
    /// 绑定 slot 对应的 framebuffer，设置 clear value、viewport 与 scissor
    pub fn begin(&self, cmd: vk::CommandBuffer, slot_index: usize) {
        let _span = tracy_client::span!("RenderPass::begin");
        let device = self.ctx.device();
        let clear_values = self.attachments.iter().map(Attachment::clear_value).collect_vec();
        let render_area = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: self.extent,
        };

        device.cmd_begin_render_pass(
            cmd,
            &GfxRenderPassBegin {
                render_pass: self.handle,
                framebuffer: self.framebuffers[slot_index],
                render_area,
                clear_values: &clear_values,
            },
        );
        device.cmd_set_viewport(
            cmd,
            vk::Viewport {
                x: 0.0,
                y: 0.0,
                width: self.extent.width as f32,
                height: self.extent.height as f32,
                min_depth: 0.0,
                max_depth: 1.0,
            },
        );
        device.cmd_set_scissor(cmd, render_area);
    }

    /// 依次录制每个 subpass，subpass 之间切换到下一个
    pub fn draw(&self, cmd: vk::CommandBuffer) {
        let _span = tracy_client::span!("RenderPass::draw");
        for (i, subpass) in self.subpasses.iter().enumerate() {
            if i > 0 {
                self.ctx.device().cmd_next_subpass(cmd);
            }
            subpass.programs.record_all(cmd);
        }
    }

    pub fn update(&self, delta_time: f32) {
        for subpass in &self.subpasses {
            subpass.programs.update_all(delta_time);
        }
    }

    pub fn end(&self, cmd: vk::CommandBuffer) {
        self.ctx.device().cmd_end_render_pass(cmd);
    }

    /// 重新创建所有 owned attachment 与 framebuffer，description 不变
    ///
    /// 参数与当前一致，或者 extent 为 0（窗口最小化）时什么也不做，返回 false
    pub fn resize(&mut self, image_count: usize, extent: vk::Extent2D) -> GfxResult<bool> {
        if extent.width == 0 || extent.height == 0 {
            return Ok(false);
        }
        if image_count == self.image_count && extent == self.extent {
            return Ok(false);
        }
        let _span = tracy_client::span!("RenderPass::resize");
        if let Some(attachment) = self.attachments.iter().find(|a| a.is_borrowed() && a.image_count() != image_count) {
            return Err(GfxError::ExternalResize(attachment.name().to_string()));
        }

        log::info!(
            "resize render pass {}: {}x{} x{} -> {}x{} x{}",
            self.name,
            self.extent.width,
            self.extent.height,
            self.image_count,
            extent.width,
            extent.height,
            image_count
        );

        self.ctx.device().wait_idle()?;

        // 新的 image 与 framebuffer 全部创建成功之后才替换，失败时当前状态保持不变
        let device = self.ctx.device();
        let mut new_images: Vec<Option<Vec<GfxImage>>> = Vec::with_capacity(self.attachments.len());
        let mut created = Ok(());
        for attachment in &self.attachments {
            if attachment.is_borrowed() {
                new_images.push(None);
                continue;
            }
            match attachment.create_resized_images(device, image_count, extent) {
                Ok(images) => new_images.push(Some(images)),
                Err(e) => {
                    created = Err(e);
                    break;
                }
            }
        }
        let framebuffers = created.and_then(|_| {
            Self::create_framebuffers_for(device, self.handle, &self.name, image_count, extent, |i| {
                self.attachments
                    .iter()
                    .zip(&new_images)
                    .map(|(attachment, images)| match images {
                        Some(images) => images[i].view,
                        None => attachment.image(i).view,
                    })
                    .collect_vec()
            })
        });
        let framebuffers = match framebuffers {
            Ok(framebuffers) => framebuffers,
            Err(e) => {
                new_images.into_iter().flatten().flatten().for_each(|image| device.destroy_image(image));
                log::error!("failed to resize render pass {}: {}", self.name, e);
                return Err(e);
            }
        };

        self.destroy_framebuffers();
        let device = self.ctx.device();
        for (attachment, images) in self.attachments.iter_mut().zip(new_images) {
            if let Some(images) = images {
                attachment.replace_images(device, images);
            }
        }
        self.framebuffers = framebuffers;
        self.image_count = image_count;
        self.extent = extent;

        let observers = self.observers.iter().filter_map(Weak::upgrade).collect_vec();
        self.observers.retain(|observer| observer.strong_count() > 0);
        for observer in observers {
            observer.borrow_mut().on_resized(self);
        }
        Ok(true)
    }

    /// 按照 extent policy 跟随 surface 变化
    pub fn resize_surface_relative(&mut self, image_count: usize, surface_extent: vk::Extent2D) -> GfxResult<bool> {
        if surface_extent.width == 0 || surface_extent.height == 0 {
            return Ok(false);
        }
        let extent = self.extent_policy.resolve(surface_extent);
        self.resize(image_count, extent)
    }
}
// tools
impl RenderPass {
    fn create_framebuffers(&mut self) -> GfxResult<()> {
        let attachments = &self.attachments;
        let framebuffers = Self::create_framebuffers_for(
            self.ctx.device(),
            self.handle,
            &self.name,
            self.image_count,
            self.extent,
            |i| attachments.iter().map(|a| a.image(i).view).collect_vec(),
        )?;
        self.framebuffers = framebuffers;
        Ok(())
    }

    /// 失败时销毁已经创建的 framebuffer
    fn create_framebuffers_for(
        device: &dyn GfxDevice,
        render_pass: vk::RenderPass,
        name: &str,
        image_count: usize,
        extent: vk::Extent2D,
        views_of: impl Fn(usize) -> Vec<vk::ImageView>,
    ) -> GfxResult<Vec<vk::Framebuffer>> {
        let mut framebuffers = Vec::with_capacity(image_count);
        for i in 0..image_count {
            match device.create_framebuffer(render_pass, &views_of(i), extent, &format!("{}-{}", name, i)) {
                Ok(framebuffer) => framebuffers.push(framebuffer),
                Err(e) => {
                    framebuffers.into_iter().for_each(|framebuffer| device.destroy_framebuffer(framebuffer));
                    return Err(e);
                }
            }
        }
        Ok(framebuffers)
    }

    fn destroy_framebuffers(&mut self) {
        let device = self.ctx.device();
        for framebuffer in self.framebuffers.drain(..) {
            device.destroy_framebuffer(framebuffer);
        }
    }
}
// destroy
impl Drop for RenderPass {
    fn drop(&mut self) {
        log::debug!("destroy render pass {}", self.name);
        self.destroy_framebuffers();
        let device = self.ctx.device();
        if self.handle != vk::RenderPass::null() {
            device.destroy_render_pass(self.handle);
        }
        for attachment in &mut self.attachments {
            attachment.destroy(device);
        }
    }
}

#[cfg(test)]
mod tests {
    use ash::vk::Handle;

    use super::*;
    use crate::{
        program::tests::LogProgram,
        settings::RendererSettings,
        test_device::{Call, TestDevice},
    };

    const EXTENT: vk::Extent2D = vk::Extent2D {
        width: 800,
        height: 600,
    };

    fn scene_pass(ctx: &GfxContext, image_count: usize) -> RenderPass {
        let settings = RendererSettings::default();
        RenderPassBuilder::new("scene", image_count)
            .attachment(
                "color",
                AttachmentDesc::color(vk::Format::R16G16B16A16_SFLOAT, vk::SampleCountFlags::TYPE_1),
                settings.clear_value(),
            )
            .attachment(
                "depth",
                AttachmentDesc::depth(vk::Format::D32_SFLOAT, vk::SampleCountFlags::TYPE_1),
                RendererSettings::depth_clear_value(),
            )
            .subpass(Subpass::new().color(0).depth_stencil(1))
            .subpass(Subpass::new().color(0))
            .build(ctx, EXTENT)
            .unwrap()
    }

    struct CountObserver {
        extents: Vec<vk::Extent2D>,
    }
    impl ResizeObserver for CountObserver {
        fn on_resized(&mut self, pass: &RenderPass) {
            self.extents.push(pass.extent());
        }
    }

    #[test]
    fn test_extent_policy() {
        let half = ExtentPolicy::Surface { divisor: 2 };
        assert_eq!(half.resolve(EXTENT), vk::Extent2D { width: 400, height: 300 });
        assert_eq!(half.resolve(vk::Extent2D { width: 1, height: 0 }), vk::Extent2D { width: 1, height: 0 });
        let fixed = ExtentPolicy::Fixed(vk::Extent2D { width: 64, height: 64 });
        assert_eq!(fixed.resolve(EXTENT), vk::Extent2D { width: 64, height: 64 });
    }

    #[test]
    fn test_build_one_framebuffer_per_slot() {
        let device = TestDevice::new(EXTENT);
        let ctx = device.context();
        let pass = scene_pass(&ctx, 3);
        assert_eq!(pass.framebuffers().len(), 3);
        assert_eq!(pass.attachments().len(), 2);
        assert!(pass.attachments().iter().all(|a| a.image_count() == 3));
        assert_eq!(device.live("image"), 6);

        drop(pass);
        assert_eq!(device.live("image"), 0);
        assert_eq!(device.live("framebuffer"), 0);
        assert_eq!(device.live("render_pass"), 0);
    }

    #[test]
    fn test_invalid_attachment_index() {
        let device = TestDevice::new(EXTENT);
        let ctx = device.context();
        let result = RenderPassBuilder::new("broken", 2)
            .attachment(
                "color",
                AttachmentDesc::color(vk::Format::B8G8R8A8_SRGB, vk::SampleCountFlags::TYPE_1),
                RendererSettings::default().clear_value(),
            )
            .subpass(Subpass::new().color(3))
            .build(&ctx, EXTENT);
        assert!(matches!(result, Err(GfxError::InvalidGraph(_))));
        assert_eq!(device.live("image"), 0);
    }

    #[test]
    fn test_depth_attachment_needs_depth_format() {
        let device = TestDevice::new(EXTENT);
        let ctx = device.context();
        let result = RenderPassBuilder::new("broken", 2)
            .attachment(
                "not-depth",
                AttachmentDesc::color(vk::Format::B8G8R8A8_SRGB, vk::SampleCountFlags::TYPE_1),
                RendererSettings::default().clear_value(),
            )
            .subpass(Subpass::new().depth_stencil(0))
            .build(&ctx, EXTENT);
        assert!(matches!(result, Err(GfxError::UnsupportedFormat(vk::Format::B8G8R8A8_SRGB))));
    }

    #[test]
    fn test_begin_draw_end() {
        let device = TestDevice::new(EXTENT);
        let ctx = device.context();
        let mut pass = scene_pass(&ctx, 2);

        let log = Rc::new(RefCell::new(vec![]));
        let a: SharedProgram = LogProgram::shared("a", ProgramKind::Draw, &log);
        let b: SharedProgram = LogProgram::shared("b", ProgramKind::Draw, &log);
        let c: SharedProgram = LogProgram::shared("c", ProgramKind::Draw, &log);
        assert!(pass.register_program(0, &a));
        assert!(pass.register_program(0, &b));
        assert!(pass.register_program(1, &c));
        assert!(!pass.register_program(2, &c));

        device.clear_calls();
        let cmd = vk::CommandBuffer::from_raw(0x42);
        pass.update(0.016);
        pass.begin(cmd, 1);
        pass.draw(cmd);
        pass.end(cmd);

        assert_eq!(*log.borrow(), vec!["update:a", "update:b", "update:c", "record:a", "record:b", "record:c"]);
        assert_eq!(
            device.calls(),
            vec![
                Call::BeginRenderPass {
                    cmd,
                    render_pass: pass.handle(),
                    framebuffer: pass.framebuffers()[1],
                    extent: EXTENT,
                    clear_value_count: 2,
                },
                Call::SetViewport {
                    cmd,
                    width: 800.0,
                    height: 600.0,
                    max_depth: 1.0,
                },
                Call::SetScissor { cmd, extent: EXTENT },
                Call::NextSubpass(cmd),
                Call::EndRenderPass(cmd),
            ]
        );
    }

    #[test]
    fn test_resize_twice_keeps_framebuffers() {
        let device = TestDevice::new(EXTENT);
        let ctx = device.context();
        let mut pass = scene_pass(&ctx, 3);
        let new_extent = vk::Extent2D {
            width: 1024,
            height: 768,
        };

        assert!(pass.resize(3, new_extent).unwrap());
        let framebuffers = pass.framebuffers().to_vec();
        assert_eq!(framebuffers.len(), 3);

        device.clear_calls();
        assert!(!pass.resize(3, new_extent).unwrap());
        assert_eq!(pass.framebuffers(), framebuffers.as_slice());
        assert!(device.calls().is_empty());
    }

    #[test]
    fn test_minimized_resize_is_noop() {
        let device = TestDevice::new(EXTENT);
        let ctx = device.context();
        let mut pass = scene_pass(&ctx, 3);
        let framebuffers = pass.framebuffers().to_vec();

        device.clear_calls();
        assert!(!pass.resize(3, vk::Extent2D { width: 0, height: 600 }).unwrap());
        assert!(!pass.resize(2, vk::Extent2D { width: 800, height: 0 }).unwrap());
        assert_eq!(pass.framebuffers(), framebuffers.as_slice());
        assert_eq!(pass.image_count(), 3);
        assert_eq!(device.count(|call| matches!(call, Call::DestroyFramebuffer(_))), 0);
    }

    #[test]
    fn test_failed_resize_keeps_pass_usable() {
        let device = TestDevice::new(EXTENT);
        let ctx = device.context();
        let mut pass = scene_pass(&ctx, 3);
        let framebuffers = pass.framebuffers().to_vec();
        let images = pass.attachments()[0].images().iter().map(|image| image.handle).collect_vec();

        device.set_framebuffer_budget(Some(2));
        let result = pass.resize(3, vk::Extent2D { width: 1024, height: 768 });
        assert!(matches!(result, Err(GfxError::Vulkan { .. })));

        assert_eq!(pass.extent(), EXTENT);
        assert_eq!(pass.image_count(), 3);
        assert_eq!(pass.framebuffers(), framebuffers.as_slice());
        assert_eq!(pass.attachments()[0].images().iter().map(|image| image.handle).collect_vec(), images);
        assert_eq!(device.live("framebuffer"), 3);
        assert_eq!(device.live("image"), 6);

        device.set_framebuffer_budget(None);
        let cmd = vk::CommandBuffer::from_raw(0x42);
        pass.begin(cmd, 2);
        pass.end(cmd);
        assert!(pass.resize(3, vk::Extent2D { width: 1024, height: 768 }).unwrap());
        assert_eq!(device.live("framebuffer"), 3);
        assert_eq!(device.live("image"), 6);
    }

    #[test]
    fn test_resize_rebuilds_and_notifies() {
        let device = TestDevice::new(EXTENT);
        let ctx = device.context();
        let mut pass = scene_pass(&ctx, 3);
        let observer = Rc::new(RefCell::new(CountObserver { extents: vec![] }));
        let weak: WeakResizeObserver = Rc::downgrade(&(observer.clone() as Rc<RefCell<dyn ResizeObserver>>));
        pass.add_observer(weak);

        let old = pass.framebuffers().to_vec();
        let new_extent = vk::Extent2D { width: 640, height: 480 };
        device.clear_calls();
        assert!(pass.resize(2, new_extent).unwrap());

        let calls = device.calls();
        assert_eq!(calls.first(), Some(&Call::WaitIdle));
        assert_eq!(device.count(|call| matches!(call, Call::DestroyFramebuffer(_))), 3);
        assert_eq!(device.count(|call| matches!(call, Call::CreateFramebuffer(_))), 2);
        assert!(pass.framebuffers().iter().all(|fb| !old.contains(fb)));
        assert!(pass.attachments().iter().all(|a| a.image_count() == 2));
        assert_eq!(pass.output_image(1).extent(), new_extent);
        assert_eq!(observer.borrow().extents, vec![new_extent]);
        assert_eq!(device.live("image"), 4);
    }

    #[test]
    fn test_program_transfer() {
        let device = TestDevice::new(EXTENT);
        let ctx = device.context();
        let log = Rc::new(RefCell::new(vec![]));
        let a: SharedProgram = LogProgram::shared("a", ProgramKind::Draw, &log);

        let mut old = scene_pass(&ctx, 2);
        old.register_program(1, &a);
        let mut new = scene_pass(&ctx, 2);
        new.adopt_programs(old.take_programs());

        old.draw(vk::CommandBuffer::null());
        assert!(log.borrow().is_empty());
        new.draw(vk::CommandBuffer::null());
        assert_eq!(*log.borrow(), vec!["record:a"]);
    }
}
