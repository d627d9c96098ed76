use ash::vk;

/// subpass 的描述，引用的是 render pass 中 attachment 的下标
#[derive(Clone, Debug, Default)]
pub struct GfxSubpassDesc {
    pub bind_point: vk::PipelineBindPoint,
    pub inputs: Vec<vk::AttachmentReference>,
    pub colors: Vec<vk::AttachmentReference>,
    /// 为空，或者与 colors 一一对应
    pub resolves: Vec<vk::AttachmentReference>,
    pub depth_stencil: Option<vk::AttachmentReference>,
}

#[derive(Clone, Debug, Default)]
pub struct GfxRenderPassDesc {
    pub attachments: Vec<vk::AttachmentDescription>,
    pub subpasses: Vec<GfxSubpassDesc>,
    pub dependencies: Vec<vk::SubpassDependency>,
}

/// `vkCmdBeginRenderPass` 所需的参数
#[derive(Clone, Copy)]
pub struct GfxRenderPassBegin<'a> {
    pub render_pass: vk::RenderPass,
    pub framebuffer: vk::Framebuffer,
    pub render_area: vk::Rect2D,
    pub clear_values: &'a [vk::ClearValue],
}
