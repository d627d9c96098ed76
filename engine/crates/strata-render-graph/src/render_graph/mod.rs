//! 按声明顺序排列的 run node
//!
//! 每个 node 是 frame ring 中的一个 stage：共享同一个 command buffer，提交到自己的 queue，
//! 与相邻的 node 通过 semaphore 串联。不做依赖分析，顺序就是 `add_node` 的顺序。

pub mod run_node;
pub mod submission;

use ash::vk;
use indexmap::IndexMap;
use strata_gfx::{
    commands::queue::QueueKind,
    context::GfxContext,
    error::{GfxError, GfxResult},
    resources::image::GfxImage,
};

use crate::{
    frame_ring::{FrameSlot, StageDecl},
    render_pass::RenderPass,
    swapchain::Swapchain,
};
pub use run_node::RunNode;

pub struct RenderGraph {
    ctx: GfxContext,
    /// 按照添加顺序保存
    passes: IndexMap<String, RenderPass>,
    nodes: Vec<RunNode>,
}
// new & init
impl RenderGraph {
    pub fn new(ctx: &GfxContext) -> Self {
        Self {
            ctx: ctx.clone(),
            passes: IndexMap::new(),
            nodes: vec![],
        }
    }

    pub fn add_pass(&mut self, pass: RenderPass) -> GfxResult<()> {
        if self.passes.contains_key(pass.name()) {
            return Err(GfxError::InvalidGraph(format!("render pass {} already exists", pass.name())));
        }
        self.passes.insert(pass.name().to_string(), pass);
        Ok(())
    }

    /// node 引用的 pass 必须已经添加，且不能被其他 node 引用
    pub fn add_node(&mut self, node: RunNode) -> GfxResult<()> {
        let invalid =
            |msg: String| -> GfxResult<()> { Err(GfxError::InvalidGraph(format!("run node {}: {}", node.name(), msg))) };

        if self.nodes.iter().any(|n| n.name() == node.name()) {
            return invalid("duplicated name".to_string());
        }
        if node.queue() == QueueKind::Compute && !node.passes().is_empty() {
            return invalid("compute node can not own render passes".to_string());
        }
        if node.queue() == QueueKind::Compute && node.is_presenting() {
            return invalid("compute node can not record the swapchain pass".to_string());
        }
        if node.is_presenting() && self.nodes.iter().any(RunNode::is_presenting) {
            return invalid("only one node can present".to_string());
        }
        for pass in node.passes() {
            if !self.passes.contains_key(pass) {
                return invalid(format!("unknown render pass {}", pass));
            }
            if let Some(owner) = self.nodes.iter().find(|n| n.passes().contains(pass)) {
                return invalid(format!("render pass {} is already owned by {}", pass, owner.name()));
            }
        }

        self.nodes.push(node);
        Ok(())
    }

    /// 在交给 scheduler 之前检查
    pub fn validate(&self) -> GfxResult<()> {
        if self.nodes.is_empty() {
            return Err(GfxError::InvalidGraph("render graph has no run node".to_string()));
        }
        if self.present_node_index().is_none() {
            return Err(GfxError::InvalidGraph("render graph has no graphics node to present".to_string()));
        }
        for name in self.passes.keys() {
            if !self.nodes.iter().any(|node| node.passes().contains(name)) {
                log::warn!("render pass {} is not recorded by any run node", name);
            }
        }
        Ok(())
    }

    pub fn init_programs(&self) -> GfxResult<()> {
        for node in &self.nodes {
            node.compute_programs().init_all(&self.ctx)?;
        }
        for pass in self.passes.values() {
            pass.init_programs()?;
        }
        Ok(())
    }
}
// getters
impl RenderGraph {
    /// frame ring 的 stage 声明，与 node 一一对应
    pub fn stages(&self) -> Vec<StageDecl> {
        self.nodes.iter().map(|node| StageDecl::new(node.name(), node.queue())).collect()
    }

    #[inline]
    pub fn nodes(&self) -> &[RunNode] {
        &self.nodes
    }

    #[inline]
    pub fn node_mut(&mut self, name: &str) -> Option<&mut RunNode> {
        self.nodes.iter_mut().find(|node| node.name() == name)
    }

    #[inline]
    pub fn pass(&self, name: &str) -> Option<&RenderPass> {
        self.passes.get(name)
    }

    #[inline]
    pub fn pass_mut(&mut self, name: &str) -> Option<&mut RenderPass> {
        self.passes.get_mut(name)
    }

    /// 录制 swapchain 输出 pass 的 node：标记了 presents 的 node，没有标记时为最后一个 graphics node
    pub fn present_node_index(&self) -> Option<usize> {
        self.nodes
            .iter()
            .position(RunNode::is_presenting)
            .or_else(|| self.nodes.iter().rposition(|node| node.queue() == QueueKind::Graphics))
    }

    /// 某个 pass 在第 frame 个 slot 的输出
    pub fn output_image(&self, pass: &str, frame: usize) -> Option<&GfxImage> {
        self.passes.get(pass).map(|pass| pass.output_image(frame))
    }
}
// update
impl RenderGraph {
    pub fn update(&self, delta_time: f32) {
        let _span = tracy_client::span!("RenderGraph::update");
        for node in &self.nodes {
            node.compute_programs().update_all(delta_time);
            for pass in node.passes() {
                if let Some(pass) = self.passes.get(pass) {
                    pass.update(delta_time);
                }
            }
        }
    }

    /// 每个 node 录制到 slot 中对应 stage 的 command buffer
    ///
    /// graph 中的 pass 使用 slot 下标选择 framebuffer，swapchain 的输出 pass 使用 image index
    pub fn record(&self, slot: &FrameSlot, swapchain: &Swapchain, image_index: u32) {
        let _span = tracy_client::span!("RenderGraph::record");
        assert_eq!(slot.stages().len(), self.nodes.len(), "frame slot does not match render graph");
        let present_node = self.present_node_index();

        for (i, node) in self.nodes.iter().enumerate() {
            let cmd = slot.stage(i).command_buffer();
            node.compute_programs().record_all(cmd);

            for pass in node.passes() {
                if let Some(pass) = self.passes.get(pass) {
                    Self::record_pass(pass, cmd, slot.index());
                }
            }

            if present_node == Some(i) {
                Self::record_pass(swapchain.output_pass(), cmd, image_index as usize);
            }
        }
    }

    /// surface 变化之后，跟随 surface 尺寸的 pass 重新创建 attachment
    pub fn resize_surface_relative(&mut self, image_count: usize, surface_extent: vk::Extent2D) -> GfxResult<()> {
        for pass in self.passes.values_mut() {
            pass.resize_surface_relative(image_count, surface_extent)?;
        }
        Ok(())
    }
}
// tools
impl RenderGraph {
    fn record_pass(pass: &RenderPass, cmd: vk::CommandBuffer, frame: usize) {
        pass.begin(cmd, frame);
        pass.draw(cmd);
        pass.end(cmd);
    }
}
