//! 根据配置文件中的 run node 列表构建 render graph
//!
//! 默认配置：depth-prepass (gfx) -> compute-update (compute) -> graphics (gfx)
//! -> post-process (compute) -> present (gfx)

use ash::vk;
use strata_crate_tools::config::{GraphConfig, QueueConfig};
use strata_gfx::{context::GfxContext, error::GfxResult};
use strata_render_graph::{
    attachment::AttachmentDesc,
    program::SharedProgram,
    render_graph::{RenderGraph, RunNode},
    render_pass::{ExtentPolicy, RenderPass, RenderPassBuilder, Subpass},
    scheduler::GraphBuildInfo,
    settings::RendererSettings,
};

use crate::programs::{compute_demo::ComputeDemoProgram, draw_demo::DrawDemoProgram};

/// pass 的形态由名字决定
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DemoPass {
    /// 只有 depth attachment
    DepthOnly,
    /// 半分辨率的 color
    HalfResColor,
    /// color + depth
    ColorDepth,
}
impl DemoPass {
    pub fn from_name(name: &str) -> Self {
        match name {
            "depth" | "shadow" => Self::DepthOnly,
            "reflection" => Self::HalfResColor,
            _ => Self::ColorDepth,
        }
    }

    pub fn extent_policy(&self) -> ExtentPolicy {
        match self {
            Self::HalfResColor => ExtentPolicy::Surface { divisor: 2 },
            _ => ExtentPolicy::Surface { divisor: 1 },
        }
    }
}

fn build_pass(
    ctx: &GfxContext,
    name: &str,
    info: &GraphBuildInfo,
    settings: &RendererSettings,
) -> GfxResult<RenderPass> {
    let kind = DemoPass::from_name(name);
    let color = AttachmentDesc::color(vk::Format::R16G16B16A16_SFLOAT, vk::SampleCountFlags::TYPE_1);
    let depth = AttachmentDesc::depth(settings.depth_format, vk::SampleCountFlags::TYPE_1);

    let builder = RenderPassBuilder::new(name, info.slot_count).extent_policy(kind.extent_policy());
    let builder = match kind {
        DemoPass::DepthOnly => builder
            .attachment("depth", depth, RendererSettings::depth_clear_value())
            .subpass(Subpass::new().depth_stencil(0)),
        DemoPass::HalfResColor => builder
            .attachment("color", color, settings.clear_value())
            .subpass(Subpass::new().color(0)),
        DemoPass::ColorDepth => builder
            .attachment("color", color, settings.clear_value())
            .attachment("depth", depth, RendererSettings::depth_clear_value())
            .subpass(Subpass::new().color(0).depth_stencil(1)),
    };
    builder.build(ctx, info.surface_extent)
}

/// 每个 pass 注册一个 draw program，每个 compute node 注册一个 compute program
///
/// program 的所有权交给 `programs`，graph 中只保存弱引用
pub fn build_demo_graph(
    ctx: &GfxContext,
    info: &GraphBuildInfo,
    config: &GraphConfig,
    settings: &RendererSettings,
    programs: &mut Vec<SharedProgram>,
) -> GfxResult<RenderGraph> {
    let mut graph = RenderGraph::new(ctx);

    for node_config in &config.nodes {
        for pass_name in &node_config.passes {
            let mut pass = build_pass(ctx, pass_name, info, settings)?;
            let program: SharedProgram = DrawDemoProgram::shared(format!("{}-draw", pass_name));
            pass.register_program(0, &program);
            programs.push(program);
            graph.add_pass(pass)?;
        }

        let mut node = match node_config.queue {
            QueueConfig::Graphics => RunNode::graphics(&node_config.name),
            QueueConfig::Compute => {
                let mut node = RunNode::compute(&node_config.name);
                let program: SharedProgram =
                    ComputeDemoProgram::shared(format!("{}-dispatch", node_config.name), [64, 1, 1]);
                node.register_compute(&program);
                programs.push(program);
                node
            }
        };
        for pass_name in &node_config.passes {
            node = node.pass(pass_name);
        }
        if node_config.presents {
            node = node.presents();
        }
        graph.add_node(node)?;
    }

    Ok(graph)
}
