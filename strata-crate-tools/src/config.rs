//! 引擎配置
//!
//! 从 TOML 文件读取，文件不存在时使用默认值。查找顺序：
//! 1. 环境变量 `STRATA_CONFIG` 指定的路径
//! 2. 工作区根目录下的 `strata.toml`

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::resource::StrataPath;

pub const CONFIG_ENV: &str = "STRATA_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "strata.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub window: WindowConfig,
    pub renderer: RendererConfig,
    pub graph: GraphConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
}
impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Strata".to_string(),
            width: 1280,
            height: 720,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresentModeConfig {
    Mailbox,
    Fifo,
    Immediate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SurfaceFormatConfig {
    Bgra8Srgb,
    Rgba8Srgb,
    A2b10g10r10,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// frame slot 的期望数量，最终会受到 surface 支持的 image 数量约束
    pub frame_slots: u32,
    pub present_mode: PresentModeConfig,
    pub surface_format: SurfaceFormatConfig,
    /// 1, 2, 4, 8
    pub msaa_samples: u32,
    pub clear_color: [f32; 4],
    /// 是否开启 validation layer
    pub validation: bool,
}
impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            frame_slots: 3,
            present_mode: PresentModeConfig::Mailbox,
            surface_format: SurfaceFormatConfig::A2b10g10r10,
            msaa_samples: 1,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            validation: cfg!(debug_assertions),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueConfig {
    Graphics,
    Compute,
}

/// 一个 run node：共享同一个 command buffer 的一组 render pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    pub name: String,
    pub queue: QueueConfig,
    #[serde(default)]
    pub passes: Vec<String>,
    /// 是否在该 node 的末尾录制 swapchain 的 render pass
    #[serde(default)]
    pub presents: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    #[serde(rename = "node")]
    pub nodes: Vec<NodeConfig>,
}
impl Default for GraphConfig {
    /// depth-prepass -> compute-update -> graphics -> post-process -> present
    fn default() -> Self {
        let node = |name: &str, queue: QueueConfig, passes: &[&str], presents: bool| NodeConfig {
            name: name.to_string(),
            queue,
            passes: passes.iter().map(|p| p.to_string()).collect(),
            presents,
        };
        Self {
            nodes: vec![
                node("depth-prepass", QueueConfig::Graphics, &["depth"], false),
                node("compute-update", QueueConfig::Compute, &[], false),
                node("graphics", QueueConfig::Graphics, &["reflection", "scene"], false),
                node("post-process", QueueConfig::Compute, &[], false),
                node("present", QueueConfig::Graphics, &[], true),
            ],
        }
    }
}

// load
impl EngineConfig {
    /// 从 TOML 文件加载配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content =
            fs::read_to_string(path.as_ref()).with_context(|| format!("读取配置文件失败: {:?}", path.as_ref()))?;
        Self::from_toml_str(&content).with_context(|| format!("解析 TOML 配置失败: {:?}", path.as_ref()))
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let mut config: EngineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// 按照 `STRATA_CONFIG` -> `<workspace>/strata.toml` 的顺序查找，都不存在时使用默认值
    pub fn load_or_default() -> anyhow::Result<Self> {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            log::info!("load engine config from ${}: {}", CONFIG_ENV, path);
            return Self::from_file(path);
        }

        let path = StrataPath::config_path(DEFAULT_CONFIG_FILE);
        if path.exists() {
            log::info!("load engine config from {:?}", path);
            Self::from_file(path)
        } else {
            log::info!("no config file found at {:?}, use default engine config", path);
            Ok(Self::default())
        }
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        toml::to_string_pretty(self).context("序列化配置失败")
    }
}

// validate
impl EngineConfig {
    const MIN_FRAME_SLOTS: u32 = 2;
    const MAX_FRAME_SLOTS: u32 = 3;

    fn validate(&mut self) -> anyhow::Result<()> {
        let clamped = self.renderer.frame_slots.clamp(Self::MIN_FRAME_SLOTS, Self::MAX_FRAME_SLOTS);
        if clamped != self.renderer.frame_slots {
            log::warn!("frame_slots {} is out of range, clamp to {}", self.renderer.frame_slots, clamped);
            self.renderer.frame_slots = clamped;
        }

        anyhow::ensure!(
            matches!(self.renderer.msaa_samples, 1 | 2 | 4 | 8),
            "msaa_samples must be one of 1, 2, 4, 8, got {}",
            self.renderer.msaa_samples
        );
        anyhow::ensure!(self.window.width > 0 && self.window.height > 0, "window extent must be non-zero");
        anyhow::ensure!(!self.graph.nodes.is_empty(), "graph must contain at least one node");

        let mut names = HashSet::new();
        for node in &self.graph.nodes {
            anyhow::ensure!(names.insert(node.name.as_str()), "duplicated graph node name: {}", node.name);
            anyhow::ensure!(
                node.queue == QueueConfig::Graphics || node.passes.is_empty(),
                "node {} runs on the compute queue and can not own render passes",
                node.name
            );
            anyhow::ensure!(
                node.queue == QueueConfig::Graphics || !node.presents,
                "node {} runs on the compute queue and can not present",
                node.name
            );
        }

        let presenting = self.graph.nodes.iter().filter(|node| node.presents).count();
        anyhow::ensure!(presenting <= 1, "at most one graph node can present, got {}", presenting);
        anyhow::ensure!(
            self.graph.nodes.iter().any(|node| node.queue == QueueConfig::Graphics),
            "graph needs a graphics node to record the swapchain pass"
        );

        Ok(())
    }
}
