//! Strata 工具集
//!
//! 提供日志初始化、引擎配置加载、资源路径管理等通用工具。
//!
//! # StrataPath
//! 基于工作区根目录的统一路径管理，避免硬编码相对路径。
//!
//! # EngineConfig
//! 通过 TOML 文件配置窗口、渲染器以及 frame graph 的 run node 列表。

pub mod config;
pub mod init_log;
pub mod resource;
