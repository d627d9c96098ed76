//! Vulkan GFX 抽象层
//!
//! 对 frame graph 暴露一个面向对象安全的设备接口 [`device::GfxDevice`]，
//! 真实实现 [`foundation::device::VulkanDevice`] 基于 ash + vk-mem。
//!
//! 不使用全局单例：所有需要设备的对象都在构造时接收一个 [`context::GfxContext`]，
//! 其中包含设备以及 queue 表。

pub mod commands;
pub mod context;
pub mod device;
pub mod error;
pub mod foundation;
pub mod resources;
pub mod swapchain;
