//! Frame graph 与多 queue 同步
//!
//! - [`frame_ring::FrameRing`]：N 个 frame slot，每个 slot 持有 image-available semaphore，
//!   以及每个 stage 的 fence / completion semaphore / command buffer
//! - [`render_pass::RenderPass`]：attachment + subpass，每个 slot 一个 framebuffer
//! - [`swapchain::Swapchain`]：协商 surface 参数，持有输出用的 render pass
//! - [`render_graph::RenderGraph`]：按顺序排列的 run node，相邻 node 通过 semaphore 串联
//! - [`scheduler::Scheduler`]：`begin_frame -> update -> draw -> end_frame`

pub mod attachment;
pub mod frame_ring;
pub mod frame_uniforms;
pub mod program;
pub mod render_graph;
pub mod render_pass;
pub mod scheduler;
pub mod settings;
pub mod swapchain;
pub mod window;

#[cfg(test)]
pub(crate) mod test_device;
