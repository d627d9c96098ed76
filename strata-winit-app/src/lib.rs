pub mod app;
pub mod demo_graph;
pub mod programs;
pub mod renderer_settings;
pub mod window_surface;
