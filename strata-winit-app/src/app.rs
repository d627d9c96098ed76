use std::{rc::Rc, time::Instant};

use anyhow::Context;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use strata_crate_tools::config::EngineConfig;
use strata_gfx::{context::GfxContext, foundation::device::VulkanDevice};
use strata_render_graph::{program::SharedProgram, scheduler::Scheduler};
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    window::{Window, WindowId},
};

use crate::{
    demo_graph::build_demo_graph, programs::draw_demo::DrawDemoProgram, renderer_settings::renderer_settings,
    window_surface::WinitWindowSurface,
};

/// window 创建之后才能创建的部分
struct Renderer {
    scheduler: Scheduler,
    /// graph 中只保存弱引用，program 的所有权在这里
    _programs: Vec<SharedProgram>,
}

pub struct WinitApp {
    config: EngineConfig,
    surface: Rc<WinitWindowSurface>,
    last_frame: Instant,

    // renderer 持有 vk surface，必须先于 window 销毁
    renderer: Option<Renderer>,
    window: Option<Window>,
}
// 总的 main 函数
impl WinitApp {
    /// 整个程序的入口
    pub fn run(config: EngineConfig) -> anyhow::Result<()> {
        let event_loop = EventLoop::new().context("create event loop")?;

        let mut app = Self {
            config,
            surface: Rc::new(WinitWindowSurface::default()),
            last_frame: Instant::now(),
            renderer: None,
            window: None,
        };
        event_loop.run_app(&mut app).context("run event loop")?;

        log::info!("end run.");
        app.destroy();
        Ok(())
    }
}
// new & init
impl WinitApp {
    /// 在 window 创建之后调用，初始化 device、swapchain 与 render graph
    fn init_after_window(&mut self, event_loop: &ActiveEventLoop) -> anyhow::Result<()> {
        let window_config = &self.config.window;
        let window_attr = Window::default_attributes()
            .with_title(window_config.title.clone())
            .with_inner_size(winit::dpi::LogicalSize::new(window_config.width, window_config.height));
        let window = event_loop.create_window(window_attr).context("create window")?;
        self.surface.update_extent(window.inner_size());

        let settings = renderer_settings(&self.config.renderer)?;
        let (device, queues) = VulkanDevice::new(
            &window_config.title,
            window.display_handle().context("display handle")?.as_raw(),
            window.window_handle().context("window handle")?.as_raw(),
            self.config.renderer.validation,
        )?;
        let ctx = GfxContext::new(Rc::new(device), queues);

        let mut programs = vec![];
        let graph_config = &self.config.graph;
        let mut scheduler = Scheduler::new(&ctx, self.surface.clone(), &settings, |info| {
            build_demo_graph(&ctx, info, graph_config, &settings, &mut programs)
        })?;

        let overlay: SharedProgram = DrawDemoProgram::shared("overlay");
        scheduler.swapchain_mut().register_program(&overlay);
        programs.push(overlay);
        scheduler.init_programs()?;

        self.renderer = Some(Renderer {
            scheduler,
            _programs: programs,
        });
        self.window = Some(window);
        self.last_frame = Instant::now();
        Ok(())
    }
}
// update
impl WinitApp {
    fn big_update(&mut self) {
        let Some(renderer) = self.renderer.as_mut() else {
            return;
        };
        let now = Instant::now();
        let delta_time = (now - self.last_frame).as_secs_f32();
        self.last_frame = now;

        let scheduler = &mut renderer.scheduler;
        // 演示用：相机缓慢旋转
        scheduler.camera_mut().rotate(delta_time * 10.0, 0.0);

        if !scheduler.begin_frame() {
            return;
        }
        scheduler.update(delta_time);
        scheduler.draw();
        scheduler.end_frame();

        tracy_client::frame_mark();
    }
}
// destroy
impl WinitApp {
    fn destroy(&mut self) {
        self.renderer = None;
        self.window = None;
    }
}
// 各种 winit 的事件处理
impl ApplicationHandler for WinitApp {
    // 建议在这里创建 window 和 Renderer
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        log::info!("winit event: resumed");

        if let Err(e) = self.init_after_window(event_loop) {
            log::error!("failed to init renderer: {:#}", e);
            event_loop.exit();
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                self.surface.update_extent(size);
                if let Some(renderer) = self.renderer.as_mut() {
                    renderer.scheduler.notify_resized();
                }
            }
            WindowEvent::Occluded(occluded) => {
                self.surface.set_minimized(occluded);
            }
            WindowEvent::RedrawRequested => {
                self.big_update();
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = self.window.as_ref() {
            window.request_redraw();
        }
    }

    fn suspended(&mut self, _event_loop: &ActiveEventLoop) {
        log::warn!("winit event: suspended");
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        log::info!("loop exiting");
        self.destroy();
    }
}
