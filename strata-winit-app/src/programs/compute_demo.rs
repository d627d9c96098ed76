use std::{cell::RefCell, rc::Rc};

use ash::vk;
use strata_gfx::{context::GfxContext, error::GfxResult};
use strata_render_graph::program::{Program, ProgramKind};

use super::LOG_INTERVAL;

/// 模拟粒子更新之类的 dispatch
pub struct ComputeDemoProgram {
    name: String,
    group_count: [u32; 3],
    dispatched: u64,
}

impl ComputeDemoProgram {
    pub fn shared(name: impl Into<String>, group_count: [u32; 3]) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self {
            name: name.into(),
            group_count,
            dispatched: 0,
        }))
    }
}

impl Program for ComputeDemoProgram {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ProgramKind {
        ProgramKind::Compute
    }

    fn init(&mut self, ctx: &GfxContext) -> GfxResult<()> {
        log::info!(
            "init compute program {} on queue family {}",
            self.name,
            ctx.queues().compute.family_index()
        );
        Ok(())
    }

    fn update(&mut self, _delta_time: f32) {}

    fn record_into(&mut self, cmd: vk::CommandBuffer) {
        self.dispatched += 1;
        if self.dispatched % LOG_INTERVAL == 1 {
            log::debug!(
                "dispatch {} {:?} into {:?}: {} frames",
                self.name,
                self.group_count,
                cmd,
                self.dispatched
            );
        }
    }
}
