use std::{cell::RefCell, rc::Rc};

use ash::vk;
use strata_gfx::{context::GfxContext, error::GfxResult};
use strata_render_graph::program::{Program, ProgramKind};

use super::LOG_INTERVAL;

pub struct DrawDemoProgram {
    name: String,
    elapsed: f32,
    recorded: u64,
}

impl DrawDemoProgram {
    pub fn shared(name: impl Into<String>) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self {
            name: name.into(),
            elapsed: 0.0,
            recorded: 0,
        }))
    }
}

impl Program for DrawDemoProgram {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ProgramKind {
        ProgramKind::Draw
    }

    fn init(&mut self, ctx: &GfxContext) -> GfxResult<()> {
        log::info!(
            "init draw program {} on queue family {}",
            self.name,
            ctx.queues().graphics.family_index()
        );
        Ok(())
    }

    fn update(&mut self, delta_time: f32) {
        self.elapsed += delta_time;
    }

    fn record_into(&mut self, cmd: vk::CommandBuffer) {
        self.recorded += 1;
        if self.recorded % LOG_INTERVAL == 1 {
            log::debug!("draw {} into {:?}: {} frames, {:.1}s", self.name, cmd, self.recorded, self.elapsed);
        }
    }
}
