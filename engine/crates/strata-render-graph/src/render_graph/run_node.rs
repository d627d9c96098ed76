use strata_gfx::commands::queue::QueueKind;

use crate::program::{ProgramKind, ProgramList, SharedProgram};

/// 一组共享同一个 command buffer 的 pass，对应 frame ring 中的一个 stage
///
/// compute program 在 render pass 之前录制；compute queue 上的 node 不能持有 render pass
pub struct RunNode {
    name: String,
    queue: QueueKind,
    passes: Vec<String>,
    compute_programs: ProgramList,
    /// 是否在末尾录制 swapchain 的输出 pass
    presents: bool,
}
// new & init
impl RunNode {
    pub fn graphics(name: impl Into<String>) -> Self {
        Self::new(name, QueueKind::Graphics)
    }

    pub fn compute(name: impl Into<String>) -> Self {
        Self::new(name, QueueKind::Compute)
    }

    fn new(name: impl Into<String>, queue: QueueKind) -> Self {
        Self {
            name: name.into(),
            queue,
            passes: vec![],
            compute_programs: ProgramList::default(),
            presents: false,
        }
    }

    /// 按照调用顺序录制
    #[inline]
    pub fn pass(mut self, pass_name: impl Into<String>) -> Self {
        self.passes.push(pass_name.into());
        self
    }

    #[inline]
    pub fn presents(mut self) -> Self {
        self.presents = true;
        self
    }
}
// getters
impl RunNode {
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn queue(&self) -> QueueKind {
        self.queue
    }

    #[inline]
    pub fn passes(&self) -> &[String] {
        &self.passes
    }

    #[inline]
    pub fn is_presenting(&self) -> bool {
        self.presents
    }

    #[inline]
    pub fn compute_programs(&self) -> &ProgramList {
        &self.compute_programs
    }
}
// tools
impl RunNode {
    /// 只接受 `ProgramKind::Compute`
    pub fn register_compute(&mut self, program: &SharedProgram) -> bool {
        self.compute_programs.register(program, ProgramKind::Compute)
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use super::*;
    use crate::program::tests::LogProgram;

    #[test]
    fn test_builder() {
        let node = RunNode::graphics("graphics").pass("reflection").pass("scene");
        assert_eq!(node.queue(), QueueKind::Graphics);
        assert_eq!(node.passes(), ["reflection".to_string(), "scene".to_string()]);
        assert!(!node.is_presenting());
        assert!(RunNode::graphics("present").presents().is_presenting());
    }

    #[test]
    fn test_register_compute_only() {
        let log = Rc::new(RefCell::new(vec![]));
        let particles: SharedProgram = LogProgram::shared("particles", ProgramKind::Compute, &log);
        let mesh: SharedProgram = LogProgram::shared("mesh", ProgramKind::Draw, &log);

        let mut node = RunNode::compute("compute-update");
        assert!(node.register_compute(&particles));
        assert!(!node.register_compute(&mesh));
        assert_eq!(node.compute_programs().len(), 1);
    }
}
