//! 外部的绘制 / 计算单元
//!
//! program 由创建者持有（`Rc<RefCell<_>>`），subpass 与 compute node 只保存 `Weak`，
//! 已经被释放的 program 会被跳过。同一个列表中只保证注册顺序，不做依赖分析。

use std::{
    cell::RefCell,
    rc::{Rc, Weak},
};

use ash::vk;
use strata_gfx::{context::GfxContext, error::GfxResult};

/// program 只能注册到与其类型匹配的位置：Draw 进入 subpass，Compute 进入 compute node
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProgramKind {
    Draw,
    Compute,
}

pub trait Program {
    fn name(&self) -> &str;

    fn kind(&self) -> ProgramKind;

    /// 创建 pipeline 等资源，context 可以被 program 自己保存
    fn init(&mut self, ctx: &GfxContext) -> GfxResult<()>;

    fn update(&mut self, delta_time: f32);

    /// draw 或者 dispatch
    fn record_into(&mut self, cmd: vk::CommandBuffer);
}

pub type SharedProgram = Rc<RefCell<dyn Program>>;

/// 按注册顺序保存的 program 弱引用
#[derive(Default)]
pub struct ProgramList {
    programs: Vec<Weak<RefCell<dyn Program>>>,
}

impl ProgramList {
    /// 类型不匹配时拒绝注册，返回 false
    pub fn register(&mut self, program: &SharedProgram, expected: ProgramKind) -> bool {
        let (name, kind) = {
            let program = program.borrow();
            (program.name().to_string(), program.kind())
        };
        if kind != expected {
            log::warn!("program {} is {:?}, can not be registered as {:?}", name, kind, expected);
            return false;
        }

        self.programs.push(Rc::downgrade(program));
        true
    }

    /// 仍然存活的 program 数量
    pub fn len(&self) -> usize {
        self.programs.iter().filter(|program| program.strong_count() > 0).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 按注册顺序初始化，遇到错误立即返回
    pub fn init_all(&self, ctx: &GfxContext) -> GfxResult<()> {
        for program in self.live() {
            program.borrow_mut().init(ctx)?;
        }
        Ok(())
    }

    pub fn update_all(&self, delta_time: f32) {
        for program in self.live() {
            program.borrow_mut().update(delta_time);
        }
    }

    pub fn record_all(&self, cmd: vk::CommandBuffer) {
        for program in self.live() {
            program.borrow_mut().record_into(cmd);
        }
    }

    /// 清除已经被释放的 program
    pub fn prune(&mut self) {
        self.programs.retain(|program| program.strong_count() > 0);
    }

    /// 将所有注册转移出去，自身变为空
    pub fn take(&mut self) -> ProgramList {
        std::mem::take(self)
    }

    /// 追加到末尾，保持原有顺序
    pub fn append(&mut self, mut other: ProgramList) {
        other.prune();
        self.programs.append(&mut other.programs);
    }

    fn live(&self) -> impl Iterator<Item = SharedProgram> + '_ {
        self.programs.iter().filter_map(Weak::upgrade)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// 记录调用顺序的 program
    pub(crate) struct LogProgram {
        name: String,
        kind: ProgramKind,
        pub log: Rc<RefCell<Vec<String>>>,
    }

    impl LogProgram {
        pub(crate) fn shared(name: &str, kind: ProgramKind, log: &Rc<RefCell<Vec<String>>>) -> Rc<RefCell<Self>> {
            Rc::new(RefCell::new(Self {
                name: name.to_string(),
                kind,
                log: log.clone(),
            }))
        }
    }

    impl Program for LogProgram {
        fn name(&self) -> &str {
            &self.name
        }

        fn kind(&self) -> ProgramKind {
            self.kind
        }

        fn init(&mut self, _ctx: &GfxContext) -> GfxResult<()> {
            self.log.borrow_mut().push(format!("init:{}", self.name));
            Ok(())
        }

        fn update(&mut self, _delta_time: f32) {
            self.log.borrow_mut().push(format!("update:{}", self.name));
        }

        fn record_into(&mut self, _cmd: vk::CommandBuffer) {
            self.log.borrow_mut().push(format!("record:{}", self.name));
        }
    }

    #[test]
    fn test_registration_order() {
        let log = Rc::new(RefCell::new(vec![]));
        let a: SharedProgram = LogProgram::shared("a", ProgramKind::Draw, &log);
        let b: SharedProgram = LogProgram::shared("b", ProgramKind::Draw, &log);

        let mut list = ProgramList::default();
        assert!(list.register(&b, ProgramKind::Draw));
        assert!(list.register(&a, ProgramKind::Draw));

        list.update_all(0.016);
        list.record_all(vk::CommandBuffer::null());
        assert_eq!(*log.borrow(), vec!["update:b", "update:a", "record:b", "record:a"]);
    }

    #[test]
    fn test_kind_mismatch_rejected() {
        let log = Rc::new(RefCell::new(vec![]));
        let compute: SharedProgram = LogProgram::shared("particles", ProgramKind::Compute, &log);

        let mut list = ProgramList::default();
        assert!(!list.register(&compute, ProgramKind::Draw));
        assert!(list.is_empty());
    }

    #[test]
    fn test_dropped_program_skipped() {
        let log = Rc::new(RefCell::new(vec![]));
        let a: SharedProgram = LogProgram::shared("a", ProgramKind::Draw, &log);
        let b: SharedProgram = LogProgram::shared("b", ProgramKind::Draw, &log);

        let mut list = ProgramList::default();
        list.register(&a, ProgramKind::Draw);
        list.register(&b, ProgramKind::Draw);
        drop(a);

        assert_eq!(list.len(), 1);
        list.record_all(vk::CommandBuffer::null());
        assert_eq!(*log.borrow(), vec!["record:b"]);
    }

    #[test]
    fn test_take_and_append() {
        let log = Rc::new(RefCell::new(vec![]));
        let a: SharedProgram = LogProgram::shared("a", ProgramKind::Draw, &log);
        let b: SharedProgram = LogProgram::shared("b", ProgramKind::Draw, &log);

        let mut old = ProgramList::default();
        old.register(&a, ProgramKind::Draw);
        let mut new = ProgramList::default();
        new.register(&b, ProgramKind::Draw);

        new.append(old.take());
        assert!(old.is_empty());
        new.record_all(vk::CommandBuffer::null());
        assert_eq!(*log.borrow(), vec!["record:b", "record:a"]);
    }
}
