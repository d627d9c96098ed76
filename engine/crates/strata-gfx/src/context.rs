use std::rc::Rc;

use crate::{
    commands::queue::{GfxQueue, GfxQueueTable, QueueKind},
    device::GfxDevice,
};

/// 设备与 queue 表
///
/// 所有需要访问 GPU 的对象在构造时接收一份 clone
#[derive(Clone)]
pub struct GfxContext {
    device: Rc<dyn GfxDevice>,
    queues: GfxQueueTable,
}
// new & init
impl GfxContext {
    pub fn new(device: Rc<dyn GfxDevice>, queues: GfxQueueTable) -> Self {
        Self { device, queues }
    }
}
// getters
impl GfxContext {
    #[inline]
    pub fn device(&self) -> &dyn GfxDevice {
        self.device.as_ref()
    }

    #[inline]
    pub fn queues(&self) -> &GfxQueueTable {
        &self.queues
    }

    #[inline]
    pub fn queue(&self, kind: QueueKind) -> &GfxQueue {
        self.queues.get(kind)
    }
}
