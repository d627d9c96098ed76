use ash::vk;

/// 一个 stage 被分配到的 queue 类型
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum QueueKind {
    Graphics,
    Compute,
    Present,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GfxQueueFamily {
    pub name: String,
    pub queue_family_index: u32,
    pub queue_flags: vk::QueueFlags,
    pub queue_count: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GfxQueue {
    handle: vk::Queue,
    queue_family: GfxQueueFamily,
}
// new & init
impl GfxQueue {
    pub fn new(handle: vk::Queue, queue_family: GfxQueueFamily) -> Self {
        Self { handle, queue_family }
    }
}
// getters
impl GfxQueue {
    #[inline]
    pub fn handle(&self) -> vk::Queue {
        self.handle
    }

    #[inline]
    pub fn queue_family(&self) -> &GfxQueueFamily {
        &self.queue_family
    }

    #[inline]
    pub fn family_index(&self) -> u32 {
        self.queue_family.queue_family_index
    }
}

/// graphics / compute / present 三个 queue
///
/// compute 和 present 都可能与 graphics 是同一个 queue
#[derive(Clone, Debug)]
pub struct GfxQueueTable {
    pub graphics: GfxQueue,
    pub compute: GfxQueue,
    pub present: GfxQueue,
}
impl GfxQueueTable {
    #[inline]
    pub fn get(&self, kind: QueueKind) -> &GfxQueue {
        match kind {
            QueueKind::Graphics => &self.graphics,
            QueueKind::Compute => &self.compute,
            QueueKind::Present => &self.present,
        }
    }

    /// 所有用到的 queue family，去重，保持 graphics -> compute -> present 的顺序
    pub fn family_indices(&self) -> Vec<u32> {
        let mut indices = Vec::with_capacity(3);
        for queue in [&self.graphics, &self.compute, &self.present] {
            if !indices.contains(&queue.family_index()) {
                indices.push(queue.family_index());
            }
        }
        indices
    }
}

#[cfg(test)]
mod tests {
    use ash::vk::Handle;

    use super::*;

    fn queue(raw: u64, family: u32) -> GfxQueue {
        GfxQueue::new(
            vk::Queue::from_raw(raw),
            GfxQueueFamily {
                name: format!("family-{family}"),
                queue_family_index: family,
                queue_flags: vk::QueueFlags::GRAPHICS,
                queue_count: 1,
            },
        )
    }

    #[test]
    fn test_family_indices_dedup() {
        let table = GfxQueueTable {
            graphics: queue(1, 0),
            compute: queue(2, 1),
            present: queue(1, 0),
        };
        assert_eq!(table.family_indices(), vec![0, 1]);
        assert_eq!(table.get(QueueKind::Present).handle(), table.graphics.handle());
        assert_eq!(table.get(QueueKind::Compute).family_index(), 1);
    }
}
