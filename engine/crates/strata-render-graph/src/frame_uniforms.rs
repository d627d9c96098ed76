//! 每个 frame slot 一份的相机 uniform
//!
//! 相机每次变化都会增加 generation；slot 只在 generation 与上次写入时不同时才重新写入。
//! 写入发生在 slot 的 fence 等待之后，此时 GPU 不再读取该 slot 的 buffer。

use ash::vk;
use bytemuck::{Pod, Zeroable};
use strata_gfx::{context::GfxContext, error::GfxResult, resources::buffer::GfxBuffer};

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct FrameUniforms {
    pub view: glam::Mat4,
    pub projection: glam::Mat4,
    pub view_projection: glam::Mat4,
    /// w = 1
    pub camera_position: glam::Vec4,
    /// w = 0
    pub camera_forward: glam::Vec4,
}

#[derive(Clone, Debug)]
pub struct CameraState {
    position: glam::Vec3,

    euler_yaw_deg: f32,
    euler_pitch_deg: f32,

    fov_y_deg: f32,
    aspect: f32,
    near: f32,
    far: f32,

    /// 每次修改加一
    generation: u64,
}

impl Default for CameraState {
    fn default() -> Self {
        Self {
            position: glam::Vec3::new(0.0, 0.0, 5.0),
            euler_yaw_deg: 0.0,
            euler_pitch_deg: 0.0,
            fov_y_deg: 60.0,
            aspect: 16.0 / 9.0,
            near: 0.1,
            far: 1000.0,
            generation: 0,
        }
    }
}

impl CameraState {
    /// 相机的上参考向量
    const CAMERA_UP: glam::Vec3 = glam::Vec3::new(0.0, 1.0, 0.0);

    /// 没有旋转的情况下，相机看向的是 -Z
    const CAMERA_FORWARD: glam::Vec3 = glam::Vec3::new(0.0, 0.0, -1.0);

    const K_PITCH: f32 = 89.5;

    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[inline]
    pub fn position(&self) -> glam::Vec3 {
        self.position
    }

    pub fn forward(&self) -> glam::Vec3 {
        let transform = glam::Mat4::from_euler(
            glam::EulerRot::YXZ,
            self.euler_yaw_deg.to_radians(),
            self.euler_pitch_deg.to_radians(),
            0.0,
        );
        transform.transform_vector3(Self::CAMERA_FORWARD)
    }

    pub fn set_position(&mut self, position: glam::Vec3) {
        if self.position != position {
            self.position = position;
            self.generation += 1;
        }
    }

    pub fn move_forward(&mut self, length: f32) {
        self.set_position(self.position + self.forward() * length);
    }

    pub fn rotate(&mut self, yaw_deg: f32, pitch_deg: f32) {
        if yaw_deg == 0.0 && pitch_deg == 0.0 {
            return;
        }
        self.euler_yaw_deg = (self.euler_yaw_deg + yaw_deg).rem_euclid(360.0);
        self.euler_pitch_deg = (self.euler_pitch_deg + pitch_deg).clamp(-Self::K_PITCH, Self::K_PITCH);
        self.generation += 1;
    }

    /// 跟随 swapchain 的 extent，extent 为 0 时忽略
    pub fn set_viewport_extent(&mut self, extent: vk::Extent2D) {
        if extent.width == 0 || extent.height == 0 {
            return;
        }
        let aspect = extent.width as f32 / extent.height as f32;
        if self.aspect != aspect {
            self.aspect = aspect;
            self.generation += 1;
        }
    }

    pub fn uniforms(&self) -> FrameUniforms {
        let forward = self.forward();
        let view = glam::Mat4::look_to_rh(self.position, forward, Self::CAMERA_UP);
        let projection = glam::Mat4::perspective_rh(self.fov_y_deg.to_radians(), self.aspect, self.near, self.far);
        FrameUniforms {
            view,
            projection,
            view_projection: projection * view,
            camera_position: self.position.extend(1.0),
            camera_forward: forward.extend(0.0),
        }
    }
}

/// 每个 slot 一个 host 可见的 uniform buffer
pub struct FrameUniformRing {
    ctx: GfxContext,
    buffers: Vec<GfxBuffer>,
    /// 每个 slot 上一次写入时的相机 generation
    written_generation: Vec<Option<u64>>,
}
// new & init
impl FrameUniformRing {
    pub fn new(ctx: &GfxContext, slot_count: usize) -> GfxResult<Self> {
        let mut ring = Self {
            ctx: ctx.clone(),
            buffers: Vec::with_capacity(slot_count),
            written_generation: vec![None; slot_count],
        };
        for i in 0..slot_count {
            let buffer = ctx.device().create_host_buffer(
                size_of::<FrameUniforms>() as vk::DeviceSize,
                vk::BufferUsageFlags::UNIFORM_BUFFER,
                &format!("frame-uniforms-{}", i),
            )?;
            ring.buffers.push(buffer);
        }
        Ok(ring)
    }
}
// getters
impl FrameUniformRing {
    #[inline]
    pub fn buffer(&self, slot_index: usize) -> &GfxBuffer {
        &self.buffers[slot_index]
    }
}
// update
impl FrameUniformRing {
    /// 相机在该 slot 上次写入之后发生过变化时才写入，返回是否写入
    ///
    /// 只能在 slot 的 fence 等待之后调用
    pub fn write_if_changed(&mut self, slot_index: usize, camera: &CameraState) -> GfxResult<bool> {
        if self.written_generation[slot_index] == Some(camera.generation()) {
            return Ok(false);
        }
        let uniforms = camera.uniforms();
        self.ctx
            .device()
            .write_host_buffer(&self.buffers[slot_index], 0, bytemuck::bytes_of(&uniforms))?;
        self.written_generation[slot_index] = Some(camera.generation());
        Ok(true)
    }
}
// destroy
impl Drop for FrameUniformRing {
    fn drop(&mut self) {
        let device = self.ctx.device();
        for buffer in self.buffers.drain(..) {
            device.destroy_buffer(buffer);
        }
    }
}
