//! Main camera and the per-frame packet the renderer consumes

use glam::{Mat4, Vec3};

/// Perspective camera looking from `position` at `target`
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    pub position: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    /// Vertical field of view in degrees
    pub fov_y: f32,
    pub z_near: f32,
    pub z_far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 10.0, 20.0),
            target: Vec3::ZERO,
            up: Vec3::Y,
            fov_y: 60.0,
            z_near: 0.1,
            z_far: 1000.0,
        }
    }
}

impl Camera {
    pub fn new(position: Vec3, target: Vec3) -> Self {
        Self {
            position,
            target,
            ..Default::default()
        }
    }

    pub fn view_tm(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, self.up)
    }

    /// Projection for a target of the given aspect ratio, depth in `[0, 1]`
    pub fn proj_tm(&self, aspect: f32) -> Mat4 {
        Mat4::perspective_rh(self.fov_y.to_radians(), aspect, self.z_near, self.z_far)
    }

    pub fn proj_view(&self, aspect: f32) -> Mat4 {
        self.proj_tm(aspect) * self.view_tm()
    }

    pub fn forward(&self) -> Vec3 {
        (self.target - self.position).normalize_or_zero()
    }
}

/// Everything the renderer needs to know about the world for one frame
#[derive(Debug, Clone, Default)]
pub struct FramePacket {
    pub main_camera: Camera,
    /// Seconds since start
    pub current_time: f32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4Swizzles;

    #[test]
    fn target_projects_to_screen_centre() {
        let camera = Camera::new(Vec3::new(0.0, 5.0, 10.0), Vec3::new(1.0, 0.0, -2.0));
        let clip = camera.proj_view(16.0 / 9.0) * camera.target.extend(1.0);
        let ndc = clip.xyz() / clip.w;
        assert!(ndc.x.abs() < 1e-5 && ndc.y.abs() < 1e-5);
        assert!((0.0..=1.0).contains(&ndc.z));
    }

    #[test]
    fn forward_of_degenerate_camera_is_zero() {
        let camera = Camera::new(Vec3::ONE, Vec3::ONE);
        assert_eq!(camera.forward(), Vec3::ZERO);
    }
}
