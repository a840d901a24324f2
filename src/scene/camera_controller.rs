//! Interactive camera controllers
//!
//! - Free-fly: WASD/QE movement, mouse look, scroll changes speed
//! - Orbit: circles a pivot, scroll zooms, WASD pans the pivot

use std::f32::consts::{FRAC_PI_2, FRAC_PI_6, TAU};

use glam::{Vec2, Vec3};

use super::Camera;

/// Input gathered from the window since the last update
#[derive(Debug, Clone, Default)]
pub struct CameraInput {
    pub forward: bool,
    pub backward: bool,
    pub left: bool,
    pub right: bool,
    pub up: bool,
    pub down: bool,
    pub sprint: bool,

    /// Pixels moved since last frame
    pub mouse_delta: Vec2,
    /// Positive scrolls away from the user
    pub scroll_delta: f32,
    /// Right mouse button held
    pub mouse_look_active: bool,
}

impl CameraInput {
    /// Clear per-frame deltas, keeping held keys
    pub fn reset_deltas(&mut self) {
        self.mouse_delta = Vec2::ZERO;
        self.scroll_delta = 0.0;
    }

    /// Unit vector of the held movement keys in (right, up, forward) space
    fn movement(&self) -> Vec3 {
        let axis = |pos: bool, neg: bool| pos as i32 as f32 - neg as i32 as f32;
        Vec3::new(
            axis(self.right, self.left),
            axis(self.up, self.down),
            axis(self.forward, self.backward),
        )
        .normalize_or_zero()
    }
}

pub trait CameraController {
    fn update(&mut self, camera: &mut Camera, input: &CameraInput, dt: f32);

    /// Adopt the camera's current placement so switching is seamless
    fn sync_with_camera(&mut self, camera: &Camera);

    fn name(&self) -> &'static str;
}

fn wrap_angle(a: f32) -> f32 {
    a.rem_euclid(TAU)
}

pub struct FreeFlyController {
    pub yaw: f32,
    pub pitch: f32,
    pub move_speed: f32,
    pub speed_range: (f32, f32),
    /// Radians per pixel
    pub mouse_sensitivity: f32,
    pub sprint_multiplier: f32,
}

impl Default for FreeFlyController {
    fn default() -> Self {
        Self {
            yaw: 0.0,
            pitch: 0.0,
            move_speed: 10.0,
            speed_range: (0.5, 200.0),
            mouse_sensitivity: 0.003,
            sprint_multiplier: 3.0,
        }
    }
}

impl FreeFlyController {
    fn forward(&self) -> Vec3 {
        Vec3::new(
            self.yaw.cos() * self.pitch.cos(),
            -self.pitch.sin(),
            self.yaw.sin() * self.pitch.cos(),
        )
    }

    fn right(&self) -> Vec3 {
        Vec3::new(-self.yaw.sin(), 0.0, self.yaw.cos())
    }
}

impl CameraController for FreeFlyController {
    fn update(&mut self, camera: &mut Camera, input: &CameraInput, dt: f32) {
        if input.scroll_delta != 0.0 {
            let factor = 1.2f32.powf(input.scroll_delta.signum());
            self.move_speed = (self.move_speed * factor).clamp(self.speed_range.0, self.speed_range.1);
        }

        if input.mouse_look_active {
            let limit = FRAC_PI_2 - 0.01;
            self.yaw = wrap_angle(self.yaw + input.mouse_delta.x * self.mouse_sensitivity);
            self.pitch = (self.pitch + input.mouse_delta.y * self.mouse_sensitivity).clamp(-limit, limit);
        }

        let m = input.movement();
        let speed = self.move_speed * if input.sprint { self.sprint_multiplier } else { 1.0 };
        let forward = self.forward();
        camera.position += (self.right() * m.x + Vec3::Y * m.y + forward * m.z) * speed * dt;
        camera.target = camera.position + forward;
    }

    fn sync_with_camera(&mut self, camera: &Camera) {
        let forward = camera.forward();
        if forward == Vec3::ZERO {
            return;
        }
        self.yaw = wrap_angle(forward.z.atan2(forward.x));
        self.pitch = (-forward.y).clamp(-1.0, 1.0).asin();
    }

    fn name(&self) -> &'static str {
        "free-fly"
    }
}

pub struct OrbitController {
    pub pivot: Vec3,
    pub distance: f32,
    pub distance_range: (f32, f32),
    pub azimuth: f32,
    pub elevation: f32,
    /// Radians per pixel
    pub orbit_sensitivity: f32,
    pub pan_speed: f32,
}

impl Default for OrbitController {
    fn default() -> Self {
        Self {
            pivot: Vec3::ZERO,
            distance: 20.0,
            distance_range: (1.0, 500.0),
            azimuth: 0.0,
            elevation: FRAC_PI_6,
            orbit_sensitivity: 0.005,
            pan_speed: 10.0,
        }
    }
}

impl OrbitController {
    fn eye(&self) -> Vec3 {
        self.pivot
            + self.distance
                * Vec3::new(
                    self.elevation.cos() * self.azimuth.cos(),
                    self.elevation.sin(),
                    self.elevation.cos() * self.azimuth.sin(),
                )
    }
}

impl CameraController for OrbitController {
    fn update(&mut self, camera: &mut Camera, input: &CameraInput, dt: f32) {
        if input.scroll_delta != 0.0 {
            let factor = 1.1f32.powf(-input.scroll_delta.signum());
            self.distance = (self.distance * factor).clamp(self.distance_range.0, self.distance_range.1);
        }

        if input.mouse_look_active {
            let limit = FRAC_PI_2 - 0.05;
            self.azimuth = wrap_angle(self.azimuth + input.mouse_delta.x * self.orbit_sensitivity);
            self.elevation =
                (self.elevation + input.mouse_delta.y * self.orbit_sensitivity).clamp(0.05, limit);
        }

        // Pan in the ground plane, towards the pivot for "forward"
        let m = input.movement();
        let toward = -Vec3::new(self.azimuth.cos(), 0.0, self.azimuth.sin());
        let right = Vec3::new(-self.azimuth.sin(), 0.0, self.azimuth.cos());
        let speed = self.pan_speed * if input.sprint { 2.0 } else { 1.0 };
        self.pivot += (right * -m.x + Vec3::Y * m.y + toward * m.z) * speed * dt;

        camera.position = self.eye();
        camera.target = self.pivot;
    }

    fn sync_with_camera(&mut self, camera: &Camera) {
        let offset = camera.position - camera.target;
        let distance = offset.length();
        if distance <= f32::EPSILON {
            return;
        }
        self.pivot = camera.target;
        self.distance = distance;
        self.elevation = (offset.y / distance).clamp(-1.0, 1.0).asin();
        self.azimuth = wrap_angle(offset.z.atan2(offset.x));
    }

    fn name(&self) -> &'static str {
        "orbit"
    }
}

/// Free-fly and orbit controllers with one of them active
#[derive(Default)]
pub struct ViewerCameraController {
    free_fly: FreeFlyController,
    orbit: OrbitController,
    orbit_active: bool,
}

impl ViewerCameraController {
    /// Switch to the other controller, continuing from where the camera is
    pub fn toggle(&mut self, camera: &Camera) {
        self.orbit_active = !self.orbit_active;
        self.active_mut().sync_with_camera(camera);
        log::info!("Camera controller: {}", self.active_name());
    }

    fn active_mut(&mut self) -> &mut dyn CameraController {
        if self.orbit_active {
            &mut self.orbit
        } else {
            &mut self.free_fly
        }
    }

    pub fn active_name(&self) -> &'static str {
        if self.orbit_active {
            self.orbit.name()
        } else {
            self.free_fly.name()
        }
    }

    pub fn update(&mut self, camera: &mut Camera, input: &CameraInput, dt: f32) {
        self.active_mut().update(camera, input, dt);
    }

    pub fn sync_with_camera(&mut self, camera: &Camera) {
        self.active_mut().sync_with_camera(camera);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: Vec3, b: Vec3) -> bool {
        (a - b).length() < 1e-3
    }

    #[test]
    fn free_fly_keeps_view_direction_after_sync() {
        let mut camera = Camera::new(Vec3::new(0.0, 5.0, 10.0), Vec3::ZERO);
        let before = camera.forward();
        let mut controller = FreeFlyController::default();
        controller.sync_with_camera(&camera);
        controller.update(&mut camera, &CameraInput::default(), 0.016);
        assert!(approx(camera.forward(), before));
    }

    #[test]
    fn free_fly_moves_forward() {
        let mut camera = Camera::new(Vec3::ZERO, Vec3::X);
        let mut controller = FreeFlyController::default();
        controller.sync_with_camera(&camera);
        let input = CameraInput {
            forward: true,
            ..Default::default()
        };
        controller.update(&mut camera, &input, 1.0);
        assert!(approx(camera.position, Vec3::new(controller.move_speed, 0.0, 0.0)));
    }

    #[test]
    fn orbit_sync_preserves_placement() {
        let mut camera = Camera::new(Vec3::new(3.0, 4.0, 0.0), Vec3::ZERO);
        let expected = camera.position;
        let mut controller = OrbitController::default();
        controller.sync_with_camera(&camera);
        controller.update(&mut camera, &CameraInput::default(), 0.016);
        assert!(approx(camera.position, expected));
        assert!((controller.distance - 5.0).abs() < 1e-4);
    }

    #[test]
    fn toggle_switches_controller() {
        let camera = Camera::default();
        let mut controller = ViewerCameraController::default();
        assert_eq!(controller.active_name(), "free-fly");
        controller.toggle(&camera);
        assert_eq!(controller.active_name(), "orbit");
    }
}
