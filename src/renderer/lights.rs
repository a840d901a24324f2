//! Light sources for the lighting stage

use bytemuck::{Pod, Zeroable};
use glam::{Vec3, Vec4};

/// GPU-friendly light record, 32 bytes per light
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct GpuLightData {
    /// xyz = position (or direction towards the light), w = radius
    pub position: Vec4,
    /// xyz = color, w = intensity
    pub color_intensity: Vec4,
}

/// Radius value marking a directional light
pub const DIRECTIONAL_RADIUS: f32 = 0.0;

#[derive(Debug, Clone, PartialEq)]
pub enum Light {
    Point {
        position: Vec3,
        color: Vec3,
        intensity: f32,
        radius: f32,
    },
    /// Infinitely distant light shining along `direction`
    Directional {
        direction: Vec3,
        color: Vec3,
        intensity: f32,
    },
}

impl Light {
    pub fn sun() -> Self {
        Light::Directional {
            direction: Vec3::new(-0.5, -1.0, -0.3).normalize(),
            color: Vec3::new(1.0, 0.96, 0.9),
            intensity: 3.0,
        }
    }

    pub fn to_gpu_data(&self) -> GpuLightData {
        match *self {
            Light::Point {
                position,
                color,
                intensity,
                radius,
            } => GpuLightData {
                position: position.extend(radius.max(f32::EPSILON)),
                color_intensity: color.extend(intensity),
            },
            Light::Directional {
                direction,
                color,
                intensity,
            } => GpuLightData {
                position: (-direction.normalize_or_zero()).extend(DIRECTIONAL_RADIUS),
                color_intensity: color.extend(intensity),
            },
        }
    }
}

/// A sun plus a ring of coloured point lights around the origin
pub fn default_lights() -> Vec<Light> {
    let colors = [
        Vec3::new(1.0, 0.3, 0.2),
        Vec3::new(0.2, 1.0, 0.4),
        Vec3::new(0.3, 0.4, 1.0),
        Vec3::new(1.0, 0.8, 0.2),
    ];
    let mut lights = vec![Light::sun()];
    lights.extend(colors.iter().enumerate().map(|(i, &color)| {
        let angle = i as f32 * std::f32::consts::FRAC_PI_2;
        Light::Point {
            position: Vec3::new(angle.cos() * 12.0, 4.0, angle.sin() * 12.0),
            color,
            intensity: 8.0,
            radius: 25.0,
        }
    }));
    lights
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gpu_light_is_two_vec4() {
        assert_eq!(std::mem::size_of::<GpuLightData>(), 32);
    }

    #[test]
    fn directional_light_points_towards_source() {
        let light = Light::Directional {
            direction: -Vec3::Y,
            color: Vec3::ONE,
            intensity: 2.0,
        };
        let gpu = light.to_gpu_data();
        assert_eq!(gpu.position, Vec4::new(0.0, 1.0, 0.0, DIRECTIONAL_RADIUS));
        assert_eq!(gpu.color_intensity.w, 2.0);
    }

    #[test]
    fn point_light_keeps_radius() {
        let gpu = default_lights()[1].to_gpu_data();
        assert_eq!(gpu.position.w, 25.0);
    }
}
