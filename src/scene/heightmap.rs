//! Terrain heightmap: procedural fBm or a grayscale image, normalised to
//! `[0, 1]` and uploaded as an `R32Float` texture.

use std::path::Path;

use noise::{Fbm, MultiFractal, NoiseFn, Perlin};

use crate::backend::{
    AddressMode, BackendResult, FilterMode, GraphicsBackend, SamplerDescriptor, SamplerHandle,
    TextureDescriptor, TextureFormat, TextureHandle, TextureUsage, TextureViewHandle,
};
use crate::TerrainConfig;

const OCTAVES: usize = 6;
const LACUNARITY: f64 = 2.0;
const GAIN: f64 = 0.5;
/// Noise periods across the whole map at the first octave
const BASE_FREQUENCY: f64 = 4.0;

/// CPU-side height samples, row-major
#[derive(Debug, Clone, PartialEq)]
pub struct Heightmap {
    width: u32,
    height: u32,
    data: Vec<f32>,
}

impl Heightmap {
    pub const DEFAULT_RESOLUTION: u32 = 1024;

    /// Square map of Perlin fractal Brownian motion
    pub fn generate(resolution: u32, seed: u32) -> Self {
        let resolution = resolution.max(1);
        let fbm = Fbm::<Perlin>::new(seed)
            .set_octaves(OCTAVES)
            .set_frequency(BASE_FREQUENCY / resolution as f64)
            .set_lacunarity(LACUNARITY)
            .set_persistence(GAIN);

        let side = resolution as usize;
        let mut data = Vec::with_capacity(side * side);
        for y in 0..resolution {
            for x in 0..resolution {
                data.push(fbm.get([x as f64, y as f64]) as f32);
            }
        }

        let mut map = Self {
            width: resolution,
            height: resolution,
            data,
        };
        map.normalize();
        map
    }

    /// Load a grayscale image; 16-bit precision is kept where the file has it.
    pub fn from_image(path: &Path) -> Result<Self, image::ImageError> {
        let luma = image::open(path)?.to_luma16();
        let (width, height) = luma.dimensions();
        let data = luma.into_raw().into_iter().map(|v| v as f32).collect();

        let mut map = Self {
            width,
            height,
            data,
        };
        map.normalize();
        Ok(map)
    }

    /// Load `config.heightmap` if set, falling back to generation on error.
    pub fn from_config(config: &TerrainConfig) -> Self {
        if let Some(path) = &config.heightmap {
            match Self::from_image(path) {
                Ok(map) => {
                    log::info!(
                        "Loaded heightmap {} ({}x{})",
                        path.display(),
                        map.width,
                        map.height
                    );
                    return map;
                }
                Err(e) => log::warn!(
                    "Failed to load heightmap {}: {}, generating one instead",
                    path.display(),
                    e
                ),
            }
        }
        Self::generate(config.resolution, config.seed)
    }

    /// Rescale samples to `[0, 1]`. A flat map becomes all zeros.
    fn normalize(&mut self) {
        let (lo, hi) = self
            .data
            .iter()
            .fold((f32::MAX, f32::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        let range = hi - lo;
        for v in &mut self.data {
            *v = if range > 0.0 { (*v - lo) / range } else { 0.0 };
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn get(&self, x: u32, y: u32) -> Option<f32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.data
            .get(y as usize * self.width as usize + x as usize)
            .copied()
    }
}

/// Heightmap texture plus the sampler terrain shaders read it through
#[derive(Debug, Clone, Copy)]
pub struct HeightmapTexture {
    pub texture: TextureHandle,
    pub view: TextureViewHandle,
    pub sampler: SamplerHandle,
    pub width: u32,
    pub height: u32,
}

impl HeightmapTexture {
    pub fn upload<B: GraphicsBackend>(backend: &mut B, map: &Heightmap) -> BackendResult<Self> {
        let texture = backend.create_texture(&TextureDescriptor {
            label: Some("heightmap".into()),
            width: map.width,
            height: map.height,
            format: TextureFormat::R32Float,
            usage: TextureUsage::TEXTURE_BINDING | TextureUsage::COPY_DST,
            ..Default::default()
        })?;
        backend.write_texture(texture, bytemuck::cast_slice(&map.data), map.width, map.height);
        let view = backend.create_texture_view(texture)?;

        // R32Float is not filterable without an extra device feature
        let sampler = backend.create_sampler(&SamplerDescriptor {
            label: Some("heightmap_sampler".into()),
            mag_filter: FilterMode::Nearest,
            min_filter: FilterMode::Nearest,
            mipmap_filter: FilterMode::Nearest,
            address_mode_u: AddressMode::ClampToEdge,
            address_mode_v: AddressMode::ClampToEdge,
            address_mode_w: AddressMode::ClampToEdge,
            compare: None,
        })?;

        Ok(Self {
            texture,
            view,
            sampler,
            width: map.width,
            height: map.height,
        })
    }

    pub fn destroy<B: GraphicsBackend>(self, backend: &mut B) {
        backend.destroy_texture_view(self.view);
        backend.destroy_texture(self.texture);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_map_is_normalized() {
        let map = Heightmap::generate(64, 7);
        assert_eq!(map.data().len(), 64 * 64);
        let lo = map.data().iter().cloned().fold(f32::MAX, f32::min);
        let hi = map.data().iter().cloned().fold(f32::MIN, f32::max);
        assert_eq!(lo, 0.0);
        assert_eq!(hi, 1.0);
    }

    #[test]
    fn sample_index_is_computed_in_usize() {
        // 70000 * 70000 overflows u32, the flat index must not
        let map = Heightmap {
            width: 70_000,
            height: 70_000,
            data: Vec::new(),
        };
        assert_eq!(map.get(69_999, 69_999), None);
        assert_eq!(map.get(70_000, 0), None);
    }

    #[test]
    fn same_seed_same_map() {
        assert_eq!(Heightmap::generate(32, 3), Heightmap::generate(32, 3));
        assert_ne!(Heightmap::generate(32, 3), Heightmap::generate(32, 4));
    }

    #[test]
    fn image_heights_follow_luma() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hm.png");
        let img = image::GrayImage::from_fn(4, 2, |x, _| image::Luma([(x * 60) as u8]));
        img.save(&path).unwrap();

        let map = Heightmap::from_image(&path).unwrap();
        assert_eq!((map.width(), map.height()), (4, 2));
        assert_eq!(map.get(0, 1), Some(0.0));
        assert_eq!(map.get(3, 0), Some(1.0));
        assert!((map.get(1, 0).unwrap() - 1.0 / 3.0).abs() < 1e-4);
        assert_eq!(map.get(4, 0), None);
    }

    #[test]
    fn missing_image_falls_back_to_noise() {
        let config = TerrainConfig {
            heightmap: Some("does/not/exist.png".into()),
            resolution: 16,
            seed: 1,
        };
        let map = Heightmap::from_config(&config);
        assert_eq!(map.width(), 16);
    }
}
