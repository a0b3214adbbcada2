//! Linear color framebuffer with PNG output

use std::path::Path;

use glam::Vec3;
use image::{ImageBuffer, ImageResult, Rgb, RgbImage};

/// Row-major linear RGB image, top row first
#[derive(Debug, Clone)]
pub struct Framebuffer {
    width: u32,
    height: u32,
    pixels: Vec<Vec3>,
}

impl Framebuffer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![Vec3::ZERO; width as usize * height as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[Vec3] {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut [Vec3] {
        &mut self.pixels
    }

    pub fn get(&self, x: u32, y: u32) -> Option<Vec3> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.pixels.get((y * self.width + x) as usize).copied()
    }

    pub fn clear(&mut self, color: Vec3) {
        self.pixels.fill(color);
    }

    /// Mean linear color over all pixels
    pub fn average(&self) -> Vec3 {
        if self.pixels.is_empty() {
            return Vec3::ZERO;
        }
        self.pixels.iter().copied().sum::<Vec3>() / self.pixels.len() as f32
    }

    /// Encode to 8-bit sRGB
    pub fn to_rgb8(&self) -> RgbImage {
        ImageBuffer::from_fn(self.width, self.height, |x, y| {
            let c = self.pixels[(y * self.width + x) as usize];
            Rgb([encode_srgb(c.x), encode_srgb(c.y), encode_srgb(c.z)])
        })
    }

    pub fn save_png(&self, path: impl AsRef<Path>) -> ImageResult<()> {
        let path = path.as_ref();
        self.to_rgb8().save(path)?;
        log::info!("Saved {}x{} frame to {}", self.width, self.height, path.display());
        Ok(())
    }
}

/// Linear to sRGB transfer with clamping
pub fn encode_srgb(linear: f32) -> u8 {
    let c = if linear.is_finite() { linear.clamp(0.0, 1.0) } else { 0.0 };
    let encoded = if c <= 0.003_130_8 {
        c * 12.92
    } else {
        1.055 * c.powf(1.0 / 2.4) - 0.055
    };
    (encoded * 255.0 + 0.5) as u8
}
