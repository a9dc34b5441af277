use glam::{IVec2, Vec2};
use image::{GrayImage, Luma};
use std::path::Path;

use crate::core::{PixelLine, VecExt};

/// Palette index used for atom normals
pub const NORMAL_COLOR: u8 = 244;

/// Debug canvas for physics objects.
/// Plots atoms, normals and limb paths into an indexed bitmap that can be saved or inspected.
#[derive(Debug, Clone)]
pub struct DebugCanvas {
    image: GrayImage,
    /// Scene position of the canvas' top-left corner
    origin: Vec2,
    enabled: bool,
}

impl DebugCanvas {
    /// Create a blank canvas covering `width` x `height` scene pixels from the scene origin
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            image: GrayImage::new(width, height),
            origin: Vec2::ZERO,
            enabled: true,
        }
    }

    /// Move the canvas so that its top-left corner sits at `origin` in the scene
    pub fn with_origin(mut self, origin: Vec2) -> Self {
        self.origin = origin;
        self
    }

    /// Enable or disable debug drawing
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Check if debug drawing is enabled
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Reset every pixel to the transparent index
    pub fn clear(&mut self) {
        for pixel in self.image.pixels_mut() {
            *pixel = Luma([0]);
        }
    }

    pub fn image(&self) -> &GrayImage {
        &self.image
    }

    pub fn into_image(self) -> GrayImage {
        self.image
    }

    /// Write the canvas out, format picked from the extension
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), image::ImageError> {
        self.image.save(path)
    }

    /// Palette index at a scene pixel, `None` outside the canvas
    pub fn pixel(&self, x: i32, y: i32) -> Option<u8> {
        let local = IVec2::new(x, y) - self.origin.floor_int();
        if local.x < 0 || local.y < 0 || local.x >= self.image.width() as i32 || local.y >= self.image.height() as i32 {
            return None;
        }
        Some(self.image.get_pixel(local.x as u32, local.y as u32)[0])
    }

    fn plot(&mut self, pixel: IVec2, color: u8) {
        let local = pixel - self.origin.floor_int();
        if local.x >= 0 && local.y >= 0 && local.x < self.image.width() as i32 && local.y < self.image.height() as i32 {
            self.image.put_pixel(local.x as u32, local.y as u32, Luma([color]));
        }
    }

    /// Plot a single scene position
    pub fn draw_point(&mut self, pos: Vec2, color: u8) {
        if !self.enabled {
            return;
        }
        self.plot(pos.floor_int(), color);
    }

    /// Draw a line between two scene positions, both ends included
    pub fn draw_line(&mut self, from: Vec2, to: Vec2, color: u8) {
        if !self.enabled {
            return;
        }
        self.plot(from.floor_int(), color);
        for pixel in PixelLine::new(from, to - from) {
            self.plot(pixel, color);
        }
    }

    /// Draw a circle outline
    pub fn draw_circle(&mut self, center: Vec2, radius: f32, color: u8) {
        const SEGMENTS: usize = 16;

        for i in 0..SEGMENTS {
            let angle = (i as f32 / SEGMENTS as f32) * std::f32::consts::TAU;
            let next = ((i + 1) as f32 / SEGMENTS as f32) * std::f32::consts::TAU;
            let a = center + Vec2::new(angle.cos(), angle.sin()) * radius;
            let b = center + Vec2::new(next.cos(), next.sin()) * radius;
            self.draw_line(a, b, color);
        }
    }

    /// Draw a cross, used to mark joints and targets
    pub fn draw_cross(&mut self, center: Vec2, size: f32, color: u8) {
        self.draw_line(center - Vec2::new(size, 0.0), center + Vec2::new(size, 0.0), color);
        self.draw_line(center - Vec2::new(0.0, size), center + Vec2::new(0.0, size), color);
    }
}
