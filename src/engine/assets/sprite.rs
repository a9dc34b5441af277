// Indexed sprite bitmaps used to generate atom silhouettes

use glam::{IVec2, Vec2};
use image::{DynamicImage, GrayImage, Luma};

/// Palette index treated as transparent
pub const MASK_INDEX: u8 = 0;

/// An 8-bit indexed bitmap plus the offset from the owner's origin to its top-left corner.
///
/// Any pixel equal to `MASK_INDEX` is empty; everything else is part of the body.
#[derive(Debug, Clone, PartialEq)]
pub struct Sprite {
    image: GrayImage,
    offset: IVec2,
}

impl Sprite {
    /// Wrap an image, centred on the owner's origin
    pub fn new(image: GrayImage) -> Self {
        let offset = IVec2::new(-(image.width() as i32) / 2, -(image.height() as i32) / 2);
        Self { image, offset }
    }

    /// Build a sprite pixel by pixel
    pub fn from_fn(width: u32, height: u32, f: impl Fn(u32, u32) -> u8) -> Self {
        Self::new(GrayImage::from_fn(width, height, |x, y| Luma([f(x, y)])))
    }

    /// Convert a decoded image. Luma values become palette indices.
    pub fn from_image(image: DynamicImage) -> Self {
        Self::new(image.to_luma8())
    }

    /// Override the offset from the owner's origin to the top-left corner
    pub fn with_offset(mut self, offset: IVec2) -> Self {
        self.offset = offset;
        self
    }

    pub fn width(&self) -> i32 {
        self.image.width() as i32
    }

    pub fn height(&self) -> i32 {
        self.image.height() as i32
    }

    pub fn offset(&self) -> IVec2 {
        self.offset
    }

    /// Position of the owner's origin inside the bitmap
    pub fn center(&self) -> Vec2 {
        -self.offset.as_vec2()
    }

    pub fn image(&self) -> &GrayImage {
        &self.image
    }

    /// Palette index at a pixel, `None` outside the bitmap
    pub fn pixel(&self, x: i32, y: i32) -> Option<u8> {
        if x < 0 || y < 0 || x >= self.width() || y >= self.height() {
            return None;
        }
        Some(self.image.get_pixel(x as u32, y as u32)[0])
    }

    /// Inside the bitmap and not transparent
    pub fn is_solid(&self, x: i32, y: i32) -> bool {
        self.pixel(x, y).is_some_and(|index| index != MASK_INDEX)
    }

    /// Number of non-transparent pixels
    pub fn solid_count(&self) -> usize {
        self.image.pixels().filter(|p| p[0] != MASK_INDEX).count()
    }
}
