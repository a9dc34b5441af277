// Asset loading
//
// Sprites that atom groups are generated from, and preset files.

mod loader;
mod sprite;

pub use loader::{AssetLoader, AssetType};
pub use sprite::{Sprite, MASK_INDEX};

/// Asset loading errors
#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("Asset not found: {0}")]
    NotFound(String),

    #[error("Failed to load asset: {0}")]
    LoadError(String),

    #[error("Image decode error: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_error_display() {
        let err = AssetError::NotFound("crate.png".to_string());
        assert_eq!(err.to_string(), "Asset not found: crate.png");
    }
}
