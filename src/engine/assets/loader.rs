// Asset loading functionality

use super::{AssetError, Sprite};
use crate::engine::physics::{AtomGroupPreset, LimbPathPreset};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Supported asset types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetType {
    Sprite,
    Preset,
}

impl AssetType {
    /// Get the default directory for this asset type
    pub fn default_directory(&self) -> &'static str {
        match self {
            AssetType::Sprite => "sprites",
            AssetType::Preset => "presets",
        }
    }

    /// Get supported file extensions for this asset type
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            AssetType::Sprite => &["png", "jpg", "jpeg"],
            AssetType::Preset => &["json"],
        }
    }
}

/// Asset loader responsible for finding and loading asset files
pub struct AssetLoader {
    base_path: PathBuf,
}

impl AssetLoader {
    /// Create a new asset loader with the given base path
    pub fn new<P: AsRef<Path>>(base_path: P) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
        }
    }

    /// Get the full path for an asset
    pub fn resolve_path(&self, asset_type: AssetType, name: &str) -> PathBuf {
        self.base_path
            .join(asset_type.default_directory())
            .join(name)
    }

    /// Load asset bytes from disk
    pub fn load_bytes(&self, asset_type: AssetType, name: &str) -> Result<Vec<u8>> {
        let path = self.resolve_path(asset_type, name);

        if !path.exists() {
            return Err(AssetError::NotFound(path.to_string_lossy().to_string()).into());
        }

        std::fs::read(&path)
            .map_err(|e| AssetError::LoadError(format!("Failed to read {}: {}", name, e)).into())
    }

    /// Decode a sprite. Any image format the `image` crate reads works; colour is
    /// reduced to luma, with 0 as the transparent index.
    pub fn load_sprite(&self, name: &str) -> Result<Sprite> {
        let bytes = self.load_bytes(AssetType::Sprite, name)?;
        let image = image::load_from_memory(&bytes).map_err(AssetError::from)?;
        Ok(Sprite::from_image(image))
    }

    /// Read a preset file as text
    pub fn load_preset_text(&self, name: &str) -> Result<String> {
        let bytes = self.load_bytes(AssetType::Preset, name)?;
        String::from_utf8(bytes)
            .map_err(|e| AssetError::LoadError(format!("{} is not UTF-8: {}", name, e)).into())
    }

    /// Parse an atom group preset from the preset directory
    pub fn load_atom_group_preset(&self, name: &str) -> Result<AtomGroupPreset> {
        let text = self.load_preset_text(name)?;
        AtomGroupPreset::from_json(&text).with_context(|| format!("Parsing atom group preset {}", name))
    }

    /// Parse a limb path preset from the preset directory
    pub fn load_limb_path_preset(&self, name: &str) -> Result<LimbPathPreset> {
        let text = self.load_preset_text(name)?;
        LimbPathPreset::from_json(&text).with_context(|| format!("Parsing limb path preset {}", name))
    }

    /// Check if an asset exists
    pub fn exists(&self, asset_type: AssetType, name: &str) -> bool {
        self.resolve_path(asset_type, name).exists()
    }

    /// List all assets of a given type
    pub fn list_assets(&self, asset_type: AssetType) -> Result<Vec<String>> {
        let dir = self.base_path.join(asset_type.default_directory());

        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut assets = Vec::new();
        let extensions = asset_type.extensions();

        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            let matches = path
                .extension()
                .is_some_and(|ext| extensions.contains(&ext.to_string_lossy().as_ref()));
            if path.is_file() && matches {
                if let Some(name) = path.file_name() {
                    assets.push(name.to_string_lossy().to_string());
                }
            }
        }

        assets.sort();
        Ok(assets)
    }

    /// Get the base path
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_type_directories() {
        assert_eq!(AssetType::Sprite.default_directory(), "sprites");
        assert_eq!(AssetType::Preset.default_directory(), "presets");
    }

    #[test]
    fn test_asset_type_extensions() {
        assert!(AssetType::Sprite.extensions().contains(&"png"));
        assert!(AssetType::Preset.extensions().contains(&"json"));
        assert!(!AssetType::Preset.extensions().contains(&"png"));
    }

    #[test]
    fn test_loader_path_resolution() {
        let loader = AssetLoader::new("/sim/assets");
        let path = loader.resolve_path(AssetType::Sprite, "crate.png");

        assert_eq!(path, PathBuf::from("/sim/assets/sprites/crate.png"));
    }

    #[test]
    fn test_missing_sprite_is_not_found() {
        let loader = AssetLoader::new("/nonexistent/assets");
        let err = loader.load_sprite("nothing.png").expect_err("missing file");
        let asset_err = err.downcast_ref::<AssetError>().expect("asset error");
        assert!(matches!(asset_err, AssetError::NotFound(_)));
    }

    #[test]
    fn test_sprite_round_trip_through_png() {
        let dir = std::env::temp_dir().join(format!("rte-atoms-loader-{}", std::process::id()));
        std::fs::create_dir_all(dir.join("sprites")).expect("temp dir");
        let sprite = Sprite::from_fn(5, 3, |x, y| if x == y { 0 } else { 200 });
        sprite
            .image()
            .save(dir.join("sprites").join("diag.png"))
            .expect("save png");

        let loader = AssetLoader::new(&dir);
        let loaded = loader.load_sprite("diag.png").expect("load png");
        assert_eq!(loaded.width(), 5);
        assert_eq!(loaded.height(), 3);
        assert!(!loaded.is_solid(1, 1));
        assert!(loaded.is_solid(2, 1));
        assert_eq!(loader.list_assets(AssetType::Sprite).expect("list"), vec!["diag.png".to_string()]);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_presets_load_from_preset_directory() {
        let dir = std::env::temp_dir().join(format!("rte-atoms-presets-{}", std::process::id()));
        let presets = dir.join("presets");
        std::fs::create_dir_all(&presets).expect("temp dir");
        std::fs::write(
            presets.join("pebble.json"),
            r#"{ "material": 1, "atoms": [ { "offset": [0.0, 0.0], "material": 1 } ] }"#,
        )
        .expect("write group");
        std::fs::write(
            presets.join("stride.json"),
            r#"{ "segments": [[0.0, 4.0], [4.0, 0.0]], "slow_travel_speed": 1.0,
                 "normal_travel_speed": 2.0, "fast_travel_speed": 3.0, "push_force": 500.0 }"#,
        )
        .expect("write path");
        std::fs::write(presets.join("broken.json"), "{ not json").expect("write broken");

        let loader = AssetLoader::new(&dir);
        let group = loader.load_atom_group_preset("pebble.json").expect("group preset");
        assert_eq!(group.atoms.len(), 1);
        let path = loader.load_limb_path_preset("stride.json").expect("path preset");
        assert_eq!(path.segments.len(), 2);
        assert!(loader.load_limb_path_preset("broken.json").is_err());
        assert_eq!(
            loader.list_assets(AssetType::Preset).expect("list"),
            vec!["broken.json".to_string(), "pebble.json".to_string(), "stride.json".to_string()]
        );

        let _ = std::fs::remove_dir_all(&dir);
    }
}
