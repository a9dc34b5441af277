// Engine modules: materials, assets, scene collaborators, physics, sim clock

pub mod assets;
pub mod game_loop;
pub mod material;
pub mod physics;
pub mod scene;
