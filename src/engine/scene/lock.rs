// Scoped scene locking

use std::ops::{Deref, DerefMut};

use super::TerrainQuery;

/// Holds the scene locked for the duration of a travel call.
///
/// Derefs to the terrain so the holder keeps full access while the lock is held.
/// When the caller already locked the scene (`pre_locked`), the guard neither
/// locks nor unlocks.
pub struct SceneLock<'a, T: TerrainQuery + ?Sized> {
    terrain: &'a mut T,
    owns_lock: bool,
}

impl<'a, T: TerrainQuery + ?Sized> SceneLock<'a, T> {
    /// Acquire the lock unless the caller already holds it
    pub fn acquire(terrain: &'a mut T, pre_locked: bool) -> Self {
        if !pre_locked {
            terrain.lock_scene();
        }
        Self {
            terrain,
            owns_lock: !pre_locked,
        }
    }
}

impl<T: TerrainQuery + ?Sized> Deref for SceneLock<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.terrain
    }
}

impl<T: TerrainQuery + ?Sized> DerefMut for SceneLock<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.terrain
    }
}

impl<T: TerrainQuery + ?Sized> Drop for SceneLock<'_, T> {
    fn drop(&mut self) {
        if self.owns_lock {
            self.terrain.unlock_scene();
        }
    }
}
