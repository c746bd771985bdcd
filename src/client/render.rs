//! Rendering seam between the viewer and whatever draws the pixels.

use std::collections::HashMap;
use std::sync::Mutex;

/// Surface identifier for a unit; one surface per unit.
pub fn surface_id(unit: usize) -> String {
    format!("fits-hdu-{}", unit)
}

/// Something that can display a 2-D plane of typed elements.
///
/// Methods take `&self`; implementations provide their own interior
/// mutability.
pub trait Renderer: Send + Sync {
    fn create_surface(&self, id: &str);

    /// Replace the surface's image with `width * height` little-endian
    /// elements of type `type_tag`.
    fn set_image(&self, id: &str, bytes: &[u8], width: u64, height: u64, type_tag: &str);

    fn destroy_surface(&self, id: &str);

    fn has_surface(&self, id: &str) -> bool;
}

/// Last image handed to a [`RecordingRenderer`] surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedImage {
    pub width: u64,
    pub height: u64,
    pub type_tag: String,
    pub byte_len: usize,
}

/// Renderer that only remembers what it was asked to draw.
///
/// Stands in for a display when running headless.
#[derive(Debug, Default)]
pub struct RecordingRenderer {
    surfaces: Mutex<HashMap<String, Option<RecordedImage>>>,
    images_set: Mutex<usize>,
}

impl RecordingRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn image(&self, id: &str) -> Option<RecordedImage> {
        self.surfaces
            .lock()
            .ok()
            .and_then(|surfaces| surfaces.get(id).cloned().flatten())
    }

    pub fn surface_count(&self) -> usize {
        self.surfaces.lock().map(|s| s.len()).unwrap_or(0)
    }

    /// Total `set_image` calls across all surfaces.
    pub fn images_set(&self) -> usize {
        self.images_set.lock().map(|n| *n).unwrap_or(0)
    }
}

impl Renderer for RecordingRenderer {
    fn create_surface(&self, id: &str) {
        if let Ok(mut surfaces) = self.surfaces.lock() {
            surfaces.entry(id.to_string()).or_insert(None);
        }
    }

    fn set_image(&self, id: &str, bytes: &[u8], width: u64, height: u64, type_tag: &str) {
        if let Ok(mut surfaces) = self.surfaces.lock() {
            if let Some(slot) = surfaces.get_mut(id) {
                *slot = Some(RecordedImage {
                    width,
                    height,
                    type_tag: type_tag.to_string(),
                    byte_len: bytes.len(),
                });
            }
        }
        if let Ok(mut n) = self.images_set.lock() {
            *n += 1;
        }
    }

    fn destroy_surface(&self, id: &str) {
        if let Ok(mut surfaces) = self.surfaces.lock() {
            surfaces.remove(id);
        }
    }

    fn has_surface(&self, id: &str) -> bool {
        self.surfaces
            .lock()
            .map(|s| s.contains_key(id))
            .unwrap_or(false)
    }
}
