//! Content-addressed memo of detection results and face descriptors.

use crate::types::{Descriptor, FaceRegion};
use image::RgbImage;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// SHA-256 digest used as a cache key.
pub type ContentHash = [u8; 32];

/// SHA-256 over an image's dimensions and raw pixel bytes.
pub fn content_hash(image: &RgbImage) -> ContentHash {
    let mut hasher = Sha256::new();
    hasher.update(image.width().to_le_bytes());
    hasher.update(image.height().to_le_bytes());
    hasher.update(image.as_raw());
    hasher.finalize().into()
}

struct Entry<T> {
    value: T,
    inserted_at: Instant,
}

impl<T> Entry<T> {
    fn new(value: T) -> Self {
        Self { value, inserted_at: Instant::now() }
    }
}

/// Two maps sharing one size ceiling: image hash → detected regions and
/// face hash → descriptor.
///
/// When an insertion finds the combined size at the ceiling, everything is
/// cleared first. There is no LRU ordering. Not synchronised; owners wrap
/// it in a lock.
pub struct DescriptorCache {
    regions: HashMap<ContentHash, Entry<Vec<FaceRegion>>>,
    descriptors: HashMap<ContentHash, Entry<Descriptor>>,
    capacity: usize,
}

impl DescriptorCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            regions: HashMap::new(),
            descriptors: HashMap::new(),
            capacity,
        }
    }

    /// Combined entry count across both maps.
    pub fn len(&self) -> usize {
        self.regions.len() + self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn regions(&self, image_hash: &ContentHash) -> Option<Vec<FaceRegion>> {
        self.regions.get(image_hash).map(|e| e.value.clone())
    }

    pub fn descriptor(&self, face_hash: &ContentHash) -> Option<Descriptor> {
        self.descriptors.get(face_hash).map(|e| e.value.clone())
    }

    pub fn insert_regions(&mut self, image_hash: ContentHash, regions: Vec<FaceRegion>) {
        self.make_room(self.regions.contains_key(&image_hash));
        self.regions.insert(image_hash, Entry::new(regions));
    }

    pub fn insert_descriptor(&mut self, face_hash: ContentHash, descriptor: Descriptor) {
        self.make_room(self.descriptors.contains_key(&face_hash));
        self.descriptors.insert(face_hash, Entry::new(descriptor));
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.regions.clear();
        self.descriptors.clear();
    }

    /// Drop entries inserted more than `max_age` ago. Returns how many were removed.
    pub fn clear_older_than(&mut self, max_age: Duration) -> usize {
        let before = self.len();
        let now = Instant::now();
        self.regions.retain(|_, e| now.duration_since(e.inserted_at) <= max_age);
        self.descriptors.retain(|_, e| now.duration_since(e.inserted_at) <= max_age);
        let removed = before - self.len();
        if removed > 0 {
            tracing::debug!(removed, remaining = self.len(), "aged out cache entries");
        }
        removed
    }

    fn make_room(&mut self, replacing: bool) {
        if !replacing && self.len() >= self.capacity {
            tracing::debug!(entries = self.len(), capacity = self.capacity, "cache full; clearing");
            self.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn key(n: u8) -> ContentHash {
        [n; 32]
    }

    fn region() -> FaceRegion {
        FaceRegion {
            x: 0,
            y: 0,
            width: 4,
            height: 4,
            confidence: Some(0.9),
            crop: RgbImage::new(4, 4),
        }
    }

    #[test]
    fn test_content_hash_stable_and_distinct() {
        let a = RgbImage::from_pixel(8, 8, Rgb([1, 2, 3]));
        let b = RgbImage::from_pixel(8, 8, Rgb([1, 2, 4]));
        assert_eq!(content_hash(&a), content_hash(&a.clone()));
        assert_ne!(content_hash(&a), content_hash(&b));
    }

    #[test]
    fn test_content_hash_is_sha256_of_shape_and_pixels() {
        let image = RgbImage::from_pixel(1, 1, Rgb([0, 0, 0]));
        let mut bytes = Vec::new();
        bytes.extend(1u32.to_le_bytes());
        bytes.extend(1u32.to_le_bytes());
        bytes.extend([0u8; 3]);
        let expected: ContentHash = Sha256::digest(&bytes).into();
        assert_eq!(content_hash(&image), expected);
    }

    #[test]
    fn test_content_hash_includes_shape() {
        // Same bytes, different shape.
        let wide = RgbImage::from_pixel(8, 2, Rgb([9, 9, 9]));
        let tall = RgbImage::from_pixel(2, 8, Rgb([9, 9, 9]));
        assert_ne!(content_hash(&wide), content_hash(&tall));
    }

    #[test]
    fn test_lookup_after_insert() {
        let mut cache = DescriptorCache::new(10);
        cache.insert_regions(key(1), vec![region()]);
        cache.insert_descriptor(key(2), Descriptor::classical(vec![1.0]));

        assert_eq!(cache.regions(&key(1)).map(|r| r.len()), Some(1));
        assert_eq!(cache.descriptor(&key(2)), Some(Descriptor::classical(vec![1.0])));
        assert!(cache.regions(&key(2)).is_none());
        assert!(cache.descriptor(&key(1)).is_none());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_full_clear_when_ceiling_reached() {
        let mut cache = DescriptorCache::new(5);
        for i in 0..5 {
            cache.insert_descriptor(key(i), Descriptor::classical(vec![i as f32]));
        }
        assert_eq!(cache.len(), 5);

        cache.insert_regions(key(99), vec![]);
        assert_eq!(cache.len(), 1);
        assert!(cache.descriptor(&key(0)).is_none());
        assert!(cache.regions(&key(99)).is_some());
    }

    #[test]
    fn test_replacing_existing_key_does_not_clear() {
        let mut cache = DescriptorCache::new(2);
        cache.insert_descriptor(key(1), Descriptor::classical(vec![1.0]));
        cache.insert_descriptor(key(2), Descriptor::classical(vec![2.0]));
        cache.insert_descriptor(key(2), Descriptor::classical(vec![3.0]));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.descriptor(&key(2)), Some(Descriptor::classical(vec![3.0])));
    }

    #[test]
    fn test_clear_older_than() {
        let mut cache = DescriptorCache::new(10);
        cache.insert_descriptor(key(1), Descriptor::classical(vec![1.0]));
        cache.insert_regions(key(2), vec![region()]);

        assert_eq!(cache.clear_older_than(Duration::from_secs(3600)), 0);
        assert_eq!(cache.len(), 2);

        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.clear_older_than(Duration::ZERO), 2);
        assert!(cache.is_empty());
    }
}
