//! In-memory [`Decoder`] for engine tests.
//!
//! Clones share one store, so a test can keep a handle after giving the
//! decoder to an engine and swap sources, fail them, or count decodes.

use imagery_common::{SynthError, SynthResult};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use synthesis::{DecodedImage, Decoder};

#[derive(Default)]
struct Store {
    images: HashMap<String, DecodedImage>,
    failing: HashSet<String>,
    decodes: HashMap<String, usize>,
}

/// A decoder serving images from memory.
#[derive(Clone, Default)]
pub struct MemoryDecoder {
    store: Arc<Mutex<Store>>,
}

impl MemoryDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Store> {
        match self.store.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Serve `image` for `source_ref`, replacing any previous image.
    pub fn insert(&self, source_ref: &str, image: DecodedImage) {
        self.lock().images.insert(source_ref.to_string(), image);
    }

    /// Make every decode of `source_ref` fail.
    pub fn fail(&self, source_ref: &str) {
        self.lock().failing.insert(source_ref.to_string());
    }

    pub fn heal(&self, source_ref: &str) {
        self.lock().failing.remove(source_ref);
    }

    /// Number of decode calls seen for `source_ref`.
    pub fn decode_count(&self, source_ref: &str) -> usize {
        self.lock().decodes.get(source_ref).copied().unwrap_or(0)
    }

    pub fn total_decodes(&self) -> usize {
        self.lock().decodes.values().sum()
    }
}

impl Decoder for MemoryDecoder {
    fn decode(&self, source_ref: &str) -> SynthResult<DecodedImage> {
        let mut store = self.lock();
        *store.decodes.entry(source_ref.to_string()).or_default() += 1;
        if store.failing.contains(source_ref) {
            return Err(SynthError::decode(source_ref, "injected failure"));
        }
        store
            .images
            .get(source_ref)
            .cloned()
            .ok_or_else(|| SynthError::decode(source_ref, "no such source"))
    }
}
