//! Common test fixtures: lookup tables, viewports and ready engines.

use imagery_common::{ColorBand, EngineConfig, IndexedLut, Lut, RangedLut, Rgb, Viewport};
use synthesis::SynthesisEngine;
use tempfile::TempDir;

use crate::decoder::MemoryDecoder;

/// Window and map size used by most engine tests.
pub const WINDOW: u32 = 100;

/// A 16 entry palette where index `i` is `(i * 16, 255 - i * 16, 60)`.
pub fn ramp_palette() -> Lut {
    let colors: Vec<Rgb> = (0..16u8)
        .map(|i| Rgb::new(i * 16, 255 - i * 16, 60))
        .collect();
    Lut::Indexed(IndexedLut::new(&colors).unwrap_or_else(|_| IndexedLut::greyscale()))
}

/// Temperature-like bands, one per 10 units from 0 to 100.
pub fn banded_lut() -> Lut {
    let bands = (0..10u8)
        .map(|i| {
            let lower = i as f64 * 10.0;
            ColorBand::new(lower, lower + 10.0, Rgb::new(20 + i * 20, 40, 200 - i * 15))
        })
        .collect();
    match RangedLut::new(bands) {
        Ok(lut) => Lut::Ranged(lut),
        Err(_) => Lut::Indexed(IndexedLut::greyscale()),
    }
}

/// An engine config writing into `dir`.
pub fn test_config(dir: &TempDir) -> EngineConfig {
    EngineConfig {
        work_directory: dir.path().join("scratch"),
        ..EngineConfig::default()
    }
}

/// An engine over a shared [`MemoryDecoder`] in a fresh temporary work
/// directory, with a `WINDOW` x `WINDOW` identity viewport.
pub fn test_engine() -> (SynthesisEngine, MemoryDecoder, TempDir) {
    let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {}", e));
    let decoder = MemoryDecoder::new();
    let mut engine = SynthesisEngine::new(test_config(&dir), decoder.clone())
        .unwrap_or_else(|e| panic!("engine: {}", e));
    engine.set_viewport(Viewport::identity(WINDOW, WINDOW));
    (engine, decoder, dir)
}

/// Number of render cache files left in the engine's scratch directory.
pub fn scratch_files(dir: &TempDir) -> usize {
    std::fs::read_dir(dir.path().join("scratch"))
        .map(|entries| entries.flatten().count())
        .unwrap_or(0)
}
