//! Value to color lookup tables.
//!
//! LUTs are built elsewhere (from palette files or product configuration)
//! and registered here. The engine only refers to them by [`LutHandle`].

use crate::color::Rgb;
use crate::error::{SynthError, SynthResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Number of entries in an indexed table.
pub const INDEXED_LUT_SIZE: usize = 256;

/// Which lookup regime a table uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LutKind {
    /// A raw byte indexes the table directly.
    Indexed,
    /// A value is located among ordered `[lower, upper)` bands.
    Ranged,
}

/// Palette table indexed by raw byte. Entries without a color hold the
/// transparent sentinel.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedLut {
    entries: Vec<Rgb>,
}

impl IndexedLut {
    /// Build from up to 256 colors. Missing trailing entries are transparent.
    pub fn new(colors: &[Rgb]) -> SynthResult<Self> {
        if colors.len() > INDEXED_LUT_SIZE {
            return Err(SynthError::invalid_parameter(
                "lut",
                format!("indexed table has {} entries, max is 256", colors.len()),
            ));
        }
        let mut entries = vec![Rgb::TRANSPARENT; INDEXED_LUT_SIZE];
        entries[..colors.len()].copy_from_slice(colors);
        Ok(Self { entries })
    }

    /// A grey ramp where index `i` maps to `(i, i, i)`.
    pub fn greyscale() -> Self {
        let entries = (0..INDEXED_LUT_SIZE)
            .map(|i| Rgb::new(i as u8, i as u8, i as u8).opaque_or_black())
            .collect();
        Self { entries }
    }

    #[inline(always)]
    pub fn get(&self, index: u8) -> Rgb {
        self.entries[index as usize]
    }

    pub fn entries(&self) -> &[Rgb] {
        &self.entries
    }

    /// Apply `f` to every opaque entry.
    pub fn map_colors(&self, f: impl Fn(Rgb) -> Rgb) -> Self {
        let entries = self
            .entries
            .iter()
            .map(|c| if c.is_transparent() { *c } else { f(*c) })
            .collect();
        Self { entries }
    }
}

/// One band of a ranged table: values in `[lower, upper)` map to `color`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColorBand {
    pub lower: f64,
    pub upper: f64,
    pub color: Rgb,
}

impl ColorBand {
    pub fn new(lower: f64, upper: f64, color: Rgb) -> Self {
        Self {
            lower,
            upper,
            color,
        }
    }
}

/// Ranged table with bands sorted by lower bound and never overlapping.
#[derive(Debug, Clone, PartialEq)]
pub struct RangedLut {
    bands: Vec<ColorBand>,
}

impl RangedLut {
    pub fn new(mut bands: Vec<ColorBand>) -> SynthResult<Self> {
        for band in &bands {
            if !(band.lower < band.upper) {
                return Err(SynthError::invalid_parameter(
                    "lut",
                    format!("empty band [{}, {})", band.lower, band.upper),
                ));
            }
        }
        bands.sort_by(|a, b| a.lower.total_cmp(&b.lower));
        if let Some(w) = bands.windows(2).find(|w| w[0].upper > w[1].lower) {
            return Err(SynthError::invalid_parameter(
                "lut",
                format!(
                    "bands [{}, {}) and [{}, {}) overlap",
                    w[0].lower, w[0].upper, w[1].lower, w[1].upper
                ),
            ));
        }
        Ok(Self { bands })
    }

    /// Color of the band containing `value`, if any.
    pub fn lookup(&self, value: f64) -> Option<Rgb> {
        let idx = self.bands.partition_point(|b| b.upper <= value);
        let band = self.bands.get(idx)?;
        (band.lower <= value && value < band.upper).then_some(band.color)
    }

    pub fn bands(&self) -> &[ColorBand] {
        &self.bands
    }

    pub fn map_colors(&self, f: impl Fn(Rgb) -> Rgb) -> Self {
        let bands = self
            .bands
            .iter()
            .map(|b| ColorBand::new(b.lower, b.upper, f(b.color)))
            .collect();
        Self { bands }
    }
}

/// A registered lookup table.
#[derive(Debug, Clone, PartialEq)]
pub enum Lut {
    Indexed(IndexedLut),
    Ranged(RangedLut),
}

impl Lut {
    pub fn kind(&self) -> LutKind {
        match self {
            Lut::Indexed(_) => LutKind::Indexed,
            Lut::Ranged(_) => LutKind::Ranged,
        }
    }

    /// Look up a raw index or a decoded value. `None` means transparent.
    pub fn lookup(&self, value: f64) -> Option<Rgb> {
        match self {
            Lut::Indexed(t) => {
                if !(0.0..INDEXED_LUT_SIZE as f64).contains(&value) {
                    return None;
                }
                Some(t.get(value as u8)).filter(|c| c.is_opaque())
            }
            Lut::Ranged(t) => t.lookup(value),
        }
    }
}

/// Opaque reference to a registered LUT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LutHandle(u32);

impl LutHandle {
    pub fn raw(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for LutHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "lut#{}", self.0)
    }
}

/// Process wide table of registered LUTs.
#[derive(Debug, Default)]
pub struct LutRegistry {
    tables: HashMap<LutHandle, Arc<Lut>>,
    next: u32,
}

impl LutRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, lut: Lut) -> LutHandle {
        self.next += 1;
        let handle = LutHandle(self.next);
        self.tables.insert(handle, Arc::new(lut));
        tracing::debug!(%handle, kind = ?self.tables[&handle].kind(), "registered LUT");
        handle
    }

    pub fn get(&self, handle: LutHandle) -> SynthResult<Arc<Lut>> {
        self.tables
            .get(&handle)
            .cloned()
            .ok_or_else(|| SynthError::invalid_parameter("lut", format!("unknown handle {}", handle)))
    }

    pub fn kind(&self, handle: LutHandle) -> SynthResult<LutKind> {
        Ok(self.get(handle)?.kind())
    }

    pub fn remove(&mut self, handle: LutHandle) -> bool {
        self.tables.remove(&handle).is_some()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bands() -> Vec<ColorBand> {
        vec![
            ColorBand::new(10.0, 20.0, Rgb::new(0, 0, 255)),
            ColorBand::new(0.0, 10.0, Rgb::new(0, 255, 0)),
            ColorBand::new(30.0, 40.0, Rgb::new(255, 0, 0)),
        ]
    }

    #[test]
    fn test_ranged_lookup_half_open() {
        let lut = RangedLut::new(bands()).unwrap();
        assert_eq!(lut.lookup(0.0), Some(Rgb::new(0, 255, 0)));
        assert_eq!(lut.lookup(9.999), Some(Rgb::new(0, 255, 0)));
        assert_eq!(lut.lookup(10.0), Some(Rgb::new(0, 0, 255)));
        assert_eq!(lut.lookup(25.0), None);
        assert_eq!(lut.lookup(40.0), None);
        assert_eq!(lut.lookup(-1.0), None);
    }

    #[test]
    fn test_ranged_rejects_overlap() {
        let err = RangedLut::new(vec![
            ColorBand::new(0.0, 10.0, Rgb::BLACK),
            ColorBand::new(5.0, 15.0, Rgb::WHITE),
        ]);
        assert!(err.is_err());
    }

    #[test]
    fn test_indexed_missing_entry_is_transparent() {
        let lut = Lut::Indexed(IndexedLut::new(&[Rgb::WHITE, Rgb::BLACK]).unwrap());
        assert_eq!(lut.lookup(1.0), Some(Rgb::BLACK));
        assert_eq!(lut.lookup(2.0), None);
        assert_eq!(lut.lookup(300.0), None);
    }

    #[test]
    fn test_registry_unknown_handle() {
        let mut reg = LutRegistry::new();
        let h = reg.register(Lut::Indexed(IndexedLut::greyscale()));
        assert_eq!(reg.kind(h).unwrap(), LutKind::Indexed);
        assert!(reg.remove(h));
        assert!(matches!(reg.get(h), Err(SynthError::InvalidParameter { .. })));
    }
}
