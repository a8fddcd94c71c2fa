//! Decoding of coded data values stored in gridded rasters.

use imagery_common::{SynthError, SynthResult};
use serde::{Deserialize, Serialize};

/// Byte order declared by the data source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ByteOrder {
    Little,
    Big,
}

/// How the raw bytes of one value are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueKind {
    Unsigned,
    Signed,
    /// IEEE single precision, 4 bytes only.
    Float,
}

/// Decoder for 1 to 4 byte coded values: `value = raw * scale + offset`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PixelCodec {
    pub bytes_per_value: usize,
    pub byte_order: ByteOrder,
    pub kind: ValueKind,
    pub scale: f64,
    pub offset: f64,
}

impl PixelCodec {
    pub fn new(bytes_per_value: usize, byte_order: ByteOrder, kind: ValueKind) -> SynthResult<Self> {
        if !(1..=4).contains(&bytes_per_value) {
            return Err(SynthError::invalid_parameter(
                "bytes_per_value",
                format!("must be 1-4, got {}", bytes_per_value),
            ));
        }
        if kind == ValueKind::Float && bytes_per_value != 4 {
            return Err(SynthError::invalid_parameter(
                "bytes_per_value",
                "float values must be 4 bytes",
            ));
        }
        Ok(Self {
            bytes_per_value,
            byte_order,
            kind,
            scale: 1.0,
            offset: 0.0,
        })
    }

    /// Single unsigned bytes, no scaling.
    pub fn byte() -> Self {
        Self {
            bytes_per_value: 1,
            byte_order: ByteOrder::Little,
            kind: ValueKind::Unsigned,
            scale: 1.0,
            offset: 0.0,
        }
    }

    pub fn with_linear(mut self, scale: f64, offset: f64) -> Self {
        self.scale = scale;
        self.offset = offset;
        self
    }

    /// Bytes needed for a `width` x `height` grid of values.
    pub fn grid_len(&self, width: usize, height: usize) -> usize {
        width * height * self.bytes_per_value
    }

    /// Raw integer or float value of element `index`, before scaling.
    pub fn raw(&self, data: &[u8], index: usize) -> Option<f64> {
        let n = self.bytes_per_value;
        let start = index.checked_mul(n)?;
        let bytes = data.get(start..start + n)?;

        let mut bits: u32 = 0;
        match self.byte_order {
            ByteOrder::Big => {
                for b in bytes {
                    bits = (bits << 8) | *b as u32;
                }
            }
            ByteOrder::Little => {
                for b in bytes.iter().rev() {
                    bits = (bits << 8) | *b as u32;
                }
            }
        }

        let v = match self.kind {
            ValueKind::Unsigned => bits as f64,
            ValueKind::Signed => {
                let shift = 32 - 8 * n as u32;
                (((bits << shift) as i32) >> shift) as f64
            }
            ValueKind::Float => f32::from_bits(bits) as f64,
        };
        Some(v)
    }

    /// Physical value of element `index`.
    #[inline]
    pub fn decode(&self, data: &[u8], index: usize) -> Option<f64> {
        let raw = self.raw(data, index)?;
        if raw.is_nan() {
            return None;
        }
        Some(raw * self.scale + self.offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declared_byte_order() {
        let data = [0x01, 0x02];
        let be = PixelCodec::new(2, ByteOrder::Big, ValueKind::Unsigned).unwrap();
        let le = PixelCodec::new(2, ByteOrder::Little, ValueKind::Unsigned).unwrap();
        assert_eq!(be.decode(&data, 0), Some(258.0));
        assert_eq!(le.decode(&data, 0), Some(513.0));
    }

    #[test]
    fn test_three_byte_signed() {
        let codec = PixelCodec::new(3, ByteOrder::Big, ValueKind::Signed).unwrap();
        assert_eq!(codec.decode(&[0xff, 0xff, 0xfe], 0), Some(-2.0));
        assert_eq!(codec.decode(&[0x00, 0x00, 0x05], 0), Some(5.0));
    }

    #[test]
    fn test_float_and_linear() {
        let codec = PixelCodec::new(4, ByteOrder::Little, ValueKind::Float)
            .unwrap()
            .with_linear(2.0, -1.0);
        let bytes = 1.5f32.to_le_bytes();
        assert_eq!(codec.decode(&bytes, 0), Some(2.0));
    }

    #[test]
    fn test_out_of_bounds_is_none() {
        let codec = PixelCodec::byte();
        assert_eq!(codec.decode(&[1, 2, 3], 3), None);
    }

    #[test]
    fn test_invalid_widths() {
        assert!(PixelCodec::new(0, ByteOrder::Big, ValueKind::Unsigned).is_err());
        assert!(PixelCodec::new(5, ByteOrder::Big, ValueKind::Unsigned).is_err());
        assert!(PixelCodec::new(2, ByteOrder::Big, ValueKind::Float).is_err());
    }
}
