//! Little-endian value codecs for process memory.
//!
//! Multi-byte values are assembled from and split into individual bytes,
//! low byte at the lowest offset. Memory is never reinterpreted in place,
//! so the encoding is independent of host endianness and alignment.

use std::fmt;

mod sealed {
    pub trait Sealed {}
    impl Sealed for u8 {}
    impl Sealed for u16 {}
    impl Sealed for u32 {}
    impl Sealed for i32 {}
    impl Sealed for f32 {}
}

/// A scalar that can be stored in process memory.
pub trait ProcessValue: Copy + sealed::Sealed {
    /// Width in bytes.
    const WIDTH: usize;

    /// Value type tag.
    const TYPE: ValueType;

    /// Decode from exactly `WIDTH` little-endian bytes.
    fn decode(bytes: &[u8]) -> Self;

    /// Encode into exactly `WIDTH` little-endian bytes.
    fn encode(self, out: &mut [u8]);
}

macro_rules! le_value {
    ($ty:ty, $width:expr, $tag:expr) => {
        impl ProcessValue for $ty {
            const WIDTH: usize = $width;
            const TYPE: ValueType = $tag;

            #[inline]
            fn decode(bytes: &[u8]) -> Self {
                let mut raw = [0u8; $width];
                raw.copy_from_slice(&bytes[..$width]);
                <$ty>::from_le_bytes(raw)
            }

            #[inline]
            fn encode(self, out: &mut [u8]) {
                out[..$width].copy_from_slice(&self.to_le_bytes());
            }
        }
    };
}

le_value!(u8, 1, ValueType::Byte);
le_value!(u16, 2, ValueType::Word);
le_value!(u32, 4, ValueType::DWord);
le_value!(i32, 4, ValueType::Int);

impl ProcessValue for f32 {
    const WIDTH: usize = 4;
    const TYPE: ValueType = ValueType::Real;

    #[inline]
    fn decode(bytes: &[u8]) -> Self {
        f32::from_bits(u32::decode(bytes))
    }

    #[inline]
    fn encode(self, out: &mut [u8]) {
        self.to_bits().encode(out);
    }
}

/// Type of a value addressed by a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    /// Single bit
    Bit,
    /// Unsigned 8-bit
    Byte,
    /// Unsigned 16-bit
    Word,
    /// Unsigned 32-bit
    DWord,
    /// Signed 32-bit
    Int,
    /// IEEE-754 32-bit float
    Real,
}

impl ValueType {
    /// Width in bytes of the addressed span.
    pub const fn width(self) -> usize {
        match self {
            Self::Bit | Self::Byte => 1,
            Self::Word => 2,
            Self::DWord | Self::Int | Self::Real => 4,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Bit => "bit",
            Self::Byte => "byte",
            Self::Word => "word",
            Self::DWord => "dword",
            Self::Int => "int",
            Self::Real => "real",
        };
        f.write_str(name)
    }
}

/// A typed value read from or written to a tag.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TagValue {
    /// Bit value
    Bit(bool),
    /// Byte value
    Byte(u8),
    /// Word value
    Word(u16),
    /// Double-word value
    DWord(u32),
    /// Signed integer value
    Int(i32),
    /// Real value
    Real(f32),
}

impl TagValue {
    /// Type of this value.
    pub const fn value_type(&self) -> ValueType {
        match self {
            Self::Bit(_) => ValueType::Bit,
            Self::Byte(_) => ValueType::Byte,
            Self::Word(_) => ValueType::Word,
            Self::DWord(_) => ValueType::DWord,
            Self::Int(_) => ValueType::Int,
            Self::Real(_) => ValueType::Real,
        }
    }
}
