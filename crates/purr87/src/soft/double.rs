use super::convert::IeeeFormat;
use super::{ExtendedReal, FpContext};

/// An IEEE 754 double precision value as it sits in guest memory
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(transparent)]
pub struct SoftDouble(u64);

impl SoftDouble {
	pub const fn from_f64(value: f64) -> Self {
		Self(value.to_bits())
	}

	pub const fn to_f64(self) -> f64 {
		f64::from_bits(self.0)
	}

	pub const fn from_bits(value: u64) -> Self {
		Self(value)
	}

	pub const fn to_bits(self) -> u64 {
		self.0
	}

	pub fn from_le_bytes(bytes: [u8; 8]) -> Self {
		Self(u64::from_le_bytes(bytes))
	}

	pub fn to_le_bytes(self) -> [u8; 8] {
		self.0.to_le_bytes()
	}

	pub fn to_extended(self, ctx: &mut FpContext) -> ExtendedReal {
		Self::FORMAT.to_extended(self.0, ctx)
	}

	pub fn from_extended(value: &ExtendedReal, ctx: &mut FpContext) -> Self {
		Self(Self::FORMAT.from_extended(value, ctx))
	}
}

impl SoftDouble {
	pub const BITS: u32 = 64;
	pub const MANTISSA_BITS: u32 = 52;
	pub const EXPONENT_BITS: u32 = Self::BITS - Self::MANTISSA_BITS - 1;

	const FORMAT: IeeeFormat = IeeeFormat {
		exponent_bits: Self::EXPONENT_BITS,
		fraction_bits: Self::MANTISSA_BITS,
	};
}
