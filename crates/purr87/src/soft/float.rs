use super::convert::IeeeFormat;
use super::{ExtendedReal, FpContext};

/// An IEEE 754 single precision value as it sits in guest memory
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(transparent)]
pub struct SoftFloat(u32);

impl SoftFloat {
	pub const fn from_f32(value: f32) -> Self {
		Self(value.to_bits())
	}

	pub const fn to_f32(self) -> f32 {
		f32::from_bits(self.0)
	}

	pub const fn from_bits(value: u32) -> Self {
		Self(value)
	}

	pub const fn to_bits(self) -> u32 {
		self.0
	}

	pub fn from_le_bytes(bytes: [u8; 4]) -> Self {
		Self(u32::from_le_bytes(bytes))
	}

	pub fn to_le_bytes(self) -> [u8; 4] {
		self.0.to_le_bytes()
	}

	pub fn to_extended(self, ctx: &mut FpContext) -> ExtendedReal {
		Self::FORMAT.to_extended(u64::from(self.0), ctx)
	}

	pub fn from_extended(value: &ExtendedReal, ctx: &mut FpContext) -> Self {
		Self(Self::FORMAT.from_extended(value, ctx) as u32)
	}
}

impl SoftFloat {
	pub const BITS: u32 = 32;
	pub const MANTISSA_BITS: u32 = 23;
	pub const EXPONENT_BITS: u32 = Self::BITS - Self::MANTISSA_BITS - 1;

	const FORMAT: IeeeFormat = IeeeFormat {
		exponent_bits: Self::EXPONENT_BITS,
		fraction_bits: Self::MANTISSA_BITS,
	};
}
