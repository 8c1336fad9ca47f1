use super::extended::{round_significand, shift_right_jamming, BIAS, MANTISSA_HIGH_BIT, SPECIAL_EXPONENT};
use super::{Exceptions, ExtendedReal, FpContext, RoundingMode};

impl ExtendedReal {
	/// Exact for every i64, so 16 and 32 bit integer operands go through here as well
	pub fn from_i64(value: i64) -> Self {
		if value == 0 {
			return Self::ZERO;
		}

		let magnitude = value.unsigned_abs();
		let shift = magnitude.leading_zeros();
		Self::new(value < 0, (BIAS + 63 - shift as i32) as u16, magnitude << shift)
	}

	/// Converts to an integer by the context's rounding mode. [None] means the value was a NaN,
	/// an infinity, unnormalized or out of range; the invalid operation has been raised.
	pub fn to_i64(&self, ctx: &mut FpContext) -> Option<i64> {
		if self.is_zero() {
			return Some(0);
		}

		let unbiased = i32::from(self.exponent) - BIAS;
		if self.is_special() || !self.is_normalized() || !(0..=63).contains(&unbiased) {
			ctx.raise(Exceptions::INVALID);
			return None;
		}

		let (magnitude, inexact) = round_magnitude(self.mantissa, unbiased, self.sign, ctx.rounding);
		let limit = if self.sign { 1u128 << 63 } else { (1u128 << 63) - 1 };
		if magnitude > limit {
			ctx.raise(Exceptions::INVALID);
			return None;
		}
		if inexact {
			ctx.raise(Exceptions::PRECISION);
		}

		let magnitude = magnitude as u64 as i64;
		Some(if self.sign { magnitude.wrapping_neg() } else { magnitude })
	}

	/// Rounds to an integral value by the context's rounding mode, keeping the extended format
	pub fn round_to_integral(&self, ctx: &mut FpContext) -> Self {
		if self.is_nan() {
			if self.is_signaling_nan() {
				ctx.raise(Exceptions::INVALID);
			}
			return self.quieted();
		}
		if self.is_infinity() || self.has_zero_magnitude() {
			return *self;
		}
		if self.is_denormal() {
			ctx.raise(Exceptions::DENORMAL);
		}

		let (sign, exponent, mantissa) = self.unpack();
		let unbiased = exponent - BIAS;
		if unbiased >= 63 {
			return *self;
		}

		let (magnitude, inexact) = round_magnitude(mantissa, unbiased, sign, ctx.rounding);
		if inexact {
			ctx.raise(Exceptions::PRECISION);
		}
		if magnitude == 0 {
			return Self::zero(sign);
		}

		// at most 2^63, so the rounded magnitude always fits the mantissa
		let magnitude = magnitude as u64;
		let shift = magnitude.leading_zeros();
		Self::new(sign, (BIAS + 63 - shift as i32) as u16, magnitude << shift)
	}
}

/// Integer part of mantissa * 2^(unbiased - 63), rounded by `rounding`.
/// Returns the magnitude and whether any fraction bits were discarded.
fn round_magnitude(mantissa: u64, unbiased: i32, negative: bool, rounding: RoundingMode) -> (u128, bool) {
	debug_assert!(unbiased < 64);
	// binary point between bit 64 and bit 63
	let shifted = shift_right_jamming(u128::from(mantissa) << 64, (63 - unbiased) as u32);
	let mut magnitude = shifted >> 64;
	let rest = shifted & u128::from(u64::MAX);

	if rounding.rounds_away(negative, magnitude & 1 != 0, rest, 1 << 63) {
		magnitude += 1;
	}
	(magnitude, rest != 0)
}

/// Layout of an IEEE 754 binary interchange format with an implicit integer bit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct IeeeFormat {
	pub exponent_bits: u32,
	pub fraction_bits: u32,
}

impl IeeeFormat {
	const fn bias(self) -> i32 {
		(1 << (self.exponent_bits - 1)) - 1
	}

	const fn max_exponent(self) -> u64 {
		(1 << self.exponent_bits) - 1
	}

	const fn fraction_mask(self) -> u64 {
		(1 << self.fraction_bits) - 1
	}

	const fn sign_bit(self, sign: bool) -> u64 {
		(sign as u64) << (self.exponent_bits + self.fraction_bits)
	}

	/// Widening is exact. Denormal sources get normalized, signaling NaNs come back quiet.
	pub fn to_extended(self, bits: u64, ctx: &mut FpContext) -> ExtendedReal {
		let fraction_bits = self.fraction_bits;
		let sign = bits & self.sign_bit(true) != 0;
		let exponent = (bits >> fraction_bits) & self.max_exponent();
		let fraction = bits & self.fraction_mask();

		if exponent == self.max_exponent() {
			let value = ExtendedReal::new(sign, SPECIAL_EXPONENT, MANTISSA_HIGH_BIT | fraction << (63 - fraction_bits));
			if value.is_signaling_nan() {
				ctx.raise(Exceptions::INVALID);
				return value.quieted();
			}
			return value;
		}

		if exponent == 0 {
			if fraction == 0 {
				return ExtendedReal::zero(sign);
			}

			ctx.raise(Exceptions::DENORMAL);
			let shift = fraction.leading_zeros();
			let exponent = BIAS + 64 - shift as i32 - self.bias() - fraction_bits as i32;
			return ExtendedReal::new(sign, exponent as u16, fraction << shift);
		}

		ExtendedReal::new(
			sign,
			(exponent as i32 - self.bias() + BIAS) as u16,
			MANTISSA_HIGH_BIT | fraction << (63 - fraction_bits),
		)
	}

	/// Narrowing rounds by the context's rounding mode; overflow and tiny results follow the same
	/// rules as extended results.
	pub fn from_extended(self, value: &ExtendedReal, ctx: &mut FpContext) -> u64 {
		let fraction_bits = self.fraction_bits;
		let sign = self.sign_bit(value.sign);
		let special = self.max_exponent() << fraction_bits;

		if value.is_nan() {
			if value.is_signaling_nan() {
				ctx.raise(Exceptions::INVALID);
			}
			let payload = (value.mantissa & !MANTISSA_HIGH_BIT) >> (63 - fraction_bits);
			return sign | special | payload | 1 << (fraction_bits - 1);
		}
		if value.is_infinity() {
			return sign | special;
		}
		if value.has_zero_magnitude() {
			return sign;
		}
		if value.is_denormal() {
			ctx.raise(Exceptions::DENORMAL);
		}

		let (negative, exponent, mantissa) = value.unpack();
		let (exponent, kept) = round_significand(
			negative,
			exponent - BIAS + self.bias(),
			u128::from(mantissa) << 64,
			fraction_bits + 1,
			ctx,
		);

		if exponent >= self.max_exponent() as i32 {
			ctx.raise(Exceptions::OVERFLOW | Exceptions::PRECISION);
			return if ctx.rounding.overflows_to_infinity(negative) {
				sign | special
			} else {
				sign | (self.max_exponent() - 1) << fraction_bits | self.fraction_mask()
			};
		}

		sign | (exponent as u64) << fraction_bits | (kept as u64 & self.fraction_mask())
	}
}
