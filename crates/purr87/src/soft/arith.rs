use std::cmp::Ordering;

use super::extended::{mul_64x64, normalize_round, shift_right_jamming, BIAS, QUIET_NAN_BIT};
use super::{Exceptions, ExtendedReal, FpContext, PrecisionControl, RoundingMode};

impl ExtendedReal {
	pub fn add(&self, other: &Self, ctx: &mut FpContext) -> Self {
		if self.is_nan() || other.is_nan() {
			return propagate_nan(self, other, ctx);
		}

		if self.is_infinity() {
			if other.is_infinity() && other.sign != self.sign {
				ctx.raise(Exceptions::INVALID);
				return Self::INDEFINITE;
			}
			return *self;
		}
		if other.is_infinity() {
			return *other;
		}

		flag_denormals(self, other, ctx);

		match (self.has_zero_magnitude(), other.has_zero_magnitude()) {
			(true, true) => {
				let sign = if self.sign == other.sign {
					self.sign
				} else {
					ctx.rounding == RoundingMode::RoundDown
				};
				return Self::zero(sign);
			}
			(false, true) => return self.rounded(ctx),
			(true, false) => return other.rounded(ctx),
			(false, false) => {}
		}

		let (lhs_sign, lhs_exponent, lhs_mantissa) = self.unpack();
		let (rhs_sign, rhs_exponent, rhs_mantissa) = other.unpack();

		// leave bit 127 free for the carry of the addition
		let exponent = lhs_exponent.max(rhs_exponent);
		let lhs = shift_right_jamming(u128::from(lhs_mantissa) << 63, (exponent - lhs_exponent) as u32);
		let rhs = shift_right_jamming(u128::from(rhs_mantissa) << 63, (exponent - rhs_exponent) as u32);

		if lhs_sign == rhs_sign {
			return normalize_round(lhs_sign, exponent, lhs + rhs, ctx);
		}

		match lhs.cmp(&rhs) {
			Ordering::Greater => normalize_round(lhs_sign, exponent, lhs - rhs, ctx),
			Ordering::Less => normalize_round(rhs_sign, exponent, rhs - lhs, ctx),
			Ordering::Equal => Self::zero(ctx.rounding == RoundingMode::RoundDown),
		}
	}

	pub fn sub(&self, other: &Self, ctx: &mut FpContext) -> Self {
		self.add(&other.negate(), ctx)
	}

	pub fn mul(&self, other: &Self, ctx: &mut FpContext) -> Self {
		if self.is_nan() || other.is_nan() {
			return propagate_nan(self, other, ctx);
		}

		let sign = self.sign ^ other.sign;
		if self.is_infinity() || other.is_infinity() {
			if self.has_zero_magnitude() || other.has_zero_magnitude() {
				ctx.raise(Exceptions::INVALID);
				return Self::INDEFINITE;
			}
			return Self::infinity(sign);
		}

		flag_denormals(self, other, ctx);
		if self.has_zero_magnitude() || other.has_zero_magnitude() {
			return Self::zero(sign);
		}

		let (_, lhs_exponent, lhs_mantissa) = self.unpack();
		let (_, rhs_exponent, rhs_mantissa) = other.unpack();
		let (high, low) = mul_64x64(lhs_mantissa, rhs_mantissa);
		let product = (u128::from(high) << 64) | u128::from(low);

		normalize_round(sign, lhs_exponent + rhs_exponent - BIAS, product, ctx)
	}

	/// Returns [None] on a division of a finite non-zero value by zero, in which case the
	/// destination is left untouched.
	pub fn div(&self, other: &Self, ctx: &mut FpContext) -> Option<Self> {
		if self.is_nan() || other.is_nan() {
			return Some(propagate_nan(self, other, ctx));
		}

		let sign = self.sign ^ other.sign;
		if self.is_infinity() {
			if other.is_infinity() {
				ctx.raise(Exceptions::INVALID);
				return Some(Self::INDEFINITE);
			}
			return Some(Self::infinity(sign));
		}
		if other.is_infinity() {
			return Some(Self::zero(sign));
		}

		if other.has_zero_magnitude() {
			if self.has_zero_magnitude() {
				ctx.raise(Exceptions::INVALID);
				return Some(Self::INDEFINITE);
			}
			ctx.raise(Exceptions::ZERO_DIVIDE);
			return None;
		}

		flag_denormals(self, other, ctx);
		if self.has_zero_magnitude() {
			return Some(Self::zero(sign));
		}

		let (_, lhs_exponent, lhs_mantissa) = self.unpack();
		let (_, rhs_exponent, rhs_mantissa) = other.unpack();
		let quotient = restoring_divide(lhs_mantissa, rhs_mantissa);

		Some(normalize_round(sign, lhs_exponent - rhs_exponent + BIAS, quotient, ctx))
	}

	/// [None] means unordered. Only signaling NaNs raise an invalid operation here, ordered
	/// comparisons add that for quiet NaNs themselves.
	pub fn compare(&self, other: &Self, ctx: &mut FpContext) -> Option<Ordering> {
		if self.is_nan() || other.is_nan() {
			if self.is_signaling_nan() || other.is_signaling_nan() {
				ctx.raise(Exceptions::INVALID);
			}
			return None;
		}

		if self.is_infinity() || other.is_infinity() {
			let rank = |value: &Self| match (value.is_infinity(), value.sign) {
				(false, _) => 0,
				(true, false) => 1,
				(true, true) => -1,
			};
			return Some(rank(self).cmp(&rank(other)));
		}

		// the difference is exact at full precision, a narrower one could flush it to zero
		let mut scratch = FpContext::new(ctx.rounding, PrecisionControl::Extended);
		let difference = self.sub(other, &mut scratch);
		ctx.raise(scratch.exceptions & Exceptions::DENORMAL);

		if difference.has_zero_magnitude() {
			Some(Ordering::Equal)
		} else if difference.sign {
			Some(Ordering::Less)
		} else {
			Some(Ordering::Greater)
		}
	}
}

fn flag_denormals(lhs: &ExtendedReal, rhs: &ExtendedReal, ctx: &mut FpContext) {
	if lhs.is_denormal() || rhs.is_denormal() {
		ctx.raise(Exceptions::DENORMAL);
	}
}

/// At least one operand is a NaN. The one with the larger significand wins and comes back quiet.
fn propagate_nan(lhs: &ExtendedReal, rhs: &ExtendedReal, ctx: &mut FpContext) -> ExtendedReal {
	if lhs.is_signaling_nan() || rhs.is_signaling_nan() {
		ctx.raise(Exceptions::INVALID);
	}

	let winner = match (lhs.is_nan(), rhs.is_nan()) {
		(true, true) => {
			if (rhs.mantissa | QUIET_NAN_BIT) > (lhs.mantissa | QUIET_NAN_BIT) {
				rhs
			} else {
				lhs
			}
		}
		(true, false) => lhs,
		_ => rhs,
	};
	winner.quieted()
}

/// Restoring long division of two normalized mantissas.
///
/// Produces 127 quotient bits with the integer bit at position 126 (the quotient lies in
/// (0.5, 2)), and ORs a sticky bit for a non-zero final remainder into bit 0.
fn restoring_divide(dividend: u64, divisor: u64) -> u128 {
	let divisor = u128::from(divisor);
	let mut remainder = u128::from(dividend);
	let mut quotient = 0u128;

	for _ in 0..127 {
		quotient <<= 1;
		if remainder >= divisor {
			remainder -= divisor;
			quotient |= 1;
		}
		remainder <<= 1;
	}

	quotient | u128::from(remainder != 0)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::soft::extended::{MANTISSA_HIGH_BIT, MAX_EXPONENT};

	fn ext(value: i64) -> ExtendedReal {
		ExtendedReal::from_i64(value)
	}

	/// 2^power
	fn pow2(power: i32) -> ExtendedReal {
		ExtendedReal::new(false, (BIAS + power) as u16, MANTISSA_HIGH_BIT)
	}

	#[test]
	fn small_integer_arithmetic_is_exact() {
		let mut ctx = FpContext::default();
		assert_eq!(ext(20).add(&ext(100), &mut ctx), ext(120));
		assert_eq!(ext(20).sub(&ext(100), &mut ctx), ext(-80));
		assert_eq!(ext(-7).mul(&ext(6), &mut ctx), ext(-42));
		assert_eq!(ext(100).div(&ext(20), &mut ctx), Some(ext(5)));
		assert_eq!(ext(-9).div(&ext(3), &mut ctx), Some(ext(-3)));
		assert!(ctx.exceptions.is_empty(), "{:?}", ctx.exceptions);
	}

	#[test]
	fn one_point_five_plus_one() {
		let mut ctx = FpContext::default();
		let one_and_half = ExtendedReal::new(false, BIAS as u16, 0xC000_0000_0000_0000);
		let sum = one_and_half.add(&ExtendedReal::ONE, &mut ctx);
		assert_eq!(sum, ExtendedReal::new(false, BIAS as u16 + 1, 0xA000_0000_0000_0000));
		assert!(ctx.exceptions.is_empty());
	}

	#[test]
	fn cancellation_renormalizes() {
		let mut ctx = FpContext::default();
		let a = ExtendedReal::new(false, BIAS as u16, 0x8000_0000_0000_0001);
		let difference = a.sub(&ExtendedReal::ONE, &mut ctx);
		assert_eq!(difference, pow2(-63));
		assert!(ctx.exceptions.is_empty());
	}

	#[test]
	fn exact_cancellation_yields_signed_zero() {
		let mut ctx = FpContext::default();
		assert_eq!(ext(3).sub(&ext(3), &mut ctx), ExtendedReal::zero(false));

		let mut ctx = FpContext::new(RoundingMode::RoundDown, PrecisionControl::Extended);
		assert_eq!(ext(3).sub(&ext(3), &mut ctx), ExtendedReal::zero(true));
	}

	#[test]
	fn alignment_keeps_sticky_bits() {
		let mut ctx = FpContext::default();
		// 1 + 2^-70 is not representable: rounds back to 1 but flags precision
		assert_eq!(ExtendedReal::ONE.add(&pow2(-70), &mut ctx), ExtendedReal::ONE);
		assert!(ctx.exceptions.contains(Exceptions::PRECISION));

		// 1 - 2^-70 rounds to 1 under nearest but to the predecessor of 1 when truncating
		let mut ctx = FpContext::new(RoundingMode::RoundTowardsZero, PrecisionControl::Extended);
		let below_one = ExtendedReal::ONE.sub(&pow2(-70), &mut ctx);
		assert_eq!(below_one, ExtendedReal::new(false, BIAS as u16 - 1, u64::MAX));
	}

	#[test]
	fn carry_out_increments_exponent() {
		let mut ctx = FpContext::default();
		let max_mantissa = ExtendedReal::new(false, BIAS as u16, u64::MAX);
		let sum = max_mantissa.add(&max_mantissa, &mut ctx);
		assert_eq!(sum, ExtendedReal::new(false, BIAS as u16 + 1, u64::MAX));
	}

	#[test]
	fn addition_overflow_saturates() {
		let mut ctx = FpContext::default();
		let huge = ExtendedReal::max_finite(false, 64);
		assert_eq!(huge.add(&huge, &mut ctx), ExtendedReal::infinity(false));
		assert!(ctx.exceptions.contains(Exceptions::OVERFLOW));
	}

	#[test]
	fn infinities() {
		let mut ctx = FpContext::default();
		let inf = ExtendedReal::infinity(false);
		assert_eq!(inf.add(&ext(1), &mut ctx), inf);
		assert_eq!(inf.mul(&ext(-2), &mut ctx), ExtendedReal::infinity(true));
		assert!(ctx.exceptions.is_empty());

		assert_eq!(inf.add(&inf.negate(), &mut ctx), ExtendedReal::INDEFINITE);
		assert!(ctx.exceptions.contains(Exceptions::INVALID));

		let mut ctx = FpContext::default();
		assert_eq!(inf.mul(&ExtendedReal::ZERO, &mut ctx), ExtendedReal::INDEFINITE);
		assert!(ctx.exceptions.contains(Exceptions::INVALID));
	}

	#[test]
	fn nan_operands_propagate_quietly() {
		let mut ctx = FpContext::default();
		let snan = ExtendedReal::new(false, 0x7FFF, MANTISSA_HIGH_BIT | 0x1234);
		let result = snan.add(&ext(1), &mut ctx);
		assert_eq!(result, snan.quieted());
		assert!(ctx.exceptions.contains(Exceptions::INVALID));

		let mut ctx = FpContext::default();
		let result = ext(1).mul(&ExtendedReal::INDEFINITE, &mut ctx);
		assert_eq!(result, ExtendedReal::INDEFINITE);
		assert!(ctx.exceptions.is_empty());
	}

	#[test]
	fn denormal_operands_are_flagged() {
		let mut ctx = FpContext::default();
		let denormal = ExtendedReal::new(false, 0, 1 << 40);
		let sum = denormal.add(&denormal, &mut ctx);
		assert_eq!(sum, ExtendedReal::new(false, 0, 1 << 41));
		assert!(ctx.exceptions.contains(Exceptions::DENORMAL));
	}

	#[test]
	fn multiplication_overflow_produces_signed_infinity() {
		let mut ctx = FpContext::default();
		let big = ExtendedReal::new(false, MAX_EXPONENT - 10, MANTISSA_HIGH_BIT);
		assert_eq!(big.mul(&big.negate(), &mut ctx), ExtendedReal::infinity(true));
		assert!(ctx.exceptions.contains(Exceptions::OVERFLOW));
	}

	#[test]
	fn multiplication_keeps_the_bias_once() {
		let mut ctx = FpContext::default();
		assert_eq!(pow2(10).mul(&pow2(-3), &mut ctx), pow2(7));
		assert_eq!(ext(3).mul(&ext(3), &mut ctx), ext(9));
		// 1.5 * 1.5 = 2.25
		let one_and_half = ExtendedReal::new(false, BIAS as u16, 0xC000_0000_0000_0000);
		let product = one_and_half.mul(&one_and_half, &mut ctx);
		assert_eq!(product, ExtendedReal::new(false, BIAS as u16 + 1, 0x9000_0000_0000_0000));
	}

	#[test]
	fn division_by_zero_produces_nothing() {
		let mut ctx = FpContext::default();
		assert_eq!(ext(5).div(&ExtendedReal::ZERO, &mut ctx), None);
		assert!(ctx.exceptions.contains(Exceptions::ZERO_DIVIDE));

		let mut ctx = FpContext::default();
		assert_eq!(
			ExtendedReal::ZERO.div(&ExtendedReal::ZERO, &mut ctx),
			Some(ExtendedReal::INDEFINITE)
		);
		assert!(ctx.exceptions.contains(Exceptions::INVALID));
	}

	#[test]
	fn inexact_division_rounds_to_nearest() {
		let mut ctx = FpContext::default();
		let third = ext(1).div(&ext(3), &mut ctx).unwrap();
		// 1/3 = 0.010101... rounds down at the 64th bit
		assert_eq!(third, ExtendedReal::new(false, BIAS as u16 - 2, 0xAAAA_AAAA_AAAA_AAAB));
		assert!(ctx.exceptions.contains(Exceptions::PRECISION));

		let mut ctx = FpContext::new(RoundingMode::RoundTowardsZero, PrecisionControl::Extended);
		let third = ext(1).div(&ext(3), &mut ctx).unwrap();
		assert_eq!(third, ExtendedReal::new(false, BIAS as u16 - 2, 0xAAAA_AAAA_AAAA_AAAA));
	}

	#[test]
	fn comparison() {
		let mut ctx = FpContext::default();
		assert_eq!(ext(1).compare(&ext(2), &mut ctx), Some(Ordering::Less));
		assert_eq!(ext(2).compare(&ext(1), &mut ctx), Some(Ordering::Greater));
		assert_eq!(ext(2).compare(&ext(2), &mut ctx), Some(Ordering::Equal));
		assert_eq!(
			ExtendedReal::zero(true).compare(&ExtendedReal::ZERO, &mut ctx),
			Some(Ordering::Equal)
		);

		let inf = ExtendedReal::infinity(false);
		assert_eq!(inf.compare(&inf.negate(), &mut ctx), Some(Ordering::Greater));
		assert_eq!(inf.negate().compare(&inf, &mut ctx), Some(Ordering::Less));
		assert_eq!(inf.compare(&inf, &mut ctx), Some(Ordering::Equal));
		assert_eq!(ext(1_000_000).compare(&inf, &mut ctx), Some(Ordering::Less));
		assert!(ctx.exceptions.is_empty());

		assert_eq!(ExtendedReal::INDEFINITE.compare(&ext(1), &mut ctx), None);
		assert_eq!(ext(1).compare(&ExtendedReal::INDEFINITE, &mut ctx), None);
		assert!(ctx.exceptions.is_empty());
	}

	#[test]
	fn comparison_ignores_precision_control() {
		let tiny = ExtendedReal::new(false, 0, 1);
		let above = ExtendedReal::new(false, 1, MANTISSA_HIGH_BIT | 1);
		let below = ExtendedReal::new(false, 1, MANTISSA_HIGH_BIT);

		for precision in [PrecisionControl::Single, PrecisionControl::Double, PrecisionControl::Extended] {
			let mut ctx = FpContext::new(RoundingMode::RoundToNearestTieEven, precision);
			assert_eq!(tiny.compare(&ExtendedReal::ZERO, &mut ctx), Some(Ordering::Greater));
			assert_eq!(ExtendedReal::ZERO.compare(&tiny, &mut ctx), Some(Ordering::Less));
			assert_eq!(above.compare(&below, &mut ctx), Some(Ordering::Greater));
			assert_eq!(below.compare(&above, &mut ctx), Some(Ordering::Less));
			assert_eq!(ctx.exceptions, Exceptions::DENORMAL);
		}
	}

	#[test]
	fn restoring_division_of_equal_mantissas() {
		assert_eq!(restoring_divide(MANTISSA_HIGH_BIT, MANTISSA_HIGH_BIT), 1u128 << 126);
		// 1 / 1.5 has the integer bit clear
		let quotient = restoring_divide(MANTISSA_HIGH_BIT, 0xC000_0000_0000_0000);
		assert_eq!(quotient >> 125, 1);
		assert_eq!(quotient & 1, 1);
	}
}
