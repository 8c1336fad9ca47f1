use std::cmp::Ordering;

use bitflags::bitflags;
use tracing::*;

use crate::soft::{Exceptions, FpContext, PrecisionControl, RoundingMode};

bitflags! {
	#[derive(Debug, Clone, Copy, PartialEq, Eq)]
	pub struct ControlWord: u16 {
		const INVALID_MASK = 1 << 0;
		const DENORMAL_MASK = 1 << 1;
		const ZERO_DIVIDE_MASK = 1 << 2;
		const OVERFLOW_MASK = 1 << 3;
		const UNDERFLOW_MASK = 1 << 4;
		const PRECISION_MASK = 1 << 5;
		/// always reads as set
		const RESERVED = 1 << 6;
		const PRECISION_CONTROL = 0b11 << 8;
		const ROUNDING_CONTROL = 0b11 << 10;
		/// ignored since the 387
		const INFINITY_CONTROL = 1 << 12;

		const EXCEPTION_MASKS = 0x3F;
	}
}

bitflags! {
	#[derive(Debug, Clone, Copy, PartialEq, Eq)]
	pub struct StatusWord: u16 {
		const INVALID = 1 << 0;
		const DENORMAL = 1 << 1;
		const ZERO_DIVIDE = 1 << 2;
		const OVERFLOW = 1 << 3;
		const UNDERFLOW = 1 << 4;
		const PRECISION = 1 << 5;
		const STACK_FAULT = 1 << 6;
		const ERROR_SUMMARY = 1 << 7;
		const C0 = 1 << 8;
		const C1 = 1 << 9;
		const C2 = 1 << 10;
		/// composed from the register stack on read
		const TOP = 0b111 << 11;
		const C3 = 1 << 14;
		const BUSY = 1 << 15;

		const EXCEPTIONS = 0x3F;
		const CONDITION_CODES = Self::C0.bits() | Self::C1.bits() | Self::C2.bits() | Self::C3.bits();
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlStatusRegisters {
	pub control: ControlWord,
	/// never holds the TOP field
	pub status: StatusWord,
}

impl Default for ControlStatusRegisters {
	fn default() -> Self {
		Self::new()
	}
}

impl ControlStatusRegisters {
	pub const DEFAULT_CONTROL: u16 = 0x037F;

	pub fn new() -> Self {
		Self {
			control: ControlWord::from_bits_retain(Self::DEFAULT_CONTROL),
			status: StatusWord::empty(),
		}
	}

	pub fn init(&mut self) {
		*self = Self::new();
	}

	pub fn clear_exceptions(&mut self) {
		self.status.remove(
			StatusWord::EXCEPTIONS | StatusWord::STACK_FAULT | StatusWord::ERROR_SUMMARY | StatusWord::BUSY,
		);
	}

	pub fn raise(&mut self, flags: Exceptions) {
		if flags.is_empty() {
			return;
		}
		debug!("raising numeric exceptions {flags:?}");
		self.status |= StatusWord::from_bits_retain(flags.bits());
		self.update_summary();
	}

	/// ES and B mirror whether any raised exception is unmasked
	fn update_summary(&mut self) {
		let masks = self.control.bits() & ControlWord::EXCEPTION_MASKS.bits();
		let pending = self.status.bits() & StatusWord::EXCEPTIONS.bits() & !masks;
		self.status
			.set(StatusWord::ERROR_SUMMARY | StatusWord::BUSY, pending != 0);
	}

	/// Writes the compare result into C3/C2/C0, None being unordered
	pub fn set_condition(&mut self, ordering: Option<Ordering>) {
		let (c3, c2, c0) = match ordering {
			Some(Ordering::Greater) => (false, false, false),
			Some(Ordering::Less) => (false, false, true),
			Some(Ordering::Equal) => (true, false, false),
			None => (true, true, true),
		};
		self.set_codes(c3, c2, false, c0);
	}

	pub fn set_c1(&mut self, value: bool) {
		self.status.set(StatusWord::C1, value);
	}

	pub fn set_codes(&mut self, c3: bool, c2: bool, c1: bool, c0: bool) {
		self.status.set(StatusWord::C3, c3);
		self.status.set(StatusWord::C2, c2);
		self.status.set(StatusWord::C1, c1);
		self.status.set(StatusWord::C0, c0);
	}

	/// Invalid operation caused by the register stack. C1 tells overflow from underflow.
	pub fn set_stack_fault(&mut self, overflow: bool) {
		self.status.insert(StatusWord::STACK_FAULT);
		self.set_c1(overflow);
		self.raise(Exceptions::INVALID);
	}

	pub fn rounding_mode(&self) -> RoundingMode {
		RoundingMode::from_u8((self.control.bits() >> 10) as u8)
	}

	pub fn precision(&self) -> PrecisionControl {
		PrecisionControl::from_u8((self.control.bits() >> 8) as u8)
	}

	pub fn context(&self) -> FpContext {
		FpContext::new(self.rounding_mode(), self.precision())
	}

	/// Makes the exceptions a primitive raised sticky
	pub fn commit(&mut self, ctx: &FpContext) {
		self.raise(ctx.exceptions);
	}

	pub fn control_word(&self) -> u16 {
		self.control.bits()
	}

	pub fn status_word(&self, top: u8) -> u16 {
		(self.status.bits() & !StatusWord::TOP.bits()) | (u16::from(top & 0b111) << 11)
	}

	pub fn load_control(&mut self, word: u16) {
		self.control = ControlWord::from_bits_retain(word) | ControlWord::RESERVED;
		self.update_summary();
	}

	/// Returns the TOP field, which belongs to the register stack
	pub fn load_status(&mut self, word: u16) -> u8 {
		self.status = StatusWord::from_bits_retain(word & !StatusWord::TOP.bits());
		self.update_summary();
		((word >> 11) & 0b111) as u8
	}

	pub fn mask_all(&mut self) {
		self.control |= ControlWord::EXCEPTION_MASKS;
		self.update_summary();
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn initial_state() {
		let csrs = ControlStatusRegisters::new();
		assert_eq!(csrs.control_word(), 0x037F);
		assert_eq!(csrs.status_word(0), 0);
		assert_eq!(csrs.rounding_mode(), RoundingMode::RoundToNearestTieEven);
		assert_eq!(csrs.precision(), PrecisionControl::Extended);
	}

	#[test]
	fn control_fields() {
		let mut csrs = ControlStatusRegisters::new();
		csrs.load_control(0x0C3F | 0x0200);
		assert_eq!(csrs.rounding_mode(), RoundingMode::RoundTowardsZero);
		assert_eq!(csrs.precision(), PrecisionControl::Double);
		assert_eq!(csrs.control_word(), 0x0E7F);
		assert_eq!(csrs.context().rounding, RoundingMode::RoundTowardsZero);
	}

	#[test]
	fn masked_exceptions_do_not_summarize() {
		let mut csrs = ControlStatusRegisters::new();
		csrs.raise(Exceptions::ZERO_DIVIDE | Exceptions::PRECISION);
		assert_eq!(csrs.status_word(0), 0x0024);

		// unmasking a pending exception sets ES and B
		csrs.load_control(0x037B);
		assert_eq!(csrs.status_word(0), 0x80A4);

		csrs.clear_exceptions();
		assert_eq!(csrs.status_word(0), 0);
	}

	#[test]
	fn condition_codes() {
		let mut csrs = ControlStatusRegisters::new();
		csrs.set_condition(Some(Ordering::Less));
		assert_eq!(csrs.status_word(0), 0x0100);
		csrs.set_condition(Some(Ordering::Equal));
		assert_eq!(csrs.status_word(0), 0x4000);
		csrs.set_condition(None);
		assert_eq!(csrs.status_word(0), 0x4500);
		csrs.set_condition(Some(Ordering::Greater));
		assert_eq!(csrs.status_word(0), 0);
	}

	#[test]
	fn status_word_carries_top() {
		let mut csrs = ControlStatusRegisters::new();
		csrs.set_stack_fault(true);
		assert_eq!(csrs.status_word(5), 0x2800 | 0x0241);

		let mut other = ControlStatusRegisters::new();
		assert_eq!(other.load_status(csrs.status_word(5)), 5);
		assert_eq!(other.status, csrs.status);
	}
}
