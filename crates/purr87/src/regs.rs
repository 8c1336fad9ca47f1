use thiserror::Error;

use crate::soft::ExtendedReal;
use crate::ty::FpuRegisterIndex;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Tag {
	Valid = 0b00,
	Zero = 0b01,
	/// NaNs, infinities, denormals and unsupported encodings
	Special = 0b10,
	#[default]
	Empty = 0b11,
}

impl Tag {
	pub fn classify(value: &ExtendedReal) -> Self {
		if value.is_zero() {
			Tag::Zero
		} else if value.is_special() || value.mantissa & (1 << 63) == 0 {
			Tag::Special
		} else {
			Tag::Valid
		}
	}

	pub const fn from_bits(bits: u8) -> Self {
		match bits & 0b11 {
			0b00 => Tag::Valid,
			0b01 => Tag::Zero,
			0b10 => Tag::Special,
			_ => Tag::Empty,
		}
	}

	pub const fn to_bits(self) -> u8 {
		self as u8
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("FPU register stack overflow")]
pub struct StackOverflow;

/// The eight data registers, addressed relative to the top of stack
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FpuRegisters {
	slots: [ExtendedReal; 8],
	tags: [Tag; 8],
	top: u8,
}

impl Default for FpuRegisters {
	fn default() -> Self {
		Self {
			slots: [ExtendedReal::ZERO; 8],
			tags: [Tag::Empty; 8],
			top: 0,
		}
	}
}

impl FpuRegisters {
	pub fn top(&self) -> u8 {
		self.top
	}

	pub fn set_top(&mut self, top: u8) {
		self.top = top & 0b111;
	}

	/// physical slot backing ST(i)
	pub fn physical(&self, idx: FpuRegisterIndex) -> usize {
		usize::from((self.top + idx.as_u8()) & 0b111)
	}

	pub fn get(&self, idx: FpuRegisterIndex) -> ExtendedReal {
		self.slots[self.physical(idx)]
	}

	pub fn set(&mut self, idx: FpuRegisterIndex, value: ExtendedReal) {
		let slot = self.physical(idx);
		self.slots[slot] = value;
		self.tags[slot] = Tag::classify(&value);
	}

	pub fn tag(&self, idx: FpuRegisterIndex) -> Tag {
		self.tags[self.physical(idx)]
	}

	pub fn is_empty(&self, idx: FpuRegisterIndex) -> bool {
		self.tag(idx) == Tag::Empty
	}

	/// On overflow the new ST(0) holds the real indefinite instead of `value`
	pub fn push(&mut self, value: ExtendedReal) -> Result<(), StackOverflow> {
		self.decrement_top();
		if !self.is_empty(FpuRegisterIndex::ST0) {
			self.set(FpuRegisterIndex::ST0, ExtendedReal::INDEFINITE);
			return Err(StackOverflow);
		}
		self.set(FpuRegisterIndex::ST0, value);
		Ok(())
	}

	pub fn pop(&mut self) -> ExtendedReal {
		let value = self.get(FpuRegisterIndex::ST0);
		self.free(FpuRegisterIndex::ST0);
		self.increment_top();
		value
	}

	pub fn free(&mut self, idx: FpuRegisterIndex) {
		let slot = self.physical(idx);
		self.tags[slot] = Tag::Empty;
	}

	pub fn increment_top(&mut self) {
		self.top = (self.top + 1) & 0b111;
	}

	pub fn decrement_top(&mut self) {
		self.top = self.top.wrapping_sub(1) & 0b111;
	}

	/// Two bits per physical register, register 0 in the low bits
	pub fn tag_word(&self) -> u16 {
		self.tags
			.iter()
			.enumerate()
			.fold(0, |word, (slot, tag)| word | u16::from(tag.to_bits()) << (slot * 2))
	}

	/// Only the empty state is taken from the word, every other tag is derived from the slot contents
	pub fn load_tag_word(&mut self, word: u16) {
		for (slot, tag) in self.tags.iter_mut().enumerate() {
			*tag = match Tag::from_bits((word >> (slot * 2)) as u8) {
				Tag::Empty => Tag::Empty,
				_ => Tag::classify(&self.slots[slot]),
			};
		}
	}

	/// Raw access by physical slot number, for dumping state
	pub fn physical_slot(&self, slot: usize) -> (ExtendedReal, Tag) {
		(self.slots[slot & 0b111], self.tags[slot & 0b111])
	}

	pub fn reset(&mut self) {
		self.tags = [Tag::Empty; 8];
		self.top = 0;
	}
}
