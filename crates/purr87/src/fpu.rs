use std::fmt::{self, Display};

use tracing::*;

use crate::csr::ControlStatusRegisters;
use crate::decode;
use crate::insn::{ArithKind, FpuInstruction, MemFormat, Source, StatusDest};
use crate::regs::{FpuRegisters, StackOverflow, Tag};
use crate::soft::double::SoftDouble;
use crate::soft::float::SoftFloat;
use crate::soft::{Exceptions, ExtendedClass, ExtendedReal, FpContext};
use crate::ty::{FaultKind, FpuRegisterIndex, ModRegRm, SegmentReg};

/// Size of the 32-bit protected mode FNSTENV/FLDENV image
pub const ENVIRONMENT_SIZE: usize = 28;
/// Size of the 32-bit protected mode FNSAVE/FRSTOR image
pub const SAVE_SIZE: usize = ENVIRONMENT_SIZE + 8 * 10;

/// Everything the FPU needs from the CPU it is attached to
pub trait FpuBus {
	/// Fetches and decodes the ModRM byte (and any SIB and displacement) following the opcode.
	/// On failure the bus has already raised the fault.
	fn decode_modrm(&mut self, address_size: bool) -> Result<ModRegRm, ()>;

	/// true for 32-bit addressing
	fn address_size(&self) -> bool;

	fn read_memory(&mut self, segment: SegmentReg, address: u32, buf: &mut [u8]) -> Result<(), FaultKind>;

	fn write_memory(&mut self, segment: SegmentReg, address: u32, data: &[u8]) -> Result<(), FaultKind>;

	fn write_ax(&mut self, value: u16);

	fn raise_fault(&mut self, fault: FaultKind);
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fpu {
	pub registers: FpuRegisters,
	pub csrs: ControlStatusRegisters,
}

/// reads `$len` bytes, or raises the fault and ends the instruction
macro_rules! read_mem {
	($bus:ident, $mem:expr, $len:expr) => {{
		let mut buf = [0u8; $len];
		match $bus.read_memory($mem.segment, $mem.address, &mut buf) {
			Ok(()) => buf,
			Err(fault) => {
				$bus.raise_fault(fault);
				return;
			}
		}
	}};
}

macro_rules! write_mem {
	($bus:ident, $mem:expr, $data:expr) => {
		match $bus.write_memory($mem.segment, $mem.address, $data) {
			Ok(()) => (),
			Err(fault) => {
				$bus.raise_fault(fault);
				return;
			}
		}
	};
}

/// ends the instruction with a stack underflow if ST(i) is empty
macro_rules! require_st {
	($self:ident, $idx:expr) => {
		if $self.registers.is_empty($idx) {
			$self.stack_underflow();
			return;
		}
	};
}

impl Fpu {
	/// The state after FINIT
	pub fn new() -> Self {
		Self::default()
	}

	pub fn init(&mut self) {
		self.registers.reset();
		self.csrs.init();
	}

	pub fn st(&self, idx: u8) -> ExtendedReal {
		self.registers.get(FpuRegisterIndex::from_bits(idx))
	}

	pub fn status_word(&self) -> u16 {
		self.csrs.status_word(self.registers.top())
	}

	pub fn control_word(&self) -> u16 {
		self.csrs.control_word()
	}

	/// Executes one escape instruction (opcodes D8 to DF), the ModRM byte is fetched through the bus
	pub fn execute<B: FpuBus>(&mut self, bus: &mut B, opcode: u8) {
		let address_size = bus.address_size();
		let Ok(modrm) = bus.decode_modrm(address_size) else {
			// fault was raised while decoding the operand
			return;
		};

		let insn = match decode::parse(opcode, &modrm) {
			Ok(insn) => insn,
			Err(fault) => {
				debug!("{fault}");
				bus.raise_fault(fault);
				return;
			}
		};

		trace!("executing {insn:?}");
		self.execute_insn(bus, insn);
		self.dump();
	}

	fn execute_insn<B: FpuBus>(&mut self, bus: &mut B, insn: FpuInstruction) {
		match insn {
			FpuInstruction::Arith {
				kind,
				reversed,
				dst,
				src,
				pop,
			} => {
				require_st!(self, FpuRegisterIndex::ST0);
				require_st!(self, dst);

				let mut ctx = self.csrs.context();
				let Ok(operand) = self.fetch(bus, src, &mut ctx) else {
					return;
				};
				let current = self.registers.get(dst);
				let (lhs, rhs) = if reversed { (operand, current) } else { (current, operand) };

				let result = match kind {
					ArithKind::Add => Some(lhs.add(&rhs, &mut ctx)),
					ArithKind::Sub => Some(lhs.sub(&rhs, &mut ctx)),
					ArithKind::Mul => Some(lhs.mul(&rhs, &mut ctx)),
					// zero divide leaves the destination alone
					ArithKind::Div => lhs.div(&rhs, &mut ctx),
				};
				self.csrs.commit(&ctx);

				if let Some(result) = result {
					self.registers.set(dst, result);
				}
				if pop {
					self.registers.pop();
				}
			}
			FpuInstruction::Compare { src, pops, unordered } => {
				require_st!(self, FpuRegisterIndex::ST0);

				let mut ctx = self.csrs.context();
				let Ok(other) = self.fetch(bus, src, &mut ctx) else {
					return;
				};
				let ordering = self.registers.get(FpuRegisterIndex::ST0).compare(&other, &mut ctx);
				if ordering.is_none() && !unordered {
					ctx.raise(Exceptions::INVALID);
				}
				self.csrs.commit(&ctx);
				self.csrs.set_condition(ordering);

				for _ in 0..pops {
					self.registers.pop();
				}
			}
			FpuInstruction::Load(src) => {
				let mut ctx = self.csrs.context();
				let Ok(value) = self.fetch(bus, src, &mut ctx) else {
					return;
				};
				self.csrs.commit(&ctx);
				self.push(value);
			}
			FpuInstruction::LoadConstant(constant) => {
				self.push(constant.value(self.csrs.rounding_mode()));
			}
			FpuInstruction::Store { dst, pop } => {
				require_st!(self, FpuRegisterIndex::ST0);
				let value = self.registers.get(FpuRegisterIndex::ST0);

				match dst {
					Source::Register(idx) => self.registers.set(idx, value),
					Source::Memory(mem, format) => {
						let mut ctx = self.csrs.context();
						let Some((buf, len)) = Self::encode(&value, format, &mut ctx) else {
							// nothing gets written or popped after an invalid conversion
							self.csrs.commit(&ctx);
							return;
						};
						write_mem!(bus, mem, &buf[..len]);
						self.csrs.commit(&ctx);
					}
				}

				if pop {
					self.registers.pop();
				}
			}
			FpuInstruction::Exchange(idx) => {
				require_st!(self, FpuRegisterIndex::ST0);
				require_st!(self, idx);
				let top = self.registers.get(FpuRegisterIndex::ST0);
				let other = self.registers.get(idx);
				self.registers.set(FpuRegisterIndex::ST0, other);
				self.registers.set(idx, top);
				self.csrs.set_c1(false);
			}
			FpuInstruction::Free(idx) => self.registers.free(idx),
			FpuInstruction::ChangeSign => {
				require_st!(self, FpuRegisterIndex::ST0);
				let value = self.registers.get(FpuRegisterIndex::ST0);
				self.registers.set(FpuRegisterIndex::ST0, value.negate());
				self.csrs.set_c1(false);
			}
			FpuInstruction::Abs => {
				require_st!(self, FpuRegisterIndex::ST0);
				let value = self.registers.get(FpuRegisterIndex::ST0);
				self.registers.set(FpuRegisterIndex::ST0, value.abs());
				self.csrs.set_c1(false);
			}
			FpuInstruction::Test => {
				require_st!(self, FpuRegisterIndex::ST0);
				let mut ctx = self.csrs.context();
				let ordering = self
					.registers
					.get(FpuRegisterIndex::ST0)
					.compare(&ExtendedReal::ZERO, &mut ctx);
				if ordering.is_none() {
					ctx.raise(Exceptions::INVALID);
				}
				self.csrs.commit(&ctx);
				self.csrs.set_condition(ordering);
			}
			FpuInstruction::Examine => {
				let value = self.registers.get(FpuRegisterIndex::ST0);
				let class = if self.registers.is_empty(FpuRegisterIndex::ST0) {
					ExtendedClass::Empty
				} else {
					value.class()
				};
				let (c3, c2, c0) = class.condition_codes();
				self.csrs.set_codes(c3, c2, value.sign, c0);
			}
			FpuInstruction::RoundToIntegral => {
				require_st!(self, FpuRegisterIndex::ST0);
				let mut ctx = self.csrs.context();
				let value = self.registers.get(FpuRegisterIndex::ST0).round_to_integral(&mut ctx);
				self.csrs.commit(&ctx);
				self.registers.set(FpuRegisterIndex::ST0, value);
			}
			FpuInstruction::IncrementTop => {
				self.registers.increment_top();
				self.csrs.set_c1(false);
			}
			FpuInstruction::DecrementTop => {
				self.registers.decrement_top();
				self.csrs.set_c1(false);
			}
			FpuInstruction::Nop => {}

			FpuInstruction::LoadControlWord(mem) => {
				let word = read_mem!(bus, mem, 2);
				self.csrs.load_control(u16::from_le_bytes(word));
			}
			FpuInstruction::StoreControlWord(mem) => {
				write_mem!(bus, mem, &self.control_word().to_le_bytes());
			}
			FpuInstruction::StoreStatusWord(StatusDest::Memory(mem)) => {
				write_mem!(bus, mem, &self.status_word().to_le_bytes());
			}
			FpuInstruction::StoreStatusWord(StatusDest::Ax) => bus.write_ax(self.status_word()),
			FpuInstruction::LoadEnvironment(mem) => {
				let image = read_mem!(bus, mem, ENVIRONMENT_SIZE);
				self.load_environment(&image);
			}
			FpuInstruction::StoreEnvironment(mem) => {
				write_mem!(bus, mem, &self.environment());
				self.csrs.mask_all();
			}
			FpuInstruction::Restore(mem) => {
				let image = read_mem!(bus, mem, SAVE_SIZE);
				self.restore(&image);
			}
			FpuInstruction::Save(mem) => {
				write_mem!(bus, mem, &self.save());
				self.init();
			}
			FpuInstruction::ClearExceptions => self.csrs.clear_exceptions(),
			FpuInstruction::Init => self.init(),
		}
	}

	fn push(&mut self, value: ExtendedReal) {
		match self.registers.push(value) {
			Ok(()) => self.csrs.set_c1(false),
			Err(StackOverflow) => {
				debug!("register stack overflow");
				self.csrs.set_stack_fault(true);
			}
		}
	}

	fn stack_underflow(&mut self) {
		debug!("register stack underflow");
		self.csrs.set_stack_fault(false);
	}

	/// Reads an operand, converting memory formats to extended. On failure the fault has been
	/// raised through the bus.
	fn fetch<B: FpuBus>(&mut self, bus: &mut B, src: Source, ctx: &mut FpContext) -> Result<ExtendedReal, ()> {
		let (mem, format) = match src {
			Source::Register(idx) => {
				if self.registers.is_empty(idx) {
					self.stack_underflow();
					return Err(());
				}
				return Ok(self.registers.get(idx));
			}
			Source::Memory(mem, format) => (mem, format),
		};

		let mut buf = [0u8; 10];
		let bytes = &mut buf[..format.size()];
		if let Err(fault) = bus.read_memory(mem.segment, mem.address, bytes) {
			bus.raise_fault(fault);
			return Err(());
		}

		Ok(match format {
			MemFormat::Int16 => ExtendedReal::from_i64(i64::from(i16::from_le_bytes(le_array(bytes)))),
			MemFormat::Int32 => ExtendedReal::from_i64(i64::from(i32::from_le_bytes(le_array(bytes)))),
			MemFormat::Int64 => ExtendedReal::from_i64(i64::from_le_bytes(le_array(bytes))),
			MemFormat::Single => SoftFloat::from_le_bytes(le_array(bytes)).to_extended(ctx),
			MemFormat::Double => SoftDouble::from_le_bytes(le_array(bytes)).to_extended(ctx),
			MemFormat::Extended => ExtendedReal::from_le_bytes(le_array(bytes)),
		})
	}

	/// Converts ST(0) for a store. [None] when an integer conversion was invalid.
	fn encode(value: &ExtendedReal, format: MemFormat, ctx: &mut FpContext) -> Option<([u8; 10], usize)> {
		let mut buf = [0u8; 10];
		let len = format.size();
		match format {
			MemFormat::Int16 | MemFormat::Int32 | MemFormat::Int64 => {
				let int = value.to_i64(ctx)?;
				let fits = match format {
					MemFormat::Int16 => i16::try_from(int).is_ok(),
					MemFormat::Int32 => i32::try_from(int).is_ok(),
					_ => true,
				};
				if !fits {
					ctx.raise(Exceptions::INVALID);
					return None;
				}
				buf[..len].copy_from_slice(&int.to_le_bytes()[..len]);
			}
			MemFormat::Single => buf[..len].copy_from_slice(&SoftFloat::from_extended(value, ctx).to_le_bytes()),
			MemFormat::Double => buf[..len].copy_from_slice(&SoftDouble::from_extended(value, ctx).to_le_bytes()),
			MemFormat::Extended => buf = value.to_le_bytes(),
		}
		Some((buf, len))
	}

	/// The 28 byte environment: control, status and tag words each in a 32-bit slot, followed by
	/// instruction and operand pointers, which are not tracked and stored as zero
	pub fn environment(&self) -> [u8; ENVIRONMENT_SIZE] {
		let mut image = [0u8; ENVIRONMENT_SIZE];
		image[0..2].copy_from_slice(&self.control_word().to_le_bytes());
		image[4..6].copy_from_slice(&self.status_word().to_le_bytes());
		image[8..10].copy_from_slice(&self.registers.tag_word().to_le_bytes());
		image
	}

	pub fn load_environment(&mut self, image: &[u8; ENVIRONMENT_SIZE]) {
		let word = |offset: usize| u16::from_le_bytes([image[offset], image[offset + 1]]);
		self.csrs.load_control(word(0));
		let top = self.csrs.load_status(word(4));
		self.registers.set_top(top);
		self.registers.load_tag_word(word(8));
	}

	/// The environment followed by ST(0) to ST(7) in their 10 byte layout
	pub fn save(&self) -> [u8; SAVE_SIZE] {
		let mut image = [0u8; SAVE_SIZE];
		image[..ENVIRONMENT_SIZE].copy_from_slice(&self.environment());
		for idx in 0..8 {
			let offset = ENVIRONMENT_SIZE + usize::from(idx) * 10;
			image[offset..offset + 10].copy_from_slice(&self.st(idx).to_le_bytes());
		}
		image
	}

	pub fn restore(&mut self, image: &[u8; SAVE_SIZE]) {
		let environment: [u8; ENVIRONMENT_SIZE] = le_array(image);
		// the slots are addressed through the saved TOP, tags follow once they hold their values
		self.registers.set_top((u16::from_le_bytes([image[4], image[5]]) >> 11) as u8);
		for idx in 0..8 {
			let offset = ENVIRONMENT_SIZE + usize::from(idx) * 10;
			let value = ExtendedReal::from_le_bytes(le_array(&image[offset..]));
			self.registers.set(FpuRegisterIndex::from_bits(idx), value);
		}
		self.load_environment(&environment);
	}

	pub fn dump(&self) {
		trace!("{self}");
	}
}

impl Display for Fpu {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		writeln!(f, "FPU State:")?;
		writeln!(
			f,
			"    control: {:#06X}  status: {:#06X}  tags: {:#06X}  top: {}",
			self.control_word(),
			self.status_word(),
			self.registers.tag_word(),
			self.registers.top()
		)?;

		// host formatting only, the scratch context's flags are thrown away
		let mut ctx = FpContext::default();
		for idx in 0..8 {
			let st = FpuRegisterIndex::from_bits(idx);
			let slot = self.registers.physical(st);
			let (value, tag) = self.registers.physical_slot(slot);
			write!(
				f,
				"    ST({idx}) [{slot}] {:<7} {}{:#06X} {:#018X}",
				format!("{tag:?}"),
				if value.sign { '-' } else { '+' },
				value.exponent,
				value.mantissa
			)?;
			if tag != Tag::Empty {
				write!(f, "  ~{}", SoftDouble::from_extended(&value, &mut ctx).to_f64())?;
			}
			writeln!(f)?;
		}
		Ok(())
	}
}

fn le_array<const N: usize>(bytes: &[u8]) -> [u8; N] {
	let mut out = [0u8; N];
	out.copy_from_slice(&bytes[..N]);
	out
}

#[cfg(test)]
mod tests {
	use std::collections::VecDeque;

	use super::*;
	use crate::decode::tests::{memory, register};
	use crate::soft::extended::BIAS;

	/// Hands out prepared ModRM results and backs memory with one flat buffer
	#[derive(Default)]
	struct TestBus {
		modrms: VecDeque<ModRegRm>,
		memory: Vec<u8>,
		faults: Vec<FaultKind>,
		ax: u16,
	}

	impl TestBus {
		fn new() -> Self {
			Self {
				memory: vec![0; 0x2000],
				..Default::default()
			}
		}
	}

	impl FpuBus for TestBus {
		fn decode_modrm(&mut self, _address_size: bool) -> Result<ModRegRm, ()> {
			self.modrms.pop_front().ok_or(())
		}

		fn address_size(&self) -> bool {
			true
		}

		fn read_memory(&mut self, _segment: SegmentReg, address: u32, buf: &mut [u8]) -> Result<(), FaultKind> {
			let start = address as usize;
			let Some(bytes) = self.memory.get(start..start + buf.len()) else {
				return Err(FaultKind::PageFault { address, write: false });
			};
			buf.copy_from_slice(bytes);
			Ok(())
		}

		fn write_memory(&mut self, _segment: SegmentReg, address: u32, data: &[u8]) -> Result<(), FaultKind> {
			let start = address as usize;
			let Some(bytes) = self.memory.get_mut(start..start + data.len()) else {
				return Err(FaultKind::PageFault { address, write: true });
			};
			bytes.copy_from_slice(data);
			Ok(())
		}

		fn write_ax(&mut self, value: u16) {
			self.ax = value;
		}

		fn raise_fault(&mut self, fault: FaultKind) {
			self.faults.push(fault);
		}
	}

	fn run(fpu: &mut Fpu, bus: &mut TestBus, opcode: u8, modrm: ModRegRm) {
		bus.modrms.push_back(modrm);
		fpu.execute(bus, opcode);
	}

	fn fld1(fpu: &mut Fpu, bus: &mut TestBus) {
		run(fpu, bus, 0xD9, register(0xE8));
	}

	fn int(value: i64) -> ExtendedReal {
		ExtendedReal::from_i64(value)
	}

	#[test]
	fn constants_push_onto_the_stack() {
		let mut fpu = Fpu::new();
		let mut bus = TestBus::new();
		fld1(&mut fpu, &mut bus);
		run(&mut fpu, &mut bus, 0xD9, register(0xEE));
		assert_eq!(fpu.st(0), ExtendedReal::ZERO);
		assert_eq!(fpu.st(1), ExtendedReal::ONE);
		assert_eq!(fpu.registers.top(), 6);
		assert_eq!(fpu.status_word(), 0x3000);
		assert!(bus.faults.is_empty());
	}

	#[test]
	fn single_precision_memory_add() {
		let mut fpu = Fpu::new();
		let mut bus = TestBus::new();
		bus.memory[0x1000..0x1004].copy_from_slice(&1.5f32.to_le_bytes());

		fld1(&mut fpu, &mut bus);
		// FADD dword [0x1000]
		run(&mut fpu, &mut bus, 0xD8, memory(0));
		assert_eq!(fpu.st(0), ExtendedReal::new(false, BIAS as u16 + 1, 0xA000_0000_0000_0000));
		assert_eq!(fpu.status_word() & 0x3F, 0);
	}

	#[test]
	fn empty_operand_is_a_stack_underflow() {
		let mut fpu = Fpu::new();
		let mut bus = TestBus::new();
		fld1(&mut fpu, &mut bus);
		let before = fpu.registers.clone();

		// FADD ST(0), ST(3)
		run(&mut fpu, &mut bus, 0xD8, register(0xC3));
		assert_eq!(fpu.registers, before);
		// IE, SF, C1 clear for underflow
		assert_eq!(fpu.status_word() & 0x02FF, 0x0041);
	}

	#[test]
	fn ninth_load_overflows() {
		let mut fpu = Fpu::new();
		let mut bus = TestBus::new();
		for _ in 0..8 {
			fld1(&mut fpu, &mut bus);
		}
		assert_eq!(fpu.status_word() & 0x3F, 0);

		fld1(&mut fpu, &mut bus);
		assert_eq!(fpu.st(0), ExtendedReal::INDEFINITE);
		assert_eq!(fpu.status_word() & 0x0241, 0x0241);
	}

	#[test]
	fn division_by_zero_keeps_destination() {
		let mut fpu = Fpu::new();
		let mut bus = TestBus::new();
		fpu.registers.push(int(0)).unwrap();
		fpu.registers.push(int(7)).unwrap();

		// FDIV ST(0), ST(1)
		run(&mut fpu, &mut bus, 0xD8, register(0xF1));
		assert_eq!(fpu.st(0), int(7));
		assert_eq!(fpu.status_word() & 0x3F, 0x04);

		// FDIVRP ST(1), ST(0) computes 7 / 0 too, and still pops
		fpu.csrs.clear_exceptions();
		run(&mut fpu, &mut bus, 0xDE, register(0xF1));
		assert_eq!(fpu.status_word() & 0x3F, 0x04);
		assert_eq!(fpu.registers.top(), 7);
		assert_eq!(fpu.st(0), int(0));
	}

	#[test]
	fn integer_store_range_checks() {
		let mut fpu = Fpu::new();
		let mut bus = TestBus::new();
		fpu.registers.push(int(40_000)).unwrap();

		// FIST word [0x1000] does not fit 16 bits
		run(&mut fpu, &mut bus, 0xDF, memory(2));
		assert_eq!(&bus.memory[0x1000..0x1002], &[0, 0]);
		assert_eq!(fpu.status_word() & 0x3F, 0x01);

		// FISTP dword [0x1000] does
		run(&mut fpu, &mut bus, 0xDB, memory(3));
		assert_eq!(&bus.memory[0x1000..0x1004], &40_000i32.to_le_bytes());
		assert!(fpu.registers.is_empty(FpuRegisterIndex::ST0));
	}

	#[test]
	fn compare_sets_condition_codes() {
		let mut fpu = Fpu::new();
		let mut bus = TestBus::new();
		fpu.registers.push(int(2)).unwrap();
		fpu.registers.push(int(1)).unwrap();

		// FCOM ST(1): 1 < 2
		run(&mut fpu, &mut bus, 0xD8, register(0xD1));
		assert_eq!(fpu.status_word() & 0x4500, 0x0100);

		// FCOMPP pops both
		run(&mut fpu, &mut bus, 0xDE, register(0xD9));
		assert_eq!(fpu.registers.top(), 0);
		assert_eq!(fpu.registers.tag_word(), 0xFFFF);
	}

	#[test]
	fn nan_compares_unordered() {
		let mut fpu = Fpu::new();
		let mut bus = TestBus::new();
		fpu.registers.push(int(1)).unwrap();
		fpu.registers.push(ExtendedReal::INDEFINITE).unwrap();

		// FUCOM ST(1) tolerates the quiet NaN
		run(&mut fpu, &mut bus, 0xDD, register(0xE1));
		assert_eq!(fpu.status_word() & 0x4501, 0x4500);

		// FCOM ST(1) does not
		run(&mut fpu, &mut bus, 0xD8, register(0xD1));
		assert_eq!(fpu.status_word() & 0x4501, 0x4501);
	}

	#[test]
	fn examine_classifies() {
		let mut fpu = Fpu::new();
		let mut bus = TestBus::new();

		// empty
		run(&mut fpu, &mut bus, 0xD9, register(0xE5));
		assert_eq!(fpu.status_word() & 0x4700, 0x4100);

		fpu.registers.push(ExtendedReal::infinity(true)).unwrap();
		run(&mut fpu, &mut bus, 0xD9, register(0xE5));
		assert_eq!(fpu.status_word() & 0x4700, 0x0700);
		assert!(bus.faults.is_empty());
	}

	#[test]
	fn status_word_to_ax() {
		let mut fpu = Fpu::new();
		let mut bus = TestBus::new();
		fld1(&mut fpu, &mut bus);
		run(&mut fpu, &mut bus, 0xDF, register(0xE0));
		assert_eq!(bus.ax, 0x3800);
	}

	#[test]
	fn control_word_round_trip() {
		let mut fpu = Fpu::new();
		let mut bus = TestBus::new();
		bus.memory[0x1000..0x1002].copy_from_slice(&0x0C7Fu16.to_le_bytes());
		run(&mut fpu, &mut bus, 0xD9, memory(5));
		assert_eq!(fpu.control_word(), 0x0C7F);

		bus.memory[0x1000..0x1002].fill(0);
		run(&mut fpu, &mut bus, 0xD9, memory(7));
		assert_eq!(&bus.memory[0x1000..0x1002], &0x0C7Fu16.to_le_bytes());
	}

	#[test]
	fn environment_masks_exceptions_after_store() {
		let mut fpu = Fpu::new();
		let mut bus = TestBus::new();
		fpu.csrs.load_control(0x0360);
		fld1(&mut fpu, &mut bus);

		run(&mut fpu, &mut bus, 0xD9, memory(6));
		assert_eq!(&bus.memory[0x1000..0x1002], &0x0360u16.to_le_bytes());
		assert_eq!(&bus.memory[0x1004..0x1006], &0x3800u16.to_le_bytes());
		assert_eq!(&bus.memory[0x1008..0x100A], &0x3FFFu16.to_le_bytes());
		assert_eq!(fpu.control_word(), 0x037F);

		let mut other = Fpu::new();
		run(&mut other, &mut bus, 0xD9, memory(4));
		assert_eq!(other.control_word(), 0x0360);
		assert_eq!(other.registers.top(), 7);
		// the slot contents were never loaded, so the tag is derived from a zero
		assert_eq!(other.registers.tag(FpuRegisterIndex::ST0), Tag::Zero);
	}

	#[test]
	fn save_then_restore() {
		let mut fpu = Fpu::new();
		let mut bus = TestBus::new();
		fpu.registers.push(int(-12)).unwrap();
		fpu.registers.push(ExtendedReal::infinity(false)).unwrap();
		fpu.registers.push(int(99)).unwrap();
		fpu.csrs.load_control(0x0F7F);
		fpu.csrs.raise(Exceptions::PRECISION);
		let before = fpu.clone();

		run(&mut fpu, &mut bus, 0xDD, memory(6));
		assert_eq!(fpu.control_word(), 0x037F);
		assert_eq!(fpu.status_word(), 0);
		assert_eq!(fpu.registers.tag_word(), 0xFFFF);

		run(&mut fpu, &mut bus, 0xDD, memory(4));
		assert_eq!(fpu.status_word(), before.status_word());
		assert_eq!(fpu.control_word(), before.control_word());
		assert_eq!(fpu.registers.tag_word(), before.registers.tag_word());
		for idx in 0..3 {
			assert_eq!(fpu.st(idx), before.st(idx));
		}
	}

	#[test]
	fn test_against_zero_is_exact_under_double_precision() {
		let mut fpu = Fpu::new();
		let mut bus = TestBus::new();
		fpu.csrs.load_control(0x027F);
		fpu.registers.push(ExtendedReal::new(false, 0, 1)).unwrap();

		// FTST
		run(&mut fpu, &mut bus, 0xD9, register(0xE4));
		assert_eq!(fpu.status_word() & 0x4500, 0);
		assert_eq!(fpu.status_word() & 0x3F, 0x02);

		fpu.registers.set(FpuRegisterIndex::ST0, ExtendedReal::new(true, 0, 1));
		run(&mut fpu, &mut bus, 0xD9, register(0xE4));
		assert_eq!(fpu.status_word() & 0x4500, 0x0100);
	}

	#[test]
	fn exchange_needs_both_registers() {
		let mut fpu = Fpu::new();
		let mut bus = TestBus::new();
		fpu.registers.push(int(1)).unwrap();
		fpu.registers.push(int(2)).unwrap();
		fpu.csrs.set_c1(true);

		// FXCH ST(1)
		run(&mut fpu, &mut bus, 0xD9, register(0xC9));
		assert_eq!(fpu.st(0), int(1));
		assert_eq!(fpu.st(1), int(2));
		assert_eq!(fpu.status_word() & 0x0200, 0);

		// FXCH ST(3) is empty
		let before = fpu.registers.clone();
		run(&mut fpu, &mut bus, 0xD9, register(0xCB));
		assert_eq!(fpu.registers, before);
		assert_eq!(fpu.status_word() & 0x0241, 0x0041);
		assert!(bus.faults.is_empty());
	}

	#[test]
	fn free_and_stack_pointer_moves() {
		let mut fpu = Fpu::new();
		let mut bus = TestBus::new();
		fpu.registers.push(int(1)).unwrap();
		fpu.registers.push(int(2)).unwrap();

		// FFREE ST(1) only touches the tag
		run(&mut fpu, &mut bus, 0xDD, register(0xC1));
		assert!(fpu.registers.is_empty(FpuRegisterIndex::ST1));
		assert_eq!(fpu.registers.top(), 6);
		assert_eq!(fpu.st(0), int(2));
		let tags = fpu.registers.tag_word();
		assert_eq!(tags, 0xFFFF & !(0b11 << 12));

		// FINCSTP
		run(&mut fpu, &mut bus, 0xD9, register(0xF7));
		assert_eq!(fpu.registers.top(), 7);
		assert_eq!(fpu.registers.tag_word(), tags);
		assert!(fpu.registers.is_empty(FpuRegisterIndex::ST0));

		// FDECSTP twice wraps back past the freed slot
		run(&mut fpu, &mut bus, 0xD9, register(0xF6));
		run(&mut fpu, &mut bus, 0xD9, register(0xF6));
		assert_eq!(fpu.registers.top(), 5);
		assert_eq!(fpu.registers.tag_word(), tags);
		assert_eq!(fpu.st(1), int(2));
		assert_eq!(fpu.status_word() & 0x3F, 0);
	}

	#[test]
	fn absolute_value_and_rounding() {
		let mut fpu = Fpu::new();
		let mut bus = TestBus::new();
		fpu.registers.push(int(-3)).unwrap();
		fpu.csrs.set_c1(true);

		// FABS
		run(&mut fpu, &mut bus, 0xD9, register(0xE1));
		assert_eq!(fpu.st(0), int(3));
		assert_eq!(fpu.status_word() & 0x0200, 0);

		// FRNDINT on 2.5 rounds to even
		let two_and_a_half = ExtendedReal::new(false, BIAS as u16 + 1, 0xA000_0000_0000_0000);
		fpu.registers.set(FpuRegisterIndex::ST0, two_and_a_half);
		run(&mut fpu, &mut bus, 0xD9, register(0xFC));
		assert_eq!(fpu.st(0), int(2));
		assert_eq!(fpu.status_word() & 0x3F, 0x20);

		// and towards zero once RC says so
		fpu.csrs.load_control(0x0F7F);
		fpu.registers.set(FpuRegisterIndex::ST0, two_and_a_half.negate());
		run(&mut fpu, &mut bus, 0xD9, register(0xFC));
		assert_eq!(fpu.st(0), int(-2));

		// FRNDINT on an empty register
		fpu.registers.pop();
		run(&mut fpu, &mut bus, 0xD9, register(0xFC));
		assert_eq!(fpu.status_word() & 0x0041, 0x0041);
		assert!(fpu.registers.is_empty(FpuRegisterIndex::ST0));
	}

	#[test]
	fn register_stores() {
		let mut fpu = Fpu::new();
		let mut bus = TestBus::new();
		for value in [1, 2, 3] {
			fpu.registers.push(int(value)).unwrap();
		}

		// FST ST(2)
		run(&mut fpu, &mut bus, 0xDD, register(0xD2));
		assert_eq!(fpu.registers.top(), 5);
		assert_eq!(fpu.st(2), int(3));

		// FSTP ST(1)
		run(&mut fpu, &mut bus, 0xDD, register(0xD9));
		assert_eq!(fpu.registers.top(), 6);
		assert_eq!(fpu.st(0), int(3));
		assert_eq!(fpu.st(1), int(3));
		assert_eq!(fpu.registers.tag(FpuRegisterIndex::from_bits(7)), Tag::Empty);

		// FST ST(4) fills an empty register
		run(&mut fpu, &mut bus, 0xDD, register(0xD4));
		assert_eq!(fpu.registers.tag(FpuRegisterIndex::from_bits(4)), Tag::Valid);
		assert_eq!(fpu.st(4), int(3));
		assert_eq!(fpu.status_word() & 0x3F, 0);
		assert!(bus.faults.is_empty());
	}

	#[test]
	fn memory_fault_aborts_without_mutation() {
		let mut fpu = Fpu::new();
		let mut bus = TestBus::new();
		fld1(&mut fpu, &mut bus);
		let before = fpu.clone();

		let mut modrm = memory(0);
		modrm.operand = crate::ty::RmOperand::Memory {
			segment: SegmentReg::DS,
			address: 0x10_0000,
		};
		// FLD qword [0x100000]
		run(&mut fpu, &mut bus, 0xDD, modrm);
		assert_eq!(fpu, before);
		assert_eq!(
			bus.faults,
			vec![FaultKind::PageFault {
				address: 0x10_0000,
				write: false
			}]
		);
	}

	#[test]
	fn unsupported_and_undefined_encodings_fault() {
		let mut fpu = Fpu::new();
		let mut bus = TestBus::new();
		run(&mut fpu, &mut bus, 0xD9, register(0xFE));
		run(&mut fpu, &mut bus, 0xDD, memory(5));
		assert_eq!(
			bus.faults,
			vec![
				FaultKind::UndefinedOpcode {
					opcode: 0xD9,
					modrm: 0xFE
				},
				FaultKind::UndefinedOpcode {
					opcode: 0xDD,
					modrm: 0x2D
				},
			]
		);
		assert_eq!(fpu, Fpu::new());
	}
}
