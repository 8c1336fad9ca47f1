use std::fmt::{self, Display};

use tracing::*;

use crate::fpu::{Fpu, FpuBus};
use crate::mem::{Memory, MemoryBuilder, PageBase};
use crate::ty::{FaultKind, FpuRegisterIndex, GPRegisterIndex, ModRegRm, RmOperand, SegmentReg};
use crate::util::extract_bits_8;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GPRegisters {
	regs: [u32; 8],
}

impl GPRegisters {
	pub fn regs(&self) -> &[u32; 8] {
		&self.regs
	}

	pub fn get(&self, index: GPRegisterIndex) -> u32 {
		self.regs[index.as_usize()]
	}

	pub fn set(&mut self, index: GPRegisterIndex, value: u32) {
		self.regs[index.as_usize()] = value;
	}
}

/// The integer side of the machine: everything an FPU instruction reaches through [FpuBus]
#[derive(Debug)]
pub struct Cpu {
	pub mem: Memory,
	pub registers: GPRegisters,

	pub ip: u32,
	/// the first address past the program
	pub code_end: u32,
	/// the first fault raised by the current instruction
	pub fault: Option<FaultKind>,

	// per instruction prefix state
	segment_override: Option<SegmentReg>,
	address_size_override: bool,
}

pub struct Machine {
	pub fpu: Fpu,
	pub cpu: Cpu,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
	Stepped,
	Halted,
}

impl Machine {
	pub const CODE_BASE: u32 = 0x0040_0000;
	pub const DEFAULT_DATA_BASE: u32 = 0x0010_0000;
	pub const STACK_BASE: u32 = 0x7FFF_0000;
	pub const STACK_SIZE: usize = 0x1_0000;

	/// Maps the program read only at [Machine::CODE_BASE], the data image writable at `data_base`
	/// and a small stack, with ESP pointing at the top of it
	pub fn new(program: Vec<u8>, data: Vec<u8>, data_base: u32) -> Result<Self, PageBase> {
		let code_end = Self::CODE_BASE + program.len() as u32;
		let mem = MemoryBuilder::default()
			.rom(program, PageBase::from_addr(Self::CODE_BASE))
			.data(data, PageBase::from_addr(data_base))
			.ram(PageBase::from_addr(Self::STACK_BASE), Self::STACK_SIZE)
			.build()?;

		let mut cpu = Cpu {
			mem,
			registers: GPRegisters::default(),
			ip: Self::CODE_BASE,
			code_end,
			fault: None,
			segment_override: None,
			address_size_override: false,
		};
		cpu.registers
			.set(GPRegisterIndex::ESP, Self::STACK_BASE + Self::STACK_SIZE as u32 - 4);

		Ok(Self { fpu: Fpu::new(), cpu })
	}

	/// Runs until the program ends or halts. Stops at the first fault.
	pub fn run(&mut self) -> Result<(), FaultKind> {
		while self.cpu.ip < self.cpu.code_end {
			if self.step()? == StepStatus::Halted {
				break;
			}
		}
		Ok(())
	}

	pub fn step(&mut self) -> Result<StepStatus, FaultKind> {
		let start_ip = self.cpu.ip;
		self.cpu.fault = None;
		self.cpu.segment_override = None;
		self.cpu.address_size_override = false;

		let opcode = loop {
			let byte = match self.cpu.fetch_u8() {
				Ok(byte) => byte,
				Err(fault) => {
					self.cpu.raise_fault(fault);
					self.cpu.ip = start_ip;
					return Err(fault);
				}
			};
			match byte {
				0x26 => self.cpu.segment_override = Some(SegmentReg::ES),
				0x2E => self.cpu.segment_override = Some(SegmentReg::CS),
				0x36 => self.cpu.segment_override = Some(SegmentReg::SS),
				0x3E => self.cpu.segment_override = Some(SegmentReg::DS),
				0x64 => self.cpu.segment_override = Some(SegmentReg::FS),
				0x65 => self.cpu.segment_override = Some(SegmentReg::GS),
				0x67 => self.cpu.address_size_override = true,
				_ => break byte,
			}
		};

		match opcode {
			0xD8..=0xDF => self.fpu.execute(&mut self.cpu, opcode),
			consts::FWAIT | consts::NOP => trace!("{start_ip:#010X}: wait"),
			consts::HLT => {
				trace!("{start_ip:#010X}: halt");
				return Ok(StepStatus::Halted);
			}
			_ => {
				let fault = FaultKind::UndefinedOpcode { opcode, modrm: 0 };
				self.cpu.raise_fault(fault);
			}
		}

		match self.cpu.fault {
			Some(fault) => {
				// the faulting instruction is retried from the start
				self.cpu.ip = start_ip;
				Err(fault)
			}
			None => Ok(StepStatus::Stepped),
		}
	}
}

impl Display for Machine {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.fpu)?;
		writeln!(f, "CPU State:")?;
		writeln!(f, "    ip: {:#010X}", self.cpu.ip)?;
		for idx in 0..8 {
			let reg = GPRegisterIndex::from_bits(idx);
			writeln!(f, "    {reg:?}: {:#010X}", self.cpu.registers.get(reg))?;
		}
		Ok(())
	}
}

impl Cpu {
	fn fetch_u8(&mut self) -> Result<u8, FaultKind> {
		let byte = self
			.mem
			.read_u8(self.ip)
			.map_err(|address| FaultKind::PageFault { address, write: false })?;
		self.ip = self.ip.wrapping_add(1);
		Ok(byte)
	}

	fn fetch<const N: usize>(&mut self) -> Result<[u8; N], FaultKind> {
		let mut buf = [0u8; N];
		for byte in buf.iter_mut() {
			*byte = self.fetch_u8()?;
		}
		Ok(buf)
	}

	fn decode_modrm_32(&mut self, raw: u8) -> Result<ModRegRm, FaultKind> {
		let (mode, register, rm) = split_modrm(raw);
		if mode == 0b11 {
			return Ok(ModRegRm {
				raw,
				register,
				operand: RmOperand::Register(FpuRegisterIndex::from_bits(rm)),
			});
		}

		let mut segment = SegmentReg::DS;
		let mut address = 0u32;

		if rm == 0b100 {
			let (scale, index, base) = split_modrm(self.fetch_u8()?);
			if index != 0b100 {
				let index = self.registers.get(GPRegisterIndex::from_bits(index));
				address = address.wrapping_add(index << scale);
			}
			if base == 0b101 && mode == 0b00 {
				address = address.wrapping_add(u32::from_le_bytes(self.fetch()?));
			} else {
				let base = GPRegisterIndex::from_bits(base);
				if base == GPRegisterIndex::ESP || base == GPRegisterIndex::EBP {
					segment = SegmentReg::SS;
				}
				address = address.wrapping_add(self.registers.get(base));
			}
		} else if rm == 0b101 && mode == 0b00 {
			address = u32::from_le_bytes(self.fetch()?);
		} else {
			let base = GPRegisterIndex::from_bits(rm);
			if base == GPRegisterIndex::EBP {
				segment = SegmentReg::SS;
			}
			address = self.registers.get(base);
		}

		let displacement = match mode {
			0b01 => i8::from_le_bytes(self.fetch()?) as u32,
			0b10 => u32::from_le_bytes(self.fetch()?),
			_ => 0,
		};

		Ok(ModRegRm {
			raw,
			register,
			operand: RmOperand::Memory {
				segment: self.segment_override.unwrap_or(segment),
				address: address.wrapping_add(displacement),
			},
		})
	}

	fn decode_modrm_16(&mut self, raw: u8) -> Result<ModRegRm, FaultKind> {
		let (mode, register, rm) = split_modrm(raw);
		if mode == 0b11 {
			return Ok(ModRegRm {
				raw,
				register,
				operand: RmOperand::Register(FpuRegisterIndex::from_bits(rm)),
			});
		}

		let reg = |idx: GPRegisterIndex| self.registers.get(idx) as u16;
		let (bx, bp, si, di) = (
			reg(GPRegisterIndex::EBX),
			reg(GPRegisterIndex::EBP),
			reg(GPRegisterIndex::ESI),
			reg(GPRegisterIndex::EDI),
		);
		let (segment, base) = match rm {
			0b000 => (SegmentReg::DS, bx.wrapping_add(si)),
			0b001 => (SegmentReg::DS, bx.wrapping_add(di)),
			0b010 => (SegmentReg::SS, bp.wrapping_add(si)),
			0b011 => (SegmentReg::SS, bp.wrapping_add(di)),
			0b100 => (SegmentReg::DS, si),
			0b101 => (SegmentReg::DS, di),
			0b110 if mode == 0b00 => (SegmentReg::DS, u16::from_le_bytes(self.fetch()?)),
			0b110 => (SegmentReg::SS, bp),
			_ => (SegmentReg::DS, bx),
		};

		let displacement = match mode {
			0b01 => i8::from_le_bytes(self.fetch()?) as u16,
			0b10 => u16::from_le_bytes(self.fetch()?),
			_ => 0,
		};

		Ok(ModRegRm {
			raw,
			register,
			operand: RmOperand::Memory {
				segment: self.segment_override.unwrap_or(segment),
				address: u32::from(base.wrapping_add(displacement)),
			},
		})
	}

	/// Segments are flat. Accesses wrapping past 4 GiB are a general protection fault.
	fn check_limit(segment: SegmentReg, address: u32, len: usize) -> Result<(), FaultKind> {
		let end = u64::from(address) + len as u64;
		if end > 1 << 32 {
			debug!("{segment:?}:{address:#010X} crosses the end of the address space");
			return Err(FaultKind::GeneralProtection { address });
		}
		Ok(())
	}
}

impl FpuBus for Cpu {
	fn decode_modrm(&mut self, address_size: bool) -> Result<ModRegRm, ()> {
		let decoded = self.fetch_u8().and_then(|raw| {
			if address_size {
				self.decode_modrm_32(raw)
			} else {
				self.decode_modrm_16(raw)
			}
		});
		decoded.map_err(|fault| self.raise_fault(fault))
	}

	fn address_size(&self) -> bool {
		// the machine runs 32-bit code, 0x67 switches to 16-bit addressing
		!self.address_size_override
	}

	fn read_memory(&mut self, segment: SegmentReg, address: u32, buf: &mut [u8]) -> Result<(), FaultKind> {
		Self::check_limit(segment, address, buf.len())?;
		self.mem
			.read_slice(address, buf)
			.map_err(|address| FaultKind::PageFault { address, write: false })
	}

	fn write_memory(&mut self, segment: SegmentReg, address: u32, data: &[u8]) -> Result<(), FaultKind> {
		Self::check_limit(segment, address, data.len())?;
		self.mem
			.write_slice(address, data)
			.map_err(|address| FaultKind::PageFault { address, write: true })
	}

	fn write_ax(&mut self, value: u16) {
		let eax = self.registers.get(GPRegisterIndex::EAX);
		self.registers
			.set(GPRegisterIndex::EAX, (eax & 0xFFFF_0000) | u32::from(value));
	}

	fn raise_fault(&mut self, fault: FaultKind) {
		debug!("fault at {:#010X}: {fault}", self.ip);
		if self.fault.is_none() {
			self.fault = Some(fault);
		}
	}
}

/// (mod, reg, rm), also (scale, index, base) for a SIB byte
fn split_modrm(byte: u8) -> (u8, u8, u8) {
	(
		extract_bits_8(byte, 6, 7),
		extract_bits_8(byte, 3, 5),
		extract_bits_8(byte, 0, 2),
	)
}

pub mod consts {
	pub const NOP: u8 = 0x90;
	pub const FWAIT: u8 = 0x9B;
	pub const HLT: u8 = 0xF4;
}
