use super::{memory_operand, undefined};
use crate::insn::{FpuInstruction, MemFormat, Source};
use crate::ty::{FaultKind, ModRegRm};

pub fn parse_db(modrm: &ModRegRm) -> Result<FpuInstruction, FaultKind> {
	use super::consts::opcode::ESC_DB;
	use consts::*;

	let Some(mem) = memory_operand(modrm) else {
		return match modrm.raw {
			register::FENI | register::FDISI | register::FSETPM => Ok(FpuInstruction::Nop),
			register::FCLEX => Ok(FpuInstruction::ClearExceptions),
			register::FINIT => Ok(FpuInstruction::Init),
			_ => Err(undefined(ESC_DB, modrm)),
		};
	};

	match modrm.register {
		FILD => Ok(FpuInstruction::Load(Source::Memory(mem, MemFormat::Int32))),
		FIST | FISTP => Ok(FpuInstruction::Store {
			dst: Source::Memory(mem, MemFormat::Int32),
			pop: modrm.register == FISTP,
		}),
		FLD_EXTENDED => Ok(FpuInstruction::Load(Source::Memory(mem, MemFormat::Extended))),
		FSTP_EXTENDED => Ok(FpuInstruction::Store {
			dst: Source::Memory(mem, MemFormat::Extended),
			pop: true,
		}),
		_ => Err(undefined(ESC_DB, modrm)),
	}
}

pub mod consts {
	pub const FILD: u8 = 0;
	pub const FIST: u8 = 2;
	pub const FISTP: u8 = 3;
	pub const FLD_EXTENDED: u8 = 5;
	pub const FSTP_EXTENDED: u8 = 7;

	pub mod register {
		pub const FENI: u8 = 0xE0;
		pub const FDISI: u8 = 0xE1;
		pub const FCLEX: u8 = 0xE2;
		pub const FINIT: u8 = 0xE3;
		pub const FSETPM: u8 = 0xE4;
	}
}
