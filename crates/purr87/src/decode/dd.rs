use super::undefined;
use crate::insn::{FpuInstruction, MemFormat, MemRef, Source, StatusDest};
use crate::ty::{FaultKind, FpuRegisterIndex, ModRegRm, RmOperand};

pub fn parse_dd(modrm: &ModRegRm) -> Result<FpuInstruction, FaultKind> {
	use super::consts::opcode::ESC_DD;
	use consts::*;

	let mem = match modrm.operand {
		RmOperand::Memory { segment, address } => MemRef { segment, address },
		RmOperand::Register(idx) => return parse_dd_register(modrm, idx),
	};

	match modrm.register {
		FLD => Ok(FpuInstruction::Load(Source::Memory(mem, MemFormat::Double))),
		FST | FSTP => Ok(FpuInstruction::Store {
			dst: Source::Memory(mem, MemFormat::Double),
			pop: modrm.register == FSTP,
		}),
		FRSTOR => Ok(FpuInstruction::Restore(mem)),
		FNSAVE => Ok(FpuInstruction::Save(mem)),
		FNSTSW => Ok(FpuInstruction::StoreStatusWord(StatusDest::Memory(mem))),
		// /1 is FISTTP, which only exists with SSE3
		_ => Err(undefined(ESC_DD, modrm)),
	}
}

fn parse_dd_register(modrm: &ModRegRm, idx: FpuRegisterIndex) -> Result<FpuInstruction, FaultKind> {
	use super::consts::opcode::ESC_DD;
	use consts::register::*;

	match modrm.register {
		FFREE => Ok(FpuInstruction::Free(idx)),
		FST | FSTP => Ok(FpuInstruction::Store {
			dst: Source::Register(idx),
			pop: modrm.register == FSTP,
		}),
		FUCOM | FUCOMP => Ok(FpuInstruction::Compare {
			src: Source::Register(idx),
			pops: u8::from(modrm.register == FUCOMP),
			unordered: true,
		}),
		_ => Err(undefined(ESC_DD, modrm)),
	}
}

pub mod consts {
	pub const FLD: u8 = 0;
	pub const FST: u8 = 2;
	pub const FSTP: u8 = 3;
	pub const FRSTOR: u8 = 4;
	pub const FNSAVE: u8 = 6;
	pub const FNSTSW: u8 = 7;

	pub mod register {
		/// reg field values
		pub const FFREE: u8 = 0;
		pub const FST: u8 = 2;
		pub const FSTP: u8 = 3;
		pub const FUCOM: u8 = 4;
		pub const FUCOMP: u8 = 5;
	}
}
