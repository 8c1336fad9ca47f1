pub mod csr;
pub mod decode;
pub mod fpu;
pub mod insn;
pub mod machine;
pub mod mem;
pub mod regs;
pub mod soft;
pub mod ty;
pub mod util;

pub use fpu::{Fpu, FpuBus};
pub use machine::Machine;
