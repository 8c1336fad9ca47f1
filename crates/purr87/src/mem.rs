use std::collections::HashMap;
use std::fmt::Debug;

use tracing::*;

use crate::soft::double::SoftDouble;
use crate::soft::float::SoftFloat;

pub struct Memory {
	phys: Box<[u8]>,
	rom: Box<[u8]>,
	mappings: HashMap<PageBase, PageEntry>,
}

impl Debug for Memory {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Memory")
			.field("phys_size", &self.phys.len())
			.field("rom_size", &self.rom.len())
			.finish_non_exhaustive()
	}
}

impl Memory {
	/// the reading primitive that does page lookups and such
	/// returns Ok if the read succeeded, or Err(addr) if the read failed
	/// where addr is the first address that isn't mapped
	pub fn read_slice(&self, offset: u32, buf: &mut [u8]) -> Result<(), u32> {
		for (idx, val) in buf.iter_mut().enumerate() {
			let Some(offset) = offset.checked_add(idx as u32) else {
				return Err(offset);
			};
			let base = PageBase::from_addr(offset);
			let Some(page_entry) = self.mappings.get(&base) else {
				trace!("no page entry for {:#010X}", offset);
				return Err(offset);
			};
			let page_offset = (offset - base.0) as usize;

			*val = match page_entry {
				PageEntry::PhysBacked { phys_base } => self.phys[phys_base + page_offset],
				PageEntry::ReadOnly { rom_base } => self.rom[rom_base + page_offset],
			};
		}
		Ok(())
	}

	/// the writing primitive, same contract as [Memory::read_slice].
	/// Nothing is written unless every byte of the range is writable.
	pub fn write_slice(&mut self, offset: u32, val: &[u8]) -> Result<(), u32> {
		let mut targets = Vec::with_capacity(val.len());
		for idx in 0..val.len() {
			let Some(offset) = offset.checked_add(idx as u32) else {
				return Err(offset);
			};
			let base = PageBase::from_addr(offset);
			match self.mappings.get(&base) {
				Some(PageEntry::PhysBacked { phys_base }) => targets.push(phys_base + (offset - base.0) as usize),
				Some(PageEntry::ReadOnly { .. }) => {
					trace!("write to read only page @ {:#010X}", offset);
					return Err(offset);
				}
				None => {
					trace!("no page entry for {:#010X}", offset);
					return Err(offset);
				}
			}
		}

		for (phys_addr, val) in targets.into_iter().zip(val) {
			self.phys[phys_addr] = *val;
		}
		Ok(())
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageEntry {
	PhysBacked { phys_base: usize },
	/// program image, writes fault
	ReadOnly { rom_base: usize },
}

fn align_to_page(addr: usize) -> usize {
	(addr + (PAGE_SIZE as usize - 1)) & !(PAGE_SIZE as usize - 1)
}

pub const PAGE_SIZE: u32 = 4096;

#[derive(Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
/// INVARIANT: is a multiple of PAGE_SIZE
pub struct PageBase(u32);

impl PageBase {
	pub fn from_addr(addr: u32) -> Self {
		Self(addr & !(PAGE_SIZE - 1))
	}

	pub fn addr(self) -> u32 {
		self.0
	}
}

impl Debug for PageBase {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_tuple("PageBase")
			.field(&format_args!("{:#010X}", self.0))
			.finish()
	}
}

macro_rules! impl_mem_rw {
	($($ty:ty),*) => {
		#[allow(unused)]
		impl Memory {
			$(paste::paste!{
				pub fn [<read_ $ty:snake>](&self, offset: u32) -> Result<$ty, u32> {
					let mut buf = <$ty>::to_le_bytes(<$ty>::default());
					self.read_slice(offset, &mut buf)?;
					Ok(<$ty>::from_le_bytes(buf))
				}

				pub fn [<write_ $ty:snake>](&mut self, offset: u32, val: $ty) -> Result<(), u32> {
					self.write_slice(offset, <$ty>::to_le_bytes(val).as_slice())?;
					Ok(())
				}
			})*
		}
	};
}

impl_mem_rw!(u8, u16, u32, u64, SoftFloat, SoftDouble);

#[derive(Default)]
pub struct MemoryBuilder {
	// virtual base -> size in bytes, backed by zeroed memory
	ram: Vec<(PageBase, usize)>,
	// virtual base -> contents, each padded to a page
	rom: Vec<(PageBase, Vec<u8>)>,
	// writable regions with initial contents
	data: Vec<(PageBase, Vec<u8>)>,
}

impl MemoryBuilder {
	/// Maps `image` read only at `addr`
	pub fn rom(mut self, image: Vec<u8>, addr: PageBase) -> Self {
		self.rom.push((addr, image));
		self
	}

	/// Maps `size` bytes of zeroed memory at `addr`
	pub fn ram(mut self, addr: PageBase, size: usize) -> Self {
		self.ram.push((addr, size));
		self
	}

	/// Maps a writable region starting out with `contents`
	pub fn data(mut self, contents: Vec<u8>, addr: PageBase) -> Self {
		self.data.push((addr, contents));
		self
	}

	/// Errors with the first page mapped twice
	pub fn build(self) -> Result<Memory, PageBase> {
		let mut mappings = HashMap::new();
		let mut phys = Vec::new();
		let mut rom = Vec::new();

		let mut map = |virt: PageBase, len: usize, entry: &dyn Fn(usize) -> PageEntry| {
			for offset in (0..align_to_page(len)).step_by(PAGE_SIZE as usize) {
				let Some(addr) = u32::try_from(offset).ok().and_then(|offset| virt.0.checked_add(offset)) else {
					// clipped at the end of the address space
					break;
				};
				// INVARIANT: the base is page aligned and the loop only adds whole pages
				let page = PageBase(addr);
				if mappings.insert(page, entry(offset)).is_some() {
					return Err(page);
				}
			}
			Ok(())
		};

		for (virt, mut image) in self.rom {
			let rom_base = rom.len();
			image.resize(align_to_page(image.len()), 0);
			map(virt, image.len(), &|offset| PageEntry::ReadOnly {
				rom_base: rom_base + offset,
			})?;
			rom.extend(image);
		}

		let regions = self
			.ram
			.into_iter()
			.map(|(virt, size)| (virt, vec![0; size]))
			.chain(self.data);
		for (virt, mut contents) in regions {
			let phys_base = phys.len();
			contents.resize(align_to_page(contents.len()), 0);
			map(virt, contents.len(), &|offset| PageEntry::PhysBacked {
				phys_base: phys_base + offset,
			})?;
			phys.extend(contents);
		}

		debug!(
			"built memory with {} pages ({:#X} bytes ram, {:#X} bytes rom)",
			mappings.len(),
			phys.len(),
			rom.len()
		);

		Ok(Memory {
			phys: phys.into_boxed_slice(),
			rom: rom.into_boxed_slice(),
			mappings,
		})
	}
}
