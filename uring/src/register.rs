// Registration of auxiliary resources: fixed buffers, fixed files,
// eventfd notification, personalities and the opcode-support probe. All
// of these are thin synchronous wrappers over io_uring_register(2).

use std::mem;
use std::os::unix::io::RawFd;

use uring_sys::{
	FilesUpdate,
	Operation,
	ProbeHeader,
	ProbeOp,
	RegisterOpCode,
};

use crate::error::{Error, Result};
use crate::ring::Ring;

/// number of probe op slots queried from the kernel
pub const PROBE_OPS: usize = 256;

/// Caller-owned opcode-support table filled by
/// [`Ring::register_probe`]: the kernel's last supported opcode plus a
/// supported bit per opcode.
#[repr(C)]
pub struct Probe {
	header: ProbeHeader,
	ops: [ProbeOp; PROBE_OPS],
}

impl Probe {
	pub fn new() -> Self {
		unsafe { mem::zeroed() }
	}

	/// highest opcode number the running kernel knows about
	pub fn last_op(&self) -> u8 {
		self.header.last_op
	}

	pub fn is_supported(&self, op: Operation) -> bool {
		let ndx = op as u8;
		if ndx > self.header.last_op {
			return false;
		}
		(self.ops[ndx as usize].flags & ProbeOp::SUPPORTED) != 0
	}
}

impl Default for Probe {
	fn default() -> Self {
		Self::new()
	}
}

impl Ring {
	/// Register fixed buffers for `Operation::ReadFixed` /
	/// `Operation::WriteFixed`. Only one buffer set can be registered at
	/// a time; unregister before registering the next.
	///
	/// unsafe because the iovecs carry raw pointers: the memory must stay
	/// valid until the buffers are unregistered or the ring is closed.
	pub unsafe fn register_buffers(&self, buffers: &[libc::iovec]) -> Result<()> {
		if buffers.is_empty() {
			return Err(Error::KernelError(libc::EINVAL));
		}
		self.file()?
			.register(RegisterOpCode::REGISTER_BUFFERS, buffers.as_ptr() as *const _, buffers.len() as u32)
			.map(drop)
	}

	/// fails if there are currently no buffers registered.
	pub fn unregister_buffers(&self) -> Result<()> {
		unsafe {
			self.file()?
				.register(RegisterOpCode::UNREGISTER_BUFFERS, 0 as *const _, 0)
				.map(drop)
		}
	}

	/// Register a fixed fileset, usable via `FileDescriptor::Fixed`.
	/// Slots holding -1 are sparse and can be filled later with
	/// [`register_files_update`](Self::register_files_update). An empty
	/// set is rejected locally.
	pub fn register_files(&self, fds: &[RawFd]) -> Result<()> {
		if fds.is_empty() {
			return Err(Error::KernelError(libc::EINVAL));
		}
		unsafe {
			self.file()?
				.register(RegisterOpCode::REGISTER_FILES, fds.as_ptr() as *const _, fds.len() as u32)
				.map(drop)
		}
	}

	/// fails if there is currently no fd set registered.
	pub fn unregister_files(&self) -> Result<()> {
		unsafe {
			self.file()?
				.register(RegisterOpCode::UNREGISTER_FILES, 0 as *const _, 0)
				.map(drop)
		}
	}

	/// Replace slots of the registered fileset starting at `offset`; -1
	/// empties a slot. Returns the number of slots updated.
	pub fn register_files_update(&self, offset: u32, fds: &[RawFd]) -> Result<u32> {
		if fds.is_empty() {
			return Err(Error::KernelError(libc::EINVAL));
		}
		let update = FilesUpdate::new(offset, fds.as_ptr());
		unsafe {
			self.file()?
				.register(RegisterOpCode::REGISTER_FILES_UPDATE, &update as *const _ as *const _, fds.len() as u32)
		}
	}

	/// Get completion notifications on `eventfd` whenever the kernel
	/// posts to the completion ring.
	pub fn register_eventfd(&self, eventfd: RawFd) -> Result<()> {
		unsafe {
			self.file()?
				.register(RegisterOpCode::REGISTER_EVENTFD, &eventfd as *const _ as *const _, 1)
				.map(drop)
		}
	}

	/// As [`register_eventfd`](Self::register_eventfd), but completions
	/// that finished inline during submit post no notification.
	pub fn register_eventfd_async(&self, eventfd: RawFd) -> Result<()> {
		unsafe {
			self.file()?
				.register(RegisterOpCode::REGISTER_EVENTFD_ASYNC, &eventfd as *const _ as *const _, 1)
				.map(drop)
		}
	}

	pub fn unregister_eventfd(&self) -> Result<()> {
		unsafe {
			self.file()?
				.register(RegisterOpCode::UNREGISTER_EVENTFD, 0 as *const _, 0)
				.map(drop)
		}
	}

	/// Fill `probe` with the opcodes the running kernel supports.
	pub fn register_probe(&self, probe: &mut Probe) -> Result<()> {
		unsafe {
			self.file()?
				.register(RegisterOpCode::REGISTER_PROBE, probe as *mut Probe as *const _, PROBE_OPS as u32)
				.map(drop)
		}
	}

	/// Convenience wrapper allocating the probe table on the stack.
	pub fn probe(&self) -> Result<Probe> {
		let mut probe = Probe::new();
		self.register_probe(&mut probe)?;
		Ok(probe)
	}

	/// Snapshot the current task's credentials; the returned id can be
	/// placed in an entry's personality slot.
	pub fn register_personality(&self) -> Result<u16> {
		let id = unsafe {
			self.file()?
				.register(RegisterOpCode::REGISTER_PERSONALITY, 0 as *const _, 0)?
		};
		Ok(id as u16)
	}

	pub fn unregister_personality(&self, personality: u16) -> Result<()> {
		unsafe {
			self.file()?
				.register(RegisterOpCode::UNREGISTER_PERSONALITY, 0 as *const _, personality as u32)
				.map(drop)
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn probe_with(last_op: u8, supported: &[u8]) -> Probe {
		let mut probe = Probe::new();
		probe.header.last_op = last_op;
		for &op in supported {
			probe.ops[op as usize].op = op;
			probe.ops[op as usize].flags = ProbeOp::SUPPORTED;
		}
		probe
	}

	#[test]
	fn probe_lookup() {
		let probe = probe_with(Operation::Timeout as u8, &[0, 1, 2, 11]);
		assert!(probe.is_supported(Operation::Nop));
		assert!(probe.is_supported(Operation::Timeout));
		assert!(!probe.is_supported(Operation::Fsync));
		// past last_op is never supported, whatever the table says
		assert!(!probe.is_supported(Operation::MsgRing));
	}
}
