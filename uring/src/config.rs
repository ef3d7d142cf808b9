use std::os::unix::io::RawFd;

use uring_sys::{
	SetupFlags,
	SetupParameters,
};

/// Setup options for a [`Ring`](crate::Ring).
///
/// Collects `io_uring_setup(2)` flags and their companion scalar fields;
/// [`Ring::with_config`](crate::Ring::with_config) turns it into the kernel
/// parameter block.
#[derive(Clone, Debug, Default)]
pub struct Config {
	flags: SetupFlags,
	sq_thread_cpu: u32,
	sq_thread_idle: u32,
	cq_entries: u32,
	wq_fd: u32,
}

impl Config {
	pub fn new() -> Self {
		Self::default()
	}

	/// Kernel-polled submission: a kernel thread watches the submission
	/// ring, so `submit` can skip the syscall while the thread is awake.
	/// `idle_ms` is how long the thread spins without work before
	/// sleeping (it then needs an explicit wakeup, which `submit`
	/// performs automatically).
	pub fn sq_poll(mut self, idle_ms: u32) -> Self {
		self.flags |= SetupFlags::SQPOLL;
		self.sq_thread_idle = idle_ms;
		self
	}

	/// Pin the submission poll thread to `cpu`. Forces kernel-polled
	/// submission mode.
	pub fn sq_poll_cpu(mut self, cpu: u32) -> Self {
		self.flags |= SetupFlags::SQPOLL | SetupFlags::SQ_AFF;
		self.sq_thread_cpu = cpu;
		self
	}

	/// Busy-poll for completions instead of relying on interrupts; only
	/// valid for polling-capable descriptors (O_DIRECT files on
	/// supporting block devices).
	pub fn io_poll(mut self) -> Self {
		self.flags |= SetupFlags::IOPOLL;
		self
	}

	/// Request an explicit completion ring capacity instead of the
	/// default (twice the submission capacity). Rounded up to a power of
	/// two by the kernel.
	pub fn cq_entries(mut self, entries: u32) -> Self {
		self.flags |= SetupFlags::CQSIZE;
		self.cq_entries = entries;
		self
	}

	/// Clamp oversized ring capacities to the kernel maximum instead of
	/// failing setup.
	pub fn clamp(mut self) -> Self {
		self.flags |= SetupFlags::CLAMP;
		self
	}

	/// Declare that only one task will ever submit; enables kernel-side
	/// optimizations.
	pub fn single_issuer(mut self) -> Self {
		self.flags |= SetupFlags::SINGLE_ISSUER;
		self
	}

	/// Defer task work until the next enter with get-events. The kernel
	/// requires the single-issuer declaration for this, so it is implied.
	pub fn defer_taskrun(mut self) -> Self {
		self.flags |= SetupFlags::DEFER_TASKRUN | SetupFlags::SINGLE_ISSUER;
		self
	}

	/// Run completions cooperatively instead of interrupting the
	/// submitting task.
	pub fn coop_taskrun(mut self) -> Self {
		self.flags |= SetupFlags::COOP_TASKRUN;
		self
	}

	/// Share the async worker backend of an existing ring.
	pub fn attach_wq(mut self, ring_fd: RawFd) -> Self {
		self.flags |= SetupFlags::ATTACH_WQ;
		self.wq_fd = ring_fd as u32;
		self
	}

	/// OR arbitrary setup flag bits in, for kernel flags this library
	/// does not know about yet.
	pub fn raw_flags(mut self, flags: u32) -> Self {
		self.flags |= SetupFlags::from_bits_truncate(flags);
		self
	}

	pub(crate) fn to_params(&self) -> SetupParameters {
		let mut params = SetupParameters::new(self.flags);
		params.sq_thread_cpu = self.sq_thread_cpu;
		params.sq_thread_idle = self.sq_thread_idle;
		params.cq_entries = self.cq_entries;
		params.wq_fd = self.wq_fd;
		params
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn flag_assembly() {
		let params = Config::new().sq_poll(500).io_poll().cq_entries(64).to_params();
		assert!(params.flags.contains(SetupFlags::SQPOLL | SetupFlags::IOPOLL | SetupFlags::CQSIZE));
		assert_eq!(params.sq_thread_idle, 500);
		assert_eq!(params.cq_entries, 64);
	}

	#[test]
	fn cpu_pin_forces_sq_poll() {
		let params = Config::new().sq_poll_cpu(2).to_params();
		assert!(params.flags.contains(SetupFlags::SQPOLL | SetupFlags::SQ_AFF));
		assert_eq!(params.sq_thread_cpu, 2);
	}

	#[test]
	fn defer_taskrun_implies_single_issuer() {
		let params = Config::new().defer_taskrun().to_params();
		assert!(params.flags.contains(SetupFlags::DEFER_TASKRUN | SetupFlags::SINGLE_ISSUER));
	}
}
