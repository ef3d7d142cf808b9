use std::mem::size_of;
use std::os::unix::io::{
	AsRawFd,
	FromRawFd,
	IntoRawFd,
	RawFd,
};
use std::sync::atomic::{
	self,
	Ordering,
	AtomicBool,
	AtomicU32,
};
use std::sync::{
	Arc,
	Mutex,
	MutexGuard,
};
use std::time::{
	Duration,
	Instant,
};

use uring_sys::{
	io_uring_enter,
	io_uring_register,
	io_uring_setup,
	CompletionEntry,
	CompletionQueueFlags,
	EnterFlags,
	Features,
	GetEventsArg,
	RegisterOpCode,
	SetupFlags,
	SetupParameters,
	SubmissionEntry,
	SubmissionEntryFlags,
	SubmissionQueueFlags,
	Timespec,
};

use crate::config::Config;
use crate::cq::{Completion, CompletionQueue};
use crate::error::{Error, Result};
use crate::mmap::MappedMemory;
use crate::sq::SubmissionQueue;

// cap for one sleep in the degraded (no EXT_ARG) timed-wait loop
const POLL_SLEEP_CAP: Duration = Duration::from_millis(1);
// timed-wait slice between cancellation checks
const CANCEL_CHECK_INTERVAL: Duration = Duration::from_millis(10);

/// Cloneable cancellation handle for
/// [`Ring::wait_completion_cancelable`]: trigger it from any thread to
/// make pending waits return [`Error::Cancelled`].
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn cancel(&self) {
		self.0.store(true, Ordering::Release);
	}

	pub fn is_cancelled(&self) -> bool {
		self.0.load(Ordering::Acquire)
	}
}

/// The io_uring instance descriptor with the raw syscall surface.
pub struct UringFile(std::fs::File);

impl UringFile {
	pub fn new(entries: u32, params: &mut SetupParameters) -> Result<Self> {
		let res = unsafe {
			io_uring_setup(entries, params)
		};
		if res < 0 {
			return Err(Error::last_os_error());
		}
		Ok(unsafe { Self::from_raw_fd(res) })
	}

	/// io_uring_enter(2) with an optional signal mask; returns the number
	/// of submissions the kernel consumed.
	pub fn enter(&self, to_submit: u32, min_complete: u32, flags: EnterFlags, sig: Option<&libc::sigset_t>) -> Result<u32> {
		let (sig, sigsz) = match sig {
			Some(sig) => (sig as *const _ as *const libc::c_void, size_of::<libc::sigset_t>()),
			None => (0 as *const _, 0),
		};
		let res = unsafe {
			io_uring_enter(self.as_raw_fd(), to_submit, min_complete, flags.bits(), sig, sigsz)
		};
		if res < 0 {
			Err(Error::last_os_error())
		} else {
			Ok(res as u32)
		}
	}

	/// io_uring_enter(2) with the extended argument (`EnterFlags::EXT_ARG`
	/// is added); only valid when the kernel has `Features::EXT_ARG`.
	pub fn enter_with_arg(&self, to_submit: u32, min_complete: u32, flags: EnterFlags, arg: &GetEventsArg) -> Result<u32> {
		let res = unsafe {
			io_uring_enter(
				self.as_raw_fd(),
				to_submit,
				min_complete,
				(flags | EnterFlags::EXT_ARG).bits(),
				arg as *const _ as *const libc::c_void,
				size_of::<GetEventsArg>(),
			)
		};
		if res < 0 {
			Err(Error::last_os_error())
		} else {
			Ok(res as u32)
		}
	}

	/// io_uring_register(2); returns the non-negative kernel result
	/// (personality id, update count, ...).
	///
	/// unsafe because `arg` is interpreted per opcode.
	pub unsafe fn register(&self, opcode: RegisterOpCode, arg: *const libc::c_void, nr_args: u32) -> Result<u32> {
		let res = io_uring_register(self.as_raw_fd(), opcode.0, arg, nr_args);
		if res < 0 {
			Err(Error::last_os_error())
		} else {
			Ok(res as u32)
		}
	}
}

impl AsRawFd for UringFile {
	fn as_raw_fd(&self) -> RawFd {
		self.0.as_raw_fd()
	}
}

impl IntoRawFd for UringFile {
	fn into_raw_fd(self) -> RawFd {
		self.0.into_raw_fd()
	}
}

impl FromRawFd for UringFile {
	unsafe fn from_raw_fd(fd: RawFd) -> Self {
		UringFile(std::fs::File::from_raw_fd(fd))
	}
}

/// An io_uring instance: the descriptor, the three shared-memory mappings
/// and the typed queue views into them.
///
/// Submission operations serialize on an internal lock and may be called
/// from any thread. Completion operations take no lock; calling them from
/// more than one thread at a time requires external serialization.
pub struct Ring {
	file: Option<UringFile>,
	flags: SetupFlags,
	features: Features,

	sq: Mutex<SubmissionQueue>,
	cq: CompletionQueue,

	// kernel-written SQ state, readable without the submission lock
	k_sq_flags: &'static AtomicU32,
	k_sq_dropped: &'static AtomicU32,

	// mappings, torn down in reverse mapping order by close()
	sq_mmap: Option<MappedMemory>,
	cq_mmap: Option<MappedMemory>,
	sqe_mmap: Option<MappedMemory>,

	closed: AtomicBool,
}

// The raw pointers all target the mappings owned above; cross-thread
// access is mediated by the submission lock and the ring atomics.
unsafe impl Send for Ring {}
unsafe impl Sync for Ring {}

impl Ring {
	/// Create a ring with the default configuration.
	///
	/// `entries` must be > 0; the kernel rounds it up to a power of two.
	pub fn new(entries: u32) -> Result<Self> {
		Self::with_config(entries, &Config::new())
	}

	pub fn with_config(entries: u32, config: &Config) -> Result<Self> {
		if entries == 0 {
			return Err(Error::KernelError(libc::EINVAL));
		}
		let mut params = config.to_params();
		let file = UringFile::new(entries, &mut params)?;

		// Locals below unwind in reverse declaration order, so a failed
		// mapping unmaps everything mapped so far and closes the fd.
		let sq_size = (params.sq_off.array as usize) + size_of::<u32>() * (params.sq_entries as usize);
		let cq_size = (params.cq_off.cqes as usize) + size_of::<CompletionEntry>() * (params.cq_entries as usize);
		let single_mmap = params.features.contains(Features::SINGLE_MMAP);

		let sq_mmap = MappedMemory::map(
			file.as_raw_fd(),
			SetupParameters::SUBMISSION_QUEUE_RING_OFFSET,
			if single_mmap { sq_size.max(cq_size) } else { sq_size },
		)?;
		let cq_mmap = if single_mmap {
			// completion ring aliases the submission ring mapping
			None
		} else {
			Some(MappedMemory::map(
				file.as_raw_fd(),
				SetupParameters::COMPLETION_QUEUE_RING_OFFSET,
				cq_size,
			)?)
		};
		let sqe_mmap = MappedMemory::map(
			file.as_raw_fd(),
			SetupParameters::SUBMISSION_QUEUE_ENTRIES_OFFSET,
			size_of::<SubmissionEntry>() * (params.sq_entries as usize),
		)?;

		let sq = unsafe { SubmissionQueue::new(&sq_mmap, &sqe_mmap, &params.sq_off, params.sq_entries) };
		let cq_region = cq_mmap.as_ref().unwrap_or(&sq_mmap);
		let cq = unsafe { CompletionQueue::new(cq_region, &params.cq_off, params.cq_entries) };
		let k_sq_flags: &AtomicU32 = unsafe { &*sq_mmap.get_field(params.sq_off.flags) };
		let k_sq_dropped: &AtomicU32 = unsafe { &*sq_mmap.get_field(params.sq_off.dropped) };

		log::debug!(
			"ring created: fd {}, sq entries {}, cq entries {}, features {:?}",
			file.as_raw_fd(), params.sq_entries, params.cq_entries, params.features,
		);

		Ok(Ring {
			file: Some(file),
			flags: params.flags,
			features: params.features,
			sq: Mutex::new(sq),
			cq,
			k_sq_flags,
			k_sq_dropped,
			sq_mmap: Some(sq_mmap),
			cq_mmap,
			sqe_mmap: Some(sqe_mmap),
			closed: AtomicBool::new(false),
		})
	}

	pub(crate) fn file(&self) -> Result<&UringFile> {
		if self.closed.load(Ordering::Acquire) {
			return Err(Error::RingClosed);
		}
		self.file.as_ref().ok_or(Error::RingClosed)
	}

	fn lock_sq(&self) -> MutexGuard<SubmissionQueue> {
		match self.sq.lock() {
			Ok(guard) => guard,
			Err(poisoned) => poisoned.into_inner(),
		}
	}

	/// features advertised by the kernel at setup
	pub fn features(&self) -> Features {
		self.features
	}

	pub fn setup_flags(&self) -> SetupFlags {
		self.flags
	}

	fn check_open(&self) -> Result<()> {
		if self.closed.load(Ordering::Acquire) {
			return Err(Error::RingClosed);
		}
		Ok(())
	}

	pub fn sq_capacity(&self) -> Result<u32> {
		self.check_open()?;
		Ok(self.lock_sq().capacity())
	}

	pub fn cq_capacity(&self) -> Result<u32> {
		self.check_open()?;
		Ok(self.cq.capacity())
	}

	/// reserved but not yet published submissions
	pub fn sq_pending(&self) -> Result<u32> {
		self.check_open()?;
		Ok(self.lock_sq().pending())
	}

	pub fn sq_space_left(&self) -> Result<u32> {
		self.check_open()?;
		Ok(self.lock_sq().space_left())
	}

	fn sq_flags_raw(&self) -> SubmissionQueueFlags {
		SubmissionQueueFlags::from_bits_truncate(self.k_sq_flags.load(Ordering::Relaxed))
	}

	pub fn sq_flags(&self) -> Result<SubmissionQueueFlags> {
		self.check_open()?;
		Ok(self.sq_flags_raw())
	}

	/// entries the kernel dropped because their ring index was invalid
	pub fn sq_dropped(&self) -> Result<u32> {
		self.check_open()?;
		Ok(self.k_sq_dropped.load(Ordering::Relaxed))
	}

	pub fn cq_flags(&self) -> Result<CompletionQueueFlags> {
		self.check_open()?;
		Ok(self.cq.flags())
	}

	/// completions the kernel failed to post because the CQ ring was full
	/// (never incremented on kernels with `Features::NODROP`)
	pub fn cq_overflow(&self) -> Result<u32> {
		self.check_open()?;
		Ok(self.cq.overflow())
	}

	// ===== submission path =====

	/// Reserve the next submission entry and populate it through `f`,
	/// all under the submission lock. The entry is zeroed first and the
	/// user token is written after `f` ran; `f` only fills the
	/// opcode-specific slots.
	///
	/// The entry is only staged; nothing reaches the kernel until
	/// [`submit`](Self::submit).
	pub fn with_sqe<F>(&self, user_data: u64, f: F) -> Result<()>
	where
		F: FnOnce(&mut SubmissionEntry),
	{
		if self.closed.load(Ordering::Acquire) {
			return Err(Error::RingClosed);
		}
		let mut sq = self.lock_sq();
		let entry = sq.reserve()?;
		f(entry);
		entry.user_data = user_data;
		log::debug!("Prepared: {:?}", entry);
		Ok(())
	}

	/// OR per-entry flags (link, hard-link, drain, async, skip-success,
	/// buffer-select) into the most recently reserved entry. Fails if
	/// nothing is reserved.
	pub fn set_last_sqe_flags(&self, flags: SubmissionEntryFlags) -> Result<()> {
		if self.closed.load(Ordering::Acquire) {
			return Err(Error::RingClosed);
		}
		self.lock_sq().flag_last_reserved(flags)
	}

	/// Publish all pending entries and let the kernel consume them.
	/// Returns the number of submissions the kernel accepted, or 0 when
	/// the syscall was elided (kernel-polled mode with an awake poll
	/// thread, or nothing pending and nothing to flush).
	pub fn submit(&self) -> Result<u32> {
		self.file()?;
		let published = self.lock_sq().publish();
		if published == 0 {
			return Ok(0);
		}
		self.enter_ring(published, 0, false)
	}

	/// As [`submit`](Self::submit), but additionally waits until at least
	/// `min_complete` completions are available. Always enters the
	/// kernel, also in kernel-polled mode.
	pub fn submit_and_wait(&self, min_complete: u32) -> Result<u32> {
		self.file()?;
		let published = self.lock_sq().publish();
		self.enter_ring(published, min_complete, true)
	}

	/// The enter decision. `get_events` forces a syscall with
	/// `EnterFlags::GETEVENTS`; otherwise the syscall is skipped in
	/// kernel-polled mode while the poll thread is awake.
	fn enter_ring(&self, to_submit: u32, min_complete: u32, get_events: bool) -> Result<u32> {
		let file = self.file()?;
		let mut flags = EnterFlags::default();
		if get_events
			|| self.flags.contains(SetupFlags::IOPOLL)
			|| self.sq_flags_raw().contains(SubmissionQueueFlags::CQ_OVERFLOW)
		{
			flags |= EnterFlags::GETEVENTS;
		}
		if self.flags.contains(SetupFlags::SQPOLL) {
			// NEED_WAKEUP races with the poll thread parking itself; the
			// full fence orders our tail store before reading the flag
			atomic::fence(Ordering::SeqCst);
			if self.sq_flags_raw().contains(SubmissionQueueFlags::NEED_WAKEUP) {
				flags |= EnterFlags::SQ_WAKEUP;
			} else if !flags.contains(EnterFlags::GETEVENTS) {
				// poll thread is awake and consumes the entries on its own
				return Ok(0);
			}
		}
		file.enter(to_submit, min_complete, flags, None)
	}

	// ===== completion path =====
	//
	// None of these take a lock; concurrent use from several threads
	// requires external serialization.

	/// The completion at the head of the queue, if any, without releasing
	/// its slot; call [`advance_completions`](Self::advance_completions)
	/// once done with it.
	pub fn peek_completion(&self) -> Result<Option<Completion>> {
		if self.closed.load(Ordering::Acquire) {
			return Err(Error::RingClosed);
		}
		Ok(self.cq.peek())
	}

	/// completions currently available
	pub fn cq_ready(&self) -> Result<u32> {
		self.check_open()?;
		Ok(self.cq.available())
	}

	/// Release `n` consumed completion slots back to the kernel; `n` must
	/// not exceed [`cq_ready`](Self::cq_ready).
	pub fn advance_completions(&self, n: u32) -> Result<()> {
		if self.closed.load(Ordering::Acquire) {
			return Err(Error::RingClosed);
		}
		self.cq.advance(n);
		Ok(())
	}

	/// Visit every available completion in order; entries are released as
	/// `f` accepts them and iteration stops early when `f` returns false.
	/// Returns the number of accepted entries.
	pub fn for_each_completion<F>(&self, f: F) -> Result<u32>
	where
		F: FnMut(Completion) -> bool,
	{
		if self.closed.load(Ordering::Acquire) {
			return Err(Error::RingClosed);
		}
		Ok(self.cq.for_each(f))
	}

	/// Release every available completion without inspection; returns the
	/// count drained.
	pub fn drain_completions(&self) -> Result<u32> {
		if self.closed.load(Ordering::Acquire) {
			return Err(Error::RingClosed);
		}
		Ok(self.cq.drain())
	}

	/// Wait until a completion is available and return it (without
	/// releasing its slot). Publishes pending submissions first. A wait
	/// the kernel ends without an entry surfaces
	/// [`Error::Interrupted`].
	pub fn wait_completion(&self) -> Result<Completion> {
		if let Some(completion) = self.peek_completion()? {
			return Ok(completion);
		}
		let published = self.lock_sq().publish();
		self.enter_ring(published, 1, true)?;
		self.cq.peek().ok_or(Error::Interrupted)
	}

	/// As [`wait_completion`](Self::wait_completion), but gives up with
	/// [`Error::TimeExpired`] once `timeout` elapsed.
	///
	/// With `Features::EXT_ARG` the kernel sleeps on the deadline itself,
	/// one syscall per wait; without it this degrades to a bounded poll
	/// loop with short sleeps.
	pub fn wait_completion_timeout(&self, timeout: Duration) -> Result<Completion> {
		if let Some(completion) = self.peek_completion()? {
			return Ok(completion);
		}
		if self.features.contains(Features::EXT_ARG) {
			let file = self.file()?;
			let ts = Timespec::from(timeout);
			let arg = GetEventsArg {
				sigmask: 0,
				sigmask_sz: 0,
				pad: 0,
				ts: &ts as *const Timespec as usize as u64,
			};
			let published = self.lock_sq().publish();
			let mut flags = EnterFlags::GETEVENTS;
			if self.flags.contains(SetupFlags::SQPOLL) {
				atomic::fence(Ordering::SeqCst);
				if self.sq_flags_raw().contains(SubmissionQueueFlags::NEED_WAKEUP) {
					flags |= EnterFlags::SQ_WAKEUP;
				}
			}
			file.enter_with_arg(published, 1, flags, &arg)?;
			self.cq.peek().ok_or(Error::TimeExpired)
		} else {
			let deadline = Instant::now() + timeout;
			loop {
				match self.submit_and_wait(0) {
					Ok(_) => {}
					Err(Error::Interrupted) => {}
					Err(e) => return Err(e),
				}
				if let Some(completion) = self.cq.peek() {
					return Ok(completion);
				}
				let now = Instant::now();
				if now >= deadline {
					return Err(Error::TimeExpired);
				}
				std::thread::sleep((deadline - now).min(POLL_SLEEP_CAP));
			}
		}
	}

	/// As [`wait_completion`](Self::wait_completion), but polls `token`
	/// and gives up with [`Error::Cancelled`] once it is triggered.
	pub fn wait_completion_cancelable(&self, token: &CancelToken) -> Result<Completion> {
		loop {
			if token.is_cancelled() {
				return Err(Error::Cancelled);
			}
			match self.wait_completion_timeout(CANCEL_CHECK_INTERVAL) {
				Ok(completion) => return Ok(completion),
				Err(Error::TimeExpired) | Err(Error::Interrupted) => continue,
				Err(e) => return Err(e),
			}
		}
	}

	// ===== teardown =====

	/// Tear the ring down: unmap the shared regions in reverse mapping
	/// order and close the descriptor. Idempotent; every later operation
	/// fails with [`Error::RingClosed`].
	pub fn close(&mut self) -> Result<()> {
		if self.closed.swap(true, Ordering::AcqRel) {
			return Ok(());
		}
		log::debug!("closing ring");
		drop(self.sqe_mmap.take());
		drop(self.cq_mmap.take());
		drop(self.sq_mmap.take());
		drop(self.file.take());
		Ok(())
	}
}

impl Drop for Ring {
	fn drop(&mut self) {
		let _ = self.close();
	}
}
