#![no_std]

mod macros;

mod submission;
pub use submission::{
	IoPriorityLevel,
	IoPriority,
	FileDescriptor,
};

use bitflags::bitflags;

use core::mem::size_of;
use core::fmt;
use core::time::Duration;
use libc::{
	c_int,
	c_long,
	c_uint,
	c_void,
};

static_assert!(
	size_of::<SetupParameters>() == 120,
	size_of::<SubmissionQueueRingOffsets>() == 40,
	size_of::<CompletionQueueRingOffsets>() == 40,
	size_of::<SubmissionEntry>() == 64,
	size_of::<SubmissionEntryOperationFlags>() == 4,
	size_of::<SubmissionEntryExtraData>() == 24,
	size_of::<CompletionEntry>() == 16,
	size_of::<Timespec>() == 16,
	size_of::<GetEventsArg>() == 24,
	size_of::<ProbeHeader>() == 16,
	size_of::<ProbeOp>() == 8,
	size_of::<FilesUpdate>() == 16,
);

#[cfg(target_os = "linux")]
#[allow(non_upper_case_globals)]
mod syscalls {
	// asm-generic numbers; identical on every architecture that has io_uring
	pub const SYS_io_uring_setup: libc::c_long = 425;
	pub const SYS_io_uring_enter: libc::c_long = 426;
	pub const SYS_io_uring_register: libc::c_long = 427;
}

pub unsafe fn io_uring_setup(entries: u32, params: *mut SetupParameters) -> c_int {
	libc::syscall(
		syscalls::SYS_io_uring_setup,
		entries as c_long,
		params as usize as c_long,
	) as c_int
}

/// `arg`/`argsz` carry either a signal mask (`sigset_t`) or, with
/// `EnterFlags::EXT_ARG`, a `GetEventsArg`.
pub unsafe fn io_uring_enter(fd: c_int, to_submit: c_uint, min_complete: c_uint, flags: c_uint, arg: *const c_void, argsz: usize) -> c_int {
	libc::syscall(
		syscalls::SYS_io_uring_enter,
		fd as c_long,
		to_submit as c_long,
		min_complete as c_long,
		flags as c_long,
		arg as usize as c_long,
		argsz as c_long,
	) as c_int
}

pub unsafe fn io_uring_register(fd: c_int, opcode: c_uint, arg: *const c_void, nr_args: c_uint) -> c_int {
	libc::syscall(
		syscalls::SYS_io_uring_register,
		fd as c_long,
		opcode as c_long,
		arg as usize as c_long,
		nr_args as c_long,
	) as c_int
}

bitflags! {
	#[derive(Default)]
	pub struct EnterFlags: u32 {
		/// `IORING_ENTER_GETEVENTS`: wait until min_complete events are
		/// available (also required to reap IOPOLL completions)
		const GETEVENTS = (1 << 0);
		/// `IORING_ENTER_SQ_WAKEUP`: wake up the kernel SQ poll thread
		const SQ_WAKEUP = (1 << 1);
		/// `IORING_ENTER_SQ_WAIT`: wait for the SQ ring to have free entries
		const SQ_WAIT = (1 << 2);
		/// `IORING_ENTER_EXT_ARG`: the last two syscall arguments carry a
		/// `GetEventsArg` instead of a signal mask
		const EXT_ARG = (1 << 3);
		/// `IORING_ENTER_REGISTERED_RING`: fd is an index into the
		/// registered ring fds
		const REGISTERED_RING = (1 << 4);

		// don't truncate any bits
		#[doc(hidden)]
		const _ALL = !0;
	}
}

#[derive(Clone, Copy, Debug)]
pub struct RegisterOpCode(pub u32);

impl RegisterOpCode {
	/// `IORING_REGISTER_BUFFERS`
	pub const REGISTER_BUFFERS: Self = Self(0);
	/// `IORING_UNREGISTER_BUFFERS`
	pub const UNREGISTER_BUFFERS: Self = Self(1);
	/// `IORING_REGISTER_FILES`
	pub const REGISTER_FILES: Self = Self(2);
	/// `IORING_UNREGISTER_FILES`
	pub const UNREGISTER_FILES: Self = Self(3);
	/// `IORING_REGISTER_EVENTFD`
	pub const REGISTER_EVENTFD: Self = Self(4);
	/// `IORING_UNREGISTER_EVENTFD`
	pub const UNREGISTER_EVENTFD: Self = Self(5);
	/// `IORING_REGISTER_FILES_UPDATE`
	pub const REGISTER_FILES_UPDATE: Self = Self(6);
	/// `IORING_REGISTER_EVENTFD_ASYNC`: notify only for completions that
	/// did not finish inline
	pub const REGISTER_EVENTFD_ASYNC: Self = Self(7);
	/// `IORING_REGISTER_PROBE`
	pub const REGISTER_PROBE: Self = Self(8);
	/// `IORING_REGISTER_PERSONALITY`
	pub const REGISTER_PERSONALITY: Self = Self(9);
	/// `IORING_UNREGISTER_PERSONALITY`
	pub const UNREGISTER_PERSONALITY: Self = Self(10);
	/// `IORING_REGISTER_RESTRICTIONS`
	pub const REGISTER_RESTRICTIONS: Self = Self(11);
	/// `IORING_REGISTER_ENABLE_RINGS`
	pub const REGISTER_ENABLE_RINGS: Self = Self(12);
	/// `IORING_REGISTER_FILES2`
	pub const REGISTER_FILES2: Self = Self(13);
	/// `IORING_REGISTER_FILES_UPDATE2`
	pub const REGISTER_FILES_UPDATE2: Self = Self(14);
	/// `IORING_REGISTER_BUFFERS2`
	pub const REGISTER_BUFFERS2: Self = Self(15);
	/// `IORING_REGISTER_BUFFERS_UPDATE`
	pub const REGISTER_BUFFERS_UPDATE: Self = Self(16);
	/// `IORING_REGISTER_IOWQ_AFF`
	pub const REGISTER_IOWQ_AFF: Self = Self(17);
	/// `IORING_UNREGISTER_IOWQ_AFF`
	pub const UNREGISTER_IOWQ_AFF: Self = Self(18);
	/// `IORING_REGISTER_IOWQ_MAX_WORKERS`
	pub const REGISTER_IOWQ_MAX_WORKERS: Self = Self(19);
	/// `IORING_REGISTER_RING_FDS`
	pub const REGISTER_RING_FDS: Self = Self(20);
	/// `IORING_UNREGISTER_RING_FDS`
	pub const UNREGISTER_RING_FDS: Self = Self(21);
	/// `IORING_REGISTER_PBUF_RING`
	pub const REGISTER_PBUF_RING: Self = Self(22);
	/// `IORING_UNREGISTER_PBUF_RING`
	pub const UNREGISTER_PBUF_RING: Self = Self(23);
	/// `IORING_REGISTER_SYNC_CANCEL`
	pub const REGISTER_SYNC_CANCEL: Self = Self(24);
	/// `IORING_REGISTER_FILE_ALLOC_RANGE`
	pub const REGISTER_FILE_ALLOC_RANGE: Self = Self(25);
}

/// Passed in for io_uring_setup(2). Copied back with updated info on
/// success
///
/// C: `struct io_uring_params`
#[derive(Clone, Copy, Default, Debug)]
#[repr(C)]
pub struct SetupParameters {
	/// (output) allocated entries in submission queue
	///
	/// (both ring index `array` and separate entry array at
	/// `SUBMISSION_QUEUE_ENTRIES_OFFSET`).
	pub sq_entries: u32,
	/// (input with `SetupFlags::CQSIZE`, otherwise output) allocated
	/// entries in completion queue
	pub cq_entries: u32,
	/// (input)
	pub flags: SetupFlags,
	/// (input) used if SQ_AFF and SQPOLL flags are active to pin poll
	/// thread to specific cpu
	pub sq_thread_cpu: u32,
	/// (input) used if SQPOLL flag is active; timeout in milliseconds
	/// until kernel poll thread goes to sleep.
	pub sq_thread_idle: u32,
	/// (output) supported features on the running kernel
	pub features: Features,
	/// (input) used if ATTACH_WQ is active: ring fd whose async backend
	/// is shared
	pub wq_fd: u32,
	// reserved
	_reserved: [u32; 3],
	/// (output) submission queue ring data field offsets
	pub sq_off: SubmissionQueueRingOffsets,
	/// (output) completion queue ring data field offsets
	pub cq_off: CompletionQueueRingOffsets,
}

impl SetupParameters {
	/// `IORING_OFF_SQ_RING`: mmap offset for submission queue ring
	pub const SUBMISSION_QUEUE_RING_OFFSET: i64 = 0;
	/// `IORING_OFF_CQ_RING`: mmap offset for completion queue ring
	pub const COMPLETION_QUEUE_RING_OFFSET: i64 = 0x8000000;
	/// `IORING_OFF_SQES`: mmap offset for submission entries
	pub const SUBMISSION_QUEUE_ENTRIES_OFFSET: i64 = 0x10000000;

	pub fn new(flags: SetupFlags) -> Self {
		Self {
			flags,
			..Self::default()
		}
	}
}

bitflags! {
	/// io_uring_setup() flags
	#[derive(Default)]
	pub struct SetupFlags: u32 {
		/// `IORING_SETUP_IOPOLL`: io_context is polled
		const IOPOLL = (1 << 0);

		/// `IORING_SETUP_SQPOLL`: SQ poll thread
		const SQPOLL = (1 << 1);

		/// `IORING_SETUP_SQ_AFF`: sq_thread_cpu is valid
		const SQ_AFF = (1 << 2);

		/// `IORING_SETUP_CQSIZE`: app defines CQ size
		const CQSIZE = (1 << 3);

		/// `IORING_SETUP_CLAMP`: clamp SQ/CQ ring sizes instead of failing
		const CLAMP = (1 << 4);

		/// `IORING_SETUP_ATTACH_WQ`: attach to existing wq (wq_fd is valid)
		const ATTACH_WQ = (1 << 5);

		/// `IORING_SETUP_R_DISABLED`: start with ring disabled
		const R_DISABLED = (1 << 6);

		/// `IORING_SETUP_SUBMIT_ALL`: continue submit on error
		const SUBMIT_ALL = (1 << 7);

		/// `IORING_SETUP_COOP_TASKRUN`: cooperative task running; don't
		/// interrupt the running task to process completions
		const COOP_TASKRUN = (1 << 8);

		/// `IORING_SETUP_TASKRUN_FLAG`: report pending task work via
		/// `SubmissionQueueFlags::TASKRUN`
		const TASKRUN_FLAG = (1 << 9);

		/// `IORING_SETUP_SQE128`: 128 byte submission entries
		const SQE128 = (1 << 10);

		/// `IORING_SETUP_CQE32`: 32 byte completion entries
		const CQE32 = (1 << 11);

		/// `IORING_SETUP_SINGLE_ISSUER`: only a single task submits
		const SINGLE_ISSUER = (1 << 12);

		/// `IORING_SETUP_DEFER_TASKRUN`: defer task work until
		/// io_uring_enter with GETEVENTS; requires SINGLE_ISSUER
		const DEFER_TASKRUN = (1 << 13);

		// don't truncate any bits
		#[doc(hidden)]
		const _ALL = !0;
	}
}

bitflags! {
	/// features supported by the running kernel, reported by
	/// io_uring_setup(2) in `SetupParameters::features`
	#[derive(Default)]
	pub struct Features: u32 {
		/// `IORING_FEAT_SINGLE_MMAP`: SQ and CQ ring share one mapping
		const SINGLE_MMAP = (1 << 0);
		/// `IORING_FEAT_NODROP`: completions are never dropped; the
		/// kernel buffers them internally when the CQ ring overflows
		const NODROP = (1 << 1);
		/// `IORING_FEAT_SUBMIT_STABLE`: submitted data is copied before
		/// submit returns; buffers holding iovecs etc. may be reused
		const SUBMIT_STABLE = (1 << 2);
		/// `IORING_FEAT_RW_CUR_POS`: offset -1 means current file position
		const RW_CUR_POS = (1 << 3);
		/// `IORING_FEAT_CUR_PERSONALITY`: ops run with the credentials of
		/// the task calling enter, not the task that created the ring
		const CUR_PERSONALITY = (1 << 4);
		/// `IORING_FEAT_FAST_POLL`: internal fast poll for readiness
		const FAST_POLL = (1 << 5);
		/// `IORING_FEAT_POLL_32BITS`: 32 bit poll masks (EPOLLEXCLUSIVE)
		const POLL_32BITS = (1 << 6);
		/// `IORING_FEAT_SQPOLL_NONFIXED`: SQPOLL works with non-fixed files
		const SQPOLL_NONFIXED = (1 << 7);
		/// `IORING_FEAT_EXT_ARG`: io_uring_enter accepts `GetEventsArg`
		/// (timed waits in a single syscall)
		const EXT_ARG = (1 << 8);
		/// `IORING_FEAT_NATIVE_WORKERS`: async helpers are native threads
		const NATIVE_WORKERS = (1 << 9);
		/// `IORING_FEAT_RSRC_TAGS`: tagged resource registration
		const RSRC_TAGS = (1 << 10);
		/// `IORING_FEAT_CQE_SKIP`: `SubmissionEntryFlags::CQE_SKIP_SUCCESS`
		const CQE_SKIP = (1 << 11);
		/// `IORING_FEAT_LINKED_FILE`: sane file handling for linked requests
		const LINKED_FILE = (1 << 12);
		/// `IORING_FEAT_REG_REG_RING`: registered rings may be used in
		/// register syscalls
		const REG_REG_RING = (1 << 13);

		// don't truncate any bits
		#[doc(hidden)]
		const _ALL = !0;
	}
}

/// Offset to various struct members in mmap() at offset
/// `SUBMISSION_QUEUE_RING_OFFSET`
///
/// C: `struct io_sqring_offsets`
#[derive(Clone, Copy, Default, Debug)]
#[repr(C)]
pub struct SubmissionQueueRingOffsets {
	/// member type: AtomicU32; index into `self.array` (after `self.ring_mask` is applied)
	///
	/// incremented by kernel after entry at `head` was processed.
	///
	/// pending submissions: [head..tail]
	pub head: u32,
	/// member type: AtomicU32; index into `self.array` (after `self.ring_mask` is applied)
	///
	/// modified by user space when new entry was queued; points to next
	/// entry user space is going to fill.
	pub tail: u32,
	/// member type: (const) u32
	///
	/// value `value_at(self.ring_entries) - 1`
	///
	/// mask for indices at `head` and `tail` (don't delete masked bits!
	/// `head` and `tail` can point to the same entry, but if they are
	/// not exactly equal it implies the ring is full, and if they are
	/// exactly equal the ring is empty.)
	pub ring_mask: u32,
	/// member type: (const) u32; value same as SetupParameters.sq_entries, power of 2.
	pub ring_entries: u32,
	/// member type: (atomic) SubmissionQueueFlags
	pub flags: u32,
	/// member type: AtomicU32
	///
	/// number of (invalid) entries that were dropped; entries are
	/// invalid if their index (in `self.array`) is out of bounds.
	pub dropped: u32,
	/// member type: [u32] (index array into array of `SubmissionEntry`s
	/// at offset `SUBMISSION_QUEUE_ENTRIES_OFFSET` in mmap())
	pub array: u32,
	// reserved
	_resv1: u32,
	/// member type: (const) u64; kernel address of the ring when
	/// `IORING_SETUP_NO_MMAP` style setups are in use
	pub user_addr: u64,
}

bitflags! {
	#[derive(Default)]
	pub struct SubmissionQueueFlags: u32 {
		/// `IORING_SQ_NEED_WAKEUP`: needs io_uring_enter wakeup
		///
		/// set by kernel poll thread when it goes sleeping, and reset
		/// on wakeup
		const NEED_WAKEUP = (1 << 0);

		/// `IORING_SQ_CQ_OVERFLOW`: the kernel has completions buffered
		/// internally because the CQ ring overflowed; enter with
		/// GETEVENTS to flush them
		const CQ_OVERFLOW = (1 << 1);

		/// `IORING_SQ_TASKRUN`: task work is pending (TASKRUN_FLAG setups)
		const TASKRUN = (1 << 2);

		// don't truncate any bits
		#[doc(hidden)]
		const _ALL = !0;
	}
}

/// Offset to various struct members in mmap() at offset
/// `COMPLETION_QUEUE_RING_OFFSET`
///
/// C: `struct io_cqring_offsets`
#[derive(Clone, Copy, Default, Debug)]
#[repr(C)]
pub struct CompletionQueueRingOffsets {
	/// member type: AtomicU32; index into `self.cqes` (after `self.ring_mask` is applied)
	///
	/// incremented by user space after entry at `head` was processed.
	///
	/// available entries for processing: [head..tail]
	pub head: u32,
	/// member type: AtomicU32; index into `self.cqes` (after `self.ring_mask` is applied)
	///
	/// modified by kernel when new entry was created; points to next
	/// entry kernel is going to fill.
	pub tail: u32,
	/// member type: (const) u32
	///
	/// value `value_at(self.ring_entries) - 1`
	pub ring_mask: u32,
	/// member type: (const) u32; value same as SetupParameters.cq_entries, power of 2.
	pub ring_entries: u32,
	/// member type: AtomicU32
	///
	/// incremented by the kernel every time it failed to queue a
	/// completion event because the ring was full.
	pub overflow: u32,
	/// member type: [CompletionEntry; self.ring_entries]
	pub cqes: u32,
	/// member type: (atomic) CompletionQueueFlags
	pub flags: u32,
	// reserved
	_resv1: u32,
	/// member type: (const) u64; see `SubmissionQueueRingOffsets::user_addr`
	pub user_addr: u64,
}

bitflags! {
	#[derive(Default)]
	pub struct CompletionQueueFlags: u32 {
		/// `IORING_CQ_EVENTFD_DISABLED`: suppress eventfd notifications
		/// without unregistering (written by user space)
		const EVENTFD_DISABLED = (1 << 0);

		// don't truncate any bits
		#[doc(hidden)]
		const _ALL = !0;
	}
}

/// C: `struct io_uring_sqe`
#[repr(C)]
pub struct SubmissionEntry {
	pub opcode: RawOperation,
	pub flags: SubmissionEntryFlags,
	pub ioprio: EncodedIoPriority,
	pub fd: i32,
	pub off: SubmissionEntryOffset,
	pub addr: SubmissionEntryAddress,
	pub len: u32,
	pub op_flags: SubmissionEntryOperationFlags,
	pub user_data: u64,
	pub extra: SubmissionEntryExtraData,
}

impl fmt::Debug for SubmissionEntry {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		f.debug_struct("SubmissionEntry")
			.field("opcode", &self.opcode)
			.field("flags", &self.flags)
			.field("fd", &self.fd)
			.field("off", unsafe { &self.off.off })
			.field("addr", unsafe { &self.addr.addr })
			.field("len", &self.len)
			.field("op_flags", unsafe { &self.op_flags.raw })
			.field("user_data", &self.user_data)
			.finish()
	}
}

/// `off`/`addr2` slot at byte 8 of the entry
#[repr(C)]
#[derive(Clone, Copy)]
pub union SubmissionEntryOffset {
	pub off: u64,
	pub addr2: u64,
	pub cmd_op: u32,
}

impl From<u64> for SubmissionEntryOffset {
	fn from(off: u64) -> Self {
		Self { off }
	}
}

/// `addr`/`splice_off_in` slot at byte 16 of the entry
#[repr(C)]
#[derive(Clone, Copy)]
pub union SubmissionEntryAddress {
	pub addr: u64,
	pub splice_off_in: u64,
}

impl From<u64> for SubmissionEntryAddress {
	fn from(addr: u64) -> Self {
		Self { addr }
	}
}

#[repr(u8)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Operation {
	Nop = 0,
	Readv = 1,
	Writev = 2,
	Fsync = 3,
	ReadFixed = 4,
	WriteFixed = 5,
	PollAdd = 6,
	PollRemove = 7,
	SyncFileRange = 8,
	SendMsg = 9,
	RecvMsg = 10,
	Timeout = 11,
	TimeoutRemove = 12,
	Accept = 13,
	AsyncCancel = 14,
	LinkTimeout = 15,
	Connect = 16,
	Fallocate = 17,
	OpenAt = 18,
	Close = 19,
	FilesUpdate = 20,
	Statx = 21,
	Read = 22,
	Write = 23,
	Fadvise = 24,
	Madvise = 25,
	Send = 26,
	Recv = 27,
	OpenAt2 = 28,
	EpollCtl = 29,
	Splice = 30,
	ProvideBuffers = 31,
	RemoveBuffers = 32,
	Tee = 33,
	Shutdown = 34,
	RenameAt = 35,
	UnlinkAt = 36,
	MkdirAt = 37,
	SymlinkAt = 38,
	LinkAt = 39,
	MsgRing = 40,
	FsetXattr = 41,
	SetXattr = 42,
	FgetXattr = 43,
	GetXattr = 44,
	Socket = 45,
	UringCmd = 46,
	SendZc = 47,
	SendMsgZc = 48,
}

impl Default for Operation {
	fn default() -> Self {
		Operation::Nop
	}
}

#[repr(C)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct RawOperation(pub u8);

impl RawOperation {
	pub fn decode(self) -> Option<Operation> {
		Some(match self.0 {
			0 => Operation::Nop,
			1 => Operation::Readv,
			2 => Operation::Writev,
			3 => Operation::Fsync,
			4 => Operation::ReadFixed,
			5 => Operation::WriteFixed,
			6 => Operation::PollAdd,
			7 => Operation::PollRemove,
			8 => Operation::SyncFileRange,
			9 => Operation::SendMsg,
			10 => Operation::RecvMsg,
			11 => Operation::Timeout,
			12 => Operation::TimeoutRemove,
			13 => Operation::Accept,
			14 => Operation::AsyncCancel,
			15 => Operation::LinkTimeout,
			16 => Operation::Connect,
			17 => Operation::Fallocate,
			18 => Operation::OpenAt,
			19 => Operation::Close,
			20 => Operation::FilesUpdate,
			21 => Operation::Statx,
			22 => Operation::Read,
			23 => Operation::Write,
			24 => Operation::Fadvise,
			25 => Operation::Madvise,
			26 => Operation::Send,
			27 => Operation::Recv,
			28 => Operation::OpenAt2,
			29 => Operation::EpollCtl,
			30 => Operation::Splice,
			31 => Operation::ProvideBuffers,
			32 => Operation::RemoveBuffers,
			33 => Operation::Tee,
			34 => Operation::Shutdown,
			35 => Operation::RenameAt,
			36 => Operation::UnlinkAt,
			37 => Operation::MkdirAt,
			38 => Operation::SymlinkAt,
			39 => Operation::LinkAt,
			40 => Operation::MsgRing,
			41 => Operation::FsetXattr,
			42 => Operation::SetXattr,
			43 => Operation::FgetXattr,
			44 => Operation::GetXattr,
			45 => Operation::Socket,
			46 => Operation::UringCmd,
			47 => Operation::SendZc,
			48 => Operation::SendMsgZc,
			_ => return None,
		})
	}
}

impl From<Operation> for RawOperation {
	fn from(op: Operation) -> Self {
		RawOperation(op as u8)
	}
}

impl fmt::Debug for RawOperation {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self.decode() {
			Some(op) => op.fmt(f),
			None => f.debug_tuple("RawOperation").field(&self.0).finish(),
		}
	}
}

bitflags! {
	#[derive(Default)]
	pub struct SubmissionEntryFlags: u8 {
		/// `IOSQE_FIXED_FILE`: use fixed fileset
		///
		/// I.e. `SubmissionEntry.fd` is used as index into the
		/// registered fileset (array of fds) instead.
		const FIXED_FILE = (1 << 0);

		/// `IOSQE_IO_DRAIN`: issue after inflight IO
		const IO_DRAIN = (1 << 1);

		/// `IOSQE_IO_LINK`: links next entry into a chain; the chain
		/// breaks at the first entry without the flag
		const IO_LINK = (1 << 2);

		/// `IOSQE_IO_HARDLINK`: like IO_LINK, but the chain survives a
		/// failing entry
		const IO_HARDLINK = (1 << 3);

		/// `IOSQE_ASYNC`: always punt to async workers, never try inline
		const ASYNC = (1 << 4);

		/// `IOSQE_BUFFER_SELECT`: select a buffer from the group in
		/// `SubmissionEntryExtraData.buf` at execution time
		const BUFFER_SELECT = (1 << 5);

		/// `IOSQE_CQE_SKIP_SUCCESS`: post no completion entry on success
		const CQE_SKIP_SUCCESS = (1 << 6);

		// don't truncate any bits
		#[doc(hidden)]
		const _ALL = !0;
	}
}

#[repr(C)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default)]
pub struct EncodedIoPriority(pub u16);

#[repr(C)]
#[derive(Clone, Copy)]
pub union SubmissionEntryOperationFlags {
	pub raw: u32,
	pub rw_flags: ReadWriteFlags,
	pub fsync_flags: FsyncFlags,
	pub poll_events: PollFlags,
	pub poll32_events: u32,
	pub sync_range_flags: u32,
	pub msg_flags: u32,
	pub timeout_flags: TimeoutFlags,
	pub accept_flags: u32,
	pub cancel_flags: CancelFlags,
	pub open_flags: u32,
	pub statx_flags: u32,
	pub fadvise_advice: u32,
	pub splice_flags: SpliceFlags,
	pub rename_flags: u32,
	pub unlink_flags: u32,
	pub hardlink_flags: u32,
	pub xattr_flags: u32,
	pub msg_ring_flags: MsgRingFlags,
}

impl fmt::Debug for SubmissionEntryOperationFlags {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		f.debug_struct("SubmissionEntryOperationFlags")
			.field("raw", unsafe { &self.raw })
			.finish()
	}
}

impl From<u32> for SubmissionEntryOperationFlags {
	fn from(raw: u32) -> Self {
		Self { raw }
	}
}

impl From<ReadWriteFlags> for SubmissionEntryOperationFlags {
	fn from(rw_flags: ReadWriteFlags) -> Self {
		Self { rw_flags }
	}
}

impl From<FsyncFlags> for SubmissionEntryOperationFlags {
	fn from(fsync_flags: FsyncFlags) -> Self {
		Self { fsync_flags }
	}
}

impl From<PollFlags> for SubmissionEntryOperationFlags {
	fn from(poll_events: PollFlags) -> Self {
		// poll events live in the low 16 bits of the 32 bit slot
		Self { poll32_events: poll_events.bits() as u32 }
	}
}

impl From<TimeoutFlags> for SubmissionEntryOperationFlags {
	fn from(timeout_flags: TimeoutFlags) -> Self {
		Self { timeout_flags }
	}
}

impl From<CancelFlags> for SubmissionEntryOperationFlags {
	fn from(cancel_flags: CancelFlags) -> Self {
		Self { cancel_flags }
	}
}

impl From<SpliceFlags> for SubmissionEntryOperationFlags {
	fn from(splice_flags: SpliceFlags) -> Self {
		Self { splice_flags }
	}
}

impl From<MsgRingFlags> for SubmissionEntryOperationFlags {
	fn from(msg_ring_flags: MsgRingFlags) -> Self {
		Self { msg_ring_flags }
	}
}

bitflags! {
	#[derive(Default)]
	pub struct ReadWriteFlags: u32 {
		/// High priority read/write.  Allows block-based filesystems to
		/// use polling of the device, which provides lower latency, but
		/// may use additional resources.  (Currently, this feature is
		/// usable only  on  a  file  descriptor opened using the
		/// O_DIRECT flag.)
		///
		/// (since Linux 4.6)
		const HIPRI = 0x00000001;

		/// Provide a per-write equivalent of the O_DSYNC open(2) flag.
		/// This flag is meaningful only for pwritev2(), and its effect
		/// applies only to the data range written by the system call.
		///
		/// (since Linux 4.7)
		const DSYNC = 0x00000002;

		/// Provide a per-write equivalent of the O_SYNC open(2) flag.
		/// This flag is meaningful only for pwritev2(), and its effect
		/// applies only to the data range written by the system call.
		///
		/// (since Linux 4.7)
		const SYNC = 0x00000004;

		/// Do not wait for data which is not immediately available.  If
		/// this flag is specified, the preadv2() system call will
		/// return instantly if it would have to read data from the
		/// backing storage or wait for a lock.  If some data was
		/// successfully read, it will return the number of bytes read.
		/// If no bytes were read, it will return -1 and set errno to
		/// EAGAIN.  Currently, this flag is meaningful only for
		/// preadv2().
		///
		/// (since Linux 4.14)
		const NOWAIT = 0x00000008;

		/// Provide a per-write equivalent of the O_APPEND open(2) flag.
		/// This flag is meaningful only for pwritev2(), and its effect
		/// applies only to the data range written by the system call.
		/// The offset argument does not affect the write operation; the
		/// data is always appended to the end of the file.  However, if
		/// the offset argument is -1, the current file offset is
		/// updated.
		///
		/// (since Linux 4.16)
		const APPEND = 0x00000010;

		const SUPPORTED = 0
			| Self::HIPRI.bits
			| Self::DSYNC.bits
			| Self::SYNC.bits
			| Self::NOWAIT.bits
			| Self::APPEND.bits
		;

		// don't truncate any bits
		#[doc(hidden)]
		const _ALL = !0;
	}
}

bitflags! {
	#[derive(Default)]
	pub struct FsyncFlags: u32 {
		/// `IORING_FSYNC_DATASYNC`: fdatasync semantics
		const DATASYNC = (1 << 0);

		// don't truncate any bits
		#[doc(hidden)]
		const _ALL = !0;
	}
}

bitflags! {
	#[derive(Default)]
	pub struct PollFlags: u16 {
		const IN = libc::POLLIN as u16;
		const OUT = libc::POLLOUT as u16;
		const PRI = libc::POLLPRI as u16;
		const ERR = libc::POLLERR as u16;
		const NVAL = libc::POLLNVAL as u16;
		const RDNORM = libc::POLLRDNORM as u16;
		const RDBAND = libc::POLLRDBAND as u16;
		const WRNORM = libc::POLLWRNORM as u16;
		const WRBAND = libc::POLLWRBAND as u16;
		const HUP = libc::POLLHUP as u16;
		const RDHUP = 0x2000; // sparc: 0x800
		const MSG = 0x0400; // sparc: 0x200

		// don't truncate any bits
		#[doc(hidden)]
		const _ALL = !0;
	}
}

bitflags! {
	/// flags for `Operation::PollAdd`; stored in the `len` slot
	#[derive(Default)]
	pub struct PollAddFlags: u32 {
		/// `IORING_POLL_ADD_MULTI`: multishot poll; keeps posting
		/// completions (with `CompletionEntryFlags::MORE`) until removed
		const MULTI = (1 << 0);
		/// `IORING_POLL_UPDATE_EVENTS`: update the event mask of an
		/// armed poll identified via `addr`
		const UPDATE_EVENTS = (1 << 1);
		/// `IORING_POLL_UPDATE_USER_DATA`: update the user token of an
		/// armed poll
		const UPDATE_USER_DATA = (1 << 2);
		/// `IORING_POLL_ADD_LEVEL`: level triggered poll
		const ADD_LEVEL = (1 << 3);

		// don't truncate any bits
		#[doc(hidden)]
		const _ALL = !0;
	}
}

bitflags! {
	#[derive(Default)]
	pub struct TimeoutFlags: u32 {
		/// `IORING_TIMEOUT_ABS`: timespec is absolute
		const ABS = (1 << 0);
		/// `IORING_TIMEOUT_UPDATE`: update an armed timeout
		const UPDATE = (1 << 1);
		/// `IORING_TIMEOUT_BOOTTIME`: CLOCK_BOOTTIME
		const BOOTTIME = (1 << 2);
		/// `IORING_TIMEOUT_REALTIME`: CLOCK_REALTIME
		const REALTIME = (1 << 3);
		/// `IORING_LINK_TIMEOUT_UPDATE`: update a linked timeout
		const LINK_TIMEOUT_UPDATE = (1 << 4);
		/// `IORING_TIMEOUT_ETIME_SUCCESS`: expiration completes with 0
		/// instead of -ETIME
		const ETIME_SUCCESS = (1 << 5);
		/// `IORING_TIMEOUT_MULTISHOT`: repeating timeout
		const MULTISHOT = (1 << 6);

		// don't truncate any bits
		#[doc(hidden)]
		const _ALL = !0;
	}
}

bitflags! {
	/// subflags for `Operation::Accept`; stored in the priority slot
	#[derive(Default)]
	pub struct AcceptFlags: u16 {
		/// `IORING_ACCEPT_MULTISHOT`: keep accepting until cancelled or
		/// out of resources; completions carry `CompletionEntryFlags::MORE`
		const MULTISHOT = (1 << 0);

		// don't truncate any bits
		#[doc(hidden)]
		const _ALL = !0;
	}
}

bitflags! {
	/// subflags for `Operation::Send`/`Operation::Recv` and the zero-copy
	/// variants; stored in the priority slot
	#[derive(Default)]
	pub struct SendRecvFlags: u16 {
		/// `IORING_RECVSEND_POLL_FIRST`: arm poll before attempting the
		/// transfer
		const POLL_FIRST = (1 << 0);
		/// `IORING_RECV_MULTISHOT`: keep receiving until the buffer
		/// group runs dry or the request errors
		const RECV_MULTISHOT = (1 << 1);
		/// `IORING_RECVSEND_FIXED_BUF`: `addr` points into a registered
		/// fixed buffer (index in the buffer selector slot)
		const FIXED_BUF = (1 << 2);
		/// `IORING_SEND_ZC_REPORT_USAGE`: report whether the zero copy
		/// transmission actually avoided a copy
		const ZC_REPORT_USAGE = (1 << 3);

		// don't truncate any bits
		#[doc(hidden)]
		const _ALL = !0;
	}
}

bitflags! {
	#[derive(Default)]
	pub struct CancelFlags: u32 {
		/// `IORING_ASYNC_CANCEL_ALL`: cancel every request matching the
		/// criteria, not just the first
		const ALL = (1 << 0);
		/// `IORING_ASYNC_CANCEL_FD`: match on fd instead of user token
		const FD = (1 << 1);
		/// `IORING_ASYNC_CANCEL_ANY`: match any request
		const ANY = (1 << 2);
		/// `IORING_ASYNC_CANCEL_FD_FIXED`: fd is a fixed-file index
		const FD_FIXED = (1 << 3);

		// don't truncate any bits
		#[doc(hidden)]
		const _ALL = !0;
	}
}

bitflags! {
	#[derive(Default)]
	pub struct SpliceFlags: u32 {
		/// `SPLICE_F_FD_IN_FIXED`: splice_fd_in is a fixed-file index
		const FD_IN_FIXED = (1 << 31);

		// don't truncate any bits
		#[doc(hidden)]
		const _ALL = !0;
	}
}

/// `Operation::MsgRing` command selector, stored in the address slot
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct MsgRingCommand(pub u64);

impl MsgRingCommand {
	/// `IORING_MSG_DATA`: post a completion carrying data to the target ring
	pub const DATA: Self = Self(0);
	/// `IORING_MSG_SEND_FD`: pass a registered fd to the target ring
	pub const SEND_FD: Self = Self(1);
}

bitflags! {
	#[derive(Default)]
	pub struct MsgRingFlags: u32 {
		/// `IORING_MSG_RING_CQE_SKIP`: post no completion on the sending ring
		const CQE_SKIP = (1 << 0);
		/// `IORING_MSG_RING_FLAGS_PASS`: forward the flags in the offset
		/// slot into the target completion
		const FLAGS_PASS = (1 << 1);

		// don't truncate any bits
		#[doc(hidden)]
		const _ALL = !0;
	}
}

/// trailing 24 bytes of the 64 byte entry: buffer selector, personality,
/// secondary descriptor, third address
#[repr(C)]
#[derive(Clone, Copy)]
pub struct SubmissionEntryExtraData {
	pub buf: SubmissionEntryBufferSelector,
	/// personality id from `RegisterOpCode::REGISTER_PERSONALITY`; 0 for
	/// the submitting task's credentials
	pub personality: u16,
	pub target: SubmissionEntrySecondaryDescriptor,
	pub addr3: u64,
	_pad: u64,
}

impl fmt::Debug for SubmissionEntryExtraData {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		f.debug_struct("SubmissionEntryExtraData")
			.field("buf", unsafe { &self.buf.buf_index })
			.field("personality", &self.personality)
			.field("target", unsafe { &self.target.splice_fd_in })
			.field("addr3", &self.addr3)
			.finish()
	}
}

/// `buf_index`/`buf_group` slot
#[repr(C)]
#[derive(Clone, Copy)]
pub union SubmissionEntryBufferSelector {
	/// index into the registered fixed buffers (read/write fixed)
	pub buf_index: u16,
	/// buffer group for `SubmissionEntryFlags::BUFFER_SELECT`
	pub buf_group: u16,
}

/// `splice_fd_in`/`file_index` slot
#[repr(C)]
#[derive(Clone, Copy)]
pub union SubmissionEntrySecondaryDescriptor {
	/// input descriptor for splice/tee
	pub splice_fd_in: i32,
	/// 1-based fixed-file slot for ops installing a descriptor
	/// (accept/openat/socket); 0 means "allocate a normal fd"
	pub file_index: u32,
}

/// C: `struct io_uring_cqe`
#[repr(C)]
#[derive(Clone, Copy, Default, Debug)]
pub struct CompletionEntry {
	pub user_data: u64,
	pub res: i32,
	pub flags: CompletionEntryFlags,
}

bitflags! {
	#[derive(Default)]
	pub struct CompletionEntryFlags: u32 {
		/// `IORING_CQE_F_BUFFER`: upper 16 bits carry the selected buffer id
		const BUFFER = (1 << 0);
		/// `IORING_CQE_F_MORE`: more completions will follow from the
		/// same submission (multishot)
		const MORE = (1 << 1);
		/// `IORING_CQE_F_SOCK_NONEMPTY`: socket still holds unread data
		const SOCK_NONEMPTY = (1 << 2);
		/// `IORING_CQE_F_NOTIF`: zero-copy send notification, not a
		/// transfer result
		const NOTIF = (1 << 3);

		// don't truncate any bits
		#[doc(hidden)]
		const _ALL = !0;
	}
}

impl CompletionEntry {
	/// `IORING_CQE_BUFFER_SHIFT`
	pub const BUFFER_SHIFT: u32 = 16;

	/// selected buffer id when `CompletionEntryFlags::BUFFER` is set
	pub fn buffer_id(&self) -> Option<u16> {
		if self.flags.contains(CompletionEntryFlags::BUFFER) {
			Some((self.flags.bits() >> Self::BUFFER_SHIFT) as u16)
		} else {
			None
		}
	}
}

/// C: `struct __kernel_timespec`
#[repr(C)]
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub struct Timespec {
	pub tv_sec: i64,
	pub tv_nsec: i64,
}

impl Timespec {
	pub const fn new(tv_sec: i64, tv_nsec: i64) -> Self {
		Self { tv_sec, tv_nsec }
	}
}

impl From<Duration> for Timespec {
	fn from(d: Duration) -> Self {
		Self {
			tv_sec: d.as_secs() as i64,
			tv_nsec: d.subsec_nanos() as i64,
		}
	}
}

/// Extended argument for io_uring_enter(2) with `EnterFlags::EXT_ARG`;
/// lets a wait carry both a signal mask and a timeout in one syscall.
///
/// C: `struct io_uring_getevents_arg`
#[repr(C)]
#[derive(Clone, Copy, Default, Debug)]
pub struct GetEventsArg {
	/// userspace address of a `sigset_t`, or 0
	pub sigmask: u64,
	pub sigmask_sz: u32,
	pub pad: u32,
	/// userspace address of a `Timespec`, or 0
	pub ts: u64,
}

/// Header of the opcode-support probe filled by
/// `RegisterOpCode::REGISTER_PROBE`.
///
/// C: `struct io_uring_probe`
#[repr(C)]
#[derive(Clone, Copy, Default, Debug)]
pub struct ProbeHeader {
	/// last opcode supported by the running kernel
	pub last_op: u8,
	/// number of `ProbeOp` entries the kernel filled in
	pub ops_len: u8,
	_resv: u16,
	_resv2: [u32; 3],
}

/// C: `struct io_uring_probe_op`
#[repr(C)]
#[derive(Clone, Copy, Default, Debug)]
pub struct ProbeOp {
	pub op: u8,
	_resv: u8,
	pub flags: u16,
	_resv2: u32,
}

impl ProbeOp {
	/// `IO_URING_OP_SUPPORTED`
	pub const SUPPORTED: u16 = 1 << 0;
}

/// C: `struct io_uring_files_update`
#[repr(C)]
#[derive(Clone, Copy, Default, Debug)]
pub struct FilesUpdate {
	pub offset: u32,
	_resv: u32,
	/// userspace address of an `[i32]` of descriptors (-1 for sparse slots)
	pub fds: u64,
}

impl FilesUpdate {
	pub fn new(offset: u32, fds: *const i32) -> Self {
		Self {
			offset,
			_resv: 0,
			fds: fds as usize as u64,
		}
	}
}

/// C: `struct open_how` (openat2)
#[repr(C)]
#[derive(Clone, Copy, Default, Debug)]
pub struct OpenHow {
	pub flags: u64,
	pub mode: u64,
	pub resolve: u64,
}

#[cfg(test)]
mod tests {
	use super::*;

	fn offset_of<T, U>(base: &T, field: &U) -> usize {
		field as *const U as usize - base as *const T as usize
	}

	#[test]
	fn submission_entry_slot_offsets() {
		let e: SubmissionEntry = unsafe { core::mem::zeroed() };
		assert_eq!(offset_of(&e, &e.opcode), 0);
		assert_eq!(offset_of(&e, &e.flags), 1);
		assert_eq!(offset_of(&e, &e.ioprio), 2);
		assert_eq!(offset_of(&e, &e.fd), 4);
		assert_eq!(offset_of(&e, &e.off), 8);
		assert_eq!(offset_of(&e, &e.addr), 16);
		assert_eq!(offset_of(&e, &e.len), 24);
		assert_eq!(offset_of(&e, &e.op_flags), 28);
		assert_eq!(offset_of(&e, &e.user_data), 32);
		assert_eq!(offset_of(&e, &e.extra), 40);
		assert_eq!(offset_of(&e, unsafe { &e.extra.buf.buf_index }), 40);
		assert_eq!(offset_of(&e, &e.extra.personality), 42);
		assert_eq!(offset_of(&e, unsafe { &e.extra.target.splice_fd_in }), 44);
		assert_eq!(offset_of(&e, &e.extra.addr3), 48);
	}

	#[test]
	fn completion_entry_slot_offsets() {
		let e = CompletionEntry::default();
		assert_eq!(offset_of(&e, &e.user_data), 0);
		assert_eq!(offset_of(&e, &e.res), 8);
		assert_eq!(offset_of(&e, &e.flags), 12);
	}

	#[test]
	fn setup_parameters_slot_offsets() {
		let p = SetupParameters::default();
		assert_eq!(offset_of(&p, &p.sq_entries), 0);
		assert_eq!(offset_of(&p, &p.cq_entries), 4);
		assert_eq!(offset_of(&p, &p.flags), 8);
		assert_eq!(offset_of(&p, &p.features), 20);
		assert_eq!(offset_of(&p, &p.wq_fd), 24);
		assert_eq!(offset_of(&p, &p.sq_off), 40);
		assert_eq!(offset_of(&p, &p.cq_off), 80);
	}

	#[test]
	fn opcode_round_trip() {
		for raw in 0u8..=48 {
			let op = RawOperation(raw).decode();
			assert_eq!(op.map(|op| op as u8), Some(raw));
		}
		assert_eq!(RawOperation(49).decode(), None);
		assert_eq!(RawOperation(255).decode(), None);
	}

	#[test]
	fn timespec_from_duration() {
		let ts = Timespec::from(Duration::from_millis(1500));
		assert_eq!(ts, Timespec::new(1, 500_000_000));
		assert_eq!(Timespec::from(Duration::from_secs(0)), Timespec::new(0, 0));
	}

	#[test]
	fn io_priority_encoding_round_trip() {
		let cases = [
			IoPriority::None,
			IoPriority::Realtime(IoPriorityLevel::Level2),
			IoPriority::BestEffort(IoPriorityLevel::Level7),
			IoPriority::Idle,
		];
		for prio in cases.iter() {
			let encoded: EncodedIoPriority = (*prio).into();
			assert_eq!(IoPriority::try_from(encoded), Some(*prio));
		}
	}

	#[test]
	fn completion_buffer_id_extraction() {
		let entry = CompletionEntry {
			user_data: 1,
			res: 0,
			flags: CompletionEntryFlags::from_bits_truncate((3 << CompletionEntry::BUFFER_SHIFT) | CompletionEntryFlags::BUFFER.bits()),
		};
		assert_eq!(entry.buffer_id(), Some(3));
		assert_eq!(CompletionEntry::default().buffer_id(), None);
	}
}
