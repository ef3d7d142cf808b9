use std::sync::atomic::{
	Ordering,
	AtomicU32,
};

use uring_sys::{
	CompletionEntry,
	CompletionEntryFlags,
	CompletionQueueFlags,
	CompletionQueueRingOffsets,
};

use crate::error::{Error, Result};
use crate::mmap::MappedMemory;

/// One reaped completion: the user token passed at submission, the signed
/// result, and the completion flag word.
#[derive(Clone, Copy, Debug)]
pub struct Completion {
	pub user_data: u64,
	pub res: i32,
	pub flags: CompletionEntryFlags,
}

impl Completion {
	/// the raw signed result: a payload (bytes transferred, fd, poll
	/// mask, ...) when non-negative, a negated error number otherwise
	pub fn result(&self) -> i32 {
		self.res
	}

	/// The result converted on request: any negative result becomes
	/// `Error::KernelError` carrying the raw error number.
	///
	/// No number is special-cased here. A timeout operation expiring
	/// with -ETIME stays `KernelError(ETIME)`; `TimeExpired` and
	/// `Interrupted` are reserved for the wait syscalls themselves.
	pub fn ok(&self) -> Result<u32> {
		if self.res < 0 {
			Err(Error::KernelError(-self.res))
		} else {
			Ok(self.res as u32)
		}
	}

	/// more completions from the same (multishot) submission will follow
	pub fn more(&self) -> bool {
		self.flags.contains(CompletionEntryFlags::MORE)
	}

	/// this is a zero-copy notification, not a transfer result
	pub fn notification(&self) -> bool {
		self.flags.contains(CompletionEntryFlags::NOTIF)
	}

	/// selected buffer id, for buffer-select submissions
	pub fn buffer_id(&self) -> Option<u16> {
		if self.flags.contains(CompletionEntryFlags::BUFFER) {
			Some((self.flags.bits() >> CompletionEntry::BUFFER_SHIFT) as u16)
		} else {
			None
		}
	}
}

impl From<CompletionEntry> for Completion {
	fn from(e: CompletionEntry) -> Self {
		Completion {
			user_data: e.user_data,
			res: e.res,
			flags: e.flags,
		}
	}
}

// Consumer half of the ring. The kernel produces entries and publishes
// them with a release store of `tail`; we read `tail` with acquire before
// touching an entry and release `head` to hand slots back.
//
// No locking here: concurrent consumers are allowed only when the
// application serializes them externally.
pub(crate) struct CompletionQueue {
	// `head` is controlled by us; advanced after entries were consumed
	k_head: &'static AtomicU32,
	// `tail` is controlled by kernel
	k_tail: &'static AtomicU32,
	k_flags: &'static AtomicU32,
	// incremented by the kernel when a completion could not be queued
	k_overflow: &'static AtomicU32,
	cqes: *const CompletionEntry,
	ring_mask: u32,
	ring_entries: u32,
}

unsafe impl Send for CompletionQueue {}
unsafe impl Sync for CompletionQueue {}

impl CompletionQueue {
	/// `ring` must be the CQ ring mapping the offsets belong to (possibly
	/// aliasing the SQ mapping), and must outlive the queue.
	pub(crate) unsafe fn new(
		ring: &MappedMemory,
		offsets: &CompletionQueueRingOffsets,
		cq_entries: u32,
	) -> Self {
		let k_head: &AtomicU32 = &*ring.get_field(offsets.head);
		let k_tail: &AtomicU32 = &*ring.get_field(offsets.tail);
		let ring_mask = *ring.get_field::<u32>(offsets.ring_mask);
		let ring_entries = *ring.get_field::<u32>(offsets.ring_entries);
		let k_flags: &AtomicU32 = &*ring.get_field(offsets.flags);
		let k_overflow: &AtomicU32 = &*ring.get_field(offsets.overflow);
		let cqes: *const CompletionEntry = ring.get_field(offsets.cqes);

		assert_eq!(cq_entries, ring_entries);
		assert!(ring_entries.is_power_of_two());
		assert_eq!(ring_mask, ring_entries - 1);

		CompletionQueue {
			k_head,
			k_tail,
			k_flags,
			k_overflow,
			cqes,
			ring_mask,
			ring_entries,
		}
	}

	pub(crate) fn capacity(&self) -> u32 {
		self.ring_entries
	}

	/// completions currently available for consumption
	pub(crate) fn available(&self) -> u32 {
		let tail = self.k_tail.load(Ordering::Acquire);
		let head = self.k_head.load(Ordering::Relaxed);
		tail.wrapping_sub(head)
	}

	fn entry_at(&self, ndx: u32) -> Completion {
		let entry = unsafe { *self.cqes.add((ndx & self.ring_mask) as usize) };
		Completion::from(entry)
	}

	/// the completion at the head, without releasing its slot
	pub(crate) fn peek(&self) -> Option<Completion> {
		let tail = self.k_tail.load(Ordering::Acquire);
		let head = self.k_head.load(Ordering::Relaxed);
		if head == tail {
			return None;
		}
		Some(self.entry_at(head))
	}

	/// release `n` consumed slots back to the kernel; `n` must not exceed
	/// `available()`
	pub(crate) fn advance(&self, n: u32) {
		if n == 0 {
			return;
		}
		debug_assert!(n <= self.available());
		let head = self.k_head.load(Ordering::Relaxed).wrapping_add(n);
		self.k_head.store(head, Ordering::Release);
		log::trace!("CQ updating head: {}", head);
	}

	/// Visit the available completions in order until `f` rejects one;
	/// slots of accepted entries are released. Returns the accepted count.
	pub(crate) fn for_each<F>(&self, mut f: F) -> u32
	where
		F: FnMut(Completion) -> bool,
	{
		let tail = self.k_tail.load(Ordering::Acquire);
		let mut head = self.k_head.load(Ordering::Relaxed);
		let mut accepted = 0;
		while head != tail {
			let item = self.entry_at(head);
			log::debug!("Completed: @{} -> {:?}", head, item);
			if !f(item) {
				break;
			}
			head = head.wrapping_add(1);
			accepted += 1;
		}
		if accepted > 0 {
			self.k_head.store(head, Ordering::Release);
		}
		accepted
	}

	/// release every available completion without inspection
	pub(crate) fn drain(&self) -> u32 {
		let tail = self.k_tail.load(Ordering::Acquire);
		let head = self.k_head.load(Ordering::Relaxed);
		let n = tail.wrapping_sub(head);
		if n > 0 {
			self.k_head.store(tail, Ordering::Release);
		}
		n
	}

	pub(crate) fn flags(&self) -> CompletionQueueFlags {
		CompletionQueueFlags::from_bits_truncate(self.k_flags.load(Ordering::Relaxed))
	}

	pub(crate) fn overflow(&self) -> u32 {
		self.k_overflow.load(Ordering::Relaxed)
	}
}
