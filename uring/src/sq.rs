use std::sync::atomic::{
	Ordering,
	AtomicU32,
};

use uring_sys::{
	SubmissionEntry,
	SubmissionEntryFlags,
	SubmissionQueueRingOffsets,
};

use crate::error::{Error, Result};
use crate::mmap::MappedMemory;

// Producer half of the ring. Owned by the `Ring` behind its submission
// lock: reservation, entry population and tail publication all happen with
// the lock held. Only `tail` crosses the kernel boundary from here; `head`
// is written by the kernel as it consumes entries.
pub(crate) struct SubmissionQueue {
	// `head` is controlled by kernel; read to tell whether the ring is full
	k_head: &'static AtomicU32,
	// `tail` is controlled by us; entries are staged past it and published
	// in one release store
	k_tail: &'static AtomicU32,

	// index array; one slot per ring entry, pointing into `sqes`
	k_array: *mut u32,

	// points to [SubmissionEntry; ring_entries]
	sqes: *mut SubmissionEntry,

	// `ring_mask` and `ring_entries` are const, so only read them once
	ring_mask: u32,
	ring_entries: u32,

	// reserved but not yet published entries; the kernel-visible tail
	// trails the logical tail by this many
	pending: u32,
}

unsafe impl Send for SubmissionQueue {}

impl SubmissionQueue {
	/// `ring` and `entries` must be the SQ ring / SQE array mappings the
	/// offsets belong to, and must outlive the queue.
	pub(crate) unsafe fn new(
		ring: &MappedMemory,
		entries: &MappedMemory,
		offsets: &SubmissionQueueRingOffsets,
		sq_entries: u32,
	) -> Self {
		let k_head: &AtomicU32 = &*ring.get_field(offsets.head);
		let k_tail: &AtomicU32 = &*ring.get_field(offsets.tail);
		let ring_mask = *ring.get_field::<u32>(offsets.ring_mask);
		let ring_entries = *ring.get_field::<u32>(offsets.ring_entries);
		let k_array: *mut u32 = ring.get_field(offsets.array);
		let sqes: *mut SubmissionEntry = entries.get_field(0);

		assert_eq!(sq_entries, ring_entries);
		assert!(ring_entries.is_power_of_two());
		assert_eq!(ring_mask, ring_entries - 1);

		// initialize index array to identity map: i -> i.
		for i in 0..ring_entries {
			*k_array.add(i as usize) = i;
		}

		SubmissionQueue {
			k_head,
			k_tail,
			k_array,
			sqes,
			ring_mask,
			ring_entries,
			pending: 0,
		}
	}

	pub(crate) fn capacity(&self) -> u32 {
		self.ring_entries
	}

	pub(crate) fn pending(&self) -> u32 {
		self.pending
	}

	/// entries that can still be reserved before the ring is full
	pub(crate) fn space_left(&self) -> u32 {
		let head = self.k_head.load(Ordering::Acquire);
		let tail = self.k_tail.load(Ordering::Relaxed);
		self.ring_entries - tail.wrapping_add(self.pending).wrapping_sub(head)
	}

	/// Reserve the next free entry: zero it, point the index array slot at
	/// it, and bump the pending count. The caller must fully populate the
	/// entry before the submission lock is released.
	pub(crate) fn reserve(&mut self) -> Result<&mut SubmissionEntry> {
		let head = self.k_head.load(Ordering::Acquire);
		let tail = self.k_tail.load(Ordering::Relaxed);
		if tail.wrapping_add(self.pending).wrapping_sub(head) >= self.ring_entries {
			return Err(Error::QueueFull);
		}
		let ndx = tail.wrapping_add(self.pending);
		let slot = (ndx & self.ring_mask) as usize;
		unsafe { *self.k_array.add(slot) = slot as u32 };
		let entry = unsafe { &mut *self.sqes.add(slot) };
		entry.clear();
		self.pending += 1;
		log::trace!("SQ reserved @{} (pending: {})", ndx, self.pending);
		Ok(entry)
	}

	/// the most recently reserved, still unpublished entry
	pub(crate) fn last_reserved(&mut self) -> Option<&mut SubmissionEntry> {
		if self.pending == 0 {
			return None;
		}
		let ndx = self.k_tail.load(Ordering::Relaxed).wrapping_add(self.pending - 1);
		Some(unsafe { &mut *self.sqes.add((ndx & self.ring_mask) as usize) })
	}

	/// OR flags into the most recently reserved entry
	pub(crate) fn flag_last_reserved(&mut self, flags: SubmissionEntryFlags) -> Result<()> {
		match self.last_reserved() {
			Some(entry) => {
				entry.flags |= flags;
				Ok(())
			}
			None => Err(Error::KernelError(libc::EINVAL)),
		}
	}

	/// Publish all pending entries: advance the kernel-visible tail past
	/// them in one release store, so the kernel observes the entry and
	/// index writes first. Returns how many were published.
	pub(crate) fn publish(&mut self) -> u32 {
		if self.pending == 0 {
			return 0;
		}
		let tail = self.k_tail.load(Ordering::Relaxed).wrapping_add(self.pending);
		self.k_tail.store(tail, Ordering::Release);
		let published = self.pending;
		self.pending = 0;
		log::trace!("SQ updating tail: {}", tail);
		published
	}
}
