// Per-opcode staging shims. Every helper takes the submission lock,
// reserves a zeroed entry, writes only the slots its opcode needs plus the
// caller's user token, and releases the lock. None of them enter the
// kernel; call `Ring::submit` for that.
//
// Pointer arguments refer to caller-owned memory that must stay valid and
// in place until the matching completion was observed; the ring passes
// addresses through unchanged and pins nothing.

use uring_sys::{
	CancelFlags,
	FileDescriptor,
	FsyncFlags,
	IoPriority,
	MsgRingFlags,
	OpenHow,
	PollFlags,
	ReadWriteFlags,
	SendRecvFlags,
	SpliceFlags,
	Timespec,
	TimeoutFlags,
};

use crate::error::Result;
use crate::ring::Ring;

impl Ring {
	pub fn prep_nop(&self, user_data: u64) -> Result<()> {
		self.with_sqe(user_data, |sqe| sqe.nop())
	}

	// iov needs to live until operation is completed!
	pub unsafe fn prep_readv(&self, fd: FileDescriptor, iov: *const [libc::iovec], offset: u64, user_data: u64) -> Result<()> {
		if (&*iov).is_empty() {
			return Ok(());
		}
		self.with_sqe(user_data, |sqe| unsafe {
			sqe.readv(IoPriority::None, fd, offset, ReadWriteFlags::default(), iov)
		})
	}

	// iov needs to live until operation is completed!
	pub unsafe fn prep_writev(&self, fd: FileDescriptor, iov: *const [libc::iovec], offset: u64, user_data: u64) -> Result<()> {
		if (&*iov).is_empty() {
			return Ok(());
		}
		self.with_sqe(user_data, |sqe| unsafe {
			sqe.writev(IoPriority::None, fd, offset, ReadWriteFlags::default(), iov)
		})
	}

	/// Stage a read into `buf` at `offset`.
	///
	/// An empty buffer is a successful no-op that consumes no entry and
	/// produces no completion.
	///
	/// unsafe: `buf` must stay valid and in place until the completion
	/// was observed.
	pub unsafe fn prep_read(&self, fd: FileDescriptor, buf: *mut [u8], offset: u64, user_data: u64) -> Result<()> {
		if (&*buf).is_empty() {
			return Ok(());
		}
		self.with_sqe(user_data, |sqe| unsafe {
			sqe.read(IoPriority::None, fd, offset, ReadWriteFlags::default(), buf)
		})
	}

	/// Stage a write of `buf` at `offset`; empty buffers are a no-op as
	/// with [`prep_read`](Self::prep_read).
	///
	/// unsafe: `buf` must stay valid until the completion was observed.
	pub unsafe fn prep_write(&self, fd: FileDescriptor, buf: *const [u8], offset: u64, user_data: u64) -> Result<()> {
		if (&*buf).is_empty() {
			return Ok(());
		}
		self.with_sqe(user_data, |sqe| unsafe {
			sqe.write(IoPriority::None, fd, offset, ReadWriteFlags::default(), buf)
		})
	}

	// buf must be a sub-slice of the buffer registered at the given index
	pub unsafe fn prep_read_fixed(&self, fd: FileDescriptor, buf: *mut [u8], offset: u64, buf_index: u16, user_data: u64) -> Result<()> {
		if (&*buf).is_empty() {
			return Ok(());
		}
		self.with_sqe(user_data, |sqe| unsafe {
			sqe.read_fixed(IoPriority::None, fd, offset, ReadWriteFlags::default(), buf_index, buf)
		})
	}

	// buf must be a sub-slice of the buffer registered at the given index
	pub unsafe fn prep_write_fixed(&self, fd: FileDescriptor, buf: *const [u8], offset: u64, buf_index: u16, user_data: u64) -> Result<()> {
		if (&*buf).is_empty() {
			return Ok(());
		}
		self.with_sqe(user_data, |sqe| unsafe {
			sqe.write_fixed(IoPriority::None, fd, offset, ReadWriteFlags::default(), buf_index, buf)
		})
	}

	pub fn prep_fsync(&self, fd: FileDescriptor, flags: FsyncFlags, user_data: u64) -> Result<()> {
		self.with_sqe(user_data, |sqe| sqe.fsync_full(fd, flags))
	}

	pub fn prep_sync_file_range(&self, fd: FileDescriptor, offset: u64, len: u32, flags: u32, user_data: u64) -> Result<()> {
		self.with_sqe(user_data, |sqe| sqe.sync_file_range(fd, offset, len, flags))
	}

	/// one-shot poll; the completion result carries the ready event mask
	pub fn prep_poll_add(&self, fd: FileDescriptor, events: PollFlags, user_data: u64) -> Result<()> {
		self.with_sqe(user_data, |sqe| sqe.poll_add(fd, events))
	}

	/// poll that keeps posting completions (flagged MORE) until removed
	pub fn prep_poll_multishot(&self, fd: FileDescriptor, events: PollFlags, user_data: u64) -> Result<()> {
		self.with_sqe(user_data, |sqe| sqe.poll_multishot(fd, events))
	}

	pub fn prep_poll_remove(&self, target_user_data: u64, user_data: u64) -> Result<()> {
		self.with_sqe(user_data, |sqe| sqe.poll_remove(target_user_data))
	}

	// msg needs to live until operation is completed!
	pub unsafe fn prep_sendmsg(&self, fd: FileDescriptor, msg: *const libc::msghdr, flags: u32, user_data: u64) -> Result<()> {
		self.with_sqe(user_data, |sqe| unsafe { sqe.sendmsg(fd, msg, flags) })
	}

	// msg needs to live until operation is completed!
	pub unsafe fn prep_recvmsg(&self, fd: FileDescriptor, msg: *mut libc::msghdr, flags: u32, user_data: u64) -> Result<()> {
		self.with_sqe(user_data, |sqe| unsafe { sqe.recvmsg(fd, msg, flags) })
	}

	pub unsafe fn prep_recvmsg_multishot(&self, fd: FileDescriptor, msg: *mut libc::msghdr, flags: u32, user_data: u64) -> Result<()> {
		self.with_sqe(user_data, |sqe| unsafe { sqe.recvmsg_multishot(fd, msg, flags) })
	}

	// buf needs to live until operation is completed!
	pub unsafe fn prep_send(&self, fd: FileDescriptor, buf: *const [u8], flags: u32, user_data: u64) -> Result<()> {
		if (&*buf).is_empty() {
			return Ok(());
		}
		self.with_sqe(user_data, |sqe| unsafe { sqe.send(fd, buf, flags) })
	}

	// buf needs to live until the zero-copy notification arrives!
	pub unsafe fn prep_send_zc(&self, fd: FileDescriptor, buf: *const [u8], flags: u32, zc_flags: SendRecvFlags, user_data: u64) -> Result<()> {
		if (&*buf).is_empty() {
			return Ok(());
		}
		self.with_sqe(user_data, |sqe| unsafe { sqe.send_zc(fd, buf, flags, zc_flags) })
	}

	// buf needs to live until operation is completed!
	pub unsafe fn prep_recv(&self, fd: FileDescriptor, buf: *mut [u8], flags: u32, user_data: u64) -> Result<()> {
		if (&*buf).is_empty() {
			return Ok(());
		}
		self.with_sqe(user_data, |sqe| unsafe { sqe.recv(fd, buf, flags) })
	}

	pub unsafe fn prep_recv_multishot(&self, fd: FileDescriptor, buf: *mut [u8], flags: u32, user_data: u64) -> Result<()> {
		if (&*buf).is_empty() {
			return Ok(());
		}
		self.with_sqe(user_data, |sqe| unsafe { sqe.recv_multishot(fd, buf, flags) })
	}

	/// Stage a timeout: completes with -ETIME after `ts`, or with 0 once
	/// `count` other completions arrived.
	///
	/// unsafe: `ts` must stay valid until the timeout fires or is removed.
	pub unsafe fn prep_timeout(&self, ts: *const Timespec, count: u32, flags: TimeoutFlags, user_data: u64) -> Result<()> {
		self.with_sqe(user_data, |sqe| unsafe { sqe.timeout(ts, count, flags) })
	}

	pub fn prep_timeout_remove(&self, target_user_data: u64, flags: TimeoutFlags, user_data: u64) -> Result<()> {
		self.with_sqe(user_data, |sqe| sqe.timeout_remove(target_user_data, flags))
	}

	// ts needs to live until the linked operation completes!
	pub unsafe fn prep_link_timeout(&self, ts: *const Timespec, flags: TimeoutFlags, user_data: u64) -> Result<()> {
		self.with_sqe(user_data, |sqe| unsafe { sqe.link_timeout(ts, flags) })
	}

	// addr/addrlen need to live until operation is completed! (both may be null)
	pub unsafe fn prep_accept(&self, fd: FileDescriptor, addr: *mut libc::sockaddr, addrlen: *mut libc::socklen_t, flags: u32, user_data: u64) -> Result<()> {
		self.with_sqe(user_data, |sqe| unsafe { sqe.accept(fd, addr, addrlen, flags) })
	}

	pub unsafe fn prep_accept_multishot(&self, fd: FileDescriptor, addr: *mut libc::sockaddr, addrlen: *mut libc::socklen_t, flags: u32, user_data: u64) -> Result<()> {
		self.with_sqe(user_data, |sqe| unsafe { sqe.accept_multishot(fd, addr, addrlen, flags) })
	}

	/// Stage a cancellation of the in-flight submission carrying
	/// `target_user_data`. Both the cancel attempt and (if caught) the
	/// target produce completions.
	pub fn prep_cancel(&self, target_user_data: u64, flags: CancelFlags, user_data: u64) -> Result<()> {
		self.with_sqe(user_data, |sqe| sqe.async_cancel(target_user_data, flags))
	}

	pub fn prep_cancel_fd(&self, fd: FileDescriptor, flags: CancelFlags, user_data: u64) -> Result<()> {
		self.with_sqe(user_data, |sqe| sqe.async_cancel_fd(fd, flags))
	}

	// addr needs to live until operation is completed!
	pub unsafe fn prep_connect(&self, fd: FileDescriptor, addr: *const libc::sockaddr, addrlen: libc::socklen_t, user_data: u64) -> Result<()> {
		self.with_sqe(user_data, |sqe| unsafe { sqe.connect(fd, addr, addrlen) })
	}

	pub fn prep_fallocate(&self, fd: FileDescriptor, offset: u64, len: u64, mode: i32, user_data: u64) -> Result<()> {
		self.with_sqe(user_data, |sqe| sqe.fallocate(fd, offset, len, mode))
	}

	// path needs to live until operation is completed!
	pub unsafe fn prep_openat(&self, dirfd: i32, path: *const libc::c_char, flags: i32, mode: libc::mode_t, user_data: u64) -> Result<()> {
		self.with_sqe(user_data, |sqe| unsafe { sqe.openat(dirfd, path, flags, mode) })
	}

	// path and how need to live until operation is completed!
	pub unsafe fn prep_openat2(&self, dirfd: i32, path: *const libc::c_char, how: *const OpenHow, user_data: u64) -> Result<()> {
		self.with_sqe(user_data, |sqe| unsafe { sqe.openat2(dirfd, path, how) })
	}

	pub fn prep_close(&self, fd: i32, user_data: u64) -> Result<()> {
		self.with_sqe(user_data, |sqe| sqe.close(fd))
	}

	pub fn prep_close_fixed(&self, index: u32, user_data: u64) -> Result<()> {
		self.with_sqe(user_data, |sqe| sqe.close_fixed(index))
	}

	// fds needs to live until operation is completed!
	pub unsafe fn prep_files_update(&self, fds: *const [i32], offset: u64, user_data: u64) -> Result<()> {
		self.with_sqe(user_data, |sqe| unsafe { sqe.files_update(fds, offset) })
	}

	// path and statxbuf need to live until operation is completed!
	pub unsafe fn prep_statx(&self, dirfd: i32, path: *const libc::c_char, flags: i32, mask: u32, statxbuf: *mut libc::c_void, user_data: u64) -> Result<()> {
		self.with_sqe(user_data, |sqe| unsafe { sqe.statx(dirfd, path, flags, mask, statxbuf) })
	}

	pub fn prep_fadvise(&self, fd: FileDescriptor, offset: u64, len: u32, advice: i32, user_data: u64) -> Result<()> {
		self.with_sqe(user_data, |sqe| sqe.fadvise(fd, offset, len, advice))
	}

	pub unsafe fn prep_madvise(&self, addr: *const libc::c_void, len: u32, advice: i32, user_data: u64) -> Result<()> {
		self.with_sqe(user_data, |sqe| unsafe { sqe.madvise(addr, len, advice) })
	}

	// event needs to live until operation is completed!
	pub unsafe fn prep_epoll_ctl(&self, epfd: FileDescriptor, fd: i32, op: i32, event: *mut libc::epoll_event, user_data: u64) -> Result<()> {
		self.with_sqe(user_data, |sqe| unsafe { sqe.epoll_ctl(epfd, fd, op, event) })
	}

	/// offsets of -1 mean "use the current file position"
	pub fn prep_splice(&self, fd_in: FileDescriptor, off_in: i64, fd_out: FileDescriptor, off_out: i64, len: u32, flags: SpliceFlags, user_data: u64) -> Result<()> {
		self.with_sqe(user_data, |sqe| sqe.splice(fd_in, off_in, fd_out, off_out, len, flags))
	}

	pub fn prep_tee(&self, fd_in: FileDescriptor, fd_out: FileDescriptor, len: u32, flags: SpliceFlags, user_data: u64) -> Result<()> {
		self.with_sqe(user_data, |sqe| sqe.tee(fd_in, fd_out, len, flags))
	}

	// the buffer area needs to live until the buffers are consumed or removed!
	pub unsafe fn prep_provide_buffers(&self, addr: *mut u8, len: u32, nbufs: u16, bgid: u16, bid: u16, user_data: u64) -> Result<()> {
		self.with_sqe(user_data, |sqe| unsafe { sqe.provide_buffers(addr, len, nbufs, bgid, bid) })
	}

	pub fn prep_remove_buffers(&self, nbufs: u16, bgid: u16, user_data: u64) -> Result<()> {
		self.with_sqe(user_data, |sqe| sqe.remove_buffers(nbufs, bgid))
	}

	pub fn prep_shutdown(&self, fd: FileDescriptor, how: i32, user_data: u64) -> Result<()> {
		self.with_sqe(user_data, |sqe| sqe.shutdown(fd, how))
	}

	// both paths need to live until operation is completed!
	pub unsafe fn prep_renameat(&self, olddirfd: i32, oldpath: *const libc::c_char, newdirfd: i32, newpath: *const libc::c_char, flags: u32, user_data: u64) -> Result<()> {
		self.with_sqe(user_data, |sqe| unsafe { sqe.renameat(olddirfd, oldpath, newdirfd, newpath, flags) })
	}

	// path needs to live until operation is completed!
	pub unsafe fn prep_unlinkat(&self, dirfd: i32, path: *const libc::c_char, flags: i32, user_data: u64) -> Result<()> {
		self.with_sqe(user_data, |sqe| unsafe { sqe.unlinkat(dirfd, path, flags) })
	}

	// path needs to live until operation is completed!
	pub unsafe fn prep_mkdirat(&self, dirfd: i32, path: *const libc::c_char, mode: libc::mode_t, user_data: u64) -> Result<()> {
		self.with_sqe(user_data, |sqe| unsafe { sqe.mkdirat(dirfd, path, mode) })
	}

	// both paths need to live until operation is completed!
	pub unsafe fn prep_symlinkat(&self, target: *const libc::c_char, newdirfd: i32, linkpath: *const libc::c_char, user_data: u64) -> Result<()> {
		self.with_sqe(user_data, |sqe| unsafe { sqe.symlinkat(target, newdirfd, linkpath) })
	}

	// both paths need to live until operation is completed!
	pub unsafe fn prep_linkat(&self, olddirfd: i32, oldpath: *const libc::c_char, newdirfd: i32, newpath: *const libc::c_char, flags: i32, user_data: u64) -> Result<()> {
		self.with_sqe(user_data, |sqe| unsafe { sqe.linkat(olddirfd, oldpath, newdirfd, newpath, flags) })
	}

	/// post a completion with result `len` and token `data` on another ring
	pub fn prep_msg_ring(&self, ring_fd: i32, len: u32, data: u64, flags: MsgRingFlags, user_data: u64) -> Result<()> {
		self.with_sqe(user_data, |sqe| sqe.msg_ring(ring_fd, len, data, flags))
	}

	pub fn prep_socket(&self, domain: i32, socket_type: i32, protocol: i32, flags: u32, user_data: u64) -> Result<()> {
		self.with_sqe(user_data, |sqe| sqe.socket(domain, socket_type, protocol, flags))
	}
}

#[cfg(test)]
mod tests {
	use std::mem;

	use uring_sys::*;

	fn zeroed_entry() -> SubmissionEntry {
		unsafe { mem::zeroed() }
	}

	#[test]
	fn read_fills_documented_slots() {
		let mut buf = [0u8; 64];
		let mut sqe = zeroed_entry();
		unsafe {
			sqe.read(IoPriority::None, FileDescriptor::FD(5), 32, ReadWriteFlags::default(), &mut buf[..]);
		}
		assert_eq!(sqe.opcode.decode(), Some(Operation::Read));
		assert_eq!(sqe.fd, 5);
		assert_eq!(unsafe { sqe.off.off }, 32);
		assert_eq!(unsafe { sqe.addr.addr }, buf.as_ptr() as usize as u64);
		assert_eq!(sqe.len, 64);
		assert!(sqe.flags.is_empty());
	}

	#[test]
	fn fixed_file_target_sets_flag() {
		let mut buf = [0u8; 16];
		let mut sqe = zeroed_entry();
		unsafe {
			sqe.write(IoPriority::None, FileDescriptor::Fixed(3), 0, ReadWriteFlags::default(), &buf[..]);
		}
		assert_eq!(sqe.fd, 3);
		assert!(sqe.flags.contains(SubmissionEntryFlags::FIXED_FILE));
	}

	#[test]
	fn fixed_io_records_buffer_index() {
		let mut buf = [0u8; 16];
		let mut sqe = zeroed_entry();
		unsafe {
			sqe.read_fixed(IoPriority::None, FileDescriptor::FD(1), 0, ReadWriteFlags::default(), 7, &mut buf[..]);
		}
		assert_eq!(sqe.opcode.decode(), Some(Operation::ReadFixed));
		assert_eq!(unsafe { sqe.extra.buf.buf_index }, 7);
	}

	#[test]
	fn timeout_carries_timespec_and_count() {
		let ts = Timespec::new(1, 500_000_000);
		let mut sqe = zeroed_entry();
		unsafe { sqe.timeout(&ts, 3, TimeoutFlags::default()) };
		assert_eq!(sqe.opcode.decode(), Some(Operation::Timeout));
		assert_eq!(unsafe { sqe.addr.addr }, &ts as *const Timespec as usize as u64);
		assert_eq!(sqe.len, 1);
		assert_eq!(unsafe { sqe.off.off }, 3);
	}

	#[test]
	fn cancel_targets_user_token() {
		let mut sqe = zeroed_entry();
		sqe.async_cancel(0xdead_beef, CancelFlags::default());
		assert_eq!(sqe.opcode.decode(), Some(Operation::AsyncCancel));
		assert_eq!(unsafe { sqe.addr.addr }, 0xdead_beef);
	}

	#[test]
	fn splice_splits_descriptors() {
		let mut sqe = zeroed_entry();
		sqe.splice(FileDescriptor::FD(3), -1, FileDescriptor::FD(4), 128, 512, SpliceFlags::default());
		assert_eq!(sqe.opcode.decode(), Some(Operation::Splice));
		assert_eq!(sqe.fd, 4);
		assert_eq!(unsafe { sqe.extra.target.splice_fd_in }, 3);
		assert_eq!(unsafe { sqe.off.off }, 128);
		assert_eq!(unsafe { sqe.addr.splice_off_in }, u64::max_value());
		assert_eq!(sqe.len, 512);
	}

	#[test]
	fn splice_fixed_input_sets_splice_flag() {
		let mut sqe = zeroed_entry();
		sqe.splice(FileDescriptor::Fixed(2), 0, FileDescriptor::FD(4), 0, 16, SpliceFlags::default());
		assert_eq!(unsafe { sqe.op_flags.splice_flags }, SpliceFlags::FD_IN_FIXED);
		// fixed input must not set the fixed-file entry flag (that is for fd)
		assert!(!sqe.flags.contains(SubmissionEntryFlags::FIXED_FILE));
	}

	#[test]
	fn multishot_variants_use_priority_slot() {
		let mut sqe = zeroed_entry();
		unsafe {
			sqe.accept_multishot(FileDescriptor::FD(6), core::ptr::null_mut(), core::ptr::null_mut(), 0);
		}
		assert_eq!(sqe.ioprio.0, AcceptFlags::MULTISHOT.bits());

		let mut buf = [0u8; 8];
		let mut sqe = zeroed_entry();
		unsafe { sqe.recv_multishot(FileDescriptor::FD(6), &mut buf[..], 0) };
		assert_eq!(sqe.ioprio.0, SendRecvFlags::RECV_MULTISHOT.bits());
	}

	#[test]
	fn poll_multishot_flags_len_slot() {
		let mut sqe = zeroed_entry();
		sqe.poll_multishot(FileDescriptor::FD(1), PollFlags::IN);
		assert_eq!(sqe.len, PollAddFlags::MULTI.bits());
		assert_eq!(unsafe { sqe.op_flags.poll32_events }, PollFlags::IN.bits() as u32);
	}

	#[test]
	fn msg_ring_carries_command_and_payload() {
		let mut sqe = zeroed_entry();
		sqe.msg_ring(9, 11, 0x77, MsgRingFlags::default());
		assert_eq!(sqe.fd, 9);
		assert_eq!(unsafe { sqe.addr.addr }, MsgRingCommand::DATA.0);
		assert_eq!(sqe.len, 11);
		assert_eq!(unsafe { sqe.off.off }, 0x77);
	}
}
