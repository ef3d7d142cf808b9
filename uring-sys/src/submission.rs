// additional code that makes it easier to handle submissions
//
// The fill helpers below assume the entry was zeroed beforehand (the ring
// clears each entry when it is reserved) and write only the slots their
// opcode uses.

use crate::*;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[repr(u8)]
pub enum IoPriorityLevel {
	Level0 = 0,
	Level1 = 1,
	Level2 = 2,
	Level3 = 3,
	Level4 = 4,
	Level5 = 5,
	Level6 = 6,
	Level7 = 7,
}

impl IoPriorityLevel {
	pub fn try_from(v: u8) -> Option<Self> {
		Some(match v {
			0 => IoPriorityLevel::Level0,
			1 => IoPriorityLevel::Level1,
			2 => IoPriorityLevel::Level2,
			3 => IoPriorityLevel::Level3,
			4 => IoPriorityLevel::Level4,
			5 => IoPriorityLevel::Level5,
			6 => IoPriorityLevel::Level6,
			7 => IoPriorityLevel::Level7,
			_ => return None,
		})
	}
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum IoPriority {
	None,
	Realtime(IoPriorityLevel),
	BestEffort(IoPriorityLevel),
	Idle,
}

impl IoPriority {
	pub fn try_from(e: EncodedIoPriority) -> Option<Self> {
		Some(match e.0 >> 13 {
			0 => IoPriority::None,
			1 => IoPriority::Realtime(IoPriorityLevel::try_from(e.0 as u8)?),
			2 => IoPriority::BestEffort(IoPriorityLevel::try_from(e.0 as u8)?),
			3 => IoPriority::Idle,
			_ => return None,
		})
	}
}

impl Default for IoPriority {
	fn default() -> Self {
		IoPriority::None
	}
}

impl Into<EncodedIoPriority> for IoPriority {
	fn into(self) -> EncodedIoPriority {
		EncodedIoPriority(match self {
			IoPriority::None => 0 << 13,
			IoPriority::Realtime(l) => (1 << 13) | ((l as u8) as u16),
			IoPriority::BestEffort(l) => (2 << 13) | ((l as u8) as u16),
			IoPriority::Idle => 3 << 13,
		})
	}
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum FileDescriptor {
	/// standard file descriptor
	FD(i32),
	/// index into previously registered list of fds
	Fixed(u32),
}

impl SubmissionEntry {
	pub fn clear(&mut self) {
		unsafe {
			*self = core::mem::zeroed();
		}
	}

	fn target(&mut self, op: Operation, fd: FileDescriptor) {
		self.opcode = op.into();
		match fd {
			FileDescriptor::FD(fd) => self.fd = fd,
			FileDescriptor::Fixed(ndx) => {
				self.flags |= SubmissionEntryFlags::FIXED_FILE;
				self.fd = ndx as i32;
			}
		}
	}

	// the common opcode/fd/addr/len/offset shape shared by most ops
	fn rw(&mut self, op: Operation, fd: FileDescriptor, addr: u64, len: u32, offset: u64) {
		self.target(op, fd);
		self.off = offset.into();
		self.addr = addr.into();
		self.len = len;
	}

	pub fn nop(&mut self) {
		self.opcode = Operation::Nop.into();
	}

	// iov needs to live until operation is completed! (as the kernel might submit the request "async")
	pub unsafe fn readv(&mut self, prio: IoPriority, fd: FileDescriptor, offset: u64, flags: ReadWriteFlags, iov: *const [libc::iovec]) {
		self.rw(Operation::Readv, fd, (*iov).as_ptr() as usize as u64, (&*iov).len() as u32, offset);
		self.ioprio = prio.into();
		self.op_flags = flags.into();
	}

	// iov needs to live until operation is completed! (as the kernel might submit the request "async")
	pub unsafe fn writev(&mut self, prio: IoPriority, fd: FileDescriptor, offset: u64, flags: ReadWriteFlags, iov: *const [libc::iovec]) {
		self.rw(Operation::Writev, fd, (*iov).as_ptr() as usize as u64, (&*iov).len() as u32, offset);
		self.ioprio = prio.into();
		self.op_flags = flags.into();
	}

	// buf needs to live until operation is completed!
	pub unsafe fn read(&mut self, prio: IoPriority, fd: FileDescriptor, offset: u64, flags: ReadWriteFlags, buf: *mut [u8]) {
		self.rw(Operation::Read, fd, (*buf).as_ptr() as usize as u64, (&*buf).len() as u32, offset);
		self.ioprio = prio.into();
		self.op_flags = flags.into();
	}

	// buf needs to live until operation is completed!
	pub unsafe fn write(&mut self, prio: IoPriority, fd: FileDescriptor, offset: u64, flags: ReadWriteFlags, buf: *const [u8]) {
		self.rw(Operation::Write, fd, (*buf).as_ptr() as usize as u64, (&*buf).len() as u32, offset);
		self.ioprio = prio.into();
		self.op_flags = flags.into();
	}

	// buf must be a sub-slice of the buffer registered at the given index
	pub unsafe fn read_fixed(&mut self, prio: IoPriority, fd: FileDescriptor, offset: u64, flags: ReadWriteFlags, buf_index: u16, buf: *mut [u8]) {
		self.rw(Operation::ReadFixed, fd, (*buf).as_ptr() as usize as u64, (&*buf).len() as u32, offset);
		self.ioprio = prio.into();
		self.op_flags = flags.into();
		self.extra.buf.buf_index = buf_index;
	}

	// buf must be a sub-slice of the buffer registered at the given index
	pub unsafe fn write_fixed(&mut self, prio: IoPriority, fd: FileDescriptor, offset: u64, flags: ReadWriteFlags, buf_index: u16, buf: *const [u8]) {
		self.rw(Operation::WriteFixed, fd, (*buf).as_ptr() as usize as u64, (&*buf).len() as u32, offset);
		self.ioprio = prio.into();
		self.op_flags = flags.into();
		self.extra.buf.buf_index = buf_index;
	}

	pub fn fsync_full(&mut self, fd: FileDescriptor, flags: FsyncFlags) {
		self.fsync(fd, flags, 0, 0);
	}

	// if offset + len == 0 it syncs until end of file
	pub fn fsync(&mut self, fd: FileDescriptor, flags: FsyncFlags, offset: u64, len: u32) {
		self.rw(Operation::Fsync, fd, 0, len, offset);
		self.op_flags = flags.into();
	}

	pub fn sync_file_range(&mut self, fd: FileDescriptor, offset: u64, len: u32, flags: u32) {
		self.rw(Operation::SyncFileRange, fd, 0, len, offset);
		self.op_flags = flags.into();
	}

	// The CQE `res` will contain the mask with "ready" event flags
	pub fn poll_add(&mut self, fd: FileDescriptor, events: PollFlags) {
		self.target(Operation::PollAdd, fd);
		self.op_flags = events.into();
	}

	// completions keep coming (flagged MORE) until the poll is removed
	pub fn poll_multishot(&mut self, fd: FileDescriptor, events: PollFlags) {
		self.poll_add(fd, events);
		self.len = PollAddFlags::MULTI.bits();
	}

	// the PollRemove operation will still complete (possibly with -ENOENT)
	pub fn poll_remove(&mut self, match_user_data: u64) {
		self.opcode = Operation::PollRemove.into();
		self.addr = match_user_data.into();
	}

	// msg needs to live until operation is completed!
	pub unsafe fn sendmsg(&mut self, fd: FileDescriptor, msg: *const libc::msghdr, flags: u32) {
		self.rw(Operation::SendMsg, fd, msg as usize as u64, 1, 0);
		self.op_flags = SubmissionEntryOperationFlags { msg_flags: flags };
	}

	// msg needs to live until operation is completed!
	pub unsafe fn recvmsg(&mut self, fd: FileDescriptor, msg: *mut libc::msghdr, flags: u32) {
		self.rw(Operation::RecvMsg, fd, msg as usize as u64, 1, 0);
		self.op_flags = SubmissionEntryOperationFlags { msg_flags: flags };
	}

	pub unsafe fn recvmsg_multishot(&mut self, fd: FileDescriptor, msg: *mut libc::msghdr, flags: u32) {
		self.recvmsg(fd, msg, flags);
		self.ioprio = EncodedIoPriority(SendRecvFlags::RECV_MULTISHOT.bits());
	}

	// buf needs to live until operation is completed!
	pub unsafe fn send(&mut self, fd: FileDescriptor, buf: *const [u8], flags: u32) {
		self.rw(Operation::Send, fd, (*buf).as_ptr() as usize as u64, (&*buf).len() as u32, 0);
		self.op_flags = SubmissionEntryOperationFlags { msg_flags: flags };
	}

	// buf needs to live until the zero-copy notification completion arrives,
	// not just until the transfer result!
	pub unsafe fn send_zc(&mut self, fd: FileDescriptor, buf: *const [u8], flags: u32, zc_flags: SendRecvFlags) {
		self.rw(Operation::SendZc, fd, (*buf).as_ptr() as usize as u64, (&*buf).len() as u32, 0);
		self.op_flags = SubmissionEntryOperationFlags { msg_flags: flags };
		self.ioprio = EncodedIoPriority(zc_flags.bits());
	}

	// buf needs to live until operation is completed!
	pub unsafe fn recv(&mut self, fd: FileDescriptor, buf: *mut [u8], flags: u32) {
		self.rw(Operation::Recv, fd, (*buf).as_ptr() as usize as u64, (&*buf).len() as u32, 0);
		self.op_flags = SubmissionEntryOperationFlags { msg_flags: flags };
	}

	pub unsafe fn recv_multishot(&mut self, fd: FileDescriptor, buf: *mut [u8], flags: u32) {
		self.recv(fd, buf, flags);
		self.ioprio = EncodedIoPriority(SendRecvFlags::RECV_MULTISHOT.bits());
	}

	// ts needs to live until the timeout fires or is removed!
	//
	// completes with -ETIME on expiration, 0 when `count` completions
	// arrived first, -ECANCELED when removed.
	pub unsafe fn timeout(&mut self, ts: *const Timespec, count: u32, flags: TimeoutFlags) {
		self.rw(Operation::Timeout, FileDescriptor::FD(-1), ts as usize as u64, 1, count as u64);
		self.op_flags = flags.into();
	}

	pub fn timeout_remove(&mut self, match_user_data: u64, flags: TimeoutFlags) {
		self.opcode = Operation::TimeoutRemove.into();
		self.fd = -1;
		self.addr = match_user_data.into();
		self.op_flags = flags.into();
	}

	// ts needs to live until the linked operation completes!
	//
	// bounds the immediately preceding IO_LINK'ed entry.
	pub unsafe fn link_timeout(&mut self, ts: *const Timespec, flags: TimeoutFlags) {
		self.rw(Operation::LinkTimeout, FileDescriptor::FD(-1), ts as usize as u64, 1, 0);
		self.op_flags = flags.into();
	}

	// addr/addrlen need to live until operation is completed! (both may be null)
	pub unsafe fn accept(&mut self, fd: FileDescriptor, addr: *mut libc::sockaddr, addrlen: *mut libc::socklen_t, flags: u32) {
		self.target(Operation::Accept, fd);
		self.addr = (addr as usize as u64).into();
		self.off = SubmissionEntryOffset { addr2: addrlen as usize as u64 };
		self.op_flags = SubmissionEntryOperationFlags { accept_flags: flags };
	}

	pub unsafe fn accept_multishot(&mut self, fd: FileDescriptor, addr: *mut libc::sockaddr, addrlen: *mut libc::socklen_t, flags: u32) {
		self.accept(fd, addr, addrlen, flags);
		self.ioprio = EncodedIoPriority(AcceptFlags::MULTISHOT.bits());
	}

	// the cancel attempt completes on its own: 0 on success, -ENOENT if
	// nothing matched, -EALREADY if the target could not be interrupted.
	pub fn async_cancel(&mut self, match_user_data: u64, flags: CancelFlags) {
		self.opcode = Operation::AsyncCancel.into();
		self.fd = -1;
		self.addr = match_user_data.into();
		self.op_flags = flags.into();
	}

	// cancel by descriptor instead of user token
	pub fn async_cancel_fd(&mut self, fd: FileDescriptor, flags: CancelFlags) {
		self.opcode = Operation::AsyncCancel.into();
		let mut flags = flags | CancelFlags::FD;
		match fd {
			FileDescriptor::FD(fd) => self.fd = fd,
			FileDescriptor::Fixed(ndx) => {
				self.fd = ndx as i32;
				flags |= CancelFlags::FD_FIXED;
			}
		}
		self.op_flags = flags.into();
	}

	// addr needs to live until operation is completed!
	pub unsafe fn connect(&mut self, fd: FileDescriptor, addr: *const libc::sockaddr, addrlen: libc::socklen_t) {
		self.target(Operation::Connect, fd);
		self.addr = (addr as usize as u64).into();
		self.off = (addrlen as u64).into();
	}

	pub fn fallocate(&mut self, fd: FileDescriptor, offset: u64, len: u64, mode: i32) {
		self.rw(Operation::Fallocate, fd, len, mode as u32, offset);
	}

	// path needs to live until operation is completed!
	pub unsafe fn openat(&mut self, dirfd: i32, path: *const libc::c_char, flags: i32, mode: libc::mode_t) {
		self.rw(Operation::OpenAt, FileDescriptor::FD(dirfd), path as usize as u64, mode, 0);
		self.op_flags = SubmissionEntryOperationFlags { open_flags: flags as u32 };
	}

	// path and how need to live until operation is completed!
	pub unsafe fn openat2(&mut self, dirfd: i32, path: *const libc::c_char, how: *const OpenHow) {
		self.rw(
			Operation::OpenAt2,
			FileDescriptor::FD(dirfd),
			path as usize as u64,
			core::mem::size_of::<OpenHow>() as u32,
			how as usize as u64,
		);
	}

	pub fn close(&mut self, fd: i32) {
		self.opcode = Operation::Close.into();
		self.fd = fd;
	}

	// closes a slot in the registered fileset instead of a plain fd
	pub fn close_fixed(&mut self, index: u32) {
		self.opcode = Operation::Close.into();
		self.extra.target.file_index = index + 1;
	}

	// fds needs to live until operation is completed!
	pub unsafe fn files_update(&mut self, fds: *const [i32], offset: u64) {
		self.rw(Operation::FilesUpdate, FileDescriptor::FD(-1), (*fds).as_ptr() as usize as u64, (&*fds).len() as u32, offset);
	}

	// path and statxbuf need to live until operation is completed!
	pub unsafe fn statx(&mut self, dirfd: i32, path: *const libc::c_char, flags: i32, mask: u32, statxbuf: *mut libc::c_void) {
		self.rw(Operation::Statx, FileDescriptor::FD(dirfd), path as usize as u64, mask, statxbuf as usize as u64);
		self.op_flags = SubmissionEntryOperationFlags { statx_flags: flags as u32 };
	}

	pub fn fadvise(&mut self, fd: FileDescriptor, offset: u64, len: u32, advice: i32) {
		self.rw(Operation::Fadvise, fd, 0, len, offset);
		self.op_flags = SubmissionEntryOperationFlags { fadvise_advice: advice as u32 };
	}

	// addr stays owned by the caller; the kernel applies the advice in place
	pub unsafe fn madvise(&mut self, addr: *const libc::c_void, len: u32, advice: i32) {
		self.rw(Operation::Madvise, FileDescriptor::FD(-1), addr as usize as u64, len, 0);
		self.op_flags = SubmissionEntryOperationFlags { fadvise_advice: advice as u32 };
	}

	// event needs to live until operation is completed!
	pub unsafe fn epoll_ctl(&mut self, epfd: FileDescriptor, fd: i32, op: i32, event: *mut libc::epoll_event) {
		self.rw(Operation::EpollCtl, epfd, event as usize as u64, op as u32, fd as u64);
	}

	// offsets of -1 mean "use the current file position"
	pub fn splice(&mut self, fd_in: FileDescriptor, off_in: i64, fd_out: FileDescriptor, off_out: i64, len: u32, flags: SpliceFlags) {
		let mut flags = flags;
		self.target(Operation::Splice, fd_out);
		self.off = (off_out as u64).into();
		self.addr = SubmissionEntryAddress { splice_off_in: off_in as u64 };
		self.len = len;
		match fd_in {
			FileDescriptor::FD(fd) => self.extra.target.splice_fd_in = fd,
			FileDescriptor::Fixed(ndx) => {
				self.extra.target.splice_fd_in = ndx as i32;
				flags |= SpliceFlags::FD_IN_FIXED;
			}
		}
		self.op_flags = flags.into();
	}

	pub fn tee(&mut self, fd_in: FileDescriptor, fd_out: FileDescriptor, len: u32, flags: SpliceFlags) {
		let mut flags = flags;
		self.target(Operation::Tee, fd_out);
		self.len = len;
		match fd_in {
			FileDescriptor::FD(fd) => self.extra.target.splice_fd_in = fd,
			FileDescriptor::Fixed(ndx) => {
				self.extra.target.splice_fd_in = ndx as i32;
				flags |= SpliceFlags::FD_IN_FIXED;
			}
		}
		self.op_flags = flags.into();
	}

	// the buffer area needs to live until the buffers are consumed or removed!
	//
	// hands `nbufs` buffers of `len` bytes each, starting at `addr`, to the
	// kernel under group `bgid` with ids starting at `bid`.
	pub unsafe fn provide_buffers(&mut self, addr: *mut u8, len: u32, nbufs: u16, bgid: u16, bid: u16) {
		self.rw(Operation::ProvideBuffers, FileDescriptor::FD(nbufs as i32), addr as usize as u64, len, bid as u64);
		self.extra.buf.buf_group = bgid;
	}

	pub fn remove_buffers(&mut self, nbufs: u16, bgid: u16) {
		self.opcode = Operation::RemoveBuffers.into();
		self.fd = nbufs as i32;
		self.extra.buf.buf_group = bgid;
	}

	pub fn shutdown(&mut self, fd: FileDescriptor, how: i32) {
		self.target(Operation::Shutdown, fd);
		self.len = how as u32;
	}

	// both paths need to live until operation is completed!
	pub unsafe fn renameat(&mut self, olddirfd: i32, oldpath: *const libc::c_char, newdirfd: i32, newpath: *const libc::c_char, flags: u32) {
		self.rw(Operation::RenameAt, FileDescriptor::FD(olddirfd), oldpath as usize as u64, newdirfd as u32, newpath as usize as u64);
		self.op_flags = SubmissionEntryOperationFlags { rename_flags: flags };
	}

	// path needs to live until operation is completed!
	pub unsafe fn unlinkat(&mut self, dirfd: i32, path: *const libc::c_char, flags: i32) {
		self.rw(Operation::UnlinkAt, FileDescriptor::FD(dirfd), path as usize as u64, 0, 0);
		self.op_flags = SubmissionEntryOperationFlags { unlink_flags: flags as u32 };
	}

	// path needs to live until operation is completed!
	pub unsafe fn mkdirat(&mut self, dirfd: i32, path: *const libc::c_char, mode: libc::mode_t) {
		self.rw(Operation::MkdirAt, FileDescriptor::FD(dirfd), path as usize as u64, mode, 0);
	}

	// both paths need to live until operation is completed!
	pub unsafe fn symlinkat(&mut self, target: *const libc::c_char, newdirfd: i32, linkpath: *const libc::c_char) {
		self.rw(Operation::SymlinkAt, FileDescriptor::FD(newdirfd), target as usize as u64, 0, 0);
		self.off = SubmissionEntryOffset { addr2: linkpath as usize as u64 };
	}

	// both paths need to live until operation is completed!
	pub unsafe fn linkat(&mut self, olddirfd: i32, oldpath: *const libc::c_char, newdirfd: i32, newpath: *const libc::c_char, flags: i32) {
		self.rw(Operation::LinkAt, FileDescriptor::FD(olddirfd), oldpath as usize as u64, newdirfd as u32, newpath as usize as u64);
		self.op_flags = SubmissionEntryOperationFlags { hardlink_flags: flags as u32 };
	}

	// posts a completion with result `len` and token `data` on the target ring
	pub fn msg_ring(&mut self, ring_fd: i32, len: u32, data: u64, flags: MsgRingFlags) {
		self.rw(Operation::MsgRing, FileDescriptor::FD(ring_fd), MsgRingCommand::DATA.0, len, data);
		self.op_flags = flags.into();
	}

	pub fn socket(&mut self, domain: i32, socket_type: i32, protocol: i32, flags: u32) {
		self.rw(Operation::Socket, FileDescriptor::FD(domain), 0, protocol as u32, socket_type as u64);
		self.op_flags = flags.into();
	}
}
