use std::fmt;
use std::io;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by ring operations.
///
/// Results embedded in completion entries are not converted automatically;
/// see `Completion::ok`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Error {
	/// operation invoked after `Ring::close`
	RingClosed,
	/// no free submission entry; retry after a submit/drain cycle
	QueueFull,
	/// the running kernel does not support the requested operation
	Unsupported,
	/// a deadline elapsed without a completion
	TimeExpired,
	/// a syscall or wait was interrupted; internal loops retry, public
	/// waits surface it
	Interrupted,
	/// a cancellation token was triggered while waiting
	Cancelled,
	/// any other kernel failure, carrying the raw error number
	KernelError(i32),
}

impl Error {
	/// Mapping for error numbers returned by the ring syscalls (setup,
	/// enter, register). Results embedded in completion entries are
	/// converted separately by `Completion::ok` and always yield
	/// `KernelError`.
	pub fn from_errno(errno: i32) -> Self {
		match errno {
			libc::EINTR => Error::Interrupted,
			libc::ETIME => Error::TimeExpired,
			libc::EOPNOTSUPP | libc::ENOSYS => Error::Unsupported,
			_ => Error::KernelError(errno),
		}
	}

	pub(crate) fn last_os_error() -> Self {
		Self::from_errno(io::Error::last_os_error().raw_os_error().unwrap_or(libc::EIO))
	}

	/// the raw error number, if this error came from the kernel
	pub fn errno(&self) -> Option<i32> {
		match self {
			Error::TimeExpired => Some(libc::ETIME),
			Error::Interrupted => Some(libc::EINTR),
			Error::KernelError(errno) => Some(*errno),
			_ => None,
		}
	}
}

impl fmt::Display for Error {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			Error::RingClosed => write!(f, "ring error: ring is closed"),
			Error::QueueFull => write!(f, "ring error: submission queue full"),
			Error::Unsupported => write!(f, "ring error: not supported by running kernel"),
			Error::TimeExpired => write!(f, "ring error: timed out"),
			Error::Interrupted => write!(f, "ring error: interrupted"),
			Error::Cancelled => write!(f, "ring error: cancelled"),
			Error::KernelError(errno) => write!(f, "ring error: {}", io::Error::from_raw_os_error(*errno)),
		}
	}
}

impl std::error::Error for Error {}

impl From<Error> for io::Error {
	fn from(e: Error) -> Self {
		match e.errno() {
			Some(errno) => io::Error::from_raw_os_error(errno),
			None => io::Error::new(io::ErrorKind::Other, e),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn errno_mapping() {
		assert_eq!(Error::from_errno(libc::EINTR), Error::Interrupted);
		assert_eq!(Error::from_errno(libc::ETIME), Error::TimeExpired);
		assert_eq!(Error::from_errno(libc::ENOSYS), Error::Unsupported);
		assert_eq!(Error::from_errno(libc::EINVAL), Error::KernelError(libc::EINVAL));
	}

	#[test]
	fn errno_roundtrip() {
		assert_eq!(Error::KernelError(libc::ENOENT).errno(), Some(libc::ENOENT));
		assert_eq!(Error::QueueFull.errno(), None);
		let io: std::io::Error = Error::TimeExpired.into();
		assert_eq!(io.raw_os_error(), Some(libc::ETIME));
	}
}
