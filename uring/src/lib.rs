//! User-space interface to the Linux io_uring subsystem.
//!
//! A [`Ring`] wraps the kernel ring descriptor and the three shared-memory
//! regions; operations are staged into the submission queue with the
//! `prep_*` helpers (or [`Ring::with_sqe`]), published with
//! [`Ring::submit`], and reaped from the completion queue by peeking,
//! iterating or waiting. The opaque 64 bit user token placed at staging
//! time comes back in the matching [`Completion`] untouched.
//!
//! Memory referenced by staged entries stays owned by the caller and must
//! outlive the matching completion; the ring never allocates on the
//! submission or completion path.

mod config;
mod cq;
mod error;
mod mmap;
mod prep;
mod register;
mod ring;
mod sq;

pub use uring_sys::*;

pub use crate::config::Config;
pub use crate::cq::Completion;
pub use crate::error::{Error, Result};
pub use crate::register::{Probe, PROBE_OPS};
pub use crate::ring::{CancelToken, Ring, UringFile};
