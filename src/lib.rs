//! This crate provides the [`Gate`] and [`ReaderGuard`] types which let many readers
//! proceed concurrently until a writer closes the gate.
//!
//! # Motivation
//!
//! Some subsystems need a cheap way to stop admitting new users while they reconfigure
//! themselves, without making the reconfiguration itself a critical section that every
//! reader has to wait for. A reader/writer lock held by the writer for the whole
//! reconfiguration is too strong: readers block instead of falling back, and the writer
//! has to finish before anyone can even find out that the subsystem is unavailable.
//!
//! A [`Gate`] combines a reader/writer lock with a `busy` flag:
//!
//! 1. Readers acquire the gate in shared mode and check the flag once. If the gate is
//!    busy, they are turned away immediately instead of waiting.
//! 2. Writers use the exclusive mode only as a barrier: they wait until no reader holds
//!    the gate, flip the flag, and release the exclusive mode right away.
//!
//! Closing the gate waits for the readers that hold it, but the writer does its own work
//! without holding anything. Readers arriving in the meantime are turned away by the
//! flag, not blocked. [`Gate::wait_for_quiescence`] drains the current readers without
//! closing the gate.
//!
//! # Example
//!
//! ```
//! use std::thread;
//! use quiescence_gate::{Gate, ReaderGuard};
//!
//! let gate = Gate::new();
//!
//! thread::scope(|scope| {
//!     for _ in 0..4 {
//!         scope.spawn(|| {
//!             let mut guard = ReaderGuard::new();
//!             if guard.try_bind(&gate) {
//!                 // The gate was open. It stays held until the guard is dropped.
//!             } else {
//!                 // The gate was busy. Fall back.
//!             }
//!         });
//!     }
//!
//!     gate.begin_busy();
//!     // No reader holds the gate and no new reader can get in.
//!     assert_eq!(gate.shared_holders(), 0);
//!     gate.end_busy();
//! });
//! ```
//!
//! Dropping a [`Gate`] that still has outstanding shared acquisitions panics. Releasing
//! a shared acquisition that does not exist makes [`Gate::release_shared`] return
//! `false` and makes [`ReaderGuard::release`] panic.

pub use {gate::Gate, reader_guard::ReaderGuard};

mod gate;
mod reader_guard;
