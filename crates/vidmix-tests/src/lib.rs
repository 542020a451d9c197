//! Integration test crate for vidmix.
//!
//! This crate exists solely to hold cross-crate integration tests.
//! It drives a full `VideoFile` over synthetic streams and checks what
//! reaches the frame sink.

#[cfg(test)]
mod support;

#[cfg(test)]
mod playback;

#[cfg(test)]
mod lifecycle;
