//! Spine daemon library
//!
//! `Core` is the composition root: it owns every pipeline component and
//! hands each one only the handles it must invoke. The HTTP/WebSocket
//! control surface lives outside this crate and drives the system through
//! `Core`'s method surface.

mod core;

pub use crate::core::Core;
