//! The standalone voice map service.
//!
//! Wires the core map tools to the realtime transport and runs one voice
//! session at a time through the [`controller::SessionController`].

pub mod agent;
pub mod collaborators;
pub mod config;
pub mod controller;

#[cfg(test)]
pub(crate) mod test_support;
