//! Session-bound realtime client.
//!
//! A [`session::SessionStore`] tracks who is signed in, a
//! [`connection::ConnectionManager`] owns the single realtime connection, and
//! [`app::App`] keeps the two in step.

pub mod app;
pub mod config;
pub mod connection;
pub mod identity;
pub mod session;
