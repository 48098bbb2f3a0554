//! Conversation state kept between turns.

pub mod session;

pub use session::SessionStore;
