//! Relationship lifecycle core for a social chat backend: chat requests that
//! become one-to-one conversations, and groups with invitation-gated,
//! role-gated membership. The transport layer lives elsewhere and calls into
//! [`services`] with an already-authenticated acting user id.

pub mod db;
pub mod error;
pub mod models;
pub mod queries;
pub mod services;
