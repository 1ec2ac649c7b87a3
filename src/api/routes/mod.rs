//! API Routes
//!
//! Route handlers organized by functionality.

pub mod auth;
pub mod bookmarks;
pub mod health;
pub mod pages;
