//! Role-gated MySQL console for the space research station database.
//!
//! [`session::Session`] owns one authenticated connection; reads go through
//! [`query`], writes through [`crud`] and [`routines`], each in its own
//! transaction.

pub mod crud;
pub mod db;
pub mod errors;
pub mod export;
pub mod models;
pub mod query;
pub mod routines;
pub mod session;
pub mod ui;
