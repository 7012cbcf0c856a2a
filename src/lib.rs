//! Coordination core for lift clubs: recurring shared-ride groups that
//! riders propose, administrators approve, and members join or leave.

pub mod config;
pub mod error;
pub mod logging;
pub mod managers;
pub mod models;
pub mod state;
pub mod validator;
pub mod web;
