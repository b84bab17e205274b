//! Integration tests

mod common;
mod session_manager;
