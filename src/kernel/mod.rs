//! Kernel discovery, selection and process supervision.

pub mod catalog;
pub mod connection;
pub mod selector;
pub mod supervisor;
