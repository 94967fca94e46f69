//! Driving adapters feeding the payments service.

pub mod csv;
