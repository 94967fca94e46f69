//! Application layer orchestrating locks, units of work and balance arithmetic.
//!
//! [`service::BasicPaymentsService`] implements the six ledger operations;
//! decorators from [`middleware`] wrap it at construction time through
//! [`service::compose`].

pub mod middleware;
pub mod service;
