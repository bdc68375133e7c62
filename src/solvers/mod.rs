//! Numerical solvers.

pub mod levmar;
