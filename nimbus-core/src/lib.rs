//! Nimbus Core
//!
//! Core library for a cloud resource manager that treats side effects as values

pub mod differ;
pub mod effect;
pub mod plan;
pub mod provider;
pub mod resource;
pub mod schema;
