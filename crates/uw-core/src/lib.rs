//! # uw-core
//!
//! Core types, ID prefixes, and error types for Underwrite.
//!
//! This crate provides the foundational types shared across all Underwrite crates:
//! - Entity structs for deals, source documents, verification issues and
//!   generated documents
//! - Status enums with explicit state machine transition tables
//! - ID prefix constants
//! - Cross-cutting error types
//! - Caller identity passed into every tenant-scoped operation
//! - Object storage key layout
//! - Audit detail sub-types and CLI response types

pub mod audit_detail;
pub mod entities;
pub mod enums;
pub mod errors;
pub mod identity;
pub mod ids;
pub mod keys;
pub mod responses;
