//! Sentinel - Syscoin masternode governance agent
//!
//! Runs periodically next to a masternode's syscoind and keeps its
//! governance votes current: it mirrors the network's governance objects
//! into a local store, votes to delete expired proposals, and converges with
//! the other masternodes on one superblock per disbursement cycle.
//!
//! Key principles:
//! - One live run at a time (leased run lock)
//! - Every vote goes through the local ledger, never twice
//! - Candidate superblocks are rebuilt deterministically by every node

pub mod clock;
pub mod coordinator;
pub mod daemon;
pub mod error;
pub mod governance;
pub mod lock;
pub mod schedule;
pub mod store;
