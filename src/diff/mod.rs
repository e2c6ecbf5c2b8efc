//! Diff engine - merge-join comparison and sync strategies

mod compare;
mod strategy;

pub use compare::{Comparator, MergeJoin};
pub use strategy::{SyncSlot, SyncStrategies, SyncStrategy};
