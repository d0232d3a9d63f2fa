//! # strata-tiers
//!
//! The three storage tiers of the strata context cache:
//!
//! - [`ImmediateTier`]: fixed-capacity FIFO ring with TTL and token budget
//! - [`SessionTier`]: per-conversation LRU with importance-weighted eviction
//!   and consolidation
//! - [`LongTermTier`]: adapter over the chunker, keyword index, and external
//!   vector/graph/record collaborators
//!
//! Each tier exclusively owns its storage and takes its own locks; no tier
//! references another.

pub mod immediate;
pub mod long_term;
pub mod session;

pub use immediate::{ImmediateTier, TokenUsage};
pub use long_term::LongTermTier;
pub use session::{entry_state, EntryState, SessionMetrics, SessionTier};
