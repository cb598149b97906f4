// Tier 3: Status, Flags and Consistency
//
// Modules in this tier run on merged entries after consolidation. They add
// information (final status, accumulated flags, warnings) and never change
// which records were merged.

pub mod consistency_checker; // Host-name similarity across members
pub mod status_assignor;     // Status precedence and flag accumulation
