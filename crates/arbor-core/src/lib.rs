//! Core library for arbor: git worktree lifecycle management plus the small
//! collaborators around it (repository registry, MCP settings editing and
//! terminal launching).

pub mod mcp;
pub mod process;
pub mod registry;
pub mod remote;
pub mod removal;
pub mod terminal;
pub mod worktree;
