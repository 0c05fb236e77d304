//! Per-Cell agent runtime: working memory, context assembly, budget
//! tracking, recursion validation, and the think/act loop itself (§4.3,
//! §4.4, C4–C8).

pub mod budget;
pub mod context;
pub mod memory;
pub mod recursion;
pub mod runtime;

pub use budget::BudgetTracker;
pub use context::{assemble, assemble_system_prompt};
pub use memory::WorkingMemory;
pub use recursion::{CellTreeRegistry, DefaultRecursionValidator, RecursionValidator};
pub use runtime::{Cell, CellCreator, CellLifecycle, CellSpawnHost};
