//! Time-window resolution, traversal, and clip assembly.

pub mod assembler;
pub mod cursor;
pub mod planner;
pub mod resolver;

pub use assembler::{Clip, ClipAssembler};
pub use cursor::{ClipPlan, SkipReason, Step, TraversalCursor, TraversalState};
pub use planner::{BatchPlan, BatchPlanner, BatchReport, ClipFailure, execute};
pub use resolver::{FALLBACK_SEGMENT_DURATION, Resolution, resolve};
