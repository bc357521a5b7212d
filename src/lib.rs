//! Sheet cutting optimizer for cabinet parts.
//!
//! A genetic algorithm searches over the order (and rotation) in which part
//! units are packed; a deterministic shelf, guillotine or bottom-left packer
//! turns each candidate into a layout, and the evaluator ranks layouts by
//! sheet cost, sheet count, waste and cut length.
//!
//! ```no_run
//! use sheet_optimizer::{OptimizerConfig, Part, SheetType, optimize};
//!
//! let parts = vec![Part::new("side", 720, 560, 4)];
//! let sheets = vec![SheetType::new("board", 2440, 1220, 40.0).with_kerf(3)];
//! let result = optimize(&parts, &sheets, &OptimizerConfig::default())?;
//! println!("{}", result.fitness);
//! # Ok::<(), sheet_optimizer::Error>(())
//! ```

pub mod bottom_left;
pub mod catalog;
pub mod error;
pub mod evaluator;
pub mod genome;
pub mod guillotine;
pub mod optimizer;
pub mod packer;
pub mod shelf;
pub mod types;

pub use error::{Error, Result};
pub use evaluator::{Evaluator, Fitness, Summary};
pub use genome::Genome;
pub use optimizer::{CancelToken, Optimized, Optimizer, OptimizerConfig, StopReason, optimize};
pub use packer::{Decoder, Packer};
pub use types::{Grain, Layout, Part, Placement, Rect, SheetType};
