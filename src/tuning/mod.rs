//! Hyperparameter search
//!
//! - `cross_validation`: shuffled / stratified k-fold splitters
//! - `grid`: ordered enumeration and random subsampling of grids
//! - `tuner`: the search itself, with refit of the winner

pub mod cross_validation;
pub mod grid;
mod tuner;

pub use cross_validation::{CVResults, CVSplit, CVStrategy, CrossValidator};
pub use grid::ParameterGrid;
pub use tuner::{TuneOutcome, Tuner};
