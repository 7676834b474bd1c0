//! Enumeration of hyperparameter combinations

use crate::catalog::{GridAxis, ParamGrid, Params};
use crate::config::SearchStrategy;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;

/// Cross product of a grid's non-empty axes.
///
/// Combination `i` is decoded in mixed radix with the last axis varying
/// fastest, so index order is grid order.
#[derive(Debug, Clone)]
pub struct ParameterGrid<'a> {
    axes: Vec<&'a GridAxis>,
}

impl<'a> ParameterGrid<'a> {
    pub fn new(grid: &'a ParamGrid) -> Self {
        Self {
            axes: grid.effective_axes().collect(),
        }
    }

    /// Number of combinations; 0 when the grid has no effective axes
    pub fn len(&self) -> usize {
        if self.axes.is_empty() {
            0
        } else {
            self.axes.iter().map(|a| a.values.len()).product()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The combination at grid position `index`
    pub fn combination_at(&self, mut index: usize) -> Params {
        let mut picks = vec![0usize; self.axes.len()];
        for (slot, axis) in picks.iter_mut().zip(&self.axes).rev() {
            let n = axis.values.len();
            *slot = index % n;
            index /= n;
        }

        self.axes
            .iter()
            .zip(picks)
            .map(|(axis, pick)| (axis.name.clone(), axis.values[pick].clone()))
            .collect()
    }

    /// Every combination in grid order
    pub fn iter(&self) -> impl Iterator<Item = Params> + '_ {
        (0..self.len()).map(move |i| self.combination_at(i))
    }

    /// Grid positions to evaluate under `strategy`.
    ///
    /// Random search draws `n_iter` distinct positions (all of them when the
    /// grid is smaller) and returns them sorted, so tie-breaking still
    /// follows grid order.
    pub fn select(&self, strategy: SearchStrategy, random_state: Option<u64>) -> Vec<usize> {
        let total = self.len();
        match strategy {
            SearchStrategy::Grid => (0..total).collect(),
            SearchStrategy::Random { n_iter } if n_iter >= total => (0..total).collect(),
            SearchStrategy::Random { n_iter } => {
                let mut rng = match random_state {
                    Some(seed) => Xoshiro256PlusPlus::seed_from_u64(seed),
                    None => Xoshiro256PlusPlus::from_entropy(),
                };
                let mut picked = rand::seq::index::sample(&mut rng, total, n_iter).into_vec();
                picked.sort_unstable();
                picked
            }
        }
    }
}
