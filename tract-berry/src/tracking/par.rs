use rayon::prelude::*;

use super::{LocalTracking, Streamline};
use crate::direction::DirectionField;
use crate::stopping::StoppingCriterion;
use crate::tractogram::Tractogram;

impl<D: DirectionField, S: StoppingCriterion> LocalTracking<D, S> {
    /// 并行追踪全部种子. 结果与 [`LocalTracking::iter`] 逐条一致, 顺序也相同.
    pub fn par_generate(&self) -> Vec<Streamline> {
        (0..self.seeds.len())
            .into_par_iter()
            .filter_map(|i| self.track_seed(i))
            .filter(|s| self.accept(s))
            .collect()
    }

    /// 并行追踪全部种子, 收集为 tractogram.
    pub fn par_collect_tractogram(&self) -> Tractogram {
        let affine = *self.field.grid().1;
        let tractogram = Tractogram::from_streamlines(self.par_generate(), affine);
        log::info!(
            "并行追踪完成: {} 个种子, {} 条 streamline, {} 个点",
            self.seeds.len(),
            tractogram.len(),
            tractogram.total_points()
        );
        tractogram
    }
}
