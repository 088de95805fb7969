//! 局部 streamline 追踪.
//!
//! 给定方向场, 停止判据与种子点, 从每个种子出发分别向前, 向后做欧拉积分,
//! 每个种子得到一条 streamline. 追踪是惰性的: [`Streamlines`] 每次 `next`
//! 只计算一个种子.
//!
//! # 随机数
//!
//! 第 `i` 个种子使用的随机数流只由 `(全局种子, i)` 决定, 与消费顺序及线程数无关.
//! 全局种子来自 [`TrackerConfig::random_seed`], 未指定时在 [`LocalTracking::new`]
//! 中从系统熵源抽取一次.

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::consts::{DEFAULT_MAX_STEPS, DEFAULT_STEP_SIZE};
use crate::direction::DirectionField;
use crate::geom::distance;
use crate::stopping::StoppingCriterion;
use crate::tractogram::Tractogram;
use crate::{ConfigError, Point3};

mod imp;
#[cfg(feature = "rayon")]
mod par;

/// 追踪参数.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TrackerConfig {
    step_size: f64,
    max_steps: usize,
    random_seed: Option<u64>,
    min_points: usize,
    unidirectional: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            step_size: DEFAULT_STEP_SIZE,
            max_steps: DEFAULT_MAX_STEPS,
            random_seed: None,
            min_points: 0,
            unidirectional: false,
        }
    }
}

impl TrackerConfig {
    /// 以步长 (单位: 毫米) 与单方向最大步数创建.
    ///
    /// # 返回值
    ///
    /// - `step_size` 不是正有限值时, 返回 `Err(ConfigError::NonPositiveStep)`;
    /// - `max_steps` 为 0 时, 返回 `Err(ConfigError::ZeroMaxSteps)`.
    pub fn new(step_size: f64, max_steps: usize) -> Result<Self, ConfigError> {
        if !(step_size.is_finite() && step_size > 0.0) {
            return Err(ConfigError::NonPositiveStep(step_size));
        }
        if max_steps == 0 {
            return Err(ConfigError::ZeroMaxSteps);
        }
        Ok(Self {
            step_size,
            max_steps,
            ..Default::default()
        })
    }

    /// 固定全局随机种子, 使概率性追踪可复现.
    #[inline]
    pub fn with_random_seed(mut self, seed: u64) -> Self {
        self.random_seed = Some(seed);
        self
    }

    /// 丢弃点数少于 `min_points` 的 streamline.
    #[inline]
    pub fn with_min_points(mut self, min_points: usize) -> Self {
        self.min_points = min_points;
        self
    }

    /// 只向前追踪.
    #[inline]
    pub fn unidirectional(mut self) -> Self {
        self.unidirectional = true;
        self
    }

    /// 步长, 单位为毫米.
    #[inline]
    pub fn step_size(&self) -> f64 {
        self.step_size
    }

    /// 单方向最大步数.
    #[inline]
    pub fn max_steps(&self) -> usize {
        self.max_steps
    }

    /// 全局随机种子.
    #[inline]
    pub fn random_seed(&self) -> Option<u64> {
        self.random_seed
    }

    /// 最少点数.
    #[inline]
    pub fn min_points(&self) -> usize {
        self.min_points
    }

    /// 是否只向前追踪.
    #[inline]
    pub fn is_unidirectional(&self) -> bool {
        self.unidirectional
    }
}

/// 单方向追踪的终止原因.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Termination {
    /// 停止判据返回 `Stop`, 最后一个点已计入.
    Stopped,

    /// 停止判据返回 `Invalid`, 最后一个点未计入.
    Invalid,

    /// 方向场没有给出方向.
    NoDirection,

    /// 达到最大步数.
    MaxSteps,

    /// 种子本身不满足继续条件, 没有追踪.
    SeedRejected,

    /// 单方向追踪时的后向部分.
    NotTracked,
}

/// 一条 streamline: 物理坐标系下的有序点列. 创建后不可修改.
#[derive(Clone, Debug, PartialEq)]
pub struct Streamline {
    points: Vec<Point3>,
    seed_index: usize,
    forward: Termination,
    backward: Termination,
}

impl Streamline {
    /// 点列.
    #[inline]
    pub fn points(&self) -> &[Point3] {
        &self.points
    }

    /// 消费自我, 获得点列.
    #[inline]
    pub fn into_points(self) -> Vec<Point3> {
        self.points
    }

    /// 点个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// 是否没有任何点.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// 相邻点间距离之和, 单位为毫米.
    pub fn length_mm(&self) -> f64 {
        self.points
            .windows(2)
            .map(|w| distance(&w[0], &w[1]))
            .sum()
    }

    /// 对应的种子下标.
    #[inline]
    pub fn seed_index(&self) -> usize {
        self.seed_index
    }

    /// 前向追踪的终止原因.
    #[inline]
    pub fn forward_termination(&self) -> Termination {
        self.forward
    }

    /// 后向追踪的终止原因.
    #[inline]
    pub fn backward_termination(&self) -> Termination {
        self.backward
    }
}

/// 局部追踪器.
///
/// 构造时只做参数检查, 不做任何追踪. 方向场与停止判据在追踪过程中只读.
pub struct LocalTracking<D, S> {
    field: D,
    criterion: S,
    seeds: Vec<Point3>,
    config: TrackerConfig,
    base_seed: u64,
}

impl<D: DirectionField, S: StoppingCriterion> LocalTracking<D, S> {
    /// 创建追踪器.
    ///
    /// 若停止判据绑定了网格, 则它必须与方向场的网格形状一致且仿射矩阵在容差内一致,
    /// 否则返回 `Err(ConfigError::GridMismatch)`.
    pub fn new(
        field: D,
        criterion: S,
        seeds: Vec<Point3>,
        config: TrackerConfig,
    ) -> Result<Self, ConfigError> {
        if let Some((shape, affine)) = criterion.grid() {
            let (field_shape, field_affine) = field.grid();
            if shape != field_shape || !affine.approx_eq(field_affine) {
                return Err(ConfigError::GridMismatch);
            }
        }
        let base_seed = config.random_seed.unwrap_or_else(rand::random);
        log::debug!(
            "局部追踪: {} 个种子, 步长 {} mm, 最大步数 {}, 全局种子 {}",
            seeds.len(),
            config.step_size,
            config.max_steps,
            base_seed
        );
        Ok(Self {
            field,
            criterion,
            seeds,
            config,
            base_seed,
        })
    }

    /// 种子点.
    #[inline]
    pub fn seeds(&self) -> &[Point3] {
        &self.seeds
    }

    /// 追踪参数.
    #[inline]
    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// 方向场.
    #[inline]
    pub fn field(&self) -> &D {
        &self.field
    }

    /// 停止判据.
    #[inline]
    pub fn criterion(&self) -> &S {
        &self.criterion
    }

    /// 实际使用的全局随机种子.
    #[inline]
    pub fn base_seed(&self) -> u64 {
        self.base_seed
    }

    /// 追踪第 `index` 个种子. 越界时返回 `None`.
    ///
    /// 不受 `min_points` 影响, 总是返回该种子的 streamline (可能为空).
    pub fn track_seed(&self, index: usize) -> Option<Streamline> {
        let seed = self.seeds.get(index)?;
        let mut rng = StdRng::seed_from_u64(mix_seed(self.base_seed, index));
        let s = imp::track(
            &self.field,
            &self.criterion,
            seed,
            index,
            &self.config,
            &mut rng,
        );
        log::trace!(
            "种子 #{index}: {} 个点, 前向 {:?}, 后向 {:?}",
            s.len(),
            s.forward,
            s.backward
        );
        Some(s)
    }

    /// 惰性 streamline 迭代器, 按种子顺序产出.
    #[inline]
    pub fn iter(&self) -> Streamlines<'_, D, S> {
        Streamlines {
            tracking: self,
            next: 0,
        }
    }

    /// 串行追踪全部种子, 收集为 tractogram.
    pub fn collect_tractogram(&self) -> Tractogram {
        let affine = *self.field.grid().1;
        let tractogram = Tractogram::from_streamlines(self.iter(), affine);
        log::info!(
            "追踪完成: {} 个种子, {} 条 streamline, {} 个点",
            self.seeds.len(),
            tractogram.len(),
            tractogram.total_points()
        );
        tractogram
    }

    #[inline]
    fn accept(&self, s: &Streamline) -> bool {
        s.len() >= self.config.min_points
    }
}

impl<'a, D: DirectionField, S: StoppingCriterion> IntoIterator for &'a LocalTracking<D, S> {
    type Item = Streamline;
    type IntoIter = Streamlines<'a, D, S>;

    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// 第 `index` 个种子的随机数种子.
#[inline]
fn mix_seed(base: u64, index: usize) -> u64 {
    base ^ (index as u64).wrapping_add(1).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

/// 惰性 streamline 迭代器. 见 [`LocalTracking::iter`].
///
/// 每次 `next` 计算一个种子的完整 streamline; 点数少于 `min_points` 的会被跳过.
/// 中途丢弃迭代器不会留下部分结果.
pub struct Streamlines<'a, D, S> {
    tracking: &'a LocalTracking<D, S>,
    next: usize,
}

impl<'a, D: DirectionField, S: StoppingCriterion> Iterator for Streamlines<'a, D, S> {
    type Item = Streamline;

    fn next(&mut self) -> Option<Self::Item> {
        while self.next < self.tracking.seeds.len() {
            let index = self.next;
            self.next += 1;
            if let Some(s) = self.tracking.track_seed(index) {
                if self.tracking.accept(&s) {
                    return Some(s);
                }
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.tracking.seeds.len() - self.next;
        if self.tracking.config.min_points == 0 {
            (remaining, Some(remaining))
        } else {
            (0, Some(remaining))
        }
    }
}

impl<'a, D: DirectionField, S: StoppingCriterion> std::iter::FusedIterator for Streamlines<'a, D, S> {}
