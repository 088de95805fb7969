//! 单个种子的积分过程.

use rand::Rng;

use super::{Streamline, Termination, TrackerConfig};
use crate::data::voxel_in_shape;
use crate::direction::DirectionField;
use crate::geom::{neg, normalize, scale_add};
use crate::stopping::{StoppingCriterion, TrackerStatus};
use crate::{Point3, Vec3};

/// 从 `seed` 出发追踪一条完整的 streamline.
///
/// 结果为 `reverse(后向路径) ++ [seed] ++ 前向路径`. 后向追踪从初始方向的反方向开始.
pub(super) fn track<D, S, R>(
    field: &D,
    criterion: &S,
    seed: &Point3,
    seed_index: usize,
    config: &TrackerConfig,
    rng: &mut R,
) -> Streamline
where
    D: DirectionField,
    S: StoppingCriterion,
    R: Rng + ?Sized,
{
    let done = |points: Vec<Point3>, forward: Termination, backward: Termination| Streamline {
        points,
        seed_index,
        forward,
        backward,
    };

    match check(field, criterion, seed) {
        TrackerStatus::Continue => {}
        TrackerStatus::Stop => {
            return done(vec![*seed], Termination::Stopped, Termination::Stopped)
        }
        TrackerStatus::Invalid => {
            return done(vec![], Termination::SeedRejected, Termination::SeedRejected)
        }
    }

    let Some(initial) = field
        .initial_directions(seed)
        .first()
        .and_then(|d| normalize(&d.vector))
    else {
        return done(vec![*seed], Termination::NoDirection, Termination::NoDirection);
    };

    let (forward, fwd_end) = integrate(field, criterion, seed, initial, config, rng);
    let (mut backward, bwd_end) = if config.unidirectional {
        (vec![], Termination::NotTracked)
    } else {
        integrate(field, criterion, seed, neg(&initial), config, rng)
    };

    backward.reverse();
    backward.reserve_exact(forward.len() + 1);
    backward.push(*seed);
    backward.extend(forward);
    done(backward, fwd_end, bwd_end)
}

/// 单方向欧拉积分. 返回的路径不含起点.
fn integrate<D, S, R>(
    field: &D,
    criterion: &S,
    start: &Point3,
    direction: Vec3,
    config: &TrackerConfig,
    rng: &mut R,
) -> (Vec<Point3>, Termination)
where
    D: DirectionField,
    S: StoppingCriterion,
    R: Rng + ?Sized,
{
    let mut path = Vec::new();
    let mut pos = *start;
    let mut dir = direction;
    let mut steps = 0;
    while steps < config.max_steps {
        let Some(next) = field
            .get_direction(&pos, &dir, rng)
            .and_then(|d| normalize(&d.vector))
        else {
            return (path, Termination::NoDirection);
        };
        pos = scale_add(&pos, &next, config.step_size);
        dir = next;
        steps += 1;
        match check(field, criterion, &pos) {
            TrackerStatus::Continue => path.push(pos),
            TrackerStatus::Stop => {
                path.push(pos);
                return (path, Termination::Stopped);
            }
            TrackerStatus::Invalid => return (path, Termination::Invalid),
        }
    }
    (path, Termination::MaxSteps)
}

/// 方向场网格之外的点一律视为 `Invalid`, 其余交给停止判据.
#[inline]
fn check<D: DirectionField, S: StoppingCriterion>(field: &D, criterion: &S, point: &Point3) -> TrackerStatus {
    let (shape, affine) = field.grid();
    if voxel_in_shape(shape, &affine.apply_inverse(point)) {
        criterion.check(point)
    } else {
        TrackerStatus::Invalid
    }
}
