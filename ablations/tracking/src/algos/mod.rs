mod profile;

use rayon::prelude::*;
use tract_berry::dataset::Subject;
use tract_berry::prelude::*;
use utils::phantom::Phantom;

pub use profile::{Profile, TERMINATION_NAMES};

/// FA 停止阈值.
const FA_THRESHOLD: f64 = 0.2;

/// 受试者数据中, 种子掩膜的 FA 下限.
const SEED_FA: f32 = 0.3;

/// 最大转角 (度).
const MAX_ANGLE: f64 = 45.0;

/// 峰去重的最小分离角 (度).
const MIN_SEPARATION: f64 = 25.0;

/// 全局随机种子.
const RANDOM_SEED: u64 = 20240601;

/// 所有实验共享的只读输入.
pub struct Input {
    pub fa: ScalarVolume,
    pub seed_mask: MaskVolume,
    pub pmf: PmfVolume,
    pub peaks: PeaksVolume,
}

impl Input {
    pub fn from_phantom(p: Phantom) -> Self {
        Self {
            fa: p.fa,
            seed_mask: p.seed_mask,
            pmf: p.pmf,
            peaks: p.peaks,
        }
    }

    /// 种子掩膜为脑掩膜内 FA 不低于 [`SEED_FA`] 的体素. 受试者必须带有 PMF.
    pub fn from_subject(s: Subject) -> Self {
        let Subject { fa, mask, pmf } = s;
        let pmf = pmf.expect("Subject without pmf");
        let mut seed_mask = MaskVolume::from_threshold(&fa, SEED_FA);
        seed_mask
            .data_mut()
            .zip_mut_with(&mask.data(), |s, m| *s = *s && *m);
        let peaks = PeaksVolume::from_pmf(&pmf, 3, 0.5, MIN_SEPARATION).unwrap();
        Self {
            fa,
            seed_mask,
            pmf,
            peaks,
        }
    }

    fn criterion(&self) -> ThresholdStoppingCriterion {
        ThresholdStoppingCriterion::new(self.fa.clone(), FA_THRESHOLD).unwrap()
    }

    fn seeds(&self) -> Vec<Point3> {
        seeds_from_mask_with(&self.seed_mask, Density::uniform(2).unwrap())
    }

    fn config(&self) -> TrackerConfig {
        // 步长取最小体素尺寸的一半.
        let step = self.fa.zooms().into_iter().fold(f64::INFINITY, f64::min) * 0.5;
        TrackerConfig::new(step, 1000).unwrap().with_random_seed(RANDOM_SEED)
    }
}

/// 串行逐个种子追踪并计时.
fn run_serial<D: DirectionField>(name: &str, input: &Input, field: D) -> Profile {
    let mut profile = Profile::new();
    let seeds = input.seeds();
    println!("{name}: {} seeds...", seeds.len());
    let tracking = LocalTracking::new(field, input.criterion(), seeds, input.config()).unwrap();
    for i in 0..tracking.seeds().len() {
        profile.target_start();
        let s = tracking.track_seed(i).unwrap();
        profile.target_elapsed();
        profile.record(&s);
    }
    profile.finish()
}

pub fn peak_deterministic(input: &Input) -> Profile {
    let field = PeakDirectionField::new(input.peaks.clone(), MAX_ANGLE, 0.5, MIN_SEPARATION).unwrap();
    run_serial("Peak deterministic", input, field)
}

pub fn pmf_deterministic(input: &Input) -> Profile {
    let field =
        PmfDirectionField::new(input.pmf.clone(), PmfMode::DeterministicMaximum, MAX_ANGLE).unwrap();
    run_serial("PMF deterministic", input, field)
}

pub fn pmf_probabilistic(input: &Input) -> Profile {
    let field = PmfDirectionField::new(input.pmf.clone(), PmfMode::Probabilistic, MAX_ANGLE).unwrap();
    run_serial("PMF probabilistic", input, field)
}

/// 整批并行追踪. 单次耗时记录为整批耗时.
pub fn pmf_probabilistic_par(input: &Input) -> Profile {
    let mut profile = Profile::new();
    let field = PmfDirectionField::new(input.pmf.clone(), PmfMode::Probabilistic, MAX_ANGLE).unwrap();
    let seeds = input.seeds();
    println!(
        "PMF probabilistic (parallel, {} threads): {} seeds...",
        rayon::current_num_threads(),
        seeds.len()
    );
    let tracking = LocalTracking::new(field, input.criterion(), seeds, input.config()).unwrap();
    profile.target_start();
    let all = tracking.par_generate();
    profile.target_elapsed();

    // 与串行结果逐条一致.
    debug_assert!(all
        .par_iter()
        .all(|s| tracking.track_seed(s.seed_index()).as_ref() == Some(s)));
    for s in all.iter() {
        profile.record(s);
    }
    profile.finish()
}
