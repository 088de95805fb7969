//! 通用常量.

/// 默认步长 (单位: 毫米).
pub const DEFAULT_STEP_SIZE: f64 = 0.5;

/// 默认单方向最大步数.
pub const DEFAULT_MAX_STEPS: usize = 500;

/// 默认最大转角 (单位: 度).
pub const DEFAULT_MAX_ANGLE: f64 = 30.0;

/// 默认相对峰值阈值. 低于体素最大峰值该比例的峰会被忽略.
pub const DEFAULT_RELATIVE_PEAK_THRESHOLD: f64 = 0.5;

/// 默认峰之间的最小分离角 (单位: 度).
pub const DEFAULT_MIN_SEPARATION_ANGLE: f64 = 25.0;

/// 默认 PMF 相对阈值.
pub const DEFAULT_PMF_THRESHOLD: f64 = 0.1;

/// 默认球面细分次数. 3 次细分得到 642 个顶点.
pub const DEFAULT_SPHERE_SUBDIVISIONS: u32 = 3;

/// 判断单位向量时的容差.
pub const UNIT_EPSILON: f64 = 1e-6;

/// 判断两个仿射矩阵相同时的逐元素容差.
pub const AFFINE_EPSILON: f64 = 1e-6;

/// 判断矩阵奇异时的行列式阈值.
pub const SINGULAR_EPSILON: f64 = 1e-12;
