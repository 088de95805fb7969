//! 配置错误与运行时 I/O 错误.
//!
//! 追踪本身 (越界, 无可用方向, 超出最大步数) 从不产生错误.

use thiserror::Error;

/// 构造阶段的配置错误. 在任何追踪开始之前返回.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// 仿射矩阵线性部分不可逆. 参数为行列式.
    #[error("仿射矩阵不可逆 (det = {0:e})")]
    SingularAffine(f64),

    /// 仿射矩阵最后一行不是 `[0, 0, 0, 1]`.
    #[error("仿射矩阵最后一行必须为 [0, 0, 0, 1]")]
    NotHomogeneous,

    /// 仿射矩阵含有 NaN 或无穷大.
    #[error("仿射矩阵含有非有限值")]
    NonFiniteAffine,

    /// 体素网格没有任何体素.
    #[error("体素网格为空")]
    EmptyGrid,

    /// 数组形状不符合要求.
    #[error("形状不匹配: 期望 {expected:?}, 实际 {actual:?}")]
    ShapeMismatch {
        /// 期望的形状.
        expected: Vec<usize>,
        /// 实际的形状.
        actual: Vec<usize>,
    },

    /// 两个体素网格的形状或仿射矩阵不一致.
    #[error("体素网格不在同一空间 (形状或仿射矩阵不一致)")]
    GridMismatch,

    /// 球面上第 `0` 个顶点不是单位向量.
    #[error("第 {0} 个球面顶点不是单位向量")]
    NotUnit(usize),

    /// 球面的边引用了不存在的顶点.
    #[error("球面边 ({0}, {1}) 的顶点索引越界")]
    EdgeOutOfRange(usize, usize),

    /// PMF 中含有负值或非有限值.
    #[error("PMF 含有负值或非有限值")]
    InvalidPmf,

    /// 种子密度的某个分量为 0.
    #[error("种子密度的每个分量都必须为正")]
    ZeroDensity,

    /// 步长不是正有限值.
    #[error("步长必须为正有限值, 实际为 {0}")]
    NonPositiveStep(f64),

    /// 最大步数为 0.
    #[error("最大步数必须为正")]
    ZeroMaxSteps,

    /// 角度不在 `(0, 90]` 度内.
    #[error("角度必须位于 (0, 90] 度内, 实际为 {0}")]
    AngleOutOfRange(f64),

    /// 阈值不合法 (非有限, 或要求位于 `[0, 1]` 的比例超出范围).
    #[error("阈值不合法: {0}")]
    InvalidThreshold(f64),

    /// 每个体素的峰槽位数为 0.
    #[error("每个体素至少要有一个峰槽位")]
    ZeroPeaks,
}

/// 文件读写等运行时错误.
#[derive(Debug, Error)]
pub enum TrackError {
    /// 配置错误.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// 读取 nifti 文件错误.
    #[error("读取 nifti 文件失败: {0}")]
    Nifti(#[from] nifti::NiftiError),

    /// 读取 npz 文件错误.
    #[error("读取 npz 文件失败: {0}")]
    ReadNpz(#[from] ndarray_npy::ReadNpzError),

    /// 写入 npz 文件错误.
    #[error("写入 npz 文件失败: {0}")]
    WriteNpz(#[from] ndarray_npy::WriteNpzError),

    /// 底层 I/O 错误.
    #[error("I/O 错误: {0}")]
    Io(#[from] std::io::Error),

    /// 二进制编解码错误.
    #[cfg(feature = "serde")]
    #[error("编解码错误: {0}")]
    Codec(#[from] bincode::Error),

    /// 文件内容与期望格式不符.
    #[error("数据格式错误: {0}")]
    Malformed(String),
}

/// 带 [`TrackError`] 的结果类型.
pub type TrackResult<T> = Result<T, TrackError>;
