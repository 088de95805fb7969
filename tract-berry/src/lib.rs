#![warn(missing_docs)] // <= 合适时移除它.
// #![warn(clippy::missing_docs_in_private_items)]  // <= too strict.

//! 核心库. 基于体素方向场的局部纤维束 (streamline) 追踪引擎.
//!
//! 输入为扩散模型离线拟合得到的方向信息 (每体素的峰值方向, 或者离散球面上的
//! 方向概率分布), 一个停止判据 (如 FA 阈值), 以及一组种子点; 输出为物理坐标系下的
//! streamline 集合.
//!
//! 该 crate 目前仅提供 `safe` 接口.
//!
//! # 注意
//!
//! 1. 模型拟合 (张量, CSD 等) 不在本 crate 范围内, 我们只消费其输出.
//! 2. 配置错误 (仿射矩阵不可逆, 网格形状不一致等) 会在构造阶段以 `Err` 返回,
//!   追踪过程本身不会产生错误: 越界, 无方向, 超出最大步数都视为正常终止.
//!
//! # 开发计划
//!
//! ### 体素网格与仿射变换 ✅
//!
//! 体素索引 `(i, j, k)` 与 nifti 的 `(x, y, z)` 顺序一致, 通过 4x4 仿射矩阵映射到
//! 物理坐标 (毫米). 支持三线性插值与最近邻查询.
//!
//! 实现位于 `tract-berry/src/data`.
//!
//! ### 离散球面与峰值提取 ✅
//!
//! 正二十面体细分球面, 局部极大值, 相对阈值过滤, 最小分离角去重.
//!
//! 实现位于 `tract-berry/src/sphere` 与 `tract-berry/src/peaks.rs`.
//!
//! ### 方向场 ✅
//!
//! 1. 基于峰值的确定性方向场 (选择与来向夹角最小的峰). ✅
//! 2. 基于 PMF 的概率性方向场 (在锥形范围内按权重采样). ✅
//! 3. 基于 PMF 的确定性最大值方向场. ✅
//!
//! 实现位于 `tract-berry/src/direction`.
//!
//! ### 停止判据 ✅
//!
//! 阈值判据 (三线性插值后与阈值比较) 与二值掩膜判据.
//!
//! 实现位于 `tract-berry/src/stopping.rs`.
//!
//! ### 种子生成 ✅
//!
//! 按子体素密度均匀放置, 或在体素内随机放置 (可复现).
//!
//! 实现位于 `tract-berry/src/seeds.rs`.
//!
//! ### 局部追踪 ✅
//!
//! 惰性迭代器, 每次 `next` 只计算一个种子对应的 streamline.
//! 每个种子的随机数流只由 (全局种子, 种子下标) 决定, 因此并行结果与串行一致.
//!
//! 实现位于 `tract-berry/src/tracking`.
//!
//! ### Tractogram 导出 ✅
//!
//! npz 导出/导入, 以及 (`serde` feature 下) 压缩二进制存储.
//!
//! 实现位于 `tract-berry/src/tractogram.rs`.

/// 三维体素索引 `(i, j, k)`.
pub type Idx3d = (usize, usize, usize);

/// 物理 (世界) 坐标系下的点, 单位为毫米.
pub type Point3 = [f64; 3];

/// 物理 (世界) 坐标系下的向量.
pub type Vec3 = [f64; 3];

pub mod consts;

mod error;

pub use error::{ConfigError, TrackError, TrackResult};

pub mod geom;

/// 体素网格基础数据结构.
mod data;

pub use data::{Affine, GridAttr, MaskVolume, ScalarVolume, VoxelGrid};

pub mod sphere;

pub mod peaks;

pub mod direction;

pub mod stopping;

pub mod seeds;

pub mod tracking;

pub mod tractogram;

pub mod dataset;

pub mod prelude;
