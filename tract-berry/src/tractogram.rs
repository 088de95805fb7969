//! Tractogram: streamline 集合及其导出.
//!
//! npz 存储布局:
//!
//! - `points.npy`: `(N, 3)` 的 `f64`, 所有 streamline 的点按顺序拼接;
//! - `offsets.npy`: `(M + 1,)` 的 `u64`, 第 `m` 条 streamline 的点为 `points[offsets[m]..offsets[m + 1]]`;
//! - `affine.npy`: `(4, 4)` 的 `f64`, 体素到物理坐标的仿射矩阵.

use std::fs::File;
use std::path::Path;

use ndarray::{Array1, Array2};
use ndarray_npy::{NpzReader, NpzWriter};

use crate::data::Affine;
use crate::geom::distance;
use crate::tracking::Streamline;
use crate::{Point3, TrackError, TrackResult};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

const POINTS: &str = "points.npy";
const OFFSETS: &str = "offsets.npy";
const AFFINE: &str = "affine.npy";

/// streamline 集合. 点位于物理坐标系.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Tractogram {
    streamlines: Vec<Vec<Point3>>,
    affine: Affine,
}

impl Tractogram {
    /// 空的 tractogram.
    #[inline]
    pub fn new(affine: Affine) -> Self {
        Self {
            streamlines: vec![],
            affine,
        }
    }

    /// 收集追踪结果.
    pub fn from_streamlines<I: IntoIterator<Item = Streamline>>(iter: I, affine: Affine) -> Self {
        Self {
            streamlines: iter.into_iter().map(Streamline::into_points).collect(),
            affine,
        }
    }

    /// 追加一条 streamline.
    #[inline]
    pub fn push(&mut self, points: Vec<Point3>) {
        self.streamlines.push(points);
    }

    /// 所有 streamline.
    #[inline]
    pub fn streamlines(&self) -> &[Vec<Point3>] {
        &self.streamlines
    }

    /// 仿射矩阵.
    #[inline]
    pub fn affine(&self) -> &Affine {
        &self.affine
    }

    /// streamline 条数.
    #[inline]
    pub fn len(&self) -> usize {
        self.streamlines.len()
    }

    /// 是否没有 streamline.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.streamlines.is_empty()
    }

    /// 点的总数.
    pub fn total_points(&self) -> usize {
        self.streamlines.iter().map(Vec::len).sum()
    }

    /// 每条 streamline 的长度, 单位为毫米.
    pub fn lengths_mm(&self) -> Vec<f64> {
        self.streamlines.iter().map(|s| polyline_length(s)).collect()
    }

    /// 平均长度, 单位为毫米. 没有 streamline 时返回 `None`.
    pub fn mean_length_mm(&self) -> Option<f64> {
        if self.is_empty() {
            return None;
        }
        Some(self.lengths_mm().iter().sum::<f64>() / self.len() as f64)
    }

    /// 只保留长度位于 `[min_mm, max_mm]` 的 streamline.
    pub fn filter_by_length(&self, min_mm: f64, max_mm: f64) -> Self {
        Self {
            streamlines: self
                .streamlines
                .iter()
                .filter(|s| (min_mm..=max_mm).contains(&polyline_length(s)))
                .cloned()
                .collect(),
            affine: self.affine,
        }
    }

    /// 保存为 npz 文件. 布局见模块文档.
    pub fn save_npz<P: AsRef<Path>>(&self, path: P) -> TrackResult<()> {
        let n = self.total_points();
        let mut points = Array2::<f64>::zeros((n, 3));
        let mut offsets = Vec::with_capacity(self.len() + 1);
        offsets.push(0u64);
        let mut row = 0;
        for s in self.streamlines.iter() {
            for p in s {
                points.row_mut(row).assign(&ndarray::aview1(p));
                row += 1;
            }
            offsets.push(row as u64);
        }
        let affine = Array2::from_shape_fn((4, 4), |(i, j)| self.affine.matrix()[(i, j)]);

        let mut npz = NpzWriter::new(File::create(path)?);
        npz.add_array(POINTS, &points)?;
        npz.add_array(OFFSETS, &Array1::from(offsets))?;
        npz.add_array(AFFINE, &affine)?;
        npz.finish()?;
        Ok(())
    }

    /// 从 npz 文件读取. 布局见模块文档.
    pub fn open_npz<P: AsRef<Path>>(path: P) -> TrackResult<Self> {
        let mut npz = NpzReader::new(File::open(path)?)?;
        let points: Array2<f64> = npz.by_name(POINTS)?;
        let offsets: Array1<u64> = npz.by_name(OFFSETS)?;
        let m: Array2<f64> = npz.by_name(AFFINE)?;

        if points.ncols() != 3 {
            return Err(TrackError::Malformed(format!("points 应为 (N, 3), 实际为 {:?}", points.shape())));
        }
        if m.dim() != (4, 4) {
            return Err(TrackError::Malformed(format!("affine 应为 (4, 4), 实际为 {:?}", m.shape())));
        }
        let affine = Affine::from_matrix(nalgebra::Matrix4::from_fn(|i, j| m[[i, j]]))?;

        let offsets: Vec<usize> = offsets.iter().map(|o| *o as usize).collect();
        let valid = offsets.first() == Some(&0)
            && offsets.last() == Some(&points.nrows())
            && offsets.windows(2).all(|w| w[0] <= w[1]);
        if !valid {
            return Err(TrackError::Malformed("offsets 与 points 不一致".to_string()));
        }
        let streamlines = offsets
            .windows(2)
            .map(|w| {
                (w[0]..w[1])
                    .map(|r| [points[[r, 0]], points[[r, 1]], points[[r, 2]]])
                    .collect()
            })
            .collect();
        Ok(Self {
            streamlines,
            affine,
        })
    }
}

#[inline]
fn polyline_length(points: &[Point3]) -> f64 {
    points.windows(2).map(|w| distance(&w[0], &w[1])).sum()
}

cfg_if::cfg_if! {
    if #[cfg(feature = "serde")] {
        use std::io::{Read, Write};

        use flate2::read::ZlibDecoder;
        use flate2::write::ZlibEncoder;
        use flate2::Compression;

        impl Tractogram {
            /// 压缩数据.
            pub fn compress(&self) -> TrackResult<CompactTractogram> {
                let raw = bincode::serialize(self)?;
                let mut e = ZlibEncoder::new(Vec::with_capacity(raw.len() / 4), Compression::best());
                e.write_all(&raw)?;
                Ok(CompactTractogram {
                    buf: e.finish()?,
                    n_streamlines: self.len(),
                })
            }
        }

        /// 压缩存储的 [`Tractogram`]; 不透明类型.
        #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
        pub struct CompactTractogram {
            /// 压缩的不透明字节流.
            buf: Vec<u8>,

            /// streamline 条数.
            n_streamlines: usize,
        }

        impl CompactTractogram {
            /// 解压缩数据.
            pub fn decompress(&self) -> TrackResult<Tractogram> {
                let mut d = ZlibDecoder::new(self.buf.as_slice());
                let mut raw = Vec::new();
                d.read_to_end(&mut raw)?;
                let t: Tractogram = bincode::deserialize(&raw)?;
                if t.len() != self.n_streamlines {
                    return Err(TrackError::Malformed("streamline 条数不一致".to_string()));
                }
                Ok(t)
            }

            /// streamline 条数.
            #[inline]
            pub fn len(&self) -> usize {
                self.n_streamlines
            }

            /// 是否没有 streamline.
            #[inline]
            pub fn is_empty(&self) -> bool {
                self.n_streamlines == 0
            }

            /// 压缩后的字节数.
            #[inline]
            pub fn compressed_size(&self) -> usize {
                self.buf.len()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Tractogram;
    use crate::Affine;

    fn f64_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    fn sample() -> Tractogram {
        let mut t = Tractogram::new(Affine::from_zooms([2.0, 2.0, 2.5]).unwrap());
        t.push(vec![[0.0, 0.0, 0.0], [3.0, 4.0, 0.0], [3.0, 4.0, 1.0]]);
        t.push(vec![]);
        t.push(vec![[1.0, 1.0, 1.0], [1.0, 1.0, 3.0]]);
        t
    }

    #[test]
    fn test_stats() {
        let t = sample();
        assert_eq!(t.len(), 3);
        assert_eq!(t.total_points(), 5);
        assert_eq!(t.lengths_mm(), vec![6.0, 0.0, 2.0]);
        assert!(f64_eq(t.mean_length_mm().unwrap(), 8.0 / 3.0));
        assert_eq!(t.filter_by_length(1.0, 5.0).streamlines(), &[vec![[1.0, 1.0, 1.0], [1.0, 1.0, 3.0]]]);
        assert_eq!(Tractogram::default().mean_length_mm(), None);
    }

    /// 写入临时目录后读回.
    #[test]
    fn test_npz_round_trip() {
        let t = sample();
        let path = std::env::temp_dir().join(format!("tract-berry-{}.npz", std::process::id()));
        t.save_npz(&path).unwrap();
        let back = Tractogram::open_npz(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(back, t);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_compress() {
        let t = sample();
        let c = t.compress().unwrap();
        assert_eq!(c.len(), 3);
        assert!(!c.is_empty());
        assert_eq!(c.decompress().unwrap(), t);
    }
}
