//! 三线性插值.
//!
//! 输入为小数体素坐标. 越界的邻居索引会被截断到网格内 (边缘复制),
//! 因此调用方需要自行先判断点是否在网格内.

use ndarray::{ArrayView3, ArrayView4, Axis};
use num::Float;

/// 单轴上的插值支撑: `(低位索引, 高位索引, 高位权重)`.
#[inline]
fn axis_support(v: f64, len: usize) -> (usize, usize, f64) {
    debug_assert!(len > 0);
    let fl = v.floor();
    let t = v - fl;
    let last = (len - 1) as f64;
    let lo = fl.clamp(0.0, last) as usize;
    let hi = (fl + 1.0).clamp(0.0, last) as usize;
    (lo, hi, t)
}

/// 8 个角点的 `(索引, 权重)`.
fn corners(shape: &[usize], v: &[f64; 3]) -> [((usize, usize, usize), f64); 8] {
    let (i0, i1, ti) = axis_support(v[0], shape[0]);
    let (j0, j1, tj) = axis_support(v[1], shape[1]);
    let (k0, k1, tk) = axis_support(v[2], shape[2]);
    let (si, sj, sk) = (1.0 - ti, 1.0 - tj, 1.0 - tk);
    [
        ((i0, j0, k0), si * sj * sk),
        ((i0, j0, k1), si * sj * tk),
        ((i0, j1, k0), si * tj * sk),
        ((i0, j1, k1), si * tj * tk),
        ((i1, j0, k0), ti * sj * sk),
        ((i1, j0, k1), ti * sj * tk),
        ((i1, j1, k0), ti * tj * sk),
        ((i1, j1, k1), ti * tj * tk),
    ]
}

/// 在体素坐标 `v` 处对三维标量场做三线性插值.
///
/// 若 `v` 含有非有限值, 返回 `None`.
pub fn trilinear<T: Float>(data: ArrayView3<T>, v: &[f64; 3]) -> Option<f64> {
    if v.iter().any(|c| !c.is_finite()) {
        return None;
    }
    let mut acc = 0.0;
    for (idx, w) in corners(data.shape(), v) {
        if w != 0.0 {
            acc += w * data[idx].to_f64()?;
        }
    }
    Some(acc)
}

/// 在体素坐标 `v` 处对四维数据的最后一维 (向量) 做三线性插值, 结果写入 `out`.
///
/// `out` 会被清空并重新填充, 长度等于最后一维长度. 若 `v` 含有非有限值, 返回 `false`.
pub fn trilinear_vector<T: Float>(data: ArrayView4<T>, v: &[f64; 3], out: &mut Vec<f64>) -> bool {
    out.clear();
    if v.iter().any(|c| !c.is_finite()) {
        return false;
    }
    let n = data.len_of(Axis(3));
    out.resize(n, 0.0);
    for ((i, j, k), w) in corners(&data.shape()[..3], v) {
        if w == 0.0 {
            continue;
        }
        let lane = data.slice(ndarray::s![i, j, k, ..]);
        for (o, x) in out.iter_mut().zip(lane.iter()) {
            *o += w * x.to_f64().unwrap_or(0.0);
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::{trilinear, trilinear_vector};
    use ndarray::{Array3, Array4};

    fn f64_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    /// 线性函数在三线性插值下应当被精确重建.
    #[test]
    fn test_trilinear_linear_field() {
        let data = Array3::from_shape_fn((4, 5, 6), |(i, j, k)| {
            (i as f32) + 2.0 * (j as f32) - 0.5 * (k as f32)
        });
        for v in [[0.0, 0.0, 0.0], [1.5, 2.25, 3.75], [2.9, 0.1, 4.5]] {
            let expect = v[0] + 2.0 * v[1] - 0.5 * v[2];
            assert!(f64_eq(trilinear(data.view(), &v).unwrap(), expect));
        }
    }

    #[test]
    fn test_trilinear_exact_at_centre_and_clamped() {
        let data = Array3::from_shape_fn((3, 3, 3), |(i, j, k)| (i * 9 + j * 3 + k) as f64);
        assert!(f64_eq(trilinear(data.view(), &[1.0, 2.0, 0.0]).unwrap(), 15.0));
        // 超出网格半个体素时复制边缘值.
        assert!(f64_eq(trilinear(data.view(), &[-0.4, 0.0, 0.0]).unwrap(), 0.0));
        assert!(f64_eq(trilinear(data.view(), &[2.4, 2.0, 2.0]).unwrap(), 26.0));
        assert_eq!(trilinear(data.view(), &[f64::NAN, 0.0, 0.0]), None);
    }

    #[test]
    fn test_trilinear_vector() {
        let data = Array4::from_shape_fn((2, 1, 1, 3), |(i, _, _, n)| (i * 10 + n) as f32);
        let mut out = Vec::new();
        assert!(trilinear_vector(data.view(), &[0.5, 0.0, 0.0], &mut out));
        assert_eq!(out.len(), 3);
        assert!(f64_eq(out[0], 5.0) && f64_eq(out[1], 6.0) && f64_eq(out[2], 7.0));
    }
}
