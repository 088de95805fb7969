//! 离散球面 (方向集合).
//!
//! 球面由单位顶点和无向边组成. 边用来定义顶点的邻接关系, 以便在球面函数
//! (如 ODF/PMF) 上寻找局部极大值.

use std::collections::{BTreeSet, HashMap};

use once_cell::sync::Lazy;

use crate::consts::{DEFAULT_SPHERE_SUBDIVISIONS, UNIT_EPSILON};
use crate::geom::{dot, norm, normalize};
use crate::{ConfigError, Vec3};

mod icosahedron;

/// 离散球面.
///
/// 该结构是只读的. 顶点顺序即 "规范顺序", 峰值提取的并列情况都按该顺序决定.
#[derive(Clone, Debug)]
pub struct Sphere {
    vertices: Vec<Vec3>,
    edges: Vec<(usize, usize)>,
    neighbours: Vec<Vec<usize>>,
}

static DEFAULT_SPHERE: Lazy<Sphere> = Lazy::new(|| Sphere::icosphere(DEFAULT_SPHERE_SUBDIVISIONS));

/// 进程内共享的默认球面: 3 次细分的正二十面体, 642 个顶点, 关于原点对称.
#[inline]
pub fn default_sphere() -> &'static Sphere {
    &DEFAULT_SPHERE
}

impl Sphere {
    /// 由顶点和边构建球面.
    ///
    /// # 返回值
    ///
    /// - 某个顶点不是单位向量时, 返回 `Err(ConfigError::NotUnit)`;
    /// - 某条边引用了不存在的顶点时, 返回 `Err(ConfigError::EdgeOutOfRange)`;
    /// - 其他情况下成功. 重复的边和自环会被去掉.
    pub fn from_vertices(vertices: Vec<Vec3>, edges: &[(usize, usize)]) -> Result<Self, ConfigError> {
        if let Some(i) = vertices
            .iter()
            .position(|v| (norm(v) - 1.0).abs() > UNIT_EPSILON)
        {
            return Err(ConfigError::NotUnit(i));
        }
        let n = vertices.len();
        if let Some(&(a, b)) = edges.iter().find(|(a, b)| *a >= n || *b >= n) {
            return Err(ConfigError::EdgeOutOfRange(a, b));
        }
        Ok(Self::new_no_check(vertices, edges.iter().copied()))
    }

    /// 正二十面体经 `subdivisions` 次中点细分得到的球面.
    ///
    /// 顶点数为 `10 * 4^subdivisions + 2`: 12, 42, 162, 642, ...
    pub fn icosphere(subdivisions: u32) -> Self {
        let mut vertices: Vec<Vec3> = icosahedron::VERTICES
            .iter()
            .filter_map(normalize)
            .collect();
        let mut faces = icosahedron::FACES.to_vec();

        for _ in 0..subdivisions {
            let mut midpoint: HashMap<(usize, usize), usize> = HashMap::with_capacity(faces.len() * 2);
            let mut split = |a: usize, b: usize, vertices: &mut Vec<Vec3>| -> usize {
                let key = (a.min(b), a.max(b));
                *midpoint.entry(key).or_insert_with(|| {
                    let (p, q) = (vertices[a], vertices[b]);
                    let m = [p[0] + q[0], p[1] + q[1], p[2] + q[2]];
                    // 两个顶点不可能对径, 因此中点非零.
                    vertices.push(normalize(&m).unwrap_or(p));
                    vertices.len() - 1
                })
            };

            let mut next = Vec::with_capacity(faces.len() * 4);
            for [a, b, c] in faces {
                let ab = split(a, b, &mut vertices);
                let bc = split(b, c, &mut vertices);
                let ca = split(c, a, &mut vertices);
                next.extend([[a, ab, ca], [b, bc, ab], [c, ca, bc], [ab, bc, ca]]);
            }
            faces = next;
        }

        let edges: Vec<(usize, usize)> = faces
            .iter()
            .flat_map(|&[a, b, c]| [(a, b), (b, c), (c, a)])
            .collect();
        Self::new_no_check(vertices, edges)
    }

    fn new_no_check<I: IntoIterator<Item = (usize, usize)>>(vertices: Vec<Vec3>, edges: I) -> Self {
        let unique: BTreeSet<(usize, usize)> = edges
            .into_iter()
            .filter(|(a, b)| a != b)
            .map(|(a, b)| (a.min(b), a.max(b)))
            .collect();
        let mut neighbours = vec![Vec::new(); vertices.len()];
        for &(a, b) in unique.iter() {
            neighbours[a].push(b);
            neighbours[b].push(a);
        }
        Self {
            vertices,
            edges: unique.into_iter().collect(),
            neighbours,
        }
    }

    /// 顶点个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    /// 是否没有顶点.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// 所有顶点, 按规范顺序.
    #[inline]
    pub fn vertices(&self) -> &[Vec3] {
        &self.vertices
    }

    /// 第 `index` 个顶点. 越界时 panic.
    #[inline]
    pub fn vertex(&self, index: usize) -> &Vec3 {
        &self.vertices[index]
    }

    /// 所有无向边, 每条边 `(a, b)` 满足 `a < b`, 按字典序排列.
    #[inline]
    pub fn edges(&self) -> &[(usize, usize)] {
        &self.edges
    }

    /// 第 `index` 个顶点的邻居. 越界时 panic.
    #[inline]
    pub fn neighbours(&self, index: usize) -> &[usize] {
        &self.neighbours[index]
    }

    /// 与 `direction` 轴向夹角最小 (即 `|dot|` 最大) 的顶点下标.
    /// 并列时取下标最小者. 球面为空时 panic.
    pub fn find_closest(&self, direction: &Vec3) -> usize {
        assert!(!self.is_empty(), "球面没有顶点");
        let mut best = (0, f64::NEG_INFINITY);
        for (i, v) in self.vertices.iter().enumerate() {
            let c = dot(v, direction).abs();
            if c > best.1 {
                best = (i, c);
            }
        }
        best.0
    }
}
