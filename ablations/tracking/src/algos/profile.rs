//! 追踪运行统计.

use std::time::{Duration, Instant};

use tract_berry::tracking::{Streamline, Termination};

/// ablation/benchmark 计时器.
///
/// 该计时器支持 "中途中断" 与 "结束中断, 继续开始计时".
#[derive(Clone, Debug)]
struct AccTimer {
    consumed: Duration,
    since: Instant,
}

impl AccTimer {
    /// 初始化计时器. 初始化时会视为已经开始计时 (`self.start()`).
    #[inline]
    pub fn new() -> Self {
        Self {
            consumed: Duration::from_secs(0),
            since: Instant::now(),
        }
    }

    /// 开始计时.
    #[inline]
    pub fn start(&mut self) {
        self.since = Instant::now();
    }

    /// 结束计时, 并将这一区间的时间累加. 返回本轮计时时长.
    ///
    /// # 注意
    ///
    /// 上一次调用必须是 `self.start()`, 否则计算时间值无意义.
    #[inline]
    pub fn elapsed(&mut self) -> Duration {
        let d = self.since.elapsed();
        self.consumed += d;
        d
    }

    /// 获得总共累计下来的时间综合 (以微秒为单位).
    #[inline]
    pub fn get_total_us(&self) -> u64 {
        self.consumed.as_micros() as u64
    }
}

impl Default for AccTimer {
    fn default() -> Self {
        Self::new()
    }
}

/// 终止原因的种类数.
const N_TERMINATIONS: usize = 6;

/// 终止原因在统计数组中的位置.
#[inline]
fn slot(t: Termination) -> usize {
    match t {
        Termination::Stopped => 0,
        Termination::Invalid => 1,
        Termination::NoDirection => 2,
        Termination::MaxSteps => 3,
        Termination::SeedRejected => 4,
        Termination::NotTracked => 5,
    }
}

/// 与 [`slot`] 对应的名字.
pub const TERMINATION_NAMES: [&str; N_TERMINATIONS] =
    ["stopped", "invalid", "no-direction", "max-steps", "seed-rejected", "not-tracked"];

/// ablation/benchmark 数据统计.
#[derive(Clone, Debug)]
pub struct Profile {
    /// 点数不足 2 的 streamline 个数 (种子被拒绝或无法前进).
    trivial: u64,

    /// 有效 streamline 个数.
    target: u64,

    /// 有效 streamline 的总点数.
    points: u64,

    /// 有效 streamline 的总长度, 单位为毫米.
    length_mm: f64,

    /// 两个方向的终止原因计数.
    terminations: [u64; N_TERMINATIONS],

    /// 追踪花费的总时间.
    target_time: AccTimer,

    /// 整个任务花费的总时间 (包括构造方向场, 生成种子等).
    real_time: AccTimer,

    /// 最耗时的一次追踪所消耗的时间. 并行时为整批耗时.
    most: Duration,
}

impl Profile {
    /// 初始化.
    #[inline]
    pub fn new() -> Self {
        Self {
            trivial: 0,
            target: 0,
            points: 0,
            length_mm: 0.0,
            terminations: [0; N_TERMINATIONS],
            target_time: AccTimer::default(),
            real_time: AccTimer::default(),
            most: Duration::MAX,
        }
    }

    /// 记录一条 streamline.
    pub fn record(&mut self, s: &Streamline) {
        self.terminations[slot(s.forward_termination())] += 1;
        self.terminations[slot(s.backward_termination())] += 1;
        if s.len() < 2 {
            self.trivial += 1;
            return;
        }
        self.target += 1;
        self.points += s.len() as u64;
        self.length_mm += s.length_mm();
    }

    /// 开始一次追踪计时.
    #[inline]
    pub fn target_start(&mut self) {
        self.target_time.start();
    }

    /// 结束一次追踪计时.
    #[inline]
    pub fn target_elapsed(&mut self) {
        let d = self.target_time.elapsed();
        self.most = match self.most {
            Duration::MAX => d,
            once_duration => std::cmp::max(d, once_duration),
        };
    }

    /// 结束全部计时.
    #[inline]
    pub fn finish(mut self) -> Self {
        self.real_time.elapsed();
        self
    }

    /// 获得无效 streamline 个数.
    #[inline]
    pub fn get_trivial(&self) -> u64 {
        self.trivial
    }

    /// 获得有效 streamline 个数.
    #[inline]
    pub fn get_target(&self) -> u64 {
        self.target
    }

    /// 获得有效 streamline 的总点数.
    #[inline]
    pub fn get_points(&self) -> u64 {
        self.points
    }

    /// 终止原因计数, 与 [`TERMINATION_NAMES`] 一一对应.
    #[inline]
    pub fn get_terminations(&self) -> &[u64; N_TERMINATIONS] {
        &self.terminations
    }

    /// 以微秒为单位获得追踪的总花费自然时间.
    #[inline]
    pub fn get_target_time_us(&self) -> u64 {
        self.target_time.get_total_us()
    }

    /// 以微秒为单位获得任务运行到目前的总自然时间.
    #[inline]
    pub fn get_real_time_us(&self) -> u64 {
        self.real_time.get_total_us()
    }

    /// 平均每条有效 streamline 的长度 (毫米).
    #[inline]
    pub fn get_avg_length_mm(&self) -> Option<f64> {
        match self.target {
            0 => None,
            target => Some(self.length_mm / target as f64),
        }
    }

    /// 平均每条 streamline (含无效) 的追踪时间 (微秒).
    #[inline]
    pub fn get_avg_target_time_us(&self) -> Option<f64> {
        match self.target + self.trivial {
            0 => None,
            n => Some(self.get_target_time_us() as f64 / n as f64),
        }
    }

    /// 获取最耗时的一次追踪所消耗的时间.
    ///
    /// 如果不存在任务, 则返回 `None`.
    pub fn get_most_time_consuming(&self) -> Option<Duration> {
        match self.most {
            Duration::MAX => None,
            d => Some(d),
        }
    }
}

impl Default for Profile {
    fn default() -> Self {
        Self::new()
    }
}
