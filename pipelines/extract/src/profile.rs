//! 批处理运行统计.

use flair_berry::post_proc::RefineStats;
use std::time::{Duration, Instant};

/// 批处理计时器.
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
    fn new() -> Self {
        Self {
            consumed: Duration::ZERO,
            since: Instant::now(),
        }
    }

    /// 开始计时.
    #[inline]
    fn start(&mut self) {
        self.since = Instant::now();
    }

    /// 结束计时, 并将这一区间的时间累加. 返回本轮计时时长.
    ///
    /// # 注意
    ///
    /// 上一次调用必须是 `self.start()`, 否则计算时间值无意义.
    #[inline]
    fn elapsed(&mut self) -> Duration {
        let d = self.since.elapsed();
        self.consumed += d;
        d
    }

    #[inline]
    fn total(&self) -> Duration {
        self.consumed
    }
}

/// 精化阶段的运行统计.
#[derive(Clone, Debug)]
pub struct Profile {
    /// 成功处理的体数据个数.
    done: u64,

    /// 处理失败 (被跳过) 的体数据个数.
    failed: u64,

    /// 单个体数据 (读取、阈值分割、精化、保存) 的累计时间.
    volume_time: AccTimer,

    /// 整个任务花费的总时间.
    real_time: AccTimer,

    /// 最耗时的一次体数据处理.
    most: Option<Duration>,

    /// 腐蚀去除的体素总数.
    eroded: u64,

    /// 因不属于最大连通域而被丢弃的体素总数.
    discarded: u64,

    /// 发生孔洞填充的切片总数.
    filled_slices: u64,
}

impl Profile {
    /// 初始化. 总计时随之开始.
    #[inline]
    pub fn new() -> Self {
        Self {
            done: 0,
            failed: 0,
            volume_time: AccTimer::new(),
            real_time: AccTimer::new(),
            most: None,
            eroded: 0,
            discarded: 0,
            filled_slices: 0,
        }
    }

    /// 开始一次体数据处理计时.
    #[inline]
    pub fn volume_start(&mut self) {
        self.volume_time.start();
    }

    /// 结束一次体数据处理计时, 返回本次耗时.
    #[inline]
    pub fn volume_elapsed(&mut self) -> Duration {
        let d = self.volume_time.elapsed();
        self.most = Some(self.most.map_or(d, |m| m.max(d)));
        d
    }

    /// 记录一次成功的精化.
    pub fn count_done(&mut self, stats: &RefineStats) {
        self.done += 1;
        self.eroded += stats.eroded as u64;
        self.discarded += stats.discarded() as u64;
        self.filled_slices += stats.filled_slices as u64;
    }

    /// 记录一次失败.
    #[inline]
    pub fn count_failed(&mut self) {
        self.failed += 1;
    }

    /// 结束全部计时.
    #[inline]
    pub fn finish(mut self) -> Self {
        self.real_time.elapsed();
        self
    }

    /// 成功处理的体数据个数.
    #[inline]
    pub fn get_done(&self) -> u64 {
        self.done
    }

    /// 处理失败的体数据个数.
    #[inline]
    pub fn get_failed(&self) -> u64 {
        self.failed
    }

    /// 腐蚀去除的体素总数.
    #[inline]
    pub fn get_eroded(&self) -> u64 {
        self.eroded
    }

    /// 被丢弃的非最大连通域体素总数.
    #[inline]
    pub fn get_discarded(&self) -> u64 {
        self.discarded
    }

    /// 发生孔洞填充的切片总数.
    #[inline]
    pub fn get_filled_slices(&self) -> u64 {
        self.filled_slices
    }

    /// 以微秒为单位获得处理体数据的总时间.
    #[inline]
    pub fn get_volume_time_us(&self) -> u64 {
        self.volume_time.total().as_micros() as u64
    }

    /// 以微秒为单位获得任务运行到目前的总自然时间.
    #[inline]
    pub fn get_real_time_us(&self) -> u64 {
        self.real_time.total().as_micros() as u64
    }

    /// 以微秒为单位获得处理单个体数据的平均时间. 没有任何成功处理时返回 `None`.
    #[inline]
    pub fn get_avg_volume_time_us(&self) -> Option<f64> {
        match self.done {
            0 => None,
            done => Some(self.get_volume_time_us() as f64 / done as f64),
        }
    }

    /// 获取最耗时的一次体数据处理所消耗的时间. 如果不存在任务, 则返回 `None`.
    #[inline]
    pub fn get_most_time_consuming(&self) -> Option<Duration> {
        self.most
    }
}

impl Default for Profile {
    fn default() -> Self {
        Self::new()
    }
}
