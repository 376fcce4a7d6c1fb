//! 算法运行统计.

use std::time::{Duration, Instant};

/// ablation/benchmark 计时器.
///
/// 该计时器支持 "中途中断" 与 "结束中断, 继续开始计时".
#[derive(Clone, Debug)]
struct AccTimer {
    consumed: Duration,
    since: Instant,
}

impl AccTimer {
    /// 初始化计时器. 初始化时会视为已经开始计时.
    #[inline]
    pub fn new() -> Self {
        Self {
            consumed: Duration::ZERO,
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
    /// 上一次调用必须是 `self.start()`, 否则计算时间值无意义.
    #[inline]
    pub fn elapsed(&mut self) -> Duration {
        let d = self.since.elapsed();
        self.consumed += d;
        d
    }

    /// 获得总共累计下来的时间 (以微秒为单位).
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

/// ablation/benchmark 数据统计.
#[derive(Clone, Debug)]
pub struct Profile {
    /// 准备阶段 (建树等) 花费的时间, 不计入任务时间.
    setup_time: Option<Duration>,

    /// 执行的任务个数 (一次查询, 或一个体素).
    tasks: u64,

    /// 处理任务花费的总时间.
    task_time: AccTimer,

    /// 整个实验花费的总时间 (包括准备数据, 校验结果).
    real_time: AccTimer,

    /// 最耗时的一次任务所消耗的时间.
    most: Option<Duration>,

    /// 结果与参考答案不一致的任务个数.
    mismatched: u64,

    /// 累计偏差. 含义由具体实验决定 (距离, 或角度).
    deviation: f64,
}

impl Profile {
    /// 初始化.
    #[inline]
    pub fn new() -> Self {
        Self {
            setup_time: None,
            tasks: 0,
            task_time: AccTimer::default(),
            real_time: AccTimer::default(),
            most: None,
            mismatched: 0,
            deviation: 0.0,
        }
    }

    /// 记录准备阶段的耗时.
    #[inline]
    pub fn record_setup(&mut self, d: Duration) {
        self.setup_time = Some(self.setup_time.unwrap_or_default() + d);
    }

    /// 开始一次新任务计时.
    #[inline]
    pub fn task_start(&mut self) {
        self.tasks += 1;
        self.task_time.start();
    }

    /// 结束一次任务计时.
    #[inline]
    pub fn task_elapsed(&mut self) {
        let d = self.task_time.elapsed();
        self.most = Some(self.most.map_or(d, |m| m.max(d)));
    }

    /// 记录一次与参考答案不一致的结果.
    #[inline]
    pub fn count_mismatch(&mut self) {
        self.mismatched += 1;
    }

    /// 累加偏差.
    #[inline]
    pub fn add_deviation(&mut self, v: f64) {
        self.deviation += v;
    }

    /// 结束全部计时.
    #[inline]
    pub fn finish(mut self) -> Self {
        self.real_time.elapsed();
        self
    }

    /// 准备阶段耗时. 没有准备阶段时为 `None`.
    #[inline]
    pub fn get_setup_time(&self) -> Option<Duration> {
        self.setup_time
    }

    /// 总任务个数.
    #[inline]
    pub fn get_tasks(&self) -> u64 {
        self.tasks
    }

    /// 不一致的任务个数.
    #[inline]
    pub fn get_mismatched(&self) -> u64 {
        self.mismatched
    }

    /// 以微秒为单位获得处理任务的总时间.
    #[inline]
    pub fn get_task_time_us(&self) -> u64 {
        self.task_time.get_total_us()
    }

    /// 以微秒为单位获得实验运行到目前的总自然时间.
    #[inline]
    pub fn get_real_time_us(&self) -> u64 {
        self.real_time.get_total_us()
    }

    /// 以微秒为单位获得处理单个任务的平均时间.
    #[inline]
    pub fn get_avg_task_time_us(&self) -> Option<f64> {
        match self.tasks {
            0 => None,
            n => Some(self.get_task_time_us() as f64 / n as f64),
        }
    }

    /// 单个任务的平均偏差.
    #[inline]
    pub fn get_avg_deviation(&self) -> Option<f64> {
        match self.tasks {
            0 => None,
            n => Some(self.deviation / n as f64),
        }
    }

    /// 最耗时的一次任务所消耗的时间. 如果不存在任务, 则返回 `None`.
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
