//! 请求节流器 - 基础设施层
//!
//! 在任意长度为 `period` 的滑动窗口内，最多放行 `limit` 次调用。
//! 同一个任务的所有并发子任务共享同一个实例，不同任务之间互不共享。

use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};
use tracing::debug;

/// 滑动窗口节流器
///
/// 等待者按 FIFO 顺序排队（tokio 的 `Mutex` 是公平锁），
/// 队首等待者持锁睡眠，直到窗口内最早的一次放行过期。
#[derive(Debug)]
pub struct Throttle {
    limit: usize,
    period: Duration,
    admitted: Mutex<VecDeque<Instant>>,
}

impl Throttle {
    /// 创建节流器
    ///
    /// `limit` 为 0 时按 1 处理
    pub fn new(limit: usize, period: Duration) -> Self {
        let limit = limit.max(1);
        Self {
            limit,
            period,
            admitted: Mutex::new(VecDeque::with_capacity(limit)),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// 等待放行
    pub async fn acquire(&self) {
        let mut admitted = self.admitted.lock().await;
        loop {
            let now = Instant::now();
            while let Some(&oldest) = admitted.front() {
                if now.duration_since(oldest) >= self.period {
                    admitted.pop_front();
                } else {
                    break;
                }
            }

            if admitted.len() < self.limit {
                admitted.push_back(now);
                return;
            }

            // 窗口已满：等最早的一次放行滑出窗口
            if let Some(&oldest) = admitted.front() {
                let wake_at = oldest + self.period;
                debug!("节流: 窗口已满 ({}), 等待 {:?}", self.limit, wake_at - now);
                sleep_until(wake_at).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    /// 任意一个长度为 period 的窗口内，放行次数不超过 limit
    fn assert_window_bound(times: &[Instant], limit: usize, period: Duration) {
        let mut sorted = times.to_vec();
        sorted.sort();
        for (i, start) in sorted.iter().enumerate() {
            let in_window = sorted[i..]
                .iter()
                .take_while(|t| t.duration_since(*start) < period)
                .count();
            assert!(
                in_window <= limit,
                "窗口内放行 {} 次, 超过上限 {}",
                in_window,
                limit
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_is_bounded() {
        let throttle = Arc::new(Throttle::new(3, Duration::from_secs(1)));
        let mut handles = Vec::new();
        for _ in 0..10 {
            let throttle = throttle.clone();
            handles.push(tokio::spawn(async move {
                throttle.acquire().await;
                Instant::now()
            }));
        }

        let mut times = Vec::new();
        for handle in handles {
            times.push(handle.await.unwrap());
        }

        assert_eq!(times.len(), 10);
        assert_window_bound(&times, 3, Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_under_limit_is_immediate() {
        let throttle = Throttle::new(5, Duration::from_secs(1));
        let start = Instant::now();
        for _ in 0..5 {
            throttle.acquire().await;
        }
        assert_eq!(Instant::now(), start);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_window_to_slide() {
        let throttle = Throttle::new(2, Duration::from_millis(500));
        let start = Instant::now();
        throttle.acquire().await;
        throttle.acquire().await;
        throttle.acquire().await;
        assert!(Instant::now().duration_since(start) >= Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fifo_admission() {
        let throttle = Arc::new(Throttle::new(1, Duration::from_millis(100)));
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut handles = Vec::new();
        for i in 0..5 {
            let throttle = throttle.clone();
            let order = order.clone();
            handles.push(tokio::spawn(async move {
                throttle.acquire().await;
                order.lock().await.push(i);
            }));
            // 保证按顺序进入等待队列
            tokio::task::yield_now().await;
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(*order.lock().await, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_zero_limit_treated_as_one() {
        let throttle = Throttle::new(0, Duration::from_secs(1));
        assert_eq!(throttle.limit(), 1);
    }
}
