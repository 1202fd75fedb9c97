//! 敏感信息会话保护
//!
//! - `IdleTimer`：无操作超过固定时长（默认 5 分钟）后通知订阅者，UI 层据此隐藏已显示的助记词
//! - `ClipboardGuard`：复制到剪贴板的助记词在固定延迟（默认 30 秒）后自动清除，除非已被覆盖
//!
//! 本模块不持有 UI 状态，只提供订阅与定时能力。

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard,
    },
    time::Duration,
};

use anyhow::Result;
use tokio::{sync::Notify, time::Instant};
use tokio_util::sync::{CancellationToken, DropGuard};
use zeroize::Zeroizing;

use crate::config::SessionConfig;

pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_CLIPBOARD_CLEAR_DELAY: Duration = Duration::from_secs(30);

type IdleCallback = Arc<dyn Fn() + Send + Sync>;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

struct IdleInner {
    timeout: Duration,
    last_activity: Mutex<Instant>,
    touched: Notify,
    subscribers: Mutex<HashMap<u64, IdleCallback>>,
    next_id: AtomicU64,
}

impl IdleInner {
    fn fire(&self) {
        // 先复制回调列表，避免回调内再订阅/退订时死锁
        let callbacks: Vec<IdleCallback> = lock(&self.subscribers).values().cloned().collect();
        tracing::debug!(subscribers = callbacks.len(), "Idle timeout reached");
        for cb in callbacks {
            cb();
        }
    }
}

/// 空闲计时器
///
/// 必须在 tokio 运行时内创建；计时器被 drop 时后台任务随之结束。
pub struct IdleTimer {
    inner: Arc<IdleInner>,
    _task_guard: DropGuard,
}

impl IdleTimer {
    pub fn from_config(config: &SessionConfig) -> Self {
        Self::start(Duration::from_secs(config.idle_timeout_secs))
    }

    pub fn start(timeout: Duration) -> Self {
        let inner = Arc::new(IdleInner {
            timeout,
            last_activity: Mutex::new(Instant::now()),
            touched: Notify::new(),
            subscribers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        });

        let cancel = CancellationToken::new();
        tokio::spawn(Self::run(inner.clone(), cancel.clone()));

        Self {
            inner,
            _task_guard: cancel.drop_guard(),
        }
    }

    async fn run(inner: Arc<IdleInner>, cancel: CancellationToken) {
        loop {
            let deadline = *lock(&inner.last_activity) + inner.timeout;
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = inner.touched.notified() => continue,
                _ = tokio::time::sleep_until(deadline) => {
                    inner.fire();
                    // 触发一次后等待下一次用户活动再重新计时
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        _ = inner.touched.notified() => {}
                    }
                }
            }
        }
    }

    /// 记录一次用户活动，重新计时
    pub fn touch(&self) {
        *lock(&self.inner.last_activity) = Instant::now();
        self.inner.touched.notify_one();
    }

    /// 订阅空闲超时事件，返回的句柄被 drop 或调用 `unsubscribe` 时退订
    pub fn on_idle_timeout<F>(&self, callback: F) -> IdleSubscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        lock(&self.inner.subscribers).insert(id, Arc::new(callback));
        IdleSubscription {
            id,
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.inner.subscribers).len()
    }
}

/// 空闲订阅句柄
pub struct IdleSubscription {
    id: u64,
    inner: std::sync::Weak<IdleInner>,
}

impl IdleSubscription {
    pub fn unsubscribe(self) {
        drop(self)
    }
}

impl Drop for IdleSubscription {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.upgrade() {
            lock(&inner.subscribers).remove(&self.id);
        }
    }
}

/// 宿主环境提供的剪贴板能力
pub trait Clipboard: Send + Sync {
    fn write_text(&self, text: &str) -> Result<()>;
    fn read_text(&self) -> Result<Option<String>>;
    fn clear(&self) -> Result<()>;
}

/// 剪贴板自动清除
pub struct ClipboardGuard {
    clipboard: Arc<dyn Clipboard>,
    delay: Duration,
    generation: Arc<AtomicU64>,
}

impl ClipboardGuard {
    pub fn from_config(clipboard: Arc<dyn Clipboard>, config: &SessionConfig) -> Self {
        Self::new(clipboard, Duration::from_secs(config.clipboard_clear_secs))
    }

    pub fn new(clipboard: Arc<dyn Clipboard>, delay: Duration) -> Self {
        Self {
            clipboard,
            delay,
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// 复制敏感内容，延迟到期后若剪贴板内容未变则清除
    pub fn copy_secret(&self, secret: &str) -> Result<()> {
        self.clipboard.write_text(secret)?;
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let clipboard = self.clipboard.clone();
        let current = self.generation.clone();
        let expected = Zeroizing::new(secret.to_string());
        let delay = self.delay;

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if current.load(Ordering::SeqCst) != generation {
                return;
            }
            match clipboard.read_text() {
                Ok(Some(text)) if text == *expected => {
                    if let Err(e) = clipboard.clear() {
                        tracing::warn!(error = %e, "Failed to clear clipboard");
                    } else {
                        tracing::debug!("Clipboard cleared after secret copy");
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "Failed to read clipboard"),
            }
        });

        Ok(())
    }

    /// 复制普通内容（会取消尚未执行的清除）
    pub fn copy_text(&self, text: &str) -> Result<()> {
        self.clipboard.write_text(text)?;
        self.generation.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct MemoryClipboard {
        content: Mutex<Option<String>>,
    }

    impl Clipboard for MemoryClipboard {
        fn write_text(&self, text: &str) -> Result<()> {
            *lock(&self.content) = Some(text.to_string());
            Ok(())
        }

        fn read_text(&self) -> Result<Option<String>> {
            Ok(lock(&self.content).clone())
        }

        fn clear(&self) -> Result<()> {
            *lock(&self.content) = None;
            Ok(())
        }
    }

    /// 让出执行权，确保后台任务处理完已到期的定时器
    async fn settle() {
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_timeout_fires_once() {
        let timer = IdleTimer::start(DEFAULT_IDLE_TIMEOUT);
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        let _sub = timer.on_idle_timeout(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_secs(299)).await;
        settle().await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        settle().await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        // 无新活动时不会重复触发
        tokio::time::sleep(Duration::from_secs(600)).await;
        settle().await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_touch_resets_timer() {
        let timer = IdleTimer::start(Duration::from_secs(60));
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        let _sub = timer.on_idle_timeout(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_secs(50)).await;
        timer.touch();
        settle().await;
        tokio::time::sleep(Duration::from_secs(50)).await;
        settle().await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(11)).await;
        settle().await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsubscribe_stops_notifications() {
        let timer = IdleTimer::start(Duration::from_secs(10));
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        let sub = timer.on_idle_timeout(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(timer.subscriber_count(), 1);

        sub.unsubscribe();
        assert_eq!(timer.subscriber_count(), 0);

        tokio::time::sleep(Duration::from_secs(20)).await;
        settle().await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clipboard_cleared_after_delay() {
        let clipboard = Arc::new(MemoryClipboard::default());
        let config = SessionConfig {
            idle_timeout_secs: 300,
            clipboard_clear_secs: 30,
        };
        let guard = ClipboardGuard::from_config(clipboard.clone(), &config);

        guard.copy_secret("seed words").unwrap();
        assert_eq!(clipboard.read_text().unwrap().as_deref(), Some("seed words"));

        tokio::time::sleep(Duration::from_secs(29)).await;
        settle().await;
        assert!(clipboard.read_text().unwrap().is_some());

        tokio::time::sleep(Duration::from_secs(2)).await;
        settle().await;
        assert!(clipboard.read_text().unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_clipboard_not_cleared_when_overwritten() {
        let clipboard = Arc::new(MemoryClipboard::default());
        let guard = ClipboardGuard::new(clipboard.clone(), DEFAULT_CLIPBOARD_CLEAR_DELAY);

        guard.copy_secret("seed words").unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
        guard.copy_text("0x1234").unwrap();

        tokio::time::sleep(Duration::from_secs(40)).await;
        settle().await;
        assert_eq!(clipboard.read_text().unwrap().as_deref(), Some("0x1234"));

        // 用户在外部覆盖剪贴板内容时同样不清除
        guard.copy_secret("another secret").unwrap();
        clipboard.write_text("user text").unwrap();
        tokio::time::sleep(Duration::from_secs(40)).await;
        settle().await;
        assert_eq!(clipboard.read_text().unwrap().as_deref(), Some("user text"));
    }
}
