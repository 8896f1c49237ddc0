//! Event Bus - 발행/구독 이벤트 패브릭
//!
//! - `publish`: 동기. 매칭되는 모든 핸들러가 끝날 때까지 대기 (핸들러끼리는 동시 실행)
//! - `publish_async`: 제한된 큐에 넣고 즉시 반환. 큐가 가득 차면 `QueueFull`
//!
//! 핸들러는 각각 별도 태스크에서 실행되므로 하나가 패닉해도 형제 핸들러나 버스에 영향이 없다.

use super::types::{kinds, Event, EventPriority};
use crate::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

// ============================================================================
// EventHandler Trait
// ============================================================================

/// 구독 ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(u64);

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// 이벤트 핸들러
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// 핸들러 이름 (로깅용)
    fn name(&self) -> &str {
        "anonymous"
    }

    /// 이벤트 처리
    async fn handle(&self, event: &Event) -> Result<()>;
}

/// 클로저 기반 핸들러
pub struct FnEventHandler<F> {
    name: String,
    func: F,
}

impl<F, Fut> FnEventHandler<F>
where
    F: Fn(Event) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    pub fn new(name: impl Into<String>, func: F) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            func,
        })
    }
}

#[async_trait]
impl<F, Fut> EventHandler for FnEventHandler<F>
where
    F: Fn(Event) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, event: &Event) -> Result<()> {
        (self.func)(event.clone()).await
    }
}

// ============================================================================
// SubscriptionFilter
// ============================================================================

/// 구독 필터 - 지정된 필드는 모두 정확히 일치해야 통과
#[derive(Debug, Clone, Default)]
pub struct SubscriptionFilter {
    pub source: Option<String>,
    pub target: Option<String>,
    pub priority: Option<EventPriority>,
    pub metadata: HashMap<String, String>,
}

impl SubscriptionFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_priority(mut self, priority: EventPriority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// 이벤트가 필터를 통과하는지 확인
    pub fn matches(&self, event: &Event) -> bool {
        if let Some(ref source) = self.source {
            if &event.source != source {
                return false;
            }
        }

        if let Some(ref target) = self.target {
            if event.target.as_ref() != Some(target) {
                return false;
            }
        }

        if let Some(priority) = self.priority {
            if event.priority != priority {
                return false;
            }
        }

        self.metadata
            .iter()
            .all(|(k, v)| event.metadata.get(k) == Some(v))
    }
}

/// 등록된 구독
struct Subscription {
    event_type: String,
    handler: Arc<dyn EventHandler>,
    filter: Option<SubscriptionFilter>,
    /// 구독자 플러그인 ID (대상 지정 이벤트 라우팅용)
    subscriber: Option<String>,
    active: bool,
}

impl Subscription {
    fn accepts(&self, event: &Event) -> bool {
        if !self.active {
            return false;
        }

        if self.event_type != kinds::ALL && self.event_type != event.event_type {
            return false;
        }

        // 대상이 지정된 이벤트는 해당 구독자 또는 구독자 없는 구독에만 전달
        if let (Some(target), Some(subscriber)) = (&event.target, &self.subscriber) {
            if target != subscriber {
                return false;
            }
        }

        self.filter.as_ref().map_or(true, |f| f.matches(event))
    }
}

// ============================================================================
// EventBus
// ============================================================================

/// 이벤트 버스 설정
#[derive(Debug, Clone)]
pub struct EventBusConfig {
    /// 비동기 큐 용량
    pub queue_size: usize,

    /// 디스패치 워커 수
    pub worker_count: usize,

    /// 이벤트 히스토리 보관 개수
    pub history_size: usize,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            queue_size: 1000,
            worker_count: 4,
            history_size: 1000,
        }
    }
}

/// 이벤트 버스 통계
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventBusStats {
    pub published: u64,
    pub dispatched: u64,
    pub expired: u64,
    pub handler_errors: u64,
    pub handler_panics: u64,
    pub subscriptions: usize,
    pub history_len: usize,
    pub running: bool,
}

#[derive(Default)]
struct Counters {
    published: AtomicU64,
    dispatched: AtomicU64,
    expired: AtomicU64,
    handler_errors: AtomicU64,
    handler_panics: AtomicU64,
}

/// 이벤트 버스
///
/// ## 사용법
///
/// ```ignore
/// let bus = Arc::new(EventBus::new());
/// bus.start().await?;
///
/// let id = bus.subscribe("plugin.loaded", handler).await?;
/// bus.publish(Event::new("plugin.loaded", "engine", json!({}))).await?;
/// bus.publish_async(Event::new("plugin.loaded", "engine", json!({})))?;
///
/// bus.stop(Duration::from_secs(5)).await?;
/// ```
pub struct EventBus {
    config: EventBusConfig,

    /// 구독 테이블
    subscriptions: RwLock<HashMap<SubscriptionId, Subscription>>,

    subscription_counter: AtomicU64,

    /// 디스패치된 이벤트 히스토리 (링 버퍼)
    history: RwLock<VecDeque<Event>>,

    /// 비동기 큐
    sender: mpsc::Sender<Event>,
    receiver: Arc<Mutex<mpsc::Receiver<Event>>>,

    /// 워커 핸들 + 종료 토큰
    workers: Mutex<Vec<JoinHandle<()>>>,
    shutdown: Mutex<CancellationToken>,

    running: AtomicBool,
    counters: Counters,
}

impl EventBus {
    /// 기본 설정으로 생성
    pub fn new() -> Self {
        Self::with_config(EventBusConfig::default())
    }

    /// 커스텀 설정으로 생성
    pub fn with_config(config: EventBusConfig) -> Self {
        let (sender, receiver) = mpsc::channel(config.queue_size.max(1));

        Self {
            config,
            subscriptions: RwLock::new(HashMap::new()),
            subscription_counter: AtomicU64::new(0),
            history: RwLock::new(VecDeque::new()),
            sender,
            receiver: Arc::new(Mutex::new(receiver)),
            workers: Mutex::new(Vec::new()),
            shutdown: Mutex::new(CancellationToken::new()),
            running: AtomicBool::new(false),
            counters: Counters::default(),
        }
    }

    // ========================================================================
    // 워커 풀
    // ========================================================================

    /// 디스패치 워커 시작
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(Error::AlreadyExists("event bus is already running".into()));
        }

        let token = CancellationToken::new();
        *self.shutdown.lock().await = token.clone();

        let mut workers = self.workers.lock().await;
        for worker_id in 0..self.config.worker_count.max(1) {
            let bus = Arc::clone(self);
            let token = token.clone();
            workers.push(tokio::spawn(async move {
                bus.worker_loop(worker_id, token).await;
            }));
        }

        info!(workers = workers.len(), "Event bus started");
        Ok(())
    }

    /// 워커 종료 후 드레인 대기 (timeout 초과 시 `Timeout`)
    pub async fn stop(&self, timeout: Duration) -> Result<()> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        self.shutdown.lock().await.cancel();

        let handles: Vec<_> = self.workers.lock().await.drain(..).collect();
        let drained = tokio::time::timeout(timeout, futures::future::join_all(handles)).await;

        match drained {
            Ok(_) => {
                info!("Event bus stopped");
                Ok(())
            }
            Err(_) => {
                warn!(?timeout, "Event bus workers did not drain in time");
                Err(Error::Timeout(format!(
                    "event bus workers did not stop within {:?}",
                    timeout
                )))
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    async fn worker_loop(self: Arc<Self>, worker_id: usize, token: CancellationToken) {
        trace!(worker_id, "Event worker started");

        loop {
            let next = {
                let mut rx = tokio::select! {
                    _ = token.cancelled() => break,
                    rx = self.receiver.lock() => rx,
                };
                tokio::select! {
                    _ = token.cancelled() => None,
                    event = rx.recv() => event,
                }
            };

            match next {
                Some(event) => self.dispatch(event).await,
                None => break,
            }
        }

        // 종료 시 남은 이벤트 처리
        loop {
            let next = self.receiver.lock().await.try_recv().ok();
            match next {
                Some(event) => self.dispatch(event).await,
                None => break,
            }
        }

        trace!(worker_id, "Event worker stopped");
    }

    // ========================================================================
    // 구독
    // ========================================================================

    /// 이벤트 타입 구독 (`*`이면 모든 타입)
    pub async fn subscribe(
        &self,
        event_type: impl Into<String>,
        handler: Arc<dyn EventHandler>,
    ) -> Result<SubscriptionId> {
        self.insert_subscription(event_type.into(), handler, None, None)
            .await
    }

    /// 필터와 함께 구독
    pub async fn subscribe_with_filter(
        &self,
        event_type: impl Into<String>,
        handler: Arc<dyn EventHandler>,
        filter: SubscriptionFilter,
    ) -> Result<SubscriptionId> {
        self.insert_subscription(event_type.into(), handler, Some(filter), None)
            .await
    }

    /// 플러그인 구독자로 구독 - 다른 플러그인을 대상으로 한 이벤트는 받지 않는다
    pub async fn subscribe_plugin(
        &self,
        plugin_id: impl Into<String>,
        event_type: impl Into<String>,
        handler: Arc<dyn EventHandler>,
    ) -> Result<SubscriptionId> {
        self.insert_subscription(event_type.into(), handler, None, Some(plugin_id.into()))
            .await
    }

    async fn insert_subscription(
        &self,
        event_type: String,
        handler: Arc<dyn EventHandler>,
        filter: Option<SubscriptionFilter>,
        subscriber: Option<String>,
    ) -> Result<SubscriptionId> {
        if event_type.trim().is_empty() {
            return Err(Error::InvalidInput("event type is required".into()));
        }

        let id = SubscriptionId(self.subscription_counter.fetch_add(1, Ordering::SeqCst) + 1);

        debug!(
            subscription_id = %id,
            event_type = %event_type,
            handler = handler.name(),
            "Registering subscription"
        );

        self.subscriptions.write().await.insert(
            id,
            Subscription {
                event_type,
                handler,
                filter,
                subscriber,
                active: true,
            },
        );

        Ok(id)
    }

    /// 구독 해제
    pub async fn unsubscribe(&self, id: SubscriptionId) -> Result<()> {
        match self.subscriptions.write().await.remove(&id) {
            Some(_) => {
                debug!(subscription_id = %id, "Removed subscription");
                Ok(())
            }
            None => Err(Error::NotFound(format!("subscription {}", id))),
        }
    }

    /// 구독 활성/비활성 전환
    pub async fn set_subscription_active(&self, id: SubscriptionId, active: bool) -> Result<()> {
        let mut subs = self.subscriptions.write().await;
        let sub = subs
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("subscription {}", id)))?;
        sub.active = active;
        Ok(())
    }

    pub async fn subscription_count(&self) -> usize {
        self.subscriptions.read().await.len()
    }

    // ========================================================================
    // 발행
    // ========================================================================

    /// 동기 발행 - 매칭 핸들러가 모두 끝날 때까지 대기
    pub async fn publish(&self, event: Event) -> Result<()> {
        Self::validate(&event)?;
        self.counters.published.fetch_add(1, Ordering::Relaxed);
        self.dispatch(event).await;
        Ok(())
    }

    /// 비동기 발행 - 큐가 가득 차면 즉시 실패
    pub fn publish_async(&self, event: Event) -> Result<()> {
        Self::validate(&event)?;

        match self.sender.try_send(event) {
            Ok(()) => {
                self.counters.published.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!(event_type = %event.event_type, "Event queue is full, dropping event");
                Err(Error::QueueFull("event channel is full".into()))
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                Err(Error::NotRunning("event channel is closed".into()))
            }
        }
    }

    fn validate(event: &Event) -> Result<()> {
        if event.event_type.trim().is_empty() {
            return Err(Error::InvalidInput("event type is required".into()));
        }
        Ok(())
    }

    /// 매칭 구독에 디스패치 (핸들러별 태스크로 격리)
    async fn dispatch(&self, event: Event) {
        if event.is_expired() {
            self.counters.expired.fetch_add(1, Ordering::Relaxed);
            debug!(event_id = %event.id, event_type = %event.event_type, "Dropping expired event");
            return;
        }

        let targets: Vec<(SubscriptionId, Arc<dyn EventHandler>)> = {
            let subs = self.subscriptions.read().await;
            subs.iter()
                .filter(|(_, sub)| sub.accepts(&event))
                .map(|(id, sub)| (*id, Arc::clone(&sub.handler)))
                .collect()
        };

        let shared = Arc::new(event);

        if !targets.is_empty() {
            let mut set = JoinSet::new();
            for (id, handler) in targets {
                let event = Arc::clone(&shared);
                set.spawn(async move { (id, handler.handle(&event).await) });
            }

            while let Some(joined) = set.join_next().await {
                match joined {
                    Ok((_, Ok(()))) => {
                        self.counters.dispatched.fetch_add(1, Ordering::Relaxed);
                    }
                    Ok((id, Err(e))) => {
                        self.counters.handler_errors.fetch_add(1, Ordering::Relaxed);
                        warn!(subscription_id = %id, event_type = %shared.event_type, error = %e, "Event handler failed");
                    }
                    Err(join_err) => {
                        self.counters.handler_panics.fetch_add(1, Ordering::Relaxed);
                        warn!(event_type = %shared.event_type, error = %join_err, "Event handler faulted");
                    }
                }
            }
        }

        let mut history = self.history.write().await;
        history.push_back((*shared).clone());
        while history.len() > self.config.history_size {
            history.pop_front();
        }
    }

    // ========================================================================
    // 조회
    // ========================================================================

    /// 최근 이벤트 (최신순)
    pub async fn history(&self, limit: Option<usize>, event_type: Option<&str>) -> Vec<Event> {
        let history = self.history.read().await;
        let limit = limit.unwrap_or(history.len());
        history
            .iter()
            .rev()
            .filter(|e| event_type.map_or(true, |t| e.event_type == t))
            .take(limit)
            .cloned()
            .collect()
    }

    pub async fn clear_history(&self) {
        self.history.write().await.clear();
    }

    pub async fn stats(&self) -> EventBusStats {
        EventBusStats {
            published: self.counters.published.load(Ordering::Relaxed),
            dispatched: self.counters.dispatched.load(Ordering::Relaxed),
            expired: self.counters.expired.load(Ordering::Relaxed),
            handler_errors: self.counters.handler_errors.load(Ordering::Relaxed),
            handler_panics: self.counters.handler_panics.load(Ordering::Relaxed),
            subscriptions: self.subscriptions.read().await.len(),
            history_len: self.history.read().await.len(),
            running: self.is_running(),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// 테스트
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use std::sync::atomic::AtomicUsize;

    struct CountingHandler {
        count: AtomicUsize,
    }

    impl CountingHandler {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                count: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.count.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl EventHandler for CountingHandler {
        fn name(&self) -> &str {
            "counting"
        }

        async fn handle(&self, _event: &Event) -> Result<()> {
            self.count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct PanickingHandler;

    #[async_trait]
    impl EventHandler for PanickingHandler {
        async fn handle(&self, _event: &Event) -> Result<()> {
            panic!("handler blew up");
        }
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_ok() {
        let bus = EventBus::new();
        tokio_test::assert_ok!(bus.publish(Event::new("nobody.listens", "test", Value::Null)).await);
        assert_eq!(bus.history(None, None).await.len(), 1);
    }

    #[tokio::test]
    async fn test_publish_waits_for_handlers() {
        let bus = EventBus::new();
        let handler = CountingHandler::new();
        bus.subscribe("demo", handler.clone()).await.unwrap();
        bus.subscribe(kinds::ALL, handler.clone()).await.unwrap();

        bus.publish(Event::new("demo", "test", Value::Null)).await.unwrap();
        assert_eq!(handler.calls(), 2);

        bus.publish(Event::new("other", "test", Value::Null)).await.unwrap();
        assert_eq!(handler.calls(), 3);
    }

    #[tokio::test]
    async fn test_expired_event_is_silently_dropped() {
        let bus = EventBus::new();
        let handler = CountingHandler::new();
        bus.subscribe("demo", handler.clone()).await.unwrap();

        let stale = Event::new("demo", "test", Value::Null)
            .with_ttl(Duration::from_millis(1))
            .with_timestamp(chrono::Utc::now() - chrono::Duration::seconds(1));

        tokio_test::assert_ok!(bus.publish(stale).await);
        assert_eq!(handler.calls(), 0);
        assert!(bus.history(None, None).await.is_empty());
        assert_eq!(bus.stats().await.expired, 1);
    }

    #[tokio::test]
    async fn test_faulting_handler_is_isolated() {
        let bus = EventBus::new();
        let handler = CountingHandler::new();
        bus.subscribe("demo", Arc::new(PanickingHandler)).await.unwrap();
        bus.subscribe("demo", handler.clone()).await.unwrap();

        bus.publish(Event::new("demo", "test", Value::Null)).await.unwrap();

        assert_eq!(handler.calls(), 1);
        assert_eq!(bus.stats().await.handler_panics, 1);
    }

    #[tokio::test]
    async fn test_filter_and_inactive_subscriptions_skip() {
        let bus = EventBus::new();
        let filtered = CountingHandler::new();
        let paused = CountingHandler::new();

        bus.subscribe_with_filter(
            "demo",
            filtered.clone(),
            SubscriptionFilter::new()
                .with_source("engine")
                .with_metadata("region", "eu"),
        )
        .await
        .unwrap();
        let paused_id = bus.subscribe("demo", paused.clone()).await.unwrap();
        bus.set_subscription_active(paused_id, false).await.unwrap();

        bus.publish(Event::new("demo", "plugin", Value::Null)).await.unwrap();
        bus.publish(Event::new("demo", "engine", Value::Null).with_metadata("region", "eu"))
            .await
            .unwrap();

        assert_eq!(filtered.calls(), 1);
        assert_eq!(paused.calls(), 0);
    }

    #[tokio::test]
    async fn test_targeted_event_reaches_only_target() {
        let bus = EventBus::new();
        let a = CountingHandler::new();
        let b = CountingHandler::new();
        bus.subscribe_plugin("plugin.a", "ping", a.clone()).await.unwrap();
        bus.subscribe_plugin("plugin.b", "ping", b.clone()).await.unwrap();

        bus.publish(Event::new("ping", "engine", Value::Null).with_target("plugin.b"))
            .await
            .unwrap();
        assert_eq!((a.calls(), b.calls()), (0, 1));

        bus.publish(Event::new("ping", "engine", Value::Null)).await.unwrap();
        assert_eq!((a.calls(), b.calls()), (1, 2));
    }

    #[tokio::test]
    async fn test_publish_async_full_queue() {
        // 워커를 시작하지 않으면 큐가 비워지지 않는다
        let bus = EventBus::with_config(EventBusConfig {
            queue_size: 2,
            worker_count: 1,
            history_size: 10,
        });

        bus.publish_async(Event::new("a", "t", Value::Null)).unwrap();
        bus.publish_async(Event::new("a", "t", Value::Null)).unwrap();

        let err = bus
            .publish_async(Event::new("a", "t", Value::Null))
            .unwrap_err();
        assert!(matches!(err, Error::QueueFull(_)));
        assert!(err.to_string().contains("full"));
    }

    #[tokio::test]
    async fn test_async_dispatch_via_workers() {
        let bus = Arc::new(EventBus::new());
        let handler = CountingHandler::new();
        bus.subscribe("work", handler.clone()).await.unwrap();
        bus.start().await.unwrap();

        for _ in 0..5 {
            bus.publish_async(Event::new("work", "t", Value::Null)).unwrap();
        }

        bus.stop(Duration::from_secs(2)).await.unwrap();
        assert_eq!(handler.calls(), 5);
        assert!(!bus.is_running());
    }

    #[tokio::test]
    async fn test_unsubscribe_unknown_is_not_found() {
        let bus = EventBus::new();
        let id = bus.subscribe("demo", CountingHandler::new()).await.unwrap();
        bus.unsubscribe(id).await.unwrap();
        assert!(bus.unsubscribe(id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_history_is_capped() {
        let bus = EventBus::with_config(EventBusConfig {
            history_size: 3,
            ..Default::default()
        });

        for i in 0..10 {
            bus.publish(Event::new(format!("e{}", i), "t", Value::Null))
                .await
                .unwrap();
        }

        let history = bus.history(None, None).await;
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].event_type, "e9");
    }
}
