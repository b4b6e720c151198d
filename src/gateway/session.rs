//! 会话管理
//!
//! 每个 session_id 对应一个独立的 Orchestrator（各自的来源库与笔记库）；同一会话的多轮在其 Mutex 上串行。
//! 空闲超时且没有进行中请求的会话由 cleanup_expired 回收。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, RwLock};

use crate::research::{Orchestrator, ResearchComponents};

/// 会话 ID
pub type SessionId = String;

/// 默认空闲超时
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(1800);

/// 单个会话
struct Session {
    orchestrator: Arc<Mutex<Orchestrator>>,
    last_active: Instant,
}

impl Session {
    fn new(components: Arc<ResearchComponents>) -> Self {
        Self {
            orchestrator: Arc::new(Mutex::new(Orchestrator::new(components))),
            last_active: Instant::now(),
        }
    }

    /// 是否有请求仍持有该会话
    fn in_use(&self) -> bool {
        Arc::strong_count(&self.orchestrator) > 1
    }

    /// 是否已过期（超时且无进行中的请求）
    fn is_expired(&self, timeout: Duration) -> bool {
        self.last_active.elapsed() >= timeout && !self.in_use()
    }
}

/// 会话注册表
pub struct SessionRegistry {
    components: Arc<ResearchComponents>,
    sessions: RwLock<HashMap<SessionId, Session>>,
    session_timeout: Duration,
}

impl SessionRegistry {
    pub fn new(components: Arc<ResearchComponents>) -> Self {
        Self::with_timeout(components, DEFAULT_SESSION_TIMEOUT)
    }

    pub fn with_timeout(components: Arc<ResearchComponents>, session_timeout: Duration) -> Self {
        Self {
            components,
            sessions: RwLock::new(HashMap::new()),
            session_timeout,
        }
    }

    pub fn components(&self) -> &Arc<ResearchComponents> {
        &self.components
    }

    pub fn session_timeout(&self) -> Duration {
        self.session_timeout
    }

    /// 新的随机会话 ID
    pub fn new_session_id() -> SessionId {
        format!("session_{}", uuid::Uuid::new_v4())
    }

    /// 获取或创建会话，并刷新活跃时间
    pub async fn get_or_create(&self, session_id: &str) -> Arc<Mutex<Orchestrator>> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.entry(session_id.to_string()).or_insert_with(|| {
            tracing::info!(session_id = %session_id, "session created");
            Session::new(self.components.clone())
        });
        session.last_active = Instant::now();
        session.orchestrator.clone()
    }

    /// 获取已有会话，并刷新活跃时间
    pub async fn get(&self, session_id: &str) -> Option<Arc<Mutex<Orchestrator>>> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(session_id)?;
        session.last_active = Instant::now();
        Some(session.orchestrator.clone())
    }

    /// 重置会话（清空笔记与来源）；会话不存在返回 false
    pub async fn reset(&self, session_id: &str) -> bool {
        match self.get(session_id).await {
            Some(s) => {
                s.lock().await.reset();
                true
            }
            None => false,
        }
    }

    /// 销毁会话；会话不存在返回 false
    pub async fn remove(&self, session_id: &str) -> bool {
        let removed = self.sessions.write().await.remove(session_id).is_some();
        if removed {
            tracing::info!(session_id = %session_id, "session removed");
        }
        removed
    }

    /// 回收过期会话，返回回收数量
    pub async fn cleanup_expired(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| !s.is_expired(self.session_timeout));
        let removed = before - sessions.len();
        if removed > 0 {
            tracing::info!(removed, remaining = sessions.len(), "expired sessions cleaned up");
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::build_components;
    use crate::config::AppConfig;
    use crate::llm::MockLlmClient;
    use crate::tools::StaticTransport;

    fn registry_with_timeout(timeout: Duration) -> SessionRegistry {
        let parts = build_components(
            &AppConfig::default(),
            Arc::new(MockLlmClient),
            Arc::new(StaticTransport::new()),
        )
        .unwrap();
        SessionRegistry::with_timeout(Arc::new(parts), timeout)
    }

    fn registry() -> SessionRegistry {
        registry_with_timeout(DEFAULT_SESSION_TIMEOUT)
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let reg = registry();
        let a = reg.get_or_create("a").await;
        let b = reg.get_or_create("b").await;
        assert!(!Arc::ptr_eq(&a, &b));
        assert!(Arc::ptr_eq(&a, &reg.get_or_create("a").await));
        assert_eq!(reg.len().await, 2);
    }

    #[tokio::test]
    async fn test_reset_and_remove() {
        let reg = registry();
        assert!(!reg.reset("missing").await);
        reg.get_or_create("a").await;
        assert!(reg.reset("a").await);
        assert!(reg.remove("a").await);
        assert!(!reg.remove("a").await);
        assert!(reg.is_empty().await);
    }

    #[tokio::test]
    async fn test_abandoned_sessions_are_reclaimed() {
        let reg = registry_with_timeout(Duration::ZERO);
        for _ in 0..100 {
            reg.get_or_create(&SessionRegistry::new_session_id()).await;
        }
        let busy = reg.get_or_create("busy").await;
        assert_eq!(reg.len().await, 101);

        assert_eq!(reg.cleanup_expired().await, 100);
        // a session still held by an in-flight request survives
        assert_eq!(reg.len().await, 1);
        assert!(Arc::ptr_eq(&busy, &reg.get("busy").await.unwrap()));

        drop(busy);
        assert_eq!(reg.cleanup_expired().await, 1);
        assert!(reg.is_empty().await);
    }

    #[tokio::test]
    async fn test_active_sessions_are_kept() {
        let reg = registry();
        reg.get_or_create("a").await;
        assert_eq!(reg.cleanup_expired().await, 0);
        assert_eq!(reg.len().await, 1);
    }
}
