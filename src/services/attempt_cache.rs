//! 已尝试答案缓存 - 业务能力层
//!
//! 按题目 ID 记录已经填过的答案指纹，保证同一个错误答案不会被再次提交。
//!
//! - 整体过期：加载时若距上次清理超过 TTL（默认一天），整个缓存清空
//! - 单条过期：读取时 `last_updated` 超过 TTL 的记录视为不存在
//! - 写入防抖：短时间内的多次写入合并成一次持久化

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use crate::config::CacheConfig;
use crate::error::AppResult;
use crate::models::{normalize_answer, Fingerprint, QuestionType};
use crate::storage::KeyValueStore;

/// 缓存在键值存储中的 key
pub const CACHE_KEY: &str = "attempt_cache";

/// 单题的尝试记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub fingerprints: BTreeSet<Fingerprint>,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheState {
    last_purge: DateTime<Utc>,
    #[serde(default)]
    records: HashMap<String, AttemptRecord>,
}

impl CacheState {
    fn fresh(now: DateTime<Utc>) -> Self {
        Self {
            last_purge: now,
            records: HashMap::new(),
        }
    }
}

/// 已尝试答案缓存
///
/// 读写都是同步的（内存中完成），持久化在后台异步进行。
/// 同一道题在一轮中只有一个候选答案，因此不会出现同一 key 的并发写。
pub struct AttemptCache {
    store: Arc<dyn KeyValueStore>,
    state: Arc<Mutex<CacheState>>,
    ttl: chrono::Duration,
    debounce: Duration,
    flush_scheduled: Arc<AtomicBool>,
    /// 防抖写入与 flush 依次进行，后写入的一定是更新的快照
    persist_lock: Arc<AsyncMutex<()>>,
}

impl AttemptCache {
    /// 从存储中加载缓存
    ///
    /// 数据损坏时丢弃旧数据重新开始；超过 TTL 时整体清空并立即写回。
    pub async fn load(store: Arc<dyn KeyValueStore>, config: &CacheConfig) -> AppResult<Self> {
        let now = Utc::now();
        let ttl = config.ttl();

        let stored = match store.get(CACHE_KEY).await {
            Ok(value) => value,
            Err(e) => {
                warn!("⚠️ 读取答案缓存失败，将使用空缓存: {}", e);
                None
            }
        };

        let state = match stored.map(serde_json::from_value::<CacheState>) {
            Some(Ok(state)) if now - state.last_purge > ttl => {
                info!(
                    "🧹 答案缓存已超过有效期（上次清理: {}），清空 {} 条记录",
                    state.last_purge,
                    state.records.len()
                );
                let fresh = CacheState::fresh(now);
                write_state(store.as_ref(), &fresh).await?;
                fresh
            }
            Some(Ok(state)) => {
                debug!("加载答案缓存: {} 条记录", state.records.len());
                state
            }
            Some(Err(e)) => {
                warn!("⚠️ 答案缓存格式异常，已重置: {}", e);
                CacheState::fresh(now)
            }
            None => CacheState::fresh(now),
        };

        Ok(Self {
            store,
            state: Arc::new(Mutex::new(state)),
            ttl,
            debounce: config.debounce(),
            flush_scheduled: Arc::new(AtomicBool::new(false)),
            persist_lock: Arc::new(AsyncMutex::new(())),
        })
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        // 持锁期间不会 panic，中毒时继续使用内部数据
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// 获取某题已尝试过的指纹，未知或过期时返回空集合
    pub fn get_attempted(&self, question_id: &str) -> BTreeSet<Fingerprint> {
        let now = Utc::now();
        self.lock()
            .records
            .get(question_id)
            .filter(|r| now - r.last_updated <= self.ttl)
            .map(|r| r.fingerprints.clone())
            .unwrap_or_default()
    }

    /// 指纹是否已尝试过
    pub fn contains(&self, question_id: &str, fingerprint: &Fingerprint) -> bool {
        self.get_attempted(question_id).contains(fingerprint)
    }

    /// 原始答案（任意写法）是否已尝试过，无法识别的答案视为未尝试
    pub fn has_attempted(&self, question_id: &str, question_type: QuestionType, candidate: &str) -> bool {
        match normalize_answer(candidate, question_type) {
            Ok(fingerprint) => self.contains(question_id, &fingerprint),
            Err(_) => false,
        }
    }

    /// 记录一次尝试
    ///
    /// # 返回
    /// 指纹是新加入的返回 `true`，已存在时不做任何事并返回 `false`
    pub fn add_attempt(&self, question_id: &str, fingerprint: Fingerprint) -> bool {
        let now = Utc::now();
        let inserted = {
            let mut state = self.lock();
            let record = state
                .records
                .entry(question_id.to_string())
                .or_insert_with(|| AttemptRecord {
                    fingerprints: BTreeSet::new(),
                    last_updated: now,
                });
            if now - record.last_updated > self.ttl {
                record.fingerprints.clear();
            }
            let inserted = record.fingerprints.insert(fingerprint);
            if inserted {
                record.last_updated = now;
            }
            inserted
        };

        if inserted {
            self.schedule_persist();
        }
        inserted
    }

    /// 清除一道题的记录（答对后调用）
    pub fn clear(&self, question_id: &str) {
        let removed = self.lock().records.remove(question_id).is_some();
        if removed {
            debug!("[题目 {}] 清除答案缓存", question_id);
            self.schedule_persist();
        }
    }

    /// 清空全部记录
    pub fn clear_all(&self) {
        {
            let mut state = self.lock();
            state.records.clear();
        }
        info!("🧹 已清空答案缓存");
        self.schedule_persist();
    }

    /// 立即写入存储（会话结束时调用）
    pub async fn flush(&self) -> AppResult<()> {
        let _persist = self.persist_lock.lock().await;
        let snapshot = self.lock().clone();
        write_state(self.store.as_ref(), &snapshot).await
    }

    /// 安排一次防抖写入：窗口内已有待写任务时直接返回
    fn schedule_persist(&self) {
        if self.flush_scheduled.swap(true, Ordering::SeqCst) {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            // 不在运行时中，等待下一次 flush
            self.flush_scheduled.store(false, Ordering::SeqCst);
            return;
        };

        let store = Arc::clone(&self.store);
        let state = Arc::clone(&self.state);
        let flag = Arc::clone(&self.flush_scheduled);
        let persist_lock = Arc::clone(&self.persist_lock);
        let debounce = self.debounce;

        handle.spawn(async move {
            tokio::time::sleep(debounce).await;
            flag.store(false, Ordering::SeqCst);
            let _persist = persist_lock.lock().await;
            let snapshot = state
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .clone();
            if let Err(e) = write_state(store.as_ref(), &snapshot).await {
                warn!("⚠️ 答案缓存持久化失败: {}", e);
            }
        });
    }
}

async fn write_state(store: &dyn KeyValueStore, state: &CacheState) -> AppResult<()> {
    let value = serde_json::to_value(state)?;
    store.set(CACHE_KEY, value).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{JsonFileStore, MemoryStore};
    use serde_json::json;

    fn config(debounce_ms: u64) -> CacheConfig {
        CacheConfig {
            persist_debounce_ms: debounce_ms,
            ..CacheConfig::default()
        }
    }

    #[tokio::test]
    async fn test_add_is_idempotent() {
        let store = Arc::new(MemoryStore::new());
        let cache = AttemptCache::load(store, &config(0)).await.unwrap();

        assert!(cache.add_attempt("q1", Fingerprint::for_option(0)));
        assert!(!cache.add_attempt("q1", Fingerprint::for_option(0)));
        assert!(cache.add_attempt("q1", Fingerprint::for_option(2)));

        let attempted = cache.get_attempted("q1");
        assert_eq!(attempted.len(), 2);
        assert!(cache.get_attempted("q2").is_empty());
    }

    #[tokio::test]
    async fn test_has_attempted_normalizes_candidate() {
        let store = Arc::new(MemoryStore::new());
        let cache = AttemptCache::load(store, &config(0)).await.unwrap();
        cache.add_attempt("q1", Fingerprint::for_option(1));

        assert!(cache.has_attempted("q1", QuestionType::Single, "B"));
        assert!(cache.has_attempted("q1", QuestionType::Single, "1"));
        assert!(cache.has_attempted("q1", QuestionType::Single, " b. "));
        assert!(!cache.has_attempted("q1", QuestionType::Single, "C"));
        assert!(!cache.has_attempted("q1", QuestionType::Single, "???"));
    }

    #[tokio::test]
    async fn test_clear_single_and_all() {
        let store = Arc::new(MemoryStore::new());
        let cache = AttemptCache::load(store, &config(0)).await.unwrap();
        cache.add_attempt("q1", Fingerprint::for_boolean(true));
        cache.add_attempt("q2", Fingerprint::for_boolean(false));

        cache.clear("q1");
        assert!(cache.get_attempted("q1").is_empty());
        assert_eq!(cache.get_attempted("q2").len(), 1);

        cache.clear_all();
        assert!(cache.get_attempted("q2").is_empty());
    }

    #[tokio::test]
    async fn test_debounced_persist_batches_writes() {
        let store = Arc::new(MemoryStore::new());
        let cache = AttemptCache::load(store.clone(), &config(50)).await.unwrap();

        cache.add_attempt("q1", Fingerprint::for_option(0));
        cache.add_attempt("q1", Fingerprint::for_option(1));
        cache.add_attempt("q2", Fingerprint::for_option(3));
        assert_eq!(store.write_count(), 0);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(store.write_count(), 1);

        let saved = store.get(CACHE_KEY).await.unwrap().unwrap();
        assert_eq!(saved["records"]["q1"]["fingerprints"], json!(["0", "1"]));
        assert_eq!(saved["records"]["q2"]["fingerprints"], json!(["3"]));
    }

    #[tokio::test]
    async fn test_reload_keeps_attempts() {
        let store = Arc::new(MemoryStore::new());
        let cache = AttemptCache::load(store.clone(), &config(0)).await.unwrap();
        cache.add_attempt("q1", Fingerprint::from_stored("所有权"));
        cache.flush().await.unwrap();

        let reloaded = AttemptCache::load(store, &config(0)).await.unwrap();
        assert!(reloaded.contains("q1", &Fingerprint::from_stored("所有权")));
    }

    #[tokio::test]
    async fn test_expired_cache_is_purged_on_load() {
        let store = Arc::new(MemoryStore::new());
        let stale = Utc::now() - chrono::Duration::hours(25);
        store
            .set(
                CACHE_KEY,
                json!({
                    "last_purge": stale,
                    "records": {"q1": {"fingerprints": ["0"], "last_updated": stale}}
                }),
            )
            .await
            .unwrap();

        let cache = AttemptCache::load(store.clone(), &config(0)).await.unwrap();
        assert!(cache.get_attempted("q1").is_empty());

        let saved = store.get(CACHE_KEY).await.unwrap().unwrap();
        let last_purge: DateTime<Utc> = serde_json::from_value(saved["last_purge"].clone()).unwrap();
        assert!(Utc::now() - last_purge < chrono::Duration::minutes(1));
        assert_eq!(saved["records"], json!({}));
    }

    #[tokio::test]
    async fn test_stale_record_reads_as_empty() {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();
        let old = now - chrono::Duration::hours(30);
        store
            .set(
                CACHE_KEY,
                json!({
                    "last_purge": now,
                    "records": {"q1": {"fingerprints": ["0"], "last_updated": old}}
                }),
            )
            .await
            .unwrap();

        let cache = AttemptCache::load(store, &config(0)).await.unwrap();
        assert!(cache.get_attempted("q1").is_empty());
        assert!(cache.add_attempt("q1", Fingerprint::for_option(2)));
        assert_eq!(cache.get_attempted("q1").len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_persist_keeps_file_readable() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(JsonFileStore::open(dir.path()).await.unwrap());
        let cache = Arc::new(AttemptCache::load(store.clone(), &config(0)).await.unwrap());

        let tasks: Vec<_> = (0..40)
            .map(|i| {
                let cache = cache.clone();
                tokio::spawn(async move {
                    cache.add_attempt(&format!("q{}", i % 8), Fingerprint::for_option(i));
                    cache.flush().await
                })
            })
            .collect();
        for result in futures::future::join_all(tasks).await {
            tokio_test::assert_ok!(result.unwrap());
        }
        cache.flush().await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        // 文件完整可读，所有尝试都在
        let saved = store.get(CACHE_KEY).await.unwrap();
        assert!(saved.is_some());
        let reloaded = AttemptCache::load(store, &config(0)).await.unwrap();
        let total: usize = (0..8)
            .map(|q| reloaded.get_attempted(&format!("q{}", q)).len())
            .sum();
        assert_eq!(total, 40);
    }

    #[tokio::test]
    async fn test_corrupted_cache_is_reset() {
        let store = Arc::new(MemoryStore::new());
        store.set(CACHE_KEY, json!("garbage")).await.unwrap();
        let cache = AttemptCache::load(store, &config(0)).await.unwrap();
        assert!(cache.get_attempted("q1").is_empty());
    }
}
