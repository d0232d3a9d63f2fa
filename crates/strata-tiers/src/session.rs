//! Session tier: per-conversation LRU with importance-weighted eviction.
//!
//! Each conversation owns its own lock so cross-conversation traffic runs in
//! parallel. Global operations take the conversation locks in sorted-id
//! order. Overflowing a conversation evicts the lowest-weight entry, where
//! weight combines priority, access frequency, and recency. Long runs of
//! adjacent conversation/note items are consolidated into a single
//! synthesized item once a conversation grows past the threshold.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use strata_core::clock::Clock;
use strata_core::defaults::{CONSOLIDATION_SEPARATOR, SESSION_HOT_ACCESS, SESSION_WARM_ACCESS};
use strata_core::models::{ContextItem, ContextKind, MetaValue, Metadata, Priority};
use strata_core::scoring::{jaccard, recency_decay};
use strata_core::SessionConfig;
use strata_index::token_set;

/// Lifecycle state of a session entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Fresh,
    Warm,
    /// Promotion candidate for the long-term tier.
    Hot,
}

/// Compute the entry state from access tracking.
pub fn entry_state(item: &ContextItem) -> EntryState {
    if item.access_count >= SESSION_HOT_ACCESS && item.priority >= Priority::High {
        EntryState::Hot
    } else if item.access_count >= SESSION_WARM_ACCESS {
        EntryState::Warm
    } else {
        EntryState::Fresh
    }
}

/// Counters exposed through `stats()`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionMetrics {
    pub total_adds: u64,
    pub total_evictions: u64,
    pub total_consolidations: u64,
    pub active_conversations: usize,
}

#[derive(Debug, Default)]
struct Conversation {
    /// LRU order: most recently used at the front.
    order: VecDeque<Uuid>,
    items: HashMap<Uuid, ContextItem>,
}

impl Conversation {
    fn move_to_front(&mut self, id: Uuid) {
        if let Some(pos) = self.order.iter().position(|&x| x == id) {
            self.order.remove(pos);
        }
        self.order.push_front(id);
    }

    fn remove(&mut self, id: Uuid) -> Option<ContextItem> {
        self.order.retain(|&x| x != id);
        self.items.remove(&id)
    }
}

/// The session tier.
pub struct SessionTier {
    config: SessionConfig,
    clock: Arc<dyn Clock>,
    conversations: RwLock<HashMap<String, Arc<Mutex<Conversation>>>>,
    total_adds: AtomicU64,
    total_evictions: AtomicU64,
    total_consolidations: AtomicU64,
}

impl SessionTier {
    pub fn new(config: SessionConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            conversations: RwLock::new(HashMap::new()),
            total_adds: AtomicU64::new(0),
            total_evictions: AtomicU64::new(0),
            total_consolidations: AtomicU64::new(0),
        }
    }

    fn conversation(&self, conversation_id: &str) -> Arc<Mutex<Conversation>> {
        if let Some(conv) = self.conversations.read().unwrap().get(conversation_id) {
            return conv.clone();
        }
        self.conversations
            .write()
            .unwrap()
            .entry(conversation_id.to_string())
            .or_default()
            .clone()
    }

    /// Existing conversation handle; read paths must not create one.
    fn existing_conversation(&self, conversation_id: &str) -> Option<Arc<Mutex<Conversation>>> {
        self.conversations
            .read()
            .unwrap()
            .get(conversation_id)
            .cloned()
    }

    /// Sorted conversation handles. Global operations lock in this order to
    /// avoid deadlock.
    fn conversations_sorted(&self) -> Vec<(String, Arc<Mutex<Conversation>>)> {
        let map = self.conversations.read().unwrap();
        let mut convs: Vec<(String, Arc<Mutex<Conversation>>)> = map
            .iter()
            .map(|(id, conv)| (id.clone(), conv.clone()))
            .collect();
        convs.sort_by(|a, b| a.0.cmp(&b.0));
        convs
    }

    /// Insert an item (or move it to the LRU front). Evicts the
    /// lowest-weight entry when the conversation overflows; the evicted item
    /// is returned so callers can observe it.
    pub fn add(&self, item: ContextItem, conversation_id: &str) -> Option<ContextItem> {
        let handle = self.conversation(conversation_id);
        let mut conv = handle.lock().unwrap();
        let now = self.clock.now();

        if conv.items.contains_key(&item.id) {
            conv.move_to_front(item.id);
            conv.items.insert(item.id, item);
            return None;
        }

        let mut evicted = None;
        if conv.items.len() >= self.config.capacity_per_conv {
            evicted = self.evict_lowest_weight(&mut conv, now);
        }

        conv.order.push_front(item.id);
        conv.items.insert(item.id, item);
        self.total_adds.fetch_add(1, Ordering::Relaxed);
        evicted
    }

    /// Bump an item to the LRU front and record the access.
    pub fn touch(&self, conversation_id: &str, id: Uuid) -> Option<u32> {
        let handle = self.existing_conversation(conversation_id)?;
        let mut conv = handle.lock().unwrap();
        let now = self.clock.now();

        let item = conv.items.get_mut(&id)?;
        item.mark_accessed(now);
        let count = item.access_count;
        conv.move_to_front(id);
        Some(count)
    }

    /// Fetch an item.
    pub fn get(&self, conversation_id: &str, id: Uuid) -> Option<ContextItem> {
        let handle = self.existing_conversation(conversation_id)?;
        let conv = handle.lock().unwrap();
        conv.items.get(&id).cloned()
    }

    /// Look an item up across conversations (scans in sorted order).
    pub fn find(&self, id: Uuid) -> Option<(String, ContextItem)> {
        for (conv_id, handle) in self.conversations_sorted() {
            let conv = handle.lock().unwrap();
            if let Some(item) = conv.items.get(&id) {
                return Some((conv_id, item.clone()));
            }
        }
        None
    }

    /// Delete an item wherever it lives. Returns whether it was present.
    pub fn delete(&self, id: Uuid) -> bool {
        for (_, handle) in self.conversations_sorted() {
            let mut conv = handle.lock().unwrap();
            if conv.remove(id).is_some() {
                return true;
            }
        }
        false
    }

    /// Score items against a query:
    /// `0.5·jaccard + 0.3·recency_decay + 0.2·priority/1.5`.
    ///
    /// Restricted to one conversation when `conversation_id` is given,
    /// otherwise scanning all conversations in sorted order. Items matching
    /// every metadata filter entry participate; others are skipped before
    /// scoring.
    pub fn search(
        &self,
        query: &str,
        conversation_id: Option<&str>,
        filters: Option<&Metadata>,
        max_results: usize,
    ) -> Vec<(ContextItem, f32)> {
        let now = self.clock.now();
        let query_terms = token_set(query);
        let decay_window = Duration::seconds(self.config.half_life_seconds * 2);

        let handles: Vec<(String, Arc<Mutex<Conversation>>)> = match conversation_id {
            Some(id) => self
                .existing_conversation(id)
                .map(|h| vec![(id.to_string(), h)])
                .unwrap_or_default(),
            None => self.conversations_sorted(),
        };

        let mut scored = Vec::new();
        for (_, handle) in handles {
            let conv = handle.lock().unwrap();
            for item in conv.items.values() {
                if let Some(filters) = filters {
                    if !metadata_matches(&item.metadata, filters) {
                        continue;
                    }
                }
                let relevance = if query_terms.is_empty() {
                    0.0
                } else {
                    jaccard(&query_terms, &token_set(&item.content))
                };
                let recency = recency_decay(now - item.last_accessed_at, decay_window);
                let priority = item.priority_weight() / 1.5;
                let score = 0.5 * relevance + 0.3 * recency + 0.2 * priority;
                scored.push((item.clone(), score));
            }
        }

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.0.last_accessed_at.cmp(&a.0.last_accessed_at))
                .then_with(|| a.0.id.cmp(&b.0.id))
        });
        scored.truncate(max_results);
        scored
    }

    /// All items of a conversation in LRU order, front first.
    pub fn list(&self, conversation_id: &str) -> Vec<ContextItem> {
        let Some(handle) = self.existing_conversation(conversation_id) else {
            return Vec::new();
        };
        let conv = handle.lock().unwrap();
        conv.order
            .iter()
            .filter_map(|id| conv.items.get(id).cloned())
            .collect()
    }

    /// Conversation history ordered by creation time, oldest first.
    pub fn conversation_context(
        &self,
        conversation_id: &str,
        max_items: Option<usize>,
    ) -> Vec<ContextItem> {
        let Some(handle) = self.existing_conversation(conversation_id) else {
            return Vec::new();
        };
        let conv = handle.lock().unwrap();
        let mut items: Vec<ContextItem> = conv.items.values().cloned().collect();
        items.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        if let Some(max) = max_items {
            let skip = items.len().saturating_sub(max);
            items.drain(..skip);
        }
        items
    }

    /// Items tagged with the given task id, highest priority first.
    pub fn task_context(&self, task_id: &str) -> Vec<ContextItem> {
        let mut items = Vec::new();
        for (_, handle) in self.conversations_sorted() {
            let conv = handle.lock().unwrap();
            items.extend(
                conv.items
                    .values()
                    .filter(|i| i.task_id() == Some(task_id))
                    .cloned(),
            );
        }
        items.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(b.created_at.cmp(&a.created_at))
                .then(a.id.cmp(&b.id))
        });
        items
    }

    /// Consolidate a conversation: when it holds at least
    /// `consolidation_threshold` conversation/note items, fold runs of
    /// adjacent same-topic items (chronological order) into one synthesized
    /// item whose content joins the sources and whose priority is their
    /// maximum. Returns the number of runs folded.
    pub fn consolidate(&self, conversation_id: &str) -> usize {
        let Some(handle) = self.existing_conversation(conversation_id) else {
            return 0;
        };
        let mut conv = handle.lock().unwrap();
        self.consolidate_locked(&mut conv, conversation_id)
    }

    /// Consolidate every conversation, locking in sorted-id order.
    pub fn consolidate_all(&self) -> usize {
        let mut folded = 0;
        for (conv_id, handle) in self.conversations_sorted() {
            let mut conv = handle.lock().unwrap();
            folded += self.consolidate_locked(&mut conv, &conv_id);
        }
        folded
    }

    fn consolidate_locked(&self, conv: &mut Conversation, conversation_id: &str) -> usize {
        let foldable = conv
            .items
            .values()
            .filter(|i| matches!(i.kind, ContextKind::Conversation | ContextKind::Note))
            .count();
        if foldable < self.config.consolidation_threshold {
            return 0;
        }

        // Chronological walk, grouping adjacent foldable items by topic.
        let mut timeline: Vec<ContextItem> = conv.items.values().cloned().collect();
        timeline.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

        let mut runs: Vec<Vec<ContextItem>> = Vec::new();
        let mut current: Vec<ContextItem> = Vec::new();
        for item in timeline {
            let foldable = matches!(item.kind, ContextKind::Conversation | ContextKind::Note);
            let same_topic = current
                .last()
                .map(|prev: &ContextItem| topic_of(prev) == topic_of(&item))
                .unwrap_or(true);
            if foldable && same_topic {
                current.push(item);
            } else {
                if current.len() >= 2 {
                    runs.push(std::mem::take(&mut current));
                } else {
                    current.clear();
                }
                if foldable {
                    current.push(item);
                }
            }
        }
        if current.len() >= 2 {
            runs.push(current);
        }

        let now = self.clock.now();
        let folded = runs.len();
        for run in runs {
            let content = run
                .iter()
                .map(|i| i.content.as_str())
                .collect::<Vec<_>>()
                .join(CONSOLIDATION_SEPARATOR);
            let priority = run.iter().map(|i| i.priority).max().unwrap_or_default();
            let first = &run[0];

            let mut metadata = Metadata::new();
            metadata.insert("type".into(), MetaValue::from("conversation"));
            metadata.insert("consolidated".into(), MetaValue::Bool(true));
            metadata.insert(
                "original_count".into(),
                MetaValue::Int(run.len() as i64),
            );
            if let Some(topic) = topic_of(first) {
                metadata.insert("topic".into(), MetaValue::from(topic));
            }

            let mut synthesized = ContextItem::new(content, metadata, now)
                .expect("consolidated content is non-empty");
            synthesized.kind = ContextKind::Conversation;
            synthesized.priority = priority;
            synthesized.conversation_id = Some(conversation_id.to_string());
            synthesized.created_at = first.created_at;

            for item in &run {
                conv.remove(item.id);
            }
            conv.order.push_front(synthesized.id);
            conv.items.insert(synthesized.id, synthesized);
        }

        if folded > 0 {
            self.total_consolidations.fetch_add(1, Ordering::Relaxed);
            info!(
                conversation_id,
                runs = folded,
                remaining = conv.items.len(),
                "Consolidated session runs"
            );
        }
        folded
    }

    /// Clear one conversation, or everything.
    pub fn clear(&self, conversation_id: Option<&str>) -> usize {
        match conversation_id {
            Some(id) => {
                let removed = {
                    let map = self.conversations.read().unwrap();
                    map.get(id).map(|handle| {
                        let mut conv = handle.lock().unwrap();
                        let count = conv.items.len();
                        conv.items.clear();
                        conv.order.clear();
                        count
                    })
                };
                self.conversations.write().unwrap().remove(id);
                removed.unwrap_or(0)
            }
            None => {
                let mut map = self.conversations.write().unwrap();
                let count = map
                    .values()
                    .map(|handle| handle.lock().unwrap().items.len())
                    .sum();
                map.clear();
                count
            }
        }
    }

    /// Every item across conversations, in sorted-conversation order.
    pub fn all_items(&self) -> Vec<ContextItem> {
        let mut items = Vec::new();
        for (_, handle) in self.conversations_sorted() {
            let conv = handle.lock().unwrap();
            items.extend(conv.items.values().cloned());
        }
        items
    }

    /// Item count for one conversation.
    pub fn len(&self, conversation_id: &str) -> usize {
        self.conversations
            .read()
            .unwrap()
            .get(conversation_id)
            .map_or(0, |handle| handle.lock().unwrap().items.len())
    }

    /// Total item count across conversations.
    pub fn total_len(&self) -> usize {
        self.conversations_sorted()
            .iter()
            .map(|(_, handle)| handle.lock().unwrap().items.len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total_len() == 0
    }

    /// Metrics snapshot.
    pub fn metrics(&self) -> SessionMetrics {
        SessionMetrics {
            total_adds: self.total_adds.load(Ordering::Relaxed),
            total_evictions: self.total_evictions.load(Ordering::Relaxed),
            total_consolidations: self.total_consolidations.load(Ordering::Relaxed),
            active_conversations: self.conversations.read().unwrap().len(),
        }
    }

    /// Eviction weight:
    /// `priority · (1 + ln(1 + access_count)) · exp(-(now - last_access) / 2·half_life)`.
    fn weight(&self, item: &ContextItem, now: DateTime<Utc>) -> f32 {
        let decay_window = Duration::seconds(self.config.half_life_seconds * 2);
        let decay = recency_decay(now - item.last_accessed_at, decay_window);
        item.priority_weight() * (1.0 + (1.0 + item.access_count as f32).ln()) * decay
    }

    fn evict_lowest_weight(
        &self,
        conv: &mut Conversation,
        now: DateTime<Utc>,
    ) -> Option<ContextItem> {
        let victim = conv
            .items
            .values()
            .map(|item| (item.id, self.weight(item, now), item.last_accessed_at))
            .min_by(|a, b| {
                a.1.partial_cmp(&b.1)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.2.cmp(&b.2))
                    .then_with(|| a.0.cmp(&b.0))
            })
            .map(|(id, weight, _)| (id, weight))?;

        let evicted = conv.remove(victim.0)?;
        self.total_evictions.fetch_add(1, Ordering::Relaxed);
        debug!(
            item_id = %evicted.id,
            tier = "session",
            weight = victim.1,
            "Evicted lowest-weight entry"
        );
        Some(evicted)
    }
}

fn topic_of(item: &ContextItem) -> Option<&str> {
    item.metadata.get("topic").and_then(MetaValue::as_str)
}

fn metadata_matches(metadata: &Metadata, filters: &Metadata) -> bool {
    filters.iter().all(|(key, expected)| {
        metadata.get(key).is_some_and(|actual| match (actual, expected) {
            (MetaValue::StrList(list), MetaValue::Str(s)) => list.contains(s),
            (a, e) => a == e,
        })
    })
}
