//! Per-item accumulation state for one stream.
//!
//! Output items arrive fragmented: a function call's JSON arguments, a code
//! interpreter's source and a message's text are each delivered as many small
//! deltas, interleaved with deltas for other items.
//!
//! ```text
//! output_item.added            { id: "fc_1", type: "function_call", call_id: "call_9" }
//! function_call_arguments.delta { item_id: "fc_1", delta: "{\"a\":1," }
//! output_text.delta             { item_id: "msg_1", delta: "Hel" }
//! function_call_arguments.delta { item_id: "fc_1", delta: "\"b\":2}" }
//! function_call_arguments.done  { item_id: "fc_1" }
//! output_item.done              { item: { id: "fc_1", status: "completed", ... } }
//! ```
//!
//! [`ItemStateTable`] is the arena that owns every live [`StreamItem`] of one
//! stream, keyed by item id, with a secondary index by call id for tool-result
//! correlation. [`ItemStateTracker`] is the shareable handle around it: the
//! stream's producer task is the only writer, but a consumer or logging side
//! channel may read concurrently, so every operation takes the lock.
//!
//! # Cleanup
//!
//! An item is purged once it is terminal, its `ItemDone` chunk has been handed
//! to the consumer, and no tool-result correlation is pending (items with a
//! `call_id` wait for [`ItemStateTracker::release_call`]).

use crate::types::{ContentFamily, ItemStatus, ItemType, StreamItem};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug)]
struct TrackedItem {
    item: StreamItem,
    /// Families that received their `*.done` event
    finalized: BTreeSet<ContentFamily>,
    terminal: bool,
    delivered: bool,
    call_released: bool,
}

impl TrackedItem {
    fn new(item: StreamItem) -> Self {
        Self {
            item,
            finalized: BTreeSet::new(),
            terminal: false,
            delivered: false,
            call_released: false,
        }
    }

    fn purgeable(&self) -> bool {
        self.terminal && self.delivered && (self.item.call_id.is_none() || self.call_released)
    }

    // Metadata from `incoming` wins when present. Accumulated content is only
    // replaced when `authoritative` is set; otherwise it only fills gaps.
    fn merge(&mut self, incoming: StreamItem, authoritative: bool) {
        let current = &mut self.item;
        if incoming.item_type != ItemType::Unknown {
            current.item_type = incoming.item_type;
        }
        if incoming.status != ItemStatus::Unknown {
            current.status = incoming.status;
        }
        if incoming.call_id.is_some() {
            current.call_id = incoming.call_id;
        }
        if incoming.name.is_some() {
            current.name = incoming.name;
        }
        if incoming.container_id.is_some() {
            current.container_id = incoming.container_id;
        }
        if incoming.server_label.is_some() {
            current.server_label = incoming.server_label;
        }
        for (family, text) in incoming.content {
            if authoritative {
                current.content.insert(family, text);
            } else {
                current.content.entry(family).or_insert(text);
            }
        }
    }
}

/// Arena of live items for one stream instance.
#[derive(Debug, Default)]
pub struct ItemStateTable {
    items: HashMap<String, TrackedItem>,
    by_call_id: HashMap<String, String>,
}

impl ItemStateTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&mut self, item_id: &str) -> &mut TrackedItem {
        self.items
            .entry(item_id.to_string())
            .or_insert_with(|| {
                log::trace!("synthesizing placeholder item {}", item_id);
                TrackedItem::new(StreamItem::placeholder(item_id))
            })
    }

    fn index_call_id(&mut self, item_id: &str) {
        if let Some(call_id) = self
            .items
            .get(item_id)
            .and_then(|t| t.item.call_id.clone())
        {
            self.by_call_id.insert(call_id, item_id.to_string());
        }
    }

    fn remove(&mut self, item_id: &str) -> Option<StreamItem> {
        let tracked = self.items.remove(item_id)?;
        if let Some(call_id) = &tracked.item.call_id {
            if self.by_call_id.get(call_id).map(String::as_str) == Some(item_id) {
                self.by_call_id.remove(call_id);
            }
        }
        Some(tracked.item)
    }

    /// Registers an item, or merges metadata into an existing one.
    ///
    /// Idempotent: text already accumulated for the id is never discarded.
    pub fn register(&mut self, item: StreamItem) -> StreamItem {
        let id = item.id.clone();
        match self.items.get_mut(&id) {
            Some(tracked) => tracked.merge(item, false),
            None => {
                self.items.insert(id.clone(), TrackedItem::new(item));
            }
        }
        self.index_call_id(&id);
        self.items[&id].item.clone()
    }

    /// Appends a delta verbatim. Unknown ids get a placeholder item.
    pub fn append_delta(&mut self, item_id: &str, family: ContentFamily, text: &str) {
        let tracked = self.entry(item_id);
        tracked
            .item
            .content
            .entry(family)
            .or_default()
            .push_str(text);
        if tracked.item.status == ItemStatus::Unknown {
            tracked.item.status = ItemStatus::InProgress;
        }
    }

    /// Applies a `*.done` event and returns the resulting text.
    ///
    /// Non-empty `final_text` replaces the accumulator; otherwise the
    /// accumulated deltas are kept as they are.
    pub fn finalize(
        &mut self,
        item_id: &str,
        family: ContentFamily,
        final_text: Option<&str>,
    ) -> String {
        let tracked = self.entry(item_id);
        let slot = tracked.item.content.entry(family).or_default();
        if let Some(text) = final_text.filter(|t| !t.is_empty()) {
            slot.clear();
            slot.push_str(text);
        }
        let result = slot.clone();
        tracked.finalized.insert(family);
        result
    }

    /// Marks an item terminal, merging the final payload if one is given.
    ///
    /// Content carried by the final payload is authoritative.
    pub fn complete(&mut self, item_id: &str, item: Option<StreamItem>) -> StreamItem {
        let tracked = self.entry(item_id);
        if let Some(item) = item {
            tracked.merge(item, true);
        }
        if !tracked.item.status.is_terminal() {
            tracked.item.status = ItemStatus::Completed;
        }
        tracked.terminal = true;
        let snapshot = tracked.item.clone();
        self.index_call_id(item_id);
        snapshot
    }

    /// Records a tool status change, typing placeholders from the tool kind.
    pub fn set_status(&mut self, item_id: &str, item_type: ItemType, status: ItemStatus) {
        let tracked = self.entry(item_id);
        if tracked.item.item_type == ItemType::Unknown {
            tracked.item.item_type = item_type;
        }
        tracked.item.status = status;
    }

    /// Notes that the item's terminal chunk reached the consumer; purges it if eligible.
    pub fn mark_delivered(&mut self, item_id: &str) -> bool {
        let Some(tracked) = self.items.get_mut(item_id) else {
            return false;
        };
        tracked.delivered = true;
        if tracked.purgeable() {
            self.remove(item_id);
            return true;
        }
        false
    }

    /// Marks the tool result for `call_id` as submitted; purges the item if eligible.
    pub fn release_call(&mut self, call_id: &str) -> bool {
        let Some(item_id) = self.by_call_id.get(call_id).cloned() else {
            return false;
        };
        let Some(tracked) = self.items.get_mut(&item_id) else {
            return false;
        };
        tracked.call_released = true;
        if tracked.purgeable() {
            self.remove(&item_id);
        }
        true
    }

    /// Removes every purgeable item, returning how many were removed.
    pub fn purge_completed(&mut self) -> usize {
        let ids: Vec<String> = self
            .items
            .iter()
            .filter(|(_, t)| t.purgeable())
            .map(|(id, _)| id.clone())
            .collect();
        for id in &ids {
            self.remove(id);
        }
        ids.len()
    }

    /// Drops every non-terminal item (partial state of an abandoned stream).
    pub fn discard_partial(&mut self) -> usize {
        let ids: Vec<String> = self
            .items
            .iter()
            .filter(|(_, t)| !t.terminal)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &ids {
            self.remove(id);
        }
        ids.len()
    }

    pub fn get(&self, item_id: &str) -> Option<&StreamItem> {
        self.items.get(item_id).map(|t| &t.item)
    }

    pub fn lookup_by_call_id(&self, call_id: &str) -> Option<&StreamItem> {
        let item_id = self.by_call_id.get(call_id)?;
        self.get(item_id)
    }

    pub fn is_finalized(&self, item_id: &str, family: ContentFamily) -> bool {
        self.items
            .get(item_id)
            .is_some_and(|t| t.finalized.contains(&family))
    }

    pub fn is_terminal(&self, item_id: &str) -> bool {
        self.items.get(item_id).is_some_and(|t| t.terminal)
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.by_call_id.clear();
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Shareable, internally serialized handle to one stream's [`ItemStateTable`].
///
/// Cloning shares the same table; each stream creates its own tracker.
#[derive(Debug, Clone, Default)]
pub struct ItemStateTracker {
    table: Arc<Mutex<ItemStateTable>>,
}

impl ItemStateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ItemStateTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn register(&self, item: StreamItem) -> StreamItem {
        self.lock().register(item)
    }

    pub fn append_delta(&self, item_id: &str, family: ContentFamily, text: &str) {
        self.lock().append_delta(item_id, family, text)
    }

    pub fn finalize(
        &self,
        item_id: &str,
        family: ContentFamily,
        final_text: Option<&str>,
    ) -> String {
        self.lock().finalize(item_id, family, final_text)
    }

    pub fn complete(&self, item_id: &str, item: Option<StreamItem>) -> StreamItem {
        self.lock().complete(item_id, item)
    }

    pub fn set_status(&self, item_id: &str, item_type: ItemType, status: ItemStatus) {
        self.lock().set_status(item_id, item_type, status)
    }

    pub fn mark_delivered(&self, item_id: &str) -> bool {
        self.lock().mark_delivered(item_id)
    }

    pub fn release_call(&self, call_id: &str) -> bool {
        self.lock().release_call(call_id)
    }

    pub fn purge_completed(&self) -> usize {
        self.lock().purge_completed()
    }

    pub fn discard_partial(&self) -> usize {
        self.lock().discard_partial()
    }

    /// Snapshot of an item
    pub fn get(&self, item_id: &str) -> Option<StreamItem> {
        self.lock().get(item_id).cloned()
    }

    /// Snapshot of the item a tool result for `call_id` belongs to
    pub fn lookup_by_call_id(&self, call_id: &str) -> Option<StreamItem> {
        self.lock().lookup_by_call_id(call_id).cloned()
    }

    /// Accumulated text of one family for an item
    pub fn accumulated(&self, item_id: &str, family: ContentFamily) -> Option<String> {
        self.lock()
            .get(item_id)
            .and_then(|item| item.accumulated(family))
            .map(str::to_string)
    }

    /// Code interpreter container associated with an item
    pub fn container_for(&self, item_id: &str) -> Option<String> {
        self.lock()
            .get(item_id)
            .and_then(|item| item.container_id.clone())
    }

    pub fn is_finalized(&self, item_id: &str, family: ContentFamily) -> bool {
        self.lock().is_finalized(item_id, family)
    }

    pub fn is_terminal(&self, item_id: &str) -> bool {
        self.lock().is_terminal(item_id)
    }

    pub fn clear(&self) {
        self.lock().clear()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn function_call(id: &str, call_id: &str) -> StreamItem {
        StreamItem::new(id, ItemType::FunctionCall)
            .with_call_id(call_id)
            .with_name("get_weather")
            .with_status(ItemStatus::InProgress)
    }

    #[test]
    fn test_register_is_idempotent() {
        let mut table = ItemStateTable::new();
        table.register(function_call("fc_1", "call_1"));
        table.append_delta("fc_1", ContentFamily::FunctionCallArguments, "{\"a\":");

        // Re-register with fresh metadata and no content
        let merged = table.register(
            StreamItem::new("fc_1", ItemType::FunctionCall).with_name("get_forecast"),
        );

        assert_eq!(merged.name.as_deref(), Some("get_forecast"));
        assert_eq!(merged.call_id.as_deref(), Some("call_1"));
        assert_eq!(merged.arguments(), Some("{\"a\":"));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_register_does_not_overwrite_with_payload_content() {
        let mut table = ItemStateTable::new();
        table.append_delta("fc_1", ContentFamily::FunctionCallArguments, "{\"a\":1}");

        let mut incoming = function_call("fc_1", "call_1");
        incoming
            .content
            .insert(ContentFamily::FunctionCallArguments, "{}".to_string());
        let merged = table.register(incoming);

        assert_eq!(merged.arguments(), Some("{\"a\":1}"));
        assert_eq!(merged.item_type, ItemType::FunctionCall);
    }

    #[test]
    fn test_append_preserves_whitespace() {
        let mut table = ItemStateTable::new();
        table.append_delta("ci_1", ContentFamily::CodeInterpreterCode, "def f():\n");
        table.append_delta("ci_1", ContentFamily::CodeInterpreterCode, "    return 1\n");
        assert_eq!(
            table.get("ci_1").unwrap().code(),
            Some("def f():\n    return 1\n")
        );
    }

    #[test]
    fn test_append_to_unknown_id_creates_placeholder() {
        let mut table = ItemStateTable::new();
        table.append_delta("msg_9", ContentFamily::Text, "hi");
        let item = table.get("msg_9").unwrap();
        assert_eq!(item.item_type, ItemType::Unknown);
        assert_eq!(item.status, ItemStatus::InProgress);
        assert_eq!(item.text(), Some("hi"));
    }

    #[test]
    fn test_finalize_replaces_with_final_text() {
        let mut table = ItemStateTable::new();
        table.append_delta("msg_1", ContentFamily::Text, "Helo");
        let result = table.finalize("msg_1", ContentFamily::Text, Some("Hello"));
        assert_eq!(result, "Hello");
        assert_eq!(table.get("msg_1").unwrap().text(), Some("Hello"));
        assert!(table.is_finalized("msg_1", ContentFamily::Text));
    }

    #[test]
    fn test_finalize_keeps_accumulated_without_final_text() {
        let mut table = ItemStateTable::new();
        table.append_delta("fc_1", ContentFamily::FunctionCallArguments, "{\"a\":1,");
        table.append_delta("fc_1", ContentFamily::FunctionCallArguments, "\"b\":2}");
        assert_eq!(
            table.finalize("fc_1", ContentFamily::FunctionCallArguments, None),
            "{\"a\":1,\"b\":2}"
        );
        assert_eq!(
            table.finalize("fc_1", ContentFamily::FunctionCallArguments, Some("")),
            "{\"a\":1,\"b\":2}"
        );
    }

    #[test]
    fn test_lookup_by_call_id() {
        let mut table = ItemStateTable::new();
        table.register(function_call("fc_1", "call_1"));
        table.register(function_call("fc_2", "call_2"));

        assert_eq!(table.lookup_by_call_id("call_2").unwrap().id, "fc_2");
        assert!(table.lookup_by_call_id("call_3").is_none());
    }

    #[test]
    fn test_call_id_learned_on_complete() {
        let mut table = ItemStateTable::new();
        table.append_delta("fc_1", ContentFamily::FunctionCallArguments, "{}");
        table.complete("fc_1", Some(function_call("fc_1", "call_7")));
        assert_eq!(table.lookup_by_call_id("call_7").unwrap().id, "fc_1");
    }

    #[test]
    fn test_complete_payload_is_authoritative() {
        let mut table = ItemStateTable::new();
        table.append_delta("fc_1", ContentFamily::FunctionCallArguments, "{\"partial\"");
        let mut done = function_call("fc_1", "call_1").with_status(ItemStatus::Completed);
        done.content
            .insert(ContentFamily::FunctionCallArguments, "{\"full\":1}".to_string());

        let item = table.complete("fc_1", Some(done));
        assert_eq!(item.arguments(), Some("{\"full\":1}"));
        assert_eq!(item.status, ItemStatus::Completed);
        assert!(table.is_terminal("fc_1"));
    }

    #[test]
    fn test_complete_without_payload_defaults_to_completed() {
        let mut table = ItemStateTable::new();
        table.append_delta("msg_1", ContentFamily::Text, "x");
        let item = table.complete("msg_1", None);
        assert_eq!(item.status, ItemStatus::Completed);
    }

    #[test]
    fn test_delivered_item_without_call_id_is_purged() {
        let mut table = ItemStateTable::new();
        table.append_delta("msg_1", ContentFamily::Text, "x");
        table.complete("msg_1", None);
        assert!(table.mark_delivered("msg_1"));
        assert!(table.get("msg_1").is_none());
    }

    #[test]
    fn test_pending_correlation_keeps_item_until_released() {
        let mut table = ItemStateTable::new();
        table.register(function_call("fc_1", "call_1"));
        table.complete("fc_1", None);

        assert!(!table.mark_delivered("fc_1"));
        assert!(table.lookup_by_call_id("call_1").is_some());

        assert!(table.release_call("call_1"));
        assert!(table.get("fc_1").is_none());
        assert!(table.lookup_by_call_id("call_1").is_none());
    }

    #[test]
    fn test_non_terminal_items_are_never_purged() {
        let mut table = ItemStateTable::new();
        table.append_delta("msg_1", ContentFamily::Text, "x");
        assert!(!table.mark_delivered("msg_1"));
        assert_eq!(table.purge_completed(), 0);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_discard_partial_keeps_terminal_items() {
        let mut table = ItemStateTable::new();
        table.register(function_call("fc_1", "call_1"));
        table.complete("fc_1", None);
        table.append_delta("msg_1", ContentFamily::Text, "half");

        assert_eq!(table.discard_partial(), 1);
        assert!(table.get("fc_1").is_some());
        assert!(table.get("msg_1").is_none());
    }

    #[test]
    fn test_set_status_types_placeholder() {
        let mut table = ItemStateTable::new();
        table.set_status("ws_1", ItemType::WebSearchCall, ItemStatus::InProgress);
        let item = table.get("ws_1").unwrap();
        assert_eq!(item.item_type, ItemType::WebSearchCall);
        assert_eq!(item.status, ItemStatus::InProgress);
    }

    #[test]
    fn test_tracker_handle_shares_table() {
        let tracker = ItemStateTracker::new();
        let reader = tracker.clone();

        tracker.register(
            StreamItem::new("ci_1", ItemType::CodeInterpreterCall).with_container_id("cntr_1"),
        );
        tracker.append_delta("ci_1", ContentFamily::CodeInterpreterCode, "print(1)");

        assert_eq!(reader.container_for("ci_1").as_deref(), Some("cntr_1"));
        assert_eq!(
            reader
                .accumulated("ci_1", ContentFamily::CodeInterpreterCode)
                .as_deref(),
            Some("print(1)")
        );
        reader.clear();
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_tracker_concurrent_reader() {
        let tracker = ItemStateTracker::new();
        let reader = tracker.clone();

        let handle = std::thread::spawn(move || {
            for _ in 0..100 {
                let _ = reader.accumulated("msg_1", ContentFamily::Text);
            }
        });
        for _ in 0..100 {
            tracker.append_delta("msg_1", ContentFamily::Text, "a");
        }
        handle.join().unwrap();

        assert_eq!(
            tracker.accumulated("msg_1", ContentFamily::Text).unwrap().len(),
            100
        );
    }
}
