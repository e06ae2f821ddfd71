//! Classification and normalization of vendor events.
//!
//! The provider's `type` vocabulary is open-ended and changes without notice,
//! so dispatch happens in two explicit steps:
//!
//! 1. [`classify`] maps the raw `type` string onto a closed [`EventClass`].
//!    Anything it does not recognize becomes [`EventClass::Unclassified`].
//! 2. [`EventNormalizer`] turns the payload into a [`NormalizedEvent`] for its
//!    class, updating the stream's [`ItemStateTracker`] along the way.
//!
//! # Classification table
//!
//! | `type`                                                  | Class                  |
//! |---------------------------------------------------------|------------------------|
//! | `response.<family>.delta`                               | `Delta(family)`        |
//! | `response.<family>.done`                                | `Done(family)`         |
//! | `response.{created,queued,in_progress,completed}`       | `Lifecycle`            |
//! | `response.{failed,incomplete}`                          | `Lifecycle` (terminal) |
//! | `response.output_item.{added,done}`                     | `OutputItem`           |
//! | `response.content_part.{added,done}`                    | `ContentPart`          |
//! | `response.<tool>_call.<phase>`, `response.mcp_list_tools.<phase>` | `ToolStatus` |
//! | `response.output_text.annotation.added`                 | `Annotation`           |
//! | `response.reasoning_summary_part.{added,done}`          | `ReasoningSummaryPart` |
//! | `error`, `response.error`                               | `Error`                |
//!
//! Families: `output_text`, `audio`, `audio.transcript`, `refusal`,
//! `reasoning` (also `reasoning_text`), `reasoning_summary`,
//! `reasoning_summary_text`, `function_call_arguments`,
//! `code_interpreter_call_code` (also `code_interpreter_call.code`),
//! `mcp_call_arguments` (also `mcp_call.arguments`).
//!
//! # Degradation
//!
//! Nothing in here fails the stream. Unparseable payloads, unknown types and
//! delta/done events without an item id all normalize to `None`.

use crate::tracker::ItemStateTracker;
use crate::types::{
    ContentFamily, LifecyclePhase, NormalizedEvent, PartPhase, ResponseInfo, StreamItem,
    ToolPhase, ToolType, Usage, VendorEvent,
};
use serde_json::Value;

/// Closed classification of the open `type` string space
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventClass {
    Delta(ContentFamily),
    Done(ContentFamily),
    Lifecycle(LifecyclePhase),
    OutputItem(PartPhase),
    ContentPart(PartPhase),
    ToolStatus(ToolType, ToolPhase),
    Annotation,
    ReasoningSummaryPart(PartPhase),
    Error,
    Unclassified,
}

/// Classifies a vendor `type` string.
pub fn classify(kind: &str) -> EventClass {
    if kind == "error" {
        return EventClass::Error;
    }
    let Some(name) = kind.strip_prefix("response.") else {
        return EventClass::Unclassified;
    };
    if name == "error" {
        return EventClass::Error;
    }
    if let Some(phase) = lifecycle_phase(name) {
        return EventClass::Lifecycle(phase);
    }
    let Some((head, tail)) = name.rsplit_once('.') else {
        return EventClass::Unclassified;
    };

    match (head, tail) {
        ("output_item", _) => {
            part_phase(tail).map_or(EventClass::Unclassified, EventClass::OutputItem)
        }
        ("content_part", _) => {
            part_phase(tail).map_or(EventClass::Unclassified, EventClass::ContentPart)
        }
        ("reasoning_summary_part", _) => part_phase(tail)
            .map_or(EventClass::Unclassified, EventClass::ReasoningSummaryPart),
        ("output_text.annotation" | "output_text_annotation", "added") => EventClass::Annotation,
        (_, "delta") => content_family(head).map_or(EventClass::Unclassified, EventClass::Delta),
        (_, "done") => content_family(head).map_or(EventClass::Unclassified, EventClass::Done),
        _ => match (tool_type(head), tool_phase(tail)) {
            (Some(tool), Some(phase)) => EventClass::ToolStatus(tool, phase),
            _ => EventClass::Unclassified,
        },
    }
}

fn lifecycle_phase(name: &str) -> Option<LifecyclePhase> {
    match name {
        "created" => Some(LifecyclePhase::Created),
        "queued" => Some(LifecyclePhase::Queued),
        "in_progress" => Some(LifecyclePhase::InProgress),
        "completed" => Some(LifecyclePhase::Completed),
        "failed" => Some(LifecyclePhase::Failed),
        "incomplete" => Some(LifecyclePhase::Incomplete),
        _ => None,
    }
}

fn part_phase(tail: &str) -> Option<PartPhase> {
    match tail {
        "added" => Some(PartPhase::Added),
        "done" => Some(PartPhase::Done),
        _ => None,
    }
}

fn content_family(head: &str) -> Option<ContentFamily> {
    match head {
        "output_text" | "text" => Some(ContentFamily::Text),
        "audio" => Some(ContentFamily::Audio),
        "audio.transcript" | "audio_transcript" => Some(ContentFamily::AudioTranscript),
        "refusal" => Some(ContentFamily::Refusal),
        "reasoning" | "reasoning_text" => Some(ContentFamily::Reasoning),
        "reasoning_summary" => Some(ContentFamily::ReasoningSummary),
        "reasoning_summary_text" => Some(ContentFamily::ReasoningSummaryText),
        "function_call_arguments" => Some(ContentFamily::FunctionCallArguments),
        "code_interpreter_call_code" | "code_interpreter_call.code" => {
            Some(ContentFamily::CodeInterpreterCode)
        }
        "mcp_call_arguments" | "mcp_call.arguments" => Some(ContentFamily::McpCallArguments),
        _ => None,
    }
}

fn tool_type(head: &str) -> Option<ToolType> {
    match head {
        "file_search_call" => Some(ToolType::FileSearch),
        "code_interpreter_call" => Some(ToolType::CodeInterpreter),
        "web_search_call" => Some(ToolType::WebSearch),
        "image_generation_call" => Some(ToolType::ImageGeneration),
        "mcp_call" => Some(ToolType::McpCall),
        "mcp_list_tools" => Some(ToolType::McpListTools),
        _ => None,
    }
}

fn tool_phase(tail: &str) -> Option<ToolPhase> {
    match tail {
        "in_progress" => Some(ToolPhase::InProgress),
        "searching" => Some(ToolPhase::Searching),
        "interpreting" => Some(ToolPhase::Interpreting),
        "generating" => Some(ToolPhase::Generating),
        "partial_image" => Some(ToolPhase::PartialImage),
        "completed" => Some(ToolPhase::Completed),
        "failed" => Some(ToolPhase::Failed),
        _ => None,
    }
}

/// Converts vendor payloads into [`NormalizedEvent`]s for one stream.
#[derive(Debug)]
pub struct EventNormalizer {
    tracker: ItemStateTracker,
    response_id: Option<String>,
    usage: Option<Usage>,
    ignored: u64,
}

impl EventNormalizer {
    pub fn new(tracker: ItemStateTracker) -> Self {
        Self {
            tracker,
            response_id: None,
            usage: None,
            ignored: 0,
        }
    }

    pub fn tracker(&self) -> &ItemStateTracker {
        &self.tracker
    }

    /// Id of the response, once a lifecycle event has reported it
    pub fn response_id(&self) -> Option<&str> {
        self.response_id.as_deref()
    }

    /// Most recent usage reported by a lifecycle event
    pub fn usage(&self) -> Option<&Usage> {
        self.usage.as_ref()
    }

    /// Payloads that produced no event (unparseable, unknown type, missing id)
    pub fn ignored(&self) -> u64 {
        self.ignored
    }

    pub fn normalize(&mut self, payload: &str) -> Option<NormalizedEvent> {
        self.normalize_slice(payload.as_bytes())
    }

    /// Parses a JSON payload and normalizes it. Unparseable payloads yield `None`.
    pub fn normalize_slice(&mut self, payload: &[u8]) -> Option<NormalizedEvent> {
        match serde_json::from_slice::<VendorEvent>(payload) {
            Ok(event) => self.normalize_event(event),
            Err(e) => {
                log::debug!("skipping unparseable SSE payload: {}", e);
                self.ignored += 1;
                None
            }
        }
    }

    pub fn normalize_event(&mut self, event: VendorEvent) -> Option<NormalizedEvent> {
        let normalized = self.convert(&event);
        if normalized.is_none() {
            self.ignored += 1;
        }
        normalized
    }

    fn convert(&mut self, event: &VendorEvent) -> Option<NormalizedEvent> {
        match classify(&event.kind) {
            EventClass::Delta(family) => self.delta(event, family),
            EventClass::Done(family) => self.done(event, family),
            EventClass::Lifecycle(phase) => Some(self.lifecycle(event, phase)),
            EventClass::OutputItem(phase) => self.output_item(event, phase),
            EventClass::ContentPart(phase) => {
                let item_id = event.resolved_item_id()?.to_string();
                Some(NormalizedEvent::ContentPart {
                    item_id,
                    content_index: event.content_index,
                    phase,
                    part_type: event
                        .part
                        .as_ref()
                        .and_then(|p| p.get("type"))
                        .and_then(Value::as_str)
                        .map(str::to_string),
                })
            }
            EventClass::ToolStatus(tool_type, phase) => {
                let item_id = event.resolved_item_id()?.to_string();
                self.tracker
                    .set_status(&item_id, tool_type.item_type(), phase.item_status());
                Some(NormalizedEvent::ToolStatus {
                    item_id,
                    tool_type,
                    phase,
                })
            }
            EventClass::Annotation => Some(NormalizedEvent::Annotation {
                item_id: event.item_id.clone(),
                content_index: event.content_index,
                annotation: event.annotation.clone().unwrap_or(Value::Null),
            }),
            EventClass::ReasoningSummaryPart(phase) => {
                let item_id = event.resolved_item_id()?.to_string();
                Some(NormalizedEvent::ReasoningSummaryPart {
                    item_id,
                    summary_index: event.summary_index,
                    phase,
                })
            }
            EventClass::Error => Some(error_event(event)),
            EventClass::Unclassified => {
                log::trace!("ignoring unrecognized event type '{}'", event.kind);
                None
            }
        }
    }

    fn delta(&mut self, event: &VendorEvent, family: ContentFamily) -> Option<NormalizedEvent> {
        let Some(item_id) = event.resolved_item_id() else {
            log::debug!("dropping '{}' without item id", event.kind);
            return None;
        };
        let text = event.delta_text().unwrap_or_default();
        self.tracker.append_delta(item_id, family, &text);

        Some(NormalizedEvent::Delta {
            item_id: item_id.to_string(),
            content_type: family,
            text,
            output_index: event.output_index,
            content_index: event.content_index,
        })
    }

    fn done(&mut self, event: &VendorEvent, family: ContentFamily) -> Option<NormalizedEvent> {
        let Some(item_id) = event.resolved_item_id() else {
            log::debug!("dropping '{}' without item id", event.kind);
            return None;
        };
        let final_text = event.final_text(family);
        self.tracker.finalize(item_id, family, final_text);

        Some(NormalizedEvent::Done {
            item_id: item_id.to_string(),
            content_type: family,
            final_text: final_text.map(str::to_string),
            output_index: event.output_index,
        })
    }

    fn lifecycle(&mut self, event: &VendorEvent, phase: LifecyclePhase) -> NormalizedEvent {
        let response = event
            .response
            .as_ref()
            .map(ResponseInfo::from)
            .unwrap_or_default();
        if let Some(id) = &response.id {
            self.response_id = Some(id.clone());
        }
        if let Some(usage) = &response.usage {
            self.usage = Some(usage.clone());
        }

        NormalizedEvent::Lifecycle {
            response_id: self.response_id.clone(),
            phase,
            response,
        }
    }

    fn output_item(&mut self, event: &VendorEvent, phase: PartPhase) -> Option<NormalizedEvent> {
        let fallback_id = event.item_id.as_deref();
        let item = match &event.item {
            Some(vendor) => StreamItem::from_vendor(vendor, fallback_id),
            None => fallback_id.map(StreamItem::placeholder),
        };
        let Some(item) = item else {
            log::debug!("dropping '{}' without item id", event.kind);
            return None;
        };

        match phase {
            PartPhase::Added => {
                let item = if item.item_type.is_tool_call() {
                    self.tracker.register(item)
                } else {
                    item
                };
                Some(NormalizedEvent::ItemAdded {
                    item,
                    output_index: event.output_index,
                })
            }
            PartPhase::Done => {
                let id = item.id.clone();
                let item = self.tracker.complete(&id, Some(item));
                Some(NormalizedEvent::ItemDone {
                    item,
                    output_index: event.output_index,
                })
            }
        }
    }
}

fn error_event(event: &VendorEvent) -> NormalizedEvent {
    let nested = event.error.as_ref();
    let message = event
        .message
        .clone()
        .or_else(|| {
            nested
                .and_then(|e| e.get("message"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| "unknown stream error".to_string());
    let code = event
        .code
        .as_ref()
        .or_else(|| nested.and_then(|e| e.get("code")))
        .and_then(|c| match c {
            Value::String(s) => Some(s.clone()),
            Value::Null => None,
            other => Some(other.to_string()),
        });

    NormalizedEvent::Error { message, code }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ItemStatus, ItemType};
    use serde_json::json;

    fn normalizer() -> EventNormalizer {
        EventNormalizer::new(ItemStateTracker::new())
    }

    fn feed(n: &mut EventNormalizer, value: Value) -> Option<NormalizedEvent> {
        n.normalize(&value.to_string())
    }

    #[test]
    fn test_classify_delta_and_done_families() {
        let cases = [
            ("output_text", ContentFamily::Text),
            ("audio", ContentFamily::Audio),
            ("audio.transcript", ContentFamily::AudioTranscript),
            ("refusal", ContentFamily::Refusal),
            ("reasoning", ContentFamily::Reasoning),
            ("reasoning_text", ContentFamily::Reasoning),
            ("reasoning_summary", ContentFamily::ReasoningSummary),
            ("reasoning_summary_text", ContentFamily::ReasoningSummaryText),
            ("function_call_arguments", ContentFamily::FunctionCallArguments),
            ("code_interpreter_call_code", ContentFamily::CodeInterpreterCode),
            ("code_interpreter_call.code", ContentFamily::CodeInterpreterCode),
            ("mcp_call_arguments", ContentFamily::McpCallArguments),
            ("mcp_call.arguments", ContentFamily::McpCallArguments),
        ];
        for (head, family) in cases {
            assert_eq!(
                classify(&format!("response.{}.delta", head)),
                EventClass::Delta(family),
                "{}",
                head
            );
            assert_eq!(
                classify(&format!("response.{}.done", head)),
                EventClass::Done(family),
                "{}",
                head
            );
        }
    }

    #[test]
    fn test_classify_lifecycle() {
        assert_eq!(
            classify("response.created"),
            EventClass::Lifecycle(LifecyclePhase::Created)
        );
        assert_eq!(
            classify("response.in_progress"),
            EventClass::Lifecycle(LifecyclePhase::InProgress)
        );
        assert_eq!(
            classify("response.queued"),
            EventClass::Lifecycle(LifecyclePhase::Queued)
        );
        assert_eq!(
            classify("response.completed"),
            EventClass::Lifecycle(LifecyclePhase::Completed)
        );
        assert_eq!(
            classify("response.failed"),
            EventClass::Lifecycle(LifecyclePhase::Failed)
        );
        assert_eq!(
            classify("response.incomplete"),
            EventClass::Lifecycle(LifecyclePhase::Incomplete)
        );
    }

    #[test]
    fn test_classify_items_and_parts() {
        assert_eq!(
            classify("response.output_item.added"),
            EventClass::OutputItem(PartPhase::Added)
        );
        assert_eq!(
            classify("response.output_item.done"),
            EventClass::OutputItem(PartPhase::Done)
        );
        assert_eq!(
            classify("response.content_part.added"),
            EventClass::ContentPart(PartPhase::Added)
        );
        assert_eq!(
            classify("response.content_part.done"),
            EventClass::ContentPart(PartPhase::Done)
        );
        assert_eq!(
            classify("response.reasoning_summary_part.added"),
            EventClass::ReasoningSummaryPart(PartPhase::Added)
        );
        assert_eq!(
            classify("response.output_text.annotation.added"),
            EventClass::Annotation
        );
    }

    #[test]
    fn test_classify_tool_status() {
        #[rustfmt::skip]
        let cases = [
            ("file_search_call", "searching", ToolType::FileSearch, ToolPhase::Searching),
            ("code_interpreter_call", "interpreting", ToolType::CodeInterpreter, ToolPhase::Interpreting),
            ("web_search_call", "in_progress", ToolType::WebSearch, ToolPhase::InProgress),
            ("image_generation_call", "partial_image", ToolType::ImageGeneration, ToolPhase::PartialImage),
            ("image_generation_call", "generating", ToolType::ImageGeneration, ToolPhase::Generating),
            ("mcp_call", "failed", ToolType::McpCall, ToolPhase::Failed),
            ("mcp_list_tools", "completed", ToolType::McpListTools, ToolPhase::Completed),
        ];
        for (head, tail, tool, phase) in cases {
            assert_eq!(
                classify(&format!("response.{}.{}", head, tail)),
                EventClass::ToolStatus(tool, phase)
            );
        }
    }

    #[test]
    fn test_classify_errors_and_unknowns() {
        assert_eq!(classify("error"), EventClass::Error);
        assert_eq!(classify("response.error"), EventClass::Error);
        assert_eq!(classify("response.some_future_event"), EventClass::Unclassified);
        assert_eq!(classify("response.output_text.wiggle"), EventClass::Unclassified);
        assert_eq!(classify("response.hologram.delta"), EventClass::Unclassified);
        assert_eq!(classify("conversation.created"), EventClass::Unclassified);
        assert_eq!(classify(""), EventClass::Unclassified);
    }

    #[test]
    fn test_delta_accumulates_and_emits() {
        let mut n = normalizer();
        let event = feed(
            &mut n,
            json!({"type": "response.output_text.delta", "item_id": "msg_1", "output_index": 0, "delta": "Hel"}),
        )
        .unwrap();
        feed(
            &mut n,
            json!({"type": "response.output_text.delta", "item_id": "msg_1", "delta": "lo"}),
        );

        assert_eq!(
            event,
            NormalizedEvent::Delta {
                item_id: "msg_1".to_string(),
                content_type: ContentFamily::Text,
                text: "Hel".to_string(),
                output_index: Some(0),
                content_index: None,
            }
        );
        assert_eq!(
            n.tracker().accumulated("msg_1", ContentFamily::Text).as_deref(),
            Some("Hello")
        );
    }

    #[test]
    fn test_delta_without_item_id_is_dropped() {
        let mut n = normalizer();
        let event = feed(&mut n, json!({"type": "response.output_text.delta", "delta": "x"}));
        assert!(event.is_none());
        assert!(n.tracker().is_empty());
        assert_eq!(n.ignored(), 1);
    }

    #[test]
    fn test_delta_item_id_from_nested_item() {
        let mut n = normalizer();
        let event = feed(
            &mut n,
            json!({"type": "response.refusal.delta", "item": {"id": "msg_2"}, "delta": "no"}),
        )
        .unwrap();
        assert_eq!(event.item_id(), Some("msg_2"));
    }

    #[test]
    fn test_done_replaces_accumulator() {
        let mut n = normalizer();
        feed(
            &mut n,
            json!({"type": "response.output_text.delta", "item_id": "msg_1", "delta": "Helo"}),
        );
        let event = feed(
            &mut n,
            json!({"type": "response.output_text.done", "item_id": "msg_1", "text": "Hello"}),
        )
        .unwrap();

        assert!(matches!(
            event,
            NormalizedEvent::Done { final_text: Some(ref t), .. } if t == "Hello"
        ));
        assert_eq!(
            n.tracker().accumulated("msg_1", ContentFamily::Text).as_deref(),
            Some("Hello")
        );
    }

    #[test]
    fn test_done_without_text_keeps_accumulator() {
        let mut n = normalizer();
        feed(
            &mut n,
            json!({"type": "response.code_interpreter_call_code.delta", "item_id": "ci_1", "delta": "print("}),
        );
        feed(
            &mut n,
            json!({"type": "response.code_interpreter_call_code.delta", "item_id": "ci_1", "delta": "1)"}),
        );
        let event = feed(
            &mut n,
            json!({"type": "response.code_interpreter_call_code.done", "item_id": "ci_1"}),
        )
        .unwrap();

        assert!(matches!(event, NormalizedEvent::Done { final_text: None, .. }));
        assert_eq!(
            n.tracker()
                .accumulated("ci_1", ContentFamily::CodeInterpreterCode)
                .as_deref(),
            Some("print(1)")
        );
    }

    #[test]
    fn test_code_done_uses_code_field() {
        let mut n = normalizer();
        feed(
            &mut n,
            json!({"type": "response.code_interpreter_call_code.done", "item_id": "ci_1", "code": "x = 2"}),
        );
        assert_eq!(
            n.tracker()
                .accumulated("ci_1", ContentFamily::CodeInterpreterCode)
                .as_deref(),
            Some("x = 2")
        );
    }

    #[test]
    fn test_lifecycle_tracks_response_id_and_usage() {
        let mut n = normalizer();
        feed(
            &mut n,
            json!({"type": "response.created", "response": {"id": "resp_1", "status": "in_progress", "model": "gpt-4o"}}),
        );
        let event = feed(
            &mut n,
            json!({"type": "response.completed", "response": {
                "id": "resp_1",
                "status": "completed",
                "usage": {"input_tokens": 3, "output_tokens": 4, "total_tokens": 7}
            }}),
        )
        .unwrap();

        match event {
            NormalizedEvent::Lifecycle {
                response_id, phase, ..
            } => {
                assert_eq!(response_id.as_deref(), Some("resp_1"));
                assert_eq!(phase, LifecyclePhase::Completed);
            }
            other => panic!("expected lifecycle, got {:?}", other),
        }
        assert_eq!(n.response_id(), Some("resp_1"));
        assert_eq!(n.usage().unwrap().total_tokens, 7);
    }

    #[test]
    fn test_lifecycle_without_response_object_reuses_id() {
        let mut n = normalizer();
        feed(&mut n, json!({"type": "response.created", "response": {"id": "resp_9"}}));
        let event = feed(&mut n, json!({"type": "response.in_progress"})).unwrap();
        assert!(matches!(
            event,
            NormalizedEvent::Lifecycle { response_id: Some(ref id), .. } if id == "resp_9"
        ));
    }

    #[test]
    fn test_output_item_added_registers_tool_calls() {
        let mut n = normalizer();
        let event = feed(
            &mut n,
            json!({"type": "response.output_item.added", "output_index": 1, "item": {
                "id": "ci_1",
                "type": "code_interpreter_call",
                "status": "in_progress",
                "container_id": "cntr_42"
            }}),
        )
        .unwrap();

        assert!(matches!(event, NormalizedEvent::ItemAdded { output_index: Some(1), .. }));
        assert_eq!(
            n.tracker().container_for("ci_1").as_deref(),
            Some("cntr_42")
        );
    }

    #[test]
    fn test_output_item_added_message_not_registered() {
        let mut n = normalizer();
        feed(
            &mut n,
            json!({"type": "response.output_item.added", "item": {"id": "msg_1", "type": "message"}}),
        );
        assert!(n.tracker().get("msg_1").is_none());
    }

    #[test]
    fn test_output_item_done_completes_item() {
        let mut n = normalizer();
        feed(
            &mut n,
            json!({"type": "response.output_item.added", "item": {
                "id": "fc_1", "type": "function_call", "call_id": "call_1", "name": "lookup", "arguments": ""
            }}),
        );
        feed(
            &mut n,
            json!({"type": "response.function_call_arguments.delta", "item_id": "fc_1", "delta": "{\"q\":"}),
        );
        feed(
            &mut n,
            json!({"type": "response.function_call_arguments.delta", "item_id": "fc_1", "delta": "1}"}),
        );
        let event = feed(
            &mut n,
            json!({"type": "response.output_item.done", "item": {
                "id": "fc_1", "type": "function_call", "status": "completed", "call_id": "call_1"
            }}),
        )
        .unwrap();

        let NormalizedEvent::ItemDone { item, .. } = event else {
            panic!("expected ItemDone");
        };
        assert_eq!(item.status, ItemStatus::Completed);
        assert_eq!(item.item_type, ItemType::FunctionCall);
        assert_eq!(item.arguments(), Some("{\"q\":1}"));
        assert!(n.tracker().is_terminal("fc_1"));
        assert_eq!(n.tracker().lookup_by_call_id("call_1").unwrap().id, "fc_1");
    }

    #[test]
    fn test_tool_status_updates_tracker() {
        let mut n = normalizer();
        let event = feed(
            &mut n,
            json!({"type": "response.web_search_call.searching", "item_id": "ws_1", "output_index": 0}),
        )
        .unwrap();
        assert_eq!(
            event,
            NormalizedEvent::ToolStatus {
                item_id: "ws_1".to_string(),
                tool_type: ToolType::WebSearch,
                phase: ToolPhase::Searching,
            }
        );
        let item = n.tracker().get("ws_1").unwrap();
        assert_eq!(item.item_type, ItemType::WebSearchCall);
        assert_eq!(item.status, ItemStatus::InProgress);
    }

    #[test]
    fn test_content_part_does_not_touch_tracker() {
        let mut n = normalizer();
        let event = feed(
            &mut n,
            json!({"type": "response.content_part.added", "item_id": "msg_1", "content_index": 0,
                   "part": {"type": "output_text", "text": ""}}),
        )
        .unwrap();
        assert_eq!(
            event,
            NormalizedEvent::ContentPart {
                item_id: "msg_1".to_string(),
                content_index: Some(0),
                phase: PartPhase::Added,
                part_type: Some("output_text".to_string()),
            }
        );
        assert!(n.tracker().is_empty());
    }

    #[test]
    fn test_annotation_event() {
        let mut n = normalizer();
        let event = feed(
            &mut n,
            json!({"type": "response.output_text.annotation.added", "item_id": "msg_1",
                   "content_index": 0, "annotation": {"type": "url_citation", "url": "https://example.com"}}),
        )
        .unwrap();
        let NormalizedEvent::Annotation { annotation, .. } = event else {
            panic!("expected annotation");
        };
        assert_eq!(annotation["type"], "url_citation");
    }

    #[test]
    fn test_error_event_variants() {
        let mut n = normalizer();
        let top = feed(
            &mut n,
            json!({"type": "error", "code": "rate_limit_exceeded", "message": "slow down"}),
        )
        .unwrap();
        assert_eq!(
            top,
            NormalizedEvent::Error {
                message: "slow down".to_string(),
                code: Some("rate_limit_exceeded".to_string()),
            }
        );

        let nested = feed(
            &mut n,
            json!({"type": "response.error", "error": {"message": "boom", "code": 500}}),
        )
        .unwrap();
        assert_eq!(
            nested,
            NormalizedEvent::Error {
                message: "boom".to_string(),
                code: Some("500".to_string()),
            }
        );
    }

    #[test]
    fn test_unknown_event_has_no_effect() {
        let mut n = normalizer();
        feed(
            &mut n,
            json!({"type": "response.output_text.delta", "item_id": "msg_1", "delta": "a"}),
        );
        let event = feed(
            &mut n,
            json!({"type": "response.some_future_event", "item_id": "msg_1", "delta": "zzz"}),
        );
        assert!(event.is_none());
        assert_eq!(
            n.tracker().accumulated("msg_1", ContentFamily::Text).as_deref(),
            Some("a")
        );
        assert_eq!(n.tracker().len(), 1);
    }

    #[test]
    fn test_malformed_json_is_skipped() {
        let mut n = normalizer();
        assert!(n.normalize("{\"type\": \"response.created\"").is_none());
        assert!(n.normalize("not json").is_none());
        assert!(n.normalize("{\"no_type\": true}").is_none());
        assert_eq!(n.ignored(), 3);
    }
}
