//! Core types for the Responses stream pipeline
//!
//! Two groups live here:
//!
//! - **Vendor wire types** (`VendorEvent`, `VendorItem`, `VendorResponse`): lenient
//!   mirrors of the JSON payloads carried in `data:` records. Every field is optional
//!   so an unfamiliar payload shape degrades to "missing field" instead of a parse failure.
//! - **Normalized types** (`NormalizedEvent`, `StreamItem`, `OutputChunk`): the closed,
//!   strongly-typed shapes the rest of the crate and its callers work with.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

// ============================================================================
// CLASSIFICATION TAGS
// ============================================================================

/// Which accumulator a delta/done event writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentFamily {
    Text,
    Audio,
    AudioTranscript,
    Refusal,
    Reasoning,
    ReasoningSummary,
    ReasoningSummaryText,
    FunctionCallArguments,
    CodeInterpreterCode,
    McpCallArguments,
}

impl ContentFamily {
    /// Every family, in declaration order
    pub const ALL: [ContentFamily; 10] = [
        ContentFamily::Text,
        ContentFamily::Audio,
        ContentFamily::AudioTranscript,
        ContentFamily::Refusal,
        ContentFamily::Reasoning,
        ContentFamily::ReasoningSummary,
        ContentFamily::ReasoningSummaryText,
        ContentFamily::FunctionCallArguments,
        ContentFamily::CodeInterpreterCode,
        ContentFamily::McpCallArguments,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentFamily::Text => "text",
            ContentFamily::Audio => "audio",
            ContentFamily::AudioTranscript => "audio_transcript",
            ContentFamily::Refusal => "refusal",
            ContentFamily::Reasoning => "reasoning",
            ContentFamily::ReasoningSummary => "reasoning_summary",
            ContentFamily::ReasoningSummaryText => "reasoning_summary_text",
            ContentFamily::FunctionCallArguments => "function_call_arguments",
            ContentFamily::CodeInterpreterCode => "code_interpreter_code",
            ContentFamily::McpCallArguments => "mcp_call_arguments",
        }
    }

    /// Families whose accumulated text is tool input (JSON arguments or source code).
    pub fn is_tool_input(&self) -> bool {
        matches!(
            self,
            ContentFamily::FunctionCallArguments
                | ContentFamily::CodeInterpreterCode
                | ContentFamily::McpCallArguments
        )
    }
}

impl fmt::Display for ContentFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Response-level lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecyclePhase {
    Created,
    Queued,
    InProgress,
    Completed,
    Failed,
    Incomplete,
}

impl LifecyclePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecyclePhase::Created => "created",
            LifecyclePhase::Queued => "queued",
            LifecyclePhase::InProgress => "in_progress",
            LifecyclePhase::Completed => "completed",
            LifecyclePhase::Failed => "failed",
            LifecyclePhase::Incomplete => "incomplete",
        }
    }

    /// Failed and incomplete responses end the stream with an error.
    pub fn is_terminal_error(&self) -> bool {
        matches!(self, LifecyclePhase::Failed | LifecyclePhase::Incomplete)
    }
}

impl fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hosted tool whose progress is reported through status events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolType {
    FileSearch,
    CodeInterpreter,
    WebSearch,
    ImageGeneration,
    McpCall,
    McpListTools,
}

impl ToolType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolType::FileSearch => "file_search",
            ToolType::CodeInterpreter => "code_interpreter",
            ToolType::WebSearch => "web_search",
            ToolType::ImageGeneration => "image_generation",
            ToolType::McpCall => "mcp_call",
            ToolType::McpListTools => "mcp_list_tools",
        }
    }

    /// The output item type that carries this tool's calls.
    pub fn item_type(&self) -> ItemType {
        match self {
            ToolType::FileSearch => ItemType::FileSearchCall,
            ToolType::CodeInterpreter => ItemType::CodeInterpreterCall,
            ToolType::WebSearch => ItemType::WebSearchCall,
            ToolType::ImageGeneration => ItemType::ImageGenerationCall,
            ToolType::McpCall => ItemType::McpCall,
            ToolType::McpListTools => ItemType::McpListTools,
        }
    }
}

impl fmt::Display for ToolType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress phase reported by a hosted tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolPhase {
    InProgress,
    Searching,
    Interpreting,
    Generating,
    PartialImage,
    Completed,
    Failed,
}

impl ToolPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolPhase::InProgress => "in_progress",
            ToolPhase::Searching => "searching",
            ToolPhase::Interpreting => "interpreting",
            ToolPhase::Generating => "generating",
            ToolPhase::PartialImage => "partial_image",
            ToolPhase::Completed => "completed",
            ToolPhase::Failed => "failed",
        }
    }

    /// Item status implied by this phase
    pub fn item_status(&self) -> ItemStatus {
        match self {
            ToolPhase::Completed => ItemStatus::Completed,
            ToolPhase::Failed => ItemStatus::Failed,
            _ => ItemStatus::InProgress,
        }
    }
}

/// Added/done marker for content parts, output items and summary parts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PartPhase {
    Added,
    Done,
}

// ============================================================================
// STREAM ITEMS
// ============================================================================

/// Kind of output item.
///
/// `Unknown` marks a placeholder synthesized for an id seen only in a delta;
/// `Other` keeps item types this crate has no dedicated variant for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    Message,
    FunctionCall,
    CodeInterpreterCall,
    Reasoning,
    McpCall,
    McpListTools,
    McpApprovalRequest,
    FileSearchCall,
    WebSearchCall,
    ImageGenerationCall,
    Unknown,
    Other(String),
}

impl ItemType {
    pub fn parse(s: &str) -> Self {
        match s {
            "message" => ItemType::Message,
            "function_call" => ItemType::FunctionCall,
            "code_interpreter_call" => ItemType::CodeInterpreterCall,
            "reasoning" => ItemType::Reasoning,
            "mcp_call" => ItemType::McpCall,
            "mcp_list_tools" => ItemType::McpListTools,
            "mcp_approval_request" => ItemType::McpApprovalRequest,
            "file_search_call" => ItemType::FileSearchCall,
            "web_search_call" => ItemType::WebSearchCall,
            "image_generation_call" => ItemType::ImageGenerationCall,
            "" => ItemType::Unknown,
            other => ItemType::Other(other.to_string()),
        }
    }

    /// Items whose state is registered eagerly on `ItemAdded`.
    pub fn is_tool_call(&self) -> bool {
        matches!(
            self,
            ItemType::FunctionCall | ItemType::CodeInterpreterCall | ItemType::McpCall
        )
    }
}

/// Status of an output item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Unknown,
    InProgress,
    Completed,
    Incomplete,
    Failed,
}

impl ItemStatus {
    pub fn parse(s: &str) -> Self {
        match s {
            "in_progress" | "searching" | "interpreting" | "generating" => ItemStatus::InProgress,
            "completed" => ItemStatus::Completed,
            "incomplete" => ItemStatus::Incomplete,
            "failed" => ItemStatus::Failed,
            _ => ItemStatus::Unknown,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ItemStatus::Completed | ItemStatus::Incomplete | ItemStatus::Failed
        )
    }
}

/// One logical unit of model output, as known so far.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamItem {
    pub id: String,
    pub item_type: ItemType,
    pub status: ItemStatus,
    /// Correlation id used when submitting a tool result
    pub call_id: Option<String>,
    /// Function or MCP tool name
    pub name: Option<String>,
    /// Code-execution sandbox for code interpreter calls
    pub container_id: Option<String>,
    pub server_label: Option<String>,
    /// Accumulated text per content family
    pub content: BTreeMap<ContentFamily, String>,
}

impl StreamItem {
    pub fn new(id: impl Into<String>, item_type: ItemType) -> Self {
        Self {
            id: id.into(),
            item_type,
            status: ItemStatus::Unknown,
            call_id: None,
            name: None,
            container_id: None,
            server_label: None,
            content: BTreeMap::new(),
        }
    }

    /// Minimal item for an id seen before (or without) its `output_item.added` event.
    pub fn placeholder(id: impl Into<String>) -> Self {
        Self::new(id, ItemType::Unknown)
    }

    pub fn with_status(mut self, status: ItemStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_call_id(mut self, call_id: impl Into<String>) -> Self {
        self.call_id = Some(call_id.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_container_id(mut self, container_id: impl Into<String>) -> Self {
        self.container_id = Some(container_id.into());
        self
    }

    pub fn accumulated(&self, family: ContentFamily) -> Option<&str> {
        self.content.get(&family).map(String::as_str)
    }

    /// Function-call or MCP-call argument text
    pub fn arguments(&self) -> Option<&str> {
        self.accumulated(ContentFamily::FunctionCallArguments)
            .or_else(|| self.accumulated(ContentFamily::McpCallArguments))
    }

    /// Code interpreter source
    pub fn code(&self) -> Option<&str> {
        self.accumulated(ContentFamily::CodeInterpreterCode)
    }

    pub fn text(&self) -> Option<&str> {
        self.accumulated(ContentFamily::Text)
    }

    pub fn summary(&self) -> Option<&str> {
        self.accumulated(ContentFamily::ReasoningSummaryText)
            .or_else(|| self.accumulated(ContentFamily::ReasoningSummary))
    }

    /// Builds an item from a vendor payload. The id falls back to the event's
    /// top-level `item_id` when the nested item omits it.
    pub(crate) fn from_vendor(item: &VendorItem, fallback_id: Option<&str>) -> Option<Self> {
        let id = item.id.as_deref().or(fallback_id)?;
        let item_type = item
            .kind
            .as_deref()
            .map(ItemType::parse)
            .unwrap_or(ItemType::Unknown);

        let mut out = StreamItem::new(id, item_type);
        out.status = item
            .status
            .as_deref()
            .map(ItemStatus::parse)
            .unwrap_or(ItemStatus::Unknown);
        out.call_id = item.call_id.clone();
        out.name = item.name.clone();
        out.container_id = item.container_id.clone();
        out.server_label = item.server_label.clone();

        if let Some(arguments) = item.arguments.as_deref().filter(|a| !a.is_empty()) {
            let family = if out.item_type == ItemType::McpCall {
                ContentFamily::McpCallArguments
            } else {
                ContentFamily::FunctionCallArguments
            };
            out.content.insert(family, arguments.to_string());
        }
        if let Some(code) = item.code.as_deref().filter(|c| !c.is_empty()) {
            out.content
                .insert(ContentFamily::CodeInterpreterCode, code.to_string());
        }
        if let Some(text) = joined_text(item.content.as_deref()) {
            out.content.insert(ContentFamily::Text, text);
        }
        if let Some(summary) = joined_text(item.summary.as_deref()) {
            out.content
                .insert(ContentFamily::ReasoningSummaryText, summary);
        }

        Some(out)
    }
}

// Concatenates the `text` fields of a message's content parts or a reasoning summary.
fn joined_text(parts: Option<&[Value]>) -> Option<String> {
    let text: String = parts?
        .iter()
        .filter_map(|p| p.get("text").and_then(Value::as_str))
        .collect();
    (!text.is_empty()).then_some(text)
}

// ============================================================================
// RESPONSE METADATA
// ============================================================================

/// Token accounting reported with the response
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

/// Response-level metadata carried by lifecycle events
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResponseInfo {
    pub id: Option<String>,
    pub status: Option<String>,
    pub model: Option<String>,
    pub created_at: Option<i64>,
    pub usage: Option<Usage>,
    pub error: Option<String>,
    pub incomplete_reason: Option<String>,
}

impl From<&VendorResponse> for ResponseInfo {
    fn from(response: &VendorResponse) -> Self {
        Self {
            id: response.id.clone(),
            status: response.status.clone(),
            model: response.model.clone(),
            created_at: response.created_at.as_ref().and_then(Value::as_i64),
            usage: response.usage.clone(),
            error: response.error.as_ref().and_then(|e| {
                e.get("message")
                    .and_then(Value::as_str)
                    .or_else(|| e.as_str())
                    .map(str::to_string)
            }),
            incomplete_reason: response
                .incomplete_details
                .as_ref()
                .and_then(|d| d.get("reason"))
                .and_then(Value::as_str)
                .map(str::to_string),
        }
    }
}

// ============================================================================
// NORMALIZED EVENTS
// ============================================================================

/// Canonical event shape produced from one vendor payload.
///
/// `Delta` and `Done` always carry an item id; payloads without one are dropped
/// during normalization.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NormalizedEvent {
    Delta {
        item_id: String,
        content_type: ContentFamily,
        text: String,
        output_index: Option<u32>,
        content_index: Option<u32>,
    },
    Done {
        item_id: String,
        content_type: ContentFamily,
        /// Present only when the payload supplied non-empty final text
        final_text: Option<String>,
        output_index: Option<u32>,
    },
    Lifecycle {
        response_id: Option<String>,
        phase: LifecyclePhase,
        response: ResponseInfo,
    },
    ItemAdded {
        item: StreamItem,
        output_index: Option<u32>,
    },
    ItemDone {
        item: StreamItem,
        output_index: Option<u32>,
    },
    ContentPart {
        item_id: String,
        content_index: Option<u32>,
        phase: PartPhase,
        part_type: Option<String>,
    },
    ToolStatus {
        item_id: String,
        tool_type: ToolType,
        phase: ToolPhase,
    },
    Annotation {
        item_id: Option<String>,
        content_index: Option<u32>,
        annotation: Value,
    },
    ReasoningSummaryPart {
        item_id: String,
        summary_index: Option<u32>,
        phase: PartPhase,
    },
    Error {
        message: String,
        code: Option<String>,
    },
}

impl NormalizedEvent {
    /// Item id for item-scoped events
    pub fn item_id(&self) -> Option<&str> {
        match self {
            NormalizedEvent::Delta { item_id, .. }
            | NormalizedEvent::Done { item_id, .. }
            | NormalizedEvent::ContentPart { item_id, .. }
            | NormalizedEvent::ToolStatus { item_id, .. }
            | NormalizedEvent::ReasoningSummaryPart { item_id, .. } => Some(item_id),
            NormalizedEvent::ItemAdded { item, .. } | NormalizedEvent::ItemDone { item, .. } => {
                Some(&item.id)
            }
            NormalizedEvent::Annotation { item_id, .. } => item_id.as_deref(),
            NormalizedEvent::Lifecycle { .. } | NormalizedEvent::Error { .. } => None,
        }
    }

    pub fn is_delta(&self) -> bool {
        matches!(self, NormalizedEvent::Delta { .. })
    }
}

// ============================================================================
// OUTPUT CHUNKS
// ============================================================================

/// A content fragment exposed by an [`OutputChunk`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentDelta<'a> {
    pub content_type: ContentFamily,
    pub text: &'a str,
    pub index: Option<u32>,
}

/// What the consumer receives.
///
/// `sequence_number` is strictly increasing per stream. Exactly one chunk per
/// successful stream has `is_complete == true`, and it is always the last one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputChunk {
    pub sequence_number: u64,
    /// `None` only on the completion chunk
    pub event: Option<NormalizedEvent>,
    pub is_complete: bool,
    /// Latest usage seen, set on the completion chunk
    pub usage: Option<Usage>,
}

impl OutputChunk {
    pub fn from_event(sequence_number: u64, event: NormalizedEvent) -> Self {
        Self {
            sequence_number,
            event: Some(event),
            is_complete: false,
            usage: None,
        }
    }

    pub fn completion(sequence_number: u64, usage: Option<Usage>) -> Self {
        Self {
            sequence_number,
            event: None,
            is_complete: true,
            usage,
        }
    }

    /// Item id, or response id for lifecycle chunks
    pub fn id(&self) -> Option<&str> {
        match &self.event {
            Some(NormalizedEvent::Lifecycle { response_id, .. }) => response_id.as_deref(),
            Some(event) => event.item_id(),
            None => None,
        }
    }

    pub fn delta(&self) -> Option<ContentDelta<'_>> {
        match &self.event {
            Some(NormalizedEvent::Delta {
                content_type,
                text,
                output_index,
                ..
            }) => Some(ContentDelta {
                content_type: *content_type,
                text,
                index: *output_index,
            }),
            _ => None,
        }
    }

    /// Output-text delta, if this chunk carries one
    pub fn text_delta(&self) -> Option<&str> {
        self.delta()
            .filter(|d| d.content_type == ContentFamily::Text)
            .map(|d| d.text)
    }
}

// ============================================================================
// VENDOR WIRE TYPES
// ============================================================================

/// JSON payload of one `data:` record, keyed by the open-ended `type` string.
#[derive(Debug, Clone, Deserialize)]
pub struct VendorEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub sequence_number: Option<u64>,
    pub item_id: Option<String>,
    pub output_index: Option<u32>,
    pub content_index: Option<u32>,
    pub summary_index: Option<u32>,
    pub delta: Option<Value>,
    pub text: Option<String>,
    pub arguments: Option<String>,
    /// Interpreter source on code events, error code on error events
    pub code: Option<Value>,
    pub transcript: Option<String>,
    pub refusal: Option<String>,
    pub item: Option<VendorItem>,
    pub response: Option<VendorResponse>,
    pub part: Option<Value>,
    pub annotation: Option<Value>,
    pub message: Option<String>,
    pub error: Option<Value>,
}

impl VendorEvent {
    /// Item id from the top-level field, falling back to the nested item.
    pub fn resolved_item_id(&self) -> Option<&str> {
        self.item_id
            .as_deref()
            .or_else(|| self.item.as_ref().and_then(|i| i.id.as_deref()))
    }

    /// Delta text. Non-string deltas are kept as their JSON text.
    pub fn delta_text(&self) -> Option<String> {
        match self.delta.as_ref()? {
            Value::String(s) => Some(s.clone()),
            Value::Null => None,
            other => Some(other.to_string()),
        }
    }

    /// Final value carried by a `*.done` event for the given family.
    pub fn final_text(&self, family: ContentFamily) -> Option<&str> {
        let code = self.code.as_ref().and_then(Value::as_str);
        let value = match family {
            ContentFamily::FunctionCallArguments | ContentFamily::McpCallArguments => {
                self.arguments.as_deref()
            }
            ContentFamily::CodeInterpreterCode => code,
            ContentFamily::AudioTranscript => {
                self.transcript.as_deref().or(self.text.as_deref())
            }
            ContentFamily::Refusal => self.refusal.as_deref().or(self.text.as_deref()),
            _ => self.text.as_deref(),
        };
        value.filter(|v| !v.is_empty())
    }
}

/// Output item as delivered by the provider
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VendorItem {
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub status: Option<String>,
    pub call_id: Option<String>,
    pub name: Option<String>,
    pub arguments: Option<String>,
    pub code: Option<String>,
    pub container_id: Option<String>,
    pub server_label: Option<String>,
    pub content: Option<Vec<Value>>,
    pub summary: Option<Vec<Value>>,
}

/// Response object carried by lifecycle events
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VendorResponse {
    pub id: Option<String>,
    pub status: Option<String>,
    pub model: Option<String>,
    pub created_at: Option<Value>,
    pub usage: Option<Usage>,
    pub error: Option<Value>,
    pub incomplete_details: Option<Value>,
}
