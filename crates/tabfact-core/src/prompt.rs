//! Fact-check requests and the prompt sent to the model.

use serde::{Deserialize, Serialize};

use crate::table::{Table, TableError};

/// Default generation cap, matching the web client.
pub const DEFAULT_MAX_TOKENS: u32 = 2048;

/// System prompt that switches cogito models into their reasoning mode.
pub const DEEP_THINKING_SYSTEM_PROMPT: &str = "Enable deep thinking subroutine.";

/// A table + claim pair submitted for checking.
///
/// Field names on the wire follow the inference API's request body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceRequest {
    /// Delimited table text (`#` or `,`)
    #[serde(rename = "tableText")]
    pub table_text: String,

    /// The claim to verify
    #[serde(rename = "claimText")]
    pub claim_text: String,

    /// Language code of the requesting client (e.g. "en")
    #[serde(default = "default_language")]
    pub language: String,

    /// Model identifier; also selects the thinking markers
    pub model: String,

    /// Whether to show the table title to the model
    #[serde(rename = "includeTitle", default)]
    pub include_title: bool,

    #[serde(rename = "tableTitle", default)]
    pub table_title: String,

    /// Ask cogito models to reason before answering
    #[serde(rename = "includeThinking", default)]
    pub include_thinking: bool,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Seconds the backend keeps the model loaded after the run
    #[serde(default)]
    pub keep_alive: i64,

    #[serde(default = "default_stream")]
    pub stream: bool,
}

fn default_language() -> String {
    "en".to_string()
}

fn default_max_tokens() -> u32 {
    DEFAULT_MAX_TOKENS
}

fn default_stream() -> bool {
    true
}

impl InferenceRequest {
    /// A streaming request with default options.
    pub fn new(
        table_text: impl Into<String>,
        claim_text: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            table_text: table_text.into(),
            claim_text: claim_text.into(),
            language: default_language(),
            model: model.into(),
            include_title: false,
            table_title: String::new(),
            include_thinking: false,
            max_tokens: DEFAULT_MAX_TOKENS,
            keep_alive: 0,
            stream: true,
        }
    }

    /// Show a table title to the model. A blank title is ignored.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        let title = title.into();
        let title = title.trim();
        self.include_title = !title.is_empty();
        self.table_title = title.to_string();
        self
    }

    pub fn with_thinking(mut self, enabled: bool) -> Self {
        self.include_thinking = enabled;
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_keep_alive(mut self, seconds: i64) -> Self {
        self.keep_alive = seconds;
        self
    }
}

/// Build the user prompt for a request.
pub fn build_prompt(request: &InferenceRequest) -> Result<String, TableError> {
    let table_md = Table::parse(&request.table_text)?.to_markdown();

    let mut prompt = String::from(
        "You are tasked with determining whether a claim about the following table \
         (in Markdown format) is TRUE or FALSE.\n\
         Before giving your final answer, explain your reasoning step-by-step.\n\n",
    );

    if request.include_title && !request.table_title.trim().is_empty() {
        prompt.push_str("#### Table Title:\n");
        prompt.push_str(request.table_title.trim());
        prompt.push_str("\n\n");
    }

    prompt.push_str("#### Table (Markdown):\n");
    prompt.push_str(&table_md);
    prompt.push_str("\n#### Claim:\n\"");
    prompt.push_str(&request.claim_text);
    prompt.push_str("\"\n\n");

    prompt.push_str(
        "Instructions:\n\
         After your explanation, output a final answer in valid JSON format:\n\
         {\"answer\": \"TRUE\" or \"FALSE\", \"relevant_cells\": [{\"row_index\": int, \"column_name\": \"str\"}]}\n",
    );

    let language = request.language.trim();
    if !language.is_empty() && !language.eq_ignore_ascii_case("en") {
        prompt.push_str(&format!(
            "Write your explanation in the language with code \"{}\"; keep the JSON keys and values in English.\n",
            language
        ));
    }

    // DeepSeek-R1 is nudged to open its thinking block right away.
    if request.model.to_lowercase().contains("deepseek") {
        prompt.push_str("\n<think>");
    }

    Ok(prompt)
}

/// System prompt for the request, if the model needs one.
pub fn system_prompt(request: &InferenceRequest) -> Option<&'static str> {
    if request.include_thinking && request.model.starts_with("cogito") {
        Some(DEEP_THINKING_SYSTEM_PROMPT)
    } else {
        None
    }
}
