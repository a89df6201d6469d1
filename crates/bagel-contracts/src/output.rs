use serde::Serialize;
use serde_json::Value;

pub const THINK_OPEN: &str = "<think>\n";
pub const THINK_CLOSE: &str = "</think>\n";

/// First element of a completed job's `output.data` array.
///
/// Image operations return an object with a `url`; text operations return a
/// bare string.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputAsset {
    pub url: Option<String>,
    pub data: Value,
}

impl OutputAsset {
    pub fn from_value(data: Value) -> Self {
        let url = data
            .get("url")
            .and_then(Value::as_str)
            .map(str::to_string);
        Self { url, data }
    }

    pub fn text(&self) -> Option<&str> {
        self.data.as_str()
    }
}

/// Resolution of one job stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobOutcome {
    pub event_id: Option<String>,
    pub output_url: Option<String>,
    pub output: Option<OutputAsset>,
    /// Server-side failure message from a `process_completed` with `success: false`.
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThinkingSplit {
    pub think: Option<String>,
    pub text: String,
}

/// Separates a `<think>` reasoning preamble from the final answer.
pub fn split_thinking(output: &str) -> ThinkingSplit {
    let (Some(first_close), Some(last_close)) = (output.find(THINK_CLOSE), output.rfind(THINK_CLOSE))
    else {
        return ThinkingSplit {
            think: None,
            text: output.to_string(),
        };
    };
    let think = output[..first_close].replacen(THINK_OPEN, "", 1);
    ThinkingSplit {
        think: Some(think),
        text: output[last_close + THINK_CLOSE.len()..].to_string(),
    }
}
