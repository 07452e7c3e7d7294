//! Turn a backend response into the sections of a reply card.

pub mod card;

use crate::utils::group_thousands;
use crate::utils::regex::RegexPatterns;
use std::fmt;
use std::time::Duration;

pub use card::{Card, CardNode, build_error_card, build_response_card, build_text_card};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolStatus {
    Pending,
    Running,
    Completed,
    Errored,
}

impl ToolStatus {
    /// Parse the backend's status string. Unknown values are treated as pending.
    pub fn from_wire(raw: &str) -> Self {
        match raw {
            "running" => Self::Running,
            "completed" => Self::Completed,
            "error" | "errored" => Self::Errored,
            _ => Self::Pending,
        }
    }
}

impl fmt::Display for ToolStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Errored => "error",
        })
    }
}

/// One typed unit of a backend response.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseFragment {
    Text(String),
    Reasoning(String),
    ToolInvocation {
        name: String,
        status: ToolStatus,
        output: Option<String>,
        error: Option<String>,
    },
    FileRef {
        filename: Option<String>,
        url: Option<String>,
    },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost: Option<f64>,
    pub elapsed: Option<Duration>,
}

impl Usage {
    /// `in: 1,234 out: 56 $0.0123 3.21s`
    pub fn summary(&self) -> String {
        let mut out = format!(
            "in: {} out: {}",
            group_thousands(self.input_tokens),
            group_thousands(self.output_tokens)
        );
        if let Some(cost) = self.cost.filter(|c| c.is_finite() && *c > 0.0) {
            out.push_str(&format!(" ${:.4}", cost));
        }
        if let Some(elapsed) = self.elapsed {
            out.push_str(&format!(" {:.2}s", elapsed.as_secs_f64()));
        }
        out
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderedPayload {
    pub thinking: String,
    /// Body text with each image key replaced by `[image N]`.
    pub body: String,
    /// `images[N - 1]` is the key that `[image N]` replaced.
    pub images: Vec<String>,
    pub model: String,
    /// Usage summary, empty when the backend reported no token counts.
    pub info: String,
}

pub fn render(fragments: &[ResponseFragment], model_id: &str, usage: Option<&Usage>) -> RenderedPayload {
    let mut thinking = String::new();
    let mut body = String::new();

    for fragment in fragments {
        match fragment {
            ResponseFragment::Text(text) => {
                if !text.is_empty() {
                    body.push_str(text);
                    body.push_str("\n\n");
                }
            }
            ResponseFragment::Reasoning(text) => {
                if !text.is_empty() {
                    thinking.push_str(text);
                    thinking.push_str("\n\n");
                }
            }
            ResponseFragment::ToolInvocation {
                name,
                status,
                output,
                error,
            } => {
                body.push_str(&format!("🔧 **Tool**: {}\nStatus: {}\n", name, status));
                match (status, output, error) {
                    (ToolStatus::Completed, Some(output), _) if !output.is_empty() => {
                        body.push_str(output);
                        body.push_str("\n\n");
                    }
                    (ToolStatus::Errored, _, Some(error)) if !error.is_empty() => {
                        body.push_str(&format!("Error: {}\n\n", error));
                    }
                    _ => {}
                }
            }
            ResponseFragment::FileRef { filename, url } => {
                let label = filename
                    .as_deref()
                    .filter(|f| !f.is_empty())
                    .or(url.as_deref())
                    .unwrap_or_default();
                body.push_str(&format!("📄 File: {}\n\n", label));
            }
        }
    }

    let (body, images) = extract_images(&body);

    RenderedPayload {
        thinking: thinking.trim().to_string(),
        body: body.trim().to_string(),
        images,
        model: model_id.to_string(),
        info: usage.map(Usage::summary).unwrap_or_default(),
    }
}

/// Replace every image key occurrence with the next `[image N]` placeholder.
///
/// A key that appears twice gets two placeholders and two list entries.
pub fn extract_images(body: &str) -> (String, Vec<String>) {
    let mut images = Vec::new();
    let replaced = RegexPatterns::image_key().replace_all(body, |caps: &regex::Captures<'_>| {
        images.push(caps[0].to_string());
        format!("[image {}]", images.len())
    });
    (replaced.into_owned(), images)
}
