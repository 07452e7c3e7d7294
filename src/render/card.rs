//! Interactive card payloads as a typed node tree.
//!
//! The response card is built from a template holding `${thinking}`,
//! `${body}`, `${model}` and `${info}` placeholders, then filled in one walk
//! over the tree. Substituted values are never rescanned, so text containing
//! `${...}` passes through untouched.

use super::RenderedPayload;
use serde::Serialize;
use serde_json::{Value, json};

const MARGIN_NONE: &str = "0px 0px 0px 0px";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TextTag {
    PlainText,
    LarkMd,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CardText {
    pub tag: TextTag,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_size: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_align: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lines: Option<u32>,
}

impl CardText {
    pub fn lark_md(content: impl Into<String>) -> Self {
        Self {
            tag: TextTag::LarkMd,
            content: content.into(),
            text_size: None,
            text_align: None,
            text_color: None,
            lines: None,
        }
    }

    /// Small grey plain text used for the thinking section and the footer.
    fn notation(content: &str, align: &str, lines: Option<u32>) -> Self {
        Self {
            tag: TextTag::PlainText,
            content: content.to_string(),
            text_size: Some("notation".into()),
            text_align: Some(align.into()),
            text_color: Some("grey".into()),
            lines,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CombinationMode {
    Single,
    Double,
    Trisect,
}

impl CombinationMode {
    pub fn for_count(count: usize) -> Self {
        match count {
            0 | 1 => Self::Single,
            2 => Self::Double,
            _ => Self::Trisect,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageRef {
    pub img_key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "tag", rename_all = "snake_case")]
pub enum CardNode {
    Div {
        text: CardText,
        #[serde(skip_serializing_if = "Option::is_none")]
        margin: Option<String>,
    },
    Markdown {
        content: String,
        text_align: String,
        text_size: String,
        margin: String,
    },
    Hr {
        margin: String,
    },
    ColumnSet {
        horizontal_spacing: String,
        horizontal_align: String,
        columns: Vec<CardNode>,
        margin: String,
    },
    Column {
        width: String,
        weight: u32,
        vertical_align: String,
        elements: Vec<CardNode>,
    },
    ImgCombination {
        combination_mode: CombinationMode,
        img_list: Vec<ImageRef>,
        img_list_length: usize,
        combination_transparent: bool,
        margin: String,
    },
}

impl CardNode {
    fn markdown(content: &str) -> Self {
        Self::Markdown {
            content: content.to_string(),
            text_align: "left".into(),
            text_size: "normal_v2".into(),
            margin: MARGIN_NONE.into(),
        }
    }

    fn column(weight: u32, text: CardText) -> Self {
        Self::Column {
            width: "weighted".into(),
            weight,
            vertical_align: "top".into(),
            elements: vec![Self::Div {
                text,
                margin: Some(MARGIN_NONE.into()),
            }],
        }
    }

    pub fn images(keys: &[String]) -> Self {
        Self::ImgCombination {
            combination_mode: CombinationMode::for_count(keys.len()),
            img_list: keys
                .iter()
                .map(|k| ImageRef { img_key: k.clone() })
                .collect(),
            img_list_length: keys.len(),
            combination_transparent: false,
            margin: "8px 0px 0px 0px".into(),
        }
    }

    /// Replace `${name}` placeholders in every text field below this node.
    pub fn fill(&mut self, vars: &[(&str, &str)]) {
        match self {
            Self::Div { text, .. } => text.content = substitute(&text.content, vars),
            Self::Markdown { content, .. } => *content = substitute(content, vars),
            Self::ColumnSet { columns, .. } => {
                for column in columns {
                    column.fill(vars);
                }
            }
            Self::Column { elements, .. } => {
                for node in elements {
                    node.fill(vars);
                }
            }
            Self::Hr { .. } | Self::ImgCombination { .. } => {}
        }
    }
}

/// Single left-to-right pass over `template`. Unknown placeholders are kept.
pub fn substitute(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            return out;
        };
        let name = &after[..end];
        if let Some((_, value)) = vars.iter().find(|(k, _)| *k == name) {
            out.push_str(value);
        } else {
            out.push_str(&rest[start..start + 2 + end + 1]);
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    out
}

/// A card ready to be serialized into a message `content` string.
#[derive(Debug, Clone, PartialEq)]
pub enum Card {
    /// Schema 2.0 card with a vertical body layout.
    Structured { elements: Vec<CardNode> },
    /// Wide-screen single-column card.
    Simple { elements: Vec<CardNode> },
}

impl Card {
    pub fn elements(&self) -> &[CardNode] {
        match self {
            Self::Structured { elements } | Self::Simple { elements } => elements,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Self::Structured { elements } => json!({
                "schema": "2.0",
                "config": {
                    "update_multi": true,
                    "style": {
                        "text_size": {
                            "normal_v2": {"default": "normal", "pc": "normal", "mobile": "heading"}
                        }
                    }
                },
                "body": {
                    "direction": "vertical",
                    "horizontal_spacing": "8px",
                    "vertical_spacing": "8px",
                    "horizontal_align": "left",
                    "vertical_align": "top",
                    "padding": "12px 12px 12px 12px",
                    "elements": elements,
                }
            }),
            Self::Simple { elements } => json!({
                "config": {"wide_screen_mode": true},
                "elements": elements,
            }),
        }
    }

    /// JSON string for the `content` field of an `interactive` message.
    pub fn to_content(&self) -> String {
        self.to_value().to_string()
    }
}

/// Response template with unfilled placeholders.
pub fn response_template() -> Vec<CardNode> {
    vec![
        CardNode::Div {
            text: CardText::notation("${thinking}", "left", None),
            margin: Some(MARGIN_NONE.into()),
        },
        CardNode::markdown("${body}"),
        CardNode::Hr {
            margin: MARGIN_NONE.into(),
        },
        CardNode::ColumnSet {
            horizontal_spacing: "8px".into(),
            horizontal_align: "left".into(),
            columns: vec![
                CardNode::column(1, CardText::notation("${model}", "left", Some(1))),
                CardNode::column(2, CardText::notation("${info}", "right", Some(1))),
            ],
            margin: MARGIN_NONE.into(),
        },
    ]
}

pub fn build_response_card(payload: &RenderedPayload) -> Card {
    let mut elements = response_template();

    if !payload.images.is_empty() {
        let body_index = elements
            .iter()
            .position(|n| matches!(n, CardNode::Markdown { content, .. } if content == "${body}"));
        if let Some(idx) = body_index {
            elements.insert(idx + 1, CardNode::images(&payload.images));
        }
    }

    let vars = [
        ("thinking", payload.thinking.as_str()),
        ("body", payload.body.as_str()),
        ("model", payload.model.as_str()),
        ("info", payload.info.as_str()),
    ];
    for node in &mut elements {
        node.fill(&vars);
    }
    Card::Structured { elements }
}

pub fn build_text_card(text: &str) -> Card {
    Card::Simple {
        elements: vec![CardNode::Div {
            text: CardText::lark_md(text),
            margin: None,
        }],
    }
}

pub fn build_error_card(message: &str) -> Card {
    build_text_card(&format!("❌ Error processing request: {}", message))
}
