//! Cross-platform message descriptors.
//!
//! The engine only ever looks at the outer tag; the template payload is
//! passed through to the gateway untouched.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MessageDescriptor {
    Text {
        text: String,
    },
    Template {
        #[serde(rename = "altText")]
        alt_text: String,
        template: Template,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Template {
    Buttons { text: String, actions: Vec<Action> },
    Carousel { columns: Vec<Column> },
    Confirm { text: String, actions: Vec<Action> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub text: String,
    pub actions: Vec<Action>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Action {
    /// Sends `text` back as if the user had typed it.
    Message { label: String, text: String },
    Uri { label: String, uri: String },
    /// Date/time picker; the selection comes back as a postback.
    Datetimepicker {
        label: String,
        mode: String,
        data: String,
    },
}

impl MessageDescriptor {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn buttons(alt_text: impl Into<String>, text: impl Into<String>, actions: Vec<Action>) -> Self {
        Self::Template {
            alt_text: alt_text.into(),
            template: Template::Buttons {
                text: text.into(),
                actions,
            },
        }
    }

    pub fn confirm(alt_text: impl Into<String>, text: impl Into<String>, actions: Vec<Action>) -> Self {
        Self::Template {
            alt_text: alt_text.into(),
            template: Template::Confirm {
                text: text.into(),
                actions,
            },
        }
    }

    pub fn carousel(alt_text: impl Into<String>, columns: Vec<Column>) -> Self {
        Self::Template {
            alt_text: alt_text.into(),
            template: Template::Carousel { columns },
        }
    }

    /// The outer tag, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::Template { .. } => "template",
        }
    }
}

impl Action {
    pub fn message(label: impl Into<String>, text: impl Into<String>) -> Self {
        Self::Message {
            label: label.into(),
            text: text.into(),
        }
    }

    /// A message action whose label and text are the same.
    pub fn reply(text: impl Into<String>) -> Self {
        let text = text.into();
        Self::message(text.clone(), text)
    }

    pub fn uri(label: impl Into<String>, uri: impl Into<String>) -> Self {
        Self::Uri {
            label: label.into(),
            uri: uri.into(),
        }
    }

    pub fn date_picker(label: impl Into<String>, data: impl Into<String>) -> Self {
        Self::Datetimepicker {
            label: label.into(),
            mode: "date".into(),
            data: data.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn text_serializes_with_type_tag() {
        let msg = MessageDescriptor::text("hello");
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({"type": "text", "text": "hello"})
        );
        assert_eq!(msg.kind(), "text");
    }

    #[test]
    fn buttons_template_wire_shape() {
        let msg = MessageDescriptor::buttons(
            "pick one",
            "Pick one",
            vec![Action::reply("S"), Action::uri("more", "https://example.com")],
        );
        let v = serde_json::to_value(&msg).unwrap();
        assert_eq!(v["type"], "template");
        assert_eq!(v["altText"], "pick one");
        assert_eq!(v["template"]["type"], "buttons");
        assert_eq!(v["template"]["actions"][0], json!({"type": "message", "label": "S", "text": "S"}));
        assert_eq!(v["template"]["actions"][1]["type"], "uri");
        assert_eq!(msg.kind(), "template");
    }

    #[test]
    fn carousel_with_date_picker_parses() {
        let raw = json!({
            "type": "template",
            "altText": "date",
            "template": {
                "type": "carousel",
                "columns": [{
                    "text": "choose",
                    "actions": [{"type": "datetimepicker", "label": "go", "mode": "date", "data": "dummy"}]
                }]
            }
        });
        let msg: MessageDescriptor = serde_json::from_value(raw).unwrap();
        assert_eq!(
            msg,
            MessageDescriptor::carousel(
                "date",
                vec![Column {
                    text: "choose".into(),
                    actions: vec![Action::date_picker("go", "dummy")],
                }]
            )
        );
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let raw = json!({"type": "sticker", "id": 3});
        assert!(serde_json::from_value::<MessageDescriptor>(raw).is_err());
    }
}
