//! Attachments submitted as `data:` URLs.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::json;

use crate::error::{Error, Result};
use crate::ui::UiNode;

/// A decoded-and-checked inline attachment
#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    pub mime_type: String,
    /// Base64 payload, validated but kept encoded
    pub data: String,
}

impl Attachment {
    /// Parse `data:<mime>;base64,<payload>`.
    ///
    /// An empty URL or payload is treated as a video attachment, which is
    /// not supported.
    pub fn from_data_url(url: &str) -> Result<Self> {
        let url = url.trim();
        if url.is_empty() {
            return Err(Error::Attachment(
                "video attachments are not supported".into(),
            ));
        }

        let (header, payload) = url
            .split_once(',')
            .ok_or_else(|| Error::Attachment("missing ',' in data URL".into()))?;
        let mime_type = header
            .strip_prefix("data:")
            .and_then(|h| h.strip_suffix(";base64"))
            .ok_or_else(|| Error::Attachment(format!("unsupported data URL header '{}'", header)))?;

        if payload.is_empty() {
            return Err(Error::Attachment(
                "video attachments are not supported".into(),
            ));
        }
        if !mime_type.starts_with("image/") {
            return Err(Error::Attachment(format!(
                "unsupported attachment type '{}'",
                mime_type
            )));
        }
        STANDARD
            .decode(payload)
            .map_err(|e| Error::Attachment(format!("payload is not valid base64: {}", e)))?;

        Ok(Self {
            mime_type: mime_type.to_string(),
            data: payload.to_string(),
        })
    }

    /// Encode raw bytes as an attachment
    pub fn from_bytes(mime_type: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            mime_type: mime_type.into(),
            data: STANDARD.encode(bytes),
        }
    }

    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }

    pub fn to_content(&self) -> tern_ai::Content {
        tern_ai::Content::image(self.data.clone(), self.mime_type.clone())
    }
}

/// Card shown on the ui channel while and after an attachment is described
pub fn attachment_card(loading: bool) -> UiNode {
    UiNode::bot_card(UiNode::component(
        "Attachment",
        json!({ "isLoading": loading }),
    ))
}
