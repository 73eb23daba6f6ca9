//! Model registry with public lookup API.

use crate::{InputType, Model};

const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";

struct ModelEntry {
    id: &'static str,
    name: &'static str,
    input_image: bool,
    context_window: u32,
    max_tokens: u32,
}

const MODEL_ENTRIES: &[ModelEntry] = &[
    ModelEntry {
        id: "claude-3-haiku-20240307",
        name: "Claude 3 Haiku",
        input_image: true,
        context_window: 200_000,
        max_tokens: 4096,
    },
    ModelEntry {
        id: "claude-3-5-haiku-20241022",
        name: "Claude 3.5 Haiku",
        input_image: true,
        context_window: 200_000,
        max_tokens: 8192,
    },
    ModelEntry {
        id: "claude-sonnet-4-5-20250929",
        name: "Claude Sonnet 4.5",
        input_image: true,
        context_window: 200_000,
        max_tokens: 64_000,
    },
];

/// Model used when nothing else is configured
pub const DEFAULT_MODEL_ID: &str = "claude-3-haiku-20240307";

impl ModelEntry {
    fn to_model(&self) -> Model {
        let mut input_types = vec![InputType::Text];
        if self.input_image {
            input_types.push(InputType::Image);
        }
        Model {
            id: self.id.to_string(),
            name: self.name.to_string(),
            base_url: ANTHROPIC_BASE_URL.to_string(),
            input_types,
            context_window: self.context_window,
            max_tokens: self.max_tokens,
        }
    }
}

/// Look up a model by ID.
pub fn get_model(id: &str) -> Option<Model> {
    MODEL_ENTRIES
        .iter()
        .find(|e| e.id == id)
        .map(|e| e.to_model())
}

/// Get all registered models.
pub fn get_all_models() -> Vec<Model> {
    MODEL_ENTRIES.iter().map(|e| e.to_model()).collect()
}

/// Build a model definition for an ID the registry does not know.
pub fn custom_model(id: &str, base_url: Option<&str>) -> Model {
    Model {
        id: id.to_string(),
        name: id.to_string(),
        base_url: base_url.unwrap_or(ANTHROPIC_BASE_URL).to_string(),
        input_types: vec![InputType::Text, InputType::Image],
        context_window: 200_000,
        max_tokens: 4096,
    }
}

/// Look up a model, falling back to a custom definition for unknown IDs.
/// A `base_url` overrides the table's endpoint.
pub fn resolve_model(id: &str, base_url: Option<&str>) -> Model {
    match get_model(id) {
        Some(mut model) => {
            if let Some(url) = base_url {
                model.base_url = url.to_string();
            }
            model
        }
        None => custom_model(id, base_url),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_model() {
        let known = resolve_model(DEFAULT_MODEL_ID, Some("http://localhost:8080"));
        assert_eq!(known.name, "Claude 3 Haiku");
        assert_eq!(known.base_url, "http://localhost:8080");

        let unknown = resolve_model("claude-next", None);
        assert_eq!(unknown.name, "claude-next");
        assert_eq!(unknown.base_url, ANTHROPIC_BASE_URL);
    }

    #[test]
    fn test_default_model_is_registered() {
        let model = get_model(DEFAULT_MODEL_ID).unwrap();
        assert_eq!(model.name, "Claude 3 Haiku");
        assert!(model.accepts_images());
        assert_eq!(model.base_url, ANTHROPIC_BASE_URL);
    }

    #[test]
    fn test_unknown_model() {
        assert!(get_model("not-a-model").is_none());
        let custom = custom_model("not-a-model", Some("http://localhost:8080"));
        assert_eq!(custom.id, "not-a-model");
        assert_eq!(custom.base_url, "http://localhost:8080");
    }

    #[test]
    fn test_all_models_unique_ids() {
        let models = get_all_models();
        let mut ids: Vec<_> = models.iter().map(|m| m.id.as_str()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), models.len());
    }
}
