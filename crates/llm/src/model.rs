use serde::Deserialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
pub struct ModelPricing {
    #[serde(default, deserialize_with = "price_from_str_or_number")]
    pub prompt: f64,
    #[serde(default, deserialize_with = "price_from_str_or_number")]
    pub completion: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Model {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub context_length: Option<u64>,
    #[serde(default)]
    pub pricing: Option<ModelPricing>,
}

impl Model {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            context_length: None,
            pricing: None,
        }
    }

    pub fn from_id(id: impl Into<String>) -> Self {
        let id = id.into();
        Self::new(id.clone(), id)
    }

    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelCatalogSource {
    ProviderApi,
    StaticFallback,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelCatalog {
    pub models: Vec<Model>,
    pub source: ModelCatalogSource,
    pub warning: Option<String>,
}

impl ModelCatalog {
    pub fn from_provider_api(models: Vec<Model>) -> Self {
        Self {
            models,
            source: ModelCatalogSource::ProviderApi,
            warning: None,
        }
    }

    pub fn from_static_fallback(models: Vec<Model>, warning: String) -> Self {
        Self {
            models,
            source: ModelCatalogSource::StaticFallback,
            warning: Some(warning),
        }
    }
}

/// `GET /models` response envelope; a missing `data` field reads as empty.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ModelListResponse {
    #[serde(default)]
    pub data: Vec<Model>,
}

pub fn default_models() -> Vec<Model> {
    vec![
        Model::new(crate::provider::DEFAULT_MODEL, "Anthropic: Claude Sonnet 4.5"),
        Model::new("openai/gpt-4o-mini", "OpenAI: GPT-4o-mini"),
        Model::new("google/gemini-2.5-flash", "Google: Gemini 2.5 Flash"),
        Model::new("meta-llama/llama-3.3-70b-instruct", "Meta: Llama 3.3 70B Instruct"),
    ]
}

// OpenRouter reports prices as decimal strings ("0.000003").
fn price_from_str_or_number<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Price {
        Number(f64),
        Text(String),
    }

    match Price::deserialize(deserializer)? {
        Price::Number(value) => Ok(value),
        Price::Text(text) => text.trim().parse().map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_openrouter_model_list() {
        let payload = r#"{
            "data": [
                {
                    "id": "anthropic/claude-sonnet-4.5",
                    "name": "Anthropic: Claude Sonnet 4.5",
                    "context_length": 1000000,
                    "pricing": {"prompt": "0.000003", "completion": "0.000015", "image": "0"}
                },
                {"id": "openrouter/auto"}
            ]
        }"#;

        let response: ModelListResponse = serde_json::from_str(payload).unwrap();
        assert_eq!(response.data.len(), 2);

        let sonnet = &response.data[0];
        assert_eq!(sonnet.context_length, Some(1_000_000));
        let pricing = sonnet.pricing.unwrap();
        assert!((pricing.prompt - 0.000003).abs() < f64::EPSILON);
        assert!((pricing.completion - 0.000015).abs() < f64::EPSILON);

        let auto = &response.data[1];
        assert_eq!(auto.display_name(), "openrouter/auto");
        assert_eq!(auto.pricing, None);
    }

    #[test]
    fn missing_data_field_is_empty() {
        let response: ModelListResponse = serde_json::from_str("{}").unwrap();
        assert!(response.data.is_empty());
    }

    #[test]
    fn fallback_catalog_starts_with_default_model() {
        let models = default_models();
        assert_eq!(models[0].id, crate::provider::DEFAULT_MODEL);
    }
}
