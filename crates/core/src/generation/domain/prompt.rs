use crate::shared::config::StyleConfig;

const PLACEHOLDER: &str = "{description}";

/// A named picture style and the backend parameters that go with it.
#[derive(Clone, Debug, PartialEq)]
pub struct PromptStyle {
    pub name: String,
    pub template: String,
    pub model_version: String,
    pub style_name: String,
    pub guidance_scale: f64,
    pub negative_prompt: String,
    pub style_strength_ratio: u32,
    pub num_steps: u32,
}

impl PromptStyle {
    pub fn compose(&self, description: &str) -> String {
        self.template.replace(PLACEHOLDER, description.trim())
    }
}

impl From<&StyleConfig> for PromptStyle {
    fn from(c: &StyleConfig) -> Self {
        Self {
            name: c.name.clone(),
            template: c.prompt_template.clone(),
            model_version: c.model_version.clone(),
            style_name: c.style_name.clone(),
            guidance_scale: c.guidance_scale,
            negative_prompt: c.negative_prompt.clone(),
            style_strength_ratio: c.style_strength_ratio,
            num_steps: c.num_steps,
        }
    }
}

pub fn styles_from_config(styles: &[StyleConfig]) -> Vec<PromptStyle> {
    styles.iter().map(PromptStyle::from).collect()
}
