use serde::{Deserialize, Serialize};

use crate::request::{FileRef, JobArg};

/// Server-side operations, addressed by `fn_index`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    TextToImage,
    EditImage,
    CaptionImage,
}

impl Operation {
    pub fn fn_index(self) -> u32 {
        match self {
            Self::TextToImage => 1,
            Self::EditImage => 3,
            Self::CaptionImage => 4,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::TextToImage => "text_to_image",
            Self::EditImage => "edit_image",
            Self::CaptionImage => "caption_image",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextToImageOptions {
    pub show_thinking: bool,
    pub cfg_text_scale: f64,
    pub cfg_interval: f64,
    pub timestep_shift: f64,
    pub num_timesteps: u32,
    pub cfg_renorm_min: f64,
    pub cfg_renorm_type: String,
    pub max_think_token_n: u32,
    pub do_sample: bool,
    pub text_temperature: f64,
    pub seed: i64,
    pub image_ratio: String,
}

impl Default for TextToImageOptions {
    fn default() -> Self {
        Self {
            show_thinking: false,
            cfg_text_scale: 4.0,
            cfg_interval: 0.4,
            timestep_shift: 3.0,
            num_timesteps: 50,
            cfg_renorm_min: 0.0,
            cfg_renorm_type: "global".to_string(),
            max_think_token_n: 2048,
            do_sample: false,
            text_temperature: 0.3,
            seed: 0,
            image_ratio: "1:1".to_string(),
        }
    }
}

impl TextToImageOptions {
    pub fn job_args(&self, prompt: &str) -> Vec<JobArg> {
        vec![
            prompt.into(),
            self.show_thinking.into(),
            self.cfg_text_scale.into(),
            self.cfg_interval.into(),
            self.timestep_shift.into(),
            self.num_timesteps.into(),
            self.cfg_renorm_min.into(),
            self.cfg_renorm_type.clone().into(),
            self.max_think_token_n.into(),
            self.do_sample.into(),
            self.text_temperature.into(),
            self.seed.into(),
            self.image_ratio.clone().into(),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditImageOptions {
    pub show_thinking: bool,
    pub cfg_text_scale: f64,
    pub cfg_img_scale: f64,
    pub cfg_interval: f64,
    pub timestep_shift: f64,
    pub num_timesteps: u32,
    pub cfg_renorm_min: f64,
    pub cfg_renorm_type: String,
    pub max_think_token_n: u32,
    pub do_sample: bool,
    pub text_temperature: f64,
    pub seed: i64,
}

impl Default for EditImageOptions {
    fn default() -> Self {
        Self {
            show_thinking: false,
            cfg_text_scale: 4.0,
            cfg_img_scale: 2.0,
            cfg_interval: 0.0,
            timestep_shift: 3.0,
            num_timesteps: 50,
            cfg_renorm_min: 0.0,
            cfg_renorm_type: "text_channel".to_string(),
            max_think_token_n: 1024,
            do_sample: false,
            text_temperature: 0.3,
            seed: 0,
        }
    }
}

impl EditImageOptions {
    pub fn job_args(&self, image: FileRef, prompt: &str) -> Vec<JobArg> {
        vec![
            image.into(),
            prompt.into(),
            self.show_thinking.into(),
            self.cfg_text_scale.into(),
            self.cfg_img_scale.into(),
            self.cfg_interval.into(),
            self.timestep_shift.into(),
            self.num_timesteps.into(),
            self.cfg_renorm_min.into(),
            self.cfg_renorm_type.clone().into(),
            self.max_think_token_n.into(),
            self.do_sample.into(),
            self.text_temperature.into(),
            self.seed.into(),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptionOptions {
    pub show_thinking: bool,
    pub do_sample: bool,
    pub text_temperature: f64,
    pub max_new_tokens: u32,
}

impl Default for CaptionOptions {
    fn default() -> Self {
        Self {
            show_thinking: false,
            do_sample: false,
            text_temperature: 0.3,
            max_new_tokens: 2048,
        }
    }
}

impl CaptionOptions {
    pub fn job_args(&self, image: FileRef, prompt: &str) -> Vec<JobArg> {
        vec![
            image.into(),
            prompt.into(),
            self.show_thinking.into(),
            self.do_sample.into(),
            self.text_temperature.into(),
            self.max_new_tokens.into(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use crate::request::FileRef;

    use super::{CaptionOptions, EditImageOptions, Operation, TextToImageOptions};

    fn wire(args: Vec<crate::request::JobArg>) -> Value {
        serde_json::to_value(args).unwrap_or(Value::Null)
    }

    #[test]
    fn text_to_image_defaults_match_server_order() {
        let args = TextToImageOptions::default().job_args("a lighthouse");
        assert_eq!(
            wire(args),
            json!(["a lighthouse", false, 4.0, 0.4, 3.0, 50, 0.0, "global", 2048, false, 0.3, 0, "1:1"])
        );
        assert_eq!(Operation::TextToImage.fn_index(), 1);
    }

    #[test]
    fn edit_image_puts_file_reference_first() {
        let file = FileRef::new("/srv/u/in.png", "in.png", "image/png");
        let args = EditImageOptions::default().job_args(file, "make it night");
        let value = wire(args);
        let rows = value.as_array().cloned().unwrap_or_default();
        assert_eq!(rows.len(), 14);
        assert_eq!(rows[0]["path"], json!("/srv/u/in.png"));
        assert_eq!(rows[1], json!("make it night"));
        assert_eq!(rows[4], json!(2.0));
        assert_eq!(rows[9], json!("text_channel"));
        assert_eq!(rows[10], json!(1024));
        assert_eq!(Operation::EditImage.fn_index(), 3);
    }

    #[test]
    fn caption_args_follow_file_and_prompt() {
        let file = FileRef::new("/srv/u/in.png", "in.png", "image/png");
        let options = CaptionOptions {
            show_thinking: true,
            ..CaptionOptions::default()
        };
        let value = wire(options.job_args(file, "describe"));
        assert_eq!(value[1], json!("describe"));
        assert_eq!(value.as_array().map(Vec::len), Some(6));
        assert_eq!(value[2], json!(true));
        assert_eq!(value[5], json!(2048));
        assert_eq!(Operation::CaptionImage.fn_index(), 4);
    }

    #[test]
    fn options_deserialize_partially_and_ignore_unknown_keys() -> anyhow::Result<()> {
        let options: TextToImageOptions =
            serde_json::from_value(json!({"seed": 42, "image_ratio": "16:9", "style": "noir"}))?;
        assert_eq!(options.seed, 42);
        assert_eq!(options.image_ratio, "16:9");
        assert_eq!(options.num_timesteps, 50);
        assert_eq!(options.cfg_renorm_type, "global");
        Ok(())
    }
}
