pub(crate) mod deepseek;

pub use deepseek::{DeepSeekClient, DeepSeekConfig};
