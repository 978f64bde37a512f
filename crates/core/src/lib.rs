pub mod conversation;
pub mod error;
pub mod llm;
pub mod registry;
pub mod tts;

pub use conversation::{History, Message, Role};
pub use error::{ProviderError, Result};
pub use llm::{GenerationOptions, GenerationProvider, LlmManager, ResponseChunk};
pub use registry::{Provider, ProviderRegistry};
pub use tts::{SynthesisOptions, SynthesisProvider, TtsManager, Voice};
