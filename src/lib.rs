pub mod core;
pub mod error;
pub mod io;
pub mod mcp;

pub use crate::core::coach::Coach;
pub use crate::core::conversation::{ChatMessage, ConversationInput, Role};
pub use crate::core::normalizer::AnalyzeResult;
pub use crate::error::CoachError;
