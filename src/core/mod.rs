pub mod coach;
pub mod conversation;
pub mod cortex;
pub mod normalizer;
pub mod prompt;
pub mod retry;
pub mod state;
