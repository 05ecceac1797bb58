pub mod openai;

pub use openai::{OpenAiCompletions, OpenAiEmbeddings};
