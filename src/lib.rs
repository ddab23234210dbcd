pub mod analysis;
pub mod conditions;
pub mod config;
pub mod evaluate;
pub mod fetch;
pub mod llm;
pub mod output;
pub mod prompts;
pub mod stories;
pub mod tasks;
pub mod template;
