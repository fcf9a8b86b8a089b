pub mod contexts;
pub mod data;
pub mod llm;
pub mod settings;
