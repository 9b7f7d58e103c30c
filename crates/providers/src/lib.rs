//! LLM provider implementations for FerroAgent.
//!
//! All providers implement the `ferroagent_core::Provider` trait.

pub mod openai_compat;

pub use openai_compat::OpenAiCompatProvider;
