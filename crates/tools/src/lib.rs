//! Built-in tool implementations for FerroAgent.
//!
//! The `final_answer` termination tool, two demo tools (`calculate`,
//! `get_weather`), and `FnTool` for closure-backed tools.

pub mod calculator;
pub mod final_answer;
pub mod fn_tool;
pub mod weather_lookup;

use ferroagent_core::tool::ToolRegistry;

pub use calculator::CalculatorTool;
pub use final_answer::{FINAL_ANSWER_TOOL, FinalAnswerTool};
pub use fn_tool::FnTool;
pub use weather_lookup::WeatherLookupTool;

/// Create a registry with the demo tools and `final_answer`.
pub fn default_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(WeatherLookupTool));
    registry.register(Box::new(CalculatorTool));
    registry.register(Box::new(FinalAnswerTool));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_has_demo_tools() {
        let registry = default_registry();
        assert_eq!(registry.names(), vec!["get_weather", "calculate", "final_answer"]);
    }
}
