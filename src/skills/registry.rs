//! Registry of the skills exposed to the LLM host.

use serde_json::Value;

use super::Skill;

/// A tool definition as presented to the LLM host.
#[derive(Debug, Clone)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// Holds the registered skills and derives their tool definitions.
pub struct SkillRegistry {
    skills: Vec<Box<dyn Skill>>,
}

impl SkillRegistry {
    pub fn new() -> Self {
        Self { skills: Vec::new() }
    }

    pub fn register(&mut self, skill: Box<dyn Skill>) {
        self.skills.push(skill);
    }

    /// Looks up a skill by its tool name.
    pub fn get(&self, name: &str) -> Option<&dyn Skill> {
        self.skills
            .iter()
            .find(|s| s.name() == name)
            .map(|s| s.as_ref())
    }

    pub fn len(&self) -> usize {
        self.skills.len()
    }

    pub fn is_empty(&self) -> bool {
        self.skills.is_empty()
    }

    /// Tool definitions for every registered skill, in registration order.
    pub fn tool_definitions(&self) -> Vec<ToolDefinition> {
        self.skills
            .iter()
            .map(|s| ToolDefinition {
                name: s.name().to_string(),
                description: s.description().to_string(),
                input_schema: s.parameters_schema(),
            })
            .collect()
    }
}

impl Default for SkillRegistry {
    fn default() -> Self {
        Self::new()
    }
}
