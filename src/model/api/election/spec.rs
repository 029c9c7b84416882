use serde::{Deserialize, Serialize};

/// A request to create an election.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionSpec {
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Candidate names, in ballot order.
    pub candidates: Vec<String>,
}

#[cfg(test)]
impl ElectionSpec {
    pub fn example() -> Self {
        Self {
            title: "Test".to_string(),
            description: "An example election".to_string(),
            candidates: vec!["X".to_string(), "Y".to_string()],
        }
    }
}
