use serde::{Deserialize, Serialize};

/// Cognitive tier. HOT owns governance and shared infrastructure; HO2 is the
/// supervisor/critic; HO1 is the worker/executor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Hot,
    Ho2,
    Ho1,
}

impl Tier {
    /// Numeric rank used by the visibility matrix: higher ranks see lower ones.
    pub fn rank(self) -> u8 {
        match self {
            Tier::Hot => 2,
            Tier::Ho2 => 1,
            Tier::Ho1 => 0,
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Tier::Hot => "hot",
            Tier::Ho2 => "ho2",
            Tier::Ho1 => "ho1",
        };
        write!(f, "{s}")
    }
}
