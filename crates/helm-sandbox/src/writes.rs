use serde::{Deserialize, Serialize};

/// A write an agent is permitted to make, declared before the turn runs.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeclaredOutput {
    /// Relative to the session root, e.g. `"output/result.json"` or
    /// `"tmp/scratch.csv"` — the leading segment names which of the two
    /// sandbox trees the path lives under.
    pub path: String,
    pub role: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RealizedWrite {
    pub path: String,
    pub hash: String,
}

/// Outcome of diffing what was declared against what actually landed on disk.
/// `valid` iff `missing` and `undeclared` are both empty — declared and
/// realized paths are set-equal.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WriteReport {
    pub realized: Vec<RealizedWrite>,
    pub valid: bool,
    pub missing: Vec<String>,
    pub undeclared: Vec<String>,
}

impl WriteReport {
    pub fn diff(declared: &[DeclaredOutput], realized: Vec<RealizedWrite>) -> Self {
        let declared_paths: std::collections::HashSet<&str> =
            declared.iter().map(|d| d.path.as_str()).collect();
        let realized_paths: std::collections::HashSet<&str> =
            realized.iter().map(|r| r.path.as_str()).collect();

        let mut missing: Vec<String> = declared_paths
            .difference(&realized_paths)
            .map(|s| s.to_string())
            .collect();
        missing.sort();

        let mut undeclared: Vec<String> = realized_paths
            .difference(&declared_paths)
            .map(|s| s.to_string())
            .collect();
        undeclared.sort();

        let valid = missing.is_empty() && undeclared.is_empty();

        Self {
            realized,
            valid,
            missing,
            undeclared,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn declared(path: &str) -> DeclaredOutput {
        DeclaredOutput {
            path: path.to_string(),
            role: "final".to_string(),
        }
    }

    fn realized(path: &str) -> RealizedWrite {
        RealizedWrite {
            path: path.to_string(),
            hash: "sha256:x".to_string(),
        }
    }

    #[test]
    fn matching_sets_are_valid() {
        let report = WriteReport::diff(
            &[declared("output/a.json")],
            vec![realized("output/a.json")],
        );
        assert!(report.valid);
        assert!(report.missing.is_empty());
        assert!(report.undeclared.is_empty());
    }

    #[test]
    fn missing_declared_path_invalidates() {
        let report = WriteReport::diff(&[declared("output/a.json")], vec![]);
        assert!(!report.valid);
        assert_eq!(report.missing, vec!["output/a.json".to_string()]);
    }

    #[test]
    fn undeclared_path_invalidates() {
        let report = WriteReport::diff(&[], vec![realized("output/sneaky.txt")]);
        assert!(!report.valid);
        assert_eq!(report.undeclared, vec!["output/sneaky.txt".to_string()]);
    }

    #[test]
    fn empty_declared_and_realized_is_valid() {
        let report = WriteReport::diff(&[], vec![]);
        assert!(report.valid);
    }
}
