use std::path::PathBuf;
use which::which;

pub fn locate(tool: &str) -> Option<PathBuf> {
    match which(tool) {
        Ok(path) => {
            tracing::debug!("Found {}: {:?}", tool, path);
            Some(path)
        }
        Err(_) => None,
    }
}

pub fn is_installed(tool: &str) -> bool {
    locate(tool).is_some()
}

/// Availability of each tool, in the order given.
pub fn availability(tools: &[&'static str]) -> Vec<(&'static str, bool)> {
    tools.iter().map(|tool| (*tool, is_installed(tool))).collect()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_detects_shell_and_missing_tool() {
        assert!(is_installed("sh"));
        assert!(!is_installed("hawkeye-no-such-tool"));
        assert_eq!(
            availability(&["sh", "hawkeye-no-such-tool"]),
            vec![("sh", true), ("hawkeye-no-such-tool", false)]
        );
    }
}
