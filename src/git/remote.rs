//! Parsing of `git ls-remote --heads` output.

use tracing::warn;

use crate::types::BranchName;

/// Extracts branch names from `git ls-remote --heads` output.
///
/// Each line is `<sha>\t<ref>`. Lines that are blank, malformed, not under
/// `refs/heads/`, or that name an unusable branch are skipped. Order is
/// preserved and duplicates removed.
pub fn parse_ls_remote_heads(output: &str) -> Vec<BranchName> {
    let mut branches: Vec<BranchName> = Vec::new();

    for line in output.lines() {
        let mut fields = line.split_whitespace();
        let (Some(_sha), Some(git_ref)) = (fields.next(), fields.next()) else {
            continue;
        };

        match BranchName::from_ref(git_ref) {
            Some(Ok(branch)) => {
                if !branches.contains(&branch) {
                    branches.push(branch);
                }
            }
            Some(Err(e)) => {
                warn!(git_ref = %git_ref, error = %e, "Skipping remote branch with unusable name");
            }
            None => {}
        }
    }

    branches
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn names(branches: &[BranchName]) -> Vec<&str> {
        branches.iter().map(BranchName::as_str).collect()
    }

    #[test]
    fn parses_typical_output() {
        let output = "\
3f786850e387550fdab836ed7e6dc881de23001b\trefs/heads/main
89e6c98d92887913cadf06b2adb97f26cde4849b\trefs/heads/docs-v2
2b66fd261ee5c6cfc8de7fa466bab600bcfe4f69\trefs/heads/feature/search
";
        assert_eq!(
            names(&parse_ls_remote_heads(output)),
            vec!["main", "docs-v2", "feature/search"]
        );
    }

    #[test]
    fn skips_malformed_and_foreign_lines() {
        let output = "\n\
garbage\n\
abc123\trefs/tags/v1.0\n\
abc123\trefs/heads/..\n\
abc123\trefs/heads/ok\n";
        assert_eq!(names(&parse_ls_remote_heads(output)), vec!["ok"]);
    }

    #[test]
    fn empty_output_yields_nothing() {
        assert!(parse_ls_remote_heads("").is_empty());
    }

    #[test]
    fn duplicates_are_removed() {
        let output = "a\trefs/heads/main\nb\trefs/heads/main\n";
        assert_eq!(names(&parse_ls_remote_heads(output)), vec!["main"]);
    }

    proptest! {
        #[test]
        fn never_panics(output: String) {
            let _ = parse_ls_remote_heads(&output);
        }

        #[test]
        fn every_valid_head_is_found(
            heads in prop::collection::vec("[a-z][a-z0-9-]{0,12}(/[a-z0-9-]{1,8})?", 0..8)
        ) {
            let output: String = heads
                .iter()
                .map(|h| format!("{}\trefs/heads/{}\n", "f".repeat(40), h))
                .collect();
            let parsed = parse_ls_remote_heads(&output);
            for head in &heads {
                prop_assert!(parsed.iter().any(|b| b.as_str() == head));
            }
        }
    }
}
