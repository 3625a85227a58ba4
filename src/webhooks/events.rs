//! Push event payloads and what to do about them.
//!
//! Only three fields of a push delivery matter: the updated ref, the clone
//! URL, and whether the ref was deleted. Everything else in the payload is
//! ignored.

use serde::Deserialize;
use thiserror::Error;

use crate::types::{BranchName, InvalidBranchName, RepositoryUrl};

/// `X-GitHub-Event` values that only check connectivity.
const CONNECTIVITY_EVENTS: &[&str] = &["ping", "created"];

/// Returns true for deliveries that need an immediate 200 and nothing else.
pub fn is_connectivity_check(event_type: Option<&str>) -> bool {
    event_type.is_some_and(|event| CONNECTIVITY_EVENTS.contains(&event))
}

#[derive(Debug, Error)]
pub enum EventError {
    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("invalid branch in {git_ref:?}: {source}")]
    InvalidBranch {
        git_ref: String,
        #[source]
        source: InvalidBranchName,
    },
}

/// The fields of a push delivery that drive builds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PushEvent {
    #[serde(rename = "ref")]
    pub git_ref: String,
    pub repository: Repository,
    #[serde(default)]
    pub deleted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Repository {
    pub clone_url: String,
}

/// What a push delivery asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushAction {
    Build {
        branch: BranchName,
        url: RepositoryUrl,
    },
    Delete {
        branch: BranchName,
    },
    /// The ref is not a branch head (e.g. a tag).
    Ignore,
}

impl PushEvent {
    pub fn parse(body: &[u8]) -> Result<Self, EventError> {
        Ok(serde_json::from_slice(body)?)
    }

    /// Derives the action for this push.
    pub fn action(&self) -> Result<PushAction, EventError> {
        let branch = match BranchName::from_ref(&self.git_ref) {
            None => return Ok(PushAction::Ignore),
            Some(result) => result.map_err(|source| EventError::InvalidBranch {
                git_ref: self.git_ref.clone(),
                source,
            })?,
        };

        if self.deleted {
            Ok(PushAction::Delete { branch })
        } else {
            Ok(PushAction::Build {
                branch,
                url: RepositoryUrl::new(self.repository.clone_url.clone()),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn push(git_ref: &str, deleted: Option<bool>) -> Vec<u8> {
        let mut body = json!({
            "ref": git_ref,
            "before": "0000000000000000000000000000000000000000",
            "repository": {
                "full_name": "acme/docs",
                "clone_url": "https://github.com/acme/docs.git"
            },
            "pusher": { "name": "someone" }
        });
        if let Some(deleted) = deleted {
            body["deleted"] = json!(deleted);
        }
        serde_json::to_vec(&body).unwrap()
    }

    #[test]
    fn connectivity_events() {
        assert!(is_connectivity_check(Some("ping")));
        assert!(is_connectivity_check(Some("created")));
        assert!(!is_connectivity_check(Some("push")));
        assert!(!is_connectivity_check(None));
    }

    #[test]
    fn push_builds_branch() {
        let event = PushEvent::parse(&push("refs/heads/docs-v2", None)).unwrap();
        assert!(!event.deleted);

        assert_eq!(
            event.action().unwrap(),
            PushAction::Build {
                branch: BranchName::parse("docs-v2").unwrap(),
                url: RepositoryUrl::new("https://github.com/acme/docs.git"),
            }
        );
    }

    #[test]
    fn deleted_push_deletes_branch() {
        let event = PushEvent::parse(&push("refs/heads/feature/x", Some(true))).unwrap();
        assert_eq!(
            event.action().unwrap(),
            PushAction::Delete {
                branch: BranchName::parse("feature/x").unwrap()
            }
        );
    }

    #[test]
    fn tag_push_is_ignored() {
        let event = PushEvent::parse(&push("refs/tags/v1.0", None)).unwrap();
        assert_eq!(event.action().unwrap(), PushAction::Ignore);
    }

    #[test]
    fn traversal_branch_is_rejected() {
        let event = PushEvent::parse(&push("refs/heads/../../etc", None)).unwrap();
        assert!(matches!(
            event.action(),
            Err(EventError::InvalidBranch { .. })
        ));
    }

    #[test]
    fn missing_fields_are_malformed() {
        for body in [
            &b"not json"[..],
            br#"{"ref": "refs/heads/main"}"#,
            br#"{"repository": {"clone_url": "x"}}"#,
            br#"{"ref": 7, "repository": {"clone_url": "x"}}"#,
        ] {
            assert!(matches!(
                PushEvent::parse(body),
                Err(EventError::Malformed(_))
            ));
        }
    }
}
