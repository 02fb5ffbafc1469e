//! # Mode Resolution
//!
//! Decides External vs Internal and whether the mode changed since the last
//! completed reconciliation. Pure: same inputs, same answer.

use super::desired::DesiredState;
use crate::crd::{GiteaStatus, Mode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeResolution {
    pub mode: Mode,
    /// Mode recorded in status, if any
    pub previous: Option<Mode>,
    /// The recorded mode differs from the resolved one.
    /// A resource without a recorded mode has nothing to clean up, so this is false.
    pub transitioned: bool,
}

#[must_use]
pub fn resolve(desired: &DesiredState, observed: Option<&GiteaStatus>) -> ModeResolution {
    let mode = desired.mode();
    let previous = observed.and_then(|status| status.resolved_mode);
    ModeResolution {
        mode,
        previous,
        transitioned: previous.is_some_and(|previous| previous != mode),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::reconciler::desired::{DesiredMode, InternalSpec, ResolvedSizing};
    use crate::crd::{Exposure, SizePreset};

    fn desired(external: bool) -> DesiredState {
        let mode = if external {
            DesiredMode::External {
                credential_ref: "ext-secret".to_string(),
            }
        } else {
            DesiredMode::Internal(InternalSpec {
                image: "gitea/gitea:1.22".to_string(),
                sizing: ResolvedSizing::preset(SizePreset::Small),
                exposure: Exposure::default(),
            })
        };
        DesiredState {
            name: "docs".to_string(),
            namespace: "default".to_string(),
            uid: "uid-1".to_string(),
            generation: 1,
            mode,
        }
    }

    fn status(mode: Option<Mode>) -> GiteaStatus {
        GiteaStatus {
            resolved_mode: mode,
            ..GiteaStatus::default()
        }
    }

    #[test]
    fn test_first_reconciliation_is_not_a_transition() {
        let resolution = resolve(&desired(false), None);
        assert_eq!(resolution.mode, Mode::Internal);
        assert!(!resolution.transitioned);

        let resolution = resolve(&desired(true), Some(&status(None)));
        assert_eq!(resolution.mode, Mode::External);
        assert!(!resolution.transitioned);
    }

    #[test]
    fn test_mode_change_is_a_transition() {
        let resolution = resolve(&desired(true), Some(&status(Some(Mode::Internal))));
        assert_eq!(resolution.previous, Some(Mode::Internal));
        assert!(resolution.transitioned);

        let resolution = resolve(&desired(false), Some(&status(Some(Mode::External))));
        assert!(resolution.transitioned);
    }

    #[test]
    fn test_same_mode_is_not_a_transition() {
        let resolution = resolve(&desired(false), Some(&status(Some(Mode::Internal))));
        assert!(!resolution.transitioned);
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let d = desired(true);
        let s = status(Some(Mode::Internal));
        assert_eq!(resolve(&d, Some(&s)), resolve(&d, Some(&s)));
    }
}
