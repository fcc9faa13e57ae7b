//! Named cross-validation schemes.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use super::split::{KFold, LeaveOneGroupOut, Splitter, StratifiedKFold};

/// How samples are partitioned for cross-validation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum CvScheme {
    /// Unshuffled stratified k-fold with the configured fold count (3 unless
    /// overridden). Ignores sessions.
    #[default]
    Default,
    StratifiedKFold,
    KFold,
    /// One fold per session.
    LeaveOneSessionOut,
    /// One fold per pair of consecutive sessions (`session / 2`).
    LeaveTwoSessionsOut,
}

impl CvScheme {
    /// Whether folds are derived from session ids.
    pub fn uses_sessions(self) -> bool {
        matches!(self, Self::LeaveOneSessionOut | Self::LeaveTwoSessionsOut)
    }

    pub fn splitter(self, n_folds: usize) -> Box<dyn Splitter> {
        match self {
            Self::Default | Self::StratifiedKFold => Box::new(StratifiedKFold::new(n_folds)),
            Self::KFold => Box::new(KFold::new(n_folds)),
            Self::LeaveOneSessionOut | Self::LeaveTwoSessionsOut => Box::new(LeaveOneGroupOut),
        }
    }

    /// Group ids handed to the splitter, if the scheme uses any.
    pub fn groups(self, sessions: &[u32]) -> Option<Vec<u32>> {
        match self {
            Self::LeaveOneSessionOut => Some(sessions.to_vec()),
            Self::LeaveTwoSessionsOut => Some(sessions.iter().map(|&s| s / 2).collect()),
            Self::Default | Self::StratifiedKFold | Self::KFold => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(CvScheme::Default, None)]
    #[case(CvScheme::KFold, None)]
    #[case(CvScheme::LeaveOneSessionOut, Some(vec![0, 1, 2, 3, 4]))]
    #[case(CvScheme::LeaveTwoSessionsOut, Some(vec![0, 0, 1, 1, 2]))]
    fn groups_per_scheme(#[case] scheme: CvScheme, #[case] expected: Option<Vec<u32>>) {
        assert_eq!(scheme.groups(&[0, 1, 2, 3, 4]), expected);
        assert_eq!(scheme.uses_sessions(), expected.is_some());
    }

    #[test]
    fn default_is_stratified() {
        assert_eq!(CvScheme::Default.splitter(3).describe(), "StratifiedKFold(n_folds=3)");
        assert_eq!(CvScheme::LeaveTwoSessionsOut.splitter(3).describe(), "LeaveOneGroupOut");
    }

    #[test]
    fn serializes_kebab_case() {
        let json = serde_json::to_string(&CvScheme::LeaveTwoSessionsOut).unwrap();
        assert_eq!(json, "\"leave-two-sessions-out\"");
    }

    #[test]
    fn command_line_names_match_report_names() {
        for scheme in CvScheme::value_variants() {
            let name = scheme.to_possible_value().unwrap().get_name().to_string();
            assert_eq!(serde_json::to_string(scheme).unwrap(), format!("\"{name}\""));
            assert_eq!(CvScheme::from_str(&name, false).unwrap(), *scheme);
        }
    }
}
