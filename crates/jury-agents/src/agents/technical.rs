//! Technical delivery estimator.

use jury_consensus::{CriteriaSet, ScoreVector, Submission};

use super::{AgentKind, Assessment, Signals};

/// Metadata fields that count toward a complete technical sheet.
const SHEET_FIELDS: &[&str] = &[
    "resolution",
    "sound_mix",
    "aspect_ratio",
    "color_grade",
    "frame_rate",
    "camera",
];

fn resolution_score(raw: &str) -> f64 {
    let r = raw.to_ascii_lowercase();
    if r.contains("4k") || r.contains("uhd") || r.contains("2160") {
        9.0
    } else if r.contains("2k") || r.contains("1080") {
        7.5
    } else if r.contains("720") {
        5.5
    } else {
        5.0
    }
}

fn sound_bonus(raw: &str) -> f64 {
    let s = raw.to_ascii_lowercase();
    if s.contains("atmos") {
        1.0
    } else if s.contains("7.1") || s.contains("5.1") {
        0.7
    } else if s.contains("stereo") {
        0.2
    } else {
        0.0
    }
}

/// Scores picture and sound delivery from the technical metadata sheet.
#[derive(Debug, Clone, Copy, Default)]
pub struct TechnicalAgent;

impl TechnicalAgent {
    pub fn evaluate(&self, submission: &Submission, criteria: &CriteriaSet) -> ScoreVector {
        let signals = Signals::read(submission);
        let baseline = signals.baseline();

        let mut technical = submission
            .metadata("resolution")
            .map(resolution_score)
            .unwrap_or(5.0);
        if let Some(mix) = submission.metadata("sound_mix") {
            technical += sound_bonus(mix);
        }
        if submission.metadata("color_grade").is_some() {
            technical += 0.3;
        }

        let known: Vec<&str> = SHEET_FIELDS
            .iter()
            .copied()
            .filter(|field| {
                submission
                    .metadata(field)
                    .is_some_and(|v| !v.trim().is_empty())
            })
            .collect();

        let mut a = Assessment::uniform(baseline);
        a.technical = technical;
        a.craft = (technical + baseline) / 2.0;

        let confidence = 0.5 + 0.1 * known.len() as f64;
        let rationale = if known.is_empty() {
            format!(
                "Technical review for '{}': no technical sheet supplied",
                submission.title()
            )
        } else {
            format!(
                "Technical review for '{}': {} ({:.1}/10)",
                submission.title(),
                known.join(", "),
                technical
            )
        };
        a.into_vector(AgentKind::Technical, confidence, criteria, rationale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jury_consensus::{normalize, Criterion, RawSubmission};

    #[test]
    fn test_resolution_tiers() {
        assert_eq!(resolution_score("4K DCI"), 9.0);
        assert_eq!(resolution_score("UHD"), 9.0);
        assert_eq!(resolution_score("1920x1080"), 7.5);
        assert_eq!(resolution_score("720p"), 5.5);
        assert_eq!(resolution_score("SD"), 5.0);
    }

    #[test]
    fn test_full_sheet_raises_technical_and_confidence() {
        let sub = normalize(
            RawSubmission::new("t1", "Night Shift", "Paramedics on the late rotation.")
                .runtime(14.0)
                .metadata("resolution", "4K")
                .metadata("sound_mix", "Dolby Atmos")
                .metadata("aspect_ratio", "2.39:1")
                .metadata("color_grade", "DaVinci Resolve"),
        )
        .unwrap();
        let v = TechnicalAgent.evaluate(&sub, &CriteriaSet::default());
        assert_eq!(v.score(Criterion::TechnicalQuality), Some(100.0));
        assert_eq!(v.score(Criterion::Craft), Some(76.5));
        assert!((v.confidence - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_missing_sheet_is_low_confidence() {
        let sub = normalize(RawSubmission::new("t2", "Untitled", "Draft cut.").runtime(9.0)).unwrap();
        let v = TechnicalAgent.evaluate(&sub, &CriteriaSet::default());
        assert_eq!(v.score(Criterion::TechnicalQuality), Some(50.0));
        assert!((v.confidence - 0.5).abs() < 1e-9);
        assert!(v.rationale.unwrap().contains("no technical sheet"));
    }
}
