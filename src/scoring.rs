use crate::models::{CandidateProfile, JobAnalysis, RemoteType};

const REQUIRED_POINTS: u32 = 2;
const PREFERRED_POINTS: u32 = 1;
const FULLY_REMOTE_POINTS: u32 = 2;

/// Fit of a posting for the candidate, in [0, 1].
///
/// A failed analysis (`None`) scores 0. An analysis with nothing to score
/// against (no skills listed, not fully remote) scores a neutral 0.5.
pub fn score(analysis: Option<&JobAnalysis>, profile: &CandidateProfile) -> f64 {
    let Some(analysis) = analysis else {
        return 0.0;
    };

    let profile_skills: Vec<String> = profile
        .skills
        .iter()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect();

    let mut earned = 0;
    let mut possible = 0;

    let weighted = analysis
        .required_skills
        .iter()
        .map(|s| (s, REQUIRED_POINTS))
        .chain(analysis.preferred_skills.iter().map(|s| (s, PREFERRED_POINTS)));
    for (skill, points) in weighted {
        let skill = skill.trim().to_lowercase();
        if skill.is_empty() {
            continue;
        }
        possible += points;
        if has_skill(&profile_skills, &skill) {
            earned += points;
        }
    }

    if analysis.remote_type == Some(RemoteType::FullyRemote) {
        earned += FULLY_REMOTE_POINTS;
        possible += FULLY_REMOTE_POINTS;
    }

    if possible == 0 {
        return 0.5;
    }
    f64::from(earned) / f64::from(possible)
}

// "sql" matches "postgresql" and "project management" matches "management".
fn has_skill(profile_skills: &[String], skill: &str) -> bool {
    profile_skills
        .iter()
        .any(|own| own.contains(skill) || skill.contains(own.as_str()))
}
