use crate::records::{ProductRequirement, UserStory, PRD_STATUS_COMPLETED, PRD_STATUS_VERIFICATION};
use serde::{Deserialize, Serialize};

pub const PRD_POINTS: u32 = 30;
pub const HANDOFF_POINTS: u32 = 40;
pub const STORY_POINTS: u32 = 30;

/// PLAN-phase verification of an SD with a PRD.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanVerification {
    pub score: u32,
    pub threshold: u32,
    pub complete: bool,
    pub prd_points: u32,
    pub handoff_points: u32,
    pub story_points: u32,
    pub stories_completed: usize,
    pub stories_total: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<String>,
}

/// Score = PRD status (30) + accepted EXEC-TO-PLAN or exemption (40) +
/// completed-story ratio × 30, rounded. Complete when score ≥ threshold.
///
/// With no stories at all, the story points are granted only when the SD
/// type does not require stories.
pub fn validate_plan_verification(
    prd: &ProductRequirement,
    exec_handoff_or_exempt: bool,
    stories: &[UserStory],
    stories_required: bool,
    threshold: u32,
) -> PlanVerification {
    let mut issues = Vec::new();

    let status = prd.status.to_ascii_lowercase();
    let prd_points = if status == PRD_STATUS_VERIFICATION || status == PRD_STATUS_COMPLETED {
        PRD_POINTS
    } else {
        issues.push(format!(
            "PRD status is '{}', expected '{PRD_STATUS_VERIFICATION}' or '{PRD_STATUS_COMPLETED}'",
            prd.status
        ));
        0
    };

    let handoff_points = if exec_handoff_or_exempt {
        HANDOFF_POINTS
    } else {
        issues.push("No accepted EXEC-TO-PLAN handoff".to_string());
        0
    };

    let total = stories.len();
    let completed = stories.iter().filter(|s| s.is_completed()).count();
    let story_points = if total == 0 {
        if stories_required {
            issues.push("No user stories to verify".to_string());
            0
        } else {
            STORY_POINTS
        }
    } else {
        (completed as f64 / total as f64 * f64::from(STORY_POINTS)).round() as u32
    };
    if total > 0 && completed < total {
        issues.push(format!("{completed}/{total} user stories completed"));
    }

    let score = prd_points + handoff_points + story_points;
    PlanVerification {
        score,
        threshold,
        complete: score >= threshold,
        prd_points,
        handoff_points,
        story_points,
        stories_completed: completed,
        stories_total: total,
        issues,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prd(status: &str) -> ProductRequirement {
        ProductRequirement {
            status: status.into(),
            ..Default::default()
        }
    }

    fn stories(done: usize, total: usize) -> Vec<UserStory> {
        (0..total)
            .map(|i| UserStory {
                status: if i < done { "completed" } else { "in_progress" }.into(),
                ..Default::default()
            })
            .collect()
    }

    #[test]
    fn full_marks() {
        let v = validate_plan_verification(&prd("verification"), true, &stories(3, 3), true, 70);
        assert_eq!(v.score, 100);
        assert!(v.complete);
        assert!(v.issues.is_empty());
    }

    #[test]
    fn two_of_three_stories() {
        let v = validate_plan_verification(&prd("verification"), true, &stories(2, 3), true, 70);
        assert_eq!(v.story_points, 20);
        assert_eq!(v.score, 90);
        assert!(v.complete);
    }

    #[test]
    fn sixty_nine_is_not_complete() {
        // 0 + 40 + round(29/30 × 30) = 69
        let v = validate_plan_verification(&prd("draft"), true, &stories(29, 30), true, 70);
        assert_eq!(v.score, 69);
        assert!(!v.complete);

        let v = validate_plan_verification(&prd("draft"), true, &stories(30, 30), true, 70);
        assert_eq!(v.score, 70);
        assert!(v.complete);
    }

    #[test]
    fn empty_stories_depend_on_type() {
        let v = validate_plan_verification(&prd("completed"), true, &[], false, 70);
        assert_eq!(v.score, 100);
        let v = validate_plan_verification(&prd("completed"), true, &[], true, 70);
        assert_eq!(v.score, 70);
        assert!(v.issues.iter().any(|i| i.contains("No user stories")));
    }

    #[test]
    fn missing_handoff_costs_forty() {
        let v = validate_plan_verification(&prd("verification"), false, &stories(1, 1), true, 70);
        assert_eq!(v.score, 60);
        assert!(!v.complete);
    }
}
