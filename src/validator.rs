//! Business-rule checks for submitted club requests.
//!
//! Every rule is evaluated and every violation is reported, in a fixed
//! order, so a rider can fix the whole form in one pass.

use serde::{Deserialize, Serialize};

use crate::models::LiftClubRequestDraft;

pub const MIN_DESCRIPTION_LEN: usize = 20;
pub const MIN_ESTIMATED_MEMBERS: i64 = 3;
pub const MAX_ESTIMATED_MEMBERS: i64 = 20;
pub const MIN_BUDGET: i64 = 100;

/// Outcome of validating a draft
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<String>,
}

/// Validate a draft against all submission rules
pub fn validate(draft: &LiftClubRequestDraft) -> ValidationResult {
    let mut errors = Vec::new();

    // Required text fields
    for (value, field) in [
        (&draft.proposed_name, "Proposed name"),
        (&draft.pickup_location, "Pickup location"),
        (&draft.dropoff_location, "Dropoff location"),
        (&draft.description, "Description"),
    ] {
        if value.trim().is_empty() {
            errors.push(format!("{field} is required"));
        }
    }

    if !is_valid_time(&draft.preferred_departure_time) {
        errors.push("Preferred departure time must be in 24-hour HH:MM format".to_string());
    }

    if draft.description.trim().chars().count() < MIN_DESCRIPTION_LEN {
        errors.push(format!(
            "Description must be at least {MIN_DESCRIPTION_LEN} characters"
        ));
    }

    if draft.estimated_members < MIN_ESTIMATED_MEMBERS {
        errors.push(format!(
            "Estimated members must be at least {MIN_ESTIMATED_MEMBERS}"
        ));
    } else if draft.estimated_members > MAX_ESTIMATED_MEMBERS {
        errors.push(format!(
            "Estimated members must be at most {MAX_ESTIMATED_MEMBERS}"
        ));
    }

    if draft.max_budget < MIN_BUDGET {
        errors.push(format!("Maximum budget must be at least {MIN_BUDGET}"));
    }

    errors.extend(check_days(&draft.days_of_week));

    ValidationResult {
        is_valid: errors.is_empty(),
        errors,
    }
}

/// Check a fixed-width 24-hour `HH:MM` string
pub fn is_valid_time(value: &str) -> bool {
    let bytes = value.as_bytes();
    if bytes.len() != 5 || bytes[2] != b':' {
        return false;
    }
    let digits = [bytes[0], bytes[1], bytes[3], bytes[4]];
    if !digits.iter().all(u8::is_ascii_digit) {
        return false;
    }
    let hour = (digits[0] - b'0') * 10 + (digits[1] - b'0');
    let minute = (digits[2] - b'0') * 10 + (digits[3] - b'0');
    hour <= 23 && minute <= 59
}

fn check_days(days: &[i64]) -> Vec<String> {
    let mut errors = Vec::new();
    if days.is_empty() {
        errors.push("At least one day of the week is required".to_string());
        return errors;
    }
    if days.iter().any(|d| !(0..=6).contains(d)) {
        errors.push("Days of week must be between 0 (Sunday) and 6 (Saturday)".to_string());
    }
    let mut seen = [false; 7];
    let mut duplicate = false;
    for &day in days.iter().filter(|d| (0..=6).contains(*d)) {
        let slot = &mut seen[day as usize];
        duplicate |= *slot;
        *slot = true;
    }
    if duplicate {
        errors.push("Days of week must not contain duplicates".to_string());
    }
    errors
}

/// Sorted day set of an already validated draft
pub(crate) fn normalized_days(days: &[i64]) -> Vec<u8> {
    let mut out: Vec<u8> = days
        .iter()
        .filter_map(|d| u8::try_from(*d).ok())
        .filter(|d| *d <= 6)
        .collect();
    out.sort_unstable();
    out.dedup();
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RequesterRole, RouteType};

    fn valid_draft() -> LiftClubRequestDraft {
        LiftClubRequestDraft {
            requester_role: RequesterRole::Parent,
            route_type: RouteType::School,
            proposed_name: "X".to_string(),
            pickup_location: "A".to_string(),
            dropoff_location: "B".to_string(),
            preferred_departure_time: "07:15".to_string(),
            days_of_week: vec![1, 2, 3, 4, 5],
            estimated_members: 5,
            max_budget: 500,
            description: "Need reliable morning transport for kids".to_string(),
        }
    }

    #[test]
    fn test_valid_draft_passes() {
        let result = validate(&valid_draft());
        assert!(result.is_valid);
        assert!(result.errors.is_empty());
    }

    #[test]
    fn test_short_description_and_too_few_members() {
        let mut draft = valid_draft();
        draft.description = "Ten chars!".to_string();
        draft.estimated_members = 2;

        let result = validate(&draft);
        assert!(!result.is_valid);
        assert_eq!(
            result.errors,
            vec![
                "Description must be at least 20 characters".to_string(),
                "Estimated members must be at least 3".to_string(),
            ]
        );
    }

    #[test]
    fn test_all_violations_collected_in_rule_order() {
        let draft = LiftClubRequestDraft {
            requester_role: RequesterRole::Commuter,
            route_type: RouteType::Staff,
            proposed_name: "   ".to_string(),
            pickup_location: String::new(),
            dropoff_location: "B".to_string(),
            preferred_departure_time: "24:00".to_string(),
            days_of_week: vec![],
            estimated_members: 21,
            max_budget: 99,
            description: "short".to_string(),
        };

        let result = validate(&draft);
        assert_eq!(
            result.errors,
            vec![
                "Proposed name is required".to_string(),
                "Pickup location is required".to_string(),
                "Preferred departure time must be in 24-hour HH:MM format".to_string(),
                "Description must be at least 20 characters".to_string(),
                "Estimated members must be at most 20".to_string(),
                "Maximum budget must be at least 100".to_string(),
                "At least one day of the week is required".to_string(),
            ]
        );
    }

    #[test]
    fn test_description_length_counts_trimmed_chars() {
        let mut draft = valid_draft();
        draft.description = format!("   {}   ", "a".repeat(19));
        assert!(!validate(&draft).is_valid);

        draft.description = "é".repeat(20);
        assert!(validate(&draft).is_valid);
    }

    #[test]
    fn test_time_format() {
        assert!(is_valid_time("00:00"));
        assert!(is_valid_time("23:59"));
        assert!(!is_valid_time("7:15"));
        assert!(!is_valid_time("07:60"));
        assert!(!is_valid_time("07-15"));
        assert!(!is_valid_time("07:15 "));
        assert!(!is_valid_time(""));
    }

    #[test]
    fn test_days_out_of_range_and_duplicates() {
        let mut draft = valid_draft();
        draft.days_of_week = vec![1, 1, 7, -1];

        let result = validate(&draft);
        assert_eq!(
            result.errors,
            vec![
                "Days of week must be between 0 (Sunday) and 6 (Saturday)".to_string(),
                "Days of week must not contain duplicates".to_string(),
            ]
        );
    }

    #[test]
    fn test_boundaries_are_inclusive() {
        let mut draft = valid_draft();
        draft.estimated_members = 3;
        draft.max_budget = 100;
        assert!(validate(&draft).is_valid);

        draft.estimated_members = 20;
        assert!(validate(&draft).is_valid);
    }

    #[test]
    fn test_normalized_days_sorted() {
        assert_eq!(normalized_days(&[5, 0, 3]), vec![0, 3, 5]);
    }
}
