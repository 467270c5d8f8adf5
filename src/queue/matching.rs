use std::collections::HashSet;

use geo::{HaversineDistance, Point};

use crate::models::{Location, Preferences, UserProfile};
use crate::queue::{
    AGE_FIT_POINTS, COMMUNITY_POINTS, DEFAULT_PROXIMITY_RADIUS_KM, INTEREST_POINTS, PROXIMITY_POINTS,
};

/// Great-circle distance between two locations in kilometres.
pub fn distance_km(a: &Location, b: &Location) -> f64 {
    let pa = Point::new(a.long, a.lat);
    let pb = Point::new(b.long, b.lat);
    pa.haversine_distance(&pb) / 1000.0
}

fn normalized(interests: &[String]) -> HashSet<String> {
    interests.iter().map(|i| i.trim().to_lowercase()).collect()
}

/// Returns true if `candidate` meets every preference that is set.
/// A stated preference the candidate has no data for is not met.
pub fn satisfies(prefs: &Preferences, candidate: &UserProfile) -> bool {
    if prefs.is_empty() {
        return true;
    }

    if let Some(range) = &prefs.age_range {
        match candidate.age {
            Some(age) if range.contains(age) => {}
            _ => {
                log::debug!("User {} outside age range {:?}", candidate.user_id, range);
                return false;
            }
        }
    }

    if let Some(area) = &prefs.location {
        match &candidate.location {
            Some(loc) if distance_km(&area.center, loc) <= area.radius_km => {}
            _ => {
                log::debug!("User {} outside search radius {:.1}km", candidate.user_id, area.radius_km);
                return false;
            }
        }
    }

    if let Some(community) = &prefs.community {
        let same = candidate
            .community
            .as_deref()
            .map(|c| c.eq_ignore_ascii_case(community))
            .unwrap_or(false);
        if !same {
            log::debug!("User {} not in community {}", candidate.user_id, community);
            return false;
        }
    }

    if !prefs.interests.is_empty() {
        let wanted = normalized(&prefs.interests);
        let has = normalized(&candidate.interests);
        if wanted.is_disjoint(&has) {
            log::debug!("User {} shares no requested interest", candidate.user_id);
            return false;
        }
    }

    true
}

/// Both directions of `satisfies`.
pub fn mutually_compatible(
    a_prefs: &Preferences,
    a_profile: &UserProfile,
    b_prefs: &Preferences,
    b_profile: &UserProfile,
) -> bool {
    satisfies(a_prefs, b_profile) && satisfies(b_prefs, a_profile)
}

/// Compatibility score in 0..=100 built from interest overlap, shared
/// community, physical proximity and mutual age-range fit.
pub fn compatibility_score(
    a_prefs: &Preferences,
    a_profile: &UserProfile,
    b_prefs: &Preferences,
    b_profile: &UserProfile,
) -> u8 {
    let mut score = 0.0;

    let ia = normalized(&a_profile.interests);
    let ib = normalized(&b_profile.interests);
    let union = ia.union(&ib).count();
    if union > 0 {
        let jaccard = ia.intersection(&ib).count() as f64 / union as f64;
        score += INTEREST_POINTS * jaccard;
    }

    if let (Some(ca), Some(cb)) = (&a_profile.community, &b_profile.community) {
        if ca.eq_ignore_ascii_case(cb) {
            score += COMMUNITY_POINTS;
        }
    }

    if let (Some(la), Some(lb)) = (&a_profile.location, &b_profile.location) {
        // Tightest stated radius wins.
        let radius = [a_prefs.location, b_prefs.location]
            .iter()
            .flatten()
            .map(|area| area.radius_km)
            .fold(DEFAULT_PROXIMITY_RADIUS_KM, f64::min);
        let distance = distance_km(la, lb);
        if radius > 0.0 && distance <= radius {
            score += PROXIMITY_POINTS * (1.0 - distance / radius);
        }
    }

    if let (Some(age_a), Some(age_b)) = (a_profile.age, b_profile.age) {
        let a_accepts = a_prefs.age_range.map_or(true, |r| r.contains(age_b));
        let b_accepts = b_prefs.age_range.map_or(true, |r| r.contains(age_a));
        if a_accepts && b_accepts {
            score += AGE_FIT_POINTS;
        }
    }

    score.round().clamp(0.0, 100.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AgeRange, LocationPreference};

    fn profile(user_id: i64, age: u8, community: &str, interests: &[&str]) -> UserProfile {
        UserProfile {
            user_id,
            age: Some(age),
            location: Some(Location { lat: 52.5200, long: 13.4050 }),
            community: Some(community.to_string()),
            interests: interests.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn empty_preferences_accept_anyone() {
        let prefs = Preferences::default();
        assert!(prefs.is_empty());
        assert!(satisfies(&prefs, &UserProfile { user_id: 1, ..Default::default() }));

        let blank_interest_list = Preferences {
            interests: Vec::new(),
            community: Some("chess".to_string()),
            ..Default::default()
        };
        assert!(!blank_interest_list.is_empty());
    }

    #[test]
    fn age_range_requires_known_age() {
        let prefs = Preferences {
            age_range: Some(AgeRange { min: 20, max: 30 }),
            ..Default::default()
        };
        assert!(satisfies(&prefs, &profile(1, 25, "x", &[])));
        assert!(!satisfies(&prefs, &profile(1, 35, "x", &[])));
        assert!(!satisfies(&prefs, &UserProfile { user_id: 1, ..Default::default() }));
    }

    #[test]
    fn community_and_interest_checks_ignore_case() {
        let prefs = Preferences {
            community: Some("Climbing".to_string()),
            interests: vec!["Bouldering".to_string()],
            ..Default::default()
        };
        assert!(satisfies(&prefs, &profile(1, 25, "climbing", &["bouldering", "tea"])));
        assert!(!satisfies(&prefs, &profile(1, 25, "chess", &["bouldering"])));
        assert!(!satisfies(&prefs, &profile(1, 25, "climbing", &["tea"])));
    }

    #[test]
    fn location_radius_is_enforced() {
        let prefs = Preferences {
            location: Some(LocationPreference {
                center: Location { lat: 52.5200, long: 13.4050 },
                radius_km: 10.0,
            }),
            ..Default::default()
        };
        let near = profile(1, 25, "x", &[]);
        let mut far = profile(2, 25, "x", &[]);
        // Hamburg, roughly 255km away
        far.location = Some(Location { lat: 53.5511, long: 9.9937 });

        assert!(satisfies(&prefs, &near));
        assert!(!satisfies(&prefs, &far));
    }

    #[test]
    fn mutual_check_needs_both_directions() {
        let picky = Preferences {
            age_range: Some(AgeRange { min: 40, max: 50 }),
            ..Default::default()
        };
        let open = Preferences::default();
        let young = profile(1, 22, "x", &[]);
        let older = profile(2, 45, "x", &[]);

        assert!(!mutually_compatible(&open, &young, &picky, &older));
        assert!(mutually_compatible(&picky, &young, &open, &older));
    }

    #[test]
    fn identical_profiles_score_full_marks() {
        let prefs = Preferences::default();
        let a = profile(1, 30, "runners", &["running", "coffee"]);
        let b = profile(2, 31, "runners", &["coffee", "running"]);
        assert_eq!(compatibility_score(&prefs, &a, &prefs, &b), 100);
    }

    #[test]
    fn bare_profiles_score_zero() {
        let prefs = Preferences::default();
        let a = UserProfile { user_id: 1, ..Default::default() };
        let b = UserProfile { user_id: 2, ..Default::default() };
        assert_eq!(compatibility_score(&prefs, &a, &prefs, &b), 0);
    }

    #[test]
    fn partial_interest_overlap_scales_score() {
        let prefs = Preferences::default();
        let mut a = profile(1, 30, "a", &["running", "coffee"]);
        let mut b = profile(2, 30, "b", &["running", "chess"]);
        a.location = None;
        b.location = None;
        a.age = None;
        // 1 shared out of 3 distinct interests
        assert_eq!(compatibility_score(&prefs, &a, &prefs, &b), 13);
    }
}
