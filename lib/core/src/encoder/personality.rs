// Personality segment: one slot per fixed category
use crate::profile::Personality;

/// Fixed personality categories, in slot order
pub const PERSONALITY_DIMENSIONS: [&str; 12] = [
    "analytical",
    "creative",
    "practical",
    "introvert",
    "extrovert",
    "ambivert",
    "organized",
    "flexible",
    "balanced",
    "leader",
    "supporter",
    "specialist",
];

pub const PERSONALITY_DIM: usize = PERSONALITY_DIMENSIONS.len();

/// Slot of a category name, matched case-insensitively
#[inline]
pub fn personality_slot(name: &str) -> Option<usize> {
    let name = name.trim();
    PERSONALITY_DIMENSIONS
        .iter()
        .position(|dim| dim.eq_ignore_ascii_case(name))
}

/// Write the personality segment into `out` (length `PERSONALITY_DIM`).
///
/// Tags are split on `_`; each recognised part becomes a one-hot `1.0`.
/// Trait maps copy the strength of each recognised trait. Anything
/// unrecognised is ignored.
pub fn encode_personality(personality: Option<&Personality>, out: &mut [f32]) {
    debug_assert_eq!(out.len(), PERSONALITY_DIM);
    out.fill(0.0);

    match personality {
        Some(Personality::Tag(tag)) => {
            for part in tag.split('_') {
                if let Some(slot) = personality_slot(part) {
                    out[slot] = 1.0;
                }
            }
        }
        Some(Personality::Traits(traits)) => {
            for (name, strength) in traits {
                if let Some(slot) = personality_slot(name) {
                    out[slot] = *strength as f32;
                }
            }
        }
        None => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn encode(p: Option<&Personality>) -> [f32; PERSONALITY_DIM] {
        let mut out = [0.0; PERSONALITY_DIM];
        encode_personality(p, &mut out);
        out
    }

    #[test]
    fn test_single_tag_is_one_hot() {
        let out = encode(Some(&Personality::from("creative")));
        assert_eq!(out[1], 1.0);
        assert_eq!(out.iter().sum::<f32>(), 1.0);
    }

    #[test]
    fn test_compound_tag() {
        let out = encode(Some(&Personality::from("Analytical_introvert_leader")));
        assert_eq!(out[0], 1.0);
        assert_eq!(out[3], 1.0);
        assert_eq!(out[9], 1.0);
        assert_eq!(out.iter().sum::<f32>(), 3.0);
    }

    #[test]
    fn test_trait_strengths_and_unknowns() {
        let mut traits = BTreeMap::new();
        traits.insert("extrovert".to_string(), 0.8);
        traits.insert("specialist".to_string(), 0.25);
        traits.insert("mystic".to_string(), 5.0);
        let out = encode(Some(&Personality::Traits(traits)));
        assert_eq!(out[4], 0.8);
        assert_eq!(out[11], 0.25);
        assert!((out.iter().sum::<f32>() - 1.05).abs() < 1e-6);
    }

    #[test]
    fn test_absent_or_unknown_is_zero() {
        assert!(encode(None).iter().all(|x| *x == 0.0));
        assert!(encode(Some(&Personality::from("wizard"))).iter().all(|x| *x == 0.0));
        assert!(encode(Some(&Personality::from(""))).iter().all(|x| *x == 0.0));
    }
}
