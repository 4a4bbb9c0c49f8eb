//! Structural properties of overlap resolution over generated detection sets

use proptest::prelude::*;
use safeharbor::deid::models::{MergedEntity, PhiCategory, RawDetection};
use safeharbor::deid::resolver::{overlap_pct, OverlapResolver, ResolverSettings};
use std::collections::HashMap;

const TEXT: &str = "Seen by Dr Alan Grant at Lakeside Clinic on 03/04/2022 with his wife Ellie, \
                    MRN 8841203, phone 617-555-0142, ZIP 02139 and email alan@example.org today";

const WORD: &str = "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

const CATEGORIES: [PhiCategory; 4] = [
    PhiCategory::Name,
    PhiCategory::Location,
    PhiCategory::Date,
    PhiCategory::OtherId,
];
const SOURCES: [&str; 3] = ["rules", "ner", "annotator"];
const CONFIDENCES: [f64; 6] = [0.5, 0.6, 0.7, 0.8, 0.9, 0.95];

fn detection() -> impl Strategy<Value = RawDetection> {
    (
        0..TEXT.len() - 1,
        1..24usize,
        prop::sample::select(&CONFIDENCES[..]),
        prop::sample::select(&CATEGORIES[..]),
        prop::sample::select(&SOURCES[..]),
    )
        .prop_map(|(start, len, confidence, category, source)| {
            let end = (start + len).min(TEXT.len());
            RawDetection::new(TEXT, start, end, category, confidence, source).unwrap()
        })
}

fn detections(max: usize) -> impl Strategy<Value = Vec<RawDetection>> {
    prop::collection::vec(detection(), 0..=max)
}

fn resolver(threshold: f64, max_span_growth: f64) -> OverlapResolver {
    OverlapResolver::new(ResolverSettings {
        merge_threshold: threshold,
        max_span_growth,
        priorities: HashMap::from([("rules".to_string(), 100), ("ner".to_string(), 50)]),
        ..ResolverSettings::default()
    })
}

fn key(entities: &[MergedEntity]) -> Vec<(usize, usize, PhiCategory, Vec<String>)> {
    entities
        .iter()
        .map(|e| (e.start, e.end, e.category, e.merged_from.clone()))
        .collect()
}

proptest! {
    #[test]
    fn test_output_is_sorted_disjoint_and_faithful(
        input in detections(16),
        threshold in prop::sample::select(vec![0.1, 0.5, 1.0]),
        growth in prop::sample::select(vec![0.0, 1.0, f64::MAX]),
    ) {
        let out = resolver(threshold, growth).resolve(TEXT, input).unwrap();

        for pair in out.windows(2) {
            prop_assert!(
                pair[0].end <= pair[1].start,
                "{}..{} overlaps {}..{}",
                pair[0].start,
                pair[0].end,
                pair[1].start,
                pair[1].end
            );
        }
        for entity in &out {
            prop_assert!(entity.is_final);
            prop_assert_eq!(entity.text.as_str(), &TEXT[entity.start..entity.end]);
            prop_assert!(!entity.merged_from.is_empty());
        }
    }

    #[test]
    fn test_no_detected_character_is_lost_without_growth_limit(input in detections(12)) {
        let mut settings = ResolverSettings {
            merge_threshold: 0.5,
            max_span_growth: f64::MAX,
            ..ResolverSettings::default()
        };
        settings.fragment_joins.clear();
        let out = OverlapResolver::new(settings).resolve(TEXT, input.clone()).unwrap();

        for detection in &input {
            for (offset, ch) in TEXT[detection.start..detection.end].char_indices() {
                if ch.is_whitespace() {
                    continue;
                }
                let position = detection.start + offset;
                prop_assert!(
                    out.iter().any(|e| e.start <= position && position < e.end),
                    "byte {} of {}..{} is not covered",
                    position,
                    detection.start,
                    detection.end
                );
            }
        }
    }

    #[test]
    fn test_input_order_does_not_matter(
        (input, shuffled) in detections(12)
            .prop_flat_map(|input| (Just(input.clone()), Just(input).prop_shuffle())),
    ) {
        let resolver = resolver(0.5, 1.0);
        let expected = key(&resolver.resolve(TEXT, input.clone()).unwrap());
        prop_assert_eq!(key(&resolver.resolve(TEXT, shuffled).unwrap()), expected.clone());

        let mut reversed = input;
        reversed.reverse();
        prop_assert_eq!(key(&resolver.resolve(TEXT, reversed).unwrap()), expected);
    }

    #[test]
    fn test_merge_threshold_is_inclusive(
        start in 0..10usize,
        top_len in 2..20usize,
        other_len in 2..20usize,
        overlap_seed in any::<prop::sample::Index>(),
    ) {
        let overlap = 1 + overlap_seed.index(top_len.min(other_len));
        let other_start = start + top_len - overlap;
        let top = RawDetection::new(WORD, start, start + top_len, PhiCategory::Name, 0.9, "rules")
            .unwrap();
        let other = RawDetection::new(
            WORD,
            other_start,
            other_start + other_len,
            PhiCategory::Name,
            0.6,
            "ner",
        )
        .unwrap();
        let pct = overlap_pct(&top, &other);
        let union_end = top.end.max(other.end);

        // At the threshold the two merge into their union
        let merged = resolver(pct, f64::MAX)
            .resolve(WORD, vec![top.clone(), other.clone()])
            .unwrap();
        prop_assert_eq!(merged.len(), 1);
        prop_assert_eq!((merged[0].start, merged[0].end), (start, union_end));
        prop_assert_eq!(merged[0].merged_from.clone(), vec!["rules".to_string(), "ner".to_string()]);

        // Just above it the lower-ranked one keeps only what lies past the top
        let split = resolver(pct + 1e-9, f64::MAX)
            .resolve(WORD, vec![other, top.clone()])
            .unwrap();
        prop_assert_eq!((split[0].start, split[0].end), (top.start, top.end));
        if union_end > top.end {
            prop_assert_eq!(split.len(), 2);
            prop_assert_eq!((split[1].start, split[1].end), (top.end, union_end));
            prop_assert_eq!(split[1].source.as_str(), "ner");
        } else {
            prop_assert_eq!(split.len(), 1);
            prop_assert_eq!(split[0].merged_from.clone(), vec!["rules".to_string(), "ner".to_string()]);
        }
    }
}

#[test]
fn test_disjoint_inputs_pass_through() {
    let spans = [(8, 10), (11, 21), (44, 54)];
    let input: Vec<_> = spans
        .iter()
        .map(|&(start, end)| {
            RawDetection::new(TEXT, start, end, PhiCategory::Name, 0.9, "rules").unwrap()
        })
        .collect();

    let mut settings = ResolverSettings::default();
    settings.fragment_joins = HashMap::new();
    let out = OverlapResolver::new(settings).resolve(TEXT, input).unwrap();
    let got: Vec<_> = out.iter().map(|e| (e.start, e.end)).collect();
    assert_eq!(got, spans);
}

#[test]
fn test_empty_input() {
    assert!(resolver(0.5, 1.0).resolve(TEXT, Vec::new()).unwrap().is_empty());
}
