//! Overlap resolution
//!
//! Reconciles detections from independent providers into one list of
//! pairwise-disjoint entities sorted by start offset.
//!
//! Same-category fragments separated only by a short accepted gap, such as
//! "03/22" and "1975", are first joined into one detection.
//!
//! Detections are swept into clusters of transitively overlapping spans.
//! Within a cluster the members are ranked, and the top member anchors a
//! group made of itself and every member that overlaps it by at least
//! `merge_threshold` (measured against the shorter span). The group becomes
//! one entity. Members that overlap the result by less are trimmed to the
//! parts outside it and resolved again, so an adjacent-but-distinct span
//! such as a name running into a date keeps its own entity. A group whose
//! union would grow the top span past `max_span_growth` keeps the top span;
//! its other members are credited in `merged_from` but their outer parts
//! are not reported.

use crate::config::{FragmentConfig, ResolveConfig};
use crate::deid::models::{MergedEntity, PhiCategory, RawDetection};
use crate::domain::errors::DeidError;
use crate::domain::result::Result;
use std::cmp::Ordering;
use std::collections::HashMap;

/// Tunables for [`OverlapResolver`]
#[derive(Debug, Clone)]
pub struct ResolverSettings {
    /// Overlap fraction of the shorter span at which two detections merge
    pub merge_threshold: f64,
    /// When the union would grow the top span by more than this fraction of
    /// its length, the top span is kept instead of the union
    pub max_span_growth: f64,
    /// Provider name to tie-break priority
    pub priorities: HashMap<String, i32>,
    /// Categories whose nearby fragments are joined before clustering
    pub fragment_joins: HashMap<PhiCategory, FragmentJoin>,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self::from_config(&ResolveConfig::default(), HashMap::new())
    }
}

impl ResolverSettings {
    pub fn from_config(config: &ResolveConfig, priorities: HashMap<String, i32>) -> Self {
        let fragment_joins = if config.join_fragments {
            config
                .fragments
                .iter()
                .filter_map(|(label, fragment)| {
                    let category = label.parse::<PhiCategory>().ok()?;
                    Some((category, FragmentJoin::from_config(fragment)))
                })
                .collect()
        } else {
            HashMap::new()
        };

        Self {
            merge_threshold: config.merge_threshold,
            max_span_growth: config.max_span_growth,
            priorities,
            fragment_joins,
        }
    }

    /// Priority of a provider; unknown providers rank lowest
    pub fn priority_of(&self, source: &str) -> i32 {
        self.priorities.get(source).copied().unwrap_or(0)
    }
}

/// Gap rule under which two detections of one category are one value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentJoin {
    /// Largest gap between the parts, in bytes
    pub max_gap: usize,
    /// Characters allowed in the gap besides whitespace; `None` accepts any
    pub separators: Option<String>,
}

impl FragmentJoin {
    pub fn from_config(config: &FragmentConfig) -> Self {
        Self {
            max_gap: config.max_gap,
            separators: config.separators.clone(),
        }
    }

    fn accepts(&self, gap: &str) -> bool {
        if gap.len() > self.max_gap {
            return false;
        }
        match self.separators {
            Some(ref allowed) => gap.chars().all(|c| c.is_whitespace() || allowed.contains(c)),
            None => true,
        }
    }
}

/// Fraction of the shorter span covered by the intersection
pub fn overlap_pct(a: &RawDetection, b: &RawDetection) -> f64 {
    let shorter = a.len().min(b.len());
    if shorter == 0 {
        return 0.0;
    }
    a.overlap_len(b) as f64 / shorter as f64
}

/// Merges overlapping detections into final entities
#[derive(Debug, Clone, Default)]
pub struct OverlapResolver {
    settings: ResolverSettings,
}

impl OverlapResolver {
    pub fn new(settings: ResolverSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &ResolverSettings {
        &self.settings
    }

    /// Resolves `detections` over `text` into a sorted, disjoint entity list
    ///
    /// # Errors
    ///
    /// [`DeidError::MalformedDetection`] if any detection does not describe
    /// `text` (spans are never clamped), and
    /// [`DeidError::ResolverInvariantViolation`] if the output would overlap,
    /// be out of order, or misquote the input.
    pub fn resolve(&self, text: &str, detections: Vec<RawDetection>) -> Result<Vec<MergedEntity>> {
        for detection in &detections {
            detection.validate_against(text)?;
        }

        let input_count = detections.len();
        let detections = self.join_fragments(text, detections)?;
        let mut resolved = self.resolve_set(text, detections);
        resolved.sort_by(|a, b| a.start.cmp(&b.start).then(a.end.cmp(&b.end)));
        for entity in &mut resolved {
            entity.is_final = true;
        }

        verify(text, &resolved)?;

        tracing::debug!(
            detections = input_count,
            entities = resolved.len(),
            "Resolved overlapping detections"
        );
        Ok(resolved)
    }

    /// Joins detections of a category with a join rule when only an
    /// accepted gap separates them, so "03/22" and "1975" become one date
    ///
    /// Parts are chained in start order. A joined detection keeps the
    /// highest confidence and the source that reported it.
    fn join_fragments(&self, text: &str, detections: Vec<RawDetection>) -> Result<Vec<RawDetection>> {
        if self.settings.fragment_joins.is_empty() {
            return Ok(detections);
        }

        let mut out = Vec::with_capacity(detections.len());
        let mut by_category: HashMap<PhiCategory, Vec<RawDetection>> = HashMap::new();
        for detection in detections {
            if self.settings.fragment_joins.contains_key(&detection.category) {
                by_category.entry(detection.category).or_default().push(detection);
            } else {
                out.push(detection);
            }
        }

        let mut joined = 0;
        for (category, mut parts) in by_category {
            let rule = &self.settings.fragment_joins[&category];
            parts.sort_by(sweep_cmp);

            let mut parts = parts.into_iter();
            let Some(mut current) = parts.next() else {
                continue;
            };
            for next in parts {
                let joinable = next.start >= current.end
                    && text
                        .get(current.end..next.start)
                        .is_some_and(|gap| rule.accepts(gap));
                if !joinable {
                    out.push(std::mem::replace(&mut current, next));
                    continue;
                }

                let (confidence, source) = if next.confidence > current.confidence {
                    (next.confidence, next.source)
                } else {
                    (current.confidence, current.source)
                };
                current =
                    RawDetection::new(text, current.start, next.end, category, confidence, source)?;
                joined += 1;
            }
            out.push(current);
        }

        if joined > 0 {
            tracing::debug!(joined, "Joined detection fragments");
        }
        Ok(out)
    }

    fn resolve_set(&self, text: &str, mut detections: Vec<RawDetection>) -> Vec<MergedEntity> {
        detections.sort_by(sweep_cmp);

        let mut out = Vec::new();
        let mut cluster: Vec<RawDetection> = Vec::new();
        let mut cluster_end = 0;

        for detection in detections {
            if !cluster.is_empty() && detection.start >= cluster_end {
                out.extend(self.resolve_cluster(text, std::mem::take(&mut cluster)));
            }
            cluster_end = if cluster.is_empty() {
                detection.end
            } else {
                cluster_end.max(detection.end)
            };
            cluster.push(detection);
        }
        if !cluster.is_empty() {
            out.extend(self.resolve_cluster(text, cluster));
        }
        out
    }

    fn resolve_cluster(&self, text: &str, mut members: Vec<RawDetection>) -> Vec<MergedEntity> {
        if members.len() == 1 {
            return members
                .pop()
                .map(MergedEntity::from_detection)
                .into_iter()
                .collect();
        }

        members.sort_by(|a, b| self.rank_cmp(a, b));

        let mut group = Vec::new();
        let mut rest = Vec::new();
        for (idx, member) in members.into_iter().enumerate() {
            if idx == 0 || overlap_pct(&group[0], &member) >= self.settings.merge_threshold {
                group.push(member);
            } else {
                rest.push(member);
            }
        }

        // Under the growth limit, group members reaching past the top span
        // are only credited in `merged_from`; their outer parts are dropped
        let mut anchor = self.merge(text, &group);

        let mut remaining = Vec::new();
        for member in rest {
            if member.end <= anchor.start || member.start >= anchor.end {
                remaining.push(member);
                continue;
            }
            let pieces = trim_outside(text, &member, anchor.start, anchor.end);
            if pieces.is_empty() {
                anchor.add_source(&member.source);
            } else {
                tracing::trace!(
                    start = member.start,
                    end = member.end,
                    pieces = pieces.len(),
                    "Trimmed adjacent detection"
                );
                remaining.extend(pieces);
            }
        }

        let mut out = vec![anchor];
        if !remaining.is_empty() {
            out.extend(self.resolve_set(text, remaining));
        }
        out
    }

    /// Collapses a ranked group into one entity led by its first member
    fn merge(&self, text: &str, group: &[RawDetection]) -> MergedEntity {
        let top = &group[0];
        let union_start = group.iter().map(|d| d.start).min().unwrap_or(top.start);
        let union_end = group.iter().map(|d| d.end).max().unwrap_or(top.end);

        let top_len = top.len();
        let growth = (union_end - union_start - top_len) as f64 / top_len as f64;
        let (start, end) = if growth > self.settings.max_span_growth {
            tracing::debug!(
                top_len,
                union_len = union_end - union_start,
                "Union exceeds span growth limit, keeping top span"
            );
            (top.start, top.end)
        } else {
            (union_start, union_end)
        };

        let mut merged_from: Vec<String> = Vec::new();
        for member in group {
            if !merged_from.contains(&member.source) {
                merged_from.push(member.source.clone());
            }
        }

        MergedEntity {
            start,
            end,
            category: top.category,
            confidence: group
                .iter()
                .map(|d| d.confidence)
                .fold(top.confidence, f64::max),
            source: top.source.clone(),
            text: text[start..end].to_string(),
            merged_from,
            is_final: false,
        }
    }

    /// Orders by confidence, provider priority, category specificity and span
    /// length (all descending), then start and source ascending
    fn rank_cmp(&self, a: &RawDetection, b: &RawDetection) -> Ordering {
        b.confidence
            .total_cmp(&a.confidence)
            .then_with(|| {
                self.settings
                    .priority_of(&b.source)
                    .cmp(&self.settings.priority_of(&a.source))
            })
            .then_with(|| b.category.specificity().cmp(&a.category.specificity()))
            .then_with(|| b.len().cmp(&a.len()))
            .then_with(|| a.start.cmp(&b.start))
            .then_with(|| a.source.cmp(&b.source))
            .then_with(|| a.category.cmp(&b.category))
    }
}

/// Start ascending, confidence descending, longer first
fn sweep_cmp(a: &RawDetection, b: &RawDetection) -> Ordering {
    a.start
        .cmp(&b.start)
        .then_with(|| b.confidence.total_cmp(&a.confidence))
        .then_with(|| b.len().cmp(&a.len()))
        .then_with(|| a.source.cmp(&b.source))
        .then_with(|| a.category.cmp(&b.category))
}

/// Parts of `member` left and right of `lo..hi`, whitespace-trimmed
fn trim_outside(text: &str, member: &RawDetection, lo: usize, hi: usize) -> Vec<RawDetection> {
    let mut pieces = Vec::new();
    let candidates = [
        (member.start, member.end.min(lo)),
        (member.start.max(hi), member.end),
    ];

    for (start, end) in candidates {
        if start >= end {
            continue;
        }
        let slice = &text[start..end];
        let leading = slice.len() - slice.trim_start().len();
        let trimmed = slice.trim();
        if trimmed.is_empty() {
            continue;
        }
        let piece_start = start + leading;
        let piece_end = piece_start + trimmed.len();
        // Offsets come from char boundaries of a validated span, so this
        // cannot fail
        if let Ok(piece) = RawDetection::new(
            text,
            piece_start,
            piece_end,
            member.category,
            member.confidence,
            member.source.as_str(),
        ) {
            pieces.push(piece);
        }
    }
    pieces
}

/// Checks ordering, disjointness and span fidelity of a resolved list
fn verify(text: &str, entities: &[MergedEntity]) -> Result<()> {
    let mut previous_end = 0;
    for (idx, entity) in entities.iter().enumerate() {
        if entity.start >= entity.end || entity.end > text.len() {
            return Err(DeidError::ResolverInvariantViolation(format!(
                "entity {idx} has invalid span {}..{}",
                entity.start, entity.end
            )));
        }
        if idx > 0 && entity.start < previous_end {
            return Err(DeidError::ResolverInvariantViolation(format!(
                "entity {idx} at {}..{} overlaps or precedes previous end {}",
                entity.start, entity.end, previous_end
            )));
        }
        if text.get(entity.start..entity.end) != Some(entity.text.as_str()) {
            return Err(DeidError::ResolverInvariantViolation(format!(
                "entity {idx} text does not match input at {}..{}",
                entity.start, entity.end
            )));
        }
        previous_end = entity.end;
    }
    Ok(())
}
