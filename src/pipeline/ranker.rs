//! Relevance ranking of candidate references against a protein name.
//!
//! An exact occurrence of a name variant always outranks token similarity:
//! exact matches score 0.7 to 1.0 depending on the field, partial matches
//! never exceed [`PARTIAL_CEILING`].

use std::cmp::Ordering;
use strsim::jaro_winkler;

use crate::models::{ArticleReference, MatchEvidence, MatchField, MatchKind, RankedReference};
use crate::sources::SourceError;

/// Highest score a token-similarity match can reach
pub const PARTIAL_CEILING: f64 = 0.5;

/// Token pairs less similar than this contribute nothing
const TOKEN_SIMILARITY_THRESHOLD: f64 = 0.85;

/// Canonical form used to compare protein names: lowercase, no hyphens or spaces
pub fn normalize_name(name: &str) -> String {
    name.chars()
        .filter(|c| !c.is_whitespace() && *c != '-' && *c != '_')
        .flat_map(char::to_lowercase)
        .collect()
}

fn exact_weight(field: MatchField) -> f64 {
    match field {
        MatchField::Title => 1.0,
        MatchField::Keywords => 0.8,
        MatchField::Abstract => 0.7,
    }
}

fn partial_weight(field: MatchField) -> f64 {
    match field {
        MatchField::Title => 1.0,
        MatchField::Keywords => 0.9,
        MatchField::Abstract => 0.8,
    }
}

/// Spellings of a name that count as the same name
fn name_variants(name: &str) -> Vec<String> {
    let lower = name.trim().to_lowercase();
    let spaced = lower.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut variants = vec![
        spaced.clone(),
        spaced.replace('-', " "),
        spaced.replace(' ', "-"),
        normalize_name(&spaced),
    ];
    variants.sort();
    variants.dedup();
    // longest first so the reported variant is the most specific one
    variants.sort_by_key(|v| std::cmp::Reverse(v.chars().count()));
    variants
}

fn tokens(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Searchable text of each field, lowercased with whitespace collapsed
fn fields(reference: &ArticleReference) -> Vec<(MatchField, String)> {
    let normalize = |s: &str| s.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
    let mut fields = vec![(MatchField::Title, normalize(reference.title()))];
    if !reference.keywords().is_empty() {
        fields.push((MatchField::Keywords, normalize(&reference.keywords().join(" ; "))));
    }
    if let Some(text) = reference.abstract_text() {
        fields.push((MatchField::Abstract, normalize(text)));
    }
    fields
}

/// Whether consecutive whole tokens spell `variant` once separators are dropped.
///
/// "mneon green" spells "mneongreen", but "from orange" does not spell
/// "morange" because the match would start inside a token.
fn spelled_by_tokens(variant: &str, tokens: &[String]) -> bool {
    let target: String = variant.chars().filter(|c| c.is_alphanumeric()).collect();
    if target.is_empty() {
        return false;
    }
    (0..tokens.len()).any(|first| {
        let mut joined = String::new();
        for token in &tokens[first..] {
            joined.push_str(token);
            if joined == target {
                return true;
            }
            if !target.starts_with(joined.as_str()) {
                return false;
            }
        }
        false
    })
}

fn exact_match(variants: &[String], fields: &[(MatchField, String)]) -> Option<(f64, MatchEvidence)> {
    fields.iter().find_map(|(field, text)| {
        let field_tokens = tokens(text);
        variants
            .iter()
            .find(|v| {
                text.contains(v.as_str())
                    || (!v.contains(' ') && spelled_by_tokens(v, &field_tokens))
            })
            .map(|variant| {
                (
                    exact_weight(*field),
                    MatchEvidence {
                        variant: variant.clone(),
                        field: *field,
                        kind: MatchKind::Exact,
                    },
                )
            })
    })
}

fn partial_match(name_tokens: &[String], fields: &[(MatchField, String)]) -> Option<(f64, MatchEvidence)> {
    let mut best: Option<(f64, MatchEvidence)> = None;

    for (field, text) in fields {
        let field_tokens = tokens(text);
        if field_tokens.is_empty() {
            continue;
        }

        let mut total = 0.0;
        let mut best_token: Option<(f64, &str)> = None;
        for wanted in name_tokens {
            let (similarity, token) = field_tokens
                .iter()
                .map(|t| (jaro_winkler(wanted, t), t.as_str()))
                .max_by(|a, b| a.0.total_cmp(&b.0))
                .unwrap_or((0.0, ""));
            if similarity >= TOKEN_SIMILARITY_THRESHOLD {
                total += similarity;
                if best_token.map_or(true, |(s, _)| similarity > s) {
                    best_token = Some((similarity, token));
                }
            }
        }

        let Some((_, token)) = best_token else {
            continue;
        };
        let score = PARTIAL_CEILING * partial_weight(*field) * total / name_tokens.len() as f64;
        if best.as_ref().map_or(true, |(s, _)| score > *s) {
            best = Some((
                score,
                MatchEvidence {
                    variant: token.to_string(),
                    field: *field,
                    kind: MatchKind::Partial,
                },
            ));
        }
    }

    best
}

/// Score one reference, `None` when nothing about it resembles the name
fn score(
    variants: &[String],
    name_tokens: &[String],
    reference: &ArticleReference,
) -> Option<(f64, MatchEvidence)> {
    let fields = fields(reference);
    exact_match(variants, &fields).or_else(|| partial_match(name_tokens, &fields))
}

/// Newest first, undated last
fn by_date_desc(a: &ArticleReference, b: &ArticleReference) -> Ordering {
    match (a.published(), b.published()) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Rank candidates by relevance to `protein_name`.
///
/// Candidates scoring below `relevance_floor` are dropped. The output is
/// sorted by score descending; ties go to the more recent publication and then
/// to the earlier position in `candidates`.
pub fn rank(
    protein_name: &str,
    candidates: Vec<ArticleReference>,
    relevance_floor: f64,
) -> Result<Vec<RankedReference>, SourceError> {
    if protein_name.trim().is_empty() {
        return Err(SourceError::InvalidInput(
            "protein name must not be empty".to_string(),
        ));
    }

    let floor = if relevance_floor.is_nan() {
        0.0
    } else {
        relevance_floor.clamp(0.0, 1.0)
    };
    let variants = name_variants(protein_name);
    let name_tokens = tokens(protein_name);
    let total = candidates.len();

    let mut scored: Vec<(usize, RankedReference)> = candidates
        .into_iter()
        .enumerate()
        .filter_map(|(index, reference)| {
            let (score, evidence) = score(&variants, &name_tokens, &reference)?;
            (score >= floor).then(|| (index, RankedReference::new(reference, score, evidence)))
        })
        .collect();

    scored.sort_by(|(ia, a), (ib, b)| {
        b.score()
            .total_cmp(&a.score())
            .then_with(|| by_date_desc(a.reference(), b.reference()))
            .then_with(|| ia.cmp(ib))
    });

    tracing::debug!(
        "Ranked {} of {} candidates for '{}' above floor {}",
        scored.len(),
        total,
        protein_name,
        floor
    );

    Ok(scored.into_iter().map(|(_, ranked)| ranked).collect())
}
