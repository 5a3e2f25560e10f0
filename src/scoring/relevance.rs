use crate::core::types::Document;
use crate::index::inverted::InvertedIndex;
use crate::index::vocabulary::Vocabulary;
use crate::spatial::mbr::Mbr;

/// `ln(1 + tf) * ln(N / df)`; zero whenever any factor is zero.
pub fn tf_idf_weight(tf: i32, df: usize, total_docs: usize) -> f64 {
    if tf <= 0 || df == 0 || total_docs == 0 {
        return 0.0;
    }
    let tf_component = (1.0 + tf as f64).ln();
    let idf_component = (total_docs as f64 / df as f64).ln();
    tf_component * idf_component
}

/// Fraction of `target`'s area covered by the query scope. Disjoint boxes
/// score 0; a zero-area target that overlaps at all scores 1.
pub fn spatial_relevance(target: &Mbr, scope: &Mbr) -> f64 {
    if !target.overlaps(scope) {
        return 0.0;
    }
    let target_area = target.area();
    if target_area == 0.0 {
        return 1.0;
    }
    target.overlap_volume(scope) / target_area
}

/// Sum of TF-IDF weights over the query terms present in `doc`, normalized
/// by the query length and clamped to [0, 1]. Terms unknown to the
/// vocabulary or absent from the document contribute 0.
pub fn text_relevance(
    doc: &Document,
    query_terms: &[String],
    vocab: &Vocabulary,
    index: &InvertedIndex,
) -> f64 {
    if query_terms.is_empty() {
        return 0.0;
    }
    let total_docs = index.total_documents();
    let mut relevance = 0.0;
    for term in query_terms {
        let tf = doc.term_frequency(term);
        if tf == 0 {
            continue;
        }
        let Some(term_id) = vocab.term_id(term) else {
            continue;
        };
        let df = index.document_frequency(term_id);
        relevance += tf_idf_weight(tf, df, total_docs);
    }
    if relevance > 0.0 {
        relevance = (relevance / query_terms.len() as f64).min(1.0);
    }
    relevance
}

/// Linear blend of the two relevance components.
pub fn joint_relevance(text: f64, spatial: f64, alpha: f64) -> f64 {
    alpha * text + (1.0 - alpha) * spatial
}
