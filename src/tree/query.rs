use crate::analysis::tokenizer;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::DocId;
use crate::spatial::mbr::Mbr;

/// A validated top-k spatial-keyword query. Keywords go through the same
/// normalization as document text, so "Coffee," matches documents indexed
/// under "coffee".
#[derive(Debug, Clone)]
pub struct Query {
    keywords: Vec<String>,
    scope: Mbr,
    k: usize,
    alpha: f64,
}

impl Query {
    pub fn new(keywords: &str, scope: Mbr, k: usize, alpha: f64) -> Result<Self> {
        if k == 0 {
            return Err(Error::new(
                ErrorKind::InvalidParameter,
                "k must be at least 1",
            ));
        }
        if !(0.0..=1.0).contains(&alpha) {
            return Err(Error::new(
                ErrorKind::InvalidParameter,
                format!("alpha {} outside [0,1]", alpha),
            ));
        }
        Ok(Query {
            keywords: tokenizer::parse_keywords(keywords),
            scope,
            k,
            alpha,
        })
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    pub fn scope(&self) -> &Mbr {
        &self.scope
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }
}

/// One search result: a document id and its joint relevance score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchHit {
    pub doc_id: DocId,
    pub score: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope() -> Mbr {
        Mbr::new(vec![0.0, 0.0], vec![1.0, 1.0]).unwrap()
    }

    #[test]
    fn keywords_are_normalized() {
        let query = Query::new("Coffee, SHOP", scope(), 5, 0.5).unwrap();
        assert_eq!(query.keywords(), &["coffee", "shop"]);
    }

    #[test]
    fn rejects_zero_k() {
        let err = Query::new("coffee", scope(), 0, 0.5).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParameter);
    }

    #[test]
    fn rejects_alpha_outside_unit_interval() {
        assert!(Query::new("coffee", scope(), 1, -0.1).is_err());
        assert!(Query::new("coffee", scope(), 1, 1.1).is_err());
        assert!(Query::new("coffee", scope(), 1, 1.0).is_ok());
    }
}
