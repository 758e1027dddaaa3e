use crate::rating::Grade;
use crate::sonar::GateStatus;

/// Percentage value used when a metric is absent from the gate conditions.
pub const NO_DATA: f64 = -1.0;

/// Per-category grades and percentages read from the gate conditions.
#[derive(Debug, Clone, PartialEq)]
pub struct SecurityFacets {
    pub bug_grade: Option<Grade>,
    pub vulnerability_grade: Option<Grade>,
    pub code_smell_grade: Option<Grade>,
    pub hotspot_grade: Option<Grade>,
    /// Duplicated lines density on new code, or [`NO_DATA`]
    pub duplication_pct: f64,
    /// Coverage on new code, or [`NO_DATA`]
    pub coverage_pct: f64,
}

impl Default for SecurityFacets {
    fn default() -> Self {
        Self {
            bug_grade: None,
            vulnerability_grade: None,
            code_smell_grade: None,
            hotspot_grade: None,
            duplication_pct: NO_DATA,
            coverage_pct: NO_DATA,
        }
    }
}

/// Everything the status report shows.
#[derive(Debug, Clone)]
pub struct ReportParams<'a> {
    pub pull_request: &'a str,
    pub status: GateStatus,
    pub bug_count: u32,
    pub vulnerability_count: u32,
    pub code_smell_count: u32,
    pub closed_count: u32,
    pub hotspot_count: u32,
    pub facets: SecurityFacets,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_facets_default_to_no_data() {
        let facets = SecurityFacets::default();
        assert!(facets.bug_grade.is_none());
        assert!(facets.hotspot_grade.is_none());
        assert_eq!(facets.coverage_pct, NO_DATA);
        assert_eq!(facets.duplication_pct, NO_DATA);
    }
}
