use std::collections::HashMap;

use ndarray::Array2;

use crate::domain::errors::PipelineError;
use crate::domain::record::FinancialRecord;

/// One training example: a `(time_steps, num_features)` block of scaled
/// features and the unicorn label of its most recent row.
#[derive(Debug, Clone)]
pub struct LabeledWindow {
    pub features: Array2<f64>,
    pub label: f64,
}

/// Builds fixed-length sliding windows of consecutive company-years.
///
/// Rows are grouped per company and stable-sorted ascending by year, so
/// duplicate `(company, year)` pairs keep their insertion (id) order. Windows
/// slide by one row; a company with fewer than `time_steps` rows contributes
/// nothing. Companies are never mixed within a window.
#[derive(Debug)]
pub struct SequenceBuilder {
    time_steps: usize,
}

impl SequenceBuilder {
    pub fn new(time_steps: usize) -> Self {
        Self { time_steps }
    }

    pub fn time_steps(&self) -> usize {
        self.time_steps
    }

    /// Emits every labeled window of the corpus.
    ///
    /// `features` must be row-aligned with `records` (row `i` is the scaled
    /// feature vector of `records[i]`). A window whose last row carries no
    /// label aborts the build; the training corpus is expected to be fully
    /// labeled.
    pub fn build_windows(
        &self,
        records: &[FinancialRecord],
        features: &Array2<f64>,
    ) -> Result<Vec<LabeledWindow>, PipelineError> {
        let mut company_order: Vec<&str> = Vec::new();
        let mut by_company: HashMap<&str, Vec<usize>> = HashMap::new();

        for (idx, record) in records.iter().enumerate() {
            let entry = by_company.entry(record.company.as_str()).or_default();
            if entry.is_empty() {
                company_order.push(record.company.as_str());
            }
            entry.push(idx);
        }

        let mut windows = Vec::new();
        for company in company_order {
            let mut indices = by_company.remove(company).unwrap_or_default();
            indices.sort_by_key(|&i| records[i].year);

            if indices.len() < self.time_steps {
                continue;
            }

            for start in 0..=(indices.len() - self.time_steps) {
                let slice = &indices[start..start + self.time_steps];
                let last = slice[self.time_steps - 1];
                let label = records[last]
                    .unicorn
                    .ok_or(PipelineError::MissingField { field: "unicorn" })?;

                let mut block = Array2::zeros((self.time_steps, features.ncols()));
                for (t, &row_idx) in slice.iter().enumerate() {
                    block.row_mut(t).assign(&features.row(row_idx));
                }

                windows.push(LabeledWindow {
                    features: block,
                    label: if label { 1.0 } else { 0.0 },
                });
            }
        }

        Ok(windows)
    }

    /// Selects the most recent `time_steps` rows, returned ascending by year.
    ///
    /// This is the inference-time degenerate case of the sliding window: the
    /// single newest window of the entity being scored. Fails when fewer than
    /// `time_steps` rows qualify.
    pub fn latest_rows(
        &self,
        records: &[FinancialRecord],
    ) -> Result<Vec<FinancialRecord>, PipelineError> {
        if records.len() < self.time_steps {
            return Err(PipelineError::InsufficientData {
                available: records.len(),
                required: self.time_steps,
            });
        }

        // Ascending stable sort, then the tail: most recent rows, with tied
        // years still in insertion order.
        let mut indices: Vec<usize> = (0..records.len()).collect();
        indices.sort_by_key(|&i| records[i].year);
        let start = indices.len() - self.time_steps;

        Ok(indices[start..].iter().map(|&i| records[i].clone()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::feature_registry::{NUM_FEATURES, feature_matrix};

    fn record(company: &str, year: i32, unicorn: Option<bool>) -> FinancialRecord {
        FinancialRecord {
            year,
            company: company.to_string(),
            asset: year as f64,
            debt: 1.0,
            capital: 1.0,
            income: 1.0,
            cost: 1.0,
            profit: 1.0,
            net_income: 1.0,
            investment: 1.0,
            unicorn,
        }
    }

    fn corpus(company: &str, years: std::ops::RangeInclusive<i32>) -> Vec<FinancialRecord> {
        years.map(|y| record(company, y, Some(y % 2 == 0))).collect()
    }

    #[test]
    fn test_window_count_per_company() {
        // 8 rows, time_steps 5 -> 8 - 5 + 1 = 4 windows
        let records = corpus("Acme", 2015..=2022);
        let features = feature_matrix(&records);
        let builder = SequenceBuilder::new(5);

        let windows = builder.build_windows(&records, &features).unwrap();
        assert_eq!(windows.len(), 4);
        for w in &windows {
            assert_eq!(w.features.shape(), &[5, NUM_FEATURES]);
        }
    }

    #[test]
    fn test_windows_are_sorted_ascending_by_year() {
        // Insert out of order; year is feature column 0
        let mut records = corpus("Acme", 2018..=2022);
        records.swap(0, 4);
        records.swap(1, 3);
        let features = feature_matrix(&records);

        let windows = SequenceBuilder::new(5).build_windows(&records, &features).unwrap();
        assert_eq!(windows.len(), 1);

        let years: Vec<f64> = (0..5).map(|t| windows[0].features[[t, 0]]).collect();
        assert_eq!(years, vec![2018.0, 2019.0, 2020.0, 2021.0, 2022.0]);
    }

    #[test]
    fn test_short_company_contributes_no_windows() {
        let records = corpus("Tiny", 2020..=2022);
        let features = feature_matrix(&records);

        let windows = SequenceBuilder::new(5).build_windows(&records, &features).unwrap();
        assert!(windows.is_empty());
    }

    #[test]
    fn test_companies_are_never_mixed() {
        let mut records = corpus("Acme", 2016..=2020);
        records.extend(corpus("Bolt", 2016..=2020));
        let features = feature_matrix(&records);

        let windows = SequenceBuilder::new(5).build_windows(&records, &features).unwrap();
        // Each company has exactly 5 rows -> one window apiece
        assert_eq!(windows.len(), 2);
    }

    #[test]
    fn test_label_comes_from_last_row() {
        let mut records = corpus("Acme", 2016..=2019);
        records.push(record("Acme", 2020, Some(true)));
        let features = feature_matrix(&records);

        let windows = SequenceBuilder::new(5).build_windows(&records, &features).unwrap();
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].label, 1.0);
    }

    #[test]
    fn test_unlabeled_window_aborts_build() {
        let mut records = corpus("Acme", 2016..=2019);
        records.push(record("Acme", 2020, None));
        let features = feature_matrix(&records);

        let err = SequenceBuilder::new(5)
            .build_windows(&records, &features)
            .unwrap_err();
        assert!(err.to_string().contains("unicorn"));
    }

    #[test]
    fn test_duplicate_years_keep_insertion_order() {
        let mut records = corpus("Acme", 2017..=2020);
        let mut dup_a = record("Acme", 2020, Some(false));
        dup_a.asset = 111.0;
        let mut dup_b = record("Acme", 2020, Some(true));
        dup_b.asset = 222.0;
        records.push(dup_a);
        records.push(dup_b);
        let features = feature_matrix(&records);

        let first = SequenceBuilder::new(5).build_windows(&records, &features).unwrap();
        let second = SequenceBuilder::new(5).build_windows(&records, &features).unwrap();

        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(second.iter()) {
            assert_eq!(a.features, b.features);
            assert_eq!(a.label, b.label);
        }
        // The stable sort keeps 111.0 before 222.0 within the tied year.
        let last = &first[first.len() - 1].features;
        assert_eq!(last[[3, 1]], 111.0);
        assert_eq!(last[[4, 1]], 222.0);
    }

    #[test]
    fn test_latest_rows_picks_most_recent_ascending() {
        let records = corpus("Acme", 2015..=2022);
        let latest = SequenceBuilder::new(5).latest_rows(&records).unwrap();

        let years: Vec<i32> = latest.iter().map(|r| r.year).collect();
        assert_eq!(years, vec![2018, 2019, 2020, 2021, 2022]);
    }

    #[test]
    fn test_latest_rows_insufficient_data() {
        let records = corpus("Acme", 2020..=2022);
        let err = SequenceBuilder::new(5).latest_rows(&records).unwrap_err();

        match err {
            PipelineError::InsufficientData { available, required } => {
                assert_eq!(available, 3);
                assert_eq!(required, 5);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
