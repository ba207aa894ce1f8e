use ndarray::{Array1, Array2};

use crate::domain::record::FinancialRecord;

/// Ordered list of feature column names.
/// This order MUST match exactly between training and inference; the
/// persisted scaler and model are only valid against it.
/// Any change here is a breaking change for stored artifacts.
pub const FEATURE_COLUMNS: &[&str] = &[
    "year",
    "asset",
    "debt",
    "capital",
    "income",
    "cost",
    "profit",
    "net_income",
    "investment",
];

/// Number of model input features per time step.
pub const NUM_FEATURES: usize = FEATURE_COLUMNS.len();

/// Converts one record into its feature vector, in [`FEATURE_COLUMNS`] order.
pub fn feature_vector(record: &FinancialRecord) -> Array1<f64> {
    Array1::from(vec![
        record.year as f64,
        record.asset,
        record.debt,
        record.capital,
        record.income,
        record.cost,
        record.profit,
        record.net_income,
        record.investment,
    ])
}

/// Stacks a slice of records into a `(rows, NUM_FEATURES)` matrix, row order
/// preserved.
pub fn feature_matrix(records: &[FinancialRecord]) -> Array2<f64> {
    let mut matrix = Array2::zeros((records.len(), NUM_FEATURES));
    for (i, record) in records.iter().enumerate() {
        matrix.row_mut(i).assign(&feature_vector(record));
    }
    matrix
}
