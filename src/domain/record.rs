use serde::{Deserialize, Serialize};

use crate::domain::errors::PipelineError;

/// One company-year observation of annual financials.
///
/// The `unicorn` label is present only for rows coming from the training
/// corpus; candidate rows scored at inference time carry `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialRecord {
    pub year: i32,
    pub company: String,
    pub asset: f64,
    pub debt: f64,
    pub capital: f64,
    pub income: f64,
    pub cost: f64,
    pub profit: f64,
    pub net_income: f64,
    pub investment: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unicorn: Option<bool>,
}

/// A `FinancialRecord` as stored, tagged with its auto-increment id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: i64,
    #[serde(flatten)]
    pub record: FinancialRecord,
}

/// An unvalidated row as it arrives from a CSV upload or a JSON payload.
///
/// Every field is optional so that validation can name the first missing
/// field instead of failing opaquely at deserialization time.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawRecord {
    pub year: Option<i32>,
    pub company: Option<String>,
    pub asset: Option<f64>,
    pub debt: Option<f64>,
    pub capital: Option<f64>,
    pub income: Option<f64>,
    pub cost: Option<f64>,
    pub profit: Option<f64>,
    pub net_income: Option<f64>,
    pub investment: Option<f64>,
    pub unicorn: Option<u8>,
}

impl RawRecord {
    /// Validates that every required field is present and returns the typed
    /// record. The first missing field is named in the error.
    pub fn validate(self) -> Result<FinancialRecord, PipelineError> {
        fn require<T>(value: Option<T>, field: &'static str) -> Result<T, PipelineError> {
            value.ok_or(PipelineError::MissingField { field })
        }

        Ok(FinancialRecord {
            year: require(self.year, "year")?,
            company: require(self.company, "company")?,
            asset: require(self.asset, "asset")?,
            debt: require(self.debt, "debt")?,
            capital: require(self.capital, "capital")?,
            income: require(self.income, "income")?,
            cost: require(self.cost, "cost")?,
            profit: require(self.profit, "profit")?,
            net_income: require(self.net_income, "net_income")?,
            investment: require(self.investment, "investment")?,
            unicorn: self.unicorn.map(|v| v != 0),
        })
    }

    /// Like [`validate`](Self::validate), but additionally requires the
    /// `unicorn` label. Used for training-corpus imports.
    pub fn validate_labeled(self) -> Result<FinancialRecord, PipelineError> {
        if self.unicorn.is_none() {
            return Err(PipelineError::MissingField { field: "unicorn" });
        }
        self.validate()
    }

    /// True when at least one required field is absent. Bulk upload drops
    /// such rows instead of rejecting the whole file.
    pub fn is_incomplete(&self) -> bool {
        self.year.is_none()
            || self.company.is_none()
            || self.asset.is_none()
            || self.debt.is_none()
            || self.capital.is_none()
            || self.income.is_none()
            || self.cost.is_none()
            || self.profit.is_none()
            || self.net_income.is_none()
            || self.investment.is_none()
    }
}
